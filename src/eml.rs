//! Reading raw `.eml` messages.
//!
//! Two things come out of a message: the text handed to the classifier
//! (`Subject` plus the visible body) and a set of heuristic [`Indicators`]
//! shown next to the model's verdict. No MIME decoding beyond dropping part
//! headers and boundary lines and undoing quoted-printable soft breaks.

use std::borrow::Cow;
use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;

static HEADER_BODY_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\n\r?\n").unwrap());
static FOLDED_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\n[ \t]+").unwrap());
static SCRIPT_OR_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)\b.*?</(script|style)>").unwrap());
static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
// `$` only matches before `\n`, so a trailing `\r` is consumed explicitly.
static MIME_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^(--[^\s]+|content-[a-z-]+:.*|mime-version:.*)\r?$").unwrap()
});
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static SOFT_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"=\r?\n").unwrap());

static RECEIVED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?im)^received:").unwrap());
static URGENT_SUBJECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)urgent|important|alert|verify|confirm|update|account|secure|suspend").unwrap()
});

static HREF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)href\s*=\s*["'](https?://[^\s<>"']+|www\.[^\s<>"']+)["']"#).unwrap()
});
static ANCHOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a\s+[^>]*href\s*=\s*["']([^"']*)["'][^>]*>(.*?)</a>"#).unwrap()
});
static URL_IN_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)https?://[^\s<>"]+|www\.[^\s<>"]+"#).unwrap());
static IP_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^https?://\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}").unwrap());
static SUSPICIOUS_TLD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\.(tk|ml|ga|cf|gq|top|xyz|work|date|racing|win|review|stream|accountant)$")
        .unwrap()
});

static HTML_MARKUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<html|<body|<div|<table|<a\s|<img|<script").unwrap());
static FORM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<form|<input|<button|<select|<textarea").unwrap());
static JAVASCRIPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<script|javascript:|onclick|onload|onmouseover").unwrap());
static CREDENTIALS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)password|log ?in|sign in|credential|user ?name|account").unwrap()
});
static URGENCY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)urgent|immediately|right away|expires|suspended|cancelled|verify now|limited time|alert",
    )
    .unwrap()
});
static PHISHING_PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)verify your account|security alert|unusual activity|confirm your information|update your information|account will be terminated|account has been limited",
    )
    .unwrap()
});
static RISKY_ATTACHMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:file)?name\*?=\s*"?[^"\r\n;]*\.(exe|scr|bat|js|jar|com|zip)\b"#).unwrap()
});

/// More `Received` hops than this is unusual for ordinary mail.
pub const MAX_EXPECTED_HOPS: usize = 3;

/// Text pulled out of an email.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailText {
    pub subject: String,
    pub from: String,
    pub body: String,
}

impl EmailText {
    /// Subject and body joined the way the classifier expects them.
    pub fn classifiable_text(&self) -> String {
        match (self.subject.is_empty(), self.body.is_empty()) {
            (false, false) => format!("{}\n\n{}", self.subject, self.body),
            (false, true) => self.subject.clone(),
            _ => self.body.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderIndicators {
    pub from_domain: Option<String>,
    pub reply_to_domain: Option<String>,
    /// A `Reply-To` is present and points at a different domain than `From`
    pub reply_to_mismatch: bool,
    pub urgent_subject: bool,
    pub received_count: usize,
}

/// An anchor whose visible text shows one URL while its `href` goes elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MismatchedLink {
    pub displayed: String,
    pub actual: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkIndicators {
    /// Distinct `href` targets, in order of appearance
    pub links: Vec<String>,
    pub mismatched: Vec<MismatchedLink>,
    pub unique_domains: usize,
    pub ip_url: bool,
    pub suspicious_tld: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentIndicators {
    pub html: bool,
    pub forms: bool,
    pub javascript: bool,
    pub credential_request: bool,
    pub urgency_language: bool,
    pub phishing_phrases: bool,
    pub risky_attachment: bool,
}

/// Heuristic signals read from headers, links and body markup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Indicators {
    pub header: HeaderIndicators,
    pub links: LinkIndicators,
    pub content: ContentIndicators,
}

impl Indicators {
    /// Descriptions of every indicator that fired.
    pub fn raised(&self) -> Vec<&'static str> {
        let h = &self.header;
        let l = &self.links;
        let c = &self.content;
        [
            (h.reply_to_mismatch, "Reply-To domain differs from From"),
            (h.urgent_subject, "Urgent wording in subject"),
            (h.received_count > MAX_EXPECTED_HOPS, "Unusually many Received hops"),
            (!l.mismatched.is_empty(), "Link text points to a different domain"),
            (l.ip_url, "Link to a bare IP address"),
            (l.suspicious_tld, "Link to a suspicious top-level domain"),
            (c.forms, "Embedded form"),
            (c.javascript, "Embedded JavaScript"),
            (c.credential_request, "Asks for credentials"),
            (c.urgency_language, "Urgency or threat language"),
            (c.phishing_phrases, "Known phishing phrasing"),
            (c.risky_attachment, "Risky attachment type"),
        ]
        .into_iter()
        .filter_map(|(raised, description)| raised.then_some(description))
        .collect()
    }
}

/// Splits headers from body at the first blank line and cleans the body.
/// Input without a blank line is treated as body only.
pub fn extract_text(raw: &str) -> EmailText {
    let (header, body) = split_message(raw);
    let body = decode_soft_breaks(raw, body);
    EmailText {
        subject: header_field(&header, "Subject").unwrap_or_default(),
        from: header_field(&header, "From").unwrap_or_default(),
        body: visible_text(&body),
    }
}

pub fn extract_indicators(raw: &str) -> Indicators {
    let (header, body) = split_message(raw);
    let body = decode_soft_breaks(raw, body);
    Indicators {
        header: header_indicators(&header),
        links: link_indicators(&body),
        content: content_indicators(&body),
    }
}

/// Unfolded header block and body.
fn split_message(raw: &str) -> (Cow<'_, str>, &str) {
    let mut parts = HEADER_BODY_SPLIT.splitn(raw, 2);
    let first = parts.next().unwrap_or_default();
    match parts.next() {
        Some(body) if looks_like_header(first) => (FOLDED_LINE.replace_all(first, " "), body),
        Some(_) | None => (Cow::Borrowed(""), raw),
    }
}

fn looks_like_header(block: &str) -> bool {
    block
        .lines()
        .next()
        .map(|line| {
            line.split_once(':')
                .map(|(name, _)| !name.is_empty() && !name.contains(char::is_whitespace))
                .unwrap_or(false)
        })
        .unwrap_or(false)
}

fn header_field(header: &str, name: &str) -> Option<String> {
    header.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim().to_string())
    })
}

/// Joins quoted-printable soft line breaks so `href=3D"..."` survives.
fn decode_soft_breaks<'a>(raw: &str, body: &'a str) -> Cow<'a, str> {
    if !raw.to_ascii_lowercase().contains("quoted-printable") {
        return Cow::Borrowed(body);
    }
    Cow::Owned(SOFT_BREAK.replace_all(body, "").replace("=3D", "="))
}

fn visible_text(body: &str) -> String {
    let text = SCRIPT_OR_STYLE.replace_all(body, " ");
    let text = HTML_TAG.replace_all(&text, " ");
    let text = MIME_LINE.replace_all(&text, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

fn header_indicators(header: &str) -> HeaderIndicators {
    let from_domain = header_field(header, "From").as_deref().and_then(email_domain);
    let reply_to_domain = header_field(header, "Reply-To").as_deref().and_then(email_domain);
    let reply_to_mismatch = reply_to_domain.is_some() && reply_to_domain != from_domain;
    let urgent_subject = header_field(header, "Subject")
        .map(|subject| URGENT_SUBJECT.is_match(&subject))
        .unwrap_or(false);

    HeaderIndicators {
        from_domain,
        reply_to_domain,
        reply_to_mismatch,
        urgent_subject,
        received_count: RECEIVED.find_iter(header).count(),
    }
}

/// `Name <user@Example.COM>` -> `example.com`
fn email_domain(address: &str) -> Option<String> {
    let (_, domain) = address.rsplit_once('@')?;
    let domain = domain.trim_end_matches(|c: char| c == '>' || c == '"' || c.is_whitespace());
    (!domain.is_empty()).then(|| domain.to_ascii_lowercase())
}

/// Host of a URL without a leading `www.`; bare `www.` links are read as https.
fn host_of(url: &str) -> Option<String> {
    let parsed = if url.to_ascii_lowercase().starts_with("http") {
        Url::parse(url)
    } else {
        Url::parse(&format!("https://{}", url))
    }
    .ok()?;
    let host = parsed.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_ascii_lowercase())
}

fn link_indicators(body: &str) -> LinkIndicators {
    let mut seen = BTreeSet::new();
    let links: Vec<String> = HREF
        .captures_iter(body)
        .map(|caps| caps[1].to_string())
        .filter(|link| seen.insert(link.clone()))
        .collect();

    let domains: BTreeSet<String> = links.iter().filter_map(|link| host_of(link)).collect();

    let mismatched = ANCHOR
        .captures_iter(body)
        .filter_map(|caps| {
            let actual = caps[1].trim().to_string();
            let displayed = HTML_TAG.replace_all(&caps[2], "").trim().to_string();
            let shown_host = host_of(URL_IN_TEXT.find(&displayed)?.as_str());
            let same = matches!((shown_host, host_of(&actual)), (Some(a), Some(b)) if a == b);
            (!same).then_some(MismatchedLink { displayed, actual })
        })
        .collect();

    LinkIndicators {
        ip_url: links.iter().any(|link| IP_URL.is_match(link)),
        suspicious_tld: domains.iter().any(|domain| SUSPICIOUS_TLD.is_match(domain)),
        unique_domains: domains.len(),
        mismatched,
        links,
    }
}

fn content_indicators(body: &str) -> ContentIndicators {
    ContentIndicators {
        html: HTML_MARKUP.is_match(body),
        forms: FORM.is_match(body),
        javascript: JAVASCRIPT.is_match(body),
        credential_request: CREDENTIALS.is_match(body),
        urgency_language: URGENCY.is_match(body),
        phishing_phrases: PHISHING_PHRASE.is_match(body),
        risky_attachment: RISKY_ATTACHMENT.is_match(body),
    }
}
