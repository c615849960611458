use colored::*;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use serde_json::Value;

use super::PredictionResponse;
use crate::eml::{EmailText, Indicators};

const BAR_WIDTH: usize = 30;

fn is_phishing_label(label: &str) -> bool {
    label.starts_with("phishing")
}

/// Prints the verdict line and a table of class probabilities, highest first.
pub fn display_prediction(prediction: &PredictionResponse) {
    let verdict = format!("{} ({:.2}%)", prediction.label, prediction.confidence * 100.0);
    if is_phishing_label(&prediction.label) {
        println!("{} {}", "Verdict:".bold(), verdict.red().bold());
    } else {
        println!("{} {}", "Verdict:".bold(), verdict.green().bold());
    }

    let mut rows: Vec<(&String, &f64)> = prediction.probabilities.iter().collect();
    rows.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut table = Table::new();
    table
        .set_header(vec![
            Cell::new("Label").fg(Color::Cyan).add_attribute(Attribute::Bold),
            Cell::new("Probability").fg(Color::Cyan).add_attribute(Attribute::Bold),
            Cell::new("").fg(Color::Cyan),
        ])
        .load_preset(comfy_table::presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    for (label, probability) in rows {
        let color = if is_phishing_label(label) { Color::Red } else { Color::Green };
        let filled = (probability.clamp(0.0, 1.0) * BAR_WIDTH as f64).round() as usize;
        table.add_row(vec![
            Cell::new(label).fg(color),
            Cell::new(format!("{:.4}", probability)).set_alignment(CellAlignment::Right),
            Cell::new("█".repeat(filled)).fg(color),
        ]);
    }

    println!("{table}");
}

/// Prints the `GET /api/v1/model` response.
pub fn display_model_info(response: &Value) {
    if response.get("status").and_then(Value::as_str) != Some("success") {
        let message = response
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        println!("{} {}", "Model unavailable:".yellow(), message);
        return;
    }

    let Some(data) = response.get("data") else {
        println!("{}", "No model details in response".yellow());
        return;
    };

    let mut table = Table::new();
    table
        .load_preset(comfy_table::presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let field = |key: &str| match data.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        Some(other) => other.to_string(),
        None => "-".to_string(),
    };

    for (name, key) in [
        ("Source", "source"),
        ("Architecture", "architecture"),
        ("Labels", "labels"),
        ("Device", "device"),
        ("Max tokens", "max_length"),
        ("Loaded at", "loaded_at"),
    ] {
        table.add_row(vec![
            Cell::new(name).fg(Color::Cyan).add_attribute(Attribute::Bold),
            Cell::new(field(key)),
        ]);
    }

    println!("{table}");
}

/// Prints the sender, subject and heuristic indicators of an `.eml` file.
pub fn display_indicators(email: &EmailText, indicators: &Indicators) {
    let or_dash = |value: Option<&str>| value.filter(|v| !v.is_empty()).unwrap_or("-").to_string();
    let header = &indicators.header;
    let links = &indicators.links;

    let mut table = Table::new();
    table
        .load_preset(comfy_table::presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    for (name, value) in [
        ("From", or_dash(Some(email.from.as_str()))),
        ("Subject", or_dash(Some(email.subject.as_str()))),
        ("Reply-To domain", or_dash(header.reply_to_domain.as_deref())),
        ("Received hops", header.received_count.to_string()),
        ("Links", links.links.len().to_string()),
        ("Link domains", links.unique_domains.to_string()),
    ] {
        table.add_row(vec![
            Cell::new(name).fg(Color::Cyan).add_attribute(Attribute::Bold),
            Cell::new(value),
        ]);
    }
    for link in &links.mismatched {
        table.add_row(vec![
            Cell::new("Disguised link").fg(Color::Red).add_attribute(Attribute::Bold),
            Cell::new(format!("{} -> {}", link.displayed, link.actual)).fg(Color::Red),
        ]);
    }
    println!("{table}");

    let raised = indicators.raised();
    if raised.is_empty() {
        println!("{}", "No heuristic phishing indicators".green());
        return;
    }
    println!("{}", format!("Heuristic indicators ({}):", raised.len()).yellow().bold());
    for description in raised {
        println!("  {} {}", "!".red().bold(), description);
    }
}
