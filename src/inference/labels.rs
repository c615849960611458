use std::collections::BTreeMap;
use std::fmt;

/// Head names of the default public checkpoint, in logit order.
pub const FOUR_CLASS_LABELS: [&str; 4] = [
    "legitimate_email",
    "phishing_url",
    "legitimate_url",
    "phishing_url_alt",
];

/// Head names bound when a fine-tuned checkpoint is loaded from a local path.
pub const TWO_CLASS_LABELS: [&str; 2] = ["benign", "phishing"];

/// The set of output names for a classification head, resolved once when the
/// model is loaded and fixed for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelScheme {
    FourClass,
    TwoClass,
    Generic(usize),
}

impl LabelScheme {
    pub fn from_num_labels(num_labels: usize) -> Self {
        match num_labels {
            4 => LabelScheme::FourClass,
            2 => LabelScheme::TwoClass,
            n => LabelScheme::Generic(n),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            LabelScheme::FourClass => FOUR_CLASS_LABELS.len(),
            LabelScheme::TwoClass => TWO_CLASS_LABELS.len(),
            LabelScheme::Generic(n) => *n,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name of the output at `index`, or `None` past the end of the head.
    pub fn name(&self, index: usize) -> Option<String> {
        match self {
            LabelScheme::FourClass => FOUR_CLASS_LABELS.get(index).map(|s| s.to_string()),
            LabelScheme::TwoClass => TWO_CLASS_LABELS.get(index).map(|s| s.to_string()),
            LabelScheme::Generic(n) if index < *n => Some(format!("class_{}", index)),
            LabelScheme::Generic(_) => None,
        }
    }

    pub fn names(&self) -> Vec<String> {
        (0..self.len()).filter_map(|i| self.name(i)).collect()
    }

    pub fn id2label(&self) -> BTreeMap<usize, String> {
        self.names().into_iter().enumerate().collect()
    }
}

impl fmt::Display for LabelScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelScheme::FourClass => write!(f, "four-class"),
            LabelScheme::TwoClass => write!(f, "two-class"),
            LabelScheme::Generic(n) => write!(f, "generic({})", n),
        }
    }
}
