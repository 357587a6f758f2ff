pub mod group;
pub mod probe;

use std::collections::HashSet;

use serde_json::Value;

/// Bucket for every label that is not on the roster.
pub const OTHER_BUCKET: &str = "other";

const UNSAFE_FILENAME_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];
const MAX_LABEL_CHARS: usize = 200;

/// Enclosing pairs stripped from speaker labels, checked in this order.
const ENCLOSING_PAIRS: &[(char, char)] = &[('"', '"'), ('\'', '\''), ('(', ')'), ('《', '》')];

/// Coerce a raw speaker value to a trimmed label and drop one enclosing pair
/// of quotes, parentheses or 《》. Only the outermost layer is removed.
pub fn canonicalize(raw: &Value) -> Option<String> {
    let text = match raw {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    let label = text.trim();
    if label.is_empty() {
        return None;
    }

    let label = strip_enclosing(label).trim();
    if label.is_empty() {
        None
    } else {
        Some(label.to_string())
    }
}

fn strip_enclosing(s: &str) -> &str {
    for &(open, close) in ENCLOSING_PAIRS {
        if s.chars().count() >= 2 && s.starts_with(open) && s.ends_with(close) {
            return &s[open.len_utf8()..s.len() - close.len_utf8()];
        }
    }
    s
}

/// Make a label safe to use as a directory name.
pub fn sanitize_label(name: &str) -> String {
    let cleaned: String = name.chars().filter(|c| !UNSAFE_FILENAME_CHARS.contains(c)).collect();
    let cleaned = cleaned.trim();
    // "." and ".." would resolve outside the bucket directory.
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        return "unknown".to_string();
    }
    cleaned.chars().take(MAX_LABEL_CHARS).collect()
}

/// Closed set of accepted speakers, stored in sanitized form.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    names: HashSet<String>,
}

impl Roster {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = names
            .into_iter()
            .map(|n| n.as_ref().trim().to_string())
            .filter(|n| !n.is_empty())
            .map(|n| sanitize_label(&n))
            .collect();
        Roster { names }
    }

    /// Parse a comma-separated list, as given on the command line.
    pub fn from_csv_list(list: &str) -> Self {
        Roster::new(list.split(','))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Bucket name for a raw speaker value. Roster members keep their name,
    /// everything else goes to `other`. Numeric labels get no special
    /// acceptance: "9999" is a member only if the roster lists it.
    pub fn bucket_for(&self, raw: Option<&Value>) -> String {
        let Some(label) = raw.and_then(canonicalize) else {
            return OTHER_BUCKET.to_string();
        };
        let label = sanitize_label(&label);
        if self.contains(&label) {
            label
        } else {
            OTHER_BUCKET.to_string()
        }
    }
}
