//! Natural key encoding
//!
//! A natural key is the combination of a row's natural-key field values. Two
//! encodings are supported:
//!
//! - [`KeyEncoding::Delimited`] joins the rendered values with `|`, treating
//!   missing and null fields as empty strings. `("a|b", "c")` and
//!   `("a", "b|c")` collide under this encoding.
//! - [`KeyEncoding::Canonical`] tags every value with its kind and length
//!   before hashing with SHA-256, so missing, null and empty values stay
//!   distinct and delimiters inside values cannot collide.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::models::{Row, display_text};

/// How natural keys are turned into lookup keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyEncoding {
    /// `"|"`-joined rendered values
    Delimited,
    /// Type-tagged, length-prefixed values hashed with SHA-256
    #[default]
    Canonical,
}

impl KeyEncoding {
    /// Encode the values of `fields` in `row`
    pub fn encode(&self, row: &Row, fields: &[String]) -> String {
        match self {
            KeyEncoding::Delimited => fields
                .iter()
                .map(|f| display_text(row.get(f)))
                .collect::<Vec<_>>()
                .join("|"),
            KeyEncoding::Canonical => {
                let mut hasher = Sha256::new();
                for field in fields {
                    hasher.update(canonical_part(row.get(field)).as_bytes());
                }
                format!("{:x}", hasher.finalize())
            }
        }
    }
}

fn canonical_part(value: Option<&Value>) -> String {
    let (tag, text) = match value {
        None => ('m', String::new()),
        Some(Value::Null) => ('n', String::new()),
        Some(Value::Bool(b)) => ('b', b.to_string()),
        // 5 and 5.0 are the same key
        Some(v @ Value::Number(_)) => ('d', display_text(Some(v))),
        Some(Value::String(s)) => ('s', s.clone()),
        Some(other) => ('j', other.to_string()),
    };
    format!("{tag}{}:{text};", text.len())
}
