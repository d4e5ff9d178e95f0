/*
 * Responsibility
 * - CLAIM_MAPPINGS の parse (`claim:header,claim2:header2`)
 * - decode 済み JSON claims -> header に載せる文字列 claims への変換
 *
 * Error is hand-written (no thiserror): only config loading consumes it.
 */
use std::collections::BTreeMap;
use std::{error::Error, fmt};

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimMappingError {
    MissingSeparator { entry: String },
    EmptyName { entry: String },
    DuplicateClaim { claim: String },
}

impl fmt::Display for ClaimMappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimMappingError::MissingSeparator { entry } => {
                write!(f, "claim mapping '{}' is not of the form claim:header", entry)
            }
            ClaimMappingError::EmptyName { entry } => {
                write!(f, "claim mapping '{}' has an empty claim or header", entry)
            }
            ClaimMappingError::DuplicateClaim { claim } => {
                write!(f, "claim '{}' is mapped more than once", claim)
            }
        }
    }
}

impl Error for ClaimMappingError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimMapping {
    pub claim: String,
    pub header: String,
}

/// Which claims are published, and under which header name.
///
/// Empty means "publish every claim under its own name".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimMappings(Vec<ClaimMapping>);

impl ClaimMappings {
    pub fn parse(raw: &str) -> Result<Self, ClaimMappingError> {
        let mut mappings: Vec<ClaimMapping> = Vec::new();

        for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (claim, header) =
                entry
                    .split_once(':')
                    .ok_or_else(|| ClaimMappingError::MissingSeparator {
                        entry: entry.to_string(),
                    })?;
            let (claim, header) = (claim.trim(), header.trim());
            if claim.is_empty() || header.is_empty() {
                return Err(ClaimMappingError::EmptyName {
                    entry: entry.to_string(),
                });
            }
            if mappings.iter().any(|m| m.claim == claim) {
                return Err(ClaimMappingError::DuplicateClaim {
                    claim: claim.to_string(),
                });
            }
            mappings.push(ClaimMapping {
                claim: claim.to_string(),
                header: header.to_string(),
            });
        }

        Ok(Self(mappings))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClaimMapping> {
        self.0.iter()
    }

    /// Turn a decoded JSON payload into the string claims a `Token` carries.
    pub fn apply(&self, payload: &Map<String, Value>) -> BTreeMap<String, String> {
        if self.is_empty() {
            return payload
                .iter()
                .filter_map(|(name, value)| claim_value(value).map(|v| (name.clone(), v)))
                .collect();
        }

        self.0
            .iter()
            .filter_map(|m| {
                payload
                    .get(&m.claim)
                    .and_then(claim_value)
                    .map(|v| (m.header.clone(), v))
            })
            .collect()
    }
}

// Strings verbatim, null dropped, everything else as compact JSON.
fn claim_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("payload must be an object"),
        }
    }

    #[test]
    fn parse_accepts_whitespace_and_trailing_commas() {
        let mappings = ClaimMappings::parse(" sub : x-user-id , email:x-email,").unwrap();
        let pairs: Vec<(&str, &str)> = mappings
            .iter()
            .map(|m| (m.claim.as_str(), m.header.as_str()))
            .collect();
        assert_eq!(pairs, vec![("sub", "x-user-id"), ("email", "x-email")]);
    }

    #[test]
    fn parse_empty_string_means_no_mappings() {
        assert!(ClaimMappings::parse("").unwrap().is_empty());
    }

    #[test]
    fn parse_rejects_malformed_entries() {
        assert_eq!(
            ClaimMappings::parse("sub"),
            Err(ClaimMappingError::MissingSeparator {
                entry: "sub".into()
            })
        );
        assert_eq!(
            ClaimMappings::parse("sub:"),
            Err(ClaimMappingError::EmptyName {
                entry: "sub:".into()
            })
        );
        assert_eq!(
            ClaimMappings::parse("sub:a,sub:b"),
            Err(ClaimMappingError::DuplicateClaim { claim: "sub".into() })
        );
    }

    #[test]
    fn without_mappings_every_non_null_claim_is_kept() {
        let claims = ClaimMappings::default().apply(&payload(json!({
            "sub": "u1",
            "admin": true,
            "exp": 1700000000,
            "roles": ["a", "b"],
            "gone": null,
        })));

        assert_eq!(claims.get("sub").map(String::as_str), Some("u1"));
        assert_eq!(claims.get("admin").map(String::as_str), Some("true"));
        assert_eq!(claims.get("exp").map(String::as_str), Some("1700000000"));
        assert_eq!(claims.get("roles").map(String::as_str), Some(r#"["a","b"]"#));
        assert!(!claims.contains_key("gone"));
    }

    #[test]
    fn mappings_select_and_rename() {
        let mappings = ClaimMappings::parse("sub:x-user-id,tenant:x-tenant").unwrap();
        let claims = mappings.apply(&payload(json!({"sub": "u1", "role": "admin"})));

        assert_eq!(claims.len(), 1);
        assert_eq!(claims.get("x-user-id").map(String::as_str), Some("u1"));
    }
}
