//! Versioned JSON documents for persisted files.
//!
//! Every file accepts either a bare payload (hand-written configuration) or
//! an envelope carrying `schema_version`:
//!
//! ```json
//! {"schema_version": "1.0.0", "profiles": [["hw1", 3], ["hw2", "*"]]}
//! {"schema_version": "1.0.0", "specs": [["disk", "$disk", "size", "gt(100)"]]}
//! {"schema_version": "1.0.0", "records": [{"hostname": "node1"}]}
//! {"generate": {"hostname": "node1-12", "ip": "10.0.0.1-12"}}
//! ```
//!
//! Rendering always produces the envelope form.

use crate::fact::Spec;
use crate::profile::ProfileEntry;
use crate::schema::SCHEMA_VERSION;
use crate::Record;
use serde_json::Value;
use thiserror::Error;

/// Key marking a CMDB file as a generator template.
pub const GENERATE_KEY: &str = "generate";

/// Errors decoding or encoding a persisted document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("schema version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },

    #[error("expected {expected}")]
    Shape { expected: &'static str },
}

/// Contents of a `.cmdb` file.
#[derive(Debug, Clone, PartialEq)]
pub enum CmdbDocument {
    /// Concrete record list.
    Records(Vec<Record>),
    /// A template to expand into records.
    Template(Record),
}

impl CmdbDocument {
    pub fn is_template(&self) -> bool {
        matches!(self, CmdbDocument::Template(_))
    }
}

/// Strip the envelope (if any) and return the payload stored under `field`.
fn unwrap_envelope(value: Value, field: &'static str) -> Result<Value, DocumentError> {
    match value {
        Value::Array(_) => Ok(value),
        Value::Object(mut map) => {
            let version = match map.remove("schema_version") {
                Some(Value::String(v)) => v,
                Some(other) => other.to_string(),
                None => return Err(DocumentError::Shape { expected: "a schema_version field" }),
            };
            if version != SCHEMA_VERSION {
                return Err(DocumentError::VersionMismatch {
                    expected: SCHEMA_VERSION.to_string(),
                    actual: version,
                });
            }
            map.remove(field).ok_or(DocumentError::Shape { expected: field })
        }
        _ => Err(DocumentError::Shape {
            expected: "a JSON array or a versioned object",
        }),
    }
}

fn envelope(field: &str, payload: Value) -> Value {
    let mut map = serde_json::Map::new();
    map.insert(
        "schema_version".to_string(),
        Value::String(SCHEMA_VERSION.to_string()),
    );
    map.insert(field.to_string(), payload);
    Value::Object(map)
}

/// Decode a state file.
pub fn parse_state(content: &str) -> Result<Vec<ProfileEntry>, DocumentError> {
    let value: Value = serde_json::from_str(content)?;
    let payload = unwrap_envelope(value, "profiles")?;
    Ok(serde_json::from_value(payload)?)
}

/// Encode a state file.
pub fn render_state(entries: &[ProfileEntry]) -> Result<String, DocumentError> {
    let payload = serde_json::to_value(entries)?;
    Ok(serde_json::to_string_pretty(&envelope("profiles", payload))?)
}

/// Decode a `.specs` file.
pub fn parse_specs(content: &str) -> Result<Vec<Spec>, DocumentError> {
    let value: Value = serde_json::from_str(content)?;
    let payload = unwrap_envelope(value, "specs")?;
    Ok(serde_json::from_value(payload)?)
}

/// Encode a `.specs` file.
pub fn render_specs(specs: &[Spec]) -> Result<String, DocumentError> {
    let payload = serde_json::to_value(specs)?;
    Ok(serde_json::to_string_pretty(&envelope("specs", payload))?)
}

/// Decode a `.cmdb` file.
pub fn parse_cmdb(content: &str) -> Result<CmdbDocument, DocumentError> {
    let value: Value = serde_json::from_str(content)?;
    if let Value::Object(map) = &value {
        if map.len() == 1 {
            if let Some(template) = map.get(GENERATE_KEY) {
                return match template {
                    Value::Object(model) => Ok(CmdbDocument::Template(model.clone())),
                    _ => Err(DocumentError::Shape {
                        expected: "an object under \"generate\"",
                    }),
                };
            }
        }
    }
    let payload = unwrap_envelope(value, "records")?;
    Ok(CmdbDocument::Records(serde_json::from_value(payload)?))
}

/// Encode a `.cmdb` file.
pub fn render_cmdb(records: &[Record]) -> Result<String, DocumentError> {
    let payload = serde_json::to_value(records)?;
    Ok(serde_json::to_string_pretty(&envelope("records", payload))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Quota;

    #[test]
    fn state_accepts_bare_and_envelope() {
        let bare = parse_state(r#"[["hw1", 3], ["hw2", "*"]]"#).unwrap();
        let wrapped =
            parse_state(r#"{"schema_version": "1.0.0", "profiles": [["hw1", 3], ["hw2", "*"]]}"#)
                .unwrap();
        assert_eq!(bare, wrapped);
        assert_eq!(bare[1].quota, Quota::Unlimited);
    }

    #[test]
    fn state_rejects_other_versions() {
        let err = parse_state(r#"{"schema_version": "9.9.9", "profiles": []}"#).unwrap_err();
        assert!(matches!(err, DocumentError::VersionMismatch { .. }));
    }

    #[test]
    fn state_rejects_executable_literals() {
        assert!(parse_state("[('hw1', 3)]").is_err());
        assert!(parse_state("__import__('os').system('true')").is_err());
    }

    #[test]
    fn render_state_writes_envelope() {
        let rendered = render_state(&[ProfileEntry::new("hw", Quota::Remaining(2))]).unwrap();
        let value: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["schema_version"], SCHEMA_VERSION);
        assert_eq!(value["profiles"][0][0], "hw");
        assert_eq!(value["profiles"][0][1], 2);
    }

    #[test]
    fn specs_parse_four_tuples() {
        let specs = parse_specs(r#"[["disk", "$disk", "size", "gt(100)"]]"#).unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].value(), "gt(100)");
        assert!(parse_specs(r#"[["disk", "$disk", "size"]]"#).is_err());
    }

    #[test]
    fn rendered_specs_parse_back() {
        let specs = vec![
            Spec::new("disk", "$disk", "size", "gt(100)"),
            Spec::new("network", "eth0", "serial", "$$mac"),
        ];
        let rendered = render_specs(&specs).unwrap();
        assert!(rendered.contains("\"specs\""));
        assert_eq!(parse_specs(&rendered).unwrap(), specs);
    }

    #[test]
    fn cmdb_template_is_recognized() {
        let doc = parse_cmdb(r#"{"generate": {"hostname": "node1-3"}}"#).unwrap();
        assert!(doc.is_template());
        let doc = parse_cmdb(r#"[{"hostname": "node1"}]"#).unwrap();
        assert!(!doc.is_template());
    }

    #[test]
    fn cmdb_envelope_round_trip() {
        let mut rec = Record::new();
        rec.insert("hostname".into(), Value::String("node1".into()));
        rec.insert("used".into(), Value::from(1));
        let rendered = render_cmdb(std::slice::from_ref(&rec)).unwrap();
        match parse_cmdb(&rendered).unwrap() {
            CmdbDocument::Records(records) => assert_eq!(records, vec![rec]),
            CmdbDocument::Template(_) => panic!("expected records"),
        }
    }
}
