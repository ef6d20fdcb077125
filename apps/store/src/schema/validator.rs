//! Local evaluation of a `$jsonSchema` validator tree.
//!
//! Semantics mirror the store: `bsonType` is strict, `required` keys must be
//! present, `enum` is a closed set, and undeclared keys are always allowed.
#![allow(dead_code)]

use std::fmt;

use bson::{Bson, Document};
use serde::Serialize;

use super::FieldSchema;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    MissingRequired,
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    NotInEnum {
        value: String,
    },
    /// The store rejected the write and only supplied a message.
    StoreReported {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub path: String,
    #[serde(flatten)]
    pub kind: ViolationKind,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ViolationKind::MissingRequired => write!(f, "{}: required field missing", self.path),
            ViolationKind::TypeMismatch { expected, found } => {
                write!(f, "{}: expected {expected}, found {found}", self.path)
            }
            ViolationKind::NotInEnum { value } => {
                write!(f, "{}: '{value}' is not an allowed value", self.path)
            }
            ViolationKind::StoreReported { message } => write!(f, "{}: {message}", self.path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn store_reported(message: impl Into<String>) -> Self {
        Self {
            violations: vec![Violation {
                path: "$".to_string(),
                kind: ViolationKind::StoreReported {
                    message: message.into(),
                },
            }],
        }
    }

    pub fn has_violation_at(&self, path: &str) -> bool {
        self.violations.iter().any(|v| v.path == path)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.violations.iter().map(|v| v.to_string()).collect();
        f.write_str(&parts.join("; "))
    }
}

/// Checks `document` against `schema`, collecting every violation.
pub fn validate(schema: &FieldSchema, document: &Document) -> Result<(), ValidationReport> {
    let mut violations = Vec::new();
    check_document(schema, document, "", &mut violations);

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationReport { violations })
    }
}

fn check_value(schema: &FieldSchema, value: &Bson, path: &str, out: &mut Vec<Violation>) {
    if !schema.bson_type.matches(value) {
        out.push(Violation {
            path: path.to_string(),
            kind: ViolationKind::TypeMismatch {
                expected: schema.bson_type.as_str(),
                found: bson_type_name(value),
            },
        });
        return;
    }

    if !schema.allowed.is_empty() {
        let allowed = matches!(value, Bson::String(s) if schema.allowed.iter().any(|a| a == s));
        if !allowed {
            out.push(Violation {
                path: path.to_string(),
                kind: ViolationKind::NotInEnum {
                    value: display_value(value),
                },
            });
        }
    }

    match value {
        Bson::Document(doc) => check_document(schema, doc, path, out),
        Bson::Array(items) => {
            if let Some(item_schema) = &schema.items {
                for (i, item) in items.iter().enumerate() {
                    check_value(item_schema, item, &format!("{path}[{i}]"), out);
                }
            }
        }
        _ => {}
    }
}

fn check_document(schema: &FieldSchema, doc: &Document, path: &str, out: &mut Vec<Violation>) {
    for key in &schema.required {
        if !doc.contains_key(key) {
            out.push(Violation {
                path: join(path, key),
                kind: ViolationKind::MissingRequired,
            });
        }
    }

    for (key, field) in &schema.properties {
        if let Some(value) = doc.get(key) {
            check_value(field, value, &join(path, key), out);
        }
    }
}

fn join(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn display_value(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Document(_) => "object",
        Bson::Array(_) => "array",
        Bson::Boolean(_) => "bool",
        Bson::Null => "null",
        Bson::Int32(_) => "int",
        Bson::Int64(_) => "long",
        Bson::DateTime(_) => "date",
        Bson::ObjectId(_) => "objectId",
        Bson::Decimal128(_) => "decimal",
        Bson::Timestamp(_) => "timestamp",
        Bson::Binary(_) => "binData",
        _ => "other",
    }
}
