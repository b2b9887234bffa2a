//! Field definitions and validation.
//!
//! Fields are registered by the hosting UI. Every change is validated
//! against its field before it is queued; a form is valid when all of its
//! fields are.

use crate::{error::Result, Error, FieldModel, FieldPath};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Value types a field may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Int,
    Float,
    Bool,
    /// Arbitrary nested JSON
    Json,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::String => write!(f, "String"),
            FieldType::Int => write!(f, "Int"),
            FieldType::Float => write!(f, "Float"),
            FieldType::Bool => write!(f, "Bool"),
            FieldType::Json => write!(f, "Json"),
        }
    }
}

impl std::str::FromStr for FieldType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "string" => Ok(FieldType::String),
            "int" => Ok(FieldType::Int),
            "float" => Ok(FieldType::Float),
            "bool" => Ok(FieldType::Bool),
            "json" => Ok(FieldType::Json),
            other => Err(Error::InvalidConfig(format!("unknown field type: {other}"))),
        }
    }
}

/// Extra checks applied after the type check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Constraint {
    /// Minimum string length in characters
    MinLength { min: usize },
    /// Maximum string length in characters
    MaxLength { max: usize },
    /// Inclusive lower bound for numbers
    Min { min: f64 },
    /// Inclusive upper bound for numbers
    Max { max: f64 },
    /// Value must equal one of the options
    OneOf { options: Vec<Value> },
}

impl Constraint {
    fn check(&self, field: &str, value: &Value) -> Result<()> {
        let violation = match self {
            Constraint::MinLength { min } => value
                .as_str()
                .filter(|s| s.chars().count() < *min)
                .map(|_| format!("shorter than {min} characters")),
            Constraint::MaxLength { max } => value
                .as_str()
                .filter(|s| s.chars().count() > *max)
                .map(|_| format!("longer than {max} characters")),
            Constraint::Min { min } => value
                .as_f64()
                .filter(|n| n < min)
                .map(|_| format!("less than {min}")),
            Constraint::Max { max } => value
                .as_f64()
                .filter(|n| n > max)
                .map(|_| format!("greater than {max}")),
            Constraint::OneOf { options } => {
                (!options.contains(value)).then(|| "not one of the allowed options".to_string())
            }
        };

        match violation {
            Some(reason) => Err(Error::ConstraintViolation {
                field: field.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

/// Definition of a bound form field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    /// Dot-delimited path of the field
    pub path: FieldPath,
    /// Field type
    pub field_type: FieldType,
    /// Whether an empty value is rejected
    pub required: bool,
    /// Additional constraints
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
}

impl FieldDef {
    /// Create a new required field definition.
    pub fn required(path: impl Into<FieldPath>, field_type: FieldType) -> Self {
        Self {
            path: path.into(),
            field_type,
            required: true,
            constraints: Vec::new(),
        }
    }

    /// Create a new optional field definition.
    pub fn optional(path: impl Into<FieldPath>, field_type: FieldType) -> Self {
        Self {
            path: path.into(),
            field_type,
            required: false,
            constraints: Vec::new(),
        }
    }

    /// Add a constraint.
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Validate a value against this field definition.
    ///
    /// Required fields reject missing values, `null` and empty strings.
    pub fn validate(&self, value: Option<&Value>) -> Result<()> {
        let value = match value {
            None | Some(Value::Null) if self.required => {
                return Err(Error::MissingRequiredField(self.path.clone()))
            }
            None | Some(Value::Null) => return Ok(()),
            Some(Value::String(s)) if self.required && s.is_empty() => {
                return Err(Error::MissingRequiredField(self.path.clone()))
            }
            Some(v) => v,
        };

        self.validate_type(value)?;
        for constraint in &self.constraints {
            constraint.check(&self.path, value)?;
        }
        Ok(())
    }

    fn validate_type(&self, value: &Value) -> Result<()> {
        let valid = match self.field_type {
            FieldType::String => value.is_string(),
            FieldType::Int => value.is_i64() || value.is_u64(),
            FieldType::Float => value.is_number(),
            FieldType::Bool => value.is_boolean(),
            FieldType::Json => true,
        };

        if valid {
            Ok(())
        } else {
            Err(Error::TypeMismatch {
                field: self.path.clone(),
                expected: self.field_type.to_string(),
                got: json_type_name(value).to_string(),
            })
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "Null",
        Value::Bool(_) => "Bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "Int",
        Value::Number(_) => "Float",
        Value::String(_) => "String",
        Value::Array(_) => "Array",
        Value::Object(_) => "Object",
    }
}

/// The registry of fields bound to a form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSet {
    fields: BTreeMap<FieldPath, FieldDef>,
}

impl FieldSet {
    /// Create an empty field set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration.
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.register(field);
        self
    }

    /// Register a field, replacing any definition at the same path.
    pub fn register(&mut self, field: FieldDef) -> Option<FieldDef> {
        self.fields.insert(field.path.clone(), field)
    }

    /// Unregister a field.
    pub fn unregister(&mut self, path: &str) -> Option<FieldDef> {
        self.fields.remove(path)
    }

    /// Get a field definition.
    pub fn get(&self, path: &str) -> Option<&FieldDef> {
        self.fields.get(path)
    }

    /// Check if a field is registered.
    pub fn contains(&self, path: &str) -> bool {
        self.fields.contains_key(path)
    }

    /// Registered paths in order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Number of registered fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if no field is registered.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Validate a change to one field.
    pub fn validate(&self, path: &str, value: &Value) -> Result<()> {
        self.fields
            .get(path)
            .ok_or_else(|| Error::UnknownField(path.to_string()))?
            .validate(Some(value))
    }

    /// Validate every field against a model.
    ///
    /// All fields are checked; the result lists every failure, so the form
    /// is valid exactly when the list is empty.
    pub fn validate_all(&self, model: &FieldModel) -> Vec<Error> {
        self.fields
            .values()
            .filter_map(|field| field.validate(model.get(&field.path)).err())
            .collect()
    }
}
