//! Data schemas: the shape descriptor attached to property values, action
//! inputs/outputs and event payloads.
//!
//! This is the JSON-schema subset used by Thing Descriptions: a primitive
//! `type`, `const`/`enum` restrictions, numeric bounds, array items and object
//! members.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON value category a schema accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Array,
    Object,
}

impl DataType {
    /// Whether `value` belongs to this category.
    ///
    /// Integers are numbers without a fractional part, so `25.0` is a valid
    /// integer while `25.5` is not.
    #[must_use]
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::Null => value.is_null(),
            Self::Boolean => value.is_boolean(),
            Self::Integer => value.as_f64().is_some_and(|n| n.fract() == 0.0),
            Self::Number => value.is_number(),
            Self::String => value.is_string(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        };
        f.write_str(name)
    }
}

/// The first rule a value broke, with the location of the offending member.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaViolation {
    #[error("{path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: DataType,
        found: &'static str,
    },

    #[error("{path}: value does not match the constant")]
    ConstMismatch { path: String },

    #[error("{path}: value is not one of the allowed values")]
    NotInEnum { path: String },

    #[error("{path}: {value} is below the minimum {minimum}")]
    BelowMinimum {
        path: String,
        value: f64,
        minimum: f64,
    },

    #[error("{path}: {value} is above the maximum {maximum}")]
    AboveMaximum {
        path: String,
        value: f64,
        maximum: f64,
    },

    #[error("{path}: missing required member {name:?}")]
    MissingMember { path: String, name: String },
}

/// Shape descriptor for interaction payloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSchema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "const", default, skip_serializing_if = "Option::is_none")]
    pub constant: Option<Value>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<DataSchema>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, DataSchema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl DataSchema {
    /// A schema restricted to one [`DataType`].
    #[must_use]
    pub fn of(data_type: DataType) -> Self {
        Self {
            data_type: Some(data_type),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn boolean() -> Self {
        Self::of(DataType::Boolean)
    }

    #[must_use]
    pub fn integer() -> Self {
        Self::of(DataType::Integer)
    }

    #[must_use]
    pub fn number() -> Self {
        Self::of(DataType::Number)
    }

    #[must_use]
    pub fn string() -> Self {
        Self::of(DataType::String)
    }

    #[must_use]
    pub fn object() -> Self {
        Self::of(DataType::Object)
    }

    #[must_use]
    pub fn array(items: DataSchema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::of(DataType::Array)
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn constant(mut self, value: Value) -> Self {
        self.constant = Some(value);
        self
    }

    #[must_use]
    pub fn one_of(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.one_of = Some(values.into_iter().collect());
        self
    }

    #[must_use]
    pub fn minimum(mut self, minimum: f64) -> Self {
        self.minimum = Some(minimum);
        self
    }

    #[must_use]
    pub fn maximum(mut self, maximum: f64) -> Self {
        self.maximum = Some(maximum);
        self
    }

    /// Declare an object member.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, schema: DataSchema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Mark an object member as mandatory.
    #[must_use]
    pub fn require(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    /// Check `value` against this schema.
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaViolation`] found, depth-first.
    pub fn validate(&self, value: &Value) -> Result<(), SchemaViolation> {
        self.validate_at(value, "")
    }

    fn validate_at(&self, value: &Value, path: &str) -> Result<(), SchemaViolation> {
        let here = || {
            if path.is_empty() {
                "/".to_string()
            } else {
                path.to_string()
            }
        };

        if let Some(expected) = self.data_type
            && !expected.matches(value)
        {
            return Err(SchemaViolation::TypeMismatch {
                path: here(),
                expected,
                found: json_type_name(value),
            });
        }
        if let Some(constant) = &self.constant
            && constant != value
        {
            return Err(SchemaViolation::ConstMismatch { path: here() });
        }
        if let Some(allowed) = &self.one_of
            && !allowed.contains(value)
        {
            return Err(SchemaViolation::NotInEnum { path: here() });
        }
        if let Some(number) = value.as_f64() {
            if let Some(minimum) = self.minimum.filter(|min| number < *min) {
                return Err(SchemaViolation::BelowMinimum {
                    path: here(),
                    value: number,
                    minimum,
                });
            }
            if let Some(maximum) = self.maximum.filter(|max| number > *max) {
                return Err(SchemaViolation::AboveMaximum {
                    path: here(),
                    value: number,
                    maximum,
                });
            }
        }
        match value {
            Value::Array(elements) => {
                if let Some(items) = &self.items {
                    for (index, element) in elements.iter().enumerate() {
                        items.validate_at(element, &format!("{path}/{index}"))?;
                    }
                }
            }
            Value::Object(members) => {
                if let Some(name) = self.required.iter().find(|n| !members.contains_key(*n)) {
                    return Err(SchemaViolation::MissingMember {
                        path: here(),
                        name: name.clone(),
                    });
                }
                for (name, schema) in &self.properties {
                    if let Some(member) = members.get(name) {
                        schema.validate_at(member, &format!("{path}/{name}"))?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn should_accept_value_of_declared_type() {
        assert!(DataSchema::number().validate(&json!(21.5)).is_ok());
        assert!(DataSchema::string().validate(&json!("on")).is_ok());
        assert!(DataSchema::boolean().validate(&json!(true)).is_ok());
    }

    #[test]
    fn should_reject_value_of_other_type() {
        let err = DataSchema::number().validate(&json!("hot")).unwrap_err();
        assert_eq!(
            err,
            SchemaViolation::TypeMismatch {
                path: "/".to_string(),
                expected: DataType::Number,
                found: "string",
            }
        );
    }

    #[test]
    fn should_accept_whole_float_as_integer() {
        assert!(DataSchema::integer().validate(&json!(25.0)).is_ok());
        assert!(DataSchema::integer().validate(&json!(25.5)).is_err());
    }

    #[test]
    fn should_accept_anything_when_type_is_absent() {
        let schema = DataSchema::default();
        assert!(schema.validate(&json!(null)).is_ok());
        assert!(schema.validate(&json!({"a": [1, 2]})).is_ok());
    }

    #[test]
    fn should_enforce_numeric_bounds() {
        let schema = DataSchema::number().minimum(-40.0).maximum(125.0);
        assert!(schema.validate(&json!(20)).is_ok());
        assert!(matches!(
            schema.validate(&json!(-41)),
            Err(SchemaViolation::BelowMinimum { .. })
        ));
        assert!(matches!(
            schema.validate(&json!(200)),
            Err(SchemaViolation::AboveMaximum { .. })
        ));
    }

    #[test]
    fn should_enforce_enum_and_const() {
        let schema = DataSchema::string().one_of([json!("on"), json!("off")]);
        assert!(schema.validate(&json!("on")).is_ok());
        assert!(matches!(
            schema.validate(&json!("dim")),
            Err(SchemaViolation::NotInEnum { .. })
        ));

        let constant = DataSchema::default().constant(json!(42));
        assert!(constant.validate(&json!(42)).is_ok());
        assert!(constant.validate(&json!(43)).is_err());
    }

    #[test]
    fn should_report_nested_path_for_object_members() {
        let schema = DataSchema::object()
            .property("color", DataSchema::object().property("r", DataSchema::integer()))
            .require("color");

        let err = schema.validate(&json!({"color": {"r": "red"}})).unwrap_err();
        assert!(matches!(err, SchemaViolation::TypeMismatch { ref path, .. } if path == "/color/r"));

        let missing = schema.validate(&json!({})).unwrap_err();
        assert!(matches!(missing, SchemaViolation::MissingMember { ref name, .. } if name == "color"));
    }

    #[test]
    fn should_validate_every_array_item() {
        let schema = DataSchema::array(DataSchema::integer());
        assert!(schema.validate(&json!([1, 2, 3])).is_ok());
        let err = schema.validate(&json!([1, "two"])).unwrap_err();
        assert!(matches!(err, SchemaViolation::TypeMismatch { ref path, .. } if path == "/1"));
    }

    #[test]
    fn should_serialize_in_thing_description_shape() {
        let schema = DataSchema::number().minimum(0.0).description("Brightness");
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(
            json,
            json!({"type": "number", "minimum": 0.0, "description": "Brightness"})
        );
    }

    #[test]
    fn should_deserialize_enum_and_const_keywords() {
        let schema: DataSchema =
            serde_json::from_value(json!({"type": "string", "enum": ["a", "b"]})).unwrap();
        assert_eq!(schema.data_type, Some(DataType::String));
        assert_eq!(schema.one_of, Some(vec![json!("a"), json!("b")]));
    }
}
