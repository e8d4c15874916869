//! Tool domain traits
//!
//! Contains pure domain logic for validating an invocation body against a
//! tool's declared parameters. Validation runs before any credential lookup
//! or runtime dispatch, so a malformed body never costs a session-store read.

use super::entities::ToolDescriptor;

/// Validator for invocation bodies
pub trait ToolValidator {
    /// Validate a JSON body against a tool's parameter declarations
    fn validate(&self, body: &serde_json::Value, descriptor: &ToolDescriptor)
    -> Result<(), String>;
}

/// Default implementation of ToolValidator
#[derive(Debug, Clone, Default)]
pub struct DefaultToolValidator;

impl DefaultToolValidator {
    fn type_matches(param_type: &str, value: &serde_json::Value) -> bool {
        match param_type {
            "string" => value.is_string(),
            "number" => value.is_number(),
            "boolean" => value.is_boolean(),
            "object" => value.is_object(),
            "array" => value.is_array(),
            _ => true,
        }
    }
}

impl ToolValidator for DefaultToolValidator {
    fn validate(
        &self,
        body: &serde_json::Value,
        descriptor: &ToolDescriptor,
    ) -> Result<(), String> {
        // A null body stands in for an empty object
        let empty = serde_json::Map::new();
        let fields = match body {
            serde_json::Value::Null => &empty,
            serde_json::Value::Object(map) => map,
            other => {
                return Err(format!(
                    "Body for tool '{}' must be a JSON object, got {}",
                    descriptor.name,
                    json_type_name(other)
                ));
            }
        };

        for param in &descriptor.parameters {
            match fields.get(&param.name) {
                None if param.required => {
                    return Err(format!(
                        "Missing required parameter '{}' for tool '{}'",
                        param.name, descriptor.name
                    ));
                }
                Some(value) if !Self::type_matches(&param.param_type, value) => {
                    return Err(format!(
                        "Parameter '{}' for tool '{}' must be a {}",
                        param.name, descriptor.name, param.param_type
                    ));
                }
                _ => {}
            }
        }

        let valid_params: std::collections::HashSet<&str> =
            descriptor.parameters.iter().map(|p| p.name.as_str()).collect();

        for field in fields.keys() {
            if !valid_params.contains(field.as_str()) {
                return Err(format!(
                    "Unknown parameter '{}' for tool '{}'",
                    field, descriptor.name
                ));
            }
        }

        Ok(())
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::entities::{ToolParameter, ToolSource};
    use serde_json::json;

    fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "post_message",
            "Post a message",
            ToolSource::Program {
                program: "post".into(),
                args: vec![],
            },
        )
        .with_parameter(ToolParameter::new("channel", "Target channel", true))
        .with_parameter(ToolParameter::new("count", "Repeat count", false).with_type("number"))
    }

    #[test]
    fn test_validator_missing_required() {
        let result = DefaultToolValidator.validate(&json!({}), &descriptor());
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("Missing required parameter"));
    }

    #[test]
    fn test_validator_unknown_param() {
        let body = json!({"channel": "#general", "nope": 1});
        let result = DefaultToolValidator.validate(&body, &descriptor());
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("Unknown parameter"));
    }

    #[test]
    fn test_validator_type_mismatch() {
        let body = json!({"channel": "#general", "count": "three"});
        let result = DefaultToolValidator.validate(&body, &descriptor());
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("must be a number"));
    }

    #[test]
    fn test_validator_valid_body() {
        let body = json!({"channel": "#general", "count": 3});
        assert!(DefaultToolValidator.validate(&body, &descriptor()).is_ok());
    }

    #[test]
    fn test_validator_null_body_with_no_required_params() {
        let tool = ToolDescriptor::new(
            "ping",
            "No-argument tool",
            ToolSource::Program {
                program: "ping".into(),
                args: vec![],
            },
        );
        assert!(DefaultToolValidator.validate(&serde_json::Value::Null, &tool).is_ok());
    }

    #[test]
    fn test_validator_rejects_non_object_body() {
        let result = DefaultToolValidator.validate(&json!([1, 2]), &descriptor());
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("must be a JSON object"));
    }
}
