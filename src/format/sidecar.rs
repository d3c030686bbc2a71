//! Sidecar (`metadata.txt`) parsing and serialization.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::DatasetError;

/// Parse sidecar text into its top-level object.
///
/// Some producers leave the final closing brace off the file. When the text
/// fails to parse, one more attempt is made with a single `}` appended; if that
/// also fails the original parse error is reported.
///
/// # Errors
///
/// Returns [`DatasetError::Format`] if neither attempt yields a JSON object.
pub fn parse(path: &str, text: &str) -> Result<Map<String, Value>, DatasetError> {
    let value = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(first) => {
            let repaired = format!("{}}}", text);
            match serde_json::from_str::<Value>(&repaired) {
                Ok(value) => {
                    warn!(path = %path, "Sidecar file was missing its closing brace, repaired");
                    value
                }
                Err(_) => {
                    return Err(DatasetError::Format {
                        path: path.to_string(),
                        message: first.to_string(),
                    })
                }
            }
        }
    };

    match value {
        Value::Object(map) => Ok(map),
        other => Err(DatasetError::Format {
            path: path.to_string(),
            message: format!("top-level value is not an object: {}", type_name(&other)),
        }),
    }
}

/// Serialize a metadata map as sidecar text (4-space indent).
pub fn to_string(metadata: &Map<String, Value>) -> Result<String, DatasetError> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    metadata
        .serialize(&mut serializer)
        .map_err(|e| DatasetError::Metadata(format!("failed to serialize metadata: {}", e)))?;
    String::from_utf8(out)
        .map_err(|e| DatasetError::Metadata(format!("serialized metadata is not UTF-8: {}", e)))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
