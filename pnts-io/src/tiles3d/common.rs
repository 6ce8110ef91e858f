use nalgebra::{Vector3, Vector4};
use serde_json::{Map, Value};

use crate::{DecodeError, Result};

/// Parses a JSON header (e.g. FeatureTable or BatchTable header) from the raw bytes of its section. The
/// 3D Tiles standard pads these sections with trailing spaces to an 8-byte boundary, but some writers pad
/// with NUL bytes instead, so both are stripped before parsing. The root of the header has to be a JSON
/// object, whose key order is preserved in the returned map.
pub fn parse_json_header(bytes: &[u8], document: &'static str) -> Result<Map<String, Value>> {
    let malformed = |reason: String| DecodeError::MalformedJson { document, reason };

    let end = bytes
        .iter()
        .rposition(|&b| b != 0 && !b.is_ascii_whitespace())
        .map(|idx| idx + 1)
        .unwrap_or(0);
    let json_str = std::str::from_utf8(&bytes[..end]).map_err(|e| malformed(e.to_string()))?;
    let json: Value = serde_json::from_str(json_str).map_err(|e| malformed(e.to_string()))?;
    match json {
        Value::Object(obj) => Ok(obj),
        other => Err(malformed(format!(
            "expected a JSON object at the root, found {}",
            json_type_name(&other)
        ))),
    }
}

/// Human-readable name of the JSON type of `value`, used for diagnostics
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Converts a JSON array of three numbers into a `Vector3<f64>`
pub fn json_arr_to_vec3f64(array: &[Value]) -> Option<Vector3<f64>> {
    match array {
        [x, y, z] => Some(Vector3::new(x.as_f64()?, y.as_f64()?, z.as_f64()?)),
        _ => None,
    }
}

/// Converts a JSON array of three numbers into a `Vector3<f32>`
pub fn json_arr_to_vec3f32(array: &[Value]) -> Option<Vector3<f32>> {
    json_arr_to_vec3f64(array).map(|v| v.map(|c| c as f32))
}

/// Converts a JSON array of four integers in `[0;255]` into a `Vector4<u8>`
pub fn json_arr_to_vec4u8(array: &[Value]) -> Option<Vector4<u8>> {
    let to_u8 = |v: &Value| v.as_u64().and_then(|c| u8::try_from(c).ok());
    match array {
        [r, g, b, a] => Some(Vector4::new(to_u8(r)?, to_u8(g)?, to_u8(b)?, to_u8(a)?)),
        _ => None,
    }
}
