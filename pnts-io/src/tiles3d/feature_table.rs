use std::collections::BTreeMap;

use nalgebra::{Vector3, Vector4};
use serde_json::{Map, Value};

use super::{
    component_type_from_name, json_arr_to_vec3f32, json_arr_to_vec3f64, json_arr_to_vec4u8,
    json_type_name, parse_json_header, ComponentType,
};
use crate::{DecodeError, Result};

/// Name of the 3D Tiles extension for Draco-compressed point clouds
pub const DRACO_POINT_COMPRESSION_EXTENSION: &str = "3DTILES_draco_point_compression";

/// The parsed `3DTILES_draco_point_compression` extension object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DracoPointCompression {
    /// Maps point semantics (e.g. `POSITION`, `RGB`) to the unique IDs of the Draco attributes that store them
    pub properties: BTreeMap<String, u32>,
    /// Offset of the compressed block inside the FeatureTable binary body, if declared
    pub byte_offset: Option<u32>,
    /// Length of the compressed block, if declared
    pub byte_length: Option<u32>,
}

/// All point semantics and global semantics of a .pnts FeatureTable that the decoder understands. Every
/// field is only set if the corresponding key is present in the FeatureTable JSON
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTableProperties {
    pub points_length: Option<u32>,
    pub position_byte_offset: Option<u32>,
    pub position_quantized_byte_offset: Option<u32>,
    pub normal_byte_offset: Option<u32>,
    pub rgb_byte_offset: Option<u32>,
    pub rgba_byte_offset: Option<u32>,
    pub batch_id_byte_offset: Option<u32>,
    pub batch_id_component_type: Option<ComponentType>,
    pub rtc_center: Option<Vector3<f64>>,
    pub quantized_volume_offset: Option<Vector3<f32>>,
    pub quantized_volume_scale: Option<Vector3<f32>>,
    pub constant_rgba: Option<Vector4<u8>>,
    pub batch_length: Option<u32>,
    /// Names of all extensions used by the FeatureTable, with the raw extension objects
    pub extensions: BTreeMap<String, Value>,
    pub draco_compression: Option<DracoPointCompression>,
}

impl FeatureTableProperties {
    /// Does the FeatureTable declare Draco compression of the point data?
    pub fn has_draco_compression(&self) -> bool {
        self.extensions
            .contains_key(DRACO_POINT_COMPRESSION_EXTENSION)
    }
}

/// Parses the FeatureTable JSON header of a .pnts file. `POINTS_LENGTH` is mandatory, all other semantics
/// are optional. Keys that are not understood are ignored.
pub fn parse_feature_table_json(json: &[u8]) -> Result<FeatureTableProperties> {
    let root = parse_json_header(json, "feature table")?;

    let points_length = match root.get("POINTS_LENGTH") {
        Some(value) => as_u32(value, "POINTS_LENGTH")?,
        None => return Err(DecodeError::MissingPointCount),
    };

    let mut props = FeatureTableProperties {
        points_length: Some(points_length),
        ..Default::default()
    };

    for (key, value) in root.iter() {
        match key.as_str() {
            "POINTS_LENGTH" => {}
            // Unlike some writers/readers that look up a `byteOffset` next to `POSITION`, the offset of
            // every point semantic is the `byteOffset` of its own reference object
            "POSITION" => props.position_byte_offset = Some(byte_offset(value, "POSITION")?),
            "POSITION_QUANTIZED" => {
                props.position_quantized_byte_offset =
                    Some(byte_offset(value, "POSITION_QUANTIZED")?)
            }
            "NORMAL" => props.normal_byte_offset = Some(byte_offset(value, "NORMAL")?),
            "RGB" => props.rgb_byte_offset = Some(byte_offset(value, "RGB")?),
            "RGBA" => props.rgba_byte_offset = Some(byte_offset(value, "RGBA")?),
            "BATCH_ID" => {
                props.batch_id_byte_offset = Some(byte_offset(value, "BATCH_ID")?);
                props.batch_id_component_type = value
                    .get("componentType")
                    .and_then(Value::as_str)
                    .map(component_type_from_name);
            }
            "RTC_CENTER" => {
                let rtc_center = value
                    .as_array()
                    .and_then(|arr| json_arr_to_vec3f64(arr))
                    .ok_or_else(|| DecodeError::MalformedRtcCenter(value.to_string()))?;
                props.rtc_center = Some(rtc_center);
            }
            "QUANTIZED_VOLUME_OFFSET" => {
                props.quantized_volume_offset =
                    Some(vec3f32(value, "QUANTIZED_VOLUME_OFFSET")?)
            }
            "QUANTIZED_VOLUME_SCALE" => {
                props.quantized_volume_scale = Some(vec3f32(value, "QUANTIZED_VOLUME_SCALE")?)
            }
            "CONSTANT_RGBA" => {
                let rgba = value
                    .as_array()
                    .and_then(|arr| json_arr_to_vec4u8(arr))
                    .ok_or_else(|| DecodeError::InvalidFeatureTableValue {
                        key: "CONSTANT_RGBA",
                        reason: format!("expected an array of four bytes, found {}", value),
                    })?;
                props.constant_rgba = Some(rgba);
            }
            "BATCH_LENGTH" => props.batch_length = Some(as_u32(value, "BATCH_LENGTH")?),
            "extensions" => parse_extensions(value, &mut props)?,
            other => log::trace!("Ignoring unknown feature table entry {}", other),
        }
    }

    Ok(props)
}

fn parse_extensions(value: &Value, props: &mut FeatureTableProperties) -> Result<()> {
    let extensions = value
        .as_object()
        .ok_or_else(|| DecodeError::InvalidFeatureTableValue {
            key: "extensions",
            reason: format!("expected an object, found {}", json_type_name(value)),
        })?;
    for (name, extension) in extensions {
        if name == DRACO_POINT_COMPRESSION_EXTENSION {
            props.draco_compression = Some(parse_draco_extension(extension));
        }
        props.extensions.insert(name.clone(), extension.clone());
    }
    Ok(())
}

/// Reads the parts of the Draco extension object that are well-formed. The extension only acts as a flag
/// for the decoder, so malformed members are skipped instead of failing the whole tile
fn parse_draco_extension(extension: &Value) -> DracoPointCompression {
    let empty = Map::new();
    let obj = extension.as_object().unwrap_or(&empty);
    let properties = obj
        .get("properties")
        .and_then(Value::as_object)
        .map(|properties| {
            properties
                .iter()
                .filter_map(|(semantic, id)| {
                    let id = id.as_u64().and_then(|id| u32::try_from(id).ok())?;
                    Some((semantic.clone(), id))
                })
                .collect()
        })
        .unwrap_or_default();
    let get_u32 = |key: &str| {
        obj.get(key)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
    };

    DracoPointCompression {
        properties,
        byte_offset: get_u32("byteOffset"),
        byte_length: get_u32("byteLength"),
    }
}

fn as_u32(value: &Value, key: &'static str) -> Result<u32> {
    value
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| DecodeError::InvalidFeatureTableValue {
            key,
            reason: format!("expected an unsigned 32-bit integer, found {}", value),
        })
}

/// Returns the `byteOffset` of a reference to the FeatureTable binary body. A reference without a
/// `byteOffset` points to the start of the body
fn byte_offset(value: &Value, key: &'static str) -> Result<u32> {
    let reference = value
        .as_object()
        .ok_or_else(|| DecodeError::InvalidFeatureTableValue {
            key,
            reason: format!(
                "expected a reference to the binary body, found {}",
                json_type_name(value)
            ),
        })?;
    match reference.get("byteOffset") {
        Some(offset) => as_u32(offset, key),
        None => Ok(0),
    }
}

fn vec3f32(value: &Value, key: &'static str) -> Result<Vector3<f32>> {
    value
        .as_array()
        .and_then(|arr| json_arr_to_vec3f32(arr))
        .ok_or_else(|| DecodeError::InvalidFeatureTableValue {
            key,
            reason: format!("expected an array of three numbers, found {}", value),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(json: Value) -> Result<FeatureTableProperties> {
        parse_feature_table_json(json.to_string().as_bytes())
    }

    #[test]
    fn test_parse_all_point_semantics() -> Result<()> {
        let props = parse(json!({
            "POINTS_LENGTH": 1000,
            "POSITION": { "byteOffset": 0 },
            "NORMAL": { "byteOffset": 12000 },
            "RGBA": { "byteOffset": 24000 },
            "BATCH_ID": { "byteOffset": 28000, "componentType": "UNSIGNED_SHORT" },
            "BATCH_LENGTH": 10,
            "RTC_CENTER": [1215013.8, -4736316.7, 4081608.4],
        }))?;

        assert_eq!(Some(1000), props.points_length);
        assert_eq!(Some(0), props.position_byte_offset);
        assert_eq!(Some(12000), props.normal_byte_offset);
        assert_eq!(Some(24000), props.rgba_byte_offset);
        assert_eq!(None, props.rgb_byte_offset);
        assert_eq!(Some(28000), props.batch_id_byte_offset);
        assert_eq!(Some(ComponentType::UInt16), props.batch_id_component_type);
        assert_eq!(Some(10), props.batch_length);
        assert_eq!(
            Some(Vector3::new(1215013.8, -4736316.7, 4081608.4)),
            props.rtc_center
        );
        assert!(!props.has_draco_compression());
        Ok(())
    }

    #[test]
    fn test_position_offset_is_read_from_nested_object() -> Result<()> {
        // A root-level `byteOffset` must not be mistaken for the offset of POSITION
        let props = parse(json!({
            "POINTS_LENGTH": 4,
            "byteOffset": 64,
            "POSITION": { "byteOffset": 16 },
        }))?;
        assert_eq!(Some(16), props.position_byte_offset);

        let props = parse(json!({
            "POINTS_LENGTH": 4,
            "byteOffset": 64,
            "POSITION": {},
        }))?;
        assert_eq!(Some(0), props.position_byte_offset);
        Ok(())
    }

    #[test]
    fn test_missing_points_length() {
        let err = parse(json!({ "POSITION": { "byteOffset": 0 } })).unwrap_err();
        assert!(matches!(err, DecodeError::MissingPointCount));

        let err = parse(json!({ "POINTS_LENGTH": -1 })).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidFeatureTableValue {
                key: "POINTS_LENGTH",
                ..
            }
        ));
    }

    #[test]
    fn test_malformed_rtc_center() {
        for rtc_center in [json!([1.0, 2.0]), json!({"x": 1.0}), json!([1, "2", 3])] {
            let err = parse(json!({ "POINTS_LENGTH": 1, "RTC_CENTER": rtc_center })).unwrap_err();
            assert!(matches!(err, DecodeError::MalformedRtcCenter(_)));
        }
    }

    #[test]
    fn test_unknown_batch_id_component_type() -> Result<()> {
        let props = parse(json!({
            "POINTS_LENGTH": 1,
            "BATCH_ID": { "byteOffset": 8, "componentType": "HALF_FLOAT" },
        }))?;
        assert_eq!(Some(ComponentType::Invalid), props.batch_id_component_type);
        Ok(())
    }

    #[test]
    fn test_draco_extension() -> Result<()> {
        let props = parse(json!({
            "POINTS_LENGTH": 8,
            "POSITION": { "byteOffset": 0 },
            "RGB": { "byteOffset": 0 },
            "extensions": {
                "3DTILES_draco_point_compression": {
                    "properties": { "POSITION": 0, "RGB": 1 },
                    "byteOffset": 0,
                    "byteLength": 120
                }
            }
        }))?;
        assert!(props.has_draco_compression());
        let draco = props.draco_compression.expect("Draco extension not parsed");
        assert_eq!(Some(&1), draco.properties.get("RGB"));
        assert_eq!(Some(0), draco.byte_offset);
        assert_eq!(Some(120), draco.byte_length);
        Ok(())
    }

    #[test]
    fn test_global_semantics_and_unknown_keys() -> Result<()> {
        let props = parse(json!({
            "POINTS_LENGTH": 2,
            "POSITION_QUANTIZED": { "byteOffset": 0 },
            "QUANTIZED_VOLUME_OFFSET": [-250.0, 0.0, 250.0],
            "QUANTIZED_VOLUME_SCALE": [500.0, 500.0, 500.0],
            "CONSTANT_RGBA": [255, 255, 0, 255],
            "SOMETHING_ELSE": { "byteOffset": 3 },
        }))?;
        assert_eq!(Some(0), props.position_quantized_byte_offset);
        assert_eq!(None, props.position_byte_offset);
        assert_eq!(
            Some(Vector3::new(-250.0, 0.0, 250.0)),
            props.quantized_volume_offset
        );
        assert_eq!(Some(Vector4::new(255, 255, 0, 255)), props.constant_rgba);
        Ok(())
    }
}
