use serde_json::Value;

use super::{
    component_count_from_type, component_type_from_name, json_type_name, parse_json_header,
    ComponentType,
};
use crate::Result;

/// A single property of a 3D Tiles BatchTable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchAttributeDescriptor {
    /// A property whose values are stored in the binary body of the BatchTable
    Reference {
        name: String,
        byte_offset: u32,
        component_type: ComponentType,
        /// 1 for `SCALAR` up to 4 for `VEC4`. Zero if the `type` was not understood
        component_count: usize,
    },
    /// A property whose values are stored inline in the JSON header. Each value is kept as its JSON text
    LiteralArray { name: String, values: Vec<String> },
}

impl BatchAttributeDescriptor {
    pub fn name(&self) -> &str {
        match self {
            BatchAttributeDescriptor::Reference { name, .. } => name,
            BatchAttributeDescriptor::LiteralArray { name, .. } => name,
        }
    }

    /// Size in bytes of a single value of a `Reference` property. Zero for unusable references (unknown
    /// component type or `type`) and for `LiteralArray` properties
    pub fn stride(&self) -> usize {
        match self {
            BatchAttributeDescriptor::Reference {
                component_type,
                component_count,
                ..
            } => component_type.byte_width() * component_count,
            BatchAttributeDescriptor::LiteralArray { .. } => 0,
        }
    }
}

/// Parses the BatchTable JSON header of a .pnts file into its properties. The order of the properties is
/// the order of their keys in the JSON document. This order is significant: Draco-compressed tiles store
/// batch properties as unnamed generic attributes, which can only be matched to their names by position.
///
/// The reserved `extensions` key is skipped, as are properties that are neither objects nor arrays.
pub fn parse_batch_table_json(json: &[u8]) -> Result<Vec<BatchAttributeDescriptor>> {
    let root = parse_json_header(json, "batch table")?;

    let mut descriptors = Vec::with_capacity(root.len());
    for (name, value) in root.iter() {
        if name == "extensions" {
            continue;
        }
        match value {
            Value::Object(reference) => {
                let byte_offset = reference
                    .get("byteOffset")
                    .and_then(Value::as_u64)
                    .and_then(|offset| u32::try_from(offset).ok())
                    .unwrap_or(0);
                let component_type = reference
                    .get("componentType")
                    .and_then(Value::as_str)
                    .map(component_type_from_name)
                    .unwrap_or(ComponentType::Invalid);
                let component_count = reference
                    .get("type")
                    .and_then(Value::as_str)
                    .map(component_count_from_type)
                    .unwrap_or(0);
                descriptors.push(BatchAttributeDescriptor::Reference {
                    name: name.clone(),
                    byte_offset,
                    component_type,
                    component_count,
                });
            }
            Value::Array(array) => {
                descriptors.push(BatchAttributeDescriptor::LiteralArray {
                    name: name.clone(),
                    values: array.iter().map(Value::to_string).collect(),
                });
            }
            other => log::warn!(
                "Ignoring batch table property {} of unexpected type {}",
                name,
                json_type_name(other)
            ),
        }
    }

    Ok(descriptors)
}
