#![allow(dead_code)]

use anyhow::{bail, Result};
use pnts_io::tiles3d::{
    ComponentType, DecodedAttribute, DecodedPointCloud, GeometryAttributeKind, PntsHeader,
    PointCloudCodec,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde_json::Value;

/// Assembles .pnts tiles in memory. JSON sections are padded with spaces and binary sections with zeros,
/// either to an 8-byte boundary or to an exact length
#[derive(Default)]
pub struct TileBuilder {
    feature_table_json: Vec<u8>,
    feature_table_binary: Vec<u8>,
    batch_table_json: Vec<u8>,
    batch_table_binary: Vec<u8>,
}

fn padded(mut bytes: Vec<u8>, padding: u8, length: Option<usize>) -> Vec<u8> {
    let length = length.unwrap_or(((bytes.len() + 7) / 8) * 8);
    assert!(
        bytes.len() <= length,
        "Section of {} bytes does not fit into {} bytes",
        bytes.len(),
        length
    );
    bytes.resize(length, padding);
    bytes
}

impl TileBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn feature_table_json(self, json: &Value) -> Self {
        self.feature_table_json_with_length(json, None)
    }

    pub fn feature_table_json_with_length(mut self, json: &Value, length: Option<usize>) -> Self {
        self.feature_table_json = padded(json.to_string().into_bytes(), b' ', length);
        self
    }

    pub fn feature_table_binary(mut self, binary: Vec<u8>, length: Option<usize>) -> Self {
        self.feature_table_binary = padded(binary, 0, length);
        self
    }

    pub fn batch_table_json(self, json: &Value) -> Self {
        self.batch_table_json_with_length(json, None)
    }

    pub fn batch_table_json_with_length(mut self, json: &Value, length: Option<usize>) -> Self {
        self.batch_table_json = padded(json.to_string().into_bytes(), b' ', length);
        self
    }

    pub fn batch_table_binary(mut self, binary: Vec<u8>, length: Option<usize>) -> Self {
        self.batch_table_binary = padded(binary, 0, length);
        self
    }

    pub fn header(&self) -> PntsHeader {
        let byte_length = PntsHeader::BYTE_LENGTH
            + self.feature_table_json.len()
            + self.feature_table_binary.len()
            + self.batch_table_json.len()
            + self.batch_table_binary.len();
        PntsHeader::new(
            1,
            byte_length as u32,
            self.feature_table_json.len() as u32,
            self.feature_table_binary.len() as u32,
            self.batch_table_json.len() as u32,
            self.batch_table_binary.len() as u32,
        )
    }

    pub fn build(&self) -> Vec<u8> {
        let header = self.header();
        let mut bytes = header.magic.to_vec();
        for field in [
            header.version,
            header.byte_length,
            header.feature_table_json_byte_length,
            header.feature_table_binary_byte_length,
            header.batch_table_json_byte_length,
            header.batch_table_binary_byte_length,
        ] {
            bytes.extend_from_slice(&field.to_le_bytes());
        }
        bytes.extend_from_slice(&self.feature_table_json);
        bytes.extend_from_slice(&self.feature_table_binary);
        bytes.extend_from_slice(&self.batch_table_json);
        bytes.extend_from_slice(&self.batch_table_binary);
        bytes
    }
}

pub fn f32_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn u16_bytes(values: &[u16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// `count` random positions in a 200m cube, as a flat array
pub fn random_positions(count: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count * 3)
        .map(|_| rng.gen_range(-100.0_f32..100.0_f32))
        .collect()
}

pub fn random_bytes(count: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count).map(|_| rng.gen::<u8>()).collect()
}

/// A `PointCloudCodec` that returns a fixed point cloud for every buffer that starts with the Draco
/// signature, and fails for all other buffers
pub struct MockCodec {
    pub cloud: DecodedPointCloud,
}

impl PointCloudCodec for MockCodec {
    fn decode(&self, data: &[u8]) -> Result<DecodedPointCloud> {
        if !data.starts_with(b"DRACO") {
            bail!("Not a Draco buffer");
        }
        Ok(self.cloud.clone())
    }
}

pub fn decoded_attribute(
    kind: GeometryAttributeKind,
    component_type: ComponentType,
    component_count: usize,
    data: Vec<u8>,
) -> DecodedAttribute {
    DecodedAttribute {
        kind,
        component_type,
        component_count,
        data,
    }
}
