use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, warn};

use super::{
    parse_batch_table_json, parse_feature_table_json, BatchAttributeDescriptor,
    BatchAttributeValues, ComponentType, DecodedAttribute, DecodedPointCloud,
    DracoPointCompression, FeatureTableProperties, GeometryAttributeKind, NoCodec,
    PntsHeader, PointCloudCodec, PointCloudData, DRACO_SIGNATURE,
};
use crate::{DecodeError, DecoderOptions, PntsReadPositionsMode, Result};

/// Decoder for tiles in the 3D Tiles PNTS format.
///
/// A .pnts tile stores its points either as raw per-attribute arrays inside the FeatureTable binary body,
/// at offsets given by the FeatureTable JSON, or as a single compressed (Draco) block. Compressed blocks
/// are handed to the `PointCloudCodec` of this decoder. Decoding never returns partial data: either all
/// attributes are extracted, or an error is returned.
///
/// The decoder keeps the header, FeatureTable, and BatchTable properties of the last `decode` call for
/// introspection, so a single instance can be reused for many tiles, one at a time.
pub struct PntsDecoder<C: PointCloudCodec = NoCodec> {
    codec: C,
    options: DecoderOptions,
    header: Option<PntsHeader>,
    feature_table: Option<FeatureTableProperties>,
    batch_descriptors: Vec<BatchAttributeDescriptor>,
}

impl PntsDecoder<NoCodec> {
    /// Creates a decoder that can only decode uncompressed tiles
    pub fn new() -> Self {
        Self::with_codec(NoCodec)
    }
}

impl Default for PntsDecoder<NoCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: PointCloudCodec> PntsDecoder<C> {
    /// Creates a decoder that uses `codec` for tiles with compressed point data
    pub fn with_codec(codec: C) -> Self {
        Self {
            codec,
            options: DecoderOptions::default(),
            header: None,
            feature_table: None,
            batch_descriptors: vec![],
        }
    }

    pub fn with_options(mut self, options: DecoderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &DecoderOptions {
        &self.options
    }

    /// The header of the tile of the last `decode` call, if it could be parsed
    pub fn last_header(&self) -> Option<&PntsHeader> {
        self.header.as_ref()
    }

    /// The FeatureTable of the tile of the last `decode` call, if it had one
    pub fn feature_table(&self) -> Option<&FeatureTableProperties> {
        self.feature_table.as_ref()
    }

    /// The BatchTable properties of the tile of the last `decode` call, in the order of the BatchTable JSON.
    /// `PointCloudData::attributes` has the same order
    pub fn batch_descriptors(&self) -> &[BatchAttributeDescriptor] {
        &self.batch_descriptors
    }

    /// Reads the file at `path` into memory and decodes it
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<PointCloudData> {
        let file_size = std::fs::metadata(path.as_ref())?.len();
        self.check_buffer_size(file_size)?;
        let bytes = std::fs::read(path.as_ref())?;
        self.decode(&bytes)
    }

    /// Decodes the .pnts tile in `bytes`
    pub fn decode(&mut self, bytes: &[u8]) -> Result<PointCloudData> {
        self.header = None;
        self.feature_table = None;
        self.batch_descriptors.clear();

        self.check_buffer_size(bytes.len() as u64)?;
        let (header, ranges) = PntsHeader::parse(bytes)?;
        debug!("Decoding PNTS tile: {:?}", header);
        if !header.is_consistent() {
            debug!(
                "PNTS header declares byteLength {} but its sections sum up to {} bytes",
                header.byte_length,
                header.declared_content_length()
            );
        }
        self.header = Some(header);

        if !ranges.batch_table_json.is_empty() {
            self.batch_descriptors = parse_batch_table_json(&bytes[ranges.batch_table_json])?;
        }
        if !ranges.feature_table_json.is_empty() {
            self.feature_table = Some(parse_feature_table_json(
                &bytes[ranges.feature_table_json],
            )?);
        }

        let feature_binary = &bytes[ranges.feature_table_binary];
        let batch_binary = &bytes[ranges.batch_table_binary];
        let feature_table = self.feature_table.as_ref();

        let mut data = if is_compressed(feature_binary, feature_table) {
            debug!("Feature table binary is compressed, decoding with point cloud codec");
            let block = compressed_block(feature_binary, feature_table)?;
            let cloud = self
                .codec
                .decode(block)
                .map_err(|e| DecodeError::CodecDecode(format!("{:#}", e)))?;
            extract_decoded_point_cloud(&cloud, feature_table, &self.options)?
        } else {
            debug!("Feature table binary is uncompressed, reading attributes at their offsets");
            let feature_table = feature_table.ok_or(DecodeError::MissingPointCount)?;
            extract_raw_point_cloud(
                feature_table,
                &self.batch_descriptors,
                feature_binary,
                batch_binary,
                &self.options,
            )?
        };

        data.rtc_center = feature_table.and_then(|ft| ft.rtc_center);
        if let (PntsReadPositionsMode::Absolute, Some(rtc_center)) =
            (self.options.read_positions_mode, data.rtc_center)
        {
            for position in data.positions.chunks_exact_mut(3) {
                for (component, offset) in position.iter_mut().zip(rtc_center.iter()) {
                    *component = (*component as f64 + offset) as f32;
                }
            }
        }

        Ok(data)
    }

    fn check_buffer_size(&self, size: u64) -> Result<()> {
        if size > self.options.max_buffer_size {
            return Err(DecodeError::BufferTooLarge {
                actual: size,
                limit: self.options.max_buffer_size,
            });
        }
        Ok(())
    }
}

fn check_point_count(point_count: u32, options: &DecoderOptions) -> Result<()> {
    if point_count > options.max_point_count {
        return Err(DecodeError::TooManyPoints {
            actual: point_count as u64,
            limit: options.max_point_count,
        });
    }
    Ok(())
}

/// Compressed tiles are recognized either by the Draco signature at the start of the FeatureTable binary
/// body, or by the `3DTILES_draco_point_compression` extension in the FeatureTable
fn is_compressed(feature_binary: &[u8], feature_table: Option<&FeatureTableProperties>) -> bool {
    feature_binary.starts_with(DRACO_SIGNATURE)
        || feature_table.map_or(false, FeatureTableProperties::has_draco_compression)
}

/// The compressed block is the whole FeatureTable binary body, unless the Draco extension declares its
/// exact location
fn compressed_block<'a>(
    feature_binary: &'a [u8],
    feature_table: Option<&FeatureTableProperties>,
) -> Result<&'a [u8]> {
    match feature_table.and_then(|ft| ft.draco_compression.as_ref()) {
        Some(DracoPointCompression {
            byte_offset: Some(offset),
            byte_length: Some(length),
            ..
        }) => checked_slice(
            feature_binary,
            *offset as u64,
            *length as u64,
            "Draco compressed block",
        ),
        _ => Ok(feature_binary),
    }
}

/// Returns `length` bytes of `segment` starting at `offset`, or `OutOfRange` if they are not all within
/// `segment`
fn checked_slice<'a>(segment: &'a [u8], offset: u64, length: u64, what: &str) -> Result<&'a [u8]> {
    let out_of_range = || DecodeError::OutOfRange {
        what: what.to_owned(),
        offset,
        length,
        segment_length: segment.len(),
    };
    let end = offset.checked_add(length).ok_or_else(out_of_range)?;
    if end > segment.len() as u64 {
        return Err(out_of_range());
    }
    Ok(&segment[offset as usize..end as usize])
}

fn read_f32_array(segment: &[u8], offset: u32, count: u64, what: &str) -> Result<Vec<f32>> {
    let bytes = checked_slice(segment, offset as u64, count * 4, what)?;
    let mut values = vec![0.0; count as usize];
    LittleEndian::read_f32_into(bytes, &mut values);
    Ok(values)
}

/// Extracts all point data from a tile whose FeatureTable binary body stores raw per-attribute arrays
fn extract_raw_point_cloud(
    feature_table: &FeatureTableProperties,
    batch_descriptors: &[BatchAttributeDescriptor],
    feature_binary: &[u8],
    batch_binary: &[u8],
    options: &DecoderOptions,
) -> Result<PointCloudData> {
    let point_count = feature_table
        .points_length
        .ok_or(DecodeError::MissingPointCount)?;
    check_point_count(point_count, options)?;
    let num_points = point_count as u64;

    let position_offset = match (
        feature_table.position_byte_offset,
        feature_table.position_quantized_byte_offset,
    ) {
        (Some(offset), _) => offset,
        (None, Some(_)) => return Err(DecodeError::UnsupportedQuantization),
        (None, None) => return Err(DecodeError::MissingPosition),
    };
    let positions = read_f32_array(feature_binary, position_offset, 3 * num_points, "POSITION")?;

    let (colors, color_components) = match (feature_table.rgb_byte_offset, feature_table.rgba_byte_offset)
    {
        (Some(offset), _) => (
            checked_slice(feature_binary, offset as u64, 3 * num_points, "RGB")?.to_vec(),
            3,
        ),
        (None, Some(offset)) => (
            checked_slice(feature_binary, offset as u64, 4 * num_points, "RGBA")?.to_vec(),
            4,
        ),
        (None, None) => (vec![], 0),
    };

    let normals = match feature_table.normal_byte_offset {
        Some(offset) => read_f32_array(feature_binary, offset, 3 * num_points, "NORMAL")?,
        None => vec![],
    };

    let (batch_ids, batch_id_component_type) = match feature_table.batch_id_byte_offset {
        Some(offset) => {
            let component_type = feature_table
                .batch_id_component_type
                .unwrap_or(ComponentType::UInt32);
            if !component_type.is_valid() {
                return Err(DecodeError::UnsupportedComponentType {
                    semantic: "BATCH_ID".into(),
                });
            }
            let length = component_type.byte_width() as u64 * num_points;
            let batch_ids = checked_slice(feature_binary, offset as u64, length, "BATCH_ID")?;
            (batch_ids.to_vec(), Some(component_type))
        }
        None => (vec![], None),
    };

    // With per-point batch IDs, the BatchTable has one row per batch instead of one row per point
    let batch_table_rows = if batch_id_component_type.is_some() {
        feature_table.batch_length.unwrap_or(point_count)
    } else {
        point_count
    };
    let attributes = batch_descriptors
        .iter()
        .map(|descriptor| read_batch_attribute(descriptor, batch_binary, batch_table_rows))
        .collect::<Result<Vec<_>>>()?;

    Ok(PointCloudData {
        point_count,
        positions,
        colors,
        color_components,
        normals,
        batch_ids,
        batch_id_component_type,
        attributes,
        rtc_center: None,
    })
}

fn read_batch_attribute(
    descriptor: &BatchAttributeDescriptor,
    batch_binary: &[u8],
    rows: u32,
) -> Result<BatchAttributeValues> {
    match descriptor {
        BatchAttributeDescriptor::LiteralArray { values, .. } => {
            Ok(BatchAttributeValues::Literal(values.clone()))
        }
        BatchAttributeDescriptor::Reference {
            name, byte_offset, ..
        } => {
            let stride = descriptor.stride();
            if stride == 0 {
                warn!(
                    "Batch table property {} has an unknown component type or type, skipping its values",
                    name
                );
                return Ok(BatchAttributeValues::Binary {
                    data: vec![],
                    stride: 0,
                });
            }
            let length = stride as u64 * rows as u64;
            let data = checked_slice(batch_binary, *byte_offset as u64, length, name)?;
            Ok(BatchAttributeValues::Binary {
                data: data.to_vec(),
                stride,
            })
        }
    }
}

/// Extracts all point data from a point cloud returned by the codec. BatchTable properties are stored as
/// generic attributes, which are copied in storage order
fn extract_decoded_point_cloud(
    cloud: &DecodedPointCloud,
    feature_table: Option<&FeatureTableProperties>,
    options: &DecoderOptions,
) -> Result<PointCloudData> {
    check_point_count(cloud.num_points, options)?;
    if let Some(points_length) = feature_table.and_then(|ft| ft.points_length) {
        if points_length != cloud.num_points {
            warn!(
                "Feature table declares {} points, but the compressed block contains {} points",
                points_length, cloud.num_points
            );
        }
    }
    let num_points = cloud.num_points as usize;

    let mut data = PointCloudData {
        point_count: cloud.num_points,
        ..Default::default()
    };

    if let Some(position) = cloud.named_attribute(GeometryAttributeKind::Position) {
        data.positions = gather(position, num_points, "POSITION", |attribute, idx| {
            attribute.read_f32::<3>(idx)
        })?;
    }

    if let Some(color) = cloud.named_attribute(GeometryAttributeKind::Color) {
        match color.component_count {
            3 => {
                data.colors = gather(color, num_points, "COLOR", |attribute, idx| {
                    attribute.read_u8::<3>(idx)
                })?;
                data.color_components = 3;
            }
            4 => {
                data.colors = gather(color, num_points, "COLOR", |attribute, idx| {
                    attribute.read_u8::<4>(idx)
                })?;
                data.color_components = 4;
            }
            other => debug!("Skipping COLOR attribute with {} components", other),
        }
    }

    if let Some(normal) = cloud.named_attribute(GeometryAttributeKind::Normal) {
        data.normals = gather(normal, num_points, "NORMAL", |attribute, idx| {
            attribute.read_f32::<3>(idx)
        })?;
    }

    data.attributes = cloud
        .generic_attributes()
        .enumerate()
        .map(|(idx, attribute)| {
            let stride = attribute.stride();
            let what = format!("generic attribute {}", idx);
            let bytes = checked_slice(&attribute.data, 0, (stride * num_points) as u64, &what)?;
            Ok(BatchAttributeValues::Binary {
                data: bytes.to_vec(),
                stride,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(data)
}

/// Reads `N` components for each of the `num_points` points of `attribute` into a flat buffer
fn gather<T: Copy, const N: usize>(
    attribute: &DecodedAttribute,
    num_points: usize,
    what: &str,
    read: impl Fn(&DecodedAttribute, usize) -> Option<[T; N]>,
) -> Result<Vec<T>> {
    let mut values = Vec::with_capacity(num_points * N);
    for point_index in 0..num_points {
        let value = read(attribute, point_index).ok_or_else(|| DecodeError::OutOfRange {
            what: format!("decoded {} of point {}", what, point_index),
            offset: (point_index * attribute.stride()) as u64,
            length: attribute.stride() as u64,
            segment_length: attribute.data.len(),
        })?;
        values.extend_from_slice(&value);
    }
    Ok(values)
}
