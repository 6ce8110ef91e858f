use std::ops::Range;

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;

use crate::{DecodeError, Result};

/// Header of .pnts files
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PntsHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub byte_length: u32,
    pub feature_table_json_byte_length: u32,
    pub feature_table_binary_byte_length: u32,
    pub batch_table_json_byte_length: u32,
    pub batch_table_binary_byte_length: u32,
}

const_assert!(PntsHeader::BYTE_LENGTH == std::mem::size_of::<PntsHeader>());

/// Absolute byte ranges of the four sections that follow the header of a .pnts file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRanges {
    pub feature_table_json: Range<usize>,
    pub feature_table_binary: Range<usize>,
    pub batch_table_json: Range<usize>,
    pub batch_table_binary: Range<usize>,
}

impl PntsHeader {
    /// Length of a .pnts header in bytes
    pub const BYTE_LENGTH: usize = 28;
    /// The magic bytes at the start of every .pnts file
    pub const MAGIC: [u8; 4] = *b"pnts";
    /// The .pnts version this decoder was written against
    pub const VERSION: u32 = 1;

    pub fn new(
        version: u32,
        byte_length: u32,
        feature_table_json_byte_length: u32,
        feature_table_binary_byte_length: u32,
        batch_table_json_byte_length: u32,
        batch_table_binary_byte_length: u32,
    ) -> Self {
        Self {
            magic: Self::MAGIC,
            version,
            byte_length,
            feature_table_json_byte_length,
            feature_table_binary_byte_length,
            batch_table_json_byte_length,
            batch_table_binary_byte_length,
        }
    }

    /// Parses the header at the start of `bytes` and computes the absolute byte ranges of all sections.
    /// Fails if `bytes` cannot hold the header, if the magic bytes are wrong, or if any section extends
    /// beyond the end of `bytes`. Downstream code relies on the returned ranges being valid for `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<(Self, SegmentRanges)> {
        if bytes.len() < Self::BYTE_LENGTH {
            return Err(DecodeError::TooSmall {
                actual: bytes.len(),
                expected: Self::BYTE_LENGTH,
            });
        }

        // PNTS is little-endian with fixed-width fields, which is the default encoding of bincode
        let header: PntsHeader = bincode::deserialize(&bytes[..Self::BYTE_LENGTH])?;
        header.verify_magic()?;
        if header.version != Self::VERSION {
            log::warn!(
                "PNTS version is {}, only version {} is known. Trying to decode anyway",
                header.version,
                Self::VERSION
            );
        }

        let ranges = header.segment_ranges(bytes.len())?;
        Ok((header, ranges))
    }

    /// Returns an Err if the magic bytes in this header are not correct
    pub fn verify_magic(&self) -> Result<()> {
        if self.magic != Self::MAGIC {
            return Err(DecodeError::BadMagic { magic: self.magic });
        }
        Ok(())
    }

    /// Computes the section ranges by accumulating the declared lengths, starting right after the header
    pub fn segment_ranges(&self, buffer_length: usize) -> Result<SegmentRanges> {
        let mut start = Self::BYTE_LENGTH as u64;
        let mut next_range = |segment: &'static str, length: u32| -> Result<Range<usize>> {
            let end = start + length as u64;
            if end > buffer_length as u64 {
                return Err(DecodeError::RangeOverflow {
                    segment,
                    range: start..end,
                    buffer_length,
                });
            }
            // Both bounds are <= buffer_length here, so they fit into usize
            let range = start as usize..end as usize;
            start = end;
            Ok(range)
        };

        Ok(SegmentRanges {
            feature_table_json: next_range(
                "feature table JSON",
                self.feature_table_json_byte_length,
            )?,
            feature_table_binary: next_range(
                "feature table binary",
                self.feature_table_binary_byte_length,
            )?,
            batch_table_json: next_range("batch table JSON", self.batch_table_json_byte_length)?,
            batch_table_binary: next_range(
                "batch table binary",
                self.batch_table_binary_byte_length,
            )?,
        })
    }

    /// Size of the header plus all four sections, as declared by this header
    pub fn declared_content_length(&self) -> u64 {
        Self::BYTE_LENGTH as u64
            + self.feature_table_json_byte_length as u64
            + self.feature_table_binary_byte_length as u64
            + self.batch_table_json_byte_length as u64
            + self.batch_table_binary_byte_length as u64
    }

    /// Does the `byte_length` field match the sum of all section lengths? Many tiles in the wild get this
    /// wrong, so this is informational only
    pub fn is_consistent(&self) -> bool {
        self.declared_content_length() == self.byte_length as u64
    }
}

/// Datatype of the components of a binary property in a FeatureTable or BatchTable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float32,
    Float64,
    /// Sentinel for component type names that are not part of the 3D Tiles standard
    Invalid,
}

impl ComponentType {
    pub const ALL_VALID: [ComponentType; 8] = [
        ComponentType::Int8,
        ComponentType::UInt8,
        ComponentType::Int16,
        ComponentType::UInt16,
        ComponentType::Int32,
        ComponentType::UInt32,
        ComponentType::Float32,
        ComponentType::Float64,
    ];

    /// Size of a single component in bytes. `Invalid` has a size of zero
    pub fn byte_width(&self) -> usize {
        match self {
            ComponentType::Int8 | ComponentType::UInt8 => 1,
            ComponentType::Int16 | ComponentType::UInt16 => 2,
            ComponentType::Int32 | ComponentType::UInt32 | ComponentType::Float32 => 4,
            ComponentType::Float64 => 8,
            ComponentType::Invalid => 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        *self != ComponentType::Invalid
    }

    /// The 3D Tiles name of this component type, e.g. `UNSIGNED_SHORT`
    pub fn name(&self) -> Option<&'static str> {
        match self {
            ComponentType::Int8 => Some("BYTE"),
            ComponentType::UInt8 => Some("UNSIGNED_BYTE"),
            ComponentType::Int16 => Some("SHORT"),
            ComponentType::UInt16 => Some("UNSIGNED_SHORT"),
            ComponentType::Int32 => Some("INT"),
            ComponentType::UInt32 => Some("UNSIGNED_INT"),
            ComponentType::Float32 => Some("FLOAT"),
            ComponentType::Float64 => Some("DOUBLE"),
            ComponentType::Invalid => None,
        }
    }

    /// Reads a single little-endian component from the start of `bytes` and converts it to `f64`. Returns
    /// `None` if `bytes` is too short or the component type is `Invalid`
    pub fn read_as_f64(&self, bytes: &[u8]) -> Option<f64> {
        let component = bytes.get(..self.byte_width())?;
        let value = match self {
            ComponentType::Int8 => component[0] as i8 as f64,
            ComponentType::UInt8 => component[0] as f64,
            ComponentType::Int16 => LittleEndian::read_i16(component) as f64,
            ComponentType::UInt16 => LittleEndian::read_u16(component) as f64,
            ComponentType::Int32 => LittleEndian::read_i32(component) as f64,
            ComponentType::UInt32 => LittleEndian::read_u32(component) as f64,
            ComponentType::Float32 => LittleEndian::read_f32(component) as f64,
            ComponentType::Float64 => LittleEndian::read_f64(component),
            ComponentType::Invalid => return None,
        };
        Some(value)
    }

    /// Reads a single little-endian component from the start of `bytes` as an unsigned integer, as is
    /// required for batch IDs. Returns `None` for signed, floating point and `Invalid` component types,
    /// since batch IDs are always unsigned
    pub fn read_as_u32(&self, bytes: &[u8]) -> Option<u32> {
        let component = bytes.get(..self.byte_width())?;
        match self {
            ComponentType::UInt8 => Some(component[0] as u32),
            ComponentType::UInt16 => Some(LittleEndian::read_u16(component) as u32),
            ComponentType::UInt32 => Some(LittleEndian::read_u32(component)),
            _ => None,
        }
    }
}

/// Maps a 3D Tiles `componentType` name to the corresponding `ComponentType`. Unknown names map to
/// `ComponentType::Invalid`
pub fn component_type_from_name(name: &str) -> ComponentType {
    match name {
        "BYTE" => ComponentType::Int8,
        "UNSIGNED_BYTE" => ComponentType::UInt8,
        "SHORT" => ComponentType::Int16,
        "UNSIGNED_SHORT" => ComponentType::UInt16,
        "INT" => ComponentType::Int32,
        "UNSIGNED_INT" => ComponentType::UInt32,
        "FLOAT" => ComponentType::Float32,
        "DOUBLE" => ComponentType::Float64,
        _ => ComponentType::Invalid,
    }
}

/// Maps a 3D Tiles BatchTable `type` to its number of components. Unknown types map to 0
pub fn component_count_from_type(type_name: &str) -> usize {
    match type_name {
        "SCALAR" => 1,
        "VEC2" => 2,
        "VEC3" => 3,
        "VEC4" => 4,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn header_bytes(header: &PntsHeader) -> Vec<u8> {
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
        bytes
    }

    #[test]
    fn test_parse_header_and_ranges() {
        let header = PntsHeader::new(1, 28 + 10 + 20 + 30 + 40, 10, 20, 30, 40);
        let mut bytes = header_bytes(&header);
        bytes.resize(header.byte_length as usize, 0);

        let (actual_header, ranges) = PntsHeader::parse(&bytes).expect("Could not parse header");
        assert_eq!(header, actual_header);
        assert!(actual_header.is_consistent());
        assert_eq!(28..38, ranges.feature_table_json);
        assert_eq!(38..58, ranges.feature_table_binary);
        assert_eq!(58..88, ranges.batch_table_json);
        assert_eq!(88..128, ranges.batch_table_binary);
    }

    #[test]
    fn test_header_binary_layout() {
        let header = PntsHeader::new(1, 1016024, 156, 761688, 256, 253896);
        let encoded = bincode::serialize(&header).expect("Could not serialize header");
        assert_eq!(PntsHeader::BYTE_LENGTH, encoded.len());
        assert_eq!(header_bytes(&header), encoded);
        assert_eq!(
            header,
            bincode::deserialize::<PntsHeader>(&encoded).expect("Could not deserialize header")
        );
    }

    #[test]
    fn test_parse_header_too_small() {
        let header = PntsHeader::new(1, 28, 0, 0, 0, 0);
        let bytes = header_bytes(&header);
        let err = PntsHeader::parse(&bytes[..27]).unwrap_err();
        assert!(matches!(err, DecodeError::TooSmall { actual: 27, .. }));
    }

    #[test]
    fn test_parse_header_bad_magic() {
        let header = PntsHeader::new(1, 28, 0, 0, 0, 0);
        let mut bytes = header_bytes(&header);
        bytes[0..4].copy_from_slice(b"b3dm");
        let err = PntsHeader::parse(&bytes).unwrap_err();
        assert!(matches!(err, DecodeError::BadMagic { magic } if &magic == b"b3dm"));
    }

    #[test]
    fn test_parse_header_range_overflow() {
        let header = PntsHeader::new(1, 100, 8, 64, 0, u32::MAX);
        let mut bytes = header_bytes(&header);
        bytes.resize(100, 0);
        let err = PntsHeader::parse(&bytes).unwrap_err();
        match err {
            DecodeError::RangeOverflow { segment, .. } => {
                assert_eq!("batch table binary", segment)
            }
            other => panic!("Unexpected error {other}"),
        }
    }

    #[test]
    fn test_component_type_lookup() {
        let names = [
            "BYTE",
            "UNSIGNED_BYTE",
            "SHORT",
            "UNSIGNED_SHORT",
            "INT",
            "UNSIGNED_INT",
            "FLOAT",
            "DOUBLE",
        ];
        let widths = [1, 1, 2, 2, 4, 4, 4, 8];

        let types = names
            .iter()
            .map(|name| component_type_from_name(name))
            .collect::<Vec<_>>();
        assert_eq!(names.len(), types.iter().collect::<HashSet<_>>().len());
        assert_eq!(&ComponentType::ALL_VALID[..], &types[..]);
        for ((name, component_type), width) in names.iter().zip(types.iter()).zip(widths) {
            assert!(component_type.is_valid());
            assert_eq!(width, component_type.byte_width(), "{name}");
            assert_eq!(Some(*name), component_type.name());
        }

        assert_eq!(ComponentType::Invalid, component_type_from_name("HALF"));
        assert_eq!(ComponentType::Invalid, component_type_from_name("float"));
        assert_eq!(0, ComponentType::Invalid.byte_width());
    }

    #[test]
    fn test_component_count_lookup() {
        assert_eq!(1, component_count_from_type("SCALAR"));
        assert_eq!(2, component_count_from_type("VEC2"));
        assert_eq!(3, component_count_from_type("VEC3"));
        assert_eq!(4, component_count_from_type("VEC4"));
        assert_eq!(0, component_count_from_type("MAT4"));
        assert_eq!(0, component_count_from_type(""));
    }

    #[test]
    fn test_component_value_conversion() {
        assert_eq!(Some(-2.0), ComponentType::Int8.read_as_f64(&[0xfe]));
        assert_eq!(Some(513.0), ComponentType::UInt16.read_as_f64(&[1, 2]));
        assert_eq!(
            Some(1.5),
            ComponentType::Float32.read_as_f64(&1.5_f32.to_le_bytes())
        );
        assert_eq!(None, ComponentType::Float64.read_as_f64(&[0; 4]));
        assert_eq!(Some(0x0403_0201), ComponentType::UInt32.read_as_u32(&[1, 2, 3, 4]));
        assert_eq!(None, ComponentType::Float32.read_as_u32(&[0; 4]));
        assert_eq!(Some(255), ComponentType::UInt8.read_as_u32(&[0xff]));
        assert_eq!(None, ComponentType::Int8.read_as_u32(&[0xff]));
        assert_eq!(None, ComponentType::Int32.read_as_u32(&[1, 2, 3, 4]));
    }
}
