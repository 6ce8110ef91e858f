use anyhow::{anyhow, Result};

use super::ComponentType;

/// The ASCII signature at the start of every Draco-compressed buffer
pub const DRACO_SIGNATURE: &[u8; 5] = b"DRACO";

/// Kind of an attribute in a decoded point cloud, mirroring the geometry attribute types of Draco
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryAttributeKind {
    Position,
    Normal,
    Color,
    /// Texture coordinates. Point clouds in .pnts tiles have none, so these are never extracted
    TexCoord,
    /// Any attribute without a well-known meaning. For .pnts tiles, these are the BatchTable properties
    Generic,
}

/// A single attribute of a `DecodedPointCloud`. Values are stored per point (i.e. already mapped from
/// attribute value indices to point indices), tightly packed and in little-endian byte order
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAttribute {
    pub kind: GeometryAttributeKind,
    pub component_type: ComponentType,
    pub component_count: usize,
    pub data: Vec<u8>,
}

impl DecodedAttribute {
    /// Size in bytes of the value of a single point
    pub fn stride(&self) -> usize {
        self.component_type.byte_width() * self.component_count
    }

    /// Raw bytes of the value of the point at `point_index`
    pub fn point_bytes(&self, point_index: usize) -> Option<&[u8]> {
        let stride = self.stride();
        let start = point_index.checked_mul(stride)?;
        self.data.get(start..start + stride)
    }

    /// Reads the first `N` components of the point at `point_index`, converted to `f32`
    pub fn read_f32<const N: usize>(&self, point_index: usize) -> Option<[f32; N]> {
        let bytes = self.point_bytes(point_index)?;
        let width = self.component_type.byte_width();
        let mut ret = [0.0; N];
        for (idx, component) in ret.iter_mut().enumerate() {
            *component = self.component_type.read_as_f64(bytes.get(idx * width..)?)? as f32;
        }
        Some(ret)
    }

    /// Reads the first `N` components of the point at `point_index`, converted to `u8`. Components
    /// outside of `[0;255]` are saturated
    pub fn read_u8<const N: usize>(&self, point_index: usize) -> Option<[u8; N]> {
        let bytes = self.point_bytes(point_index)?;
        if self.component_type == ComponentType::UInt8 {
            return bytes.get(..N)?.try_into().ok();
        }
        let width = self.component_type.byte_width();
        let mut ret = [0; N];
        for (idx, component) in ret.iter_mut().enumerate() {
            *component = self.component_type.read_as_f64(bytes.get(idx * width..)?)? as u8;
        }
        Some(ret)
    }
}

/// A point cloud as returned by a `PointCloudCodec`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedPointCloud {
    pub num_points: u32,
    /// All attributes in storage order
    pub attributes: Vec<DecodedAttribute>,
}

impl DecodedPointCloud {
    /// Returns the first attribute of the given kind
    pub fn named_attribute(&self, kind: GeometryAttributeKind) -> Option<&DecodedAttribute> {
        self.attributes.iter().find(|attribute| attribute.kind == kind)
    }

    /// Iterates over all `Generic` attributes in storage order
    pub fn generic_attributes(&self) -> impl Iterator<Item = &DecodedAttribute> + '_ {
        self.attributes
            .iter()
            .filter(|attribute| attribute.kind == GeometryAttributeKind::Generic)
    }
}

/// Decoder for compressed point cloud payloads (e.g. Draco) embedded in the FeatureTable of a .pnts tile.
/// The decoder itself is an external component, this trait is the seam through which it is plugged into
/// `PntsDecoder`
pub trait PointCloudCodec {
    /// Decode the compressed `data` into a point cloud
    fn decode(&self, data: &[u8]) -> Result<DecodedPointCloud>;
}

impl<C: PointCloudCodec + ?Sized> PointCloudCodec for &C {
    fn decode(&self, data: &[u8]) -> Result<DecodedPointCloud> {
        (**self).decode(data)
    }
}

impl<C: PointCloudCodec + ?Sized> PointCloudCodec for Box<C> {
    fn decode(&self, data: &[u8]) -> Result<DecodedPointCloud> {
        (**self).decode(data)
    }
}

/// A `PointCloudCodec` that can't decode anything. Used by `PntsDecoder` if no codec is configured, so
/// that compressed tiles fail with a meaningful error while uncompressed tiles decode normally
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCodec;

impl PointCloudCodec for NoCodec {
    fn decode(&self, data: &[u8]) -> Result<DecodedPointCloud> {
        Err(anyhow!(
            "No point cloud codec configured, cannot decode {} bytes of compressed data",
            data.len()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_conversions() {
        let attribute = DecodedAttribute {
            kind: GeometryAttributeKind::Color,
            component_type: ComponentType::UInt16,
            component_count: 3,
            data: [10_u16, 300, 20, 1, 2, 3]
                .iter()
                .flat_map(|v| v.to_le_bytes())
                .collect(),
        };
        assert_eq!(6, attribute.stride());
        assert_eq!(Some([10, 255, 20]), attribute.read_u8::<3>(0));
        assert_eq!(Some([1.0, 2.0, 3.0]), attribute.read_f32::<3>(1));
        assert_eq!(None, attribute.read_f32::<3>(2));
        assert_eq!(None, attribute.read_f32::<4>(0));
    }

    #[test]
    fn test_named_and_generic_attributes() {
        let attribute = |kind| DecodedAttribute {
            kind,
            component_type: ComponentType::UInt8,
            component_count: 1,
            data: vec![],
        };
        let cloud = DecodedPointCloud {
            num_points: 0,
            attributes: vec![
                attribute(GeometryAttributeKind::Generic),
                attribute(GeometryAttributeKind::Position),
                attribute(GeometryAttributeKind::Generic),
                attribute(GeometryAttributeKind::TexCoord),
            ],
        };
        assert!(cloud.named_attribute(GeometryAttributeKind::Position).is_some());
        assert!(cloud.named_attribute(GeometryAttributeKind::Normal).is_none());
        assert_eq!(2, cloud.generic_attributes().count());
        assert!(cloud.named_attribute(GeometryAttributeKind::TexCoord).is_some());
    }

    #[test]
    fn test_no_codec_fails() {
        assert!(NoCodec.decode(b"DRACO").is_err());
    }
}
