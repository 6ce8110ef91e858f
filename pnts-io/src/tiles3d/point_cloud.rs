use nalgebra::Vector3;

use super::ComponentType;

/// Values of a single BatchTable property, as extracted from a .pnts tile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchAttributeValues {
    /// Tightly packed little-endian values, `stride` bytes per value. A `stride` of zero marks a property
    /// whose layout was not understood, in which case `data` is empty
    Binary { data: Vec<u8>, stride: usize },
    /// The JSON text of each value, for properties that are stored inline in the BatchTable JSON
    Literal(Vec<String>),
}

impl BatchAttributeValues {
    /// Number of values of this property
    pub fn len(&self) -> usize {
        match self {
            BatchAttributeValues::Binary { data, stride } => {
                if *stride == 0 {
                    0
                } else {
                    data.len() / stride
                }
            }
            BatchAttributeValues::Literal(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The point data of a decoded .pnts tile. All buffers are flat: positions and normals contain three
/// floats per point, colors three (RGB) or four (RGBA) bytes per point
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloudData {
    pub point_count: u32,
    pub positions: Vec<f32>,
    pub colors: Vec<u8>,
    /// 3 for RGB, 4 for RGBA, 0 if the tile has no per-point colors
    pub color_components: usize,
    pub normals: Vec<f32>,
    /// Raw per-point batch IDs. Empty if the tile has no `BATCH_ID` semantic, in which case each point is
    /// its own batch (i.e. BatchTable rows map 1:1 to points)
    pub batch_ids: Vec<u8>,
    /// Component type of the values in `batch_ids`
    pub batch_id_component_type: Option<ComponentType>,
    /// One entry per BatchTable property, in the order of `PntsDecoder::batch_descriptors`
    pub attributes: Vec<BatchAttributeValues>,
    /// Offset that positions are relative to, if the tile defines `RTC_CENTER`
    pub rtc_center: Option<Vector3<f64>>,
}

impl PointCloudData {
    pub fn len(&self) -> usize {
        self.point_count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.point_count == 0
    }

    pub fn position(&self, point_index: usize) -> Option<Vector3<f32>> {
        vec3_at(&self.positions, point_index)
    }

    pub fn normal(&self, point_index: usize) -> Option<Vector3<f32>> {
        vec3_at(&self.normals, point_index)
    }

    /// Color of the point at `point_index`. Has 3 entries for RGB and 4 entries for RGBA colors
    pub fn color(&self, point_index: usize) -> Option<&[u8]> {
        if self.color_components == 0 {
            return None;
        }
        let start = point_index.checked_mul(self.color_components)?;
        self.colors.get(start..start + self.color_components)
    }

    /// The batch ID of the point at `point_index`. If the tile stores no batch IDs, the point index itself
    /// is the batch ID
    pub fn batch_id(&self, point_index: usize) -> Option<u32> {
        if point_index >= self.len() {
            return None;
        }
        if self.batch_ids.is_empty() {
            return u32::try_from(point_index).ok();
        }
        let component_type = self
            .batch_id_component_type
            .unwrap_or(ComponentType::UInt32);
        let width = component_type.byte_width();
        let bytes = self.batch_ids.get(point_index.checked_mul(width)?..)?;
        component_type.read_as_u32(bytes)
    }

    /// Positions with the `RTC_CENTER` offset applied. Equal to `positions` if there is no offset
    pub fn absolute_positions(&self) -> Vec<Vector3<f64>> {
        let offset = self.rtc_center.unwrap_or_else(Vector3::zeros);
        self.positions
            .chunks_exact(3)
            .map(|p| Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64) + offset)
            .collect()
    }
}

fn vec3_at(values: &[f32], index: usize) -> Option<Vector3<f32>> {
    let start = index.checked_mul(3)?;
    values
        .get(start..start + 3)
        .map(|v| Vector3::new(v[0], v[1], v[2]))
}
