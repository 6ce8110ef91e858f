use serde::{Deserialize, Serialize};

/// Defines how the `PntsDecoder` reports positions if the `RTC_CENTER` global semantic is present
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PntsReadPositionsMode {
    /// Positions are returned as stored. If the position `(10, 10, 10)` is stored in the PNTS file and
    /// `RTC_CENTER` is `(20, 20, 20)`, decoding yields the position `(10, 10, 10)`
    #[default]
    RelativeToCenter,
    /// Positions are returned in absolute coordinates. If the position `(10, 10, 10)` is stored in the PNTS
    /// file and `RTC_CENTER` is `(20, 20, 20)`, decoding yields the position `(30, 30, 30)`
    Absolute,
}

/// Configuration of a `PntsDecoder`. Both size limits bound the memory that a single (possibly hostile)
/// tile can make the decoder allocate
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderOptions {
    /// Maximum size in bytes of a tile that will be decoded
    pub max_buffer_size: u64,
    /// Maximum number of points that a tile may declare
    pub max_point_count: u32,
    pub read_positions_mode: PntsReadPositionsMode,
}

impl DecoderOptions {
    pub const DEFAULT_MAX_BUFFER_SIZE: u64 = 1 << 30;
    pub const DEFAULT_MAX_POINT_COUNT: u32 = 100_000_000;

    pub fn with_max_buffer_size(mut self, max_buffer_size: u64) -> Self {
        self.max_buffer_size = max_buffer_size;
        self
    }

    pub fn with_max_point_count(mut self, max_point_count: u32) -> Self {
        self.max_point_count = max_point_count;
        self
    }

    pub fn with_read_positions_mode(mut self, mode: PntsReadPositionsMode) -> Self {
        self.read_positions_mode = mode;
        self
    }
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            max_buffer_size: Self::DEFAULT_MAX_BUFFER_SIZE,
            max_point_count: Self::DEFAULT_MAX_POINT_COUNT,
            read_positions_mode: PntsReadPositionsMode::default(),
        }
    }
}
