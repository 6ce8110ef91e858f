//! Decoder for point cloud tiles (`.pnts`) of the [3D Tiles](https://github.com/CesiumGS/3d-tiles) standard.
//!
//! ```no_run
//! use pnts_io::tiles3d::PntsDecoder;
//!
//! let mut decoder = PntsDecoder::new();
//! let points = decoder.load_file("tile.pnts")?;
//! println!("{} points, first at {:?}", points.point_count, points.position(0));
//! # Ok::<(), pnts_io::DecodeError>(())
//! ```
//!
//! Tiles with Draco-compressed point data require a `PointCloudCodec`, see `PntsDecoder::with_codec`.

mod error;
pub use self::error::*;

mod options;
pub use self::options::*;

pub mod tiles3d;
