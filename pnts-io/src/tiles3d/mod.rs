mod pnts_decoder;
pub use self::pnts_decoder::*;

mod pnts_types;
pub use self::pnts_types::*;

mod point_cloud;
pub use self::point_cloud::*;

mod feature_table;
pub use self::feature_table::*;

mod batch_table;
pub use self::batch_table::*;

mod codec;
pub use self::codec::*;

mod common;
pub use self::common::*;
