pub mod log;
pub mod orient;
pub mod transform;

pub use log::AccTimer;
pub use orient::{AxisCode, Orientation, Reorientation};
pub use transform::{crop, pad, scale_intensity, PadMode, Padding};
