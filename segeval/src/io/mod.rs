//! 数据集清单、NIfTI读写、体数据预取与预测落盘。
pub mod manifest;
pub mod nii;
pub mod source;
pub mod writer;

pub use manifest::{ImageLabelPair, Manifest, Split, MANIFEST_FILE};
pub use nii::{read_volume, volume_stem, write_labels};
pub use source::{Prefetch, Preprocess, VolumeSource};
pub use writer::PredictionWriter;
