pub use super::dataset::DatasetKind;
pub use super::error::EvalError;
pub use super::eval::{run, EvalConfig, Evaluator};
pub use super::io::{
    read_volume, volume_stem, write_labels, ImageLabelPair, Manifest, PredictionWriter,
    Preprocess, Split, VolumeSource,
};
pub use super::metric::{
    ConfusionRecord, Metric, MetricAggregator, MetricReport, MetricSummary, Reduction,
};
pub use super::model::{ExportedScores, ModelBackend, ModelError, ModelKind, VoxelLinear};
pub use super::patch::{
    BlendMode, Inference, InferenceReconstructor, PatchPlacement, PatchScheduler,
};
pub use super::post::{to_discrete_labels, to_one_hot, LabelMap, BACKGROUND};
pub use super::prep::{AccTimer, Orientation, PadMode, Padding, Reorientation};
pub use super::stats::{collect_class_stats, ClassStats};
pub use super::volume::{Affine, SpatialMeta, Volume, IDENTITY_AFFINE};
