//! 三维医学图像分割的评估：滑动窗口推理、预测重建、指标聚合与预测落盘。
pub mod dataset;
pub mod error;
pub mod eval;
pub mod io;
pub mod metric;
pub mod model;
pub mod patch;
pub mod post;
pub mod prelude;
pub mod prep;
pub mod stats;
pub mod volume;
