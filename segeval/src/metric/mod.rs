//! 分割指标：Dice、精确率与敏感度。
mod aggregate;
mod confusion;
mod reduce;

pub use aggregate::{MetricAggregator, MetricReport, MetricSummary};
pub use confusion::{ConfusionRecord, Metric};
pub use reduce::{nan_mean, nan_median, Reduction};
