//! 一次评估运行中逐样本、逐类别的指标累积与最终聚合。

use super::confusion::{ConfusionRecord, Metric};
use super::reduce::{nan_mean, Reduction};
use crate::error::{EvalError, Result};
use crate::post::BACKGROUND;
use ndarray::{ArrayView4, Axis};
use std::fmt;
use tracing::warn;

/// 逐样本累积各前景类别的混淆计数，运行结束时由[`MetricAggregator::finalize`]一次性消费。
#[derive(Clone, Debug)]
pub struct MetricAggregator {
    n_classes: usize,
    include_background: bool,
    rows: Vec<Vec<ConfusionRecord>>,
}

impl MetricAggregator {
    /// `n_classes`包括背景。默认不统计背景类别。
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            include_background: false,
            rows: Vec::new(),
        }
    }

    #[inline]
    pub fn with_background(mut self, include: bool) -> Self {
        self.include_background = include;
        self
    }

    /// 报告中的第一个类别索引。
    #[inline]
    pub fn first_class(&self) -> usize {
        if self.include_background {
            BACKGROUND
        } else {
            BACKGROUND + 1
        }
    }

    #[inline]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// 已累积的样本数。
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 加入一个样本。两者均为独热编码`[n_classes, X, Y, Z]`。
    pub fn update(&mut self, pred: ArrayView4<u8>, truth: ArrayView4<u8>) -> Result<()> {
        if pred.dim() != truth.dim() {
            return Err(EvalError::shape(format!(
                "预测 {:?} 与真值 {:?} 形状不一致",
                pred.shape(),
                truth.shape()
            )));
        }
        if pred.dim().0 != self.n_classes {
            return Err(EvalError::shape(format!(
                "独热编码通道数 {} 与类别数 {} 不一致",
                pred.dim().0,
                self.n_classes
            )));
        }
        let row = (self.first_class()..self.n_classes)
            .map(|c| {
                ConfusionRecord::from_channels(
                    pred.index_axis(Axis(0), c),
                    truth.index_axis(Axis(0), c),
                )
            })
            .collect();
        self.rows.push(row);
        Ok(())
    }

    /// 单个指标的报告：先对每列（类别）按`reduction`聚合，再对类别取忽略`NaN`的平均。
    pub fn report(&self, metric: Metric, reduction: Reduction) -> MetricReport {
        let n_cols = self.n_classes.saturating_sub(self.first_class());
        let mut per_class = Vec::with_capacity(n_cols);
        let mut degenerate = Vec::new();
        for col in 0..n_cols {
            let column: Vec<f64> = self.rows.iter().map(|r| r[col].score(metric)).collect();
            let v = reduction.reduce(&column);
            if v.is_nan() {
                degenerate.push(col + self.first_class());
            }
            per_class.push(v);
        }
        if !degenerate.is_empty() {
            warn!("{metric}: 类别 {degenerate:?} 在所有样本中均无定义，不参与平均");
        }
        MetricReport {
            metric,
            reduction,
            first_class: self.first_class(),
            average: nan_mean(&per_class),
            per_class,
            degenerate,
        }
    }

    /// 结束运行，生成三种指标的报告。
    pub fn finalize(self, reduction: Reduction) -> MetricSummary {
        let reports = Metric::ALL
            .into_iter()
            .map(|m| self.report(m, reduction))
            .collect();
        MetricSummary {
            reduction,
            n_samples: self.rows.len(),
            reports,
        }
    }
}

/// 单个指标的聚合结果。
#[derive(Clone, Debug, PartialEq)]
pub struct MetricReport {
    pub metric: Metric,
    pub reduction: Reduction,
    /// `per_class[0]`对应的类别索引。
    pub first_class: usize,
    pub per_class: Vec<f64>,
    /// 跨类别的忽略`NaN`平均（中位数模式下也是平均）。
    pub average: f64,
    /// 所有样本上均为`NaN`的类别。
    pub degenerate: Vec<usize>,
}

impl MetricReport {
    /// 按类别索引取分数。
    pub fn class(&self, class: usize) -> Option<f64> {
        class
            .checked_sub(self.first_class)
            .and_then(|i| self.per_class.get(i).copied())
    }
}

impl fmt::Display for MetricReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.reduction)?;
        writeln!(f, "{}", "-".repeat(40))?;
        writeln!(
            f,
            "Validation {} score average: {:.6}",
            self.metric, self.average
        )?;
        for (i, v) in self.per_class.iter().enumerate() {
            writeln!(
                f,
                "Validation {} score class {}: {:.6}",
                self.metric,
                i + self.first_class,
                v
            )?;
        }
        Ok(())
    }
}

/// 一次运行的全部报告。
#[derive(Clone, Debug, PartialEq)]
pub struct MetricSummary {
    pub reduction: Reduction,
    pub n_samples: usize,
    pub reports: Vec<MetricReport>,
}

impl MetricSummary {
    pub fn report(&self, metric: Metric) -> Option<&MetricReport> {
        self.reports.iter().find(|r| r.metric == metric)
    }
}

impl fmt::Display for MetricSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, r) in self.reports.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{r}")?;
        }
        Ok(())
    }
}
