//! 单个样本、单个类别的混淆计数与由此导出的指标。

use ndarray::{ArrayView3, Zip};
use std::fmt;
use std::str::FromStr;

/// 真/假阳性、真/假阴性计数。
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct ConfusionRecord {
    pub true_pos: u64,
    pub false_pos: u64,
    pub false_neg: u64,
    pub true_neg: u64,
}

/// 分母为0时返回`NaN`，而不是0：空类别不应拉低聚合结果。
#[inline]
fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        f64::NAN
    } else {
        num as f64 / den as f64
    }
}

impl ConfusionRecord {
    /// 统计一对二值通道（非零即前景）。两者形状必须一致。
    pub fn from_channels(pred: ArrayView3<u8>, truth: ArrayView3<u8>) -> Self {
        let mut r = Self::default();
        Zip::from(&pred).and(&truth).for_each(|&p, &t| match (p != 0, t != 0) {
            (true, true) => r.true_pos += 1,
            (true, false) => r.false_pos += 1,
            (false, true) => r.false_neg += 1,
            (false, false) => r.true_neg += 1,
        });
        r
    }

    /// `2TP / (2TP + FP + FN)`；预测与真值中都不存在该类别时为`NaN`。
    #[inline]
    pub fn dice(&self) -> f64 {
        ratio(
            2 * self.true_pos,
            2 * self.true_pos + self.false_pos + self.false_neg,
        )
    }

    /// `TP / (TP + FP)`。
    #[inline]
    pub fn precision(&self) -> f64 {
        ratio(self.true_pos, self.true_pos + self.false_pos)
    }

    /// `TP / (TP + FN)`。
    #[inline]
    pub fn sensitivity(&self) -> f64 {
        ratio(self.true_pos, self.true_pos + self.false_neg)
    }

    pub fn score(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Dice => self.dice(),
            Metric::Precision => self.precision(),
            Metric::Sensitivity => self.sensitivity(),
        }
    }
}

/// 报告的三种指标。
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Metric {
    Dice,
    Precision,
    Sensitivity,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Dice, Metric::Precision, Metric::Sensitivity];

    pub fn name(self) -> &'static str {
        match self {
            Metric::Dice => "dice",
            Metric::Precision => "precision",
            Metric::Sensitivity => "sensitivity",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| format!("未知的指标 `{s}`"))
    }
}
