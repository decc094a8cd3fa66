//! 忽略`NaN`的聚合。

use std::fmt;
use std::str::FromStr;

/// 样本维度上的聚合方式。
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum Reduction {
    #[default]
    Mean,
    Median,
}

impl Reduction {
    pub fn name(self) -> &'static str {
        match self {
            Reduction::Mean => "mean",
            Reduction::Median => "median",
        }
    }

    /// 对一列（同一类别、所有样本）的分数做聚合。
    #[inline]
    pub fn reduce(self, column: &[f64]) -> f64 {
        match self {
            Reduction::Mean => nan_mean(column),
            Reduction::Median => nan_median(column),
        }
    }
}

impl FromStr for Reduction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mean" => Ok(Reduction::Mean),
            "median" => Ok(Reduction::Median),
            _ => Err(format!("未知的聚合方式 `{s}`，可选 mean / median")),
        }
    }
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 非`NaN`值的平均；全为`NaN`或为空时返回`NaN`。
pub fn nan_mean(values: &[f64]) -> f64 {
    let (sum, n) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), &v| (s + v, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

/// 非`NaN`值的中位数，偶数个时取中间两个的平均；全为`NaN`或为空时返回`NaN`。
pub fn nan_median(values: &[f64]) -> f64 {
    let mut v: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if v.is_empty() {
        return f64::NAN;
    }
    v.sort_unstable_by(f64::total_cmp);
    let mid = v.len() / 2;
    if v.len() % 2 == 1 {
        v[mid]
    } else {
        (v[mid - 1] + v[mid]) / 2.0
    }
}
