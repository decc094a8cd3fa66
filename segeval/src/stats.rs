//! 训练集上的类别占比与类别权重。

use crate::error::{EvalError, Result};
use crate::io::source::to_label;
use crate::io::{read_volume, ImageLabelPair};
use ndarray::ArrayView3;
use std::fmt;
use tracing::{debug, warn};

/// 逐体数据累积各类别的体素占比与类别权重。
#[derive(Clone, Debug, PartialEq)]
pub struct ClassStats {
    percent_sum: Vec<f64>,
    weight_sum: Vec<f64>,
    volumes: usize,
}

impl ClassStats {
    pub fn new(n_classes: usize) -> Self {
        Self {
            percent_sum: vec![0.0; n_classes],
            weight_sum: vec![0.0; n_classes],
            volumes: 0,
        }
    }

    #[inline]
    pub fn n_classes(&self) -> usize {
        self.percent_sum.len()
    }

    #[inline]
    pub fn volumes(&self) -> usize {
        self.volumes
    }

    /// 加入一个标签体数据。
    pub fn update(&mut self, labels: ArrayView3<u8>) -> Result<()> {
        let n = self.n_classes();
        let mut counts = vec![0usize; n];
        for &v in labels.iter() {
            let slot = counts.get_mut(v as usize).ok_or_else(|| EvalError::LabelOutOfRange {
                value: f64::from(v),
                n_classes: n,
            })?;
            *slot += 1;
        }
        let total = labels.len().max(1) as f64;
        for (sum, &c) in self.percent_sum.iter_mut().zip(counts.iter()) {
            *sum += c as f64 * 100.0 / total;
        }
        // 本体数据内归一化的逆频率；未出现的类别记0
        let inv: Vec<f64> = counts
            .iter()
            .map(|&c| if c > 0 { total / c as f64 } else { 0.0 })
            .collect();
        let inv_sum: f64 = inv.iter().sum();
        if inv_sum > 0.0 {
            for (sum, w) in self.weight_sum.iter_mut().zip(inv) {
                *sum += w / inv_sum;
            }
        }
        self.volumes += 1;
        Ok(())
    }

    /// 各类别在单个体数据中的平均占比（百分数）。
    pub fn percentages(&self) -> Vec<f64> {
        let n = self.volumes.max(1) as f64;
        self.percent_sum.iter().map(|s| s / n).collect()
    }

    /// 类别权重：每个体数据内逆频率归一化到和为1，再在体数据间取平均。
    ///
    /// 在某个体数据中未出现的类别在该体数据中的权重为0。
    pub fn weights(&self) -> Vec<f64> {
        let n = self.volumes.max(1) as f64;
        self.weight_sum.iter().map(|s| s / n).collect()
    }
}

impl fmt::Display for ClassStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "volumes: {}", self.volumes)?;
        for (i, (p, w)) in self.percentages().iter().zip(self.weights()).enumerate() {
            writeln!(f, "class {i}: {p:.4}% weight {w:.6}")?;
        }
        Ok(())
    }
}

/// 读取所有带标签样本的标签，统计类别占比。没有标签的样本被跳过。
pub fn collect_class_stats(pairs: &[ImageLabelPair], n_classes: usize) -> Result<ClassStats> {
    let mut stats = ClassStats::new(n_classes);
    for path in pairs.iter().filter_map(|p| p.label.as_ref()) {
        let (raw, _) = read_volume(path)?;
        stats.update(to_label(raw)?.view())?;
        debug!("已统计 `{}`", path.display());
    }
    if stats.volumes() == 0 {
        warn!("没有任何带标签的样本");
    }
    Ok(stats)
}
