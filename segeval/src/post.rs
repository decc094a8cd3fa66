//! 连续分数到离散标签的投影，以及独热编码。

use crate::error::{EvalError, Result};
use ndarray::{Array3, Array4, ArrayView1, ArrayView3, ArrayView4, Axis};
use std::collections::HashMap;

/// 背景类别的索引。
pub const BACKGROUND: usize = 0;

/// 离散标签能表示的最多类别数。
pub const MAX_CLASSES: usize = u8::MAX as usize + 1;

fn argmax(lane: ArrayView1<f32>) -> u8 {
    let mut best = 0;
    let mut best_v = f32::NEG_INFINITY;
    for (i, &v) in lane.iter().enumerate() {
        // 严格大于：并列时取第一个
        if v > best_v {
            best = i;
            best_v = v;
        }
    }
    best as u8
}

/// 沿通道轴取argmax，`[C, X, Y, Z]` -> `[X, Y, Z]`。
pub fn to_discrete_labels(scores: ArrayView4<f32>) -> Result<Array3<u8>> {
    let c = scores.dim().0;
    if c == 0 || c > MAX_CLASSES {
        return Err(EvalError::shape(format!(
            "分数通道数 {c} 不在 [1, {MAX_CLASSES}] 内"
        )));
    }
    Ok(scores.map_axis(Axis(0), argmax))
}

/// 独热编码，`[X, Y, Z]` -> `[n_classes, X, Y, Z]`，第`k`通道在标签等于`k`处为1。
pub fn to_one_hot(labels: ArrayView3<u8>, n_classes: usize) -> Result<Array4<u8>> {
    if let Some(&bad) = labels.iter().find(|&&v| v as usize >= n_classes) {
        return Err(EvalError::LabelOutOfRange {
            value: f64::from(bad),
            n_classes,
        });
    }
    let (x, y, z) = labels.dim();
    let mut out = Array4::<u8>::zeros((n_classes, x, y, z));
    for ((i, j, k), &v) in labels.indexed_iter() {
        out[[v as usize, i, j, k]] = 1;
    }
    Ok(out)
}

/// 保存前的标签值映射，例如把类别索引`[0, 1, 2, 3]`映射回数据集原始取值`[0, 10, 150, 250]`。
/// 不在映射表中的值保持不变。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelMap {
    table: HashMap<u8, u8>,
}

impl LabelMap {
    pub fn new(orig: &[u8], target: &[u8]) -> Result<Self> {
        if orig.len() != target.len() {
            return Err(EvalError::Config(format!(
                "标签映射长度不一致: {} 与 {}",
                orig.len(),
                target.len()
            )));
        }
        Ok(Self {
            table: orig.iter().copied().zip(target.iter().copied()).collect(),
        })
    }

    #[inline]
    pub fn covers(&self, v: u8) -> bool {
        self.table.contains_key(&v)
    }

    #[inline]
    pub fn map(&self, v: u8) -> u8 {
        self.table.get(&v).copied().unwrap_or(v)
    }

    pub fn apply(&self, labels: ArrayView3<u8>) -> Array3<u8> {
        labels.mapv(|v| self.map(v))
    }
}
