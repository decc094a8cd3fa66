//! 补丁融合权重。

use ndarray::Array3;
use std::f32::consts::PI;
use std::fmt;
use std::str::FromStr;

/// 高斯窗的标准差与补丁边长之比。
pub const GAUSSIAN_SIGMA_SCALE: f32 = 0.125;

/// 权重下限，保证权重图处处为正。
const MIN_WEIGHT: f32 = 1e-6;

/// 补丁内的融合权重形状。
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum BlendMode {
    /// 均匀权重。
    #[default]
    Constant,
    /// 边缘余弦衰减（Hann窗，端点不取0）。
    Cosine,
    /// 以补丁中心为均值的高斯窗。
    Gaussian,
}

impl BlendMode {
    pub fn name(self) -> &'static str {
        match self {
            BlendMode::Constant => "constant",
            BlendMode::Cosine => "cosine",
            BlendMode::Gaussian => "gaussian",
        }
    }
}

impl FromStr for BlendMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "constant" => Ok(BlendMode::Constant),
            "cosine" => Ok(BlendMode::Cosine),
            "gaussian" => Ok(BlendMode::Gaussian),
            _ => Err(format!(
                "未知的融合方式 `{s}`，可选 constant / cosine / gaussian"
            )),
        }
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 单个轴上长度为`len`的一维窗，取值在`(0, 1]`。
pub fn axis_window(len: usize, mode: BlendMode) -> Vec<f32> {
    match mode {
        BlendMode::Constant => vec![1.0; len],
        BlendMode::Cosine => {
            let n = len as f32 + 1.0;
            (0..len)
                .map(|i| (0.5 - 0.5 * (2.0 * PI * (i as f32 + 1.0) / n).cos()).max(MIN_WEIGHT))
                .collect()
        }
        BlendMode::Gaussian => {
            let sigma = (len as f32 * GAUSSIAN_SIGMA_SCALE).max(f32::EPSILON);
            let center = (len as f32 - 1.0) / 2.0;
            (0..len)
                .map(|i| {
                    let d = i as f32 - center;
                    (-(d * d) / (2.0 * sigma * sigma)).exp().max(MIN_WEIGHT)
                })
                .collect()
        }
    }
}

/// 补丁的三维权重图：三个轴一维窗的外积。
pub fn weight_map(patch: [usize; 3], mode: BlendMode) -> Array3<f32> {
    let wx = axis_window(patch[0], mode);
    let wy = axis_window(patch[1], mode);
    let wz = axis_window(patch[2], mode);
    Array3::from_shape_fn((patch[0], patch[1], patch[2]), |(i, j, k)| {
        wx[i] * wy[j] * wz[k]
    })
}
