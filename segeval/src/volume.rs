//! 体数据及其空间元数据。

use crate::error::{EvalError, Result};
use crate::prep::orient::Reorientation;
use ndarray::{Array3, Array4};
use std::path::PathBuf;

/// 4×4仿射矩阵（行主序），体素坐标到世界坐标。
pub type Affine = [[f64; 4]; 4];

/// 单位仿射矩阵。
pub const IDENTITY_AFFINE: Affine = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// 两个仿射矩阵相乘`a · b`。
pub fn affine_mul(a: &Affine, b: &Affine) -> Affine {
    let mut out = [[0.0; 4]; 4];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = (0..4).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

/// 从源文件一路携带到预测输出的空间元数据。
///
/// `original_affine`与`original_shape`描述磁盘上的体素网格，任何阶段都不修改；
/// `affine`与`shape`描述预处理（重定向）之后的当前网格。
#[derive(Clone, Debug, PartialEq)]
pub struct SpatialMeta {
    /// 源文件（有标签时为标签文件，否则为图像文件）。
    pub source: PathBuf,
    pub original_affine: Affine,
    pub affine: Affine,
    pub original_shape: [usize; 3],
    pub shape: [usize; 3],
    /// 预处理阶段施加的轴置换与翻转。
    pub reorientation: Reorientation,
}

impl SpatialMeta {
    /// 未经任何重定向的元数据。
    pub fn identity(source: impl Into<PathBuf>, affine: Affine, shape: [usize; 3]) -> Self {
        Self {
            source: source.into(),
            original_affine: affine,
            affine,
            original_shape: shape,
            shape,
            reorientation: Reorientation::identity(),
        }
    }
}

/// 一个待评估的样本：图像`[C, X, Y, Z]`、可选的标签`[X, Y, Z]`与空间元数据。
///
/// 测试集样本没有标签。
#[derive(Clone, Debug)]
pub struct Volume {
    pub image: Array4<f32>,
    pub label: Option<Array3<u8>>,
    pub meta: SpatialMeta,
}

impl Volume {
    /// 检查图像、标签与元数据的空间形状一致，且各轴与通道数均不为0。
    pub fn new(image: Array4<f32>, label: Option<Array3<u8>>, meta: SpatialMeta) -> Result<Self> {
        let (c, x, y, z) = image.dim();
        let shape = [x, y, z];
        if c == 0 || shape.contains(&0) {
            return Err(EvalError::shape(format!(
                "图像形状 {:?} 含有长度为0的轴",
                image.shape()
            )));
        }
        if shape != meta.shape {
            return Err(EvalError::shape(format!(
                "图像空间形状 {shape:?} 与元数据 {:?} 不一致",
                meta.shape
            )));
        }
        if let Some(label) = label.as_ref() {
            let (lx, ly, lz) = label.dim();
            if [lx, ly, lz] != shape {
                return Err(EvalError::shape(format!(
                    "标签形状 {:?} 与图像空间形状 {shape:?} 不一致",
                    [lx, ly, lz]
                )));
            }
        }
        Ok(Self { image, label, meta })
    }

    #[inline]
    pub fn spatial_shape(&self) -> [usize; 3] {
        self.meta.shape
    }
}
