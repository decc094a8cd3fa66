//! 推理后端与模型种类。
mod exported;
mod linear;

pub use exported::ExportedScores;
pub use linear::VoxelLinear;

use crate::error::{EvalError, Result};
use crate::patch::{Inference, PatchPlacement};
use crate::prep::Padding;
use crate::volume::SpatialMeta;
use ndarray::{Array5, ArrayView5};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// 推理后端自身的错误，在重建器边界处被包装为[`EvalError::InferenceFailure`]。
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("找不到体数据 `{0}` 的导出分数")]
    MissingScores(String),
    #[error("尚未开始任何体数据")]
    NoVolume,
    #[error("补丁 {placement:?} 超出分数范围 {shape:?}")]
    OutOfBounds {
        placement: PatchPlacement,
        shape: [usize; 3],
    },
    #[error("输入通道数应为 {expected}，实际为 {got}")]
    Channels { expected: usize, got: usize },
    #[error("{0}")]
    Shape(String),
    #[error("读取导出分数失败: {0}")]
    Npy(#[from] ndarray_npy::ReadNpyError),
}

/// 模型种类。决定补丁形状约定，并由检查点构造推理后端。
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ModelKind {
    Ucaps,
    Segcaps2d,
    Segcaps3d,
    Unet,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::Ucaps,
        ModelKind::Segcaps2d,
        ModelKind::Segcaps3d,
        ModelKind::Unet,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ModelKind::Ucaps => "ucaps",
            ModelKind::Segcaps2d => "segcaps-2d",
            ModelKind::Segcaps3d => "segcaps-3d",
            ModelKind::Unet => "unet",
        }
    }

    /// 是否逐切片推理。
    #[inline]
    pub fn is_slice_wise(self) -> bool {
        self == ModelKind::Segcaps2d
    }

    /// 该模型实际使用的补丁大小：逐切片模型的深度固定为1。
    #[inline]
    pub fn patch_for(self, patch: [usize; 3]) -> [usize; 3] {
        if self.is_slice_wise() {
            [patch[0], patch[1], 1]
        } else {
            patch
        }
    }

    /// 由检查点构造后端：目录为导出分数，`.json`文件为逐体素线性头。
    pub fn build(self, checkpoint: impl AsRef<Path>) -> Result<ModelBackend> {
        let checkpoint = checkpoint.as_ref();
        if checkpoint.is_dir() {
            return Ok(ModelBackend::Exported(ExportedScores::open(checkpoint)?));
        }
        match checkpoint.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(ModelBackend::Linear(VoxelLinear::load(checkpoint)?)),
            _ => Err(EvalError::Checkpoint {
                path: checkpoint.to_path_buf(),
                msg: format!("{} 不支持该检查点格式，需要导出分数目录或 .json 线性头", self),
            }),
        }
    }
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ModelKind::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| format!("未知的模型 `{s}`，可选 ucaps / segcaps-2d / segcaps-3d / unet"))
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 由[`ModelKind::build`]构造的后端。
#[derive(Debug)]
pub enum ModelBackend {
    Exported(ExportedScores),
    Linear(VoxelLinear),
}

impl Inference for ModelBackend {
    type Error = ModelError;

    fn begin_volume(
        &mut self,
        meta: &SpatialMeta,
        padding: &Padding,
    ) -> std::result::Result<(), Self::Error> {
        match self {
            ModelBackend::Exported(m) => m.begin_volume(meta, padding),
            ModelBackend::Linear(m) => m.begin_volume(meta, padding),
        }
    }

    fn infer(
        &mut self,
        patches: ArrayView5<'_, f32>,
        placements: &[PatchPlacement],
    ) -> std::result::Result<Array5<f32>, Self::Error> {
        match self {
            ModelBackend::Exported(m) => m.infer(patches, placements),
            ModelBackend::Linear(m) => m.infer(patches, placements),
        }
    }
}
