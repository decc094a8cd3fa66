//! 评估流程中的错误类型。

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EvalError>;

#[derive(Error, Debug)]
pub enum EvalError {
    /// 补丁大小超过（未填充的）体数据范围，或重叠率不在`[0, 1)`内。
    #[error("非法几何参数: {0}")]
    InvalidGeometry(String),
    /// 标签值超出声明的类别数。视为数据损坏，整个评估中止。
    #[error("标签值 {value} 超出类别范围 [0, {n_classes})")]
    LabelOutOfRange { value: f64, n_classes: usize },
    /// 模型推理失败。任何一个补丁失败都会使整个体数据的结果失效。
    #[error("推理失败: {0}")]
    InferenceFailure(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("清单文件 `{path}` 错误: {msg}")]
    Manifest { path: PathBuf, msg: String },
    #[error("检查点 `{path}` 错误: {msg}")]
    Checkpoint { path: PathBuf, msg: String },
    #[error("配置错误: {0}")]
    Config(String),
    #[error("形状不匹配: {0}")]
    ShapeMismatch(String),
    #[error("NIfTI 错误: {0}")]
    Nifti(#[from] nifti::NiftiError),
    #[error("npy 读取错误: {0}")]
    Npy(#[from] ndarray_npy::ReadNpyError),
    #[error("数组形状错误: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),
}

impl EvalError {
    #[inline]
    pub fn geometry(msg: impl Into<String>) -> Self {
        EvalError::InvalidGeometry(msg.into())
    }

    #[inline]
    pub fn shape(msg: impl Into<String>) -> Self {
        EvalError::ShapeMismatch(msg.into())
    }

    /// 推理失败是否来自模型本身（而不是数据或配置）。
    #[inline]
    pub fn is_inference_failure(&self) -> bool {
        matches!(self, EvalError::InferenceFailure(_))
    }
}
