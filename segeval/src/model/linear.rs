//! 逐体素的线性分类头（1×1×1卷积）。

use super::ModelError;
use crate::error::{EvalError, Result};
use crate::patch::{Inference, PatchPlacement};
use json::JsonValue;
use ndarray::{Array1, Array2, Array5, ArrayView5, Axis};
use std::fs;
use std::path::Path;

/// `scores[o] = Σ_i weight[o, i] · x[i] + bias[o]`，逐体素施加。
#[derive(Clone, Debug, PartialEq)]
pub struct VoxelLinear {
    weight: Array2<f32>,
    bias: Array1<f32>,
}

impl VoxelLinear {
    /// `weight`为`[C_out, C_in]`，`bias`为`[C_out]`。
    pub fn new(weight: Array2<f32>, bias: Array1<f32>) -> Result<Self> {
        if weight.nrows() != bias.len() || weight.nrows() == 0 || weight.ncols() == 0 {
            return Err(EvalError::shape(format!(
                "权重 {:?} 与偏置 {:?} 不匹配",
                weight.shape(),
                bias.shape()
            )));
        }
        Ok(Self { weight, bias })
    }

    /// 读取`{"out_channels": C, "weight": [[..]], "bias": [..]}`格式的检查点。
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let err = |msg: String| EvalError::Checkpoint {
            path: path.to_path_buf(),
            msg,
        };
        let text = fs::read_to_string(path).map_err(|e| err(e.to_string()))?;
        let doc = json::parse(&text).map_err(|e| err(e.to_string()))?;

        let floats = |v: &JsonValue, what: &str| -> Result<Vec<f32>> {
            if !v.is_array() {
                return Err(err(format!("`{what}` 不是数组")));
            }
            v.members()
                .map(|x| x.as_f32().ok_or_else(|| err(format!("`{what}` 含有非数值元素"))))
                .collect()
        };
        let rows = &doc["weight"];
        if !rows.is_array() || rows.is_empty() {
            return Err(err("`weight` 必须是非空二维数组".into()));
        }
        let rows: Vec<Vec<f32>> = rows
            .members()
            .map(|r| floats(r, "weight"))
            .collect::<Result<_>>()?;
        let c_in = rows[0].len();
        if rows.iter().any(|r| r.len() != c_in) {
            return Err(err("`weight` 各行长度不一致".into()));
        }
        let c_out = rows.len();
        if let Some(declared) = doc["out_channels"].as_usize() {
            if declared != c_out {
                return Err(err(format!("out_channels = {declared}，而 weight 有 {c_out} 行")));
            }
        }
        let weight = Array2::from_shape_vec((c_out, c_in), rows.concat())?;
        let bias = match &doc["bias"] {
            JsonValue::Null => Array1::zeros(c_out),
            v => Array1::from(floats(v, "bias")?),
        };
        Self::new(weight, bias).map_err(|e| err(e.to_string()))
    }

    #[inline]
    pub fn in_channels(&self) -> usize {
        self.weight.ncols()
    }

    #[inline]
    pub fn out_channels(&self) -> usize {
        self.weight.nrows()
    }
}

impl Inference for VoxelLinear {
    type Error = ModelError;

    fn infer(
        &mut self,
        patches: ArrayView5<'_, f32>,
        _placements: &[PatchPlacement],
    ) -> std::result::Result<Array5<f32>, Self::Error> {
        let (n, c_in, x, y, z) = patches.dim();
        if c_in != self.in_channels() {
            return Err(ModelError::Channels {
                expected: self.in_channels(),
                got: c_in,
            });
        }
        let mut out = Array5::<f32>::zeros((n, self.out_channels(), x, y, z));
        for (mut o_patch, i_patch) in out.outer_iter_mut().zip(patches.outer_iter()) {
            for (o, mut scores) in o_patch.outer_iter_mut().enumerate() {
                scores.fill(self.bias[o]);
                for (i, input) in i_patch.axis_iter(Axis(0)).enumerate() {
                    scores.scaled_add(self.weight[[o, i]], &input);
                }
            }
        }
        Ok(out)
    }
}
