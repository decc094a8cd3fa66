//! 由外部网络离线导出的逐体数据分数。
//!
//! 每个体数据对应一个`<stem>.npy`文件，形状为`[C, X, Y, Z]`，
//! 网格与预处理（重定向）之后的图像一致。推理时按补丁位置从中切取。

use super::ModelError;
use crate::error::{EvalError, Result};
use crate::io::volume_stem;
use crate::patch::{Inference, PatchPlacement};
use crate::prep::{pad, PadMode, Padding};
use crate::volume::SpatialMeta;
use ndarray::{Array4, Array5, ArrayView5};
use ndarray_npy::read_npy;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug)]
pub struct ExportedScores {
    index: HashMap<String, PathBuf>,
    current: Option<Array4<f32>>,
}

impl ExportedScores {
    /// 索引目录下全部`.npy`文件。
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut index = HashMap::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |e| e == "npy") {
                if let Some(stem) = path.file_stem() {
                    index.insert(stem.to_string_lossy().into_owned(), path.clone());
                }
            }
        }
        if index.is_empty() {
            return Err(EvalError::Checkpoint {
                path: dir.to_path_buf(),
                msg: "目录中没有 .npy 分数文件".into(),
            });
        }
        debug!("{} 中共 {} 个导出分数", dir.display(), index.len());
        Ok(Self {
            index,
            current: None,
        })
    }
}

impl Inference for ExportedScores {
    type Error = ModelError;

    fn begin_volume(
        &mut self,
        meta: &SpatialMeta,
        padding: &Padding,
    ) -> std::result::Result<(), Self::Error> {
        let stem = volume_stem(&meta.source);
        let path = self
            .index
            .get(&stem)
            .ok_or_else(|| ModelError::MissingScores(stem.clone()))?;
        let scores: Array4<f32> = read_npy(path)?;
        let (_, x, y, z) = scores.dim();
        if [x, y, z] != meta.shape {
            return Err(ModelError::Shape(format!(
                "`{}` 的空间形状 {:?} 与体数据 {:?} 不一致",
                path.display(),
                [x, y, z],
                meta.shape
            )));
        }
        let scores = pad(scores.view(), padding, PadMode::Edge);
        self.current = Some(scores);
        Ok(())
    }

    fn infer(
        &mut self,
        patches: ArrayView5<'_, f32>,
        placements: &[PatchPlacement],
    ) -> std::result::Result<Array5<f32>, Self::Error> {
        let scores = self.current.as_ref().ok_or(ModelError::NoVolume)?;
        let (c, x, y, z) = scores.dim();
        let (n, _, px, py, pz) = patches.dim();
        if placements.len() != n {
            return Err(ModelError::Shape(format!(
                "{} 个补丁却给出 {} 个位置",
                n,
                placements.len()
            )));
        }
        let mut out = Array5::<f32>::zeros((n, c, px, py, pz));
        for (mut o, p) in out.outer_iter_mut().zip(placements) {
            let end = p.end();
            if p.size != [px, py, pz] || end[0] > x || end[1] > y || end[2] > z {
                return Err(ModelError::OutOfBounds {
                    placement: *p,
                    shape: [x, y, z],
                });
            }
            o.assign(&scores.slice(p.slice4()));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::IDENTITY_AFFINE;
    use ndarray_npy::write_npy;

    fn scores() -> Array4<f32> {
        Array4::from_shape_fn((2, 4, 3, 2), |(c, i, j, k)| (c * 100 + i * 10 + j * 3 + k) as f32)
    }

    #[test]
    fn test_serves_patch_windows() {
        let dir = tempfile::tempdir().unwrap();
        write_npy(dir.path().join("case_1.npy"), &scores()).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let mut m = ExportedScores::open(dir.path()).unwrap();
        assert_eq!(m.index.len(), 1);

        let meta = SpatialMeta::identity("/data/labelsTr/case_1.nii.gz", IDENTITY_AFFINE, [4, 3, 2]);
        m.begin_volume(&meta, &Padding::default()).unwrap();
        let p = PatchPlacement::new([2, 1, 0], [2, 2, 2]);
        let patches = Array5::<f32>::zeros((1, 1, 2, 2, 2));
        let out = m.infer(patches.view(), &[p]).unwrap();
        assert_eq!(out.dim(), (1, 2, 2, 2, 2));
        assert_eq!(out[[0, 1, 0, 0, 0]], 100.0 + 20.0 + 3.0);
        assert_eq!(out[[0, 0, 1, 1, 1]], 30.0 + 6.0 + 1.0);
    }

    #[test]
    fn test_padding_follows_image() {
        let dir = tempfile::tempdir().unwrap();
        write_npy(dir.path().join("case_1.npy"), &scores()).unwrap();
        let mut m = ExportedScores::open(dir.path()).unwrap();
        let meta = SpatialMeta::identity("case_1.nii.gz", IDENTITY_AFFINE, [4, 3, 2]);
        let padding = Padding::to_fit([4, 3, 2], [4, 4, 4]);
        m.begin_volume(&meta, &padding).unwrap();
        // 填充后的网格为 4x4x4，边缘复制
        let p = PatchPlacement::new([0, 0, 0], [4, 4, 4]);
        let out = m.infer(Array5::<f32>::zeros((1, 1, 4, 4, 4)).view(), &[p]).unwrap();
        assert_eq!(out.dim(), (1, 2, 4, 4, 4));
        assert_eq!(out[[0, 0, 0, 0, 0]], out[[0, 0, 0, 0, 1]]);
        assert_eq!(out[[0, 1, 2, 3, 1]], out[[0, 1, 2, 2, 1]]);
    }

    #[test]
    fn test_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ExportedScores::open(dir.path()),
            Err(EvalError::Checkpoint { .. })
        ));
        write_npy(dir.path().join("case_1.npy"), &scores()).unwrap();
        let mut m = ExportedScores::open(dir.path()).unwrap();
        let patches = Array5::<f32>::zeros((1, 1, 2, 2, 2));
        let p = PatchPlacement::new([0, 0, 0], [2, 2, 2]);
        assert!(matches!(m.infer(patches.view(), &[p]), Err(ModelError::NoVolume)));

        let other = SpatialMeta::identity("case_2.nii.gz", IDENTITY_AFFINE, [4, 3, 2]);
        assert!(matches!(
            m.begin_volume(&other, &Padding::default()),
            Err(ModelError::MissingScores(_))
        ));
        let wrong = SpatialMeta::identity("case_1.nii.gz", IDENTITY_AFFINE, [4, 3, 3]);
        assert!(matches!(
            m.begin_volume(&wrong, &Padding::default()),
            Err(ModelError::Shape(_))
        ));
    }
}
