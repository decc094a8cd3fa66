//! 预测结果的落盘。

use super::nii::{volume_stem, write_labels};
use crate::error::{EvalError, Result};
use crate::post::LabelMap;
use crate::volume::SpatialMeta;
use ndarray::ArrayView3;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 把离散预测恢复到源文件的体素网格并写出为NIfTI。
#[derive(Clone, Debug)]
pub struct PredictionWriter {
    output_dir: PathBuf,
    postfix: String,
    data_root: Option<PathBuf>,
    label_map: Option<LabelMap>,
}

impl PredictionWriter {
    pub fn new(output_dir: impl Into<PathBuf>, postfix: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            postfix: postfix.into(),
            data_root: None,
            label_map: None,
        }
    }

    /// 源文件相对该目录的文件夹结构会在输出目录下保留。
    #[inline]
    pub fn data_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.data_root = Some(root.into());
        self
    }

    /// 写出前对标签值做映射。
    #[inline]
    pub fn label_map(mut self, map: Option<LabelMap>) -> Self {
        self.label_map = map;
        self
    }

    /// `<output_dir>/<相对文件夹>/<stem>/<stem>_<postfix>.nii.gz`。
    pub fn output_path(&self, source: &Path) -> PathBuf {
        let stem = volume_stem(source);
        let folder = source
            .parent()
            .and_then(|p| {
                self.data_root
                    .as_deref()
                    .and_then(|root| p.strip_prefix(root).ok())
            })
            .map(Path::to_path_buf)
            .unwrap_or_default();
        self.output_dir
            .join(folder)
            .join(&stem)
            .join(format!("{stem}_{}.nii.gz", self.postfix))
    }

    /// 撤销预处理阶段的重定向，再以原始仿射矩阵写出。返回写出的路径。
    pub fn write(&self, labels: ArrayView3<u8>, meta: &SpatialMeta) -> Result<PathBuf> {
        let (x, y, z) = labels.dim();
        if [x, y, z] != meta.shape {
            return Err(EvalError::shape(format!(
                "预测形状 {:?} 与元数据 {:?} 不一致",
                [x, y, z],
                meta.shape
            )));
        }
        let restored = meta.reorientation.inverse().apply3(labels.to_owned());
        let (ox, oy, oz) = restored.dim();
        if [ox, oy, oz] != meta.original_shape {
            return Err(EvalError::shape(format!(
                "恢复方向后的形状 {:?} 与源文件 {:?} 不一致",
                [ox, oy, oz],
                meta.original_shape
            )));
        }
        let restored = match &self.label_map {
            Some(map) => {
                let unmapped = restored.iter().filter(|&&v| !map.covers(v)).count();
                if unmapped > 0 {
                    warn!("{unmapped} 个体素的标签不在映射表中，保持原值");
                }
                map.apply(restored.view())
            }
            None => restored,
        };
        let path = self.output_path(&meta.source);
        write_labels(&path, restored.view(), &meta.original_affine)?;
        debug!("预测已写出到 {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::nii::read_volume;
    use crate::prep::{Orientation, Reorientation};
    use crate::volume::IDENTITY_AFFINE;
    use ndarray::Array3;

    #[test]
    fn test_output_path_keeps_folder() {
        let w = PredictionWriter::new("/out", "ucaps_prediction").data_root("/data/heart");
        assert_eq!(
            w.output_path(Path::new("/data/heart/labelsTr/la_003.nii.gz")),
            PathBuf::from("/out/labelsTr/la_003/la_003_ucaps_prediction.nii.gz")
        );
        let w = PredictionWriter::new("/out", "p");
        assert_eq!(
            w.output_path(Path::new("/elsewhere/x.nii")),
            PathBuf::from("/out/x/x_p.nii.gz")
        );
    }

    #[test]
    fn test_write_restores_orientation_and_maps_labels() {
        let dir = tempfile::tempdir().unwrap();
        let original = Array3::from_shape_fn((4, 3, 2), |(i, j, k)| ((i + j + k) % 4) as u8);
        let reo = Reorientation::between(
            Orientation::from_affine(&IDENTITY_AFFINE),
            Orientation::from_axcodes("LPI").unwrap(),
        );
        let mut meta = SpatialMeta::identity(dir.path().join("case.nii.gz"), IDENTITY_AFFINE, [4, 3, 2]);
        meta.reorientation = reo;
        meta.shape = reo.shape_after(meta.original_shape);
        meta.affine = reo.affine_after(&IDENTITY_AFFINE, meta.original_shape);
        let oriented = reo.apply3(original.clone());

        let w = PredictionWriter::new(dir.path().join("out"), "unet_prediction")
            .label_map(Some(LabelMap::new(&[0, 1, 2, 3], &[0, 10, 150, 250]).unwrap()));
        let path = w.write(oriented.view(), &meta).unwrap();
        assert!(path.ends_with("case/case_unet_prediction.nii.gz"));

        let (back, affine) = read_volume(&path).unwrap();
        assert_eq!(affine, IDENTITY_AFFINE);
        let expected = original.mapv(|v| [0u8, 10, 150, 250][v as usize]);
        assert_eq!(back.mapv(|v| v as u8), expected);
    }

    #[test]
    fn test_shape_checked() {
        let meta = SpatialMeta::identity("a.nii", IDENTITY_AFFINE, [2, 2, 2]);
        let w = PredictionWriter::new("/tmp/unused", "p");
        let labels = Array3::<u8>::zeros((2, 2, 3));
        assert!(matches!(
            w.write(labels.view(), &meta),
            Err(EvalError::ShapeMismatch(_))
        ));
    }
}
