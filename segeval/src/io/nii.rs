//! NIfTI体数据的读写与仿射矩阵换算。

use crate::error::{EvalError, Result};
use crate::volume::Affine;
use ndarray::{Array3, ArrayView3, Axis, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use std::fs;
use std::path::Path;

/// 由头部计算体素到世界坐标的仿射矩阵。优先sform，其次qform，都没有时仅用体素间距。
pub fn affine_from_header(header: &NiftiHeader) -> Affine {
    if header.sform_code > 0 {
        let row = |r: &[f32; 4]| [r[0] as f64, r[1] as f64, r[2] as f64, r[3] as f64];
        return [
            row(&header.srow_x),
            row(&header.srow_y),
            row(&header.srow_z),
            [0.0, 0.0, 0.0, 1.0],
        ];
    }
    let px = header.pixdim[1] as f64;
    let py = header.pixdim[2] as f64;
    let pz = header.pixdim[3] as f64;
    if header.qform_code > 0 {
        let (b, c, d) = (
            header.quatern_b as f64,
            header.quatern_c as f64,
            header.quatern_d as f64,
        );
        let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
        let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let r = [
            [
                a * a + b * b - c * c - d * d,
                2.0 * (b * c - a * d),
                2.0 * (b * d + a * c),
            ],
            [
                2.0 * (b * c + a * d),
                a * a + c * c - b * b - d * d,
                2.0 * (c * d - a * b),
            ],
            [
                2.0 * (b * d - a * c),
                2.0 * (c * d + a * b),
                a * a + d * d - b * b - c * c,
            ],
        ];
        let scale = [px, py, qfac * pz];
        let offset = [
            header.quatern_x as f64,
            header.quatern_y as f64,
            header.quatern_z as f64,
        ];
        let mut m = [[0.0; 4]; 4];
        for i in 0..3 {
            for j in 0..3 {
                m[i][j] = r[i][j] * scale[j];
            }
            m[i][3] = offset[i];
        }
        m[3][3] = 1.0;
        return m;
    }
    [
        [px, 0.0, 0.0, 0.0],
        [0.0, py, 0.0, 0.0],
        [0.0, 0.0, pz, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]
}

/// 以`affine`作为sform构造一个输出用的头部。
pub fn header_from_affine(affine: &Affine) -> NiftiHeader {
    let mut h = NiftiHeader::default();
    let row = |r: &[f64; 4]| [r[0] as f32, r[1] as f32, r[2] as f32, r[3] as f32];
    h.srow_x = row(&affine[0]);
    h.srow_y = row(&affine[1]);
    h.srow_z = row(&affine[2]);
    h.sform_code = 1;
    h.qform_code = 0;
    h.pixdim[0] = 1.0;
    for j in 0..3 {
        let norm = (0..3).map(|i| affine[i][j] * affine[i][j]).sum::<f64>().sqrt();
        h.pixdim[j + 1] = norm as f32;
    }
    h.scl_slope = 1.0;
    h.scl_inter = 0.0;
    h
}

/// 读取三维体数据（或末维为1的四维体数据）及其仿射矩阵。
pub fn read_volume(path: impl AsRef<Path>) -> Result<(Array3<f32>, Affine)> {
    let path = path.as_ref();
    let obj = ReaderOptions::new().read_file(path)?;
    let affine = affine_from_header(obj.header());
    let data = obj.into_volume().into_ndarray::<f32>()?;
    let data = match data.ndim() {
        3 => data,
        4 if data.shape()[3] == 1 => data.index_axis_move(Axis(3), 0),
        _ => {
            return Err(EvalError::shape(format!(
                "`{}` 的形状 {:?} 不是三维体数据",
                path.display(),
                data.shape()
            )))
        }
    };
    Ok((data.into_dimensionality::<Ix3>()?, affine))
}

/// 以`u8`写出标签体数据。扩展名为`.nii.gz`时压缩。会创建缺失的父目录。
pub fn write_labels(path: impl AsRef<Path>, labels: ArrayView3<u8>, affine: &Affine) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let header = header_from_affine(affine);
    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&labels)?;
    Ok(())
}

/// 去掉`.nii.gz`或`.nii`后缀的文件名。
pub fn volume_stem(path: impl AsRef<Path>) -> String {
    let name = path
        .as_ref()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    for ext in [".nii.gz", ".nii"] {
        if let Some(stem) = name.strip_suffix(ext) {
            return stem.to_owned();
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn sample_affine() -> Affine {
        [
            [-0.5, 0.0, 0.0, 12.0],
            [0.0, 0.0, 2.0, -3.0],
            [0.0, -1.5, 0.0, 40.0],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }

    #[test]
    fn test_volume_stem() {
        assert_eq!(volume_stem("/a/b/case_01.nii.gz"), "case_01");
        assert_eq!(volume_stem("case.nii"), "case");
        assert_eq!(volume_stem("raw.npy"), "raw.npy");
    }

    #[test]
    fn test_pixdim_fallback() {
        let mut h = NiftiHeader::default();
        h.sform_code = 0;
        h.qform_code = 0;
        h.pixdim = [1.0, 0.5, 2.0, 3.0, 1.0, 1.0, 1.0, 1.0];
        let a = affine_from_header(&h);
        assert_eq!(a[0][0], 0.5);
        assert_eq!(a[1][1], 2.0);
        assert_eq!(a[2][2], 3.0);
    }

    #[test]
    fn test_qform_rotation() {
        // 绕z轴旋转180°：b = c = 0，d = 1
        let mut h = NiftiHeader::default();
        h.sform_code = 0;
        h.qform_code = 1;
        h.quatern_b = 0.0;
        h.quatern_c = 0.0;
        h.quatern_d = 1.0;
        h.quatern_x = 5.0;
        h.pixdim = [1.0, 2.0, 2.0, 4.0, 1.0, 1.0, 1.0, 1.0];
        let a = affine_from_header(&h);
        assert!((a[0][0] + 2.0).abs() < 1e-9);
        assert!((a[1][1] + 2.0).abs() < 1e-9);
        assert!((a[2][2] - 4.0).abs() < 1e-9);
        assert_eq!(a[0][3], 5.0);
    }

    #[test]
    fn test_header_from_affine() {
        let h = header_from_affine(&sample_affine());
        assert_eq!(h.sform_code, 1);
        assert_eq!(&h.pixdim[1..4], &[0.5, 1.5, 2.0]);
        assert_eq!(affine_from_header(&h), sample_affine());
    }

    #[test]
    fn test_write_then_read_keeps_grid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("labels.nii.gz");
        let labels = Array3::from_shape_fn((4, 3, 2), |(i, j, k)| ((i + 2 * j + k) % 3) as u8);
        write_labels(&path, labels.view(), &sample_affine()).unwrap();

        let (back, affine) = read_volume(&path).unwrap();
        assert_eq!(back.dim(), (4, 3, 2));
        assert_eq!(back.mapv(|v| v as u8), labels);
        assert_eq!(affine, sample_affine());
    }
}
