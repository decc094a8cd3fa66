use super::utils::gray_level;
use anyhow::{bail, Context};
use clap::Args;
use image::GrayImage;
use ndarray::{Array3, ArrayView3, Axis};
use segeval::prelude::{read_volume, volume_stem};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Args, Debug)]
pub struct Preview {
    /// 预测文件，或包含预测文件（`.nii`/`.nii.gz`）的目录。
    #[arg(long, short)]
    input: PathBuf,
    /// 输出目录。
    #[arg(long = "output-dir", short)]
    out_dir: PathBuf,
    /// 包括背景的类别数，缺省时取体数据中的最大标签加1。
    #[arg(long = "num-classes", short = 'n')]
    n_classes: Option<usize>,
    /// 每隔多少个切片导出一张。
    #[arg(long, default_value_t = 1)]
    step: usize,
}

impl Preview {
    pub fn run(&mut self) -> anyhow::Result<()> {
        // [input/**/*.nii.gz] -> [output-dir/<stem>/<stem>_<k>.png]
        if self.step == 0 {
            bail!("--step 必须为正");
        }
        let inputs = nifti_files(&self.input);
        if inputs.is_empty() {
            bail!("`{}` 下没有 NIfTI 文件", self.input.display());
        }
        for path in inputs.iter() {
            let written = self.process(path)?;
            info!("`{}` -> {} 张切片", path.display(), written);
        }
        Ok(())
    }

    fn process(&self, path: &Path) -> anyhow::Result<usize> {
        let (raw, _) = read_volume(path).with_context(|| format!("读取 `{}` 失败", path.display()))?;
        let labels = to_labels(raw).with_context(|| format!("`{}` 不是标签体数据", path.display()))?;
        let n_classes = self
            .n_classes
            .unwrap_or_else(|| labels.iter().copied().max().unwrap_or(0) as usize + 1);

        let stem = volume_stem(path);
        let dir = self.out_dir.join(&stem);
        fs::create_dir_all(&dir)?;
        let mut written = 0;
        for (k, img) in axial_slices(labels.view(), n_classes)
            .into_iter()
            .enumerate()
            .step_by(self.step)
        {
            let save_to = dir.join(format!("{stem}_{k:03}.png"));
            img.save(&save_to)
                .with_context(|| format!("写出 `{}` 失败", save_to.display()))?;
            written += 1;
        }
        debug!("{} 类，写出 {written} 张到 `{}`", n_classes, dir.display());
        Ok(written)
    }
}

/// 单个文件原样返回；目录则递归收集其中的NIfTI文件（按路径排序）。
fn nifti_files(input: &Path) -> Vec<PathBuf> {
    if input.is_file() {
        return vec![input.to_path_buf()];
    }
    let mut files: Vec<PathBuf> = WalkDir::new(input)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            let name = p.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            name.ends_with(".nii") || name.ends_with(".nii.gz")
        })
        .collect();
    files.sort();
    files
}

fn to_labels(raw: Array3<f32>) -> anyhow::Result<Array3<u8>> {
    if let Some(v) = raw
        .iter()
        .find(|v| v.fract() != 0.0 || !(0.0..=255.0).contains(*v))
    {
        bail!("体素值 {v} 不是 [0, 255] 内的整数");
    }
    Ok(raw.mapv(|v| v as u8))
}

/// 沿第三个轴切出轴向切片，宽为X、高为Y。
fn axial_slices(labels: ArrayView3<u8>, n_classes: usize) -> Vec<GrayImage> {
    let (x, y, _) = labels.dim();
    labels
        .axis_iter(Axis(2))
        .map(|slice| {
            GrayImage::from_fn(x as u32, y as u32, |w, h| {
                image::Luma([gray_level(slice[[w as usize, h as usize]], n_classes)])
            })
        })
        .collect()
}
