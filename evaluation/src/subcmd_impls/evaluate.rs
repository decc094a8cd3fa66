use anyhow::Context;
use clap::Args;
use segeval::prelude::*;
use std::path::PathBuf;
use tracing::info;

#[derive(Args, Debug)]
pub struct Evaluate {
    /// 数据集根目录（含`dataset.json`）。
    #[arg(long = "root-dir", short = 'D')]
    root_dir: PathBuf,
    /// 数据集种类：iseg2017 / task02_heart / task04_hippocampus / luna16 / shrec / invitro。
    #[arg(long, short)]
    dataset: DatasetKind,
    /// 评估的划分，缺省时取数据集的默认划分。
    #[arg(long)]
    split: Option<Split>,
    /// 模型种类：ucaps / segcaps-2d / segcaps-3d / unet。
    #[arg(long, short)]
    model: ModelKind,
    /// 检查点：导出分数目录，或`.json`逐体素线性头。
    #[arg(long, short)]
    checkpoint: PathBuf,
    /// 补丁大小，如`64,64,64`。
    #[arg(long, default_value = "32,32,32", value_parser = super::utils::positive_triple)]
    patch: [usize; 3],
    /// 相邻补丁的重叠率。
    #[arg(long, default_value_t = 0.25, value_parser = super::utils::overlap_in_range)]
    overlap: f64,
    /// 每次推理调用的补丁数。
    #[arg(long = "sw-batch-size", default_value_t = 1)]
    sw_batch_size: usize,
    /// 补丁融合权重：constant / cosine / gaussian。
    #[arg(long, default_value_t = BlendMode::Constant)]
    blend: BlendMode,
    /// 小体数据的填充方式：edge / constant。
    #[arg(long = "pad-mode", default_value_t = PadMode::Edge)]
    pad_mode: PadMode,
    /// 包括背景的类别数，缺省时取模型输出的通道数。
    #[arg(long = "num-classes", short = 'n')]
    n_classes: Option<usize>,
    /// 跨样本的聚合方式，缺省时取数据集的默认值。
    #[arg(long)]
    reduction: Option<Reduction>,
    /// 预测输出目录，缺省为`<root-dir>/output`。
    #[arg(long = "output-dir", short)]
    output_dir: Option<PathBuf>,
    /// 写出预测的NIfTI文件。
    #[arg(long = "save-image")]
    save_prediction: bool,
    /// 输出文件名后缀，缺省为`<model>_prediction`。
    #[arg(long)]
    postfix: Option<String>,
    /// 预读体数据的线程数，缺省为CPU核数。
    #[arg(long, short)]
    workers: Option<usize>,
}

impl Evaluate {
    fn config(&self) -> EvalConfig {
        let mut config = EvalConfig::new(
            &self.root_dir,
            self.dataset,
            self.model,
            &self.checkpoint,
        );
        config.split = self.split;
        config.patch_size = self.patch;
        config.overlap = self.overlap;
        config.sw_batch_size = self.sw_batch_size;
        config.blend = self.blend;
        config.pad_mode = self.pad_mode;
        config.n_classes = self.n_classes;
        config.reduction = self.reduction;
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        config.save_prediction = self.save_prediction;
        config.postfix = self.postfix.clone();
        if let Some(w) = self.workers {
            config.workers = w;
        }
        config
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        let config = self.config();
        let summary = run(&config).with_context(|| {
            format!(
                "评估 {} / {} 失败",
                config.dataset,
                config.root_dir.display()
            )
        })?;
        if config.save_prediction {
            info!("预测已写入 `{}`", config.output_dir.display());
        }
        println!("{summary}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cli;
    use clap::Parser;

    fn parse(extra: &[&str]) -> Evaluate {
        #[derive(Parser)]
        struct Wrapper {
            #[command(flatten)]
            inner: Evaluate,
        }
        let mut args = vec![
            "evaluate",
            "-D",
            "/data/iseg",
            "--dataset",
            "iseg2017",
            "--model",
            "segcaps-2d",
            "--checkpoint",
            "/ckpt/scores",
        ];
        args.extend_from_slice(extra);
        Wrapper::try_parse_from(args).unwrap().inner
    }

    #[test]
    fn test_defaults_follow_library() {
        let config = parse(&[]).config();
        assert_eq!(config.patch_size, [32, 32, 32]);
        assert_eq!(config.patch(), [32, 32, 1]);
        assert_eq!(config.overlap, 0.25);
        assert_eq!(config.reduction(), Reduction::Mean);
        assert_eq!(config.split(), Split::Validation);
        assert_eq!(config.output_dir, PathBuf::from("/data/iseg/output"));
        assert!(!config.save_prediction);
        assert_eq!(config.postfix(), "segcaps-2d_prediction");
    }

    #[test]
    fn test_overrides() {
        let config = parse(&[
            "--patch",
            "16,16,8",
            "--blend",
            "gaussian",
            "--pad-mode",
            "constant",
            "-n",
            "4",
            "--reduction",
            "median",
            "--split",
            "training",
            "-o",
            "/tmp/pred",
            "--save-image",
            "--postfix",
            "seg",
            "-w",
            "3",
        ])
        .config();
        assert_eq!(config.patch_size, [16, 16, 8]);
        assert_eq!(config.blend, BlendMode::Gaussian);
        assert_eq!(config.pad_mode, PadMode::Constant);
        assert_eq!(config.n_classes, Some(4));
        assert_eq!(config.reduction(), Reduction::Median);
        assert_eq!(config.split(), Split::Training);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/pred"));
        assert!(config.save_prediction);
        assert_eq!(config.postfix(), "seg");
        assert_eq!(config.workers, 3);
    }

    #[test]
    fn test_unknown_dataset_rejected() {
        let r = Cli::try_parse_from([
            "evaluation",
            "evaluate",
            "-D",
            "/data",
            "--dataset",
            "brats",
            "--model",
            "unet",
            "--checkpoint",
            "x.json",
        ]);
        assert!(r.is_err());
    }
}
