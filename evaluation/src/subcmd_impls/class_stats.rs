use anyhow::{anyhow, Context};
use clap::Args;
use segeval::prelude::*;
use std::path::PathBuf;
use tracing::info;

#[derive(Args, Debug)]
pub struct ClassStats {
    /// 数据集根目录（含`dataset.json`）。
    #[arg(long = "root-dir", short = 'D')]
    root_dir: PathBuf,
    /// 统计的划分。
    #[arg(long, default_value_t = Split::Training)]
    split: Split,
    /// 包括背景的类别数，缺省时取清单`labels`的键数。
    #[arg(long = "num-classes", short = 'n')]
    n_classes: Option<usize>,
}

impl ClassStats {
    pub fn run(&mut self) -> anyhow::Result<()> {
        let manifest = Manifest::open(&self.root_dir)?;
        let n_classes = self
            .n_classes
            .or_else(|| manifest.declared_classes())
            .ok_or_else(|| anyhow!("清单未声明`labels`，请用 --num-classes 指定类别数"))?;
        let pairs = manifest.pairs(self.split)?;
        info!("{} 个样本，{} 类", pairs.len(), n_classes);
        let stats = collect_class_stats(&pairs, n_classes)
            .with_context(|| format!("统计 `{}` 失败", self.root_dir.display()))?;
        print!("{stats}");
        Ok(())
    }
}
