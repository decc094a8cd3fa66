use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "evaluation")]
#[command(about = "三维医学图像分割模型的滑动窗口评估工具集.")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// 输出调试日志（`RUST_LOG`优先）。
    #[arg(long, short, global = true)]
    verbose: bool,
    /// 子命令。
    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    pub fn run_program(&mut self) -> anyhow::Result<()> {
        super::utils::init_tracing(self.verbose);
        match self.command {
            Commands::Evaluate(ref mut v) => v.run(),
            Commands::Plan(ref mut v) => v.run(),
            Commands::ClassStats(ref mut v) => v.run(),
            Commands::Preview(ref mut v) => v.run(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 在数据集划分上评估模型，输出dice、precision与sensitivity。
    Evaluate(crate::subcmd_impls::evaluate::Evaluate),
    /// 不加载模型，打印给定形状下的补丁位置与覆盖统计。
    Plan(crate::subcmd_impls::plan::Plan),
    /// 统计训练集的类别占比与类别权重。
    ClassStats(crate::subcmd_impls::class_stats::ClassStats),
    /// 将预测体数据逐切片导出为灰度png。
    Preview(crate::subcmd_impls::preview::Preview),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_evaluate() {
        let cli = Cli::try_parse_from([
            "evaluation",
            "-v",
            "evaluate",
            "--root-dir",
            "/data/Task02_Heart",
            "--dataset",
            "task02_heart",
            "--model",
            "ucaps",
            "--checkpoint",
            "/ckpt/head.json",
            "--patch",
            "64,64,32",
            "--overlap",
            "0.5",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Evaluate(_)));
    }

    #[test]
    fn test_reject_bad_patch() {
        let r = Cli::try_parse_from([
            "evaluation",
            "plan",
            "--shape",
            "10,10,10",
            "--patch",
            "4,4",
        ]);
        assert!(r.is_err());
    }
}
