use clap::Parser;
use evaluation::Cli;

fn main() -> anyhow::Result<()> {
    let mut cmd: Cli = Cli::parse();
    cmd.run_program()
}
