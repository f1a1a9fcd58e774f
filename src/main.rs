use anyhow::Result;
use clap::Parser;
use s3lite::cli::{self, args::Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();

    cli::init_logging(&cli.log_level);

    cli::run(cli)
}
