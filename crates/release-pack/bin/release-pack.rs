use clap::Parser;
use release_pack::cli::{self, Cli};
use release_pack::telemetry;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::install(&telemetry::resolve_env_filter())?;
    cli::run_with_cli(cli)
}
