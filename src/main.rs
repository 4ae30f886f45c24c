use anyhow::Result;
use clap::Parser;
use mendmap::cli::{Cli, Commands};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            path,
            format,
            output,
        } => mendmap::commands::handle_analyze(path, format, output),
        Commands::Repair {
            path,
            plan,
            dry_run,
        } => mendmap::commands::handle_repair(path, plan, dry_run),
        Commands::Impact {
            path,
            component,
            format,
        } => mendmap::commands::handle_impact(path, component, format),
        Commands::Usages { path, name } => mendmap::commands::handle_usages(path, name),
    }
}
