//! Loadout - automatic package installation for content hosts
//!
//! Usage:
//!   loadout run       # Trigger an orchestration run
//!   loadout plan      # Show what a run would install
//!   loadout list      # List registered descriptors

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use loadout_core::prelude::*;

#[derive(Parser)]
#[command(name = "loadout")]
#[command(about = "Automatic package installation for content hosts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Trigger an orchestration run
    Run(RunArgs),

    /// Evaluate preconditions and show what a run would install
    Plan(CommonArgs),

    /// List registered descriptors
    List(CommonArgs),
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Run on this thread even if the configuration says background
    #[arg(long)]
    foreground: bool,
}

#[derive(Args)]
struct CommonArgs {
    /// Path to loadout.toml (defaults to the platform config dir)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
    /// Only show issues (non-zero exit if problems)
    Quiet,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loadout=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run_trigger(args),
        Commands::Plan(args) => run_plan(args),
        Commands::List(args) => run_list(args),
    }
}

fn config_path(args: &CommonArgs) -> Result<PathBuf> {
    if let Some(path) = &args.config {
        return Ok(path.clone());
    }
    let dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    Ok(dir.join("loadout").join("loadout.toml"))
}

fn load_config(args: &CommonArgs) -> Result<LoadoutConfig> {
    let path = config_path(args)?;
    tracing::debug!(path = %path.display(), "loading configuration");
    LoadoutConfig::load(&path)
}

fn build_loader(config: &LoadoutConfig, background: bool) -> Result<PackageLoader> {
    let paths = HostPaths::from_config(config)?;
    let mut registry = DescriptorRegistry::new();
    registry.register(Box::new(config_unit(config)));
    registry.deny_all(config.discovery.deny_units.iter().cloned());

    Ok(PackageLoader::new(
        registry,
        Arc::new(MemoryStores::from_snapshot(&config.stores)),
        Arc::new(NoopInstaller),
        paths.stager(),
        background,
    ))
}

fn run_trigger(args: RunArgs) -> Result<()> {
    let config = load_config(&args.common)?;
    let background = config.run.background && !args.foreground;
    let loader = build_loader(&config, background)?;

    match loader.trigger()? {
        TriggerOutcome::Completed(report) => print_run_report(&report, args.common.format)?,
        TriggerOutcome::Dispatched => {
            // Fire-and-forget would let the process exit before the run
            // thread finishes; hold main until it is done.
            loader.wait_until_idle(Duration::from_millis(50));
            match args.common.format {
                OutputFormat::Table => {
                    println!("✓ Background run finished (see logs for details)");
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({ "dispatched": true }));
                }
                OutputFormat::Quiet => {}
            }
        }
        TriggerOutcome::AlreadyRunning => {
            anyhow::bail!("an orchestration run is already in flight")
        }
    }
    Ok(())
}

fn print_run_report(report: &RunReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            for pkg in &report.installed {
                if pkg.retried {
                    println!("✓ Installed '{}' (after one retry)", pkg.key);
                } else {
                    println!("✓ Installed '{}'", pkg.key);
                }
            }
            for pkg in &report.skipped {
                println!("• Skipped '{}': {}", pkg.key, pkg.reason);
            }
            for pkg in &report.excluded {
                println!("⚠ Excluded '{}': {}", pkg.key, pkg.error);
            }
            for pkg in &report.failed {
                println!("✗ Failed '{}': {}", pkg.key, pkg.error);
            }
            println!(
                "{} installed, {} skipped, {} excluded, {} failed",
                report.installed.len(),
                report.skipped.len(),
                report.excluded.len(),
                report.failed.len()
            );
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Quiet => {
            for pkg in &report.excluded {
                println!("⚠ Excluded '{}': {}", pkg.key, pkg.error);
            }
            for pkg in &report.failed {
                println!("✗ Failed '{}': {}", pkg.key, pkg.error);
            }
            if !report.is_clean() {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

fn run_plan(args: CommonArgs) -> Result<()> {
    let config = load_config(&args)?;
    let loader = build_loader(&config, false)?;
    let plan = loader.plan()?;

    match args.format {
        OutputFormat::Table => {
            if plan.admitted.is_empty() {
                println!("Nothing to install");
            } else {
                println!("Would install (in this order):");
                // Admissions are listed in discovery order; the drain pops
                // them from the back.
                for pkg in plan.admitted.iter().rev() {
                    if pkg.dependencies.is_empty() {
                        println!("  {} ({})", pkg.key, pkg.package);
                    } else {
                        println!(
                            "  {} ({}) after {}",
                            pkg.key,
                            pkg.package,
                            pkg.dependencies.join(", ")
                        );
                    }
                }
            }
            for pkg in &plan.skipped {
                println!("• Skipped '{}': {}", pkg.key, pkg.reason);
            }
            for pkg in &plan.excluded {
                println!("⚠ Excluded '{}': {}", pkg.key, pkg.error);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        OutputFormat::Quiet => {
            for pkg in &plan.excluded {
                println!("⚠ Excluded '{}': {}", pkg.key, pkg.error);
            }
            if !plan.excluded.is_empty() {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

fn run_list(args: CommonArgs) -> Result<()> {
    let config = load_config(&args)?;
    let mut registry = DescriptorRegistry::new();
    registry.register(Box::new(config_unit(&config)));
    registry.deny_all(config.discovery.deny_units.iter().cloned());
    let descriptors = registry.discover()?;

    match args.format {
        OutputFormat::Table => {
            if descriptors.is_empty() {
                println!("No descriptors registered");
                return Ok(());
            }
            for descriptor in &descriptors {
                let requirements = descriptor.requirements();
                let dependencies = descriptor.dependencies();
                print!("{} - {}", descriptor.key(), descriptor.package());
                if !dependencies.is_empty() {
                    print!(" (depends on {})", dependencies.join(", "));
                }
                if !requirements.is_empty() {
                    print!(" [{} requirement(s)]", requirements.len());
                }
                println!();
            }
        }
        OutputFormat::Json => {
            let entries: Vec<_> = descriptors
                .iter()
                .map(|descriptor| {
                    serde_json::json!({
                        "key": descriptor.key(),
                        "package": descriptor.package().to_string(),
                        "dependencies": descriptor.dependencies(),
                        "requirements": descriptor.requirements().len(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        OutputFormat::Quiet => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{config_path, Cli, Commands, CommonArgs, OutputFormat};
    use clap::Parser;
    use std::path::{Path, PathBuf};

    #[test]
    fn run_command_parses_without_panic() {
        let args = ["loadout", "run"];

        let result = std::panic::catch_unwind(|| Cli::try_parse_from(args));
        assert!(result.is_ok(), "CLI parsing should not panic");
        assert!(result.unwrap().is_ok(), "CLI parsing should succeed");
    }

    #[test]
    fn plan_command_parses_without_panic() {
        let args = ["loadout", "plan"];

        let result = std::panic::catch_unwind(|| Cli::try_parse_from(args));
        assert!(result.is_ok(), "CLI parsing should not panic");
        assert!(result.unwrap().is_ok(), "CLI parsing should succeed");
    }

    #[test]
    fn list_command_parses_without_panic() {
        let args = ["loadout", "list"];

        let result = std::panic::catch_unwind(|| Cli::try_parse_from(args));
        assert!(result.is_ok(), "CLI parsing should not panic");
        assert!(result.unwrap().is_ok(), "CLI parsing should succeed");
    }

    #[test]
    fn run_foreground_flag_parses() {
        let args = ["loadout", "run", "--foreground"];

        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Run(run) => assert!(run.foreground),
            _ => panic!("expected the run command"),
        }
    }

    #[test]
    fn format_defaults_to_table() {
        let args = ["loadout", "plan"];

        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Plan(common) => {
                assert!(matches!(common.format, OutputFormat::Table));
            }
            _ => panic!("expected the plan command"),
        }
    }

    #[test]
    fn list_with_format_json_parses() {
        let args = ["loadout", "list", "--format", "json"];

        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::List(common) => {
                assert!(matches!(common.format, OutputFormat::Json));
            }
            _ => panic!("expected the list command"),
        }
    }

    #[test]
    fn run_with_format_short_option_parses() {
        let args = ["loadout", "run", "-f", "quiet"];

        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Run(run) => {
                assert!(matches!(run.common.format, OutputFormat::Quiet));
            }
            _ => panic!("expected the run command"),
        }
    }

    #[test]
    fn unknown_format_is_rejected() {
        let args = ["loadout", "run", "--format", "yaml"];

        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        let args = ["loadout", "bogus"];

        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn config_flag_parses_into_the_common_args() {
        let args = ["loadout", "plan", "--config", "/tmp/loadout.toml"];

        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Plan(common) => {
                assert_eq!(common.config.as_deref(), Some(Path::new("/tmp/loadout.toml")));
            }
            _ => panic!("expected the plan command"),
        }
    }

    #[test]
    fn explicit_config_path_wins_over_the_default() {
        let args = CommonArgs {
            config: Some(PathBuf::from("/etc/loadout/custom.toml")),
            format: OutputFormat::Table,
        };

        let path = config_path(&args).expect("config path should resolve");
        assert_eq!(path, PathBuf::from("/etc/loadout/custom.toml"));
    }
}
