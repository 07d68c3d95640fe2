//! Command implementations

use super::{Cli, Commands, ConfigArgs, OutputFormat};
use crate::config::WorkspaceConfig;
use crate::tools::{ToolResponse, Toolkit};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Run a parsed command line; returns whether every operation succeeded
pub async fn run(cli: Cli) -> Result<bool> {
    let root = project_root(&cli.path);

    let Some(requests) = cli.command.requests() else {
        if let Commands::Config(args) = &cli.command {
            handle_config(&root, args, cli.format)?;
        }
        return Ok(true);
    };

    let config = WorkspaceConfig::load(&root)?;
    let toolkit = Toolkit::new(config);

    let mut all_ok = true;
    for request in requests {
        let response = toolkit.call(request).await;
        match cli.format {
            OutputFormat::Json => print_response_json(&response)?,
            OutputFormat::Text => print_response_text(&response),
        }
        if !response.success {
            all_ok = false;
            break;
        }
    }

    Ok(all_ok)
}

/// Canonical project root, or the path as given when it cannot be resolved
fn project_root(path: &str) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| PathBuf::from(path))
}

/// Show or reset the config file
fn handle_config(root: &Path, args: &ConfigArgs, format: OutputFormat) -> Result<()> {
    if args.reset {
        let config = WorkspaceConfig::for_project(root);
        config.save()?;
        println!("✓ Configuration reset to defaults");
        println!("  Config: {:?}", config.config_path());
    }

    if args.show || !args.reset {
        let config = WorkspaceConfig::load(root)?;
        match format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(&config.to_file())
                    .context("Failed to serialize configuration")?;
                println!("{}", json);
            }
            OutputFormat::Text => {
                println!("CodeWarden Configuration");
                println!("========================\n");
                println!("Config file: {:?}\n", config.config_path());
                print!("{}", config.to_toml()?);
            }
        }
    }

    Ok(())
}

/// Print a response as JSON
pub fn print_response_json(response: &ToolResponse) -> Result<()> {
    let json = serde_json::to_string_pretty(response)?;
    println!("{}", json);
    Ok(())
}

/// Print a response summary
pub fn print_response_text(response: &ToolResponse) {
    if response.success {
        println!("{}", response.summary);
    } else {
        eprintln!("✗ {}", response.summary);
    }
}
