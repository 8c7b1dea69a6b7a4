use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::{Path, PathBuf};

use crate::cli::output::get_formatter;
use crate::models::{CONFIG_PATH_ENV, Config, LOCAL_CONFIG_FILE, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Write a configuration file with default values")]
    Init {
        #[arg(long, help = "Force overwrite existing config")]
        force: bool,
    },
    #[command(about = "Show the effective configuration")]
    Show,
    #[command(about = "Show configuration file paths")]
    Path,
}

pub fn handle_config(
    cmd: ConfigCommand,
    explicit: Option<&Path>,
    format: OutputFormat,
    _verbose: bool,
) -> Result<()> {
    match cmd {
        ConfigCommand::Init { force } => handle_init(explicit, force, format),
        ConfigCommand::Show => handle_show(explicit, format),
        ConfigCommand::Path => handle_path(explicit),
    }
}

/// Where `config init` writes when no path is given.
fn init_target(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(LOCAL_CONFIG_FILE))
}

fn handle_init(explicit: Option<&Path>, force: bool, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let path = init_target(explicit);

    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at: {}\nUse --force to overwrite.",
            path.display()
        );
    }

    Config::default()
        .save(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    print!(
        "{}",
        formatter.format_message(&format!("Created config at: {}", path.display()))
    );
    Ok(())
}

fn handle_show(explicit: Option<&Path>, format: OutputFormat) -> Result<()> {
    let mut config = Config::load(explicit)?;
    if config.vector_store.api_key.is_some() {
        config.vector_store.api_key = Some("********".to_string());
    }

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    match Config::find_path(explicit) {
        Some(path) => println!("# Config file: {}", path.display()),
        None => println!("# No config file found, using defaults"),
    }
    println!();
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn handle_path(explicit: Option<&Path>) -> Result<()> {
    println!("Configuration paths:");
    println!();

    match Config::find_path(explicit) {
        Some(path) => println!("Active config: {}", path.display()),
        None => println!("Active config: (none, using defaults)"),
    }

    if let Ok(value) = std::env::var(CONFIG_PATH_ENV) {
        println!("{CONFIG_PATH_ENV}: {value}");
    }
    println!("Local config:  {}", LOCAL_CONFIG_FILE);
    if let Some(path) = Config::global_path() {
        let state = if path.exists() { "exists" } else { "not created" };
        println!("Global config: {} ({state})", path.display());
    }

    if let Ok(cwd) = std::env::current_dir() {
        let env_path = cwd.join(".env");
        let state = if env_path.exists() { "active" } else { "not present" };
        println!(".env file:     {} ({state})", env_path.display());
    }

    Ok(())
}
