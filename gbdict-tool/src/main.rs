use anyhow::Context;
use chrono::{Local, NaiveDateTime};
use clap::{Args, Parser, Subcommand};
use gbdict_lib::{Config, DEFAULT_ENTRY_PATTERN, DEFAULT_EXTRACT_OUTPUT};
use std::{collections::HashMap, env, fs, path::PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod error;
mod fs_utils;
mod naming;
mod packaging;

use crate::fs_utils::encode_size;
use crate::packaging::{PackRequest, UnpackRequest};

const ENV_PREFIX: &str = "GBDICT_";

#[derive(Parser, Debug)]
#[command(author, version, about = "GBoard dictionary packager", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Log progress to stderr
    #[arg(short, long, global = true, action = clap::ArgAction::SetTrue)]
    pub verbose: bool,

    // packs when no subcommand is given
    #[command(flatten)]
    pub pack: PackArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Package the dictionary into a timestamped zip archive
    Pack(PackArgs),
    /// Extract the dictionary from a zip archive
    Unpack(UnpackArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct PackArgs {
    /// Dictionary file to package [default: output/personal_dictionary.txt]
    #[arg()]
    pub input: Option<String>,

    /// Directory the archive is written into [default: output]
    #[arg(short, long)]
    pub output_dir: Option<String>,

    /// Deflate the entry instead of storing it
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub compress: bool,

    /// Dry run (print the archive that would be written)
    #[arg(short, long, action = clap::ArgAction::SetTrue)]
    pub dry: bool,

    /// Configuration file (YAML or JSON)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Generate YAML config to stdout
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub generate_yaml_config: bool,
}

#[derive(Args, Debug, Clone)]
pub struct UnpackArgs {
    /// Zip archive to extract from
    pub archive: PathBuf,

    /// Destination for the extracted dictionary
    #[arg(default_value = DEFAULT_EXTRACT_OUTPUT)]
    pub output: PathBuf,

    /// Glob selecting the dictionary entry
    #[arg(short, long, default_value = DEFAULT_ENTRY_PATTERN)]
    pub pattern: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let lines = match cli.command {
        Some(Command::Pack(args)) => run_pack(&args)?,
        Some(Command::Unpack(args)) => run_unpack(&args)?,
        None => run_pack(&cli.pack)?,
    };
    for line in lines {
        println!("{line}");
    }
    Ok(())
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))
}

/// Runs the pack command and returns the lines to print.
fn run_pack(args: &PackArgs) -> anyhow::Result<Vec<String>> {
    let config = resolve_config(args)?;

    if args.generate_yaml_config {
        return Ok(vec![serde_yaml::to_string(&config)?]);
    }

    pack_with(&config, Local::now().naive_local())
}

fn pack_with(config: &Config, timestamp: NaiveDateTime) -> anyhow::Result<Vec<String>> {
    let request = PackRequest {
        input: PathBuf::from(config.input_or_default()),
        output_dir: PathBuf::from(config.output_dir_or_default()),
        compression: config.compression(),
        timestamp,
    };

    if config.dry.unwrap_or(false) {
        let plan = request.plan();
        return Ok(vec![
            "--- DRY RUN ---".to_string(),
            format!("Input: {}", request.input.display()),
            format!("Archive: {}", plan.archive_path.display()),
            format!("Entry: {}", plan.entry_name),
            format!("Compression: {:?}", request.compression),
        ]);
    }

    let outcome = packaging::package(&request)?;
    Ok(vec![
        format!(
            "Dictionary packaged successfully: {}",
            outcome.archive_path.display()
        ),
        format!(
            "Total bytes: {} ({} input)",
            encode_size(outcome.archive_size),
            encode_size(outcome.input_size)
        ),
    ])
}

/// Runs the unpack command and returns the lines to print.
fn run_unpack(args: &UnpackArgs) -> anyhow::Result<Vec<String>> {
    let outcome = packaging::unpack(&UnpackRequest {
        archive: args.archive.clone(),
        output: args.output.clone(),
        pattern: args.pattern.clone(),
    })?;
    Ok(vec![
        format!("Extracting dictionary from: {}", args.archive.display()),
        format!("Extracting: {}", outcome.entry_name),
        format!(
            "Dictionary extracted successfully: {}",
            outcome.output_path.display()
        ),
    ])
}

/// Merges env < file < CLI for the pack command.
fn resolve_config(args: &PackArgs) -> anyhow::Result<Config> {
    let env_config = read_env();

    let mut file_config = Config::default();
    if let Some(path) = args.config.clone().or(env_config.config.clone()) {
        file_config =
            read_config_file(&path).with_context(|| format!("loading config file {path}"))?;
    }

    let merged = merge_configs(env_config, file_config, cli_to_config(args));
    debug!(?merged, "resolved configuration");
    Ok(merged)
}

/// Reads environment variables prefixed with GBDICT_
fn read_env() -> Config {
    let vars: HashMap<String, String> = env::vars().collect();
    config_from_vars(&vars)
}

fn config_from_vars(vars: &HashMap<String, String>) -> Config {
    let get = |key: &str| vars.get(&format!("{ENV_PREFIX}{key}")).cloned();

    Config {
        input: get("INPUT"),
        output_dir: get("OUTPUT_DIR"),
        config: get("CONFIG"),
        compress: get("COMPRESS").map(|v| parse_flag(&v)),
        dry: get("DRY").map(|v| parse_flag(&v)),
    }
}

fn parse_flag(v: &str) -> bool {
    v == "true" || v == "1" || v.eq_ignore_ascii_case("yes")
}

/// Reads YAML or JSON config from file
fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let content = fs::read_to_string(path)?;
    let cfg = if path.to_lowercase().ends_with(".json") {
        serde_json::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };
    Ok(cfg)
}

/// Unset switches stay `None` so they don't mask file or env values.
fn cli_to_config(args: &PackArgs) -> Config {
    Config {
        input: args.input.clone(),
        output_dir: args.output_dir.clone(),
        config: args.config.clone(),
        compress: args.compress.then_some(true),
        dry: args.dry.then_some(true),
    }
}

/// Merge configs by priority: env < file < cli
fn merge_configs(env: Config, file: Config, cli: Config) -> Config {
    fn pick<T>(env: Option<T>, file: Option<T>, cli: Option<T>) -> Option<T> {
        cli.or(file).or(env)
    }

    Config {
        input: pick(env.input, file.input, cli.input),
        output_dir: pick(env.output_dir, file.output_dir, cli.output_dir),
        config: pick(env.config, file.config, cli.config),
        compress: pick(env.compress, file.compress, cli.compress),
        dry: pick(env.dry, file.dry, cli.dry),
    }
}
