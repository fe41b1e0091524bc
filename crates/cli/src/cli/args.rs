pub use clap::Parser;

use std::path::PathBuf;

use qdv_cli::LogConfig;

#[derive(Parser, Debug)]
#[command(name = "qdv")]
#[command(about = "Quantum-resistant document registration and verification")]
pub struct Args {
    /// Path to the qdv config directory (defaults to ~/.qdv)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Default log level; RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: tracing::Level,

    /// Also write daily rolling log files to this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}

impl Args {
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            log_level: self.log_level,
            log_dir: self.log_dir.clone(),
        }
    }
}
