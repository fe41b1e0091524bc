// CLI modules
mod cli;

use clap::{Parser, Subcommand};
use cli::{
    args::Args, op::Op, Batch, Deploy, Details, Keygen, RecordVerification, Register, Serve,
    Verify, Version,
};
use common::error::Categorize;
use tracing::Instrument;

command_enum! {
    (Deploy, Deploy),
    (Keygen, Keygen),
    (Register, Register),
    (Verify, Verify),
    (Details, Details),
    (RecordVerification, RecordVerification),
    (Batch, Batch),
    (Serve, Serve),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let guards = qdv_cli::init_logging(&args.log_config());
    let ctx = cli::op::OpContext::new(args.config_path);

    let span = tracing::info_span!("command", name = args.command.name());
    let code = match args.command.execute(&ctx).instrument(span).await {
        Ok(output) => {
            println!("{}", output);
            0
        }
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("Error [{}]: {}", e.kind(), e);
            1
        }
    };

    // flush buffered log lines before exiting
    drop(guards);
    std::process::exit(code);
}
