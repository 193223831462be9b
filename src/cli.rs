use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "timelapsed", about = "Scheduled frame capture and timelapse assembly daemon")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate configuration, then exit.
    ValidateConfig,
    /// Run the scheduler and HTTP server (the default when no subcommand is given).
    Serve,
}
