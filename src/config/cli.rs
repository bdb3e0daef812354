use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "warehouse-sync")]
#[command(about = "Moves records from a source warehouse to a destination warehouse")]
pub struct CliConfig {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "sync.toml")]
    pub config: String,

    /// Override the cursor from the config file (incremental reads)
    #[arg(long)]
    pub cursor: Option<String>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub json_logs: bool,

    #[arg(long, help = "Log resource usage while running")]
    pub monitor: bool,

    /// Validate and print the plan without touching any warehouse
    #[arg(long)]
    pub dry_run: bool,

    /// Print the endpoints used by both warehouses and exit
    #[arg(long)]
    pub describe: bool,

    /// JSON file with the event payload for a catch workflow (one object or an array)
    #[arg(long)]
    pub event: Option<String>,
}
