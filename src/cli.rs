use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "battlewatch")]
#[command(version = "0.1.0")]
#[command(about = "Battle-log monitoring bot for player tracking", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory
    #[arg(short, long, default_value = "config")]
    pub config_dir: String,

    /// Override the data directory holding subject snapshots
    #[arg(long)]
    pub data_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the monitoring daemon
    Run,
    /// Start monitoring a player (tag with or without #)
    Monitor {
        /// Player tag
        tag: String,
    },
    /// Stop monitoring a player (history is kept)
    Unmonitor {
        /// Player tag
        tag: String,
    },
    /// List monitored players
    List,
    /// Show recorded battle statistics for a player
    Stats {
        /// Player tag
        tag: String,
    },
    /// Show repeat opponents, or head-to-head stats against one opponent
    Rivals {
        /// Player tag
        tag: String,
        /// Opponent tag for a head-to-head view
        opponent: Option<String>,
    },
    /// Delete a player and all recorded history
    Forget {
        /// Player tag
        tag: String,
    },
    /// Run one polling cycle for a player immediately
    Poll {
        /// Player tag
        tag: String,
    },
}
