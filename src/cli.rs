use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dayreel")]
#[command(author, version, about = "Continuous day-timeline playback for segmented recordings")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List one day's segments and the gaps between them
    Scan {
        /// Recordings directory
        #[arg(required = true)]
        dir: PathBuf,

        /// Day to show (YYYY-MM-DD); defaults to the earliest recorded day
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the days that have recordings
    Dates {
        /// Recordings directory
        #[arg(required = true)]
        dir: PathBuf,
    },

    /// Play a day headlessly, printing playback events
    Play {
        /// Recordings directory
        #[arg(required = true)]
        dir: PathBuf,

        /// Day to play (YYYY-MM-DD); defaults to the earliest recorded day
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Time of day to start from (HH:MM:SS)
        #[arg(long)]
        from: Option<NaiveTime>,

        /// Media seconds played per wall-clock second
        #[arg(long, default_value = "1.0")]
        speed: f64,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
