use clap::Parser;
use std::path::PathBuf;

use crate::reading::{ReadingConfig, VoltageMode};

#[derive(Parser, Debug)]
#[command(
    name = "pvproc",
    about = "Process solar inverter CSV logs and report daily output to pvoutput.org"
)]
pub struct Config {
    /// CSV log files to process
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Effective date for the data (YYYYMMDD)
    #[arg(short = 'd', long)]
    pub date: Option<String>,

    /// Reduce each individual reading by WATTS
    #[arg(long, value_name = "WATTS", default_value_t = 0)]
    pub deduct: u32,

    /// Process DC voltage instead of AC voltage
    #[arg(long)]
    pub dcvolts: bool,

    /// pvoutput.org system id
    #[arg(short = 'i', long)]
    pub id: Option<String>,

    /// Explicitly specify the interval (in minutes) between readings
    #[arg(long, value_name = "MINUTES", default_value_t = 0)]
    pub interval: u32,

    /// pvoutput.org system key
    #[arg(short = 'k', long)]
    pub key: Option<String>,

    /// List outages from the file(s)
    #[arg(short = 'o', long)]
    pub outages: bool,

    /// Be quiet - especially for use in cron jobs
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Send data to pvoutput.org
    #[arg(short = 's', long)]
    pub send: bool,

    /// Produce short (just one line) output for each file
    #[arg(long)]
    pub short: bool,

    /// Be more verbose about what is found
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl Config {
    /// The immutable per-run options the accumulator needs.
    pub fn reading_config(&self) -> ReadingConfig {
        ReadingConfig {
            deduct_watts: self.deduct,
            voltage_mode: if self.dcvolts {
                VoltageMode::Dc
            } else {
                VoltageMode::Ac
            },
            interval_minutes: self.interval,
        }
    }
}
