mod config;
mod reading;
mod reading_set;
mod report;

use anyhow::{Context, Result};
use clap::Parser;
use log::error;
use std::path::Path;

use crate::reading::hhmmss;
use crate::reading_set::ReadingSet;

fn main() -> Result<()> {
    env_logger::init();

    let config = config::Config::parse();
    let reading_config = config.reading_config();

    if config.short {
        println!("Date     Start    End      Max    At       Readings Total     MeanV Outages");
    }

    let mut voltage_sum = 0.0;
    let mut voltage_count = 0usize;
    for path in &config.files {
        if config.verbose {
            println!("Processing {}", path.display());
        }
        let readings = match ReadingSet::from_csv_file(path, reading_config) {
            Ok(readings) => readings,
            Err(e) => {
                error!("Skipping {}: {:#}", path.display(), e);
                continue;
            }
        };
        if readings.is_empty() {
            if !config.quiet {
                println!("{} empty.", path.display());
            }
            continue;
        }

        if config.outages {
            print_outages(&readings, config.verbose, config.quiet);
        } else if config.send {
            match (&config.id, &config.key, &config.date) {
                (Some(id), Some(key), Some(date)) => {
                    report::send_to_pvoutput(&readings, id, key, date)?;
                }
                _ => {
                    println!(
                        "Must specify a date, system id and key in order to send to pvoutput.org"
                    );
                }
            }
        } else if config.short {
            print_short(path, &readings)?;
        } else {
            print_details(path, &readings)?;
        }

        let (sum, count) = readings.voltage_sum_and_count();
        voltage_sum += sum;
        voltage_count += count;
    }

    if voltage_count > 0 && config.short {
        println!(
            "Overall mean voltage = {:.2}",
            voltage_sum / voltage_count as f64
        );
    }
    Ok(())
}

fn print_outages(readings: &ReadingSet, verbose: bool, quiet: bool) {
    if readings.outages().is_empty() {
        if !quiet {
            println!("No outages.");
        }
        return;
    }
    for outage in readings.outages() {
        if verbose {
            println!("Outage at {}", hhmmss(outage.time));
            if let Some(before) = &outage.before {
                println!(
                    "Before: voltage {}, wattage {}",
                    before.voltage_now, before.power_now
                );
            }
            println!(
                "After : voltage {}, wattage {}",
                outage.after.voltage_now, outage.after.power_now
            );
        } else {
            println!("{}", hhmmss(outage.time));
        }
    }
}

fn print_short(path: &Path, readings: &ReadingSet) -> Result<()> {
    let first = readings.first().context("empty reading set")?;
    let last = readings.last().context("empty reading set")?;
    let max = readings.max_reading()?;
    println!(
        "{} {} {} {:>4} W {} {:>3}      {:>5} Wh  {:.1} {}",
        path.file_stem().unwrap_or_default().to_string_lossy(),
        hhmmss(first.time),
        hhmmss(last.time),
        max.power_now,
        hhmmss(max.time),
        readings.size(),
        readings.total_energy(),
        readings.mean_voltage()?,
        readings.outages().len()
    );
    Ok(())
}

fn print_details(path: &Path, readings: &ReadingSet) -> Result<()> {
    let first = readings.first().context("empty reading set")?;
    let last = readings.last().context("empty reading set")?;
    let max = readings.max_reading()?;
    let min = readings.min_reading()?;
    println!("Processed     : {}", path.display());
    println!("Maximum power : {} W at {}", max.power_now, hhmmss(max.time));
    println!("Minimum power : {} W at {}", min.power_now, hhmmss(min.time));
    println!("Total energy  : {} Wh", readings.total_energy());
    println!("First reading : {} ({} W)", hhmmss(first.time), first.power_now);
    println!("Last reading  : {} ({} W)", hhmmss(last.time), last.power_now);
    println!("Total readings: {}", readings.size());
    println!("Outages       : {}", readings.outages().len());
    Ok(())
}
