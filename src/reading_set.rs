use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use csv::StringRecord;
use log::debug;
use std::path::Path;

use crate::reading::{
    parse_timestamp, Outage, Reading, ReadingConfig, OVERFLOW_SENTINEL, POWER_FIELD,
    TIMESTAMP_FIELD,
};

/// Readings needed before the sampling interval is inferred from the data.
const INFERENCE_WINDOW: usize = 10;

/// Where the accumulator stands with respect to gaps in the data.
///
/// `Warmup` covers the stretch before the first valid reading arrives; a run
/// of overflow rows there is not an outage because there is nothing to have
/// dropped out from. Once a reading has been seen, an overflow row moves us
/// to `InOutage` and the next valid reading closes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutageState {
    Warmup,
    Normal,
    InOutage { since: NaiveDateTime },
}

/// Accumulates one file's readings in row order, tracking outages and the
/// apparent sampling interval as it goes. Populate with `add_reading`, then
/// query.
pub struct ReadingSet {
    readings: Vec<Reading>,
    outages: Vec<Outage>,
    state: OutageState,
    consecutive_good: usize,
    /// Minutes between readings; 0 until supplied or inferred, fixed after.
    apparent_interval: u32,
    config: ReadingConfig,
}

impl ReadingSet {
    pub fn new(config: ReadingConfig) -> Self {
        Self {
            readings: Vec::new(),
            outages: Vec::new(),
            state: OutageState::Warmup,
            consecutive_good: 0,
            apparent_interval: config.interval_minutes,
            config,
        }
    }

    /// Read a whole CSV log into a fresh set.
    pub fn from_csv_file(path: &Path, config: ReadingConfig) -> Result<Self> {
        let mut set = Self::new(config);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        for record in reader.records() {
            let record =
                record.with_context(|| format!("Failed to read row from {}", path.display()))?;
            set.add_reading(&record)?;
        }
        Ok(set)
    }

    /// Consume one raw row: either an overflow marker, which opens (or
    /// continues) an outage, or a valid sample, which closes any open outage
    /// and is appended.
    pub fn add_reading(&mut self, row: &StringRecord) -> Result<()> {
        if row.get(POWER_FIELD) == Some(OVERFLOW_SENTINEL) {
            if self.state == OutageState::Normal {
                let since = parse_timestamp(
                    row.get(TIMESTAMP_FIELD)
                        .context("overflow row is missing its timestamp field")?,
                )?;
                debug!("Outage started at {}", since);
                self.state = OutageState::InOutage { since };
            }
            self.consecutive_good = 0;
            return Ok(());
        }

        let reading = Reading::from_record(row, &self.config)?;
        match self.state {
            OutageState::Warmup => {
                // First good reading of the file; the leading gap is not an
                // outage.
            }
            OutageState::InOutage { since } => {
                self.outages.push(Outage {
                    time: since,
                    before: self.readings.last().cloned(),
                    after: reading.clone(),
                });
            }
            OutageState::Normal => {}
        }
        self.state = OutageState::Normal;
        self.readings.push(reading);
        self.consecutive_good += 1;
        if self.consecutive_good >= INFERENCE_WINDOW && self.apparent_interval == 0 {
            self.infer_interval();
        }
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn outages(&self) -> &[Outage] {
        &self.outages
    }

    /// Minutes between readings, 0 if never supplied or inferred.
    pub fn apparent_interval(&self) -> u32 {
        self.apparent_interval
    }

    /// True when the input ended without a valid reading closing the gap
    /// (including the case where no reading ever arrived).
    pub fn in_outage(&self) -> bool {
        self.state != OutageState::Normal
    }

    pub fn first(&self) -> Option<&Reading> {
        self.readings.first()
    }

    pub fn last(&self) -> Option<&Reading> {
        self.readings.last()
    }

    /// Reading with the highest power; among ties, the latest encountered.
    pub fn max_reading(&self) -> Result<&Reading> {
        self.readings
            .iter()
            .max_by_key(|r| r.power_now)
            .context("empty reading set")
    }

    /// Reading with the lowest power; among ties, the earliest encountered.
    pub fn min_reading(&self) -> Result<&Reading> {
        self.readings
            .iter()
            .min_by_key(|r| r.power_now)
            .context("empty reading set")
    }

    pub fn max_power(&self) -> Result<u32> {
        Ok(self.max_reading()?.power_now)
    }

    pub fn min_power(&self) -> Result<u32> {
        Ok(self.min_reading()?.power_now)
    }

    pub fn mean_voltage(&self) -> Result<f64> {
        let (sum, count) = self.voltage_sum_and_count();
        if count == 0 {
            anyhow::bail!("empty reading set");
        }
        Ok(sum / count as f64)
    }

    /// Raw ingredients of the mean, for aggregating across several files.
    pub fn voltage_sum_and_count(&self) -> (f64, usize) {
        let sum = self
            .readings
            .iter()
            .map(|r| f64::from(r.voltage_now))
            .sum();
        (sum, self.readings.len())
    }

    /// Rectangle-sum energy estimate in watt-hours: each reading is assumed
    /// to hold for one whole interval. Returns 0 while the interval is
    /// unknown.
    pub fn total_energy(&self) -> u64 {
        let sum: u64 = self.readings.iter().map(|r| u64::from(r.power_now)).sum();
        sum * u64::from(self.apparent_interval) / 60
    }

    /// Mean of the deltas across the last ten readings, rounded to the
    /// nearest minute. Called once; the result is never revised.
    fn infer_interval(&mut self) {
        if self.readings.len() < INFERENCE_WINDOW {
            return;
        }
        let window = &self.readings[self.readings.len() - INFERENCE_WINDOW..];
        let total: i64 = window
            .windows(2)
            .map(|pair| (pair[1].time - pair[0].time).num_seconds())
            .sum();
        let mean = total / (INFERENCE_WINDOW as i64 - 1);
        self.apparent_interval = ((mean + 30) / 60).max(0) as u32;
        debug!("Apparent interval: {} minutes", self.apparent_interval);
    }
}
