use anyhow::{bail, Context, Result};
use chrono::{NaiveDateTime, Timelike};
use csv::StringRecord;

/// Column layout of the inverter's CSV log. Fixed by the logger firmware.
pub const TIMESTAMP_FIELD: usize = 0;
pub const POWER_FIELD: usize = 5;
pub const AC_VOLTAGE_FIELD: usize = 7;
pub const DC_VOLTAGE_FIELD: usize = 10;

/// What the logger writes in the power column when the sensor had no reading.
pub const OVERFLOW_SENTINEL: &str = "overflow";

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
];

/// Which voltage column to take readings from, fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoltageMode {
    Ac,
    Dc,
}

/// Per-run options for constructing readings, passed once at set creation.
#[derive(Debug, Clone, Copy)]
pub struct ReadingConfig {
    /// Watts to subtract from every raw reading (e.g. inverter self-draw).
    pub deduct_watts: u32,
    pub voltage_mode: VoltageMode,
    /// Minutes between readings; 0 means infer from the data.
    pub interval_minutes: u32,
}

/// One validated power/voltage sample at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    pub time: NaiveDateTime,
    pub raw_power: u32,
    /// Raw power with the configured deduction applied, floored at zero.
    pub power_now: u32,
    pub voltage_now: u32,
}

impl Reading {
    /// Build a reading from one CSV row. Numeric fields that fail to parse
    /// degrade to 0, matching the logger's own lenient conventions; only a
    /// missing or unparseable timestamp is an error.
    pub fn from_record(row: &StringRecord, config: &ReadingConfig) -> Result<Self> {
        let time = parse_timestamp(
            row.get(TIMESTAMP_FIELD)
                .context("row is missing its timestamp field")?,
        )?;
        let raw_power = lenient_watts(row.get(POWER_FIELD));
        let voltage_field = match config.voltage_mode {
            VoltageMode::Ac => AC_VOLTAGE_FIELD,
            VoltageMode::Dc => DC_VOLTAGE_FIELD,
        };
        Ok(Self {
            time,
            raw_power,
            power_now: raw_power.saturating_sub(config.deduct_watts),
            voltage_now: lenient_watts(row.get(voltage_field)),
        })
    }
}

/// A detected gap between two valid readings. `before` is absent only when
/// the gap opened before any reading had been accumulated.
#[derive(Debug, Clone)]
pub struct Outage {
    pub time: NaiveDateTime,
    pub before: Option<Reading>,
    pub after: Reading,
}

fn lenient_watts(field: Option<&str>) -> u32 {
    field.and_then(|s| s.trim().parse().ok()).unwrap_or(0)
}

pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let trimmed = raw.trim();
    for format in TIMESTAMP_FORMATS {
        if let Ok(time) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(time);
        }
    }
    bail!("Unparseable timestamp: {:?}", trimmed)
}

pub fn hhmmss(time: NaiveDateTime) -> String {
    time.format("%H:%M:%S").to_string()
}

pub fn hhmm(time: NaiveDateTime) -> String {
    time.format("%H:%M").to_string()
}

/// Time as HH:MM rounded to the nearest 5 minutes — pvoutput.org can manage
/// only multiples of 5 in its peak-power time field.
pub fn hhmm_nearest5(time: NaiveDateTime) -> String {
    let rounded = (time.minute() + 2) / 5 * 5;
    if rounded == 60 {
        format!("{:02}:00", time.hour() + 1)
    } else {
        format!("{:02}:{:02}", time.hour(), rounded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[&str]) -> StringRecord {
        StringRecord::from(fields.to_vec())
    }

    fn sample_row<'a>(power: &'a str, ac: &'a str, dc: &'a str) -> StringRecord {
        row(&[
            "2012-06-14 11:25:00",
            "1",
            "2",
            "3",
            "4",
            power,
            "6",
            ac,
            "8",
            "9",
            dc,
        ])
    }

    fn config(deduct: u32, mode: VoltageMode) -> ReadingConfig {
        ReadingConfig {
            deduct_watts: deduct,
            voltage_mode: mode,
            interval_minutes: 0,
        }
    }

    #[test]
    fn reading_without_deduction() {
        let r = Reading::from_record(&sample_row("500", "240", "380"), &config(0, VoltageMode::Ac))
            .unwrap();
        assert_eq!(r.raw_power, 500);
        assert_eq!(r.power_now, 500);
        assert_eq!(r.voltage_now, 240);
    }

    #[test]
    fn deduction_is_subtracted() {
        let r = Reading::from_record(&sample_row("500", "240", "380"), &config(60, VoltageMode::Ac))
            .unwrap();
        assert_eq!(r.raw_power, 500);
        assert_eq!(r.power_now, 440);
    }

    #[test]
    fn deduction_never_goes_negative() {
        let r = Reading::from_record(&sample_row("40", "240", "380"), &config(60, VoltageMode::Ac))
            .unwrap();
        assert_eq!(r.power_now, 0);
    }

    #[test]
    fn dc_mode_selects_dc_column() {
        let r = Reading::from_record(&sample_row("500", "240", "380"), &config(0, VoltageMode::Dc))
            .unwrap();
        assert_eq!(r.voltage_now, 380);
    }

    #[test]
    fn malformed_numeric_fields_parse_to_zero() {
        let r = Reading::from_record(&sample_row("n/a", "??", "380"), &config(0, VoltageMode::Ac))
            .unwrap();
        assert_eq!(r.raw_power, 0);
        assert_eq!(r.power_now, 0);
        assert_eq!(r.voltage_now, 0);
    }

    #[test]
    fn short_row_yields_zero_for_missing_columns() {
        let r = Reading::from_record(
            &row(&["2012-06-14 11:25:00", "1", "2", "3", "4", "500"]),
            &config(0, VoltageMode::Ac),
        )
        .unwrap();
        assert_eq!(r.power_now, 500);
        assert_eq!(r.voltage_now, 0);
    }

    #[test]
    fn timestamp_formats() {
        assert!(parse_timestamp("2012-06-14 11:25:00").is_ok());
        assert!(parse_timestamp("2012-06-14T11:25:00").is_ok());
        assert!(parse_timestamp("2012/06/14 11:25:00").is_ok());
        assert!(parse_timestamp("yesterday-ish").is_err());
    }

    #[test]
    fn missing_timestamp_is_an_error() {
        assert!(Reading::from_record(&row(&[]), &config(0, VoltageMode::Ac)).is_err());
    }

    #[test]
    fn nearest5_rounds_half_up() {
        let t = |s: &str| parse_timestamp(s).unwrap();
        assert_eq!(hhmm_nearest5(t("2012-06-14 11:00:00")), "11:00");
        assert_eq!(hhmm_nearest5(t("2012-06-14 11:02:00")), "11:00");
        assert_eq!(hhmm_nearest5(t("2012-06-14 11:03:00")), "11:05");
        assert_eq!(hhmm_nearest5(t("2012-06-14 11:07:00")), "11:05");
        assert_eq!(hhmm_nearest5(t("2012-06-14 11:08:00")), "11:10");
    }

    #[test]
    fn nearest5_carries_into_next_hour() {
        let t = parse_timestamp("2012-06-14 11:58:00").unwrap();
        assert_eq!(hhmm_nearest5(t), "12:00");
    }
}
