use anyhow::{Context, Result};
use log::{error, info};
use reqwest::blocking::Client;

use crate::reading::{hhmm, hhmm_nearest5};
use crate::reading_set::ReadingSet;

const STATUS_URL: &str = "http://pvoutput.org/service/r2/addstatus.jsp";
const OUTPUT_URL: &str = "http://pvoutput.org/service/r2/addoutput.jsp";

/// Fields for the live status upload: last reading's time, power and
/// voltage plus the running energy total.
pub fn status_fields(set: &ReadingSet, date: &str) -> Result<Vec<(&'static str, String)>> {
    let last = set.last().context("empty reading set")?;
    Ok(vec![
        ("d", date.to_string()),
        ("t", hhmm(last.time)),
        ("v1", set.total_energy().to_string()),
        ("v2", last.power_now.to_string()),
        ("v6", last.voltage_now.to_string()),
    ])
}

/// Fields for the end-of-day summary upload. pvoutput.org only accepts
/// peak times on 5-minute boundaries.
pub fn output_fields(set: &ReadingSet, date: &str) -> Result<Vec<(&'static str, String)>> {
    let max = set.max_reading()?;
    Ok(vec![
        ("d", date.to_string()),
        ("g", set.total_energy().to_string()),
        ("pp", max.power_now.to_string()),
        ("pt", hhmm_nearest5(max.time)),
        ("cd", "Not Sure".to_string()),
    ])
}

/// Submit the status and daily-output field sets for one file's readings.
/// The status upload is skipped when the file ended inside an outage, since
/// the last reading would misrepresent the present state.
pub fn send_to_pvoutput(
    set: &ReadingSet,
    system_id: &str,
    system_key: &str,
    date: &str,
) -> Result<()> {
    let client = Client::new();
    if !set.in_outage() {
        post(&client, STATUS_URL, system_id, system_key, &status_fields(set, date)?)?;
    }
    post(&client, OUTPUT_URL, system_id, system_key, &output_fields(set, date)?)?;
    Ok(())
}

fn post(
    client: &Client,
    url: &str,
    system_id: &str,
    system_key: &str,
    fields: &[(&str, String)],
) -> Result<()> {
    let response = client
        .post(url)
        .header("X-Pvoutput-Apikey", system_key)
        .header("X-Pvoutput-SystemId", system_id)
        .form(fields)
        .send()
        .with_context(|| format!("Failed to POST to {}", url))?;

    let status = response.status();
    if status.is_success() {
        info!("Posted to {}", url);
    } else {
        error!(
            "{} returned {}: {}",
            url,
            status,
            response.text().unwrap_or_default()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::{ReadingConfig, VoltageMode};
    use csv::StringRecord;

    fn sample_set() -> ReadingSet {
        let mut set = ReadingSet::new(ReadingConfig {
            deduct_watts: 0,
            voltage_mode: VoltageMode::Ac,
            interval_minutes: 5,
        });
        for (time, power, volts) in [
            ("2012-06-14 11:53:00", "100", "240"),
            ("2012-06-14 11:58:00", "450", "242"),
            ("2012-06-14 12:03:00", "150", "239"),
        ] {
            let row =
                StringRecord::from(vec![time, "", "", "", "", power, "", volts, "", "", ""]);
            set.add_reading(&row).unwrap();
        }
        set
    }

    #[test]
    fn status_fields_reflect_the_last_reading() {
        let set = sample_set();
        // (100 + 450 + 150) * 5 / 60 = 58 Wh.
        assert_eq!(
            status_fields(&set, "20120614").unwrap(),
            vec![
                ("d", "20120614".to_string()),
                ("t", "12:03".to_string()),
                ("v1", "58".to_string()),
                ("v2", "150".to_string()),
                ("v6", "239".to_string()),
            ]
        );
    }

    #[test]
    fn output_fields_round_the_peak_time() {
        let set = sample_set();
        assert_eq!(
            output_fields(&set, "20120614").unwrap(),
            vec![
                ("d", "20120614".to_string()),
                ("g", "58".to_string()),
                ("pp", "450".to_string()),
                ("pt", "12:00".to_string()),
                ("cd", "Not Sure".to_string()),
            ]
        );
    }

    #[test]
    fn field_builders_fail_on_empty_set() {
        let set = ReadingSet::new(ReadingConfig {
            deduct_watts: 0,
            voltage_mode: VoltageMode::Ac,
            interval_minutes: 0,
        });
        assert!(status_fields(&set, "20120614").is_err());
        assert!(output_fields(&set, "20120614").is_err());
    }
}
