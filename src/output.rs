use std::io::{self, Write};

use crossterm::style::Stylize;
use serde::Serialize;

use crate::app::{BatchReport, ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(report: &BatchReport) -> io::Result<()> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Human-readable end-of-batch summary: downloads, then the itemized
/// failures.
pub fn write_summary(out: &mut dyn Write, report: &BatchReport, color: bool) -> io::Result<()> {
    let headline = format!(
        "Downloaded {} of {} files",
        report.downloaded.len(),
        report.attempted
    );
    if color {
        writeln!(out, "{}", headline.green())?;
    } else {
        writeln!(out, "{headline}")?;
    }
    for file in &report.downloaded {
        writeln!(out, "  {}", file.path)?;
    }

    if report.failures.is_empty() {
        return Ok(());
    }
    let heading = format!("{} failures:", report.failures.len());
    if color {
        writeln!(out, "{}", heading.red())?;
    } else {
        writeln!(out, "{heading}")?;
    }
    for failure in &report.failures {
        writeln!(
            out,
            "- Run {}, {} [{}]: {}",
            failure.run,
            failure.dataset,
            failure.stage.as_str(),
            failure.error
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use super::*;
    use crate::app::{FailureRecord, TaskStage};
    use crate::domain::RunNumber;

    #[test]
    fn summary_lists_every_failure() {
        let report = BatchReport {
            attempted: 2,
            downloaded: Vec::new(),
            failures: vec![
                FailureRecord {
                    run: RunNumber::new(10),
                    dataset: "B".to_string(),
                    stage: TaskStage::Resolve,
                    error: "no era covers run 10".to_string(),
                },
                FailureRecord {
                    run: RunNumber::new(11),
                    dataset: "A".to_string(),
                    stage: TaskStage::Fetch,
                    error: "archive returned status 404".to_string(),
                },
            ],
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };
        let mut buffer = Vec::new();
        write_summary(&mut buffer, &report, false).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("Downloaded 0 of 2 files"));
        assert!(text.contains("2 failures:"));
        assert!(text.contains("- Run 10, B [resolve]: no era covers run 10"));
        assert!(text.contains("- Run 11, A [fetch]: archive returned status 404"));
        assert!(!text.contains('\x1b'));
    }

    #[test]
    fn json_report_carries_rfc3339_timestamps() {
        let started_at = Utc.with_ymd_and_hms(2022, 7, 15, 10, 21, 5).unwrap();
        let report = BatchReport {
            attempted: 0,
            downloaded: Vec::new(),
            failures: Vec::new(),
            started_at,
            finished_at: started_at,
        };
        let value = serde_json::to_value(&report).unwrap();
        let raw = value["started_at"].as_str().unwrap();
        assert_eq!(DateTime::parse_from_rfc3339(raw).unwrap(), started_at);
    }
}
