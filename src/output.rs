use std::io::{self, Write};

use serde::Serialize;

use crate::batch::{BatchSummary, ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &BatchSummary) -> io::Result<()> {
        Self::print_json(summary)
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

pub struct TextOutput;

impl TextOutput {
    pub fn print_summary(summary: &BatchSummary) -> io::Result<()> {
        let mut stdout = io::stdout();
        stdout.write_all(Self::render_summary(summary).as_bytes())
    }

    /// `{vendor}: succeed: N, failed: M`, then one line per failed row.
    pub fn render_summary(summary: &BatchSummary) -> String {
        let mut text = format!(
            "{}: succeed: {}, failed: {}\n",
            summary.vendor, summary.succeeded, summary.failed
        );
        for failure in &summary.failures {
            let stage = failure
                .stage
                .map(|stage| format!("[{stage}] "))
                .unwrap_or_default();
            text.push_str(&format!(
                "  line {}: {stage}{}\n",
                failure.line, failure.message
            ));
        }
        if summary.cancelled {
            text.push_str(&format!(
                "cancelled: {} row(s) not attempted\n",
                summary.skipped
            ));
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::RowFailure;
    use crate::domain::SampleKey;
    use crate::error::Stage;
    use crate::pipeline::{RowAction, RowOutcome};

    #[test]
    fn text_summary_lists_failures() {
        let summary = BatchSummary {
            vendor: "Guardant360".to_string(),
            succeeded: 4,
            failed: 1,
            failures: vec![RowFailure {
                line: 4,
                path_number: Some("M112-00003".to_string()),
                mp_number: Some("MY23003".to_string()),
                stage: Some(Stage::Resolve),
                message: "no report directory".to_string(),
            }],
            ..BatchSummary::default()
        };
        let text = TextOutput::render_summary(&summary);
        assert_eq!(
            text,
            "Guardant360: succeed: 4, failed: 1\n  line 4: [resolve] no report directory\n"
        );
    }

    #[test]
    fn cancelled_run_says_so() {
        let summary = BatchSummary {
            vendor: "Archer".to_string(),
            succeeded: 1,
            cancelled: true,
            skipped: 2,
            ..BatchSummary::default()
        };
        let text = TextOutput::render_summary(&summary);
        assert!(text.starts_with("Archer: succeed: 1, failed: 0\n"));
        assert!(text.contains("2 row(s) not attempted"));
    }

    #[test]
    fn json_summary_carries_report_paths() {
        let summary = BatchSummary {
            vendor: "Archer".to_string(),
            succeeded: 1,
            outcomes: vec![RowOutcome {
                key: SampleKey::new("M112-00001", "MY23001"),
                report_dir: "/reports/Archer/M112-00001_MY23001".into(),
                action: RowAction::Registered,
                renamed: 1,
                objects: 1,
                drs_id: "drs_M112-00001_MY23001".to_string(),
            }],
            ..BatchSummary::default()
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(
            value["outcomes"][0]["report_dir"],
            "/reports/Archer/M112-00001_MY23001"
        );
        assert_eq!(value["outcomes"][0]["action"], "registered");
    }
}
