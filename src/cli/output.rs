use std::fmt::Write as FmtWrite;

use serde::Serialize;

use crate::models::{ItemState, OutputFormat};
use crate::services::{
    CheckpointSummary, DestinationRef, ItemRecord, PublishOutcome, RunRecord, RunReport,
};

pub trait Formatter {
    fn format_run_report(&self, report: &RunReport) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_failures(&self, failures: &[ItemRecord]) -> String;
    fn format_destination(&self, destination: &DestinationRef) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub checkpoint_path: String,
    pub output_path: String,
    pub output_rows: usize,
    pub sink: String,
    pub summary: CheckpointSummary,
    pub recent_runs: Vec<RunRecord>,
    pub failures: Vec<ItemRecord>,
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_run_report(&self, report: &RunReport) -> String {
        let stats = &report.stats;
        let mut output = String::new();
        writeln!(output, "Run #{} Complete", report.run_id).unwrap();
        writeln!(output, "----------------").unwrap();
        writeln!(
            output,
            "Keywords:  {} searched, {} from cache",
            stats.keywords_searched, stats.keywords_cached
        )
        .unwrap();
        writeln!(
            output,
            "API calls: {} search, {} detail, {} vision ({} images from cache)",
            stats.search_calls, stats.detail_calls, stats.vision_calls, stats.vision_cached
        )
        .unwrap();
        writeln!(output, "Persisted: {}", stats.persisted).unwrap();
        writeln!(output, "Failed:    {}", stats.failed).unwrap();
        writeln!(output, "Deferred:  {}", stats.deferred).unwrap();
        writeln!(output, "Skipped:   {} (already done)", stats.skipped).unwrap();
        writeln!(output, "Rows:      {}", stats.rows_written).unwrap();
        if stats.recovered > 0 {
            writeln!(output, "Recovered: {} (from output file)", stats.recovered).unwrap();
        }
        if report.stopped {
            writeln!(output, "Stopped early on request").unwrap();
        }

        let failed: Vec<_> = report
            .items
            .iter()
            .filter_map(|item| match &item.state {
                ItemState::Failed { stage, reason } => Some((item, stage, reason)),
                _ => None,
            })
            .collect();
        if !failed.is_empty() {
            writeln!(output, "\nFailures").unwrap();
            for (item, stage, reason) in failed {
                writeln!(output, "  {} [{}] {}", item.product_id, stage, reason).unwrap();
            }
        }

        if !report.keyword_errors.is_empty() {
            writeln!(output, "\nKeyword errors").unwrap();
            for (keyword, error) in &report.keyword_errors {
                writeln!(output, "  \"{}\": {}", keyword, error).unwrap();
            }
        }

        writeln!(output).unwrap();
        match &report.publish {
            PublishOutcome::Disabled => writeln!(output, "Publish:   disabled").unwrap(),
            PublishOutcome::Skipped => writeln!(output, "Publish:   skipped (no new rows)").unwrap(),
            PublishOutcome::Published { destination } => {
                writeln!(output, "Publish:   {}", destination).unwrap()
            }
            PublishOutcome::Failed { error } => {
                writeln!(output, "Publish:   FAILED ({}); local file kept", error).unwrap()
            }
        }
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let s = &status.summary;
        let mut output = String::new();
        writeln!(output, "Status").unwrap();
        writeln!(output, "------").unwrap();
        writeln!(output, "Checkpoint:  {}", status.checkpoint_path).unwrap();
        writeln!(output, "  Persisted: {}", s.persisted).unwrap();
        writeln!(output, "  Failed:    {}", s.failed).unwrap();
        writeln!(output, "  Deferred:  {}", s.deferred).unwrap();
        writeln!(output, "  Keywords:  {} cached", s.keywords_cached).unwrap();
        writeln!(output, "  Images:    {} analysed", s.images_analysed).unwrap();
        writeln!(output, "Output:      {}", status.output_path).unwrap();
        writeln!(output, "  Rows:      {}", status.output_rows).unwrap();
        writeln!(output, "Publish to:  {}", status.sink).unwrap();

        if !status.recent_runs.is_empty() {
            writeln!(output, "\nRecent runs").unwrap();
            for run in &status.recent_runs {
                let state = match (&run.finished_at, run.stopped) {
                    (None, _) => "unfinished",
                    (Some(_), true) => "stopped",
                    (Some(_), false) => "done",
                };
                writeln!(
                    output,
                    "  #{} {} [{}] persisted {}, failed {}, deferred {}, rows {}",
                    run.id,
                    run.started_at,
                    state,
                    run.persisted,
                    run.failed,
                    run.deferred,
                    run.rows
                )
                .unwrap();
            }
        }

        if !status.failures.is_empty() {
            writeln!(output).unwrap();
            output.push_str(&self.format_failures(&status.failures));
        }
        output
    }

    fn format_failures(&self, failures: &[ItemRecord]) -> String {
        if failures.is_empty() {
            return "No failed items.\n".to_string();
        }

        let mut output = String::new();
        writeln!(output, "Failed Items").unwrap();
        writeln!(output, "------------").unwrap();
        for record in failures {
            writeln!(
                output,
                "{} {} at {} ({} attempt(s)): {}",
                record.product_id,
                record.outcome.as_str(),
                record.stage.map(|s| s.as_str()).unwrap_or("-"),
                record.attempts,
                record.reason.as_deref().unwrap_or("")
            )
            .unwrap();
        }
        output
    }

    fn format_destination(&self, destination: &DestinationRef) -> String {
        format!("Published to {}\n", destination)
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render<T: Serialize + ?Sized>(&self, value: &T) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        let mut text = rendered.unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e));
        text.push('\n');
        text
    }
}

impl Formatter for JsonFormatter {
    fn format_run_report(&self, report: &RunReport) -> String {
        self.render(report)
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        self.render(status)
    }

    fn format_failures(&self, failures: &[ItemRecord]) -> String {
        self.render(&serde_json::json!({ "failures": failures }))
    }

    fn format_destination(&self, destination: &DestinationRef) -> String {
        self.render(destination)
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", serde_json::json!({"message": message}))
    }

    fn format_error(&self, error: &str) -> String {
        format!("{}\n", serde_json::json!({"error": error}))
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FailureKind, FailureReason, Outcome, Stage};
    use crate::services::{ItemSummary, RunStats};

    fn report() -> RunReport {
        RunReport {
            run_id: 7,
            stats: RunStats {
                persisted: 1,
                failed: 1,
                rows_written: 5,
                ..Default::default()
            },
            items: vec![
                ItemSummary {
                    product_id: "B000000001".into(),
                    keyword: "kids vitamins".into(),
                    state: ItemState::Persisted { rows: 5 },
                },
                ItemSummary {
                    product_id: "B000000002".into(),
                    keyword: "kids vitamins".into(),
                    state: ItemState::Failed {
                        stage: Stage::Detail,
                        reason: FailureReason::new(FailureKind::NotFound, "delisted", 1),
                    },
                },
            ],
            keyword_errors: Vec::new(),
            publish: PublishOutcome::Failed {
                error: "connection refused".into(),
            },
            stopped: false,
        }
    }

    #[test]
    fn test_text_run_report() {
        let text = TextFormatter.format_run_report(&report());
        assert!(text.contains("Run #7"));
        assert!(text.contains("B000000002 [detail] not_found"));
        assert!(text.contains("FAILED (connection refused)"));
    }

    #[test]
    fn test_json_run_report() {
        let json = JsonFormatter::new(false).format_run_report(&report());
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["stats"]["rows_written"], 5);
        assert_eq!(value["items"][1]["state"]["state"], "failed");
        assert_eq!(value["publish"]["status"], "failed");
    }

    #[test]
    fn test_text_status() {
        let status = StatusInfo {
            checkpoint_path: "output/checkpoint.sqlite".into(),
            output_path: "output/supplement_facts.csv".into(),
            output_rows: 12,
            sink: "drive".into(),
            summary: CheckpointSummary {
                persisted: 3,
                failed: 1,
                ..Default::default()
            },
            recent_runs: vec![RunRecord {
                id: 2,
                started_at: "2026-01-02T00:00:00Z".into(),
                finished_at: Some("2026-01-02T00:05:00Z".into()),
                persisted: 3,
                rows: 12,
                ..Default::default()
            }],
            failures: Vec::new(),
        };

        let text = TextFormatter.format_status(&status);
        assert!(text.contains("Rows:      12"));
        assert!(text.contains("Publish to:  drive"));
        assert!(text.contains("#2 2026-01-02T00:00:00Z [done]"));
        assert!(!text.contains("Failed Items"));
    }

    #[test]
    fn test_failures_output() {
        let record = ItemRecord {
            product_id: "B000000003".into(),
            outcome: Outcome::Deferred,
            stage: Some(Stage::Extraction),
            kind: Some("retries_exhausted".into()),
            reason: Some("status 503".into()),
            attempts: 3,
            rows: 0,
            updated_at: "2026-01-01T00:00:00Z".into(),
        };
        let text = TextFormatter.format_failures(std::slice::from_ref(&record));
        assert!(text.contains("B000000003 deferred at extraction (3 attempt(s))"));
        assert_eq!(TextFormatter.format_failures(&[]), "No failed items.\n");
    }
}
