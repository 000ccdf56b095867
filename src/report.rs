use crate::config::RunConfig;
use crate::engine::{FailureBreakdown, RunSnapshot, RunState, StatsSummary, StopReason};
use crate::utils::duration_millis;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

const RECENT_ERRORS: usize = 50;

#[derive(Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub timestamp: DateTime<Utc>,
    pub run_id: Option<Uuid>,
    pub config: Option<RunConfig>,
    pub state: RunState,
    pub stop_reason: Option<StopReason>,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    pub summary: StatsSummary,
    pub failures: FailureBreakdown,
    pub status_codes: BTreeMap<u16, u64>,
    pub recent_errors: Vec<String>,
    pub errors_dropped: u64,
}

pub struct ReportGenerator;

impl ReportGenerator {
    /// Write one report per comma-separated format (`json`, `html`, `csv`).
    pub fn generate_reports(
        snapshot: &RunSnapshot,
        formats: &str,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(output_dir).with_context(|| {
            format!("Failed to create report directory {}", output_dir.display())
        })?;

        let report = Self::build_report(snapshot);
        let mut generated_files = Vec::new();

        for format in formats.split(',') {
            let format = format.trim().to_lowercase();
            match format.as_str() {
                "" => {}
                "json" => {
                    let path = Self::generate_json_report(&report, output_dir)?;
                    generated_files.push(path);
                }
                "html" => {
                    let path = Self::generate_html_report(&report, output_dir)?;
                    generated_files.push(path);
                }
                "csv" => {
                    let path = Self::generate_csv_timeline(snapshot, &report, output_dir)?;
                    generated_files.push(path);
                }
                _ => {
                    warn!(format = %format, "unknown report format, skipping");
                }
            }
        }

        Ok(generated_files)
    }

    pub fn build_report(snapshot: &RunSnapshot) -> RunReport {
        let stats = &snapshot.stats;
        let skip = stats.errors.len().saturating_sub(RECENT_ERRORS);

        RunReport {
            timestamp: Utc::now(),
            run_id: snapshot.run_id,
            config: snapshot.config.clone(),
            state: snapshot.state,
            stop_reason: snapshot.stop_reason,
            duration: snapshot.elapsed,
            summary: snapshot.summary(),
            failures: stats.failures.clone(),
            status_codes: stats.status_codes.clone(),
            recent_errors: stats.errors.iter().skip(skip).cloned().collect(),
            errors_dropped: stats.errors_dropped + skip as u64,
        }
    }

    fn file_name(report: &RunReport, kind: &str, extension: &str) -> String {
        let timestamp = report.timestamp.format("%Y%m%d_%H%M%S");
        match report.run_id {
            Some(id) => format!(
                "surge_{}_{}_{}.{}",
                kind,
                timestamp,
                &id.simple().to_string()[..8],
                extension
            ),
            None => format!("surge_{}_{}.{}", kind, timestamp, extension),
        }
    }

    fn generate_json_report(report: &RunReport, output_dir: &Path) -> Result<PathBuf> {
        let path = output_dir.join(Self::file_name(report, "report", "json"));

        let json = serde_json::to_string_pretty(report)?;
        fs::write(&path, json)?;

        Ok(path)
    }

    fn generate_html_report(report: &RunReport, output_dir: &Path) -> Result<PathBuf> {
        use tera::{Context, Tera};

        let path = output_dir.join(Self::file_name(report, "report", "html"));

        let mut tera = Tera::default();
        tera.add_raw_template("report.html", include_str!("../templates/report.html"))
            .map_err(|e| anyhow::anyhow!("Failed to add template: {}", e))?;

        let mut context = Context::new();
        context.insert("report", report);
        context.insert(
            "timestamp",
            &report.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        );
        context.insert(
            "duration_secs",
            &format!("{:.2}", report.duration.as_secs_f64()),
        );
        context.insert(
            "success_rate_rounded",
            &format!("{:.2}", report.summary.success_rate),
        );
        context.insert(
            "avg_latency",
            &format!("{:.2}", report.summary.average_latency_ms),
        );
        context.insert(
            "min_latency",
            &format!("{:.2}", report.summary.min_latency_ms),
        );
        context.insert(
            "max_latency",
            &format!("{:.2}", report.summary.max_latency_ms),
        );
        context.insert(
            "p95_latency",
            &format!("{:.2}", report.summary.p95_latency_ms),
        );
        context.insert(
            "rps",
            &format!("{:.2}", report.summary.requests_per_second),
        );
        let status_rows: Vec<serde_json::Value> = report
            .status_codes
            .iter()
            .map(|(code, count)| serde_json::json!({ "code": code, "count": count }))
            .collect();
        context.insert("status_rows", &status_rows);

        let html = tera.render("report.html", &context)?;
        fs::write(&path, html)?;

        Ok(path)
    }

    fn generate_csv_timeline(
        snapshot: &RunSnapshot,
        report: &RunReport,
        output_dir: &Path,
    ) -> Result<PathBuf> {
        let path = output_dir.join(Self::file_name(report, "timeline", "csv"));

        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        writer.write_record(["index", "timestamp", "latency_ms"])?;

        let stats = &snapshot.stats;
        for (index, (timestamp, latency)) in stats
            .timestamps
            .iter()
            .zip(stats.response_times.iter())
            .enumerate()
        {
            writer.write_record([
                index.to_string(),
                timestamp.to_rfc3339(),
                format!("{:.3}", latency),
            ])?;
        }
        writer.flush()?;

        Ok(path)
    }
}
