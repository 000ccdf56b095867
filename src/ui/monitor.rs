use crate::engine::{RunController, RunSnapshot, RunState, StatsSummary};
use crate::ui::progress::create_run_progress_bar;
use owo_colors::OwoColorize;
use std::time::Duration;

const BAR_REFRESH: Duration = Duration::from_millis(250);
const MIN_REPORT_INTERVAL: Duration = Duration::from_millis(100);

/// Polls a controller's snapshot while a run is in flight and renders progress.
pub struct LiveMonitor {
    report_interval: Duration,
    ci: bool,
}

impl LiveMonitor {
    pub fn new(report_interval: Duration, ci: bool) -> Self {
        Self {
            report_interval: report_interval.max(MIN_REPORT_INTERVAL),
            ci,
        }
    }

    /// Render until every virtual user of the current run has exited.
    pub async fn watch(&self, controller: &RunController) {
        let first = controller.snapshot().await;
        let planned_secs = first
            .config
            .as_ref()
            .map(|c| c.duration_secs + c.ramp_up_secs)
            .unwrap_or(0);

        let bar = (!self.ci).then(|| create_run_progress_bar(planned_secs));
        let tick = if self.ci {
            self.report_interval
        } else {
            BAR_REFRESH
        };

        let mut interval = tokio::time::interval(tick);
        interval.tick().await; // Skip the first tick which fires immediately

        let done = controller.wait();
        tokio::pin!(done);

        loop {
            tokio::select! {
                _ = &mut done => break,
                _ = interval.tick() => {
                    let snapshot = controller.snapshot().await;
                    match &bar {
                        Some(bar) => {
                            bar.set_position(snapshot.elapsed.as_secs().min(planned_secs));
                            bar.set_message(progress_message(&snapshot));
                        }
                        None => print_progress_report(&snapshot, planned_secs),
                    }
                }
            }
        }

        if let Some(bar) = bar {
            bar.finish_and_clear();
        }
    }
}

fn state_label(state: RunState) -> String {
    match state {
        RunState::Running => "running".green().to_string(),
        RunState::Paused => "paused".yellow().to_string(),
        RunState::Stopped => "stopping".red().to_string(),
        RunState::Idle => "idle".dimmed().to_string(),
    }
}

fn progress_message(snapshot: &RunSnapshot) -> String {
    let summary = snapshot.summary();
    format!(
        "{} • {} users • {} req • {:.1}% ok • avg {:.0}ms",
        state_label(snapshot.state),
        snapshot.active_users,
        summary.total_requests,
        summary.success_rate,
        summary.average_latency_ms
    )
}

pub fn print_progress_report(snapshot: &RunSnapshot, planned_secs: u64) {
    let summary = snapshot.summary();
    let elapsed = snapshot.elapsed.as_secs_f64();
    let progress_percent = if planned_secs > 0 {
        (elapsed / planned_secs as f64 * 100.0).min(100.0)
    } else {
        0.0
    };

    println!();
    println!(
        "{} Load test progress ({})",
        "📊".bright_white(),
        state_label(snapshot.state)
    );
    println!(
        "  {:.1}% ({:.1}s / {}s)",
        progress_percent, elapsed, planned_secs
    );
    println!(
        "  Active users: {}",
        snapshot.active_users.to_string().bright_white()
    );

    if summary.total_requests > 0 {
        println!(
            "  Current RPS: {}",
            format!("{:.1}", summary.requests_per_second).bright_white()
        );
        println!(
            "  Total Requests: {}",
            summary.total_requests.to_string().bright_white()
        );
        println!(
            "  Success Rate: {}",
            format!("{:.1}%", summary.success_rate).bright_white()
        );
        println!(
            "  Avg Response Time: {}",
            format!("{:.2}ms", summary.average_latency_ms).bright_white()
        );
        if summary.failed_requests > 0 {
            println!(
                "  {} Errors: {}",
                "⚠".yellow(),
                summary.failed_requests.to_string().bright_white()
            );
            if let Some(last) = snapshot.stats.errors.back() {
                println!("  Last error: {}", last.dimmed());
            }
        }
    }
}

/// Print the final summary once the run has wound down.
pub fn print_final_summary(snapshot: &RunSnapshot) {
    let summary = snapshot.summary();
    let failures = &snapshot.stats.failures;

    println!();
    println!("{}", "=".repeat(60).dimmed());
    println!("{} Final Load Test Results", "🎯".bright_white());
    println!("{}", "=".repeat(60).dimmed());

    if let Some(config) = &snapshot.config {
        println!();
        println!("{} Configuration:", "📋".bright_white());
        println!("  Target URL: {}", config.url.bright_white());
        println!("  Users: {}", config.users.to_string().bright_white());
        println!(
            "  Duration: {}s (ramp-up {}s)",
            config.duration_secs.to_string().bright_white(),
            config.ramp_up_secs
        );
    }

    println!();
    println!("{} Test Summary:", "📋".bright_white());
    println!(
        "  Total Duration: {}",
        format!("{:.2}s", snapshot.elapsed.as_secs_f64()).bright_white()
    );
    println!(
        "  Total Requests: {}",
        summary.total_requests.to_string().bright_white()
    );
    println!(
        "  Successful: {}",
        summary.successful_requests.to_string().green()
    );
    println!("  Failed: {}", summary.failed_requests.to_string().red());
    println!(
        "  Success Rate: {}",
        format!("{:.2}%", summary.success_rate).bright_white()
    );

    println!();
    println!("{} Performance Metrics:", "⚡".bright_white());
    println!(
        "  Requests/sec: {}",
        format!("{:.1}", summary.requests_per_second).bright_white()
    );
    println!(
        "  Avg Response: {}",
        format!("{:.2}ms", summary.average_latency_ms).bright_white()
    );
    println!(
        "  Min Response: {}",
        format!("{:.2}ms", summary.min_latency_ms).bright_white()
    );
    println!(
        "  Max Response: {}",
        format!("{:.2}ms", summary.max_latency_ms).bright_white()
    );
    println!(
        "  P50 / P95 / P99: {:.2}ms / {:.2}ms / {:.2}ms",
        summary.p50_latency_ms, summary.p95_latency_ms, summary.p99_latency_ms
    );

    if summary.failed_requests > 0 {
        println!();
        println!("{} Failure Breakdown:", "🔍".bright_white());
        println!("  Timeouts: {}", failures.timeout.to_string().red());
        println!("  HTTP status: {}", failures.http_status.to_string().red());
        println!("  Connection: {}", failures.connection.to_string().red());
        println!("  Other: {}", failures.other.to_string().red());
    }

    if !snapshot.stats.status_codes.is_empty() {
        println!();
        println!("{} Status Code Distribution:", "🔍".bright_white());
        for (code, count) in &snapshot.stats.status_codes {
            let count_str = count.to_string();
            if (200..300).contains(code) {
                println!("  {}: {}", code, count_str.green());
            } else if *code >= 400 {
                println!("  {}: {}", code, count_str.red());
            } else {
                println!("  {}: {}", code, count_str.yellow());
            }
        }
    }

    println!();
    print_performance_assessment(&summary);

    println!("{}", "=".repeat(60).dimmed());
}

fn print_performance_assessment(summary: &StatsSummary) {
    println!("{} Performance Assessment:", "🔍".bright_white());

    if summary.total_requests == 0 {
        println!("  {} No requests completed", "❌".red());
        return;
    }

    let success_rate = summary.success_rate;
    if success_rate >= 99.0 {
        println!("  Success Rate: {} Excellent (≥99%)", "✅".green());
    } else if success_rate >= 95.0 {
        println!("  Success Rate: {} Good (≥95%)", "✅".green());
    } else if success_rate >= 90.0 {
        println!("  Success Rate: {} Fair (≥90%)", "⚠".yellow());
    } else {
        println!("  Success Rate: {} Poor (<90%)", "❌".red());
    }

    let avg = summary.average_latency_ms;
    if avg <= 100.0 {
        println!("  Avg Response: {} Excellent (≤100ms)", "✅".green());
    } else if avg <= 500.0 {
        println!("  Avg Response: {} Good (≤500ms)", "✅".green());
    } else if avg <= 1000.0 {
        println!("  Avg Response: {} Fair (≤1s)", "⚠".yellow());
    } else {
        println!("  Avg Response: {} Poor (>1s)", "❌".red());
    }

    let p95 = summary.p95_latency_ms;
    if p95 <= 200.0 {
        println!("  P95 Response: {} Excellent (≤200ms)", "✅".green());
    } else if p95 <= 1000.0 {
        println!("  P95 Response: {} Good (≤1s)", "✅".green());
    } else if p95 <= 2000.0 {
        println!("  P95 Response: {} Fair (≤2s)", "⚠".yellow());
    } else {
        println!("  P95 Response: {} Poor (>2s)", "❌".red());
    }
}
