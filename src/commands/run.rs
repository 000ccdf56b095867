use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::{EngineSettings, RunConfig, UserConfig};
use crate::engine::{Cadence, RunController, RunState};
use crate::report::ReportGenerator;
use crate::ui::monitor::print_final_summary;
use crate::ui::LiveMonitor;
use crate::utils::parse_duration;

pub struct RunOptions {
    pub url: Option<String>,
    pub plan: Option<PathBuf>,
    pub users: Option<u32>,
    pub duration: Option<u64>,
    pub ramp_up: Option<u64>,
    pub cadence: Option<String>,
    pub rps: Option<u32>,
    pub timeout: Option<String>,
    pub max_connections: Option<usize>,
    pub report: Option<String>,
    pub out: Option<PathBuf>,
    pub report_interval: String,
    pub min_success_rate: Option<f64>,
    pub ci: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlCommand {
    TogglePause,
    Stop,
}

fn parse_control(line: &str) -> Option<ControlCommand> {
    match line.trim().to_lowercase().as_str() {
        "p" | "pause" | "resume" => Some(ControlCommand::TogglePause),
        "s" | "q" | "stop" | "quit" => Some(ControlCommand::Stop),
        _ => None,
    }
}

fn build_run_config(options: &RunOptions) -> Result<RunConfig> {
    let mut config = match &options.plan {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::new("", 10, 30, 5),
    };

    if let Some(url) = &options.url {
        config.url = url.clone();
    }
    if let Some(users) = options.users {
        config.users = users;
    }
    if let Some(duration) = options.duration {
        config.duration_secs = duration;
    }
    if let Some(ramp_up) = options.ramp_up {
        config.ramp_up_secs = ramp_up;
    }

    if config.url.trim().is_empty() {
        anyhow::bail!("No target URL given. Pass a URL or a --plan file");
    }

    Ok(config)
}

fn parse_report_interval(value: &str) -> Result<Duration> {
    let interval = parse_duration(value)?;
    if interval.is_zero() {
        anyhow::bail!("--report-interval must be greater than zero");
    }
    Ok(interval)
}

fn apply_overrides(settings: &mut EngineSettings, options: &RunOptions) -> Result<()> {
    if let Some(cadence) = &options.cadence {
        settings.cadence = parse_duration(cadence)?;
    }
    if let Some(timeout) = &options.timeout {
        settings.request_timeout = parse_duration(timeout)?;
    }
    if options.rps.is_some() {
        settings.target_rps = options.rps;
    }
    if let Some(max_connections) = options.max_connections {
        settings.max_connections = max_connections;
    }
    Ok(())
}

/// Forward stdin lines from a plain thread so a pending read never holds up exit.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if tx.send(line.clone()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}

async fn next_line(commands: &mut Option<mpsc::UnboundedReceiver<String>>) -> Option<String> {
    match commands {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn apply_control(controller: &RunController, command: ControlCommand) {
    match command {
        ControlCommand::TogglePause => match controller.toggle_pause().await {
            Ok(RunState::Paused) => println!("{} Paused, type p to resume", "⏸".yellow()),
            Ok(_) => println!("{} Resumed", "▶".green()),
            Err(e) => warn!(error = %e, "ignoring pause command"),
        },
        ControlCommand::Stop => match controller.stop().await {
            Ok(()) => println!("{} Stopping, waiting for in-flight requests", "■".red()),
            Err(e) => warn!(error = %e, "ignoring stop command"),
        },
    }
}

pub async fn handle_run(options: RunOptions) -> Result<()> {
    let user_config = UserConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "using default settings");
        UserConfig::default()
    });

    let mut settings = user_config.engine.clone();
    apply_overrides(&mut settings, &options)?;
    let config = build_run_config(&options)?;
    let report_interval = parse_report_interval(&options.report_interval)?;

    println!("{} Starting load test", "→".cyan());
    println!("Target: {}", config.url.bright_white());
    println!("Users: {}", config.users.to_string().bright_white());
    println!(
        "Duration: {}s, ramp-up {}s",
        config.duration_secs.to_string().bright_white(),
        config.ramp_up_secs
    );
    println!(
        "Cadence: {}",
        Cadence::from_settings(&settings, config.users)
            .describe()
            .bright_white()
    );

    let controller = Arc::new(RunController::new(settings)?);
    controller
        .start(config)
        .await
        .context("Failed to start load test")?;

    let interactive = !options.ci && atty::is(atty::Stream::Stdin);
    let mut commands = interactive.then(spawn_stdin_reader);
    if interactive {
        println!(
            "{}",
            "Type p + Enter to pause/resume, s + Enter to stop".dimmed()
        );
    }

    let monitor = {
        let controller = Arc::clone(&controller);
        let monitor = LiveMonitor::new(report_interval, options.ci);
        tokio::spawn(async move { monitor.watch(&controller).await })
    };

    loop {
        let mut stdin_closed = false;
        tokio::select! {
            _ = controller.wait() => break,
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "failed to listen for ctrl-c");
                }
                apply_control(&controller, ControlCommand::Stop).await;
            }
            line = next_line(&mut commands) => match line {
                Some(line) => {
                    if let Some(command) = parse_control(&line) {
                        apply_control(&controller, command).await;
                    }
                }
                None => stdin_closed = true,
            }
        }
        if stdin_closed {
            commands = None;
        }
    }

    if let Err(e) = monitor.await {
        warn!(error = %e, "live monitor failed");
    }

    let snapshot = controller.snapshot().await;
    println!();
    println!("{} Load test finished", "✔".green().bold());
    print_final_summary(&snapshot);

    let formats = options
        .report
        .clone()
        .unwrap_or_else(|| user_config.reports.default_formats.join(","));
    let output_dir = options
        .out
        .clone()
        .unwrap_or_else(|| user_config.reports.output_dir.clone());

    let generated = ReportGenerator::generate_reports(&snapshot, &formats, &output_dir)?;
    for path in &generated {
        println!(
            "{} Report saved: {}",
            "📄".bright_white(),
            path.display().to_string().bright_white()
        );
    }

    if let Some(min_rate) = options.min_success_rate {
        let success_rate = snapshot.summary().success_rate;
        if success_rate < min_rate {
            anyhow::bail!(
                "Success rate {:.2}% is below the required {:.2}%",
                success_rate,
                min_rate
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options() -> RunOptions {
        RunOptions {
            url: None,
            plan: None,
            users: None,
            duration: None,
            ramp_up: None,
            cadence: None,
            rps: None,
            timeout: None,
            max_connections: None,
            report: None,
            out: None,
            report_interval: "5s".to_string(),
            min_success_rate: None,
            ci: true,
        }
    }

    #[test]
    fn test_parse_control() {
        assert_eq!(parse_control("p\n"), Some(ControlCommand::TogglePause));
        assert_eq!(parse_control(" P "), Some(ControlCommand::TogglePause));
        assert_eq!(parse_control("s"), Some(ControlCommand::Stop));
        assert_eq!(parse_control("q\n"), Some(ControlCommand::Stop));
        assert_eq!(parse_control(""), None);
        assert_eq!(parse_control("x"), None);
    }

    #[test]
    fn test_flags_fill_in_defaults() {
        let mut opts = options();
        opts.url = Some("http://localhost:8080".to_string());
        opts.users = Some(3);

        let config = build_run_config(&opts).unwrap();
        assert_eq!(config.url, "http://localhost:8080");
        assert_eq!(config.users, 3);
        assert_eq!(config.duration_secs, 30);
        assert_eq!(config.ramp_up_secs, 5);
    }

    #[test]
    fn test_flags_override_plan() -> Result<()> {
        let dir = TempDir::new()?;
        let plan = dir.path().join("plan.yaml");
        std::fs::write(
            &plan,
            "url: http://plan.example.com\nusers: 20\nduration_secs: 60\n",
        )?;

        let mut opts = options();
        opts.plan = Some(plan);
        opts.duration = Some(10);

        let config = build_run_config(&opts)?;
        assert_eq!(config.url, "http://plan.example.com");
        assert_eq!(config.users, 20);
        assert_eq!(config.duration_secs, 10);
        Ok(())
    }

    #[test]
    fn test_missing_url_is_rejected() {
        assert!(build_run_config(&options()).is_err());
    }

    #[test]
    fn test_report_interval_must_be_positive() {
        assert_eq!(
            parse_report_interval("2s").unwrap(),
            Duration::from_secs(2)
        );
        assert!(parse_report_interval("0").is_err());
        assert!(parse_report_interval("0s").is_err());
        assert!(parse_report_interval("0ms").is_err());
    }

    #[test]
    fn test_engine_overrides() {
        let mut opts = options();
        opts.cadence = Some("250ms".to_string());
        opts.timeout = Some("2s".to_string());
        opts.rps = Some(40);

        let mut settings = EngineSettings::default();
        apply_overrides(&mut settings, &opts).unwrap();
        assert_eq!(settings.cadence, Duration::from_millis(250));
        assert_eq!(settings.request_timeout, Duration::from_secs(2));
        assert_eq!(settings.target_rps, Some(40));
        assert_eq!(settings.max_connections, 256);
    }
}
