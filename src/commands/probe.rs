use anyhow::{Context, Result};
use owo_colors::OwoColorize;

use crate::config::{RunConfig, UserConfig};
use crate::engine::{Outcome, RequestExecutor};
use crate::utils::parse_duration;

/// Send one request through the load executor and show how it was classified.
pub async fn handle_probe(url: String, timeout: Option<String>) -> Result<()> {
    RunConfig::new(url.clone(), 1, 1, 0).validate()?;

    let mut settings = UserConfig::load()
        .map(|config| config.engine)
        .unwrap_or_default();
    if let Some(timeout) = timeout {
        settings.request_timeout = parse_duration(&timeout)?;
    }

    let executor = RequestExecutor::new(&settings).context("Failed to build HTTP client")?;
    let measurement = executor.execute(0, &url).await;

    println!("{} {}", "GET".bright_green(), url);
    match measurement.outcome {
        Outcome::Success => {
            let status = measurement
                .status
                .map(|s| s.to_string())
                .unwrap_or_default();
            println!(
                "{} {} in {}",
                "✔".green().bold(),
                status.bright_white(),
                format!("{:.2}ms", measurement.latency_ms).bright_white()
            );
        }
        Outcome::Failure(kind) => {
            println!(
                "{} {:?} after {}",
                "✖".red().bold(),
                kind,
                format!("{:.2}ms", measurement.latency_ms).bright_white()
            );
            if let Some(error) = &measurement.error {
                println!("  {}", error.red());
            }
            anyhow::bail!("Probe of {} failed", url);
        }
    }

    Ok(())
}
