use anyhow::{anyhow, Result};
use std::time::Duration;

/// Parse a human duration such as `500ms`, `30s`, `2m` or a bare number of seconds.
pub fn parse_duration(duration_str: &str) -> Result<Duration> {
    let trimmed = duration_str.trim();
    if let Some(millis) = trimmed.strip_suffix("ms") {
        let millis: u64 = millis
            .trim()
            .parse()
            .map_err(|_| anyhow!("Invalid duration: {}", duration_str))?;
        Ok(Duration::from_millis(millis))
    } else if let Some(seconds) = trimmed.strip_suffix('s') {
        let seconds: u64 = seconds
            .trim()
            .parse()
            .map_err(|_| anyhow!("Invalid duration: {}", duration_str))?;
        Ok(Duration::from_secs(seconds))
    } else if let Some(minutes) = trimmed.strip_suffix('m') {
        let minutes: u64 = minutes
            .trim()
            .parse()
            .map_err(|_| anyhow!("Invalid duration: {}", duration_str))?;
        Ok(Duration::from_secs(minutes * 60))
    } else {
        let seconds: u64 = trimmed
            .parse()
            .map_err(|_| anyhow!("Invalid duration: {}", duration_str))?;
        Ok(Duration::from_secs(seconds))
    }
}

/// Cut `text` down to at most `max_chars` characters, respecting char boundaries.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Serialize `Duration` values as whole milliseconds.
pub mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
