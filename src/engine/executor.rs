use crate::config::EngineSettings;
use crate::engine::stats::{FailureKind, Measurement, Outcome, StatsAggregator};
use crate::engine::EngineError;
use crate::http::build_load_client;
use crate::utils::truncate_chars;
use chrono::Utc;
use reqwest::Client;
use std::error::Error as StdError;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

const CONNECTION_DETAIL_MAX: usize = 50;
const OTHER_DETAIL_MAX: usize = 100;

/// Issues single GET requests and classifies them into measurements.
///
/// Cheap to clone: the client pool and the connection permits are shared.
#[derive(Clone)]
pub struct RequestExecutor {
    client: Client,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl RequestExecutor {
    pub fn new(settings: &EngineSettings) -> Result<Self, EngineError> {
        let client = build_load_client(settings)?;

        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(settings.max_connections.max(1))),
            timeout: settings.request_timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send one request and report the measurement, whatever its outcome.
    pub async fn dispatch(&self, user_id: u32, url: &str, stats: &StatsAggregator) -> Outcome {
        let measurement = self.execute(user_id, url).await;
        let outcome = measurement.outcome;
        stats.record(measurement).await;
        outcome
    }

    pub async fn execute(&self, user_id: u32, url: &str) -> Measurement {
        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                return Measurement {
                    user_id,
                    outcome: Outcome::Failure(FailureKind::Other),
                    latency_ms: 0.0,
                    status: None,
                    error: Some(truncate_chars(&e.to_string(), OTHER_DETAIL_MAX)),
                    timestamp: Utc::now(),
                }
            }
        };

        let start_time = Instant::now();
        let result = self.client.get(url).send().await;
        let latency = start_time.elapsed();
        let latency_ms = latency.as_secs_f64() * 1000.0;

        match result {
            Ok(mut response) => {
                let status = response.status().as_u16();
                // drain so the connection goes back to the pool
                while let Ok(Some(_)) = response.chunk().await {}

                let (outcome, error) = classify_status(status);
                Measurement {
                    user_id,
                    outcome,
                    latency_ms,
                    status: Some(status),
                    error,
                    timestamp: Utc::now(),
                }
            }
            Err(e) => {
                let (kind, message) = classify_error(&e, latency);
                Measurement {
                    user_id,
                    outcome: Outcome::Failure(kind),
                    latency_ms,
                    status: e.status().map(|s| s.as_u16()),
                    error: Some(message),
                    timestamp: Utc::now(),
                }
            }
        }
    }
}

fn classify_status(status: u16) -> (Outcome, Option<String>) {
    if (200..400).contains(&status) {
        (Outcome::Success, None)
    } else {
        (
            Outcome::Failure(FailureKind::HttpStatus),
            Some(format!("HTTP {}", status)),
        )
    }
}

fn classify_error(error: &reqwest::Error, elapsed: Duration) -> (FailureKind, String) {
    if error.is_timeout() {
        (
            FailureKind::Timeout,
            format!("Timeout after {}ms", elapsed.as_millis()),
        )
    } else if error.is_connect() || is_connection_drop(error) {
        let detail = truncate_chars(&root_cause(error), CONNECTION_DETAIL_MAX);
        (
            FailureKind::Connection,
            format!("Connection Error - {}", detail),
        )
    } else {
        (
            FailureKind::Other,
            truncate_chars(&error.to_string(), OTHER_DETAIL_MAX),
        )
    }
}

/// Reset, aborted or closed by the peer after the connect itself went through.
fn is_connection_drop(error: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(io) = err.downcast_ref::<io::Error>() {
            if matches!(
                io.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        if let Some(hyper_error) = err.downcast_ref::<hyper::Error>() {
            if hyper_error.is_closed()
                || hyper_error.is_incomplete_message()
                || hyper_error.is_canceled()
            {
                return true;
            }
        }
        current = err.source();
    }
    false
}

fn root_cause(error: &(dyn StdError + 'static)) -> String {
    let mut current = error;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status_boundaries() {
        assert_eq!(classify_status(200).0, Outcome::Success);
        assert_eq!(classify_status(204).0, Outcome::Success);
        assert_eq!(classify_status(301).0, Outcome::Success);
        assert_eq!(classify_status(399).0, Outcome::Success);

        let (outcome, error) = classify_status(400);
        assert_eq!(outcome, Outcome::Failure(FailureKind::HttpStatus));
        assert_eq!(error.as_deref(), Some("HTTP 400"));

        let (outcome, error) = classify_status(503);
        assert_eq!(outcome, Outcome::Failure(FailureKind::HttpStatus));
        assert_eq!(error.as_deref(), Some("HTTP 503"));

        let (outcome, error) = classify_status(101);
        assert_eq!(outcome, Outcome::Failure(FailureKind::HttpStatus));
        assert_eq!(error.as_deref(), Some("HTTP 101"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_classified() {
        // bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let executor = RequestExecutor::new(&EngineSettings {
            request_timeout: Duration::from_secs(5),
            ..EngineSettings::default()
        })
        .unwrap();

        let measurement = executor
            .execute(3, &format!("http://127.0.0.1:{}/", port))
            .await;

        assert_eq!(
            measurement.outcome,
            Outcome::Failure(FailureKind::Connection)
        );
        let error = measurement.error.unwrap();
        assert!(error.starts_with("Connection Error - "), "got {}", error);
        assert!(error.chars().count() <= "Connection Error - ".len() + CONNECTION_DETAIL_MAX);
        assert!(measurement.status.is_none());
        assert!(measurement.latency_ms >= 0.0);
    }

    #[tokio::test]
    async fn test_connection_reset_is_classified() {
        use tokio::io::AsyncReadExt;

        // accept, read the request, then reset instead of answering
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let _ = stream.set_linger(Some(Duration::ZERO));
                drop(stream);
            }
        });

        let executor = RequestExecutor::new(&EngineSettings {
            request_timeout: Duration::from_secs(5),
            ..EngineSettings::default()
        })
        .unwrap();

        let measurement = executor
            .execute(2, &format!("http://127.0.0.1:{}/", port))
            .await;

        assert_eq!(
            measurement.outcome,
            Outcome::Failure(FailureKind::Connection)
        );
        let error = measurement.error.unwrap();
        assert!(error.starts_with("Connection Error - "), "got {}", error);
        assert!(error.chars().count() <= "Connection Error - ".len() + CONNECTION_DETAIL_MAX);
        assert!(measurement.status.is_none());
    }

    #[tokio::test]
    async fn test_dispatch_always_records() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let executor = RequestExecutor::new(&EngineSettings::default()).unwrap();
        let stats = StatsAggregator::new(10);

        let outcome = executor
            .dispatch(0, &format!("http://127.0.0.1:{}/", port), &stats)
            .await;

        assert!(!outcome.is_success());
        let snapshot = stats.snapshot().await;
        assert_eq!(snapshot.total_requests, 1);
        assert_eq!(snapshot.failed_requests, 1);
        assert_eq!(snapshot.response_times.len(), 1);
    }
}
