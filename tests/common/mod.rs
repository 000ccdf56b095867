#![allow(dead_code)]

use axum::{
    extract::Path,
    http::StatusCode,
    response::Redirect,
    routing::get,
    Router,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use surge::config::EngineSettings;

/// Address of a running mock target plus request counters.
pub struct MockTarget {
    pub base: String,
    pub hits: Arc<AtomicU64>,
    pub in_flight: Arc<AtomicU64>,
    pub peak_in_flight: Arc<AtomicU64>,
}

impl MockTarget {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::SeqCst)
    }

    /// Highest number of requests the target was serving at once.
    pub fn peak_in_flight(&self) -> u64 {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

pub async fn spawn_mock_target() -> MockTarget {
    let hits = Arc::new(AtomicU64::new(0));
    let in_flight = Arc::new(AtomicU64::new(0));
    let peak_in_flight = Arc::new(AtomicU64::new(0));
    let counters = (
        Arc::clone(&hits),
        Arc::clone(&in_flight),
        Arc::clone(&peak_in_flight),
    );

    let app = Router::new()
        .route("/ok", get(get_ok))
        .route("/status/:code", get(get_status))
        .route("/delay/:ms", get(get_delay))
        .route("/redirect", get(get_redirect))
        .layer(axum::middleware::from_fn(
            move |req: axum::extract::Request, next: axum::middleware::Next| {
                let (hits, in_flight, peak) = counters.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    let response = next.run(req).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    response
                }
            },
        ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockTarget {
        base: format!("http://{}", addr),
        hits,
        in_flight,
        peak_in_flight,
    }
}

async fn get_ok() -> &'static str {
    "ok"
}

async fn get_status(Path(code): Path<u16>) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

async fn get_delay(Path(ms): Path<u64>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    "late"
}

async fn get_redirect() -> Redirect {
    Redirect::temporary("/ok")
}

/// Fast settings so tests finish in a couple of seconds.
pub fn fast_settings() -> EngineSettings {
    EngineSettings {
        request_timeout: Duration::from_secs(5),
        cadence: Duration::from_millis(100),
        stagger_buckets: 0,
        pause_poll: Duration::from_millis(20),
        ..EngineSettings::default()
    }
}
