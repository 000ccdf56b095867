use crate::config::EngineSettings;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{redirect, Client};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

const MAX_REDIRECTS: usize = 10;

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        ),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers
}

/// Build the client shared by every virtual user of a controller.
///
/// Certificate verification is switched off: this tool points load at
/// staging and self-signed hosts, and is not a security boundary. Do not
/// reuse this client for anything that needs a trusted TLS connection.
pub fn build_load_client(settings: &EngineSettings) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(settings.request_timeout)
        .redirect(redirect::Policy::limited(MAX_REDIRECTS))
        .danger_accept_invalid_certs(true)
        .default_headers(browser_headers())
        .pool_max_idle_per_host(settings.max_connections)
        .build()
}
