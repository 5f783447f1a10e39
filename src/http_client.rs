use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::{Deserialize, Serialize};

const AGENT: &str = concat!("player_similarity/", env!("CARGO_PKG_VERSION"));

static CLIENT: OnceCell<Client> = OnceCell::new();

/// Process-wide client. The timeout of the first caller wins.
pub fn http_client(timeout: Duration) -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| build_client(timeout))
}

pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("failed to build http client")
}

pub fn user_agent() -> &'static str {
    AGENT
}

/// POSTs `body` as JSON and returns the status with the raw response text.
pub fn post_json<B: Serialize + ?Sized>(
    client: &Client,
    url: &str,
    body: &B,
) -> Result<(StatusCode, String)> {
    let resp = client
        .post(url)
        .header(USER_AGENT, AGENT)
        .header(ACCEPT, "application/json")
        .json(body)
        .send()
        .context("request failed")?;
    let status = resp.status();
    let text = resp.text().context("failed reading body")?;
    Ok((status, text))
}

#[derive(Debug, Deserialize)]
struct ServiceErrorBody {
    error: String,
}

/// Pulls the `{"error": ...}` message out of a failed service response, falling back to the
/// raw body.
pub fn service_error_message(body: &str) -> String {
    let trimmed = body.trim();
    if let Ok(parsed) = serde_json::from_str::<ServiceErrorBody>(trimmed) {
        return parsed.error;
    }
    if trimmed.is_empty() {
        return "no response body".to_string();
    }
    trimmed.chars().take(200).collect()
}
