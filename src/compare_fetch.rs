use anyhow::Context;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::error::ComparisonError;
use crate::http_client::{http_client, post_json, service_error_message};
use crate::positions::Position;
use crate::state::{ComparisonEntry, ComparisonTable};

const COMPARE_PATH: &str = "/api/compare";
/// Sent in place of an empty candidate list; the service rejects an empty `others`.
pub const EMPTY_OTHERS_SENTINEL: &str = "empty";

pub trait ComparisonSource: Send + Sync {
    fn fetch_comparison(
        &self,
        position: &str,
        target: &str,
        candidates: &[String],
    ) -> Result<ComparisonTable, ComparisonError>;
}

pub struct ComparisonClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct CompareRequest<'a> {
    pub position: &'a str,
    pub target: &'a str,
    pub others: Vec<&'a str>,
}

impl<'a> CompareRequest<'a> {
    pub fn new(position: &'a str, target: &'a str, candidates: &'a [String]) -> Self {
        let others = if candidates.is_empty() {
            vec![EMPTY_OTHERS_SENTINEL]
        } else {
            candidates.iter().map(String::as_str).collect()
        };
        Self {
            position,
            target,
            others,
        }
    }
}

impl ComparisonClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let client = http_client(settings.request_timeout)?;
        Ok(Self::new(client.clone(), settings.api_url.clone()))
    }
}

impl ComparisonSource for ComparisonClient {
    fn fetch_comparison(
        &self,
        position: &str,
        target: &str,
        candidates: &[String],
    ) -> Result<ComparisonTable, ComparisonError> {
        let position = Position::from_code(position)
            .ok_or_else(|| ComparisonError::UnknownPosition(position.trim().to_string()))?;
        let target = target.trim();
        if target.is_empty() {
            return Err(ComparisonError::EmptyTarget);
        }

        let url = format!("{}{COMPARE_PATH}", self.base_url);
        let request = CompareRequest::new(position.code(), target, candidates);
        let (status, text) = post_json(&self.client, &url, &request)
            .context("POST /api/compare")
            .map_err(ComparisonError::Transport)?;
        if !status.is_success() {
            return Err(ComparisonError::Service {
                status: status.as_u16(),
                message: service_error_message(&text),
            });
        }
        parse_comparison_json(&text)
    }
}

#[derive(Debug, Deserialize)]
struct CompareResponse {
    #[serde(default)]
    comparisons: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StatScores {
    target_score: f64,
    similar_score: f64,
}

/// Parses `{comparisons: {candidate: {stat: scores}}}`. Stats stay in response order.
pub fn parse_comparison_json(raw: &str) -> Result<ComparisonTable, ComparisonError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Err(ComparisonError::EmptyResponse);
    }
    let parsed: CompareResponse = serde_json::from_str(trimmed)?;

    let mut table = ComparisonTable::with_capacity(parsed.comparisons.len());
    for (candidate, stats) in parsed.comparisons {
        let stats: serde_json::Map<String, serde_json::Value> = serde_json::from_value(stats)?;
        let mut entries = Vec::with_capacity(stats.len());
        for (stat, scores) in stats {
            let scores: StatScores = serde_json::from_value(scores)?;
            entries.push(ComparisonEntry::new(
                stat,
                scores.target_score,
                scores.similar_score,
            ));
        }
        table.insert(candidate, entries);
    }
    Ok(table)
}
