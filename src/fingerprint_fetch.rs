use anyhow::Context;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::error::AnalysisError;
use crate::http_client::{http_client, post_json, service_error_message};
use crate::positions::Position;
use crate::state::{CandidateSeed, Fingerprint};

const ANALYZE_PATH: &str = "/api/analyze";
const POSITIONS_PATH: &str = "/api/positions";

/// Result of one `/api/analyze` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub fingerprint: Fingerprint,
    pub similar: Vec<CandidateSeed>,
}

pub trait AnalysisSource: Send + Sync {
    fn fetch_analysis(&self, position: &str, player_name: &str) -> Result<Analysis, AnalysisError>;

    fn fetch_players(&self, position: &str) -> Result<Vec<String>, AnalysisError>;
}

pub struct FingerprintClient {
    client: Client,
    base_url: String,
}

impl FingerprintClient {
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

    fn post(&self, path: &str, body: &impl Serialize) -> Result<String, AnalysisError> {
        let url = format!("{}{path}", self.base_url);
        let (status, text) = post_json(&self.client, &url, body)
            .with_context(|| format!("POST {path}"))
            .map_err(AnalysisError::Transport)?;
        if !status.is_success() {
            return Err(AnalysisError::Service {
                status: status.as_u16(),
                message: service_error_message(&text),
            });
        }
        Ok(text)
    }
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    position: &'a str,
    player_name: &'a str,
}

#[derive(Debug, Serialize)]
struct PositionRequest<'a> {
    position: &'a str,
}

impl AnalysisSource for FingerprintClient {
    fn fetch_analysis(&self, position: &str, player_name: &str) -> Result<Analysis, AnalysisError> {
        let position: Position = position.parse()?;
        let player_name = player_name.trim();
        if player_name.is_empty() {
            return Err(AnalysisError::EmptyPlayerName);
        }

        let body = self.post(
            ANALYZE_PATH,
            &AnalyzeRequest {
                position: position.code(),
                player_name,
            },
        )?;
        let analysis = parse_analysis_json(&body)?;
        if analysis.fingerprint.is_empty() && analysis.similar.is_empty() {
            return Err(AnalysisError::UnknownPlayer {
                position: position.code().to_string(),
                player: player_name.to_string(),
            });
        }
        Ok(analysis)
    }

    fn fetch_players(&self, position: &str) -> Result<Vec<String>, AnalysisError> {
        let position: Position = position.parse()?;
        let body = self.post(
            POSITIONS_PATH,
            &PositionRequest {
                position: position.code(),
            },
        )?;
        parse_players_json(&body)
    }
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    #[serde(default)]
    fingerprint: Vec<FingerprintRow>,
    #[serde(default)]
    similar_players: Vec<SimilarRow>,
}

#[derive(Debug, Deserialize)]
struct FingerprintRow {
    #[serde(rename = "Attribute")]
    attribute: String,
    #[serde(rename = "Weighted Z-Score")]
    weighted_z_score: f64,
}

#[derive(Debug, Deserialize)]
struct SimilarRow {
    #[serde(rename = "Player")]
    player: String,
    #[serde(rename = "Similarity")]
    similarity: f64,
}

#[derive(Debug, Deserialize)]
struct PlayersResponse {
    #[serde(default)]
    players: Vec<Option<String>>,
}

pub fn parse_analysis_json(raw: &str) -> Result<Analysis, AnalysisError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Err(AnalysisError::EmptyResponse);
    }
    let parsed: AnalyzeResponse = serde_json::from_str(trimmed)?;

    let fingerprint = Fingerprint::from_pairs(
        parsed
            .fingerprint
            .into_iter()
            .map(|row| (row.attribute, row.weighted_z_score)),
    );
    // Cosine similarity can drift a hair outside [0, 1].
    let similar = parsed
        .similar_players
        .into_iter()
        .map(|row| CandidateSeed {
            player: row.player,
            similarity: row.similarity.clamp(0.0, 1.0),
        })
        .collect();

    Ok(Analysis {
        fingerprint,
        similar,
    })
}

pub fn parse_players_json(raw: &str) -> Result<Vec<String>, AnalysisError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Err(AnalysisError::EmptyResponse);
    }
    let parsed: PlayersResponse = serde_json::from_str(trimmed)?;
    let mut seen = std::collections::HashSet::new();
    Ok(parsed
        .players
        .into_iter()
        .flatten()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty() && seen.insert(name.clone()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_keeps_response_order() {
        let raw = r#"{
            "fingerprint": [
                {"Attribute": "Pace", "Weighted Z-Score": 1.23},
                {"Attribute": "Vision", "Weighted Z-Score": -0.5}
            ],
            "similar_players": []
        }"#;
        let analysis = parse_analysis_json(raw).expect("valid analysis");
        let order: Vec<&str> = analysis.fingerprint.attributes().collect();
        assert_eq!(order, vec!["Pace", "Vision"]);
        assert_eq!(analysis.fingerprint.get("Vision"), Some(-0.5));
    }

    #[test]
    fn duplicate_attribute_last_value_wins() {
        let raw = r#"{
            "fingerprint": [
                {"Attribute": "Pace", "Weighted Z-Score": 1.0},
                {"Attribute": "Vision", "Weighted Z-Score": 0.4},
                {"Attribute": "Pace", "Weighted Z-Score": 2.0}
            ],
            "similar_players": []
        }"#;
        let analysis = parse_analysis_json(raw).expect("valid analysis");
        assert_eq!(analysis.fingerprint.len(), 2);
        assert_eq!(analysis.fingerprint.entries()[0].attribute, "Pace");
        assert_eq!(analysis.fingerprint.get("Pace"), Some(2.0));
    }

    #[test]
    fn empty_body_is_rejected() {
        assert!(matches!(
            parse_analysis_json("  "),
            Err(AnalysisError::EmptyResponse)
        ));
        assert!(matches!(
            parse_analysis_json("{\"fingerprint\": 3}"),
            Err(AnalysisError::Payload(_))
        ));
    }

    #[test]
    fn players_list_skips_nulls_and_duplicates() {
        let raw = r#"{"players": ["Erling Haaland", null, " ", "Harry Kane", "Erling Haaland"]}"#;
        let players = parse_players_json(raw).expect("valid players");
        assert_eq!(players, vec!["Erling Haaland", "Harry Kane"]);
    }
}
