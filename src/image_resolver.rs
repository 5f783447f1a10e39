use anyhow::anyhow;
use rayon::prelude::*;
use reqwest::Url;
use reqwest::blocking::Client;
use serde::Deserialize;

use crate::config::Settings;
use crate::error::ImageResolutionError;
use crate::http_cache::fetch_json;
use crate::http_client::http_client;
use crate::state::Portrait;

const API_PATH: &str = "/w/api.php";

pub trait PortraitSource: Send + Sync {
    fn try_resolve(&self, name: &str) -> Result<Portrait, ImageResolutionError>;

    /// Never fails: any lookup problem degrades to an empty portrait.
    fn resolve(&self, name: &str) -> Portrait {
        self.try_resolve(name).unwrap_or_default()
    }
}

pub struct PortraitBatch {
    pub portraits: Vec<(String, Portrait)>,
    pub errors: Vec<String>,
}

/// Two-phase encyclopedia lookup: title search, then the page image of the first hit.
pub struct ImageResolver {
    client: Client,
    base_url: String,
    thumb_size: u32,
    cached: bool,
}

impl ImageResolver {
    pub fn new(client: Client, base_url: impl Into<String>, thumb_size: u32, cached: bool) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            thumb_size,
            cached,
        }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let client = http_client(settings.request_timeout)?;
        Ok(Self::new(
            client.clone(),
            settings.wiki_url.clone(),
            settings.thumb_size,
            settings.http_cache,
        ))
    }

    fn api_url(&self, params: &[(&str, &str)]) -> anyhow::Result<Url> {
        let base = format!("{}{API_PATH}", self.base_url);
        Url::parse_with_params(&base, params)
            .map_err(|err| anyhow!("invalid lookup url {base}: {err}"))
    }
}

impl PortraitSource for ImageResolver {
    fn try_resolve(&self, name: &str) -> Result<Portrait, ImageResolutionError> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(Portrait::default());
        }

        let search_url = self
            .api_url(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", name),
                ("format", "json"),
            ])
            .map_err(ImageResolutionError::Search)?;
        let body = fetch_json(&self.client, search_url.as_str(), self.cached)
            .map_err(ImageResolutionError::Search)?;
        let Some(title) = parse_search_title_json(&body)? else {
            return Ok(Portrait::default());
        };

        let thumb_size = self.thumb_size.to_string();
        let image_url = self
            .api_url(&[
                ("action", "query"),
                ("titles", title.as_str()),
                ("prop", "pageimages"),
                ("pithumbsize", thumb_size.as_str()),
                ("format", "json"),
            ])
            .map_err(ImageResolutionError::PageImage)?;
        let body = fetch_json(&self.client, image_url.as_str(), self.cached)
            .map_err(ImageResolutionError::PageImage)?;
        let image_url = parse_page_thumbnail_json(&body)?;

        Ok(Portrait {
            image_url,
            team: None,
        }
        .normalized())
    }
}

/// Resolves every name on the current rayon pool and joins the batch. A failed lookup becomes
/// an empty portrait plus an error line; portraits keep input order.
pub fn resolve_all(source: &dyn PortraitSource, names: &[String]) -> PortraitBatch {
    let results: Vec<(String, Portrait, Option<String>)> = names
        .par_iter()
        .map(|name| match source.try_resolve(name) {
            Ok(portrait) => (name.clone(), portrait, None),
            Err(err) => (
                name.clone(),
                Portrait::default(),
                Some(format!("{name} portrait lookup failed: {err}")),
            ),
        })
        .collect();

    let mut portraits = Vec::with_capacity(results.len());
    let mut errors = Vec::new();
    for (name, portrait, err) in results {
        if let Some(err) = err {
            errors.push(err);
        }
        portraits.push((name, portrait));
    }
    PortraitBatch { portraits, errors }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    query: Option<SearchQuery>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

/// `query.search[0].title`, or `None` without hits.
pub fn parse_search_title_json(raw: &str) -> Result<Option<String>, ImageResolutionError> {
    let parsed: SearchResponse = serde_json::from_str(raw.trim())?;
    Ok(parsed
        .query
        .and_then(|q| q.search.into_iter().next())
        .map(|hit| hit.title)
        .filter(|title| !title.trim().is_empty()))
}

/// The first page's `thumbnail.source`. Pages come keyed by page id (or as a list with
/// `formatversion=2`).
pub fn parse_page_thumbnail_json(raw: &str) -> Result<Option<String>, ImageResolutionError> {
    let parsed: serde_json::Value = serde_json::from_str(raw.trim())?;
    let pages = &parsed["query"]["pages"];
    let first = match pages {
        serde_json::Value::Object(map) => map.values().next(),
        serde_json::Value::Array(list) => list.first(),
        _ => None,
    };
    Ok(first
        .and_then(|page| page["thumbnail"]["source"].as_str())
        .map(str::to_string))
}
