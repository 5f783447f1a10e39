use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED, USER_AGENT};
use serde::{Deserialize, Serialize};

use crate::http_client::user_agent;

const CACHE_VERSION: u32 = 1;
const CACHE_DIR: &str = "player_similarity";
const CACHE_FILE: &str = "http_cache.json";
const MAX_ENTRIES: usize = 2000;

static CACHE: Mutex<Option<HttpCacheFile>> = Mutex::new(None);

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct HttpCacheFile {
    version: u32,
    entries: HashMap<String, CacheEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    body: String,
    etag: Option<String>,
    last_modified: Option<String>,
    fetched_at: u64,
}

/// GET `url` and return the body. With `cached` set, the response is revalidated against the
/// on-disk cache using ETag / Last-Modified.
pub fn fetch_json(client: &Client, url: &str, cached: bool) -> Result<String> {
    if cached {
        return fetch_json_cached(client, url);
    }
    let resp = client
        .get(url)
        .header(USER_AGENT, user_agent())
        .send()
        .context("request failed")?;
    let status = resp.status();
    let body = resp.text().context("failed reading body")?;
    if !status.is_success() {
        return Err(anyhow::anyhow!("http {}: {}", status, body));
    }
    Ok(body)
}

fn fetch_json_cached(client: &Client, url: &str) -> Result<String> {
    let cached_entry = {
        let mut guard = lock_cache();
        let cache = guard.get_or_insert_with(load_cache_file);
        cache.entries.get(url).cloned()
    };

    let mut req = client.get(url).header(USER_AGENT, user_agent());
    if let Some(entry) = cached_entry.as_ref() {
        if let Some(etag) = entry.etag.as_ref() {
            req = req.header(IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = entry.last_modified.as_ref() {
            req = req.header(IF_MODIFIED_SINCE, last_modified);
        }
    }

    let resp = req.send().context("request failed")?;
    let status = resp.status();
    let headers = resp.headers().clone();
    if status == StatusCode::NOT_MODIFIED {
        if let Some(mut entry) = cached_entry {
            // Revalidated entries count as fresh for eviction.
            entry.fetched_at = system_time_to_secs(SystemTime::now()).unwrap_or(entry.fetched_at);
            let body = entry.body.clone();
            store_cache_entry(url, entry);
            return Ok(body);
        }
        return Err(anyhow::anyhow!("received 304 without cache body"));
    }

    let body = resp.text().context("failed reading body")?;
    if !status.is_success() {
        return Err(anyhow::anyhow!("http {}: {}", status, body));
    }

    let etag = headers
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    let last_modified = headers
        .get(LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    // Nothing to revalidate against later, so there is no point persisting it.
    if etag.is_some() || last_modified.is_some() {
        let entry = CacheEntry {
            body: body.clone(),
            etag,
            last_modified,
            fetched_at: system_time_to_secs(SystemTime::now()).unwrap_or_default(),
        };
        store_cache_entry(url, entry);
    }
    Ok(body)
}

fn lock_cache() -> MutexGuard<'static, Option<HttpCacheFile>> {
    CACHE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn store_cache_entry(key: &str, entry: CacheEntry) {
    let mut guard = lock_cache();
    let cache = guard.get_or_insert_with(load_cache_file);
    cache.version = CACHE_VERSION;
    cache.entries.insert(key.to_string(), entry);
    if cache.entries.len() > MAX_ENTRIES {
        evict_oldest(cache);
    }
    let _ = save_cache_file(cache);
}

fn evict_oldest(cache: &mut HttpCacheFile) {
    let mut ages: Vec<(u64, String)> = cache
        .entries
        .iter()
        .map(|(key, entry)| (entry.fetched_at, key.clone()))
        .collect();
    ages.sort_unstable();
    let excess = cache.entries.len().saturating_sub(MAX_ENTRIES);
    for (_, key) in ages.into_iter().take(excess) {
        cache.entries.remove(&key);
    }
}

fn load_cache_file() -> HttpCacheFile {
    let Some(path) = cache_path() else {
        return HttpCacheFile::default();
    };
    let Ok(raw) = fs::read_to_string(path) else {
        return HttpCacheFile::default();
    };
    let cache = serde_json::from_str::<HttpCacheFile>(&raw).unwrap_or_default();
    if cache.version != CACHE_VERSION {
        return HttpCacheFile::default();
    }
    cache
}

fn save_cache_file(cache: &HttpCacheFile) -> Result<()> {
    let Some(path) = cache_path() else {
        return Ok(());
    };
    let Some(dir) = path.parent() else {
        return Ok(());
    };
    fs::create_dir_all(dir).ok();
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(cache).context("serialize http cache")?;
    fs::write(&tmp, json).context("write http cache")?;
    fs::rename(&tmp, &path).context("swap http cache")?;
    Ok(())
}

fn cache_path() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(CACHE_DIR).join(CACHE_FILE));
        }
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR).join(CACHE_FILE))
}

fn system_time_to_secs(time: SystemTime) -> Option<u64> {
    time.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eviction_drops_oldest_entries_first() {
        let mut cache = HttpCacheFile::default();
        for i in 0..(MAX_ENTRIES + 3) {
            cache.entries.insert(
                format!("k{i}"),
                CacheEntry {
                    body: String::new(),
                    etag: None,
                    last_modified: None,
                    fetched_at: i as u64,
                },
            );
        }
        evict_oldest(&mut cache);
        assert_eq!(cache.entries.len(), MAX_ENTRIES);
        assert!(!cache.entries.contains_key("k0"));
        assert!(!cache.entries.contains_key("k2"));
        assert!(cache.entries.contains_key("k3"));
    }
}
