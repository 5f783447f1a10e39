use std::env;
use std::time::Duration;

const DEFAULT_API_URL: &str = "http://127.0.0.1:3000";
const DEFAULT_WIKI_URL: &str = "https://en.wikipedia.org";

#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the analysis service (`/api/analyze`, `/api/compare`, `/api/positions`).
    pub api_url: String,
    /// Base URL of the encyclopedia whose `/w/api.php` serves portrait lookups.
    pub wiki_url: String,
    pub fetch_parallelism: usize,
    pub request_timeout: Duration,
    pub thumb_size: u32,
    pub http_cache: bool,
    /// How long the headless lookup waits for each phase to settle.
    pub lookup_wait: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            wiki_url: DEFAULT_WIKI_URL.to_string(),
            fetch_parallelism: 6,
            request_timeout: Duration::from_secs(10),
            thumb_size: 300,
            http_cache: true,
            lookup_wait: Duration::from_secs(60),
        }
    }
}

impl Settings {
    /// Reads the process environment. Call `load_dotenv` first to pick up `.env` files.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Settings::default();
        Self {
            api_url: url_or_default(lookup("SIMILARITY_API_URL"), &defaults.api_url),
            wiki_url: url_or_default(lookup("WIKI_API_URL"), &defaults.wiki_url),
            fetch_parallelism: lookup("FETCH_PARALLELISM")
                .and_then(|val| val.trim().parse::<usize>().ok())
                .unwrap_or(defaults.fetch_parallelism)
                .clamp(2, 32),
            request_timeout: Duration::from_secs(
                lookup("REQUEST_TIMEOUT_SECS")
                    .and_then(|val| val.trim().parse::<u64>().ok())
                    .unwrap_or(10)
                    .clamp(1, 120),
            ),
            thumb_size: lookup("THUMB_SIZE")
                .and_then(|val| val.trim().parse::<u32>().ok())
                .unwrap_or(defaults.thumb_size)
                .clamp(50, 1000),
            http_cache: lookup("HTTP_CACHE")
                .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "off" | "no"))
                .unwrap_or(defaults.http_cache),
            lookup_wait: Duration::from_secs(
                lookup("LOOKUP_WAIT_SECS")
                    .and_then(|val| val.trim().parse::<u64>().ok())
                    .unwrap_or(60)
                    .clamp(5, 600),
            ),
        }
    }
}

pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

fn url_or_default(raw: Option<String>, default: &str) -> String {
    let Some(raw) = raw else {
        return default.to_string();
    };
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return default.to_string();
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings_from(pairs: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let settings = settings_from(&[]);
        assert_eq!(settings.api_url, "http://127.0.0.1:3000");
        assert_eq!(settings.wiki_url, "https://en.wikipedia.org");
        assert_eq!(settings.fetch_parallelism, 6);
        assert_eq!(settings.request_timeout, Duration::from_secs(10));
        assert_eq!(settings.thumb_size, 300);
        assert!(settings.http_cache);
        assert_eq!(settings.lookup_wait, Duration::from_secs(60));
    }

    #[test]
    fn clamps_and_trims_overrides() {
        let settings = settings_from(&[
            ("SIMILARITY_API_URL", " http://api.local:9000/ "),
            ("FETCH_PARALLELISM", "500"),
            ("REQUEST_TIMEOUT_SECS", "0"),
            ("HTTP_CACHE", "off"),
            ("THUMB_SIZE", "not-a-number"),
        ]);
        assert_eq!(settings.api_url, "http://api.local:9000");
        assert_eq!(settings.fetch_parallelism, 32);
        assert_eq!(settings.request_timeout, Duration::from_secs(1));
        assert!(!settings.http_cache);
        assert_eq!(settings.thumb_size, 300);
    }

    #[test]
    fn lookup_wait_is_clamped() {
        assert_eq!(
            settings_from(&[("LOOKUP_WAIT_SECS", "1")]).lookup_wait,
            Duration::from_secs(5)
        );
        assert_eq!(
            settings_from(&[("LOOKUP_WAIT_SECS", " 90 ")]).lookup_wait,
            Duration::from_secs(90)
        );
        assert_eq!(
            settings_from(&[("LOOKUP_WAIT_SECS", "86400")]).lookup_wait,
            Duration::from_secs(600)
        );
    }
}
