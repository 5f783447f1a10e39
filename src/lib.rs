pub mod compare_fetch;
pub mod config;
pub mod error;
pub mod fingerprint_fetch;
pub mod http_cache;
pub mod http_client;
pub mod image_resolver;
pub mod positions;
pub mod provider;
pub mod state;
pub mod view_model;
