//! Environment-driven server configuration.

use axum::http::HeaderValue;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Default chat message length cap (characters).
pub const DEFAULT_CHAT_BODY_LIMIT: usize = 500;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port to bind. `PORT`, default 3001.
    pub port: u16,
    /// Allowed CORS origins. `CORS_ORIGINS`, comma-separated; empty means
    /// permissive (development default).
    pub cors_origins: Vec<String>,
    /// Chat message length cap. `CHAT_MAX_CHARS`.
    pub chat_body_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            cors_origins: Vec::new(),
            chat_body_limit: DEFAULT_CHAT_BODY_LIMIT,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port);

        let cors_origins = std::env::var("CORS_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let chat_body_limit = std::env::var("CHAT_MAX_CHARS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.chat_body_limit);

        Self {
            port,
            cors_origins,
            chat_body_limit,
        }
    }

    /// CORS layer for the HTTP router. Falls back to permissive when no
    /// origins are configured.
    pub fn cors_layer(&self) -> CorsLayer {
        let origins: Vec<HeaderValue> = self
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        if origins.is_empty() {
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        }
    }
}
