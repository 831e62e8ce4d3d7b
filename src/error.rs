//! Fatal, construction-time error types. Particle exhaustion, transform
//! failure, and depth cutoff are expected control flow (§7) and are never
//! represented as `Result` — only configuration errors are.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("discount must be in (0, 1], got {0}")]
    InvalidDiscount(f64),

    #[error("reward range must be >= 0, got {0}")]
    InvalidRewardRange(f64),

    #[error("{field} must be non-negative, got {value}")]
    NegativeCount { field: &'static str, value: i64 },

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
