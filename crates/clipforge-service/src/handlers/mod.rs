//! API handlers.

pub mod accounts;
pub mod credits;
pub mod health;
pub mod renders;
pub mod templates;
pub mod uploads;
pub mod webhooks;

use serde::Deserialize;

/// Pagination query parameters.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    /// Maximum number of items to return (default: 50, capped at 100).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

impl PageQuery {
    /// Largest page a client may request.
    pub const MAX_LIMIT: usize = 100;

    /// The requested limit, capped.
    #[must_use]
    pub fn capped_limit(&self) -> usize {
        self.limit.min(Self::MAX_LIMIT)
    }
}

fn default_limit() -> usize {
    50
}
