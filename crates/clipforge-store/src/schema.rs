//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Primary account records, keyed by `user_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Credit transactions, keyed by `transaction_id` (ULID).
    pub const TRANSACTIONS: &str = "transactions";

    /// Index: transactions by user, keyed by `user_id || transaction_id`.
    /// Value is empty (index only).
    pub const TRANSACTIONS_BY_USER: &str = "transactions_by_user";

    /// Render jobs, keyed by `render_job_id` (ULID).
    pub const RENDER_JOBS: &str = "render_jobs";

    /// Index: render jobs by user, keyed by `user_id || render_job_id`.
    /// Value is empty (index only).
    pub const RENDER_JOBS_BY_USER: &str = "render_jobs_by_user";

    /// Index: provider job id to `render_job_id`.
    pub const RENDER_JOBS_BY_PROVIDER: &str = "render_jobs_by_provider";

    /// Template registrations, keyed by big-endian `template_id`.
    pub const TEMPLATES: &str = "templates";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::TRANSACTIONS,
        cf::TRANSACTIONS_BY_USER,
        cf::RENDER_JOBS,
        cf::RENDER_JOBS_BY_USER,
        cf::RENDER_JOBS_BY_PROVIDER,
        cf::TEMPLATES,
    ]
}
