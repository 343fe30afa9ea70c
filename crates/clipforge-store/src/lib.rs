//! Storage layer for clipforge.
//!
//! This crate persists accounts, credit transactions, render jobs and
//! template registrations behind the [`Store`] trait.
//!
//! # Backends
//!
//! - [`MemoryStore`]: maps behind a single `RwLock`, for tests and
//!   single-process deployments without a data directory.
//! - `RocksStore` (feature `rocksdb-backend`): column families with CBOR
//!   values. Column families:
//!   - `accounts`: keyed by `user_id`
//!   - `transactions`: keyed by `transaction_id` (ULID)
//!   - `transactions_by_user`: index for listing transactions by user
//!   - `render_jobs`: keyed by `render_job_id` (ULID)
//!   - `render_jobs_by_user`: index for listing jobs by user
//!   - `render_jobs_by_provider`: provider job id to `render_job_id`
//!   - `templates`: keyed by `template_id`
//!
//! # Atomicity
//!
//! Every balance change is written together with its transaction record.
//! Job terminal transitions are conditional on the job not being terminal
//! yet, and a failure transition writes the refund in the same unit, so a
//! job is refunded at most once however many reconcilers race on it.
//!
//! # Example
//!
//! ```
//! use clipforge_store::{MemoryStore, Store};
//! use clipforge_core::{Account, CreditTransaction, UserId};
//!
//! let store = MemoryStore::new();
//! let user_id = UserId::generate();
//! store.put_account(&Account::new(user_id)).unwrap();
//!
//! let mut tx = CreditTransaction::bonus(user_id, 3, "Welcome".into());
//! assert_eq!(store.add_credits(&mut tx).unwrap(), 3);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod memory;
mod mutations;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use clipforge_core::{
    Account, CreditTransaction, Plan, RenderJob, RenderJobId, TemplateId, TemplateRegistration,
    TransactionId, UserId,
};

/// Outcome of a conditional job transition.
#[derive(Debug, Clone)]
pub enum Transition {
    /// The transition was written; holds the updated job.
    Applied(RenderJob),
    /// The job was already past this point; holds the stored job.
    Unchanged(RenderJob),
}

impl Transition {
    /// Whether this call performed the transition.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    /// The job as stored after the call.
    #[must_use]
    pub fn into_job(self) -> RenderJob {
        match self {
            Self::Applied(job) | Self::Unchanged(job) => job,
        }
    }
}

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different
/// implementations (`RocksDB`, in-memory).
pub trait Store: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Insert or update an account record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_account(&self, account: &Account) -> Result<()>;

    /// Create `account` funded by `bonus` in one write, unless the user
    /// already has an account.
    ///
    /// Returns the stored account, or `None` if one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn create_account(
        &self,
        account: &Account,
        bonus: &mut CreditTransaction,
    ) -> Result<Option<Account>>;

    /// Get an account by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>>;

    /// Delete an account by user ID.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    fn delete_account(&self, user_id: &UserId) -> Result<()>;

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    /// Get a transaction by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<CreditTransaction>>;

    /// List transactions for a user, ordered by time (newest first).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>>;

    // =========================================================================
    // Compound Credit Operations
    // =========================================================================

    /// Debit `-transaction.amount` credits and record the transaction atomically.
    ///
    /// Fills in `transaction.balance_after` and returns the new balance.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::InsufficientCredits` if the balance is too low at write time.
    fn deduct_credits(&self, transaction: &mut CreditTransaction) -> Result<i64>;

    /// Credit `transaction.amount` credits and record the transaction atomically.
    ///
    /// Fills in `transaction.balance_after` and returns the new balance.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    fn add_credits(&self, transaction: &mut CreditTransaction) -> Result<i64>;

    /// Switch the account to `plan` and reset the balance to its allotment.
    ///
    /// Fills in the signed delta and `balance_after` on `transaction` and
    /// returns the new balance.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    fn reset_credits(
        &self,
        user_id: &UserId,
        plan: Plan,
        transaction: &mut CreditTransaction,
    ) -> Result<i64>;

    // =========================================================================
    // Render Job Operations
    // =========================================================================

    /// Insert or replace a render job and its indexes.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_render_job(&self, job: &RenderJob) -> Result<()>;

    /// Get a render job by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_render_job(&self, job_id: &RenderJobId) -> Result<Option<RenderJob>>;

    /// Find a render job by the provider's job ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_render_job_by_provider_id(&self, provider_job_id: &str) -> Result<Option<RenderJob>>;

    /// List render jobs for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_render_jobs_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RenderJob>>;

    /// Record provider progress on a non-terminal job.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the job doesn't exist.
    fn update_render_progress(&self, job_id: &RenderJobId, progress: Option<f64>)
        -> Result<Transition>;

    /// Mark a job COMPLETED, unless it is terminal or already has an output.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the job doesn't exist.
    fn complete_render_job(
        &self,
        job_id: &RenderJobId,
        output_url: &str,
        provider_output_url: &str,
    ) -> Result<Transition>;

    /// Mark a job FAILED and refund its credits in one atomic unit.
    ///
    /// Nothing is written if the job is already terminal. The refund amount
    /// is the stored job's `credits_used`; `refund.amount` is overwritten.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the job or its owner's account doesn't exist.
    fn fail_render_job(
        &self,
        job_id: &RenderJobId,
        error: &str,
        refund: &mut CreditTransaction,
    ) -> Result<Transition>;

    // =========================================================================
    // Template Registration Operations
    // =========================================================================

    /// Insert or replace a template registration.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_template(&self, registration: &TemplateRegistration) -> Result<()>;

    /// Get a template registration.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_template(&self, template_id: TemplateId) -> Result<Option<TemplateRegistration>>;

    /// All template registrations, by template ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_templates(&self) -> Result<Vec<TemplateRegistration>>;

    /// Delete a template registration.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the registration doesn't exist.
    fn delete_template(&self, template_id: TemplateId) -> Result<()>;
}
