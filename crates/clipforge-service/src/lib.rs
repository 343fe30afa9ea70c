//! Clipforge HTTP API Service.
//!
//! This crate provides the HTTP API for clipforge, including:
//!
//! - Account management and the credits ledger
//! - Customization asset uploads to durable storage
//! - Render job creation, status reconciliation and listing
//! - Template registration and upload administration
//! - Render provider and Stripe webhooks
//!
//! # Authentication
//!
//! The service supports two authentication methods:
//!
//! 1. **HS256 JWT tokens** - For end-user requests, `sub` is the user ID
//! 2. **Admin API key** - `X-API-Key` for template administration and grants

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers are async for axum even when they don't await

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod orchestrator;
pub mod provider;
pub mod routes;
pub mod state;
pub mod storage;
pub mod templates;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use ledger::CreditsLedger;
pub use orchestrator::RenderOrchestrator;
pub use provider::{ProviderClient, ProviderError, RenderProvider};
pub use routes::create_router;
pub use state::AppState;
pub use storage::{CloudStorageClient, MediaStorage, StorageError};
pub use templates::TemplateManager;
