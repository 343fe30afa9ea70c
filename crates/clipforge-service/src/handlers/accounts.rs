//! Account management handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use clipforge_core::Account;
use clipforge_store::Store;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Account response.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// User ID.
    pub user_id: String,
    /// Current credit balance.
    pub credits: i64,
    /// Current plan.
    pub plan: String,
    /// Credits spent on renders, net of refunds.
    pub lifetime_used: i64,
    /// Credits granted by bonuses, purchases and plans.
    pub lifetime_granted: i64,
    /// Created timestamp.
    pub created_at: String,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            user_id: account.user_id.to_string(),
            credits: account.credits,
            plan: account.plan.as_str().to_string(),
            lifetime_used: account.lifetime_used,
            lifetime_granted: account.lifetime_granted,
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

/// Open an account with the welcome allotment.
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<(StatusCode, Json<AccountResponse>), ApiError> {
    let account = state
        .ledger
        .create_account(auth.user_id)?
        .ok_or_else(|| ApiError::Conflict("Account already exists".into()))?;

    Ok((StatusCode::CREATED, Json(AccountResponse::from(&account))))
}

/// Get the current user's account.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state
        .ledger
        .account(&auth.user_id)?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;

    Ok(Json(AccountResponse::from(&account)))
}

/// Delete the current user's account.
pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.store.delete_account(&auth.user_id)?;

    tracing::info!(user_id = %auth.user_id, "Account deleted");

    Ok(Json(serde_json::json!({ "deleted": true })))
}
