//! Credit balance and transaction handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use clipforge_core::{CreditTransaction, TransactionType, UserId};

use super::PageQuery;
use crate::auth::{AdminAuth, AuthUser};
use crate::error::ApiError;
use crate::state::AppState;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Current credit balance.
    pub credits: i64,
    /// Current plan.
    pub plan: String,
    /// Credits the plan grants each month.
    pub monthly_allotment: i64,
}

/// Get current credit balance.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let account = state
        .ledger
        .account(&auth.user_id)?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;

    Ok(Json(BalanceResponse {
        credits: account.credits,
        plan: account.plan.as_str().to_string(),
        monthly_allotment: account.plan.monthly_credits(),
    }))
}

/// Transaction response.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    /// Transaction ID.
    pub id: String,
    /// Signed amount (positive = credit, negative = debit).
    pub amount: i64,
    /// Transaction type.
    pub transaction_type: TransactionType,
    /// Balance after this transaction.
    pub balance_after: i64,
    /// Description.
    pub description: String,
    /// Render job this transaction belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render_job_id: Option<String>,
    /// Timestamp.
    pub created_at: String,
}

impl From<&CreditTransaction> for TransactionResponse {
    fn from(tx: &CreditTransaction) -> Self {
        Self {
            id: tx.id.to_string(),
            amount: tx.amount,
            transaction_type: tx.transaction_type,
            balance_after: tx.balance_after,
            description: tx.description.clone(),
            render_job_id: tx.render_job_id.map(|id| id.to_string()),
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

/// List transactions response.
#[derive(Debug, Serialize)]
pub struct ListTransactionsResponse {
    /// Transactions (newest first).
    pub transactions: Vec<TransactionResponse>,
    /// Whether there are more transactions.
    pub has_more: bool,
}

/// List transaction history.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<ListTransactionsResponse>, ApiError> {
    // Verify account exists
    state
        .ledger
        .account(&auth.user_id)?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;

    // Fetch one more than requested to determine has_more
    let limit = query.capped_limit();
    let transactions = state
        .ledger
        .list_transactions(&auth.user_id, limit + 1, query.offset)?;

    let has_more = transactions.len() > limit;
    let transactions: Vec<_> = transactions
        .iter()
        .take(limit)
        .map(TransactionResponse::from)
        .collect();

    Ok(Json(ListTransactionsResponse {
        transactions,
        has_more,
    }))
}

/// Kind of manual grant.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantKind {
    /// Promotional credits.
    #[default]
    Bonus,
    /// Credits paid for outside the service.
    Purchase,
}

impl From<GrantKind> for TransactionType {
    fn from(kind: GrantKind) -> Self {
        match kind {
            GrantKind::Bonus => Self::Bonus,
            GrantKind::Purchase => Self::Purchase,
        }
    }
}

/// Admin add credits request.
#[derive(Debug, Deserialize)]
pub struct AdminAddCreditsRequest {
    /// User ID to add credits to.
    pub user_id: String,
    /// Number of credits.
    pub amount: i64,
    /// Grant kind (default: bonus).
    #[serde(default)]
    pub kind: GrantKind,
    /// Reason for the credit.
    pub reason: String,
}

/// Admin add credits response.
#[derive(Debug, Serialize)]
pub struct AdminAddCreditsResponse {
    /// Balance after the grant.
    pub credits: i64,
    /// The recorded transaction.
    pub transaction_id: String,
}

/// Admin endpoint to add credits (bonus/purchase).
pub async fn admin_add_credits(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(body): Json<AdminAddCreditsRequest>,
) -> Result<Json<AdminAddCreditsResponse>, ApiError> {
    let user_id: UserId = body
        .user_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))?;

    let tx = state
        .ledger
        .add_credits(user_id, body.amount, body.kind.into(), body.reason.clone())?;

    tracing::info!(
        admin_id = %admin.admin_id,
        user_id = %user_id,
        amount = body.amount,
        reason = %body.reason,
        "Admin credit grant"
    );

    Ok(Json(AdminAddCreditsResponse {
        credits: tx.balance_after,
        transaction_id: tx.id.to_string(),
    }))
}
