//! Credit transaction types for clipforge.
//!
//! Every balance change is recorded as an immutable transaction. The
//! `balance_after` field is written by the store in the same atomic unit as
//! the balance update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Plan, RenderJobId, TransactionId, UserId};

/// A credit transaction representing a balance change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    /// Unique transaction ID (ULID for time-ordering).
    pub id: TransactionId,

    /// The user whose balance was affected.
    pub user_id: UserId,

    /// Signed amount. Positive = credit, negative = debit.
    pub amount: i64,

    /// Type of transaction.
    pub transaction_type: TransactionType,

    /// Balance after this transaction.
    pub balance_after: i64,

    /// Human-readable description.
    pub description: String,

    /// Render job this transaction belongs to, for render debits and refunds.
    pub render_job_id: Option<RenderJobId>,

    /// When the transaction was created.
    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    fn new(
        user_id: UserId,
        amount: i64,
        transaction_type: TransactionType,
        description: String,
        render_job_id: Option<RenderJobId>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            amount,
            transaction_type,
            balance_after: 0,
            description,
            render_job_id,
            created_at: Utc::now(),
        }
    }

    /// Debit for a render job.
    #[must_use]
    pub fn render(user_id: UserId, cost: i64, job_id: RenderJobId) -> Self {
        Self::new(
            user_id,
            -cost.abs(),
            TransactionType::Render,
            format!("Render job {job_id}"),
            Some(job_id),
        )
    }

    /// Refund of a failed render job.
    #[must_use]
    pub fn refund(user_id: UserId, amount: i64, job_id: RenderJobId, reason: &str) -> Self {
        Self::new(
            user_id,
            amount.abs(),
            TransactionType::Refund,
            format!("Refund for render job {job_id}: {reason}"),
            Some(job_id),
        )
    }

    /// Purchased credits.
    #[must_use]
    pub fn purchase(user_id: UserId, amount: i64, description: String) -> Self {
        Self::new(user_id, amount, TransactionType::Purchase, description, None)
    }

    /// Promotional credits.
    #[must_use]
    pub fn bonus(user_id: UserId, amount: i64, description: String) -> Self {
        Self::new(user_id, amount, TransactionType::Bonus, description, None)
    }

    /// Subscription reset. The store fills in the signed delta.
    #[must_use]
    pub fn subscription(user_id: UserId, plan: Plan) -> Self {
        Self::new(
            user_id,
            0,
            TransactionType::Subscription,
            format!(
                "{} plan: balance reset to {} credits",
                plan.as_str(),
                plan.monthly_credits()
            ),
            None,
        )
    }
}

/// Type of credit transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// User purchased credits.
    Purchase,

    /// Credit spent on a render job.
    Render,

    /// Credit returned for a failed render job.
    Refund,

    /// Promotional or welcome credits.
    Bonus,

    /// Balance reset by a subscription plan.
    Subscription,
}

impl TransactionType {
    /// Check if this transaction type adds credits.
    #[must_use]
    pub const fn is_credit(self) -> bool {
        matches!(self, Self::Purchase | Self::Refund | Self::Bonus)
    }

    /// Check if this transaction type removes credits.
    #[must_use]
    pub const fn is_debit(self) -> bool {
        matches!(self, Self::Render)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_transaction_is_negative() {
        let job = RenderJobId::generate();
        let tx = CreditTransaction::render(UserId::generate(), 1, job);

        assert_eq!(tx.amount, -1);
        assert_eq!(tx.transaction_type, TransactionType::Render);
        assert_eq!(tx.render_job_id, Some(job));
    }

    #[test]
    fn refund_transaction_is_positive() {
        let job = RenderJobId::generate();
        let tx = CreditTransaction::refund(UserId::generate(), -1, job, "render failed");

        assert_eq!(tx.amount, 1);
        assert_eq!(tx.transaction_type, TransactionType::Refund);
        assert!(tx.description.contains("render failed"));
    }

    #[test]
    fn transaction_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&TransactionType::Subscription).unwrap(),
            "\"SUBSCRIPTION\""
        );
        assert!(TransactionType::Refund.is_credit());
        assert!(TransactionType::Render.is_debit());
        assert!(!TransactionType::Subscription.is_credit());
    }
}
