//! Account types for clipforge.
//!
//! An account holds the user's credit balance and subscription plan. The
//! balance is the authoritative running total of the credit transaction log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// A credits account for a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// The user ID.
    pub user_id: UserId,

    /// Current credit balance. One render costs one credit.
    pub credits: i64,

    /// Current subscription plan.
    pub plan: Plan,

    /// Lifetime credits spent on renders (net of refunds).
    pub lifetime_used: i64,

    /// Lifetime credits granted by plans and bonuses.
    pub lifetime_granted: i64,

    /// Stripe customer ID, once the user has checked out.
    pub stripe_customer_id: Option<String>,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new Free account with zero balance.
    ///
    /// The welcome allotment is granted separately through the ledger so that
    /// it shows up as a transaction.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            credits: 0,
            plan: Plan::Free,
            lifetime_used: 0,
            lifetime_granted: 0,
            stripe_customer_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the account can cover `amount` credits.
    #[must_use]
    pub const fn has_sufficient_credits(&self, amount: i64) -> bool {
        self.credits >= amount
    }
}

/// Subscription plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    /// Free tier, a handful of renders per month.
    Free,

    /// Basic plan.
    Basic,

    /// Pro plan.
    Pro,

    /// Enterprise plan.
    Enterprise,
}

impl Plan {
    /// Credits the balance is reset to at the start of each billing period.
    #[must_use]
    pub const fn monthly_credits(self) -> i64 {
        match self {
            Self::Free => 3,
            Self::Basic => 30,
            Self::Pro => 100,
            Self::Enterprise => 500,
        }
    }

    /// Lowercase plan name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Basic => "basic",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }

    /// Parse a plan code as used in checkout metadata (`"pro"`, `"plan_pro"`, ...).
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim().to_ascii_lowercase();
        match code.strip_prefix("plan_").unwrap_or(&code) {
            "free" => Some(Self::Free),
            "basic" => Some(Self::Basic),
            "pro" => Some(Self::Pro),
            "enterprise" => Some(Self::Enterprise),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_is_free_and_empty() {
        let account = Account::new(UserId::generate());
        assert_eq!(account.credits, 0);
        assert_eq!(account.plan, Plan::Free);
        assert!(account.stripe_customer_id.is_none());
    }

    #[test]
    fn account_sufficient_credits() {
        let mut account = Account::new(UserId::generate());
        account.credits = 2;

        assert!(account.has_sufficient_credits(1));
        assert!(account.has_sufficient_credits(2));
        assert!(!account.has_sufficient_credits(3));
    }

    #[test]
    fn plan_codes() {
        assert_eq!(Plan::from_code("pro"), Some(Plan::Pro));
        assert_eq!(Plan::from_code("plan_basic"), Some(Plan::Basic));
        assert_eq!(Plan::from_code(" Enterprise "), Some(Plan::Enterprise));
        assert_eq!(Plan::from_code("gold"), None);
    }

    #[test]
    fn plan_allotments_grow() {
        assert!(Plan::Free.monthly_credits() < Plan::Basic.monthly_credits());
        assert!(Plan::Basic.monthly_credits() < Plan::Pro.monthly_credits());
        assert!(Plan::Pro.monthly_credits() < Plan::Enterprise.monthly_credits());
    }
}
