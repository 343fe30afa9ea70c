//! Balance arithmetic shared by the store backends.
//!
//! Each backend loads the account, applies one of these under its write
//! guard, then persists account and transaction together.

use chrono::Utc;

use clipforge_core::{Account, CreditTransaction, Plan, TransactionType};

use crate::error::{Result, StoreError};

/// Apply a debit. `tx.amount` is negative.
pub(crate) fn debit(account: &mut Account, tx: &mut CreditTransaction) -> Result<i64> {
    let cost = tx.amount.abs();
    if account.credits < cost {
        return Err(StoreError::InsufficientCredits {
            balance: account.credits,
            required: cost,
        });
    }

    account.credits -= cost;
    account.lifetime_used += cost;
    account.updated_at = Utc::now();
    tx.balance_after = account.credits;
    Ok(account.credits)
}

/// Apply a credit. `tx.amount` is positive.
pub(crate) fn credit(account: &mut Account, tx: &mut CreditTransaction) -> i64 {
    let amount = tx.amount.abs();
    account.credits += amount;
    match tx.transaction_type {
        TransactionType::Refund => {
            account.lifetime_used = (account.lifetime_used - amount).max(0);
        }
        TransactionType::Purchase | TransactionType::Bonus | TransactionType::Subscription => {
            account.lifetime_granted += amount;
        }
        TransactionType::Render => {}
    }
    account.updated_at = Utc::now();
    tx.balance_after = account.credits;
    account.credits
}

/// Reset the balance to a plan's allotment, recording the signed delta.
pub(crate) fn reset(account: &mut Account, plan: Plan, tx: &mut CreditTransaction) -> i64 {
    let allotment = plan.monthly_credits();
    let delta = allotment - account.credits;

    account.credits = allotment;
    account.plan = plan;
    account.lifetime_granted += delta.max(0);
    account.updated_at = Utc::now();

    tx.amount = delta;
    tx.balance_after = allotment;
    allotment
}
