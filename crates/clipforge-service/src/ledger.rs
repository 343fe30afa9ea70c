//! Credits ledger.
//!
//! Every balance change goes through here and lands in the store as a single
//! atomic write together with its transaction record.

use std::sync::Arc;

use clipforge_core::{
    Account, CreditTransaction, Plan, RenderError, RenderJobId, Result, TransactionType, UserId,
};
use clipforge_store::{Store, Transition};

/// Description on the welcome bonus transaction.
const WELCOME_BONUS_DESCRIPTION: &str = "Welcome bonus";

/// Credit operations over the store.
#[derive(Clone)]
pub struct CreditsLedger {
    store: Arc<dyn Store>,
}

impl CreditsLedger {
    /// Create a ledger over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Get an account, if it exists.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::Storage` on store failures.
    pub fn account(&self, user_id: &UserId) -> Result<Option<Account>> {
        Ok(self.store.get_account(user_id)?)
    }

    /// Create an account with the Free allotment as a welcome bonus.
    ///
    /// An existing account is returned untouched.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::Storage` on store failures.
    pub fn open_account(&self, user_id: UserId) -> Result<Account> {
        match self.create_account(user_id)? {
            Some(account) => Ok(account),
            None => self
                .store
                .get_account(&user_id)?
                .ok_or_else(|| RenderError::not_found("account", user_id)),
        }
    }

    /// Create an account with its welcome bonus in one store write.
    ///
    /// Returns `None` if the user already has an account.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::Storage` on store failures.
    pub fn create_account(&self, user_id: UserId) -> Result<Option<Account>> {
        let mut bonus = CreditTransaction::bonus(
            user_id,
            Plan::Free.monthly_credits(),
            WELCOME_BONUS_DESCRIPTION.into(),
        );
        let created = self.store.create_account(&Account::new(user_id), &mut bonus)?;

        if let Some(account) = &created {
            tracing::info!(user_id = %user_id, balance = account.credits, "Account opened");
        }

        Ok(created)
    }

    /// Current balance.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::NotFound` if the account doesn't exist.
    pub fn balance(&self, user_id: &UserId) -> Result<i64> {
        self.store
            .get_account(user_id)?
            .map(|account| account.credits)
            .ok_or_else(|| RenderError::not_found("account", user_id))
    }

    /// Whether the balance covers `amount`.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::NotFound` if the account doesn't exist.
    pub fn has_enough_credits(&self, user_id: &UserId, amount: i64) -> Result<bool> {
        Ok(self.balance(user_id)? >= amount)
    }

    /// Debit `amount` credits for a render job. Returns the new balance.
    ///
    /// # Errors
    ///
    /// - `RenderError::InsufficientCredits` if the balance is too low at write time.
    /// - `RenderError::NotFound` if the account doesn't exist.
    pub fn deduct_credits(&self, user_id: UserId, amount: i64, job_id: RenderJobId) -> Result<i64> {
        let mut tx = CreditTransaction::render(user_id, amount, job_id);
        let balance = self.store.deduct_credits(&mut tx)?;

        tracing::info!(
            user_id = %user_id,
            job_id = %job_id,
            amount,
            balance,
            "Credits deducted"
        );

        Ok(balance)
    }

    /// Give back `amount` credits for a render job. Returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::NotFound` if the account doesn't exist.
    pub fn refund_credits(
        &self,
        user_id: UserId,
        amount: i64,
        job_id: RenderJobId,
        reason: &str,
    ) -> Result<i64> {
        let mut tx = CreditTransaction::refund(user_id, amount, job_id, reason);
        let balance = self.store.add_credits(&mut tx)?;

        tracing::info!(
            user_id = %user_id,
            job_id = %job_id,
            amount,
            balance,
            reason,
            "Credits refunded"
        );

        Ok(balance)
    }

    /// Grant credits as a bonus or purchase.
    ///
    /// # Errors
    ///
    /// - `RenderError::Validation` for a non-positive amount or another transaction kind.
    /// - `RenderError::NotFound` if the account doesn't exist.
    pub fn add_credits(
        &self,
        user_id: UserId,
        amount: i64,
        kind: TransactionType,
        description: String,
    ) -> Result<CreditTransaction> {
        if amount <= 0 {
            return Err(RenderError::Validation("amount must be positive".into()));
        }

        let mut tx = match kind {
            TransactionType::Bonus => CreditTransaction::bonus(user_id, amount, description),
            TransactionType::Purchase => CreditTransaction::purchase(user_id, amount, description),
            other => {
                return Err(RenderError::Validation(format!(
                    "cannot grant credits as {other:?}"
                )))
            }
        };
        let balance = self.store.add_credits(&mut tx)?;

        tracing::info!(
            user_id = %user_id,
            amount,
            kind = ?kind,
            balance,
            "Credits added"
        );

        Ok(tx)
    }

    /// Move the account to `plan` and reset its balance to the plan allotment.
    ///
    /// The returned transaction carries the signed balance delta.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::NotFound` if the account doesn't exist.
    pub fn upgrade_subscription(&self, user_id: UserId, plan: Plan) -> Result<CreditTransaction> {
        let mut tx = CreditTransaction::subscription(user_id, plan);
        let balance = self.store.reset_credits(&user_id, plan, &mut tx)?;

        tracing::info!(
            user_id = %user_id,
            plan = plan.as_str(),
            delta = tx.amount,
            balance,
            "Subscription credits reset"
        );

        Ok(tx)
    }

    /// Mark a job FAILED and refund it, at most once.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::NotFound` if the job or its account doesn't exist.
    pub fn fail_job(&self, job_id: &RenderJobId, error: &str) -> Result<Transition> {
        let job = self
            .store
            .get_render_job(job_id)?
            .ok_or_else(|| RenderError::not_found("render job", job_id))?;

        let mut refund =
            CreditTransaction::refund(job.user_id, job.credits_used, job.id, "Render failed");
        let transition = self.store.fail_render_job(job_id, error, &mut refund)?;

        if transition.is_applied() {
            tracing::info!(
                user_id = %job.user_id,
                job_id = %job_id,
                amount = refund.amount,
                balance = refund.balance_after,
                error,
                "Render failed, credits refunded"
            );
        }

        Ok(transition)
    }

    /// Transaction history, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::Storage` on store failures.
    pub fn list_transactions(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>> {
        Ok(self.store.list_transactions_by_user(user_id, limit, offset)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_core::{JobStatus, RenderJob, TemplateId};
    use clipforge_store::MemoryStore;

    fn ledger() -> (CreditsLedger, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (CreditsLedger::new(store.clone()), store)
    }

    #[test]
    fn open_account_grants_free_allotment_once() {
        let (ledger, _) = ledger();
        let user = UserId::generate();

        assert_eq!(ledger.open_account(user).unwrap().credits, 3);
        assert_eq!(ledger.open_account(user).unwrap().credits, 3);

        let txs = ledger.list_transactions(&user, 10, 0).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].transaction_type, TransactionType::Bonus);
    }

    #[test]
    fn create_account_reports_existing() {
        let (ledger, _) = ledger();
        let user = UserId::generate();

        assert_eq!(ledger.create_account(user).unwrap().unwrap().credits, 3);
        assert!(ledger.create_account(user).unwrap().is_none());
        assert_eq!(ledger.list_transactions(&user, 10, 0).unwrap().len(), 1);
    }

    #[test]
    fn deduct_then_refund_restores_balance() {
        let (ledger, _) = ledger();
        let user = UserId::generate();
        ledger.open_account(user).unwrap();

        let job = RenderJobId::generate();
        assert_eq!(ledger.deduct_credits(user, 1, job).unwrap(), 2);
        assert_eq!(ledger.refund_credits(user, 1, job, "test").unwrap(), 3);

        let txs = ledger.list_transactions(&user, 10, 0).unwrap();
        let kinds: Vec<_> = txs.iter().map(|tx| tx.transaction_type).collect();
        assert_eq!(
            kinds,
            vec![TransactionType::Refund, TransactionType::Render, TransactionType::Bonus]
        );
        assert_eq!(txs[0].render_job_id, Some(job));
    }

    #[test]
    fn deduct_rejects_overdraft() {
        let (ledger, _) = ledger();
        let user = UserId::generate();
        ledger.open_account(user).unwrap();

        let err = ledger.deduct_credits(user, 5, RenderJobId::generate()).unwrap_err();
        assert!(matches!(
            err,
            RenderError::InsufficientCredits { balance: 3, required: 5 }
        ));
        assert_eq!(ledger.balance(&user).unwrap(), 3);
    }

    #[test]
    fn has_enough_credits_requires_account() {
        let (ledger, _) = ledger();
        let user = UserId::generate();
        assert!(matches!(
            ledger.has_enough_credits(&user, 1),
            Err(RenderError::NotFound { .. })
        ));
        ledger.open_account(user).unwrap();
        assert!(ledger.has_enough_credits(&user, 3).unwrap());
        assert!(!ledger.has_enough_credits(&user, 4).unwrap());
    }

    #[test]
    fn add_credits_only_grants() {
        let (ledger, _) = ledger();
        let user = UserId::generate();
        ledger.open_account(user).unwrap();

        let tx = ledger
            .add_credits(user, 10, TransactionType::Purchase, "Pack".into())
            .unwrap();
        assert_eq!(tx.balance_after, 13);

        assert!(matches!(
            ledger.add_credits(user, 10, TransactionType::Render, "x".into()),
            Err(RenderError::Validation(_))
        ));
        assert!(matches!(
            ledger.add_credits(user, 0, TransactionType::Bonus, "x".into()),
            Err(RenderError::Validation(_))
        ));
    }

    #[test]
    fn upgrade_resets_to_plan_allotment() {
        let (ledger, _) = ledger();
        let user = UserId::generate();
        ledger.open_account(user).unwrap();
        ledger.deduct_credits(user, 2, RenderJobId::generate()).unwrap();

        let tx = ledger.upgrade_subscription(user, Plan::Pro).unwrap();
        assert_eq!(tx.amount, 99);
        assert_eq!(tx.balance_after, 100);

        let tx = ledger.upgrade_subscription(user, Plan::Basic).unwrap();
        assert_eq!(tx.amount, -70);
        assert_eq!(ledger.account(&user).unwrap().unwrap().plan, Plan::Basic);
    }

    #[test]
    fn fail_job_refunds_once() {
        let (ledger, store) = ledger();
        let user = UserId::generate();
        ledger.open_account(user).unwrap();

        let job_id = RenderJobId::generate();
        ledger.deduct_credits(user, 1, job_id).unwrap();
        let job = RenderJob::new(
            job_id,
            user,
            TemplateId::new(1).unwrap(),
            "prov-1".into(),
            serde_json::json!({}),
        );
        store.put_render_job(&job).unwrap();

        assert!(ledger.fail_job(&job_id, "boom").unwrap().is_applied());
        let second = ledger.fail_job(&job_id, "boom again").unwrap();
        assert!(!second.is_applied());
        assert_eq!(second.into_job().status, JobStatus::Failed);
        assert_eq!(ledger.balance(&user).unwrap(), 3);
    }
}
