//! In-memory storage implementation.
//!
//! All state lives behind one `RwLock`; compound operations take the write
//! lock for their whole read-modify-write.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use clipforge_core::{
    Account, CreditTransaction, Plan, RenderJob, RenderJobId, TemplateId, TemplateRegistration,
    TransactionId, UserId,
};

use crate::error::{Result, StoreError};
use crate::{mutations, Store, Transition};

#[derive(Default)]
struct Tables {
    accounts: HashMap<UserId, Account>,
    transactions: BTreeMap<TransactionId, CreditTransaction>,
    render_jobs: BTreeMap<RenderJobId, RenderJob>,
    jobs_by_provider: HashMap<String, RenderJobId>,
    templates: BTreeMap<TemplateId, TemplateRegistration>,
}

impl Tables {
    fn account_mut(&mut self, user_id: &UserId) -> Result<&mut Account> {
        self.accounts
            .get_mut(user_id)
            .ok_or_else(|| StoreError::not_found("account", user_id))
    }

    fn job_mut(&mut self, job_id: &RenderJobId) -> Result<&mut RenderJob> {
        self.render_jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::not_found("render job", job_id))
    }
}

/// Storage backed by process memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::Database("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::Database("memory store lock poisoned".into()))
    }
}

/// Newest-first page of `items`, which iterate oldest first.
fn page<T: Clone, I>(items: I, limit: usize, offset: usize) -> Vec<T>
where
    I: DoubleEndedIterator<Item = T>,
{
    items.rev().skip(offset).take(limit).collect()
}

impl Store for MemoryStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    fn put_account(&self, account: &Account) -> Result<()> {
        self.write()?
            .accounts
            .insert(account.user_id, account.clone());
        Ok(())
    }

    fn create_account(
        &self,
        account: &Account,
        bonus: &mut CreditTransaction,
    ) -> Result<Option<Account>> {
        let mut tables = self.write()?;
        if tables.accounts.contains_key(&account.user_id) {
            return Ok(None);
        }

        let mut account = account.clone();
        mutations::credit(&mut account, bonus);
        tables.transactions.insert(bonus.id, bonus.clone());
        tables.accounts.insert(account.user_id, account.clone());
        Ok(Some(account))
    }

    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        Ok(self.read()?.accounts.get(user_id).cloned())
    }

    fn delete_account(&self, user_id: &UserId) -> Result<()> {
        self.write()?
            .accounts
            .remove(user_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("account", user_id))
    }

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<CreditTransaction>> {
        Ok(self.read()?.transactions.get(transaction_id).cloned())
    }

    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>> {
        let tables = self.read()?;
        let owned = tables
            .transactions
            .values()
            .filter(|tx| tx.user_id == *user_id)
            .cloned()
            .collect::<Vec<_>>();
        Ok(page(owned.into_iter(), limit, offset))
    }

    // =========================================================================
    // Compound Credit Operations
    // =========================================================================

    fn deduct_credits(&self, transaction: &mut CreditTransaction) -> Result<i64> {
        let mut tables = self.write()?;
        let account = tables.account_mut(&transaction.user_id)?;
        let balance = mutations::debit(account, transaction)?;
        tables
            .transactions
            .insert(transaction.id, transaction.clone());
        Ok(balance)
    }

    fn add_credits(&self, transaction: &mut CreditTransaction) -> Result<i64> {
        let mut tables = self.write()?;
        let account = tables.account_mut(&transaction.user_id)?;
        let balance = mutations::credit(account, transaction);
        tables
            .transactions
            .insert(transaction.id, transaction.clone());
        Ok(balance)
    }

    fn reset_credits(
        &self,
        user_id: &UserId,
        plan: Plan,
        transaction: &mut CreditTransaction,
    ) -> Result<i64> {
        let mut tables = self.write()?;
        let account = tables.account_mut(user_id)?;
        let balance = mutations::reset(account, plan, transaction);
        tables
            .transactions
            .insert(transaction.id, transaction.clone());
        Ok(balance)
    }

    // =========================================================================
    // Render Job Operations
    // =========================================================================

    fn put_render_job(&self, job: &RenderJob) -> Result<()> {
        let mut tables = self.write()?;
        if let Some(provider_job_id) = &job.provider_job_id {
            tables
                .jobs_by_provider
                .insert(provider_job_id.clone(), job.id);
        }
        tables.render_jobs.insert(job.id, job.clone());
        Ok(())
    }

    fn get_render_job(&self, job_id: &RenderJobId) -> Result<Option<RenderJob>> {
        Ok(self.read()?.render_jobs.get(job_id).cloned())
    }

    fn find_render_job_by_provider_id(&self, provider_job_id: &str) -> Result<Option<RenderJob>> {
        let tables = self.read()?;
        Ok(tables
            .jobs_by_provider
            .get(provider_job_id)
            .and_then(|job_id| tables.render_jobs.get(job_id))
            .cloned())
    }

    fn list_render_jobs_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RenderJob>> {
        let tables = self.read()?;
        let owned = tables
            .render_jobs
            .values()
            .filter(|job| job.user_id == *user_id)
            .cloned()
            .collect::<Vec<_>>();
        Ok(page(owned.into_iter(), limit, offset))
    }

    fn update_render_progress(
        &self,
        job_id: &RenderJobId,
        progress: Option<f64>,
    ) -> Result<Transition> {
        let mut tables = self.write()?;
        let job = tables.job_mut(job_id)?;
        if job.record_progress(progress) {
            Ok(Transition::Applied(job.clone()))
        } else {
            Ok(Transition::Unchanged(job.clone()))
        }
    }

    fn complete_render_job(
        &self,
        job_id: &RenderJobId,
        output_url: &str,
        provider_output_url: &str,
    ) -> Result<Transition> {
        let mut tables = self.write()?;
        let job = tables.job_mut(job_id)?;
        if job.complete(output_url.to_string(), provider_output_url.to_string()) {
            Ok(Transition::Applied(job.clone()))
        } else {
            Ok(Transition::Unchanged(job.clone()))
        }
    }

    fn fail_render_job(
        &self,
        job_id: &RenderJobId,
        error: &str,
        refund: &mut CreditTransaction,
    ) -> Result<Transition> {
        let mut tables = self.write()?;
        let mut job = tables.job_mut(job_id)?.clone();
        if !job.fail(error) {
            return Ok(Transition::Unchanged(job));
        }

        if job.credits_used > 0 {
            refund.amount = job.credits_used;
            let account = tables.account_mut(&job.user_id)?;
            mutations::credit(account, refund);
            tables.transactions.insert(refund.id, refund.clone());
        }
        tables.render_jobs.insert(job.id, job.clone());
        Ok(Transition::Applied(job))
    }

    // =========================================================================
    // Template Registration Operations
    // =========================================================================

    fn put_template(&self, registration: &TemplateRegistration) -> Result<()> {
        self.write()?
            .templates
            .insert(registration.template_id, registration.clone());
        Ok(())
    }

    fn get_template(&self, template_id: TemplateId) -> Result<Option<TemplateRegistration>> {
        Ok(self.read()?.templates.get(&template_id).cloned())
    }

    fn list_templates(&self) -> Result<Vec<TemplateRegistration>> {
        Ok(self.read()?.templates.values().cloned().collect())
    }

    fn delete_template(&self, template_id: TemplateId) -> Result<()> {
        self.write()?
            .templates
            .remove(&template_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("template", template_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_core::{JobStatus, TransactionType};
    use std::sync::Arc;

    fn funded(store: &MemoryStore, credits: i64) -> UserId {
        let user_id = UserId::generate();
        let mut account = Account::new(user_id);
        account.credits = credits;
        store.put_account(&account).unwrap();
        user_id
    }

    fn pending_job(store: &MemoryStore, user_id: UserId) -> RenderJob {
        let job = RenderJob::new(
            RenderJobId::generate(),
            user_id,
            TemplateId::new(1).unwrap(),
            format!("prov_{}", RenderJobId::generate()),
            serde_json::json!({}),
        );
        store.put_render_job(&job).unwrap();
        job
    }

    #[test]
    fn deduct_then_refund_via_failure() {
        let store = MemoryStore::new();
        let user_id = funded(&store, 1);
        let job = pending_job(&store, user_id);

        let mut debit = CreditTransaction::render(user_id, 1, job.id);
        assert_eq!(store.deduct_credits(&mut debit).unwrap(), 0);

        let mut refund = CreditTransaction::refund(user_id, 1, job.id, "provider failed");
        let outcome = store.fail_render_job(&job.id, "provider failed", &mut refund).unwrap();
        assert!(outcome.is_applied());
        assert_eq!(outcome.into_job().status, JobStatus::Failed);
        assert_eq!(store.get_account(&user_id).unwrap().unwrap().credits, 1);

        // A second failure notification neither changes the job nor refunds again.
        let mut again = CreditTransaction::refund(user_id, 1, job.id, "duplicate");
        assert!(!store.fail_render_job(&job.id, "duplicate", &mut again).unwrap().is_applied());
        assert_eq!(store.get_account(&user_id).unwrap().unwrap().credits, 1);

        let refunds = store
            .list_transactions_by_user(&user_id, 10, 0)
            .unwrap()
            .into_iter()
            .filter(|tx| tx.transaction_type == TransactionType::Refund)
            .count();
        assert_eq!(refunds, 1);
    }

    #[test]
    fn concurrent_debits_never_overdraw() {
        let store = Arc::new(MemoryStore::new());
        let user_id = funded(&store, 1);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let mut tx = CreditTransaction::render(user_id, 1, RenderJobId::generate());
                    store.deduct_credits(&mut tx).is_ok()
                })
            })
            .collect();
        let succeeded = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(succeeded, 1);
        assert_eq!(store.get_account(&user_id).unwrap().unwrap().credits, 0);
    }

    #[test]
    fn concurrent_account_creation_grants_one_bonus() {
        let store = Arc::new(MemoryStore::new());
        let user_id = UserId::generate();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let mut bonus = CreditTransaction::bonus(user_id, 3, "Welcome".into());
                    store
                        .create_account(&Account::new(user_id), &mut bonus)
                        .unwrap()
                        .is_some()
                })
            })
            .collect();
        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|created| *created)
            .count();

        assert_eq!(created, 1);
        assert_eq!(store.get_account(&user_id).unwrap().unwrap().credits, 3);
        assert_eq!(store.list_transactions_by_user(&user_id, 10, 0).unwrap().len(), 1);
    }

    #[test]
    fn complete_is_conditional() {
        let store = MemoryStore::new();
        let user_id = funded(&store, 1);
        let job = pending_job(&store, user_id);

        assert!(store
            .complete_render_job(&job.id, "https://cdn/a.mp4", "https://prov/a.mp4")
            .unwrap()
            .is_applied());
        let second = store
            .complete_render_job(&job.id, "https://cdn/b.mp4", "https://prov/b.mp4")
            .unwrap();
        assert!(!second.is_applied());
        assert_eq!(second.into_job().output_url.as_deref(), Some("https://cdn/a.mp4"));

        let mut refund = CreditTransaction::refund(user_id, 1, job.id, "late failure");
        assert!(!store.fail_render_job(&job.id, "late", &mut refund).unwrap().is_applied());
    }

    #[test]
    fn jobs_found_by_provider_id_and_listed_newest_first() {
        let store = MemoryStore::new();
        let user_id = funded(&store, 0);
        let first = pending_job(&store, user_id);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = pending_job(&store, user_id);
        pending_job(&store, funded(&store, 0));

        let found = store
            .find_render_job_by_provider_id(first.provider_job_id.as_deref().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(found.id, first.id);

        let listed = store.list_render_jobs_by_user(&user_id, 10, 0).unwrap();
        let ids: Vec<_> = listed.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(store.list_render_jobs_by_user(&user_id, 1, 1).unwrap()[0].id, first.id);
    }

    #[test]
    fn template_crud() {
        let store = MemoryStore::new();
        let id = TemplateId::new(3).unwrap();
        store.put_template(&TemplateRegistration::new(id)).unwrap();
        assert!(store.get_template(id).unwrap().is_some());
        assert_eq!(store.list_templates().unwrap().len(), 1);

        store.delete_template(id).unwrap();
        assert!(matches!(
            store.delete_template(id),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn missing_account_is_not_found() {
        let store = MemoryStore::new();
        let mut tx = CreditTransaction::bonus(UserId::generate(), 3, "Welcome".into());
        assert!(matches!(
            store.add_credits(&mut tx),
            Err(StoreError::NotFound { entity: "account", .. })
        ));
    }
}
