//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.
//! Compound operations hold `write_lock` across their read-modify-write and
//! commit through one `WriteBatch`.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use clipforge_core::{
    Account, CreditTransaction, Plan, RenderJob, RenderJobId, TemplateId, TemplateRegistration,
    TransactionId, UserId,
};

use crate::error::{Result, StoreError};
use crate::schema::{all_column_families, cf};
use crate::{keys, mutations, Store, Transition};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Database("write lock poisoned".into()))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Trailing ids of a user-scoped index, newest first.
    fn user_index_page(
        &self,
        cf_name: &str,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<[u8; 16]>> {
        let cf = self.cf(cf_name)?;
        let prefix = keys::user_prefix(user_id);

        let mut ids = Vec::new();
        for item in self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            if let Some(id) = keys::trailing_id(&key) {
                ids.push(id);
            }
        }

        Ok(ids.into_iter().rev().skip(offset).take(limit).collect())
    }

    fn account_for(&self, user_id: &UserId) -> Result<Account> {
        self.get(cf::ACCOUNTS, &keys::account_key(user_id))?
            .ok_or_else(|| StoreError::not_found("account", user_id))
    }

    fn job_for(&self, job_id: &RenderJobId) -> Result<RenderJob> {
        self.get_render_job(job_id)?
            .ok_or_else(|| StoreError::not_found("render job", job_id))
    }

    /// Stage an account and a transaction into `batch`.
    fn stage_ledger_write(
        &self,
        batch: &mut WriteBatch,
        account: &Account,
        transaction: &CreditTransaction,
    ) -> Result<()> {
        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_tx_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;

        batch.put_cf(
            &cf_accounts,
            keys::account_key(&account.user_id),
            Self::serialize(account)?,
        );
        batch.put_cf(
            &cf_tx,
            keys::transaction_key(&transaction.id),
            Self::serialize(transaction)?,
        );
        batch.put_cf(
            &cf_tx_by_user,
            keys::user_transaction_key(&transaction.user_id, &transaction.id),
            [],
        );
        Ok(())
    }

    fn stage_job_write(&self, batch: &mut WriteBatch, job: &RenderJob) -> Result<()> {
        let cf_jobs = self.cf(cf::RENDER_JOBS)?;
        batch.put_cf(&cf_jobs, keys::render_job_key(&job.id), Self::serialize(job)?);
        Ok(())
    }

    /// Apply a job mutation under the write lock and persist it if it changed.
    fn transition(
        &self,
        job_id: &RenderJobId,
        apply: impl FnOnce(&mut RenderJob) -> bool,
    ) -> Result<Transition> {
        let _guard = self.lock()?;
        let mut job = self.job_for(job_id)?;
        if !apply(&mut job) {
            return Ok(Transition::Unchanged(job));
        }

        let mut batch = WriteBatch::default();
        self.stage_job_write(&mut batch, &job)?;
        self.write(batch)?;
        Ok(Transition::Applied(job))
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    fn put_account(&self, account: &Account) -> Result<()> {
        let _guard = self.lock()?;
        let cf = self.cf(cf::ACCOUNTS)?;
        self.db
            .put_cf(&cf, keys::account_key(&account.user_id), Self::serialize(account)?)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn create_account(
        &self,
        account: &Account,
        bonus: &mut CreditTransaction,
    ) -> Result<Option<Account>> {
        let _guard = self.lock()?;
        if self.get_account(&account.user_id)?.is_some() {
            return Ok(None);
        }

        let mut account = account.clone();
        mutations::credit(&mut account, bonus);

        let mut batch = WriteBatch::default();
        self.stage_ledger_write(&mut batch, &account, bonus)?;
        self.write(batch)?;
        Ok(Some(account))
    }

    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        self.get(cf::ACCOUNTS, &keys::account_key(user_id))
    }

    fn delete_account(&self, user_id: &UserId) -> Result<()> {
        let _guard = self.lock()?;
        self.account_for(user_id)?;

        let cf = self.cf(cf::ACCOUNTS)?;
        self.db
            .delete_cf(&cf, keys::account_key(user_id))
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<CreditTransaction>> {
        self.get(cf::TRANSACTIONS, &keys::transaction_key(transaction_id))
    }

    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>> {
        let mut transactions = Vec::new();
        for id in self.user_index_page(cf::TRANSACTIONS_BY_USER, user_id, limit, offset)? {
            if let Some(tx) = self.get_transaction(&TransactionId::from_bytes(id))? {
                transactions.push(tx);
            }
        }
        Ok(transactions)
    }

    // =========================================================================
    // Compound Credit Operations
    // =========================================================================

    fn deduct_credits(&self, transaction: &mut CreditTransaction) -> Result<i64> {
        let _guard = self.lock()?;
        let mut account = self.account_for(&transaction.user_id)?;
        let balance = mutations::debit(&mut account, transaction)?;

        let mut batch = WriteBatch::default();
        self.stage_ledger_write(&mut batch, &account, transaction)?;
        self.write(batch)?;
        Ok(balance)
    }

    fn add_credits(&self, transaction: &mut CreditTransaction) -> Result<i64> {
        let _guard = self.lock()?;
        let mut account = self.account_for(&transaction.user_id)?;
        let balance = mutations::credit(&mut account, transaction);

        let mut batch = WriteBatch::default();
        self.stage_ledger_write(&mut batch, &account, transaction)?;
        self.write(batch)?;
        Ok(balance)
    }

    fn reset_credits(
        &self,
        user_id: &UserId,
        plan: Plan,
        transaction: &mut CreditTransaction,
    ) -> Result<i64> {
        let _guard = self.lock()?;
        let mut account = self.account_for(user_id)?;
        let balance = mutations::reset(&mut account, plan, transaction);

        let mut batch = WriteBatch::default();
        self.stage_ledger_write(&mut batch, &account, transaction)?;
        self.write(batch)?;
        Ok(balance)
    }

    // =========================================================================
    // Render Job Operations
    // =========================================================================

    fn put_render_job(&self, job: &RenderJob) -> Result<()> {
        let _guard = self.lock()?;
        let cf_by_user = self.cf(cf::RENDER_JOBS_BY_USER)?;
        let cf_by_provider = self.cf(cf::RENDER_JOBS_BY_PROVIDER)?;

        let mut batch = WriteBatch::default();
        self.stage_job_write(&mut batch, job)?;
        batch.put_cf(&cf_by_user, keys::user_render_job_key(&job.user_id, &job.id), []);
        if let Some(provider_job_id) = &job.provider_job_id {
            batch.put_cf(
                &cf_by_provider,
                keys::provider_job_key(provider_job_id),
                keys::render_job_key(&job.id),
            );
        }
        self.write(batch)
    }

    fn get_render_job(&self, job_id: &RenderJobId) -> Result<Option<RenderJob>> {
        self.get(cf::RENDER_JOBS, &keys::render_job_key(job_id))
    }

    fn find_render_job_by_provider_id(&self, provider_job_id: &str) -> Result<Option<RenderJob>> {
        let cf = self.cf(cf::RENDER_JOBS_BY_PROVIDER)?;
        let Some(raw) = self
            .db
            .get_cf(&cf, keys::provider_job_key(provider_job_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let bytes: [u8; 16] = raw
            .as_slice()
            .try_into()
            .map_err(|_| StoreError::Serialization("malformed provider job index entry".into()))?;
        self.get_render_job(&RenderJobId::from_bytes(bytes))
    }

    fn list_render_jobs_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RenderJob>> {
        let mut jobs = Vec::new();
        for id in self.user_index_page(cf::RENDER_JOBS_BY_USER, user_id, limit, offset)? {
            if let Some(job) = self.get_render_job(&RenderJobId::from_bytes(id))? {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    fn update_render_progress(
        &self,
        job_id: &RenderJobId,
        progress: Option<f64>,
    ) -> Result<Transition> {
        self.transition(job_id, |job| job.record_progress(progress))
    }

    fn complete_render_job(
        &self,
        job_id: &RenderJobId,
        output_url: &str,
        provider_output_url: &str,
    ) -> Result<Transition> {
        self.transition(job_id, |job| {
            job.complete(output_url.to_string(), provider_output_url.to_string())
        })
    }

    fn fail_render_job(
        &self,
        job_id: &RenderJobId,
        error: &str,
        refund: &mut CreditTransaction,
    ) -> Result<Transition> {
        let _guard = self.lock()?;
        let mut job = self.job_for(job_id)?;
        if !job.fail(error) {
            return Ok(Transition::Unchanged(job));
        }

        let mut batch = WriteBatch::default();
        self.stage_job_write(&mut batch, &job)?;
        if job.credits_used > 0 {
            refund.amount = job.credits_used;
            let mut account = self.account_for(&job.user_id)?;
            mutations::credit(&mut account, refund);
            self.stage_ledger_write(&mut batch, &account, refund)?;
        }
        self.write(batch)?;
        Ok(Transition::Applied(job))
    }

    // =========================================================================
    // Template Registration Operations
    // =========================================================================

    fn put_template(&self, registration: &TemplateRegistration) -> Result<()> {
        let cf = self.cf(cf::TEMPLATES)?;
        self.db
            .put_cf(
                &cf,
                keys::template_key(registration.template_id),
                Self::serialize(registration)?,
            )
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_template(&self, template_id: TemplateId) -> Result<Option<TemplateRegistration>> {
        self.get(cf::TEMPLATES, &keys::template_key(template_id))
    }

    fn list_templates(&self) -> Result<Vec<TemplateRegistration>> {
        let cf = self.cf(cf::TEMPLATES)?;
        self.db
            .iterator_cf(&cf, IteratorMode::Start)
            .map(|item| {
                let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
                Self::deserialize(&value)
            })
            .collect()
    }

    fn delete_template(&self, template_id: TemplateId) -> Result<()> {
        if self.get_template(template_id)?.is_none() {
            return Err(StoreError::not_found("template", template_id));
        }

        let cf = self.cf(cf::TEMPLATES)?;
        self.db
            .delete_cf(&cf, keys::template_key(template_id))
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_core::{JobStatus, TemplateStatus, TransactionType};
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn funded(store: &RocksStore, credits: i64) -> UserId {
        let user_id = UserId::generate();
        let mut account = Account::new(user_id);
        account.credits = credits;
        store.put_account(&account).unwrap();
        user_id
    }

    fn pending_job(store: &RocksStore, user_id: UserId, provider_job_id: &str) -> RenderJob {
        let job = RenderJob::new(
            RenderJobId::generate(),
            user_id,
            TemplateId::new(1).unwrap(),
            provider_job_id.into(),
            serde_json::json!({"text1": "Hi"}),
        );
        store.put_render_job(&job).unwrap();
        job
    }

    #[test]
    fn account_crud() {
        let (store, _dir) = create_test_store();
        let user_id = funded(&store, 30);

        let retrieved = store.get_account(&user_id).unwrap().unwrap();
        assert_eq!(retrieved.credits, 30);

        store.delete_account(&user_id).unwrap();
        assert!(store.get_account(&user_id).unwrap().is_none());
        assert!(matches!(
            store.delete_account(&user_id),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn create_account_writes_bonus_once() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();

        let mut bonus = CreditTransaction::bonus(user_id, 3, "Welcome".into());
        let created = store
            .create_account(&Account::new(user_id), &mut bonus)
            .unwrap()
            .unwrap();
        assert_eq!(created.credits, 3);
        assert_eq!(bonus.balance_after, 3);

        let mut again = CreditTransaction::bonus(user_id, 3, "Welcome".into());
        assert!(store
            .create_account(&Account::new(user_id), &mut again)
            .unwrap()
            .is_none());
        assert_eq!(store.get_account(&user_id).unwrap().unwrap().credits, 3);
        assert_eq!(store.list_transactions_by_user(&user_id, 10, 0).unwrap().len(), 1);
    }

    #[test]
    fn ledger_writes_and_lists_newest_first() {
        let (store, _dir) = create_test_store();
        let user_id = funded(&store, 0);

        let mut bonus = CreditTransaction::bonus(user_id, 3, "Welcome".into());
        assert_eq!(store.add_credits(&mut bonus).unwrap(), 3);

        std::thread::sleep(std::time::Duration::from_millis(2));

        let mut render = CreditTransaction::render(user_id, 1, RenderJobId::generate());
        assert_eq!(store.deduct_credits(&mut render).unwrap(), 2);

        let transactions = store.list_transactions_by_user(&user_id, 10, 0).unwrap();
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].transaction_type, TransactionType::Render);
        assert_eq!(transactions[0].balance_after, 2);
        assert_eq!(transactions[1].transaction_type, TransactionType::Bonus);

        let page2 = store.list_transactions_by_user(&user_id, 1, 1).unwrap();
        assert_eq!(page2[0].id, bonus.id);
    }

    #[test]
    fn insufficient_credits() {
        let (store, _dir) = create_test_store();
        let user_id = funded(&store, 0);

        let mut tx = CreditTransaction::render(user_id, 1, RenderJobId::generate());
        assert!(matches!(
            store.deduct_credits(&mut tx),
            Err(StoreError::InsufficientCredits {
                balance: 0,
                required: 1
            })
        ));
        assert!(store.get_transaction(&tx.id).unwrap().is_none());
    }

    #[test]
    fn subscription_reset() {
        let (store, _dir) = create_test_store();
        let user_id = funded(&store, 2);

        let mut tx = CreditTransaction::subscription(user_id, Plan::Pro);
        assert_eq!(store.reset_credits(&user_id, Plan::Pro, &mut tx).unwrap(), 100);

        let account = store.get_account(&user_id).unwrap().unwrap();
        assert_eq!(account.plan, Plan::Pro);
        assert_eq!(store.get_transaction(&tx.id).unwrap().unwrap().amount, 98);
    }

    #[test]
    fn job_lifecycle_with_single_refund() {
        let (store, _dir) = create_test_store();
        let user_id = funded(&store, 1);
        let job = pending_job(&store, user_id, "prov_abc");

        let mut debit = CreditTransaction::render(user_id, 1, job.id);
        store.deduct_credits(&mut debit).unwrap();

        let found = store.find_render_job_by_provider_id("prov_abc").unwrap().unwrap();
        assert_eq!(found.id, job.id);
        assert!(store.find_render_job_by_provider_id("other").unwrap().is_none());

        let progressed = store.update_render_progress(&job.id, Some(40.0)).unwrap();
        assert_eq!(progressed.into_job().status, JobStatus::Processing);

        let mut refund = CreditTransaction::refund(user_id, 1, job.id, "boom");
        assert!(store.fail_render_job(&job.id, "boom", &mut refund).unwrap().is_applied());
        let mut refund = CreditTransaction::refund(user_id, 1, job.id, "boom");
        assert!(!store.fail_render_job(&job.id, "boom", &mut refund).unwrap().is_applied());

        assert_eq!(store.get_account(&user_id).unwrap().unwrap().credits, 1);
        let stored = store.get_render_job(&job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(store.list_render_jobs_by_user(&user_id, 10, 0).unwrap().len(), 1);
    }

    #[test]
    fn template_registrations_persist() {
        let (store, _dir) = create_test_store();
        let mut reg = TemplateRegistration::new(TemplateId::new(12).unwrap());
        reg.awaiting_upload("asset_12".into());
        store.put_template(&reg).unwrap();
        store
            .put_template(&TemplateRegistration::new(TemplateId::new(2).unwrap()))
            .unwrap();

        let listed = store.list_templates().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].template_id.get(), 2);
        assert_eq!(listed[1].status, TemplateStatus::AwaitingUpload);

        store.delete_template(reg.template_id).unwrap();
        assert!(store.get_template(reg.template_id).unwrap().is_none());
    }
}
