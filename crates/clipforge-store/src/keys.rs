//! Key encoding utilities for `RocksDB`.
//!
//! Index keys are `owner || id` with fixed-width parts, so a prefix scan over
//! the owner returns ULID ids in creation order.

use clipforge_core::{RenderJobId, TemplateId, TransactionId, UserId};

const ID_LEN: usize = 16;

/// Create an account key from a user ID.
#[must_use]
pub fn account_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create a transaction key from a transaction ID.
#[must_use]
pub fn transaction_key(transaction_id: &TransactionId) -> Vec<u8> {
    transaction_id.to_bytes().to_vec()
}

/// Create a user-transaction index key.
///
/// Format: `user_id (16 bytes) || transaction_id (16 bytes)`
#[must_use]
pub fn user_transaction_key(user_id: &UserId, transaction_id: &TransactionId) -> Vec<u8> {
    user_scoped_key(user_id, transaction_id.to_bytes())
}

/// Create a render job key from a job ID.
#[must_use]
pub fn render_job_key(job_id: &RenderJobId) -> Vec<u8> {
    job_id.to_bytes().to_vec()
}

/// Create a user-job index key.
///
/// Format: `user_id (16 bytes) || render_job_id (16 bytes)`
#[must_use]
pub fn user_render_job_key(user_id: &UserId, job_id: &RenderJobId) -> Vec<u8> {
    user_scoped_key(user_id, job_id.to_bytes())
}

/// Create a provider-job index key.
#[must_use]
pub fn provider_job_key(provider_job_id: &str) -> Vec<u8> {
    provider_job_id.as_bytes().to_vec()
}

/// Create a template registration key.
#[must_use]
pub fn template_key(template_id: TemplateId) -> Vec<u8> {
    template_id.to_be_bytes().to_vec()
}

/// Prefix for iterating a user's index entries.
#[must_use]
pub fn user_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

fn user_scoped_key(user_id: &UserId, id: [u8; ID_LEN]) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 * ID_LEN);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&id);
    key
}

/// Trailing 16-byte id of a user-scoped index key.
///
/// Returns `None` if the key is shorter than 32 bytes.
#[must_use]
pub fn trailing_id(key: &[u8]) -> Option<[u8; ID_LEN]> {
    key.get(ID_LEN..2 * ID_LEN)?.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_key_length() {
        let key = account_key(&UserId::generate());
        assert_eq!(key.len(), 16);
    }

    #[test]
    fn user_transaction_key_format() {
        let user_id = UserId::generate();
        let tx_id = TransactionId::generate();
        let key = user_transaction_key(&user_id, &tx_id);

        assert_eq!(key.len(), 32);
        assert_eq!(&key[..16], user_id.as_bytes());
        assert_eq!(&key[16..], tx_id.to_bytes());
        assert!(key.starts_with(&user_prefix(&user_id)));
    }

    #[test]
    fn trailing_id_roundtrip() {
        let user_id = UserId::generate();
        let job_id = RenderJobId::generate();
        let key = user_render_job_key(&user_id, &job_id);

        let extracted = RenderJobId::from_bytes(trailing_id(&key).unwrap());
        assert_eq!(extracted, job_id);
        assert!(trailing_id(&key[..20]).is_none());
    }

    #[test]
    fn template_keys_sort_numerically() {
        let nine = template_key(TemplateId::new(9).unwrap());
        let ten = template_key(TemplateId::new(10).unwrap());
        assert!(nine < ten);
    }
}
