use async_trait::async_trait;
use chrono::{DateTime, Datelike, Local, Utc};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::{
    AuthProvider, BillItemRepository, BillRepository, CustomerRepository, InvoiceNumberGenerator,
    ObjectStorage, ProfileRepository,
};
use crate::billing::LineItem;
use crate::db::Database;
use crate::error::{BackendError, BackendResult};
use crate::models::{
    Bill, BillItem, BillQuery, BillSummary, Customer, NewBill, NewCustomer, Profile, Session, User,
};
use crate::services::crypto::CryptoService;
use crate::utils::now;

const MIN_PASSWORD_LEN: usize = 6;

/// SQLite-backed stand-in for the hosted backend. Objects are written below
/// `storage_root/<bucket>/`.
pub struct LocalBackend {
    db: Arc<Mutex<Database>>,
    storage_root: PathBuf,
}

impl LocalBackend {
    pub fn new(db: Arc<Mutex<Database>>, storage_root: PathBuf) -> Self {
        LocalBackend { db, storage_root }
    }

    fn with_db<T>(&self, f: impl FnOnce(&Database) -> rusqlite::Result<T>) -> BackendResult<T> {
        let db = self.db.lock().map_err(|_| BackendError::Lock("database"))?;
        Ok(f(&db)?)
    }

    /// Resolves the session to its user, rejecting signed-out or unknown tokens.
    fn authorize(&self, session: &Session) -> BackendResult<User> {
        let digest = CryptoService::token_digest(&session.access_token);
        self.with_db(|db| db.find_session_user(&digest))?
            .ok_or_else(|| BackendError::Unauthorized("session expired, sign in again".to_string()))
    }

    fn object_path(&self, bucket: &str, path: &str) -> BackendResult<PathBuf> {
        let relative = Path::new(path);
        let safe = !bucket.is_empty()
            && !bucket.contains(['/', '\\'])
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe || path.is_empty() {
            return Err(BackendError::InvalidInput(format!("object path {}/{}", bucket, path)));
        }
        Ok(self.storage_root.join(bucket).join(relative))
    }
}

#[async_trait]
impl AuthProvider for LocalBackend {
    async fn sign_up(&self, email: &str, password: &str) -> BackendResult<User> {
        let email = email.trim().to_lowercase();
        if !email.contains('@') {
            return Err(BackendError::InvalidInput("a valid email is required".to_string()));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(BackendError::InvalidInput(format!(
                "password should be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        if self.with_db(|db| db.find_user_by_email(&email))?.is_some() {
            return Err(BackendError::InvalidInput("User already registered".to_string()));
        }

        let password_hash =
            CryptoService::hash_password(password).map_err(|e| BackendError::Crypto(e.to_string()))?;
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            email,
        };
        self.with_db(|db| db.insert_user(&user, &password_hash, now()))?;
        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> BackendResult<Session> {
        let found = self.with_db(|db| db.find_user_by_email(email.trim()))?;
        let user = match found {
            Some((user, hash)) if CryptoService::verify_password(password, &hash) => user,
            _ => return Err(BackendError::Unauthorized("Invalid login credentials".to_string())),
        };

        let token = CryptoService::generate_token().map_err(|e| BackendError::Crypto(e.to_string()))?;
        let digest = CryptoService::token_digest(&token);
        self.with_db(|db| db.insert_session(&digest, &user.id, now()))?;
        info!(user_id = %user.id, "signed in");
        Ok(Session {
            user,
            access_token: token,
            refresh_token: None,
        })
    }

    async fn sign_out(&self, session: &Session) -> BackendResult<()> {
        let digest = CryptoService::token_digest(&session.access_token);
        let removed = self.with_db(|db| db.delete_session(&digest))?;
        debug!(removed, "session removed");
        Ok(())
    }

    async fn current_user(&self, session: &Session) -> BackendResult<Option<User>> {
        let digest = CryptoService::token_digest(&session.access_token);
        self.with_db(|db| db.find_session_user(&digest))
    }
}

#[async_trait]
impl ProfileRepository for LocalBackend {
    async fn get_profile(&self, session: &Session, user_id: &str) -> BackendResult<Option<Profile>> {
        self.authorize(session)?;
        self.with_db(|db| db.get_profile(user_id))
    }

    async fn upsert_profile(&self, session: &Session, profile: &Profile) -> BackendResult<Profile> {
        let user = self.authorize(session)?;
        if user.id != profile.id {
            return Err(BackendError::Unauthorized("profiles can only be edited by their owner".to_string()));
        }
        self.with_db(|db| {
            db.upsert_profile(profile)?;
            db.get_profile(&profile.id)
        })?
        .ok_or_else(|| BackendError::NotFound("Profile".to_string()))
    }
}

#[async_trait]
impl CustomerRepository for LocalBackend {
    async fn insert_customer(&self, session: &Session, customer: &NewCustomer) -> BackendResult<Customer> {
        self.authorize(session)?;
        let timestamp = now();
        let record = Customer {
            id: uuid::Uuid::new_v4().to_string(),
            name: customer.name.clone(),
            mobile_number: customer.mobile_number.clone(),
            email: customer.email.clone(),
            address: customer.address.clone(),
            created_at: timestamp,
            updated_at: timestamp,
        };
        self.with_db(|db| db.insert_customer(&record))?;
        Ok(record)
    }

    async fn get_customer(&self, session: &Session, id: &str) -> BackendResult<Option<Customer>> {
        self.authorize(session)?;
        self.with_db(|db| db.get_customer(id))
    }

    async fn list_customers(&self, session: &Session) -> BackendResult<Vec<Customer>> {
        self.authorize(session)?;
        self.with_db(|db| db.list_customers())
    }
}

#[async_trait]
impl BillRepository for LocalBackend {
    async fn insert_bill(&self, session: &Session, bill: &NewBill) -> BackendResult<Bill> {
        self.authorize(session)?;
        let timestamp = now();
        let record = Bill {
            id: uuid::Uuid::new_v4().to_string(),
            invoice_number: bill.invoice_number.clone(),
            customer_id: bill.customer_id.clone(),
            sub_total: bill.sub_total,
            discount: bill.discount,
            total: bill.total,
            payment_mode: bill.payment_mode,
            amount_received: bill.amount_received,
            balance: bill.balance,
            created_by: bill.created_by.clone(),
            created_at: timestamp,
            updated_at: timestamp,
        };
        self.with_db(|db| db.insert_bill(&record))?;
        Ok(record)
    }

    async fn get_bill(&self, session: &Session, id: &str) -> BackendResult<Option<Bill>> {
        self.authorize(session)?;
        self.with_db(|db| db.get_bill(id))
    }

    async fn list_bills(&self, session: &Session, query: &BillQuery) -> BackendResult<Vec<BillSummary>> {
        self.authorize(session)?;
        self.with_db(|db| db.list_bill_summaries(query))
    }

    async fn count_bills(&self, session: &Session) -> BackendResult<u64> {
        self.authorize(session)?;
        self.with_db(|db| db.count_bills())
    }

    async fn bill_totals_since(
        &self,
        session: &Session,
        since: DateTime<Utc>,
    ) -> BackendResult<Vec<(f64, DateTime<Utc>)>> {
        self.authorize(session)?;
        self.with_db(|db| db.bill_totals_since(since))
    }
}

#[async_trait]
impl BillItemRepository for LocalBackend {
    async fn insert_items(
        &self,
        session: &Session,
        bill_id: &str,
        items: &[LineItem],
    ) -> BackendResult<Vec<BillItem>> {
        self.authorize(session)?;
        let timestamp = now();
        let records: Vec<BillItem> = items
            .iter()
            .map(|item| BillItem {
                id: uuid::Uuid::new_v4().to_string(),
                bill_id: bill_id.to_string(),
                item_name: item.item_name.clone(),
                quantity: item.quantity,
                price: item.price,
                amount: item.amount,
                created_at: timestamp,
            })
            .collect();
        self.with_db(|db| db.insert_bill_items(&records))?;
        Ok(records)
    }

    async fn items_for_bill(&self, session: &Session, bill_id: &str) -> BackendResult<Vec<BillItem>> {
        self.authorize(session)?;
        self.with_db(|db| db.get_bill_items(bill_id))
    }
}

#[async_trait]
impl InvoiceNumberGenerator for LocalBackend {
    async fn next_invoice_number(&self, session: &Session) -> BackendResult<String> {
        self.authorize(session)?;
        let year = Local::now().year();
        let sequence = self.with_db(|db| db.next_invoice_sequence(year))?;
        Ok(format!("INV-{}-{:04}", year, sequence))
    }
}

#[async_trait]
impl ObjectStorage for LocalBackend {
    async fn upload(
        &self,
        session: &Session,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> BackendResult<()> {
        self.authorize(session)?;
        let target = self.object_path(bucket, path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &bytes).await?;
        debug!(path = %target.display(), content_type, size = bytes.len(), "object stored");
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("file://{}", self.storage_root.join(bucket).join(path).display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(root: &Path) -> LocalBackend {
        let db = Database::open_in_memory().unwrap();
        LocalBackend::new(Arc::new(Mutex::new(db)), root.to_path_buf())
    }

    #[tokio::test]
    async fn sign_up_then_sign_in_issues_a_working_session() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path());
        let user = backend.sign_up("Owner@Example.com", "hunter22").await.unwrap();
        assert_eq!(user.email, "owner@example.com");

        let session = backend.sign_in("owner@example.com", "hunter22").await.unwrap();
        assert_eq!(session.user, user);
        assert_eq!(backend.current_user(&session).await.unwrap(), Some(user));

        backend.sign_out(&session).await.unwrap();
        assert_eq!(backend.current_user(&session).await.unwrap(), None);
        assert!(matches!(
            backend.list_customers(&session).await,
            Err(BackendError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn sign_in_rejects_bad_credentials_and_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path());
        backend.sign_up("a@b.co", "hunter22").await.unwrap();
        assert!(matches!(
            backend.sign_in("a@b.co", "nope-nope").await,
            Err(BackendError::Unauthorized(_))
        ));
        assert!(matches!(
            backend.sign_up("a@b.co", "hunter22").await,
            Err(BackendError::InvalidInput(_))
        ));
        assert!(matches!(
            backend.sign_up("c@d.co", "short").await,
            Err(BackendError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn invoice_numbers_are_sequential() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path());
        backend.sign_up("a@b.co", "hunter22").await.unwrap();
        let session = backend.sign_in("a@b.co", "hunter22").await.unwrap();

        let first = backend.next_invoice_number(&session).await.unwrap();
        let second = backend.next_invoice_number(&session).await.unwrap();
        let year = Local::now().year();
        assert_eq!(first, format!("INV-{}-0001", year));
        assert_eq!(second, format!("INV-{}-0002", year));
    }

    #[tokio::test]
    async fn upload_writes_below_bucket_and_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path());
        backend.sign_up("a@b.co", "hunter22").await.unwrap();
        let session = backend.sign_in("a@b.co", "hunter22").await.unwrap();

        backend
            .upload(&session, "signatures", "signatures/u1.png", "image/png", vec![1, 2, 3])
            .await
            .unwrap();
        let stored = std::fs::read(dir.path().join("signatures/signatures/u1.png")).unwrap();
        assert_eq!(stored, vec![1, 2, 3]);
        assert!(backend
            .public_url("signatures", "signatures/u1.png")
            .starts_with("file://"));

        assert!(matches!(
            backend
                .upload(&session, "signatures", "../escape.png", "image/png", vec![0])
                .await,
            Err(BackendError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn profiles_are_owner_only() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path());
        backend.sign_up("a@b.co", "hunter22").await.unwrap();
        let session = backend.sign_in("a@b.co", "hunter22").await.unwrap();
        let timestamp = now();
        let mut profile = Profile {
            id: session.user.id.clone(),
            full_name: Some("Asha".into()),
            company_name: "Asha Traders".into(),
            company_address: None,
            gstin: None,
            signature_url: None,
            created_at: timestamp,
            updated_at: timestamp,
        };
        let saved = backend.upsert_profile(&session, &profile).await.unwrap();
        assert_eq!(saved.company_name, "Asha Traders");

        profile.id = "someone-else".into();
        assert!(matches!(
            backend.upsert_profile(&session, &profile).await,
            Err(BackendError::Unauthorized(_))
        ));
    }
}
