//! Collaborator interfaces for persistence, auth, storage and invoice numbering.
//!
//! Every operation takes the caller's [`Session`] explicitly; implementations
//! never keep a "current user". Two implementations exist: [`local`] on top
//! of SQLite and [`remote`] for a hosted REST backend.

pub mod local;
pub mod remote;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::billing::LineItem;
use crate::error::BackendResult;
use crate::models::{
    Bill, BillItem, BillQuery, BillSummary, Customer, NewBill, NewCustomer, Profile, Session, User,
};

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> BackendResult<User>;
    async fn sign_in(&self, email: &str, password: &str) -> BackendResult<Session>;
    async fn sign_out(&self, session: &Session) -> BackendResult<()>;
    /// `None` when the session is no longer valid.
    async fn current_user(&self, session: &Session) -> BackendResult<Option<User>>;
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn get_profile(&self, session: &Session, user_id: &str) -> BackendResult<Option<Profile>>;
    async fn upsert_profile(&self, session: &Session, profile: &Profile) -> BackendResult<Profile>;
}

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn insert_customer(&self, session: &Session, customer: &NewCustomer) -> BackendResult<Customer>;
    async fn get_customer(&self, session: &Session, id: &str) -> BackendResult<Option<Customer>>;
    async fn list_customers(&self, session: &Session) -> BackendResult<Vec<Customer>>;
}

#[async_trait]
pub trait BillRepository: Send + Sync {
    async fn insert_bill(&self, session: &Session, bill: &NewBill) -> BackendResult<Bill>;
    async fn get_bill(&self, session: &Session, id: &str) -> BackendResult<Option<Bill>>;
    async fn list_bills(&self, session: &Session, query: &BillQuery) -> BackendResult<Vec<BillSummary>>;
    async fn count_bills(&self, session: &Session) -> BackendResult<u64>;
    async fn bill_totals_since(
        &self,
        session: &Session,
        since: DateTime<Utc>,
    ) -> BackendResult<Vec<(f64, DateTime<Utc>)>>;
}

#[async_trait]
pub trait BillItemRepository: Send + Sync {
    async fn insert_items(
        &self,
        session: &Session,
        bill_id: &str,
        items: &[LineItem],
    ) -> BackendResult<Vec<BillItem>>;
    /// Items in the order they were inserted.
    async fn items_for_bill(&self, session: &Session, bill_id: &str) -> BackendResult<Vec<BillItem>>;
}

#[async_trait]
pub trait InvoiceNumberGenerator: Send + Sync {
    async fn next_invoice_number(&self, session: &Session) -> BackendResult<String>;
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(
        &self,
        session: &Session,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> BackendResult<()>;
    fn public_url(&self, bucket: &str, path: &str) -> String;
}

/// The full set of collaborators, injected into [`crate::services::state::AppState`].
#[derive(Clone)]
pub struct Backend {
    pub auth: Arc<dyn AuthProvider>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub customers: Arc<dyn CustomerRepository>,
    pub bills: Arc<dyn BillRepository>,
    pub bill_items: Arc<dyn BillItemRepository>,
    pub invoice_numbers: Arc<dyn InvoiceNumberGenerator>,
    pub storage: Arc<dyn ObjectStorage>,
}

impl Backend {
    pub fn local(backend: local::LocalBackend) -> Self {
        let shared = Arc::new(backend);
        Backend {
            auth: shared.clone(),
            profiles: shared.clone(),
            customers: shared.clone(),
            bills: shared.clone(),
            bill_items: shared.clone(),
            invoice_numbers: shared.clone(),
            storage: shared,
        }
    }

    pub fn remote(client: remote::RemoteBackend) -> Self {
        let shared = Arc::new(client);
        Backend {
            auth: shared.clone(),
            profiles: shared.clone(),
            customers: shared.clone(),
            bills: shared.clone(),
            bill_items: shared.clone(),
            invoice_numbers: shared.clone(),
            storage: shared,
        }
    }
}
