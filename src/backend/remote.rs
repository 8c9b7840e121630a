use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{
    AuthProvider, BillItemRepository, BillRepository, CustomerRepository, InvoiceNumberGenerator,
    ObjectStorage, ProfileRepository,
};
use crate::billing::LineItem;
use crate::error::{BackendError, BackendResult};
use crate::models::{
    Bill, BillItem, BillQuery, BillSummary, Customer, NewBill, NewCustomer, Profile, Session, User,
};

const RETURN_REPRESENTATION: &str = "return=representation";

/// Client for a hosted PostgREST/GoTrue/Storage backend.
pub struct RemoteBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    user: RemoteUser,
}

#[derive(Deserialize)]
struct RemoteUser {
    id: String,
    email: Option<String>,
}

impl From<RemoteUser> for User {
    fn from(user: RemoteUser) -> Self {
        User {
            id: user.id,
            email: user.email.unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct RemoteBillSummary {
    id: String,
    invoice_number: String,
    total: f64,
    created_at: DateTime<Utc>,
    customers: Option<RemoteCustomerRef>,
}

#[derive(Deserialize)]
struct RemoteCustomerRef {
    name: String,
    mobile_number: Option<String>,
}

impl From<RemoteBillSummary> for BillSummary {
    fn from(row: RemoteBillSummary) -> Self {
        let (customer_name, customer_mobile) = match row.customers {
            Some(customer) => (customer.name, customer.mobile_number),
            None => (String::new(), None),
        };
        BillSummary {
            id: row.id,
            invoice_number: row.invoice_number,
            total: row.total,
            created_at: row.created_at,
            customer_name,
            customer_mobile,
        }
    }
}

#[derive(Serialize)]
struct NewBillItemRow<'a> {
    bill_id: &'a str,
    item_name: &'a str,
    quantity: u32,
    price: f64,
    amount: f64,
}

#[derive(Deserialize)]
struct TotalRow {
    total: f64,
    created_at: DateTime<Utc>,
}

impl RemoteBackend {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        RemoteBackend {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn request(&self, method: Method, url: &str, session: Option<&Session>) -> RequestBuilder {
        let bearer = session
            .map(|s| s.access_token.as_str())
            .unwrap_or(self.api_key.as_str());
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
    }

    /// Checks that the backend answers with the configured key.
    pub async fn ping(&self) -> BackendResult<bool> {
        let response = self
            .request(Method::GET, &format!("{}/rest/v1/", self.base_url), None)
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> BackendResult<T> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn send_empty(request: RequestBuilder) -> BackendResult<()> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }
        Ok(())
    }

    async fn insert_one<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        session: &Session,
        table: &str,
        body: &B,
    ) -> BackendResult<T> {
        let rows: Vec<T> = Self::send_json(
            self.request(Method::POST, &self.rest_url(table), Some(session))
                .header("Prefer", RETURN_REPRESENTATION)
                .json(body),
        )
        .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::Api {
                status: 200,
                message: format!("insert into {} returned no row", table),
            })
    }

    async fn select_by_id<T: DeserializeOwned>(
        &self,
        session: &Session,
        table: &str,
        id: &str,
    ) -> BackendResult<Option<T>> {
        let rows: Vec<T> = Self::send_json(
            self.request(Method::GET, &self.rest_url(table), Some(session))
                .query(&[("select", "*".to_string()), ("id", format!("eq.{}", id))]),
        )
        .await?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl AuthProvider for RemoteBackend {
    async fn sign_up(&self, email: &str, password: &str) -> BackendResult<User> {
        let body: Value = Self::send_json(
            self.request(Method::POST, &self.auth_url("signup"), None)
                .json(&json!({ "email": email, "password": password })),
        )
        .await?;
        let user = user_from_signup(body)?;
        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> BackendResult<Session> {
        let token: TokenResponse = Self::send_json(
            self.request(Method::POST, &self.auth_url("token"), None)
                .query(&[("grant_type", "password")])
                .json(&json!({ "email": email, "password": password })),
        )
        .await?;
        info!(user_id = %token.user.id, "signed in");
        Ok(Session {
            user: token.user.into(),
            access_token: token.access_token,
            refresh_token: token.refresh_token,
        })
    }

    async fn sign_out(&self, session: &Session) -> BackendResult<()> {
        Self::send_empty(self.request(Method::POST, &self.auth_url("logout"), Some(session))).await
    }

    async fn current_user(&self, session: &Session) -> BackendResult<Option<User>> {
        let result: BackendResult<RemoteUser> =
            Self::send_json(self.request(Method::GET, &self.auth_url("user"), Some(session))).await;
        match result {
            Ok(user) => Ok(Some(user.into())),
            Err(BackendError::Unauthorized(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ProfileRepository for RemoteBackend {
    async fn get_profile(&self, session: &Session, user_id: &str) -> BackendResult<Option<Profile>> {
        self.select_by_id(session, "profiles", user_id).await
    }

    async fn upsert_profile(&self, session: &Session, profile: &Profile) -> BackendResult<Profile> {
        let rows: Vec<Profile> = Self::send_json(
            self.request(Method::POST, &self.rest_url("profiles"), Some(session))
                .header("Prefer", format!("resolution=merge-duplicates,{}", RETURN_REPRESENTATION))
                .json(profile),
        )
        .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound("Profile".to_string()))
    }
}

#[async_trait]
impl CustomerRepository for RemoteBackend {
    async fn insert_customer(&self, session: &Session, customer: &NewCustomer) -> BackendResult<Customer> {
        self.insert_one(session, "customers", customer).await
    }

    async fn get_customer(&self, session: &Session, id: &str) -> BackendResult<Option<Customer>> {
        self.select_by_id(session, "customers", id).await
    }

    async fn list_customers(&self, session: &Session) -> BackendResult<Vec<Customer>> {
        Self::send_json(
            self.request(Method::GET, &self.rest_url("customers"), Some(session))
                .query(&[("select", "*"), ("order", "name.asc")]),
        )
        .await
    }
}

#[async_trait]
impl BillRepository for RemoteBackend {
    async fn insert_bill(&self, session: &Session, bill: &NewBill) -> BackendResult<Bill> {
        self.insert_one(session, "bills", bill).await
    }

    async fn get_bill(&self, session: &Session, id: &str) -> BackendResult<Option<Bill>> {
        self.select_by_id(session, "bills", id).await
    }

    async fn list_bills(&self, session: &Session, query: &BillQuery) -> BackendResult<Vec<BillSummary>> {
        let params = bill_list_params(query);
        debug!(?params, "listing bills");
        let rows: Vec<RemoteBillSummary> = Self::send_json(
            self.request(Method::GET, &self.rest_url("bills"), Some(session))
                .query(&params),
        )
        .await?;
        Ok(rows.into_iter().map(BillSummary::from).collect())
    }

    async fn count_bills(&self, session: &Session) -> BackendResult<u64> {
        let response = self
            .request(Method::HEAD, &self.rest_url("bills"), Some(session))
            .query(&[("select", "id")])
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(api_error(status, ""));
        }
        response
            .headers()
            .get("content-range")
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or_else(|| BackendError::Api {
                status: status.as_u16(),
                message: "missing Content-Range total".to_string(),
            })
    }

    async fn bill_totals_since(
        &self,
        session: &Session,
        since: DateTime<Utc>,
    ) -> BackendResult<Vec<(f64, DateTime<Utc>)>> {
        let rows: Vec<TotalRow> = Self::send_json(
            self.request(Method::GET, &self.rest_url("bills"), Some(session))
                .query(&[
                    ("select", "total,created_at".to_string()),
                    ("created_at", format!("gt.{}", since.to_rfc3339())),
                ]),
        )
        .await?;
        Ok(rows.into_iter().map(|row| (row.total, row.created_at)).collect())
    }
}

#[async_trait]
impl BillItemRepository for RemoteBackend {
    async fn insert_items(
        &self,
        session: &Session,
        bill_id: &str,
        items: &[LineItem],
    ) -> BackendResult<Vec<BillItem>> {
        let rows: Vec<NewBillItemRow<'_>> = items
            .iter()
            .map(|item| NewBillItemRow {
                bill_id,
                item_name: &item.item_name,
                quantity: item.quantity,
                price: item.price,
                amount: item.amount,
            })
            .collect();
        Self::send_json(
            self.request(Method::POST, &self.rest_url("bill_items"), Some(session))
                .header("Prefer", RETURN_REPRESENTATION)
                .json(&rows),
        )
        .await
    }

    async fn items_for_bill(&self, session: &Session, bill_id: &str) -> BackendResult<Vec<BillItem>> {
        Self::send_json(
            self.request(Method::GET, &self.rest_url("bill_items"), Some(session))
                .query(&[
                    ("select", "*".to_string()),
                    ("bill_id", format!("eq.{}", bill_id)),
                    ("order", "created_at.asc".to_string()),
                ]),
        )
        .await
    }
}

#[async_trait]
impl InvoiceNumberGenerator for RemoteBackend {
    async fn next_invoice_number(&self, session: &Session) -> BackendResult<String> {
        Self::send_json(
            self.request(Method::POST, &self.rest_url("rpc/generate_invoice_number"), Some(session))
                .json(&json!({})),
        )
        .await
    }
}

#[async_trait]
impl ObjectStorage for RemoteBackend {
    async fn upload(
        &self,
        session: &Session,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> BackendResult<()> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, bucket, path);
        Self::send_empty(
            self.request(Method::POST, &url, Some(session))
                .header("x-upsert", "true")
                .header("content-type", content_type)
                .body(bytes),
        )
        .await
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.base_url, bucket, path)
    }
}

fn bill_list_params(query: &BillQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        (
            "select",
            "id,invoice_number,total,created_at,customers(name,mobile_number)".to_string(),
        ),
        ("order", "created_at.desc".to_string()),
    ];
    if let Some(since) = query.created_since {
        params.push(("created_at", format!("gte.{}", since.to_rfc3339())));
    }
    if let Some(limit) = query.limit {
        params.push(("limit", limit.to_string()));
    }
    params
}

/// Sign-up answers with either a bare user or a session wrapping one.
fn user_from_signup(body: Value) -> BackendResult<User> {
    let user_value = match body.get("user") {
        Some(user) if user.is_object() => user.clone(),
        _ => body,
    };
    let user: RemoteUser = serde_json::from_value(user_value)?;
    Ok(user.into())
}

/// Total from a `Content-Range` header such as `0-24/57` or `*/0`.
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

fn api_error(status: StatusCode, body: &str) -> BackendError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|key| value.get(key).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                body.trim().to_string()
            }
        });

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Unauthorized(message),
        _ => BackendError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn content_range_total_is_parsed() {
        assert_eq!(parse_content_range_total("0-24/57"), Some(57));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("0-24/*"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }

    #[test]
    fn signup_user_is_found_in_either_shape() {
        let bare = json!({ "id": "u1", "email": "a@b.co" });
        let wrapped = json!({ "access_token": "t", "user": { "id": "u2", "email": "c@d.co" } });
        assert_eq!(user_from_signup(bare).unwrap().id, "u1");
        assert_eq!(user_from_signup(wrapped).unwrap().email, "c@d.co");
    }

    #[test]
    fn joined_summary_rows_flatten_customer() {
        let rows: Vec<RemoteBillSummary> = serde_json::from_value(json!([
            {
                "id": "b1",
                "invoice_number": "INV-7",
                "total": 240.0,
                "created_at": "2026-03-01T10:15:00.123456+00:00",
                "customers": { "name": "Ravi", "mobile_number": "98765" }
            },
            {
                "id": "b2",
                "invoice_number": "INV-8",
                "total": 10,
                "created_at": "2026-03-02T00:00:00+00:00",
                "customers": null
            }
        ]))
        .unwrap();
        let summaries: Vec<BillSummary> = rows.into_iter().map(BillSummary::from).collect();
        assert_eq!(summaries[0].customer_name, "Ravi");
        assert_eq!(summaries[0].customer_mobile.as_deref(), Some("98765"));
        assert_eq!(summaries[1].customer_name, "");
        assert_eq!(summaries[1].total, 10.0);
    }

    #[test]
    fn list_params_carry_filters() {
        let since = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let params = bill_list_params(&BillQuery {
            created_since: Some(since),
            limit: Some(5),
        });
        assert!(params.contains(&("order", "created_at.desc".to_string())));
        assert!(params.contains(&("created_at", "gte.2026-01-01T00:00:00+00:00".to_string())));
        assert!(params.contains(&("limit", "5".to_string())));
        assert_eq!(bill_list_params(&BillQuery::default()).len(), 2);
    }

    #[test]
    fn api_errors_pick_message_and_map_auth_failures() {
        let err = api_error(StatusCode::BAD_REQUEST, r#"{"msg":"Invalid login credentials"}"#);
        assert!(matches!(err, BackendError::Api { status: 400, ref message } if message == "Invalid login credentials"));
        let err = api_error(StatusCode::UNAUTHORIZED, "");
        assert!(matches!(err, BackendError::Unauthorized(ref m) if m == "Unauthorized"));
    }

    #[test]
    fn urls_are_built_from_trimmed_base() {
        let backend = RemoteBackend::new("https://example.test/", "anon");
        assert_eq!(backend.rest_url("bills"), "https://example.test/rest/v1/bills");
        assert_eq!(
            backend.public_url("signatures", "signatures/u1.png"),
            "https://example.test/storage/v1/object/public/signatures/signatures/u1.png"
        );
    }
}
