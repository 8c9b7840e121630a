use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_COMPANY_NAME: &str = "GIGEO Enterprises";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
}

/// Authenticated context handed to every operation that touches the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user: User,
    pub access_token: String,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub full_name: Option<String>,
    pub company_name: String,
    pub company_address: Option<String>,
    pub gstin: Option<String>,
    pub signature_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub company_name: Option<String>,
    pub company_address: Option<String>,
    pub gstin: Option<String>,
    pub signature_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub mobile_number: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    pub mobile_number: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    #[default]
    Cash,
    Upi,
    Card,
    BankTransfer,
}

impl PaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Cash => "cash",
            PaymentMode::Upi => "upi",
            PaymentMode::Card => "card",
            PaymentMode::BankTransfer => "bank_transfer",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PaymentMode::Cash => "Cash",
            PaymentMode::Upi => "UPI",
            PaymentMode::Card => "Card",
            PaymentMode::BankTransfer => "Bank Transfer",
        }
    }
}

impl fmt::Display for PaymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "cash" => Ok(PaymentMode::Cash),
            "upi" => Ok(PaymentMode::Upi),
            "card" => Ok(PaymentMode::Card),
            "bank_transfer" => Ok(PaymentMode::BankTransfer),
            other => Err(format!("Unknown payment mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    pub id: String,
    pub invoice_number: String,
    pub customer_id: String,
    pub sub_total: f64,
    pub discount: f64,
    pub total: f64,
    pub payment_mode: PaymentMode,
    pub amount_received: f64,
    pub balance: f64,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for the `bills` table; ids and timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBill {
    pub invoice_number: String,
    pub customer_id: String,
    pub sub_total: f64,
    pub discount: f64,
    pub total: f64,
    pub payment_mode: PaymentMode,
    pub amount_received: f64,
    pub balance: f64,
    pub created_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillItem {
    pub id: String,
    pub bill_id: String,
    pub item_name: String,
    pub quantity: u32,
    pub price: f64,
    pub amount: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillSummary {
    pub id: String,
    pub invoice_number: String,
    pub total: f64,
    pub created_at: DateTime<Utc>,
    pub customer_name: String,
    pub customer_mobile: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillDetail {
    pub bill: Bill,
    pub customer: Customer,
    pub items: Vec<BillItem>,
}

/// Row selection for bill listings, newest first.
#[derive(Debug, Clone, Default)]
pub struct BillQuery {
    pub created_since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_bills: u64,
    pub revenue_year: f64,
    pub chart_months: Vec<String>,
    pub monthly_revenue: Vec<f64>,
    pub recent_bills: Vec<BillSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Local,
    Remote,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(BackendKind::Local),
            "remote" => Ok(BackendKind::Remote),
            other => Err(format!("Unknown backend: {}", other)),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Local => f.write_str("local"),
            BackendKind::Remote => f.write_str("remote"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub backend: BackendKind,
    pub remote_url: Option<String>,
    pub remote_api_key: Option<String>,
    pub default_company_name: String,
    pub currency_symbol: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            backend: BackendKind::Local,
            remote_url: None,
            remote_api_key: None,
            default_company_name: DEFAULT_COMPANY_NAME.to_string(),
            currency_symbol: "₹".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_mode_parses_form_values_and_labels() {
        assert_eq!("bank_transfer".parse::<PaymentMode>(), Ok(PaymentMode::BankTransfer));
        assert_eq!("Bank Transfer".parse::<PaymentMode>(), Ok(PaymentMode::BankTransfer));
        assert_eq!("UPI".parse::<PaymentMode>(), Ok(PaymentMode::Upi));
        assert!("cheque".parse::<PaymentMode>().is_err());
        assert_eq!(PaymentMode::Upi.label(), "UPI");
    }

    #[test]
    fn payment_mode_serializes_as_snake_case() {
        let json = serde_json::to_string(&PaymentMode::BankTransfer).unwrap();
        assert_eq!(json, "\"bank_transfer\"");
    }
}
