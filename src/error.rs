use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Connection failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Backend error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("{0} not found")]
    NotFound(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("Unexpected response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Crypto error: {0}")]
    Crypto(String),
    #[error("Lock poisoned: {0}")]
    Lock(&'static str),
}

pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Error, PartialEq)]
pub enum DraftError {
    #[error("Customer name is required")]
    MissingCustomerName,
    #[error("A bill needs at least one item")]
    NoItems,
    #[error("Item {0} has no name")]
    MissingItemName(usize),
    #[error("Item {0} must have a quantity of at least 1")]
    InvalidQuantity(usize),
    #[error("Item {0} has an invalid price")]
    InvalidPrice(usize),
    #[error("Discount must be a finite amount of at least 0")]
    NegativeDiscount,
    #[error("Amount received must be a finite amount of at least 0")]
    NegativeAmountReceived,
    #[error("Invoice number is missing")]
    MissingInvoiceNumber,
    #[error("No item at position {0}")]
    NoSuchItem(usize),
}
