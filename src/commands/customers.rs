use anyhow::{anyhow, Result};
use tracing::info;

use crate::models::{Customer, NewCustomer, Session};
use crate::services::state::AppState;
use crate::utils::non_empty;

pub async fn add_customer(customer: NewCustomer, session: &Session, state: &AppState) -> Result<Customer> {
    let customer = normalize(customer)?;
    let backend = state.backend()?;
    let created = backend.customers.insert_customer(session, &customer).await?;
    info!(customer_id = %created.id, "customer added");
    Ok(created)
}

pub async fn list_customers(session: &Session, state: &AppState) -> Result<Vec<Customer>> {
    let backend = state.backend()?;
    Ok(backend.customers.list_customers(session).await?)
}

pub async fn get_customer(id: &str, session: &Session, state: &AppState) -> Result<Customer> {
    let backend = state.backend()?;
    backend
        .customers
        .get_customer(session, id)
        .await?
        .ok_or_else(|| anyhow!("Customer not found"))
}

/// Trims form input and drops blank optional fields.
pub(crate) fn normalize(customer: NewCustomer) -> Result<NewCustomer> {
    let name = customer.name.trim().to_string();
    if name.is_empty() {
        return Err(anyhow!("Customer name is required"));
    }
    Ok(NewCustomer {
        name,
        mobile_number: non_empty(customer.mobile_number),
        email: non_empty(customer.email),
        address: non_empty(customer.address),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_and_drops_blank_fields() {
        let customer = normalize(NewCustomer {
            name: "  Ravi ".into(),
            mobile_number: Some(" 98765 ".into()),
            email: Some("".into()),
            address: None,
        })
        .unwrap();
        assert_eq!(customer.name, "Ravi");
        assert_eq!(customer.mobile_number.as_deref(), Some("98765"));
        assert_eq!(customer.email, None);
    }

    #[test]
    fn normalize_requires_a_name() {
        assert!(normalize(NewCustomer::default()).is_err());
    }
}
