use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Local, Months, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::billing::check_consistency;
use crate::billing::draft::{BillDraft, CustomerChoice};
use crate::commands::customers::normalize;
use crate::commands::profile::get_profile;
use crate::models::{BillDetail, BillQuery, BillSummary, Customer, Session};
use crate::pdf::{build_invoice, DocumentRenderer, InvoiceData, PdfRenderer, TextRenderer, PDF_CURRENCY};
use crate::services::state::AppState;

/// Creation-date window for bill listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateFilter {
    #[default]
    All,
    Today,
    Week,
    Month,
}

impl DateFilter {
    /// Lower bound for `created_at`, relative to `now`.
    pub fn since(&self, now: DateTime<Local>) -> Option<DateTime<Utc>> {
        let start = match self {
            DateFilter::All => return None,
            DateFilter::Today => now
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
                .unwrap_or(now),
            DateFilter::Week => now - Duration::days(7),
            DateFilter::Month => now
                .checked_sub_months(Months::new(1))
                .unwrap_or(now - Duration::days(30)),
        };
        Some(start.with_timezone(&Utc))
    }
}

impl FromStr for DateFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(DateFilter::All),
            "today" => Ok(DateFilter::Today),
            "week" => Ok(DateFilter::Week),
            "month" => Ok(DateFilter::Month),
            other => Err(format!("Unknown date filter: {}", other)),
        }
    }
}

impl fmt::Display for DateFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DateFilter::All => "all",
            DateFilter::Today => "today",
            DateFilter::Week => "week",
            DateFilter::Month => "month",
        })
    }
}

/// Invoice label for drafts that are only previewed.
pub const UNNUMBERED_INVOICE: &str = "DRAFT";

/// A fresh draft numbered by the backend's invoice generator.
pub async fn start_bill(session: &Session, state: &AppState) -> Result<BillDraft> {
    let backend = state.backend()?;
    let invoice_number = backend.invoice_numbers.next_invoice_number(session).await?;
    debug!(%invoice_number, "draft started");
    Ok(BillDraft::new(invoice_number))
}

/// A draft for previewing only. It carries no invoice number, so nothing is
/// taken from the counter.
pub fn start_preview() -> BillDraft {
    BillDraft::new(UNNUMBERED_INVOICE)
}

/// Persists a draft: customer (when new), then the bill, then its items.
/// A failure part way leaves the earlier records in place.
pub async fn submit_bill(draft: &BillDraft, session: &Session, state: &AppState) -> Result<BillDetail> {
    draft.validate()?;
    let backend = state.backend()?;

    let customer: Customer = match &draft.customer {
        CustomerChoice::Existing { id, .. } => backend
            .customers
            .get_customer(session, id)
            .await?
            .ok_or_else(|| anyhow!("Customer not found"))?,
        CustomerChoice::New(details) => {
            let details = normalize(details.clone())?;
            backend.customers.insert_customer(session, &details).await?
        }
    };

    let new_bill = draft.to_new_bill(&customer.id, &session.user.id);
    let bill = backend
        .bills
        .insert_bill(session, &new_bill)
        .await
        .context("Error creating bill")?;
    let items = backend
        .bill_items
        .insert_items(session, &bill.id, draft.items())
        .await
        .context("Error saving bill items")?;

    info!(
        bill_id = %bill.id,
        invoice_number = %bill.invoice_number,
        items = items.len(),
        total = bill.total,
        "bill created"
    );
    Ok(BillDetail { bill, customer, items })
}

pub async fn list_bills(
    filter: DateFilter,
    search: Option<&str>,
    session: &Session,
    state: &AppState,
) -> Result<Vec<BillSummary>> {
    let backend = state.backend()?;
    let query = BillQuery {
        created_since: filter.since(Local::now()),
        limit: None,
    };
    let bills = backend.bills.list_bills(session, &query).await?;
    let term = search.map(str::trim).filter(|s| !s.is_empty());
    Ok(match term {
        Some(term) => bills.into_iter().filter(|b| matches_search(b, term)).collect(),
        None => bills,
    })
}

/// Invoice number and customer name match case-insensitively; mobile
/// numbers match as a plain substring.
pub fn matches_search(bill: &BillSummary, term: &str) -> bool {
    let needle = term.to_lowercase();
    bill.invoice_number.to_lowercase().contains(&needle)
        || bill.customer_name.to_lowercase().contains(&needle)
        || bill
            .customer_mobile
            .as_deref()
            .map(|mobile| mobile.contains(term))
            .unwrap_or(false)
}

pub async fn get_bill_detail(id: &str, session: &Session, state: &AppState) -> Result<BillDetail> {
    let backend = state.backend()?;
    let bill = backend
        .bills
        .get_bill(session, id)
        .await?
        .ok_or_else(|| anyhow!("Bill not found"))?;
    let customer = backend
        .customers
        .get_customer(session, &bill.customer_id)
        .await?
        .ok_or_else(|| anyhow!("Customer not found"))?;
    let items = backend.bill_items.items_for_bill(session, &bill.id).await?;

    for mismatch in check_consistency(&bill, &items) {
        warn!(
            bill_id = %bill.id,
            field = mismatch.field,
            stored = mismatch.stored,
            derived = mismatch.derived,
            "stored total disagrees with items"
        );
    }
    Ok(BillDetail { bill, customer, items })
}

/// Writes the invoice PDF and returns its path. `out` may be a file or an
/// existing directory; the default is `invoice-<number>.pdf` in the working
/// directory.
pub async fn export_bill_pdf(
    id: &str,
    out: Option<&Path>,
    open_after: bool,
    session: &Session,
    state: &AppState,
) -> Result<PathBuf> {
    let detail = get_bill_detail(id, session, state).await?;
    let profile = get_profile(session, state).await?;
    let document = build_invoice(&profile, &InvoiceData::from_detail(&detail), PDF_CURRENCY);
    let bytes = PdfRenderer.render(&document)?;

    let path = match out {
        Some(path) if path.is_dir() => path.join(&document.file_name),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(&document.file_name),
    };
    std::fs::write(&path, bytes).with_context(|| format!("Writing {}", path.display()))?;
    info!(path = %path.display(), "invoice exported");

    if open_after {
        open::that(&path).map_err(|e| anyhow!("Opening {}: {}", path.display(), e))?;
    }
    Ok(path)
}

/// Text rendering of an unsaved draft, dated today.
pub async fn preview_draft(draft: &BillDraft, session: &Session, state: &AppState) -> Result<String> {
    let profile = get_profile(session, state).await?;
    let settings = state.settings()?;
    let (address, mobile) = match &draft.customer {
        CustomerChoice::New(details) => (details.address.clone(), details.mobile_number.clone()),
        CustomerChoice::Existing { id, .. } => {
            let backend = state.backend()?;
            match backend.customers.get_customer(session, id).await? {
                Some(customer) => (customer.address, customer.mobile_number),
                None => (None, None),
            }
        }
    };
    let data = InvoiceData::from_draft(draft, address, mobile, Local::now().date_naive());
    let document = build_invoice(&profile, &data, &settings.currency_symbol);
    let bytes = TextRenderer::default().render(&document)?;
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn summary(invoice: &str, name: &str, mobile: Option<&str>) -> BillSummary {
        BillSummary {
            id: "b1".into(),
            invoice_number: invoice.into(),
            total: 100.0,
            created_at: Utc::now(),
            customer_name: name.into(),
            customer_mobile: mobile.map(String::from),
        }
    }

    #[test]
    fn search_matches_invoice_name_and_mobile() {
        let bill = summary("INV-2026-0007", "Ravi Kumar", Some("98765 43210"));
        assert!(matches_search(&bill, "inv-2026"));
        assert!(matches_search(&bill, "KUMAR"));
        assert!(matches_search(&bill, "43210"));
        assert!(!matches_search(&bill, "Asha"));
        assert!(!matches_search(&summary("INV-1", "Asha", None), "987"));
    }

    #[test]
    fn date_filters_compute_window_start() {
        let now = Local.with_ymd_and_hms(2026, 3, 9, 15, 30, 0).unwrap();
        assert_eq!(DateFilter::All.since(now), None);

        let today = DateFilter::Today.since(now).unwrap();
        assert_eq!(today.with_timezone(&Local).date_naive(), now.date_naive());
        assert!(today <= now.with_timezone(&Utc));

        let week = DateFilter::Week.since(now).unwrap();
        assert_eq!(now.with_timezone(&Utc) - week, Duration::days(7));

        let month = DateFilter::Month.since(now).unwrap().with_timezone(&Local);
        assert_eq!(month.date_naive(), chrono::NaiveDate::from_ymd_opt(2026, 2, 9).unwrap());
    }

    #[test]
    fn date_filter_parses_cli_values() {
        assert_eq!("Week".parse::<DateFilter>(), Ok(DateFilter::Week));
        assert!("year".parse::<DateFilter>().is_err());
    }
}
