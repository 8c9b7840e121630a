use billbook::billing::draft::CustomerChoice;
use billbook::commands::bills::{self, DateFilter};
use billbook::commands::{auth, customers, dashboard, profile};
use billbook::db::Database;
use billbook::models::{BillSummary, NewCustomer, PaymentMode, ProfileUpdate, Session, Settings};
use billbook::services::state::AppState;
use chrono::{Datelike, Local};
use tempfile::TempDir;

const EMAIL: &str = "owner@example.com";
const PASSWORD: &str = "secret-pass";

struct Harness {
    state: AppState,
    session: Session,
    dir: TempDir,
}

/// Signs in through the backend directly so the test never writes a session
/// into the OS keychain.
async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(&dir.path().join("billbook.sqlite")).unwrap();
    let state = AppState::new(db, Settings::default(), dir.path().to_path_buf()).unwrap();
    auth::sign_up(EMAIL, PASSWORD, &state).await.unwrap();
    let session = state
        .backend()
        .unwrap()
        .auth
        .sign_in(EMAIL, PASSWORD)
        .await
        .unwrap();
    Harness { state, session, dir }
}

async fn search(h: &Harness, term: &str) -> Vec<BillSummary> {
    bills::list_bills(DateFilter::Today, Some(term), &h.session, &h.state)
        .await
        .unwrap()
}

fn new_customer(name: &str, mobile: &str) -> CustomerChoice {
    CustomerChoice::New(NewCustomer {
        name: name.into(),
        mobile_number: Some(mobile.into()),
        address: Some("4 Beach Road\nThoothukudi".into()),
        ..NewCustomer::default()
    })
}

#[tokio::test]
async fn submitted_bill_reads_back_with_same_totals_and_item_order() {
    let h = harness().await;

    let mut draft = bills::start_bill(&h.session, &h.state).await.unwrap();
    assert_eq!(draft.invoice_number, format!("INV-{}-0001", Local::now().year()));
    draft.set_customer(new_customer("Ravi Kumar", "98765 43210"));
    draft.push_item("Cement bag", 2, 100.0);
    draft.push_item("Sand", 1, 50.0);
    assert!(draft.set_discount(10.0).is_none());
    assert!(draft.set_amount_received(200.0).is_none());
    draft.set_payment_mode(PaymentMode::Upi);

    let created = bills::submit_bill(&draft, &h.session, &h.state).await.unwrap();
    assert_eq!(created.bill.sub_total, 250.0);
    assert_eq!(created.bill.total, 240.0);
    assert_eq!(created.bill.balance, 40.0);
    assert_eq!(created.bill.created_by, h.session.user.id);

    let detail = bills::get_bill_detail(&created.bill.id, &h.session, &h.state)
        .await
        .unwrap();
    assert_eq!(detail.bill, created.bill);
    assert_eq!(detail.customer.name, "Ravi Kumar");
    let names: Vec<&str> = detail.items.iter().map(|i| i.item_name.as_str()).collect();
    assert_eq!(names, ["Cement bag", "Sand"]);
    assert_eq!(detail.items[0].amount, 200.0);
    assert_eq!(detail.bill.payment_mode, PaymentMode::Upi);
}

#[tokio::test]
async fn invalid_draft_is_not_persisted() {
    let h = harness().await;
    let draft = bills::start_bill(&h.session, &h.state).await.unwrap();

    let err = bills::submit_bill(&draft, &h.session, &h.state).await.unwrap_err();
    assert!(err.to_string().contains("Customer name is required"));
    let listed = bills::list_bills(DateFilter::All, None, &h.session, &h.state)
        .await
        .unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn non_finite_discount_leaves_no_records() {
    let h = harness().await;
    for discount in [f64::NAN, f64::INFINITY] {
        let mut draft = bills::start_bill(&h.session, &h.state).await.unwrap();
        draft.set_customer(new_customer("Ravi Kumar", "98765 43210"));
        draft.push_item("Cement", 2, 100.0);
        draft.set_discount(discount);

        let err = bills::submit_bill(&draft, &h.session, &h.state).await.unwrap_err();
        assert!(err.to_string().contains("Discount must be a finite amount"));
    }
    assert!(customers::list_customers(&h.session, &h.state).await.unwrap().is_empty());
    assert!(bills::list_bills(DateFilter::All, None, &h.session, &h.state)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn preview_does_not_take_an_invoice_number() {
    let h = harness().await;
    let mut preview = bills::start_preview();
    assert_eq!(preview.invoice_number, bills::UNNUMBERED_INVOICE);
    preview.set_customer(new_customer("Ravi", "12345"));
    preview.push_item("Cement bag", 1, 100.0);
    let text = bills::preview_draft(&preview, &h.session, &h.state).await.unwrap();
    assert!(text.contains(bills::UNNUMBERED_INVOICE));

    let draft = bills::start_bill(&h.session, &h.state).await.unwrap();
    assert_eq!(draft.invoice_number, format!("INV-{}-0001", Local::now().year()));
}

#[tokio::test]
async fn listing_is_newest_first_and_searchable() {
    let h = harness().await;

    let mut first = bills::start_bill(&h.session, &h.state).await.unwrap();
    first.set_customer(new_customer("Ravi Kumar", "98765 43210"));
    first.push_item("Cement bag", 1, 300.0);
    let first = bills::submit_bill(&first, &h.session, &h.state).await.unwrap();

    let asha = customers::add_customer(
        NewCustomer {
            name: "Asha".into(),
            mobile_number: Some("90000 11111".into()),
            ..NewCustomer::default()
        },
        &h.session,
        &h.state,
    )
    .await
    .unwrap();
    let mut second = bills::start_bill(&h.session, &h.state).await.unwrap();
    second.set_customer(CustomerChoice::Existing {
        id: asha.id.clone(),
        name: asha.name.clone(),
    });
    second.push_item("Bricks", 100, 8.5);
    let second = bills::submit_bill(&second, &h.session, &h.state).await.unwrap();

    let all = bills::list_bills(DateFilter::All, None, &h.session, &h.state)
        .await
        .unwrap();
    let numbers: Vec<&str> = all.iter().map(|b| b.invoice_number.as_str()).collect();
    assert_eq!(numbers, [second.bill.invoice_number.as_str(), first.bill.invoice_number.as_str()]);

    assert_eq!(search(&h, "RAVI").await.len(), 1);
    assert_eq!(search(&h, "11111").await[0].customer_name, "Asha");
    assert_eq!(search(&h, "0001").await[0].id, first.bill.id);
    assert!(search(&h, "nobody").await.is_empty());

    let listed_customers = customers::list_customers(&h.session, &h.state).await.unwrap();
    let names: Vec<&str> = listed_customers.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Asha", "Ravi Kumar"]);
}

#[tokio::test]
async fn dashboard_counts_and_buckets_this_years_bills() {
    let h = harness().await;
    for (name, price) in [("Ravi", 100.0), ("Asha", 40.0)] {
        let mut draft = bills::start_bill(&h.session, &h.state).await.unwrap();
        draft.set_customer(new_customer(name, "12345"));
        draft.push_item("Service", 1, price);
        bills::submit_bill(&draft, &h.session, &h.state).await.unwrap();
    }

    let now = Local::now();
    let stats = dashboard::get_dashboard_stats(now, &h.session, &h.state)
        .await
        .unwrap();
    assert_eq!(stats.total_bills, 2);
    assert_eq!(stats.revenue_year, 140.0);
    assert_eq!(stats.chart_months.len(), 12);
    assert_eq!(stats.chart_months[0], "Jan");
    assert_eq!(stats.monthly_revenue[now.month0() as usize], 140.0);
    assert_eq!(stats.recent_bills.len(), 2);
}

#[tokio::test]
async fn profile_defaults_then_saves_and_prints_on_pdf() {
    let h = harness().await;

    let initial = profile::get_profile(&h.session, &h.state).await.unwrap();
    assert_eq!(initial.company_name, "GIGEO Enterprises");

    let saved = profile::save_profile(
        ProfileUpdate {
            company_name: Some("Asha Traders".into()),
            gstin: Some("33ABCDE1234F1Z5".into()),
            ..ProfileUpdate::default()
        },
        &h.session,
        &h.state,
    )
    .await
    .unwrap();
    assert_eq!(saved.company_name, "Asha Traders");

    let signature = h.dir.path().join("sign.png");
    std::fs::write(&signature, b"\x89PNG\r\n\x1a\n").unwrap();
    let with_signature = profile::upload_signature(&signature, &h.session, &h.state)
        .await
        .unwrap();
    let url = with_signature.signature_url.unwrap();
    assert!(url.starts_with("file://"));
    assert!(url.ends_with(&format!("signatures/{}.png", h.session.user.id)));

    let mut draft = bills::start_bill(&h.session, &h.state).await.unwrap();
    draft.set_customer(new_customer("Ravi", "12345"));
    draft.push_item("Cement bag", 2, 100.0);

    let preview = bills::preview_draft(&draft, &h.session, &h.state).await.unwrap();
    assert!(preview.contains("Asha Traders"));
    assert!(preview.contains("Tax Invoice"));

    let created = bills::submit_bill(&draft, &h.session, &h.state).await.unwrap();
    let out_dir = h.dir.path().join("out");
    std::fs::create_dir_all(&out_dir).unwrap();
    let path = bills::export_bill_pdf(&created.bill.id, Some(&out_dir), false, &h.session, &h.state)
        .await
        .unwrap();
    assert_eq!(
        path.file_name().unwrap().to_str().unwrap(),
        format!("invoice-{}.pdf", created.bill.invoice_number)
    );
    let bytes = std::fs::read(&path).unwrap();
    assert!(bytes.starts_with(b"%PDF"));
}

#[tokio::test]
async fn unknown_bill_and_signed_out_session_are_rejected() {
    let h = harness().await;

    let err = bills::get_bill_detail("missing", &h.session, &h.state)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Bill not found");

    let user = auth::current_user(&h.session, &h.state).await.unwrap();
    assert_eq!(user.email, EMAIL);

    h.state
        .backend()
        .unwrap()
        .auth
        .sign_out(&h.session)
        .await
        .unwrap();
    assert!(auth::current_user(&h.session, &h.state).await.is_err());
    assert!(bills::list_bills(DateFilter::All, None, &h.session, &h.state)
        .await
        .is_err());
}

#[tokio::test]
async fn credentials_are_checked() {
    let h = harness().await;
    let backend = h.state.backend().unwrap();

    assert!(auth::sign_up(EMAIL, PASSWORD, &h.state).await.is_err());
    assert!(auth::sign_up("someone@example.com", "123", &h.state).await.is_err());
    assert!(backend.auth.sign_in(EMAIL, "wrong-pass").await.is_err());
    assert!(backend.auth.sign_in("OWNER@example.com", PASSWORD).await.is_ok());
}
