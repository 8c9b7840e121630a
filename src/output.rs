use colored::*;

use billbook::models::{BillDetail, BillSummary, Customer, DashboardStats, Profile, Settings, User};
use billbook::utils::format_money;

pub fn success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn failure(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

pub fn warning(message: &str) {
    eprintln!("{} {}", "!".yellow().bold(), message.yellow());
}

fn field<S: AsRef<str>>(label: &str, value: Option<S>) {
    let value = value.as_ref().map(|v| v.as_ref()).unwrap_or("-");
    println!("{:<18}{}", format!("{}:", label).bright_black(), value);
}

pub fn user(user: &User) {
    field("User", Some(&user.email));
    field("Id", Some(&user.id));
}

pub fn profile(profile: &Profile) {
    field("Company", Some(&profile.company_name));
    field("Full name", profile.full_name.as_deref());
    field("Address", profile.company_address.as_deref());
    field("GSTIN", profile.gstin.as_deref());
    field("Signature", profile.signature_url.as_deref());
}

pub fn customers(customers: &[Customer]) {
    if customers.is_empty() {
        println!("{}", "No customers yet.".bright_black());
        return;
    }
    for customer in customers {
        println!(
            "{}  {:<28} {:<16} {}",
            customer.id.bright_black(),
            customer.name.bold(),
            customer.mobile_number.as_deref().unwrap_or("-"),
            customer.email.as_deref().unwrap_or("")
        );
    }
}

pub fn customer(customer: &Customer) {
    field("Name", Some(&customer.name));
    field("Mobile", customer.mobile_number.as_deref());
    field("Email", customer.email.as_deref());
    field("Address", customer.address.as_deref());
    field("Id", Some(&customer.id));
}

pub fn bill_list(bills: &[BillSummary], currency: &str) {
    if bills.is_empty() {
        println!("{}", "No bills found.".bright_black());
        return;
    }
    for bill in bills {
        println!(
            "{}  {:<16} {:<24} {:>14}  {}",
            bill.created_at.format("%d/%m/%Y").to_string().bright_black(),
            bill.invoice_number.bold(),
            bill.customer_name,
            format_money(currency, bill.total),
            bill.id.bright_black()
        );
    }
}

pub fn bill_detail(detail: &BillDetail, currency: &str) {
    let bill = &detail.bill;
    println!("{} {}", "Invoice".bold(), bill.invoice_number.bold());
    field("Date", Some(&bill.created_at.format("%d/%m/%Y").to_string()));
    field("Customer", Some(&detail.customer.name));
    field("Mobile", detail.customer.mobile_number.as_deref());
    field("Payment mode", Some(bill.payment_mode.label()));
    println!();
    for (index, item) in detail.items.iter().enumerate() {
        println!(
            "{:>3}. {:<28} {:>5} x {:>12} = {:>14}",
            index + 1,
            item.item_name,
            item.quantity,
            format_money(currency, item.price),
            format_money(currency, item.amount)
        );
    }
    println!();
    let money = |value: f64| format_money(currency, value);
    field("Sub total", Some(&money(bill.sub_total)));
    field("Discount", Some(&money(bill.discount)));
    println!("{:<18}{}", "Total:".bold(), money(bill.total).bold());
    field("Received", Some(&money(bill.amount_received)));
    field("Balance", Some(&money(bill.balance)));
}

pub fn dashboard(stats: &DashboardStats, currency: &str) {
    field("Total bills", Some(&stats.total_bills.to_string()));
    field("Revenue (year)", Some(&format_money(currency, stats.revenue_year)));
    println!();
    let peak = stats.monthly_revenue.iter().cloned().fold(0.0, f64::max);
    for (month, revenue) in stats.chart_months.iter().zip(&stats.monthly_revenue) {
        let width = if peak > 0.0 { (revenue / peak * 30.0).round() as usize } else { 0 };
        println!(
            "{} {:<30} {}",
            month.bright_black(),
            "█".repeat(width).green(),
            format_money(currency, *revenue)
        );
    }
    println!();
    println!("{}", "Recent bills".bold());
    bill_list(&stats.recent_bills, currency);
}

pub fn settings(settings: &Settings) {
    field("Backend", Some(&settings.backend.to_string()));
    field("Remote URL", settings.remote_url.as_deref());
    field(
        "Remote API key",
        Some(if settings.remote_api_key.is_some() { "(stored)" } else { "-" }),
    );
    field("Company name", Some(&settings.default_company_name));
    field("Currency", Some(&settings.currency_symbol));
}
