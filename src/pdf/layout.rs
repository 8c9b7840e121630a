//! Renderer-independent description of a printed invoice.

use chrono::{Local, NaiveDate};
use serde::Serialize;

use crate::billing::draft::BillDraft;
use crate::billing::{BillTotals, LineItem};
use crate::models::{BillDetail, PaymentMode, Profile};
use crate::utils::format_money;

pub const A4_WIDTH_MM: f32 = 210.0;
pub const A4_HEIGHT_MM: f32 = 297.0;
pub const PAGE_PADDING_PT: f32 = 30.0;

pub const BODY_SIZE: f32 = 10.0;
pub const COMPANY_SIZE: f32 = 13.0;
pub const TITLE_SIZE: f32 = 14.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageSpec {
    pub width_mm: f32,
    pub height_mm: f32,
    pub padding_pt: f32,
}

impl PageSpec {
    pub fn a4() -> Self {
        PageSpec {
            width_mm: A4_WIDTH_MM,
            height_mm: A4_HEIGHT_MM,
            padding_pt: PAGE_PADDING_PT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextLine {
    pub text: String,
    pub size: f32,
    pub bold: bool,
}

impl TextLine {
    pub fn body(text: impl Into<String>) -> Self {
        TextLine {
            text: text.into(),
            size: BODY_SIZE,
            bold: false,
        }
    }

    pub fn bold(text: impl Into<String>) -> Self {
        TextLine {
            bold: true,
            ..TextLine::body(text)
        }
    }

    pub fn sized(text: impl Into<String>, size: f32, bold: bool) -> Self {
        TextLine {
            text: text.into(),
            size,
            bold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TotalLine {
    pub label: String,
    pub amount: String,
    pub emphasis: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Block {
    Columns {
        left: Vec<TextLine>,
        right: Vec<TextLine>,
        rule_below: bool,
    },
    Title(TextLine),
    Table {
        headers: Vec<String>,
        /// Fractions of the content width, one per column.
        widths: Vec<f32>,
        rows: Vec<Vec<String>>,
    },
    Totals(Vec<TotalLine>),
    Note(TextLine),
    Signature {
        left: Vec<TextLine>,
        right: Vec<TextLine>,
        image_url: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceDocument {
    pub title: String,
    pub file_name: String,
    pub page: PageSpec,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone)]
pub struct BillTo {
    pub name: String,
    pub address: Option<String>,
    pub mobile_number: Option<String>,
}

/// Everything printed on an invoice, whether it is stored or still a draft.
#[derive(Debug, Clone)]
pub struct InvoiceData {
    pub invoice_number: String,
    pub date: NaiveDate,
    pub bill_to: BillTo,
    pub items: Vec<LineItem>,
    pub totals: BillTotals,
    pub payment_mode: PaymentMode,
}

impl InvoiceData {
    pub fn from_detail(detail: &BillDetail) -> Self {
        let bill = &detail.bill;
        InvoiceData {
            invoice_number: bill.invoice_number.clone(),
            date: bill.created_at.with_timezone(&Local).date_naive(),
            bill_to: BillTo {
                name: detail.customer.name.clone(),
                address: detail.customer.address.clone(),
                mobile_number: detail.customer.mobile_number.clone(),
            },
            items: detail.items.iter().map(LineItem::from).collect(),
            totals: BillTotals {
                sub_total: bill.sub_total,
                discount: bill.discount,
                total: bill.total,
                amount_received: bill.amount_received,
                balance: bill.balance,
            },
            payment_mode: bill.payment_mode,
        }
    }

    pub fn from_draft(draft: &BillDraft, customer_address: Option<String>, customer_mobile: Option<String>, date: NaiveDate) -> Self {
        InvoiceData {
            invoice_number: draft.invoice_number.clone(),
            date,
            bill_to: BillTo {
                name: draft.customer.display_name().to_string(),
                address: customer_address,
                mobile_number: customer_mobile,
            },
            items: draft.items().to_vec(),
            totals: draft.totals(),
            payment_mode: draft.payment_mode,
        }
    }
}

/// Lays out an invoice. `currency` prefixes every amount (e.g. `Rs.`).
pub fn build_invoice(profile: &Profile, data: &InvoiceData, currency: &str) -> InvoiceDocument {
    let money = |value: f64| format_money(currency, value);
    let mut blocks = Vec::new();

    let mut company = vec![TextLine::sized(&profile.company_name, COMPANY_SIZE, true)];
    if let Some(address) = &profile.company_address {
        company.extend(address.lines().filter(|l| !l.trim().is_empty()).map(TextLine::body));
    }
    if let Some(gstin) = &profile.gstin {
        company.push(TextLine::body(format!("GSTIN: {}", gstin)));
    }
    let mut owner = Vec::new();
    if let Some(full_name) = &profile.full_name {
        owner.push(TextLine::body(full_name.clone()));
    }
    blocks.push(Block::Columns {
        left: company,
        right: owner,
        rule_below: true,
    });

    blocks.push(Block::Title(TextLine::sized("Tax Invoice", TITLE_SIZE, true)));

    let mut bill_to = vec![TextLine::bold("Bill To:"), TextLine::body(&data.bill_to.name)];
    if let Some(address) = &data.bill_to.address {
        bill_to.extend(address.lines().filter(|l| !l.trim().is_empty()).map(TextLine::body));
    }
    if let Some(mobile) = &data.bill_to.mobile_number {
        bill_to.push(TextLine::body(format!("Mobile: {}", mobile)));
    }
    blocks.push(Block::Columns {
        left: bill_to,
        right: vec![
            TextLine::body(format!("Invoice #{}", data.invoice_number)),
            TextLine::body(format!("Date: {}", data.date.format("%d/%m/%Y"))),
        ],
        rule_below: false,
    });

    let rows = data
        .items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            vec![
                (index + 1).to_string(),
                item.item_name.clone(),
                item.quantity.to_string(),
                money(item.price),
                money(item.amount),
            ]
        })
        .collect();
    blocks.push(Block::Table {
        headers: ["#", "Item", "Quantity", "Price/unit", "Amount"]
            .iter()
            .map(|h| h.to_string())
            .collect(),
        widths: vec![0.08, 0.40, 0.14, 0.19, 0.19],
        rows,
    });

    let totals = &data.totals;
    let line = |label: &str, value: f64, emphasis: bool| TotalLine {
        label: label.to_string(),
        amount: money(value),
        emphasis,
    };
    blocks.push(Block::Totals(vec![
        line("Sub Total:", totals.sub_total, false),
        line("Discount:", totals.discount, false),
        line("Total:", totals.total, true),
        line("Amount Received:", totals.amount_received, false),
        line("Balance:", totals.balance, false),
    ]));

    blocks.push(Block::Note(TextLine::body(format!(
        "Payment Mode: {}",
        data.payment_mode.label()
    ))));

    blocks.push(Block::Signature {
        left: vec![TextLine::body("Authorized Signatory.")],
        right: vec![TextLine::body(format!("For {}", profile.company_name))],
        image_url: profile.signature_url.clone(),
    });

    InvoiceDocument {
        title: format!("Invoice #{}", data.invoice_number),
        file_name: format!("invoice-{}.pdf", data.invoice_number),
        page: PageSpec::a4(),
        blocks,
    }
}
