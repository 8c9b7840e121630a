//! Bill arithmetic.
//!
//! Amounts are plain `f64`; nothing here rounds. Display code formats to two
//! decimals, so callers comparing figures must allow for accumulated
//! floating point error.

pub mod draft;

use serde::{Deserialize, Serialize};

use crate::models::{Bill, BillItem};

/// Tolerance used when comparing stored figures against re-derived ones.
pub const AMOUNT_EPSILON: f64 = 1e-6;

/// A bill line under construction. `amount` always equals `quantity * price`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub item_name: String,
    pub quantity: u32,
    pub price: f64,
    pub amount: f64,
}

impl LineItem {
    pub fn new(item_name: impl Into<String>, quantity: u32, price: f64) -> Self {
        let mut item = LineItem {
            item_name: item_name.into(),
            quantity,
            price,
            amount: 0.0,
        };
        recompute_amount(&mut item);
        item
    }

    pub fn blank() -> Self {
        LineItem::new("", 1, 0.0)
    }

    pub fn set_quantity(&mut self, quantity: u32) {
        self.quantity = quantity;
        recompute_amount(self);
    }

    pub fn set_price(&mut self, price: f64) {
        self.price = price;
        recompute_amount(self);
    }
}

impl From<&BillItem> for LineItem {
    fn from(item: &BillItem) -> Self {
        LineItem {
            item_name: item.item_name.clone(),
            quantity: item.quantity,
            price: item.price,
            amount: item.amount,
        }
    }
}

/// Anything carrying a line amount that contributes to a sub-total.
pub trait Priced {
    fn amount(&self) -> f64;
}

impl Priced for LineItem {
    fn amount(&self) -> f64 {
        self.amount
    }
}

impl Priced for BillItem {
    fn amount(&self) -> f64 {
        self.amount
    }
}

pub fn recompute_amount(item: &mut LineItem) {
    item.amount = f64::from(item.quantity) * item.price;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BillTotals {
    pub sub_total: f64,
    pub discount: f64,
    pub total: f64,
    pub amount_received: f64,
    pub balance: f64,
}

/// Derives sub-total, total and balance. Inputs are not validated: a discount
/// larger than the sub-total simply yields a negative total.
pub fn derive_totals<T: Priced>(items: &[T], discount: f64, amount_received: f64) -> BillTotals {
    let sub_total: f64 = items.iter().map(Priced::amount).sum();
    let total = sub_total - discount;
    let balance = total - amount_received;
    BillTotals {
        sub_total,
        discount,
        total,
        amount_received,
        balance,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    pub field: &'static str,
    pub stored: f64,
    pub derived: f64,
}

/// Re-derives a stored bill's figures from its items and lists the fields that disagree.
pub fn check_consistency(bill: &Bill, items: &[BillItem]) -> Vec<Mismatch> {
    let mut mismatches = Vec::new();

    for item in items {
        let derived = f64::from(item.quantity) * item.price;
        if !approx_eq(item.amount, derived) {
            mismatches.push(Mismatch {
                field: "amount",
                stored: item.amount,
                derived,
            });
        }
    }

    let totals = derive_totals(items, bill.discount, bill.amount_received);
    let pairs = [
        ("sub_total", bill.sub_total, totals.sub_total),
        ("total", bill.total, totals.total),
        ("balance", bill.balance, totals.balance),
    ];
    for (field, stored, derived) in pairs {
        if !approx_eq(stored, derived) {
            mismatches.push(Mismatch {
                field,
                stored,
                derived,
            });
        }
    }
    mismatches
}

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= AMOUNT_EPSILON * a.abs().max(b.abs()).max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaymentMode;
    use chrono::Utc;

    fn stored_item(quantity: u32, price: f64) -> BillItem {
        BillItem {
            id: "i".into(),
            bill_id: "b".into(),
            item_name: "Widget".into(),
            quantity,
            price,
            amount: f64::from(quantity) * price,
            created_at: Utc::now(),
        }
    }

    fn stored_bill(sub_total: f64, discount: f64, amount_received: f64) -> Bill {
        Bill {
            id: "b".into(),
            invoice_number: "INV-2026-0001".into(),
            customer_id: "c".into(),
            sub_total,
            discount,
            total: sub_total - discount,
            payment_mode: PaymentMode::Cash,
            amount_received,
            balance: sub_total - discount - amount_received,
            created_by: "u".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn derives_totals_for_worked_example() {
        let items = vec![LineItem::new("A", 2, 100.0), LineItem::new("B", 1, 50.0)];
        let totals = derive_totals(&items, 10.0, 200.0);
        assert_eq!(totals.sub_total, 250.0);
        assert_eq!(totals.total, 240.0);
        assert_eq!(totals.balance, 40.0);
    }

    #[test]
    fn editing_quantity_or_price_recomputes_amount() {
        let mut item = LineItem::new("Cable", 3, 12.5);
        assert_eq!(item.amount, 37.5);
        item.set_quantity(4);
        assert_eq!(item.amount, 50.0);
        item.set_price(2.25);
        assert_eq!(item.amount, 9.0);
    }

    #[test]
    fn no_items_gives_zero_sub_total() {
        let totals = derive_totals::<LineItem>(&[], 0.0, 0.0);
        assert_eq!(totals.sub_total, 0.0);
        assert_eq!(totals.balance, 0.0);
    }

    #[test]
    fn oversized_discount_and_payment_are_not_rejected() {
        let items = vec![LineItem::new("A", 1, 10.0)];
        let totals = derive_totals(&items, 25.0, 5.0);
        assert_eq!(totals.total, -15.0);
        assert_eq!(totals.balance, -20.0);
    }

    #[test]
    fn consistent_bill_has_no_mismatches() {
        let items = vec![stored_item(2, 100.0), stored_item(1, 50.0)];
        let bill = stored_bill(250.0, 10.0, 200.0);
        assert!(check_consistency(&bill, &items).is_empty());
    }

    #[test]
    fn tampered_sub_total_is_reported() {
        let items = vec![stored_item(2, 100.0)];
        let mut bill = stored_bill(200.0, 0.0, 0.0);
        bill.sub_total = 210.0;
        let mismatches = check_consistency(&bill, &items);
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].field, "sub_total");
        assert_eq!(mismatches[0].derived, 200.0);
    }
}
