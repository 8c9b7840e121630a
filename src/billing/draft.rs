use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{derive_totals, BillTotals, LineItem};
use crate::error::DraftError;
use crate::models::{NewBill, NewCustomer, PaymentMode};

/// Who the bill is for: a stored customer, or details for a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CustomerChoice {
    Existing { id: String, name: String },
    New(NewCustomer),
}

impl Default for CustomerChoice {
    fn default() -> Self {
        CustomerChoice::New(NewCustomer::default())
    }
}

impl CustomerChoice {
    pub fn display_name(&self) -> &str {
        match self {
            CustomerChoice::Existing { name, .. } => name,
            CustomerChoice::New(customer) => &customer.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemEdit {
    Name(String),
    Quantity(u32),
    Price(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DraftWarning {
    DiscountExceedsSubTotal { discount: f64, sub_total: f64 },
    AmountReceivedExceedsTotal { attempted: f64, sub_total: f64 },
}

impl std::fmt::Display for DraftWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DraftWarning::DiscountExceedsSubTotal { .. } => {
                f.write_str("Discount is larger than the sub total.")
            }
            DraftWarning::AmountReceivedExceedsTotal { .. } => {
                f.write_str("Amount received cannot exceed the total amount.")
            }
        }
    }
}

/// An unsaved bill. Edits keep every item's amount in sync; totals are
/// re-derived on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillDraft {
    pub invoice_number: String,
    pub customer: CustomerChoice,
    items: Vec<LineItem>,
    pub payment_mode: PaymentMode,
    discount: f64,
    amount_received: f64,
}

impl BillDraft {
    pub fn new(invoice_number: impl Into<String>) -> Self {
        BillDraft {
            invoice_number: invoice_number.into(),
            customer: CustomerChoice::default(),
            items: vec![LineItem::blank()],
            payment_mode: PaymentMode::Cash,
            discount: 0.0,
            amount_received: 0.0,
        }
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn discount(&self) -> f64 {
        self.discount
    }

    pub fn amount_received(&self) -> f64 {
        self.amount_received
    }

    pub fn set_customer(&mut self, customer: CustomerChoice) {
        self.customer = customer;
    }

    pub fn set_payment_mode(&mut self, mode: PaymentMode) {
        self.payment_mode = mode;
    }

    pub fn add_item(&mut self) -> usize {
        self.items.push(LineItem::blank());
        self.items.len() - 1
    }

    /// Appends a filled-in item, reusing the trailing blank row if there is one.
    pub fn push_item(&mut self, item_name: &str, quantity: u32, price: f64) -> usize {
        let index = match self.items.last() {
            Some(last) if last.item_name.is_empty() && last.amount == 0.0 => self.items.len() - 1,
            _ => self.add_item(),
        };
        let item = &mut self.items[index];
        item.item_name = item_name.to_string();
        item.set_quantity(quantity);
        item.set_price(price);
        index
    }

    /// Removes the item at `index`. The last remaining row always stays.
    pub fn remove_item(&mut self, index: usize) -> bool {
        if self.items.len() <= 1 || index >= self.items.len() {
            return false;
        }
        self.items.remove(index);
        true
    }

    pub fn edit_item(&mut self, index: usize, edit: ItemEdit) -> Result<(), DraftError> {
        let item = self
            .items
            .get_mut(index)
            .ok_or(DraftError::NoSuchItem(index + 1))?;
        match edit {
            ItemEdit::Name(name) => item.item_name = name,
            ItemEdit::Quantity(quantity) => item.set_quantity(quantity),
            ItemEdit::Price(price) => item.set_price(price),
        }
        Ok(())
    }

    /// Applies the discount; a discount above the sub-total is kept but flagged.
    pub fn set_discount(&mut self, discount: f64) -> Option<DraftWarning> {
        self.discount = discount;
        let sub_total = self.totals().sub_total;
        if discount > sub_total {
            warn!(discount, sub_total, "discount exceeds sub total");
            return Some(DraftWarning::DiscountExceedsSubTotal {
                discount,
                sub_total,
            });
        }
        None
    }

    /// Applies the received amount unless it exceeds the sub-total, in which
    /// case the previous value is kept and a warning returned.
    pub fn set_amount_received(&mut self, amount: f64) -> Option<DraftWarning> {
        let sub_total = self.totals().sub_total;
        if amount > sub_total {
            warn!(amount, sub_total, "amount received exceeds sub total, ignored");
            return Some(DraftWarning::AmountReceivedExceedsTotal {
                attempted: amount,
                sub_total,
            });
        }
        self.amount_received = amount;
        None
    }

    pub fn totals(&self) -> BillTotals {
        derive_totals(&self.items, self.discount, self.amount_received)
    }

    pub fn validate(&self) -> Result<(), DraftError> {
        if self.invoice_number.trim().is_empty() {
            return Err(DraftError::MissingInvoiceNumber);
        }
        if let CustomerChoice::New(customer) = &self.customer {
            if customer.name.trim().is_empty() {
                return Err(DraftError::MissingCustomerName);
            }
        }
        if self.items.is_empty() {
            return Err(DraftError::NoItems);
        }
        for (index, item) in self.items.iter().enumerate() {
            let position = index + 1;
            if item.item_name.trim().is_empty() {
                return Err(DraftError::MissingItemName(position));
            }
            if item.quantity < 1 {
                return Err(DraftError::InvalidQuantity(position));
            }
            if !item.price.is_finite() || item.price < 0.0 {
                return Err(DraftError::InvalidPrice(position));
            }
        }
        if !self.discount.is_finite() || self.discount < 0.0 {
            return Err(DraftError::NegativeDiscount);
        }
        if !self.amount_received.is_finite() || self.amount_received < 0.0 {
            return Err(DraftError::NegativeAmountReceived);
        }
        Ok(())
    }

    pub fn to_new_bill(&self, customer_id: &str, created_by: &str) -> NewBill {
        let totals = self.totals();
        NewBill {
            invoice_number: self.invoice_number.clone(),
            customer_id: customer_id.to_string(),
            sub_total: totals.sub_total,
            discount: totals.discount,
            total: totals.total,
            payment_mode: self.payment_mode,
            amount_received: totals.amount_received,
            balance: totals.balance,
            created_by: created_by.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_draft() -> BillDraft {
        let mut draft = BillDraft::new("INV-2026-0001");
        draft.set_customer(CustomerChoice::New(NewCustomer {
            name: "Ravi Kumar".into(),
            mobile_number: Some("+91 98765 43210".into()),
            ..NewCustomer::default()
        }));
        draft.push_item("Tile adhesive", 2, 100.0);
        draft.push_item("Grout", 1, 50.0);
        draft
    }

    #[test]
    fn new_draft_starts_with_one_blank_row() {
        let draft = BillDraft::new("INV-1");
        assert_eq!(draft.items().len(), 1);
        assert_eq!(draft.items()[0].quantity, 1);
        assert_eq!(draft.items()[0].amount, 0.0);
    }

    #[test]
    fn push_item_fills_blank_row_first() {
        let draft = filled_draft();
        assert_eq!(draft.items().len(), 2);
        assert_eq!(draft.items()[0].item_name, "Tile adhesive");
        assert_eq!(draft.totals().sub_total, 250.0);
    }

    #[test]
    fn editing_quantity_keeps_amount_in_sync() {
        let mut draft = filled_draft();
        draft.edit_item(1, ItemEdit::Quantity(3)).unwrap();
        assert_eq!(draft.items()[1].amount, 150.0);
        draft.edit_item(1, ItemEdit::Price(10.0)).unwrap();
        assert_eq!(draft.items()[1].amount, 30.0);
        assert_eq!(draft.totals().sub_total, 230.0);
        assert_eq!(
            draft.edit_item(5, ItemEdit::Quantity(1)),
            Err(DraftError::NoSuchItem(6))
        );
    }

    #[test]
    fn last_item_cannot_be_removed() {
        let mut draft = filled_draft();
        assert!(draft.remove_item(0));
        assert!(!draft.remove_item(0));
        assert_eq!(draft.items().len(), 1);
    }

    #[test]
    fn amount_received_above_sub_total_is_ignored() {
        let mut draft = filled_draft();
        assert!(draft.set_amount_received(200.0).is_none());
        let warning = draft.set_amount_received(300.0);
        assert!(matches!(
            warning,
            Some(DraftWarning::AmountReceivedExceedsTotal { .. })
        ));
        assert_eq!(draft.amount_received(), 200.0);
    }

    #[test]
    fn oversized_discount_is_kept_with_warning() {
        let mut draft = filled_draft();
        assert!(draft.set_discount(400.0).is_some());
        assert_eq!(draft.totals().total, -150.0);
    }

    #[test]
    fn validation_rejects_incomplete_drafts() {
        let mut draft = BillDraft::new("INV-1");
        draft.push_item("Paint", 1, 10.0);
        assert_eq!(draft.validate(), Err(DraftError::MissingCustomerName));

        let mut draft = filled_draft();
        draft.add_item();
        assert_eq!(draft.validate(), Err(DraftError::MissingItemName(3)));

        let mut draft = filled_draft();
        draft.edit_item(0, ItemEdit::Quantity(0)).unwrap();
        assert_eq!(draft.validate(), Err(DraftError::InvalidQuantity(1)));

        let mut draft = filled_draft();
        draft.set_discount(-1.0);
        assert_eq!(draft.validate(), Err(DraftError::NegativeDiscount));
    }

    #[test]
    fn non_finite_money_fails_validation() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut draft = filled_draft();
            draft.set_discount(value);
            assert_eq!(draft.validate(), Err(DraftError::NegativeDiscount));
        }

        let mut draft = filled_draft();
        draft.set_amount_received(f64::NAN);
        assert_eq!(draft.validate(), Err(DraftError::NegativeAmountReceived));

        let mut draft = filled_draft();
        draft.set_amount_received(f64::NEG_INFINITY);
        assert_eq!(draft.validate(), Err(DraftError::NegativeAmountReceived));
    }

    #[test]
    fn existing_customer_needs_no_name_check() {
        let mut draft = filled_draft();
        draft.set_customer(CustomerChoice::Existing {
            id: "cust-1".into(),
            name: String::new(),
        });
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn new_bill_carries_derived_totals() {
        let mut draft = filled_draft();
        draft.set_discount(10.0);
        draft.set_amount_received(200.0);
        draft.set_payment_mode(PaymentMode::Upi);
        let bill = draft.to_new_bill("cust-1", "user-1");
        assert_eq!(bill.sub_total, 250.0);
        assert_eq!(bill.total, 240.0);
        assert_eq!(bill.balance, 40.0);
        assert_eq!(bill.payment_mode, PaymentMode::Upi);
        assert_eq!(bill.created_by, "user-1");
    }
}
