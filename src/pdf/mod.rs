pub mod layout;
pub mod render;

pub use layout::{build_invoice, InvoiceData, InvoiceDocument};
pub use render::{DocumentRenderer, PdfRenderer, TextRenderer};

/// Builtin PDF fonts cannot draw the rupee sign.
pub const PDF_CURRENCY: &str = "Rs.";
