pub mod crypto;
pub mod state;
