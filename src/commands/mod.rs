pub mod auth;
pub mod bills;
pub mod customers;
pub mod dashboard;
pub mod profile;
pub mod settings;
