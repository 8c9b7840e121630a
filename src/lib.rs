pub mod backend;
pub mod billing;
pub mod commands;
pub mod db;
pub mod error;
pub mod models;
pub mod pdf;
pub mod services;
pub mod utils;
