pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod luhn;
pub mod retry;
pub mod services;

pub use config::Settings;
pub use error::{GophermartError, Result};
