pub mod blockchain;
pub mod config;
pub mod database;
pub mod error;
pub mod metrics;
pub mod models;
pub mod rest;
pub mod state;
pub mod utils;

pub use config::Config;
pub use error::{ScanError, ScanResult};
pub use models::{ChainCursor, ConfirmationEntry, Currency, DepositEntry, PaymentAddress, WithdrawalRecord};
pub use state::AppState;
