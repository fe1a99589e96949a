pub mod routes;

pub use routes::{get_chain, get_deposits, sync_chain};
