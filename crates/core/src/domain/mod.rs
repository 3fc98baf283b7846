pub mod balance;

pub use balance::{Account, AlertReport, BalanceRecord};
