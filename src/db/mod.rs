pub mod enums;
pub mod models;
pub mod services;
pub mod store;

pub use store::{CheckCompletion, Claim, CompletionOutcome, MonitorStore, StoreError};
