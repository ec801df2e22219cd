pub mod admission;
pub mod error;
pub mod reconciliation;
pub mod validation;
