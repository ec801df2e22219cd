pub mod context;
pub mod error;
pub mod selector;
pub mod spec;
