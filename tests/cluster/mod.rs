pub mod resources;
pub mod store;
