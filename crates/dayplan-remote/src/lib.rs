pub mod error;
pub mod identity;
pub mod planning;
pub mod store;
pub mod types;
