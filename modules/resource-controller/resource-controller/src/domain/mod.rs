pub mod cache;
pub mod codec;
pub mod controller;
pub mod error;
pub mod payload;
pub mod query;
pub mod relationships;
pub mod schema;
pub mod state_machine;
pub mod store;
