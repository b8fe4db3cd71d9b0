//! Shipped collaborator implementations.

pub mod auth;
pub mod cache;
pub mod dictionary;
pub mod storage;
