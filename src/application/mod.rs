//! Dashboard services: hooks, mutations and the context that owns them.

pub mod context;
pub mod error;
pub mod hooks;
pub mod mutations;
pub mod repos;
