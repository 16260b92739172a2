//! Real-time data layer of the TDS admin dashboard.
//!
//! A [`realtime::SocketChannel`] fans server-push events out to listeners,
//! a [`cache::QueryCache`] deduplicates and caches REST reads, data hooks
//! bind the two per resource, and mutation dispatchers refresh the affected
//! queries after writes. [`application::context::AppContext`] wires it all
//! together from [`config::Settings`].

pub mod application;
pub mod cache;
pub mod config;
pub mod infra;
pub mod realtime;

pub(crate) mod util;
