//! Client-side data layer of a job-search tracker: per-table stores synced
//! with a hosted REST backend, an auth/session gate, toast notifications,
//! and a small local HTTP API over all of it.

pub mod auth;
pub mod config;
pub mod errors;
pub mod models;
pub mod notify;
pub mod query;
pub mod remote;
pub mod routes;
pub mod state;
pub mod store;
pub mod views;
