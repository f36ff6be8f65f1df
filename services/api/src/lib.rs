//! services/api/src/lib.rs
//!
//! The `api` service: adapters for the core ports, configuration, and the web layer.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
