//! Orderbox server library.
//!
//! This crate provides the ingestion, storage and lookup services as a
//! library, allowing them to be tested and reused by the CLI.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod config;
pub mod db;
pub mod demo;
pub mod error;
pub mod ingest;
pub mod lookup;
pub mod middleware;
pub mod routes;
pub mod state;
