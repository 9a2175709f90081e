//! # arycar
//!
//! Work-order lifecycle for a car-wash operation.
//!
//! A work order moves through `CREATED → IN_PROGRESS → READY → DELIVERED`,
//! or to `CANCELLED` from the first two. Starting a job requires the entry
//! videos and delivering it requires the delivery video. Every change is
//! appended to a per-order event log, and STARTED/READY transitions notify
//! the customer in the background.
//!
//! Storage is pluggable: [`store::MemoryStore`] for tests and local runs,
//! [`db::Db`] for Postgres.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod notify;
pub mod plate;
pub mod store;
pub mod telemetry;
