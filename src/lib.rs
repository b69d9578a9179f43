//! Habit Sync Server
//!
//! Goals and daily completions for a personal habit tracker, reconciled
//! across offline-capable devices with record-level last-write-wins merges.
//!
//! # Modules
//!
//! - `sync`: change records, merge rules, the sync service and its stores
//! - `routes`: HTTP adapter around the sync service
//! - `db`: SQLite pool and schema

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod state;
pub mod sync;
