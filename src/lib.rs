//! Pantry Ledger Library
//!
//! Keeps per-owner food stock consistent with a history of consumption
//! events, and scores and ranks stock by how likely it is to be wasted.
//!
//! Storage sits behind the async traits in [`repositories`]; the
//! [`repositories::InMemoryRepository`] store ships with the crate.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod entities;
pub mod errors;
pub mod events;
pub mod repositories;
pub mod services;

pub use errors::ServiceError;
pub use services::{ConsumptionService, InventoryService, RankingService, RiskScorer};
