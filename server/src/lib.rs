// shelf-server/src/lib.rs

//! Order fulfillment and digital delivery for the bookstore backend.
//!
//! Orders are validated and priced against the catalog, committed with their stock decrements
//! in one transaction, and paid orders with download titles are handed to a persistent delivery
//! queue drained by a single background worker.

pub mod catalog;
pub mod config;
pub mod delivery;
pub mod errors;
pub mod locks;
pub mod models;
pub mod pipelines;
pub mod services;
pub mod state;
pub mod web;
