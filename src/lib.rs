//! Contribution Billing Reconciliation API Library
//!
//! Core of the union contribution billing subsystem: value assignment for
//! employer contributions, invoice issuance against the Lytex provider, and
//! reconciliation of local records against the external ledger.
//!
//! # Modules
//!
//! - `assignment`: Value-assignment workflow and portal authorization.
//! - `config`: Configuration management.
//! - `db`: Database connection and pool management.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `lytex_client`: Lytex invoicing provider client.
//! - `models`: Core data models.
//! - `notifications`: Manager notification dispatcher.
//! - `reconciliation`: Status sync and reconciliation engine.
//! - `store`: Contribution record store.

pub mod assignment;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod lytex_client;
pub mod models;
pub mod notifications;
pub mod reconciliation;
pub mod store;
