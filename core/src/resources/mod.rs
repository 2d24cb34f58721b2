//! Thin resource layer.
//!
//! Each module pairs a struct with free functions that pick a path template,
//! hand the struct to the client for encoding, and decode the reply. All of
//! the interesting behavior lives in `Client`, `Pager` and `classify`.

pub mod accounts;
pub mod invoices;
pub mod transactions;
