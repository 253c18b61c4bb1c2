//! TrustVault chain-of-custody ledger.
//!
//! This crate provides:
//! - Canonical block encoding, SHA-256 block hashing and HMAC-SHA256 signing
//! - A chain builder that links each new block to its case's tail
//! - A total chain verifier and a cross-case integrity aggregator
//! - Store traits with in-memory and SQLite (SQLCipher-compatible) backends
//! - A custody service that serializes appends per case and commits block
//!   and case state together
//!
//! The CLI wrapper lives in `src/main.rs`.

#![deny(unsafe_code)]

pub mod error;
pub mod config;

pub mod block;
pub mod builder;
pub mod canonical;
pub mod custody;
pub mod ledger;
pub mod signing;
pub mod store;
pub mod util;
pub mod verify;
