//! TSH Core - Shared domain types for the wholesale portal.
//!
//! This crate provides common types used across all TSH components:
//! - `storefront` - JSON API for the storefront, client portal and mobile app
//! - `cli` - Command-line tools for stock sync and cache maintenance
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no cache
//! access. Zoho Books/Inventory is the system of record for every entity
//! named here; these types only give the mirrored data a safe shape.
//!
//! # Modules
//!
//! - [`types`] - Zoho id newtypes, emails, locales, money and document statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
