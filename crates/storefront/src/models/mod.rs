//! Domain models for the portal.
//!
//! Zoho owns every entity; the only state the portal keeps itself is who
//! is logged in.

pub mod session;

pub use session::{CurrentCustomer, keys as session_keys};
