//! Business services sitting between route handlers and Zoho.

pub mod auth;
pub mod checkout;
pub mod email;
pub mod portal;
pub mod webhooks;
