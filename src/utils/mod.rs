//! Shared utilities: cookie sealing crypto and redirect validation

pub mod crypto;
pub mod redirect;
