//! Shared types for the locmap scanning pipeline.
//!
//! This crate holds everything both sides of the wire agree on:
//! - Configuration types for the coordinator and the scanner
//! - Request/response types for the coordinator API
//! - The RFC 1876 LOC record parser
//! - Root-domain (effective TLD + 1) extraction

pub mod api;
pub mod config;
pub mod error;
pub mod loc;
pub mod rootdomain;

pub use error::{Error, Result};
pub use loc::{parse_loc, parse_loc_lenient};
pub use rootdomain::root_domain;
