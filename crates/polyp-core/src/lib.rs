//! # polyp-core
//!
//! Core types and error definitions shared across the polyp crates.
//!
//! This crate provides:
//! - Sample format and sample spec definitions
//! - Discovered service records and browse opcodes
//! - Common error types

pub mod error;
pub mod sample;
pub mod service;

pub use error::ParseError;
pub use sample::{SampleFormat, SampleSpec};
pub use service::{BrowseOpcode, ServiceInfo, ServiceKind};
