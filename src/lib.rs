//! # recon-harness
//!
//! Regression harness for log reconstruction. It fetches a reference bundle
//! of raw archives and expected outputs, drives a reconstruction step and a
//! line-merge step over them, checks both results byte-for-byte, and cleans
//! up after itself.

pub use crate::diagnostics::{ErrorCategory, HarnessError};
pub use crate::range::RangeSelector;

pub mod cli;
pub mod compare;
pub mod config;
pub mod diagnostics;
pub mod fixtures;
pub mod layout;
pub mod pipeline;
pub mod range;
pub mod teardown;
pub mod transform;
