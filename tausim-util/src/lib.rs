//! Utilities for model development and testing.
//!
//! This crate provides a deterministic chemistry model built on the public
//! API of `tausim`, together with an output monitor recording its trace.
#![warn(missing_docs, missing_debug_implementations, unreachable_pub)]

pub mod helper_models;
pub mod trace;
