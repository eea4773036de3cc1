//! Command-line interface
//!
//! Argument definitions for the node shell; dispatch lives in `main.rs`.

pub mod commands;

pub use commands::{Command, Opt, PaymentArg};
