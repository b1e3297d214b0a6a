//! WalletForge command-line surface.
//!
//! Exposes the CLI modules for integration testing.

pub mod cli;
