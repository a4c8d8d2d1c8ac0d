//! Keepfile CLI library.
//!
//! A thin command-line layer over `keepfile-persistence`: every command
//! opens a store, performs one operation and waits for background pruning
//! before returning.

pub mod cli;
pub mod commands;
