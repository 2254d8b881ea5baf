//! filedao operator CLI.
//!
//! Inspects and repairs the files written by `filedao-persistence` managed
//! objects below a storage directory.

pub mod cli;
pub mod commands;
