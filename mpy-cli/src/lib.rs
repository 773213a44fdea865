//! # mpy-cli
//!
//! Command-line client for MicroPython boards. Loads a TOML config,
//! opens the board over a serial device or a TCP bridge and runs one
//! subcommand through `mpy-core`.

pub mod commands;
pub mod config;
