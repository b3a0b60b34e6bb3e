//! # vmconsole-cli
//!
//! Headless driver for a single console session: configuration loading
//! and the stdin command language.

pub mod commands;
pub mod config;
