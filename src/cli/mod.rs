//! CLI command handlers

pub mod commands;

pub use commands::{load_records, locate, render, LocateCommand, RenderCommand};
