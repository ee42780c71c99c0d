//! TUI module for the copilot chat
//!
//! Terminal user interface using Ratatui.

mod app;
mod backend;
mod compose;
pub mod console;
mod ui;

pub use app::run;
