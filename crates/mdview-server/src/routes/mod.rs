//! HTTP route modules for the `mdview` server.

pub mod csrf;
pub mod files;
pub mod sys;
pub mod themes;
pub mod ui;
