//! Core library for `mdview`.
//!
//! Contains the request guard (path validation, size ceiling, CSRF checks),
//! the session store, directory listing, and the theme catalogue. This crate
//! depends on `mdview-storage` for the session backend and knows nothing
//! about HTTP.

pub mod browse;
pub mod crypto;
pub mod csrf;
pub mod error;
pub mod guard;
pub mod session;
pub mod theme;
