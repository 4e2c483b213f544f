//! # dirkit-core
//!
//! Core types shared by the dirkit crates.
//!
//! ## Modules
//!
//! - [`error`] - Error taxonomy for connecting to, searching and updating a directory
//! - [`json`] - Helpers for reading and writing JSON documents on disk

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod json;

pub use error::{ConnectError, Error, ResolveError, Result, SessionError, UpdateError};
