//! # vaultkit
//!
//! Blocking client for the configuration API of a Vault server.
//!
//! This crate provides:
//! - A [`Backend`] trait with the read/list/write/delete primitives plus
//!   helpers for auth methods, secrets engines, audit devices and policies
//! - [`HttpBackend`], an HTTP implementation on `ureq`
//! - [`MockBackend`], an in-memory server emulation for tests
//! - Wire types for mounts, audit devices and identity objects
//!
//! ## Example
//!
//! ```no_run
//! use vaultkit::{Backend, HttpBackend};
//!
//! let backend = HttpBackend::new("https://vault.example.com:8200", Some("s.token".into()), false);
//! for (path, mount) in backend.list_auth().unwrap() {
//!     println!("{path} -> {} ({})", mount.kind, mount.accessor);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod error;
pub mod identity;
pub mod types;

pub use backend::mock::{JournalEntry, Op};
pub use backend::{Backend, HttpBackend, MockBackend, to_data};
pub use error::{Error, ErrorCategory, Result};
pub use identity::{AUTO_GENERATED_PREFIX, Alias, Entity, Group, is_auto_generated};
pub use types::{
    AuditInput, AuditOutput, Data, Health, Listing, MountConfig, MountInput, MountOutput, Secret,
};
