//! # Media Catalog
//!
//! Catalogs a media tree and reports files that are the same picture, even
//! when a copy was rotated, re-saved or renamed.
//!
//! ## Core Philosophy
//! - **Never auto-delete** - duplicate sets are reported, never acted on
//! - **Local failures stay local** - a broken file is cataloged as corrupted
//! - **Deterministic** - the same catalog always yields the same sets, in the same order
//!
//! ## Architecture
//! The library is split into a core engine (GUI-agnostic) and presentation layers:
//! - `core` - The catalog engine
//! - `config` - Run configuration
//! - `events` - Event-driven progress reporting (GUI-ready)
//! - `error` - User-friendly error types
//! - `cli` - Command-line interface (binary only)

pub mod config;
pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use config::CatalogConfig;
pub use error::{CatalogError, Result};

/// Initialize tracing for the library
///
/// This should be called by the application entry point (CLI or GUI).
pub fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set global default tracing subscriber");
}
