//! Flipbook offline viewer
//!
//! Server side of an installable PDF flipbook. The crate exposes its cores
//! for the binary, the integration tests and the benches.
//!
//! # Modules
//!
//! - `offline`: intercepting asset cache with a versioned install/activate lifecycle
//! - `render`: bounded, focus-aware cache of rendered PDF pages
//! - `storage`: single-slot persistence of the imported document
//! - `viewer`: composes storage and the render cache into the viewing session
//! - `routes`: axum HTTP surface over the above

pub mod config;
pub mod error;
pub mod offline;
pub mod render;
pub mod routes;
pub mod state;
pub mod storage;
pub mod viewer;
