//! cellatlas-core: Core library for cellatlas
//!
//! This crate compiles the output of an external cross-session cell
//! registration tool into a self-consistent, session-ordered registry.
//!
//! # Architecture
//!
//! ```text
//! .regz container → RegistrationSource → ReferenceResolver
//!                          ↓
//!    MatchMap builder + Footprint/Centroid assembly
//!                          ↓
//!            Registry → MessagePack artifacts
//! ```
//!
//! # Modules
//!
//! - `container`: `.regz` registration container reading and building
//! - `match_map`: cell-to-session match map construction
//! - `footprints`: per-session spatial footprint assembly
//! - `centroids`: per-session centroid assembly
//! - `registry`: compiled registry artifacts and their on-disk form
//! - `compiler`: end-to-end compilation orchestration
//! - `logging`: tracing setup shared by binaries
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod centroids;
pub mod compiler;
pub mod container;
pub mod error;
pub mod footprints;
pub mod logging;
pub mod match_map;
pub mod registry;

pub use compiler::RegistryCompiler;
pub use error::{Error, Result};
pub use match_map::MatchMap;
pub use registry::Registry;
