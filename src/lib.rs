//! Release pipeline for the m8gd GDExtension.
//!
//! Builds the native module with SCons, fuses macOS architectures into a
//! universal library, and exports the Godot project into one archive per
//! platform using a pinned Godot runtime that is located or downloaded on
//! demand.
//!
//! # Architecture
//!
//! ```text
//! m8gd-release (binary)
//!     │
//!     ├── config      BuildConfiguration, ProjectSettings
//!     └── pipeline ───┬── toolchain   ArtifactResolver (locate or fetch Godot)
//!                     ├── build       NativeBuildDriver, LibraryStager
//!                     ├── artifact    UniversalBinaryAssembler
//!                     └── export      ExportOrchestrator
//!                              │
//!                              ▼
//!                     process (Runner: native or POSIX-emulated execution)
//! ```
//!
//! Host differences (library suffixes, Godot data directory, runtime
//! archives) are confined to [`platform::PlatformProfile`].

pub mod artifact;
pub mod build;
pub mod config;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod platform;
pub mod preflight;
pub mod process;
pub mod toolchain;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::{BuildConfiguration, BuildMode, Platform, ProjectSettings, ReleaseOptions};
pub use error::ReleaseError;
pub use pipeline::{Pipeline, PipelineReport};
