//! Release artifacts produced after compilation.
//!
//! - [`universal`] - Fuses per-architecture macOS libraries (lipo)
//! - [`filesystem`] - Directory copying, moves, hashing, atomic JSON writes

pub mod filesystem;
pub mod universal;

pub use universal::UniversalBinaryAssembler;
