//! sf-core: stable foundation for signalflow.
//!
//! Contains:
//! - ids (stable compact IDs for graph/runtime objects)
//! - value (the closed user value type set + dispatch)
//! - buffer (2-D value buffers moved between accessors)
//! - version (global monotonic version numbers)
//! - error (shared error types)

pub mod buffer;
pub mod error;
pub mod ids;
pub mod value;
pub mod version;

// Re-exports: nice ergonomics for downstream crates
pub use buffer::Buffer2D;
pub use error::{CoreError, CoreResult};
pub use ids::*;
pub use value::{ConstantValue, UserValue, ValueType};
pub use version::VersionNumber;
