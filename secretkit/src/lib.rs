//! Host-facing build of `SecretKit`.
//!
//! Links `secretkit-core` with the `ffi` feature enabled so the generated
//! bindings carry the error type and the logger bridge. Everything else is a
//! plain re-export.

pub use secretkit_core::*;
