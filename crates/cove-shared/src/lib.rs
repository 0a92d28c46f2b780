//! # cove-shared
//!
//! Domain types, validation and constants shared by every Cove crate.
//!
//! The types here are deliberately plain serde structs: the remote log
//! stores fully denormalized message records, so the domain model and
//! the wire shape stay close and the conversions live next to the
//! transport code, not here.

pub mod constants;
pub mod types;
pub mod validate;

mod error;

pub use error::ValidationError;
pub use types::*;
pub use validate::{validate_draft, validate_username};
