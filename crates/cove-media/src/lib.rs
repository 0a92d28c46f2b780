//! # cove-media
//!
//! Media staging: turn a local file into a bounded-size payload in
//! the remote blob store and hand back a content id other clients can
//! resolve.

pub mod stager;

mod error;

pub use error::{Result, StagingError};
pub use stager::MediaStager;
