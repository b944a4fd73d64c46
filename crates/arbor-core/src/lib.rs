//! `arbor-core`: configuration, error taxonomy and identifier types shared
//! by every Arbor crate.

pub mod config;
pub mod error;
pub mod types;

pub use error::{ArborError, Result};
pub use types::{CardId, OwnerId};
