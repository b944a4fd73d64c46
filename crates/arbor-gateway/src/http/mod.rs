//! HTTP handlers, one module per resource.

pub mod cards;
pub mod health;
pub mod queue;
pub mod review;
