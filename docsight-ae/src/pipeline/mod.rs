//! Pipeline orchestration
//!
//! The coordinator drives stage sequencing and failure policy; the status
//! store owns durable, pollable execution state.

pub mod coordinator;
pub mod status_store;

pub use coordinator::Coordinator;
pub use status_store::StatusStore;
