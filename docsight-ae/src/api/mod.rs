//! HTTP API handlers for docsight-ae

pub mod analysis;
pub mod health;
pub mod sse;

pub use analysis::analysis_routes;
pub use health::health_routes;
pub use sse::analysis_event_stream;
