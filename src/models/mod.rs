//! Request and Response models for the sample web surface
//!
//! This module defines the value type stored by the demo cache and the DTOs
//! used for serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;
pub mod values;

// Re-export commonly used types
pub use requests::CheckQuery;
pub use responses::{
    CheckResponse, DeleteResponse, EntryReport, ErrorResponse, HealthResponse, StatsResponse,
    TimeResponse,
};
pub use values::{DemoCache, DemoValue};
