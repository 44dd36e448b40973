//! Medcode Crawler - Procedure Code Reference Data Pipeline
//!
//! This crate crawls an authenticated medical coding reference site into
//! warehouse tables, and loads yearly exempt-code archives as versioned
//! snapshots that only advance when the published content actually changes.

// Module declarations
pub mod domain;
pub mod application;
pub mod infrastructure;
