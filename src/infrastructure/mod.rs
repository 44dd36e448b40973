//! Infrastructure layer
//!
//! Configuration, logging, the browser session capability, DOM extraction,
//! bulk-archive handling and the warehouse boundary.

pub mod archive;
pub mod config;
pub mod extract;
pub mod logging;
pub mod session;
pub mod warehouse;
