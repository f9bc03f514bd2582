//! Process-level infrastructure shared by the workspace crates: configuration
//! and logging.

pub mod config;
pub mod logging;
