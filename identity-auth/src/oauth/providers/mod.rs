//! Built-in identity providers.

pub mod azure;
pub mod github;
pub mod google;
