//! Core domain types and traits for Sentinel content deployment.
//!
//! This crate contains:
//! - Content types and their directory/naming conventions
//! - ARM template loading and parameter resolution
//! - Deployment request/outcome types and the backend trait
//! - Error types shared by the other crates

pub mod content;
pub mod deployer;
pub mod error;
pub mod template;

pub use content::ContentType;
pub use error::{Error, Result, TemplateError};
pub use template::Template;
