//! Small helpers shared across the crate.

pub mod uri;

pub use uri::UriTemplate;
