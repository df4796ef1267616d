//! Task and topic taxonomy for imagen-forge.
//!
//! Resolves task codes to their definitions and image requirements, and
//! topic codes to display labels.

mod taxonomy;

pub use taxonomy::{topic_label, TaskCode, TopicCode};
