//! Tolerant parsers for free-form backend output.
//!
//! - [`json`] locates a JSON object inside noisy model text
//! - [`rating`] validates evaluation rating objects
//! - [`bullets`] turns bulleted or numbered lists into ordered items

pub mod bullets;
pub mod json;
pub mod rating;

pub use bullets::parse_bullet_list;
pub use json::{excerpt, extract_json_object, strip_code_fences, ObjectExtraction};
pub use rating::{parse_rating, Criterion, RatingError, RatingScores};
