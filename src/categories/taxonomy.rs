//! Task and topic taxonomy for the image benchmark.
//!
//! Defines the six task categories (with their definitions and conditioning
//! image rules) and the six visual topics used to label examples.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// The benchmark task categories.
///
/// Codes double as the top-level directory names of the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskCode {
    Tig,
    Tie,
    Srig,
    Srie,
    Mrig,
    Mrie,
}

impl TaskCode {
    /// Returns all task codes in resolution priority order.
    pub fn all() -> Vec<TaskCode> {
        vec![
            TaskCode::Tig,
            TaskCode::Tie,
            TaskCode::Srig,
            TaskCode::Srie,
            TaskCode::Mrig,
            TaskCode::Mrie,
        ]
    }

    /// Returns the short code as it appears in paths and metadata.
    pub fn code(&self) -> &'static str {
        match self {
            TaskCode::Tig => "TIG",
            TaskCode::Tie => "TIE",
            TaskCode::Srig => "SRIG",
            TaskCode::Srie => "SRIE",
            TaskCode::Mrig => "MRIG",
            TaskCode::Mrie => "MRIE",
        }
    }

    /// Returns the human-readable task name.
    pub fn label(&self) -> &'static str {
        match self {
            TaskCode::Tig => "Text-guided Image Generation",
            TaskCode::Tie => "Text-guided Image Editing",
            TaskCode::Srig => "Single Reference-guided Image Generation",
            TaskCode::Srie => "Single Reference-guided Image Editing",
            TaskCode::Mrig => "Multiple References-guided Image Generation",
            TaskCode::Mrie => "Multiple References-guided Image Editing",
        }
    }

    /// Returns the task definition handed to backends.
    pub fn definition(&self) -> &'static str {
        match self {
            TaskCode::Tig => {
                "Generate a completely new image based only on a descriptive text prompt. \
                 No source or reference images are provided."
            }
            TaskCode::Tie => {
                "Edit an existing image using a descriptive text prompt. \
                 Decide what to modify in the image based on the prompt. No mask or marked region is given."
            }
            TaskCode::Srig => {
                "Create a new image by combining visual cues from one reference image \
                 with instructions from a descriptive text prompt."
            }
            TaskCode::Srie => {
                "Edit an existing image using both a reference image and a text prompt. \
                 Use the reference image to guide the style or content of the edits."
            }
            TaskCode::Mrig => {
                "Generate a new image using several reference images along with a text prompt. \
                 The new image should reflect visual elements from the references and follow the prompt's description."
            }
            TaskCode::Mrie => {
                "Modify an existing image using multiple reference images and a descriptive text prompt. \
                 The edits should be guided by both the style or content of the references and the instructions in the prompt."
            }
        }
    }

    /// Returns true if the task expects conditioning images.
    ///
    /// Only TIG is purely text-driven. MRIG/MRIE conventionally carry two or
    /// more images, which is not enforced.
    pub fn requires_images(&self) -> bool {
        !matches!(self, TaskCode::Tig)
    }

    /// Returns true for editing tasks (codes containing `IE`).
    pub fn is_editing(&self) -> bool {
        self.code().contains("IE")
    }

    /// Infers the task from a unit path by substring containment.
    ///
    /// Codes are tested in [`TaskCode::all`] order and the first match wins.
    /// The test is position-insensitive, so it only stays unambiguous while no
    /// code is a substring of another; topic codes are never consulted.
    pub fn infer_from_path(path: &Path) -> Option<TaskCode> {
        let haystack = path.to_string_lossy();
        TaskCode::all()
            .into_iter()
            .find(|task| haystack.contains(task.code()))
    }
}

impl fmt::Display for TaskCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for TaskCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        TaskCode::all()
            .into_iter()
            .find(|task| task.code() == wanted)
            .ok_or_else(|| format!("unknown task code '{}'", s))
    }
}

/// Visual topic of an example. Purely descriptive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TopicCode {
    I,
    A,
    S,
    Cg,
    P,
    T,
}

impl TopicCode {
    /// Returns all topic codes.
    pub fn all() -> Vec<TopicCode> {
        vec![
            TopicCode::I,
            TopicCode::A,
            TopicCode::S,
            TopicCode::Cg,
            TopicCode::P,
            TopicCode::T,
        ]
    }

    pub fn code(&self) -> &'static str {
        match self {
            TopicCode::I => "I",
            TopicCode::A => "A",
            TopicCode::S => "S",
            TopicCode::Cg => "CG",
            TopicCode::P => "P",
            TopicCode::T => "T",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TopicCode::I => "Information Graphics",
            TopicCode::A => "Artworks",
            TopicCode::S => "Screenshots",
            TopicCode::Cg => "Computer Graphics",
            TopicCode::P => "Photorealistic Images",
            TopicCode::T => "Textual Graphics",
        }
    }

    /// Looks up a topic by its exact code.
    pub fn from_code(code: &str) -> Option<TopicCode> {
        let code = code.trim();
        TopicCode::all().into_iter().find(|t| t.code() == code)
    }

    /// Extracts the topic from a unit directory name (`<TASK>_<TOPIC>_<ordinal>`).
    pub fn from_unit_name(name: &str) -> Option<TopicCode> {
        let mut segments = name.split('_');
        segments.next()?;
        TopicCode::from_code(segments.next()?)
    }
}

/// Renders a topic code as its label, falling back to the raw code.
pub fn topic_label(code: &str) -> String {
    TopicCode::from_code(code)
        .map(|t| t.label().to_string())
        .unwrap_or_else(|| code.trim().to_string())
}
