//! Record store for a single unit directory.
//!
//! Each unit directory is the sole durable store for its own records. All
//! writes go through a temporary file in the same directory followed by a
//! rename, so readers never observe a partially written record.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::warn;

use super::record::{
    results_file_name, EvaluationResults, ExampleMetadata, IMAGE_EXTENSIONS, METADATA_FILE,
    MODEL_OUTPUT_DIR,
};
use crate::error::StoreError;

/// A generation output found in a unit's `model_output/` directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateImage {
    /// Backend name (file stem).
    pub backend: String,
    /// Full path of the image.
    pub path: PathBuf,
}

/// Handle on one example unit directory (`<root>/<TASK>/<TASK>_<TOPIC>_<n>/`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnitDir {
    path: PathBuf,
}

impl UnitDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory name, used as the unit identity in logs.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.path.join(METADATA_FILE)
    }

    pub fn results_path(&self, evaluator: &str) -> PathBuf {
        self.path.join(results_file_name(evaluator))
    }

    pub fn output_dir(&self) -> PathBuf {
        self.path.join(MODEL_OUTPUT_DIR)
    }

    /// Loads `metadata.json`. Missing or unparsable metadata is an error.
    pub fn load_metadata(&self) -> Result<ExampleMetadata, StoreError> {
        let path = self.metadata_path();
        if !path.is_file() {
            return Err(StoreError::MissingFile(path.display().to_string()));
        }
        let content = fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| StoreError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn save_metadata(&self, metadata: &ExampleMetadata) -> Result<(), StoreError> {
        write_json_atomic(&self.metadata_path(), metadata)
    }

    /// Loads the evaluation results, degrading to an empty record.
    ///
    /// A missing file is the normal first-run state. An unreadable or
    /// unparsable file is logged and treated as empty, so there is always a
    /// valid record to merge into.
    pub fn load_results(&self, evaluator: &str) -> EvaluationResults {
        let path = self.results_path(evaluator);
        if !path.exists() {
            return EvaluationResults::new();
        }

        let parsed = fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|content| {
                serde_json::from_str::<EvaluationResults>(&content).map_err(|e| e.to_string())
            });

        match parsed {
            Ok(results) => results,
            Err(error) => {
                warn!(
                    path = %path.display(),
                    error = %error,
                    "Results file exists but is unreadable; starting fresh"
                );
                EvaluationResults::new()
            }
        }
    }

    pub fn save_results(
        &self,
        evaluator: &str,
        results: &EvaluationResults,
    ) -> Result<(), StoreError> {
        write_json_atomic(&self.results_path(evaluator), results)
    }

    /// Returns the existing output image of a backend, whatever its extension.
    pub fn output_image(&self, backend: &str) -> Option<PathBuf> {
        let dir = self.output_dir();
        IMAGE_EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("{}.{}", backend, ext)))
            .find(|p| p.is_file())
    }

    /// Writes a backend's output image into `model_output/`.
    pub fn write_output_image(
        &self,
        backend: &str,
        extension: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, StoreError> {
        let dir = self.output_dir();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        let path = dir.join(format!("{}.{}", backend, extension));
        write_bytes_atomic(&path, bytes)?;
        Ok(path)
    }

    /// Lists generation outputs in sorted file-name order.
    ///
    /// Returns `None` when the unit has no `model_output/` directory.
    pub fn candidate_images(&self) -> Result<Option<Vec<CandidateImage>>, StoreError> {
        let dir = self.output_dir();
        if !dir.is_dir() {
            return Ok(None);
        }

        let entries = fs::read_dir(&dir).map_err(|source| StoreError::Io {
            path: dir.display().to_string(),
            source,
        })?;

        let mut candidates = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                path: dir.display().to_string(),
                source,
            })?;
            let path = entry.path();
            if !path.is_file() || !has_image_extension(&path) {
                continue;
            }
            if let Some(stem) = path.file_stem() {
                candidates.push(CandidateImage {
                    backend: stem.to_string_lossy().into_owned(),
                    path,
                });
            }
        }

        candidates.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
        Ok(Some(candidates))
    }

    /// Resolves conditioning image names against the unit directory.
    pub fn cond_image_paths(&self, metadata: &ExampleMetadata) -> Vec<PathBuf> {
        metadata
            .cond_images
            .iter()
            .map(|name| self.path.join(name))
            .collect()
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let mut contents = serde_json::to_string_pretty(value)?;
    contents.push('\n');
    write_bytes_atomic(path, contents.as_bytes())
}

fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let io_err = |source: std::io::Error| StoreError::Io {
        path: path.display().to_string(),
        source,
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| StoreError::Persist {
        path: path.display().to_string(),
        message: e.error.to_string(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_rating;
    use tempfile::tempdir;

    fn unit_with_metadata(json: &str) -> (tempfile::TempDir, UnitDir) {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path().join("TIG").join("TIG_A_000001");
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join(METADATA_FILE), json).expect("write");
        (temp, UnitDir::new(dir))
    }

    #[test]
    fn test_load_and_save_metadata() {
        let (_temp, unit) =
            unit_with_metadata(r#"{"task":"TIG","topic":"A","prompt":"a cat","cond_images":[]}"#);
        let mut meta = unit.load_metadata().expect("load");
        assert_eq!(meta.prompt, "a cat");

        meta.prompt_refined = Some("a ginger cat on a sofa".to_string());
        unit.save_metadata(&meta).expect("save");

        let reloaded = unit.load_metadata().expect("reload");
        assert_eq!(reloaded, meta);
        let leftovers: Vec<_> = fs::read_dir(unit.path())
            .expect("read_dir")
            .filter_map(Result::ok)
            .filter(|e| e.file_name() != METADATA_FILE)
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind");
    }

    #[test]
    fn test_missing_metadata_is_error() {
        let temp = tempdir().expect("tempdir");
        let unit = UnitDir::new(temp.path());
        assert!(matches!(unit.load_metadata(), Err(StoreError::MissingFile(_))));
    }

    #[test]
    fn test_corrupt_metadata_is_error() {
        let (_temp, unit) = unit_with_metadata("{not json");
        assert!(matches!(unit.load_metadata(), Err(StoreError::Parse { .. })));
    }

    #[test]
    fn test_corrupt_results_degrade_to_empty() {
        let (_temp, unit) = unit_with_metadata("{}");
        fs::write(unit.results_path("gemini"), "{\"gemini\": ").expect("write");
        let results = unit.load_results("gemini");
        assert!(results.is_empty());
    }

    #[test]
    fn test_results_roundtrip() {
        let (_temp, unit) = unit_with_metadata("{}");
        let mut results = unit.load_results("gemini");
        let rating = parse_rating(
            "{\"prompt_relevance\":4,\"aesthetic_quality\":5,\"content_coherence\":3,\"artifacts\":5}",
        )
        .expect("rating");
        results.insert("gemini", "flux", rating);
        unit.save_results("gemini", &results).expect("save");

        let reloaded = unit.load_results("gemini");
        assert!(reloaded.contains("gemini", "flux"));
        assert_eq!(reloaded, results);
    }

    #[test]
    fn test_results_with_extra_keys_keep_ratings() {
        let (_temp, unit) = unit_with_metadata("{}");
        fs::write(
            unit.results_path("gemini"),
            r#"{"gemini": {"flux": {"prompt_relevance": 2}}, "version": 1}"#,
        )
        .expect("write");

        let mut results = unit.load_results("gemini");
        assert!(results.contains("gemini", "flux"));

        let rating = parse_rating(
            "{\"prompt_relevance\":4,\"aesthetic_quality\":5,\"content_coherence\":3,\"artifacts\":5}",
        )
        .expect("rating");
        assert!(results.insert("gemini", "sdxl", rating));
        unit.save_results("gemini", &results).expect("save");

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(unit.results_path("gemini")).expect("read"))
                .expect("json");
        assert_eq!(written["version"], 1);
        assert_eq!(written["gemini"]["flux"]["prompt_relevance"], 2);
        assert_eq!(written["gemini"]["sdxl"]["artifacts"], 5);
    }

    #[test]
    fn test_output_images_and_candidates() {
        let (_temp, unit) = unit_with_metadata("{}");
        assert_eq!(unit.candidate_images().expect("list"), None);
        assert_eq!(unit.output_image("flux"), None);

        unit.write_output_image("sdxl", "png", b"png").expect("write");
        unit.write_output_image("flux", "jpg", b"jpg").expect("write");
        fs::write(unit.output_dir().join("notes.txt"), "x").expect("write");

        assert!(unit.output_image("flux").is_some());
        let candidates = unit.candidate_images().expect("list").expect("dir exists");
        let names: Vec<_> = candidates.iter().map(|c| c.backend.as_str()).collect();
        assert_eq!(names, vec!["flux", "sdxl"]);
    }

    #[test]
    fn test_cond_image_paths_keep_order() {
        let (_temp, unit) = unit_with_metadata("{}");
        let meta = ExampleMetadata {
            cond_images: vec!["b.png".to_string(), "a.png".to_string()],
            ..Default::default()
        };
        let paths = unit.cond_image_paths(&meta);
        assert_eq!(paths[0], unit.path().join("b.png"));
        assert_eq!(paths[1], unit.path().join("a.png"));
    }
}
