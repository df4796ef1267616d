//! End-to-end sweeps over a temporary dataset with scripted backends.
//!
//! No network access: the backends below count their calls and answer from
//! a fixed script, which lets the tests check resumability and failure
//! isolation across repeated sweeps.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use imagen_forge::backend::{
    GeneratedImage, GenerationBackend, GenerationRequest, RequestPart, TextBackend, TextRequest,
    TextResponse,
};
use imagen_forge::dataset::{EvaluationPolicy, UnitDir};
use imagen_forge::pipeline::{
    EvaluateStage, GenerateStage, ObjectsStage, RefineStage, SweepConfig, SweepDriver,
};
use imagen_forge::BackendError;
use serde_json::Value;
use tempfile::{tempdir, TempDir};

const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

const RATING: &str = r#"```json
{"prompt_relevance": 4, "aesthetic_quality": 3, "content_coherence": 5, "artifacts": 4, "reasoning": "ok"}
```"#;

/// Text backend answering every request with the same reply.
struct ScriptedText {
    reply: Mutex<String>,
    fail: AtomicBool,
    calls: AtomicUsize,
    requests: Mutex<Vec<TextRequest>>,
}

impl ScriptedText {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(reply.to_string()),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn set_reply(&self, reply: &str) {
        *self.reply.lock().expect("lock") = reply.to_string();
    }

    fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_request(&self) -> TextRequest {
        self.requests
            .lock()
            .expect("lock")
            .last()
            .cloned()
            .expect("at least one request")
    }
}

#[async_trait]
impl TextBackend for ScriptedText {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: TextRequest) -> Result<TextResponse, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().expect("lock").push(request);
        if self.fail.load(Ordering::SeqCst) {
            return Err(BackendError::RateLimited("quota exhausted".to_string()));
        }
        Ok(TextResponse {
            text: self.reply.lock().expect("lock").clone(),
            finish_reason: Some("stop".to_string()),
            usage: None,
        })
    }
}

/// Generation backend returning a tiny PNG.
struct ScriptedGenerator {
    name: String,
    fail: AtomicBool,
    calls: AtomicUsize,
    image_counts: Mutex<Vec<usize>>,
}

impl ScriptedGenerator {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            image_counts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for ScriptedGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedImage, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.image_counts
            .lock()
            .expect("lock")
            .push(request.images.len());
        if self.fail.load(Ordering::SeqCst) {
            return Err(BackendError::Timeout { seconds: 1 });
        }
        Ok(GeneratedImage::new(PNG_BYTES.to_vec()))
    }
}

fn write_unit(root: &Path, task: &str, name: &str, metadata: &str, cond: &[&str]) -> PathBuf {
    let dir = root.join(task).join(name);
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(dir.join("metadata.json"), metadata).expect("write metadata");
    for file in cond {
        fs::write(dir.join(file), PNG_BYTES).expect("write image");
    }
    dir
}

/// One text-only unit and one editing unit with a reference image.
fn sample_dataset() -> (TempDir, PathBuf, PathBuf) {
    let temp = tempdir().expect("tempdir");
    let tig = write_unit(
        temp.path(),
        "TIG",
        "TIG_A_000001",
        r#"{"task":"TIG","topic":"A","prompt":"a lighthouse at dusk","cond_images":[],"source":"bench-v1"}"#,
        &[],
    );
    let tie = write_unit(
        temp.path(),
        "TIE",
        "TIE_P_000001",
        r#"{"task":"TIE","topic":"P","prompt":"make the sky stormy","cond_images":["cond_0.png"]}"#,
        &["cond_0.png"],
    );
    (temp, tig, tie)
}

fn config(root: &Path) -> SweepConfig {
    SweepConfig::new(root).with_delay(Duration::ZERO)
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).expect("read")).expect("json")
}

#[tokio::test]
async fn test_refine_sweep_is_idempotent() {
    let (temp, tig, _tie) = sample_dataset();
    let backend = ScriptedText::new("  A tall striped lighthouse glowing at dusk.  ");
    let driver = SweepDriver::new(config(temp.path()));
    let stage = RefineStage::new(backend.clone());

    let first = driver.run(&stage).await;
    assert_eq!(first.units_seen, 2);
    assert_eq!(first.items_persisted, 2);
    assert_eq!(backend.calls(), 2);

    let metadata = read_json(&tig.join("metadata.json"));
    assert_eq!(
        metadata["prompt_refined"],
        "A tall striped lighthouse glowing at dusk."
    );
    // unknown keys survive the rewrite
    assert_eq!(metadata["source"], "bench-v1");
    assert_eq!(metadata["prompt"], "a lighthouse at dusk");

    let second = driver.run(&stage).await;
    assert_eq!(second.units_complete, 2);
    assert_eq!(second.items_attempted, 0);
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn test_refine_attaches_reference_images() {
    let (temp, tig, _tie) = sample_dataset();
    let backend = ScriptedText::new("refined");
    let config = config(temp.path()).with_tasks(vec!["TIE".parse().expect("task")]);

    let summary = SweepDriver::new(config)
        .run(&RefineStage::new(backend.clone()))
        .await;

    // only the TIE category is visited
    assert_eq!(summary.units_seen, 1);
    assert_eq!(backend.calls(), 1);
    assert!(read_json(&tig.join("metadata.json"))
        .get("prompt_refined")
        .is_none());

    let request = backend.last_request();
    assert_eq!(request.image_count(), 1);
    let RequestPart::Text(instruction) = &request.parts[0] else {
        panic!("instruction should come first");
    };
    assert!(instruction.contains("make the sky stormy"));
}

#[tokio::test]
async fn test_failed_attempt_leaves_unit_pending() {
    let (temp, tig, _tie) = sample_dataset();
    let backend = ScriptedText::new("refined");
    backend.set_failing(true);
    let driver = SweepDriver::new(config(temp.path()));
    let stage = RefineStage::new(backend.clone());

    let before = fs::read_to_string(tig.join("metadata.json")).expect("read");
    let failed = driver.run(&stage).await;
    assert_eq!(failed.items_failed, 2);
    assert_eq!(failed.items_persisted, 0);
    assert_eq!(
        fs::read_to_string(tig.join("metadata.json")).expect("read"),
        before
    );

    backend.set_failing(false);
    let retried = driver.run(&stage).await;
    assert_eq!(retried.items_persisted, 2);
    assert_eq!(backend.calls(), 4);
}

#[tokio::test]
async fn test_empty_text_response_is_not_persisted() {
    let (temp, tig, _tie) = sample_dataset();
    let backend = ScriptedText::new("   ");
    let driver = SweepDriver::new(config(temp.path()));

    let summary = driver.run(&RefineStage::new(backend.clone())).await;
    assert_eq!(summary.items_failed, 2);
    assert!(read_json(&tig.join("metadata.json"))
        .get("prompt_refined")
        .is_none());

    let objects = driver.run(&ObjectsStage::new(backend)).await;
    assert_eq!(objects.items_failed, 2);
}

#[tokio::test]
async fn test_objects_sweep_stores_bullets() {
    let (temp, tig, _tie) = sample_dataset();
    let backend = ScriptedText::new("Here you go:\n- lighthouse\n- dusk sky\n* sea");
    let driver = SweepDriver::new(config(temp.path()));
    let stage = ObjectsStage::new(backend.clone());

    let summary = driver.run(&stage).await;
    assert_eq!(summary.items_persisted, 2);

    let metadata = read_json(&tig.join("metadata.json"));
    assert_eq!(
        metadata["objects"],
        serde_json::json!(["lighthouse", "dusk sky", "sea"])
    );

    driver.run(&stage).await;
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn test_generate_sweep_writes_outputs() {
    let (temp, tig, tie) = sample_dataset();
    let backend = ScriptedGenerator::new("flux");
    let driver = SweepDriver::new(config(temp.path()));
    let stage = GenerateStage::new(backend.clone());

    let summary = driver.run(&stage).await;
    assert_eq!(summary.items_persisted, 2);
    assert!(tig.join("model_output").join("flux.png").exists());
    assert!(tie.join("model_output").join("flux.png").exists());

    // TIE comes first in lexical order and carries its reference image
    assert_eq!(*backend.image_counts.lock().expect("lock"), vec![1, 0]);

    driver.run(&stage).await;
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn test_generate_requires_reference_images() {
    let temp = tempdir().expect("tempdir");
    let unit = write_unit(
        temp.path(),
        "SRIG",
        "SRIG_S_000001",
        r#"{"task":"SRIG","topic":"S","prompt":"same window, dark theme","cond_images":["missing.png"]}"#,
        &[],
    );
    let backend = ScriptedGenerator::new("flux");

    let summary = SweepDriver::new(config(temp.path()))
        .run(&GenerateStage::new(backend.clone()))
        .await;

    assert_eq!(summary.items_failed, 1);
    assert_eq!(backend.calls(), 0);
    assert!(!unit.join("model_output").exists());
}

#[tokio::test]
async fn test_generation_failure_writes_nothing() {
    let (temp, tig, _tie) = sample_dataset();
    let backend = ScriptedGenerator::new("flux");
    backend.fail.store(true, Ordering::SeqCst);

    let summary = SweepDriver::new(config(temp.path()))
        .run(&GenerateStage::new(backend.clone()))
        .await;

    assert_eq!(summary.items_failed, 2);
    assert!(UnitDir::new(&tig).output_image("flux").is_none());
}

#[tokio::test]
async fn test_evaluate_sweep_rates_candidates() {
    let (temp, tig, tie) = sample_dataset();
    for dir in [&tig, &tie] {
        let outputs = dir.join("model_output");
        fs::create_dir_all(&outputs).expect("mkdir");
        fs::write(outputs.join("flux.png"), PNG_BYTES).expect("write");
        fs::write(outputs.join("uno.png"), PNG_BYTES).expect("write");
    }

    let backend = ScriptedText::new(RATING);
    let driver = SweepDriver::new(config(temp.path()));
    let stage = EvaluateStage::new(backend.clone(), EvaluationPolicy::default());

    let summary = driver.run(&stage).await;
    // uno is only rated on the generation task
    assert_eq!(summary.items_persisted, 3);
    assert_eq!(backend.calls(), 3);

    let tig_results = read_json(&tig.join("gemini_result.json"));
    assert_eq!(tig_results["gemini"]["flux"]["content_coherence"], 5);
    assert_eq!(tig_results["gemini"]["flux"]["artifacts"], 4);
    assert_eq!(tig_results["gemini"]["flux"]["reasoning"], "ok");
    assert!(tig_results["gemini"]["uno"].is_object());

    let tie_results = read_json(&tie.join("gemini_result.json"));
    assert!(tie_results["gemini"]["flux"].is_object());
    assert!(tie_results["gemini"].get("uno").is_none());

    let request = backend.last_request();
    assert!(request.json_output);
    assert_eq!(request.temperature, Some(0.0));

    let second = driver.run(&stage).await;
    assert_eq!(second.items_attempted, 0);
    assert_eq!(backend.calls(), 3);
}

#[tokio::test]
async fn test_malformed_rating_is_retried() {
    let (temp, tig, _tie) = sample_dataset();
    let outputs = tig.join("model_output");
    fs::create_dir_all(&outputs).expect("mkdir");
    fs::write(outputs.join("flux.png"), PNG_BYTES).expect("write");

    let backend = ScriptedText::new(r#"{"prompt_relevance": 4, "aesthetic_quality": 5}"#);
    let config = config(temp.path()).with_tasks(vec!["TIG".parse().expect("task")]);
    let driver = SweepDriver::new(config);
    let stage = EvaluateStage::new(backend.clone(), EvaluationPolicy::default());

    let failed = driver.run(&stage).await;
    assert_eq!(failed.items_failed, 1);
    assert!(!tig.join("gemini_result.json").exists());

    backend.set_reply(RATING);
    let retried = driver.run(&stage).await;
    assert_eq!(retried.items_persisted, 1);
    assert!(tig.join("gemini_result.json").exists());
}

#[tokio::test]
async fn test_corrupted_results_are_rebuilt() {
    let (temp, tig, _tie) = sample_dataset();
    let outputs = tig.join("model_output");
    fs::create_dir_all(&outputs).expect("mkdir");
    fs::write(outputs.join("flux.png"), PNG_BYTES).expect("write");
    fs::write(tig.join("gemini_result.json"), "{ not json").expect("write");

    let backend = ScriptedText::new(RATING);
    let config = config(temp.path()).with_tasks(vec!["TIG".parse().expect("task")]);
    let summary = SweepDriver::new(config)
        .run(&EvaluateStage::new(backend, EvaluationPolicy::default()))
        .await;

    assert_eq!(summary.items_persisted, 1);
    let results = read_json(&tig.join("gemini_result.json"));
    assert_eq!(results["gemini"]["flux"]["prompt_relevance"], 4);
}

#[tokio::test]
async fn test_units_outside_task_dirs_are_skipped() {
    let (temp, _tig, _tie) = sample_dataset();
    write_unit(
        temp.path(),
        "misc",
        "notes",
        r#"{"prompt":"stray"}"#,
        &[],
    );
    write_unit(temp.path(), "TIG", "TIG_A_000002", "{ broken", &[]);

    let backend = ScriptedText::new("refined");
    let summary = SweepDriver::new(config(temp.path()))
        .run(&RefineStage::new(backend.clone()))
        .await;

    assert_eq!(summary.units_seen, 4);
    assert_eq!(summary.units_skipped, 2);
    assert_eq!(summary.items_persisted, 2);
    assert_eq!(backend.calls(), 2);
}
