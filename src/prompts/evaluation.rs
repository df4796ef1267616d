//! Evaluation rubric for candidate images.

/// Rubric sent ahead of the prompt, references and candidate image.
pub const EVALUATION_INSTRUCTION: &str = r#"
You are an expert AI image evaluator. Your task is to rate a generated image based on a provided text prompt and any reference images.

Use the following guidelines for your assessment. Provide a rating from 1 to 5 for each criterion. Do NOT include any additional text or explanations in your response. The response MUST be a single JSON object.

# Quality Assessment

## Prompt Relevance
Definition: Whether the image accurately reflects or responds to the prompt.
Rating Guide (1-5):
1 - Completely unrelated to the prompt.
2 - Mostly incorrect; some vague connections but many mismatches.
3 - Partially relevant; key ideas are present but with errors or omissions.
4 - Mostly accurate; follows the prompt well with minor issues.
5 - Fully aligned with the prompt; clear, focused, and complete.

## Aesthetic Quality / Visual Appeal
Definition: Whether the image is visually appealing, clean, and easy to interpret.
Rating Guide (1-5):
1 - Visually poor; unattractive, hard to read or confusing.
2 - Below average; noticeable design flaws, poor readability.
3 - Decent; generally readable but has minor layout/design issues.
4 - Clean and aesthetically good; professional feel with few flaws.
5 - Beautiful, polished, and visually excellent.

## Content Coherence
Definition: Whether the content in the image is logically consistent and fits together meaningfully.
Rating Guide (1-5):
1 - Internally inconsistent or nonsensical; parts contradict each other.
2 - Some logic, but confusing or mismatched components.
3 - Mostly coherent, though there are noticeable mismatches or awkward parts.
4 - Logically sound overall, with only minor inconsistencies.
5 - Completely coherent and internally consistent.

## Artifacts / Visual Errors
Definition: Whether the image has visual flaws due to generation errors (e.g., distortions, glitches).
Rating Guide (1-5):
1 - Severe artifacts that ruin the image.
2 - Major flaws that are clearly noticeable.
3 - Some minor artifacts, but the image remains usable.
4 - Mostly clean; only very subtle flaws if any.
5 - Perfectly clean; no visible artifacts at all.

Output ONLY a single JSON object with keys:
{
  "prompt_relevance": <rating>,
  "aesthetic_quality": <rating>,
  "content_coherence": <rating>,
  "artifacts": <rating>
}
"#;

pub const REFERENCE_IMAGES_HEADER: &str = "Reference images:";
pub const CANDIDATE_IMAGE_HEADER: &str = "Output Image to be Evaluated:";

/// Line carrying the prompt the candidate was generated from.
pub fn prompt_line(prompt: &str) -> String {
    format!("Prompt: {}", prompt)
}
