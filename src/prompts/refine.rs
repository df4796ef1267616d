//! Prompt refinement instruction.
//!
//! Asks the text backend to rewrite a dataset prompt so that it is specific
//! enough for both humans and models, without changing its intent.

use crate::categories::TaskCode;

const GENERIC_PHRASES: [&str; 3] = ["make it better", "something cool", "nice image"];

/// Builds the rewrite instruction for one example.
///
/// # Arguments
///
/// * `task` - Task category of the example
/// * `topic` - Topic label (already resolved from its code)
/// * `original_prompt` - The dataset prompt to rewrite
/// * `image_count` - Number of conditioning images attached to the request
pub fn build_refine_instruction(
    task: TaskCode,
    topic: &str,
    original_prompt: &str,
    image_count: usize,
) -> String {
    let mut instruction = format!(
        "Rewrite the following dataset prompt for an image generation/editing task.\n\n\
         Task: {label}\n\
         Definition: {definition}\n\
         Topic: {topic}\n\
         Original Prompt: \"{prompt}\"\n\
         Conditioning Images: {image_count}\n\n\
         The revised prompt should:\n\
         - Match the task's intended function (e.g., generate, edit)\n\
         - Be clear, specific, and detailed enough for both humans and models to follow\n\
         - Avoid vague or generic phrases like 'make it nice' or 'improve this'\n\
         - Be concise, neither too short nor overly long\n\
         - Include specific positional or spatial details when relevant (e.g., 'on the left', 'in the top-right corner')\n",
        label = task.label(),
        definition = task.definition(),
        topic = topic,
        prompt = original_prompt,
        image_count = image_count,
    );

    if task.requires_images() && image_count > 0 {
        instruction.push_str(
            "- Refer to conditioning images using numbered labels (e.g., image 1, image 2, etc.)\n",
        );
        instruction.push_str(
            "- Consider the content of the provided image(s) to clarify or enhance the description\n",
        );
    }

    if task.is_editing() {
        instruction.push_str("- Clearly specify which image is the source image for editing.\n");
    }

    instruction.push_str(
        "- **Do NOT change the original intent or visual outcome described by the prompt**\n\n",
    );
    instruction.push_str("Return only the rewritten prompt.");
    instruction
}

/// Flags prompts that are too short or too generic to be useful as-is.
pub fn is_weak_prompt(prompt: &str) -> bool {
    let lowered = prompt.to_lowercase();
    prompt.split_whitespace().count() < 4 || GENERIC_PHRASES.iter().any(|p| lowered.contains(p))
}
