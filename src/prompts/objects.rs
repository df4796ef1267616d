//! Required-object extraction instruction.

use crate::categories::TaskCode;

/// Upper bound on listed objects requested from the backend (advisory only).
pub const MAX_OBJECTS: usize = 10;

/// Builds the instruction asking for the visual elements the final image must contain.
pub fn build_objects_instruction(
    task: TaskCode,
    topic: &str,
    prompt: &str,
    image_count: usize,
) -> String {
    let mut instruction = format!(
        "You are given a task for image generation or editing.\n\n\
         **Task Type:** {label}\n\
         **Definition:** {definition}\n\
         **Topic:** {topic}\n\
         **Original Prompt:** \"{prompt}\"\n\
         **Conditioning Images:** {image_count}\n\n\
         **Your Goal:**\n\
         List the **objects, elements, or visual components that must appear in the final output image.**\n\n\
         **Guidelines:**\n\
         - **Do not** explain how the image is generated or edited.\n\
         - **Do not** describe editing steps or transformations.\n\
         - **Only output the final visual content.**\n\
         - **List at most {max} items**. If more objects could be extracted, include only the {max} most important or visually dominant ones.\n\
         - If spatial or positional details are specified (e.g., 'on the left', 'in front of'), retain them in the list.\n\
         - **If the prompt says to remove or delete something, list that object as well and write: (should not be present).**\n",
        label = task.label(),
        definition = task.definition(),
        topic = topic,
        prompt = prompt,
        image_count = image_count,
        max = MAX_OBJECTS,
    );

    if image_count > 0 {
        instruction
            .push_str("- Consider the content of the provided images or reference images if relevant.\n");
    }

    instruction.push_str(
        "\n**Output Format:**\n\
         Return the list exactly like this:\n\n\
         - red sports car\n\
         - highway\n\
         - sunset sky\n\n\
         **Do not include any explanations, extra text, or headings. Only the bullet list.**\n",
    );
    instruction
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_objects_instruction_fields() {
        let instruction =
            build_objects_instruction(TaskCode::Tie, "Photorealistic Images", "remove the car", 1);
        assert!(instruction.contains("**Task Type:** Text-guided Image Editing"));
        assert!(instruction.contains("List at most 10 items"));
        assert!(instruction.contains("(should not be present)"));
        assert!(instruction.contains("reference images if relevant"));
        assert!(instruction.contains("- red sports car\n"));
    }

    #[test]
    fn test_no_image_hint_without_images() {
        let instruction = build_objects_instruction(TaskCode::Tig, "Artworks", "a fox", 0);
        assert!(!instruction.contains("reference images if relevant"));
    }
}
