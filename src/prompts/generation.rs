//! Generation prompt framing.

use crate::categories::TaskCode;

/// Wraps a user prompt with the task definition and visual domain.
///
/// Used for backends that benefit from explicit framing; local editing
/// models usually get the bare prompt instead.
pub fn wrap_generation_prompt(task: TaskCode, topic: &str, user_prompt: &str) -> String {
    format!(
        "You are an expert visual generation assistant.\n\n\
         Task: {label}\n\
         Task Definition: {definition}\n\
         Visual Domain: {topic}\n\
         User Objective: {user_prompt}\n\n\
         Please generate an image that fulfills the user's objective, adheres to the task definition, \
         and fits within the specified visual domain.",
        label = task.label(),
        definition = task.definition(),
    )
}
