//! Prompt templates.
//!
//! Plain functions from a typed step input to prompt text. Wording can change
//! freely; what matters to the rest of the crate is which inputs each prompt
//! carries and, for content, that the image placeholder token is requested.

use std::fmt::Write as _;

use crate::placeholder::IMAGE_PLACEHOLDER;
use crate::steps::{ContentInput, IdeaInput, PlanInput, ScriptInput};

/// Instruction sent alongside the image for background removal.
pub const BACKGROUND_REMOVAL_PROMPT: &str = "Remove the background from this image. \
Keep the main subject exactly as it is and make everything else fully transparent. \
Return the result as a PNG image with an alpha channel.";

/// Framing cue used for the first module's narration.
pub const INTRODUCTION_CUE: &str = "introduce the overall topic";

/// Framing cue used for later modules' narration.
pub const CONTINUATION_CUE: &str = "We just covered";

/// Prompt for breaking a topic into modules.
#[must_use]
pub fn plan_prompt(input: &PlanInput) -> String {
    let max = input.max_modules.max(1);
    let min = max.min(2);
    format!(
        "You are an expert curriculum designer. Break the academic topic \"{topic}\" into \
{min} to {max} sequential learning modules. Order them so each module builds on the \
previous one.\n\n\
For each module give a short, descriptive title and a concept of one or two sentences \
explaining what the learner will understand by the end of it.\n\n\
Respond with JSON containing \"overallTopic\" (the topic as given) and \"plannedModules\", \
an array of objects with \"title\" and \"concept\".",
        topic = input.topic,
    )
}

/// Prompt for a module's title, illustration prompt and concept.
#[must_use]
pub fn idea_prompt(input: &IdeaInput) -> String {
    format!(
        "You are designing one module of an interactive academic lesson about: \"{topic}\".\n\n\
Provide:\n\
1. \"moduleTitle\": a short, catchy title for the module.\n\
2. \"imagePrompt\": a prompt for an image model describing a vibrant, colorful, \
visually engaging illustration (not a simple icon) of the subject, suitable for an \
educational context. The image must not contain any text, letters or labels.\n\
3. \"animationConcept\": two to four sentences explaining the concept, written as the \
informational text of the module.\n\
4. \"suggestedKeywords\": two or three keywords describing the visual and animation \
style (for example \"reveal\", \"flat design\", \"vibrant\").\n\n\
Respond with JSON only.",
        topic = input.topic,
    )
}

/// Prompt for the interactive HTML document.
///
/// The image itself is not sent; the model references it through
/// [`IMAGE_PLACEHOLDER`] and the pipeline substitutes the real data URI later.
#[must_use]
pub fn content_prompt(input: &ContentInput) -> String {
    let keywords = if input.suggested_keywords.is_empty() {
        "clean, educational".to_string()
    } else {
        input.suggested_keywords.join(", ")
    };

    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "You are an expert educational web developer. Create a single, self-contained HTML \
document for an interactive lesson module."
    );
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "Module title: {}", input.module_title);
    let _ = writeln!(prompt, "Concept to teach: {}", input.animation_concept);
    let _ = writeln!(prompt, "Style keywords: {keywords}");
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "Requirements:");
    let _ = writeln!(
        prompt,
        "- Put all CSS in <style> tags and all JavaScript in <script> tags; load nothing external."
    );
    let _ = writeln!(
        prompt,
        "- Organize the lesson into tabs: an overview with the title and concept, a set of \
flip-card flashcards for key terms, and a short multiple-choice quiz with instant feedback."
    );
    let _ = writeln!(
        prompt,
        "- Show the module illustration in an <img> tag whose src attribute is exactly \
\"{IMAGE_PLACEHOLDER}\". Do not alter this token; it is replaced with the real image later."
    );
    let _ = writeln!(
        prompt,
        "- Use a modern, colorful, responsive layout with a gentle entrance animation."
    );
    let _ = writeln!(prompt);
    let _ = write!(
        prompt,
        "Respond with JSON containing a single field \"htmlContent\" holding the complete document."
    );
    prompt
}

/// Prompt for the narration script.
///
/// The first module introduces the overall topic. Later modules continue from
/// the previous module's concept instead of introducing the topic again.
#[must_use]
pub fn script_prompt(input: &ScriptInput) -> String {
    let mut prompt = format!(
        "You are an expert scriptwriter for educational audio narration, guiding a student \
through a multi-part lesson.\nThe overall topic is \"{topic}\".\nThis is module {position} \
of {total}.\n\n",
        topic = input.overall_topic,
        position = input.module_index + 1,
        total = input.total_modules.max(input.module_index + 1),
    );

    match (input.module_index, input.previous_module_concept.as_deref()) {
        (0, _) => {
            let _ = write!(
                prompt,
                "For this first module, titled \"{title}\", {INTRODUCTION_CUE} \"{topic}\" \
with a brief, engaging opening. Then explain clearly: \"{concept}\". Make it sound like the \
beginning of a learning journey.",
                title = input.current_module_title,
                topic = input.overall_topic,
                concept = input.current_module_concept,
            );
        }
        (_, Some(previous)) => {
            let _ = write!(
                prompt,
                "{CONTINUATION_CUE} \"{previous}\". Now, in the module \"{title}\", build on \
that and explain clearly: \"{concept}\". Connect it to what came before and make the \
transition smooth, as if continuing a lesson. Do not re-introduce the topic.",
                title = input.current_module_title,
                concept = input.current_module_concept,
            );
        }
        (_, None) => {
            let _ = write!(
                prompt,
                "This module, \"{title}\", continues an ongoing lesson. Explain clearly: \
\"{concept}\". Do not re-introduce the topic.",
                title = input.current_module_title,
                concept = input.current_module_concept,
            );
        }
    }

    prompt.push_str(
        "\n\nThe script should be conversational, easy for a text-to-speech engine to read, \
and about 100 to 150 words long. Output only the narration text, with no headings, \
prefixes or markdown.",
    );
    prompt
}
