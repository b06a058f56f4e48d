//! Prompt construction for note synthesis.

use super::GenerationRequest;

/// Persona used when no system prompt file is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a seasoned software architect with two decades of \
hands-on delivery experience. You turn lecture transcripts into thorough study notes. \
You are opinionated and practical, and you call out the traps people hit in production.";

/// Build the user prompt for one transcript.
///
/// The prompt never mentions files, batches or automation: the gate
/// rejects notes that talk about their own production.
pub fn build_prompt(request: &GenerationRequest, min_length: usize) -> String {
    format!(
        "Write study notes for ONE lecture transcript. You have no file system access \
and must not write scripts; work directly from the text below.

LECTURE: {item}
COURSE: {group}

TRANSCRIPT:
{transcript}

REQUIREMENTS:
1. Cover every concept, pattern, technique, anti-pattern and best practice mentioned.
2. Add expert commentary, warnings and real-world insight.
3. Use markdown with ## and ### headings, bullet lists, **bold** key terms, and fenced code blocks where code is discussed.
4. Include practical examples and gotchas.
5. Write at least {min_length} characters.

OUTPUT: only the markdown notes, with no preamble or confirmation.",
        item = request.item_label,
        group = request.group_label,
        transcript = request.transcript,
    )
}
