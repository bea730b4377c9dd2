//! Completion requests for each step. Wording is deliberately plain; the
//! engine only depends on the JSON shapes the think and synthesis prompts ask for.

use ambient_core::{CompletionRequest, DocumentName, MemorySnapshot, ModelTier, Transcript};
use chrono::{DateTime, Utc};

fn stamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn memory_block(snapshot: &MemorySnapshot, names: &[DocumentName]) -> String {
    names
        .iter()
        .filter(|n| !snapshot.get(**n).trim().is_empty())
        .map(|n| format!("<{}>\n{}\n</{}>", n.file_name(), snapshot.get(*n).trim(), n.file_name()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn chat_system(snapshot: &MemorySnapshot) -> String {
    format!(
        "You are an ambient companion with persistent memory of one person.\n\n\
         <memory>\n{}\n</memory>\n\n\
         Talk naturally and refer back to what you remember when it helps. \
         Keep replies conversational unless detail is asked for. \
         If something in memory looks outdated, say so.",
        snapshot.render_all()
    )
}

/// Reply to the latest inbound message, with the live session as context.
pub fn reply(snapshot: &MemorySnapshot, live: &Transcript, now: DateTime<Utc>) -> CompletionRequest {
    let prompt = format!(
        "Current time: {}\n\nConversation so far:\n\n{}\n\nWrite your next reply.",
        stamp(now),
        live.render()
    );
    CompletionRequest::new(ModelTier::Quality, prompt).with_system(chat_system(snapshot))
}

pub fn synthesis(
    tier: ModelTier,
    snapshot: &MemorySnapshot,
    transcript: &Transcript,
    now: DateTime<Utc>,
    summary_window_days: u32,
) -> CompletionRequest {
    let prompt = format!(
        "Update the companion's memory after a conversation.\n\n\
         Current time: {now}\n\n\
         <current_memory>\n{memory}\n</current_memory>\n\n\
         <conversation started=\"{started}\">\n{conversation}\n</conversation>\n\n\
         Reply with one JSON object:\n\
         {{\"updates\": {{\"<file name>\": \"<complete new content>\"}}, \"reasoning\": \"<short>\"}}\n\n\
         Rules:\n\
         - Only include files with meaningful changes. Valid files: user_context.md, \
         conversation_summary.md, active_threads.md, queue.md.\n\
         - identity.md is never updated.\n\
         - Give the complete file content, not a diff.\n\
         - conversation_summary.md: add a dated entry for this conversation and drop entries \
         older than {summary_window_days} days.\n\
         - If nothing is worth saving: {{\"updates\": {{}}, \"reasoning\": \"nothing new\"}}",
        now = stamp(now),
        memory = memory_block(snapshot, &DocumentName::ALL),
        started = stamp(transcript.started_at),
        conversation = transcript.render(),
    );
    CompletionRequest::new(tier, prompt).with_max_tokens(4096)
}

/// Cheap "should I act?" question over the lightweight context.
pub fn think(
    snapshot: &MemorySnapshot,
    journal: &str,
    now: DateTime<Utc>,
    hours_since_last_proactive: Option<f64>,
    proactive_count_today: u32,
) -> CompletionRequest {
    let since = match hours_since_last_proactive {
        Some(h) => format!("{h:.1}"),
        None => "never".to_string(),
    };
    let journal = if journal.trim().is_empty() {
        "(empty)".to_string()
    } else {
        journal.to_string()
    };
    let prompt = format!(
        "You run periodically and decide whether anything needs doing.\n\n\
         <context>\n{memory}\n</context>\n\n\
         <journal>\n{journal}\n</journal>\n\n\
         Current time: {now}\n\
         Hours since last message you initiated: {since}\n\
         Messages you initiated today: {proactive_count_today}\n\n\
         Only choose \"message\" when reaching out now has real value to the person. \
         Reply with one JSON object:\n\
         {{\"decision\": \"message\" | \"journal_only\" | \"noop\", \
         \"rationale\": \"<short>\", \
         \"message_reason\": \"<why, when decision is message>\", \
         \"journal_entry\": \"<reflection or null>\", \
         \"queue_update\": \"<complete new queue.md or null>\", \
         \"threads_update\": \"<complete new active_threads.md or null>\"}}",
        memory = memory_block(snapshot, &DocumentName::LIGHTWEIGHT),
        now = stamp(now),
    );
    CompletionRequest::new(ModelTier::Cheap, prompt)
}

pub fn compose_proactive(snapshot: &MemorySnapshot, reason: &str, now: DateTime<Utc>) -> CompletionRequest {
    let prompt = format!(
        "You decided to reach out first.\n\n\
         Current time: {}\nReason: {}\n\n\
         Write the message itself: one to three sentences, specific to what you remember, \
         no apology for reaching out and no mention of being prompted.",
        stamp(now),
        reason
    );
    CompletionRequest::new(ModelTier::Quality, prompt).with_system(chat_system(snapshot))
}

pub fn greeting(snapshot: &MemorySnapshot, now: DateTime<Utc>) -> CompletionRequest {
    let prompt = format!(
        "Current time: {}\n\nYou just came back online. Write a short, natural hello \
         that picks up from what you remember, in one or two sentences.",
        stamp(now)
    );
    CompletionRequest::new(ModelTier::Quality, prompt).with_system(chat_system(snapshot))
}
