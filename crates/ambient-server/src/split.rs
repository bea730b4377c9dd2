/// Telegram's per-message text limit.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Split `text` into chunks of at most `max` characters, preferring to break
/// at a paragraph, then after a sentence, then at a newline.
pub fn split_message(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text.trim();
    while max > 0 {
        let Some((window_end, _)) = rest.char_indices().nth(max) else {
            break;
        };
        let window = &rest[..window_end];
        let cut = [
            window.rfind("\n\n"),
            window.rfind(". ").map(|i| i + 1),
            window.rfind('\n'),
        ]
        .into_iter()
        .flatten()
        .find(|&i| i > 0)
        .unwrap_or(window_end);

        chunks.push(rest[..cut].trim_end().to_string());
        rest = rest[cut..].trim_start();
    }
    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}
