//! Character-window text splitting for ingestion.
//!
//! Windows are `chunk_size` characters long and consecutive windows share
//! `overlap` characters. A window that would end mid-word is pulled back to
//! the last whitespace inside it, as long as that still advances past the
//! overlap. The overlap likewise starts on a word boundary when one exists.

pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if chunk_size == 0 {
        return Vec::new();
    }
    let overlap = overlap.min(chunk_size - 1);
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = skip_whitespace(&chars, 0);

    while start < chars.len() {
        let mut end = (start + chunk_size).min(chars.len());
        if end < chars.len() {
            let min_end = start + overlap + 1;
            if let Some(pos) = (min_end..end).rev().find(|&i| chars[i].is_whitespace()) {
                end = pos;
            }
        }

        let chunk: String = chars[start..end].iter().collect();
        let trimmed = chunk.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }

        if end >= chars.len() {
            break;
        }
        let mut next = end - overlap;
        if next > 0 && !chars[next - 1].is_whitespace() {
            if let Some(pos) = (next..end).find(|&i| chars[i].is_whitespace()) {
                next = pos;
            }
        }
        start = skip_whitespace(&chars, next);
    }

    chunks
}

fn skip_whitespace(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}
