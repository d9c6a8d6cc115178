//! Splits long text into segments a speech synthesizer will accept.
//!
//! Segments are cut right after the sentence terminator nearest to the
//! length bound. When a window holds no terminator past its first
//! character the cut is a hard one at exactly `max_length` characters.

use crate::error::DebateError;

/// Default segment bound, just under the synthesis endpoint's input limit.
pub const DEFAULT_MAX_SEGMENT_LENGTH: usize = 4095;

const SENTENCE_TERMINATORS: [char; 3] = ['.', '?', '!'];

/// Split `text` into ordered segments of at most `max_length` characters.
///
/// Lengths are counted in Unicode scalar values so a cut never lands inside
/// a code point. Concatenating the result gives back `text` unchanged.
pub fn split_text(text: &str, max_length: usize) -> Result<Vec<String>, DebateError> {
    if max_length == 0 {
        return Err(DebateError::InvalidSegmentLength(max_length));
    }

    // Byte offset of every char, plus the end of the string.
    let mut offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let char_count = offsets.len();
    offsets.push(text.len());

    let chars: Vec<char> = text.chars().collect();
    let mut segments = Vec::new();
    let mut start = 0;

    while start < char_count {
        let end = start + max_length;

        if end >= char_count {
            segments.push(text[offsets[start]..].to_string());
            break;
        }

        // A terminator at `start` itself never ends a segment.
        let split_point = (start + 1..end)
            .rev()
            .find(|&i| SENTENCE_TERMINATORS.contains(&chars[i]))
            .map(|i| i + 1)
            .unwrap_or(end);

        segments.push(text[offsets[start]..offsets[split_point]].to_string());
        start = split_point;
    }

    Ok(segments)
}
