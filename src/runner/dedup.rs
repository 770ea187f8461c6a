//! Title de-duplication.
//!
//! Card markup on several sites nests the visible title inside an
//! accessibility copy of itself, so extraction yields strings like
//! "Senior Engineer Senior Engineer". The repetition is always the title
//! repeated as a prefix of itself, with the second occurrence usually the
//! more complete one.

/// Strip a leading repetition from an extracted title. Pure and idempotent;
/// titles shorter than 10 characters or 4 words are returned as-is.
pub fn dedup_title(raw: &str) -> String {
    let text = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let words: Vec<&str> = text.split(' ').filter(|w| !w.is_empty()).collect();
    if text.len() < 10 || words.len() < 4 {
        return text;
    }
    let count = words.len();
    for n in (count / 3).max(1)..=count / 2 {
        if words[n..n + n] == words[..n] {
            return words[n..].join(" ");
        }
    }
    text
}
