//! Paragraph-aligned text chunking
//!
//! Documents are split into bounded-size segments before embedding. Chunks are
//! aligned to paragraph boundaries so retrieval returns coherent passages
//! instead of mid-sentence fragments.

/// Split text into chunks of approximately `max_chunk_size` characters.
///
/// The input is split on paragraph boundaries (double newline) and paragraphs
/// are accumulated into a running buffer. Whenever appending the next
/// paragraph would push a non-empty buffer past `max_chunk_size`, the buffer
/// is flushed as a completed chunk and the paragraph starts a new one. The
/// remaining buffer is always flushed at the end, and empty chunks are
/// dropped.
///
/// A single paragraph longer than `max_chunk_size` is not split further; it
/// becomes its own oversized chunk. Splitting mid-paragraph would break the
/// retrieval unit, so the bound is deliberately soft.
pub fn chunk_text(text: &str, max_chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n") {
        if current.len() + paragraph.len() > max_chunk_size && !current.is_empty() {
            chunks.push(current.trim().to_string());
            current = paragraph.to_string();
        } else {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(paragraph);
        }
    }

    if !current.is_empty() {
        chunks.push(current.trim().to_string());
    }

    chunks.retain(|chunk| !chunk.is_empty());
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert!(chunk_text("", 1000).is_empty());
        assert!(chunk_text("\n\n\n\n", 1000).is_empty());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("Short text", 1000);
        assert_eq!(chunks, vec!["Short text"]);
    }

    #[test]
    fn test_paragraphs_accumulate() {
        let text = "First paragraph.\n\nSecond paragraph.";
        let chunks = chunk_text(text, 1000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "First paragraph.\n\nSecond paragraph.");
    }

    #[test]
    fn test_flush_on_overflow() {
        // Each paragraph is 20 chars; a 30-char limit fits exactly one.
        let p = "a".repeat(20);
        let text = format!("{}\n\n{}\n\n{}", p, p, p);
        let chunks = chunk_text(&text, 30);
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert_eq!(chunk, &p);
        }
    }

    #[test]
    fn test_size_bound() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {} with some filler words.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_text(&text, 200);
        for chunk in &chunks {
            assert!(chunk.len() <= 200, "chunk exceeded bound: {}", chunk.len());
        }
    }

    #[test]
    fn test_oversized_paragraph_kept_whole() {
        let oversized = "x".repeat(500);
        let text = format!("small\n\n{}\n\nsmall", oversized);
        let chunks = chunk_text(&text, 100);
        assert!(chunks.contains(&oversized));
    }

    #[test]
    fn test_round_trip_coverage() {
        let text = "Alpha one.\n\nBeta two.\n\nGamma three.\n\nDelta four.";
        let chunks = chunk_text(text, 25);
        // Rejoining chunks with the paragraph separator restores the original
        // modulo whitespace trimming at chunk boundaries.
        let rejoined = chunks.join("\n\n");
        assert_eq!(rejoined, text);
    }

    #[test]
    fn test_ordering_preserved() {
        let text = "one\n\ntwo\n\nthree\n\nfour\n\nfive";
        let chunks = chunk_text(&text, 8);
        let flattened: Vec<&str> = chunks
            .iter()
            .flat_map(|c| c.split("\n\n"))
            .collect();
        assert_eq!(flattened, vec!["one", "two", "three", "four", "five"]);
    }
}
