use super::*;

fn budget(max_chars: usize) -> ChunkingConfig {
    ChunkingConfig { max_chars }
}

#[test]
fn small_budget_splits_every_paragraph() {
    let chunks = chunk_text("A\n\nB\n\nC", &budget(3));
    assert_eq!(chunks, vec!["A", "B", "C"]);
}

#[test]
fn large_budget_keeps_single_chunk() {
    let chunks = chunk_text("A\n\nB\n\nC", &ChunkingConfig::default());
    assert_eq!(chunks, vec!["A\n\nB\n\nC"]);
}

#[test]
fn normalizes_line_endings_and_blank_runs() {
    assert_eq!(normalize_text("a\r\nb\r\n\r\n\r\n\r\nc"), "a\nb\n\nc");
    assert_eq!(normalize_text("a\n\n\n\n\nb"), "a\n\nb");
    assert_eq!(normalize_text("a\n  \n\t\nb"), "a\n\nb");
    assert_eq!(normalize_text("a\rb"), "a\nb");
}

#[test]
fn blank_paragraphs_are_dropped() {
    let chunks = chunk_text("\n\n   \n\nfirst\n\n \t \n\nsecond\n\n", &ChunkingConfig::default());
    assert_eq!(chunks, vec!["first\n\nsecond"]);
}

#[test]
fn empty_text_yields_no_chunks() {
    assert!(chunk_text("", &ChunkingConfig::default()).is_empty());
    assert!(chunk_text(" \n\n \r\n ", &ChunkingConfig::default()).is_empty());
}

#[test]
fn oversized_paragraph_is_emitted_whole() {
    let long = "x".repeat(50);
    let text = format!("short\n\n{}\n\ntail", long);
    let chunks = chunk_text(&text, &budget(20));

    assert_eq!(chunks, vec!["short".to_string(), long, "tail".to_string()]);
}

#[test]
fn chunks_respect_budget_and_preserve_order() {
    let paragraphs: Vec<String> = (0..40)
        .map(|i| format!("Paragraph {} {}", i, "word ".repeat(i % 7 + 1)))
        .collect();
    let text = paragraphs.join("\n\n\n");
    let config = budget(120);

    let chunks = chunk_text(&text, &config);

    for chunk in &chunks {
        assert!(!chunk.trim().is_empty());
        assert!(chunk.chars().count() <= config.max_chars);
    }

    let rejoined: Vec<&str> = chunks
        .iter()
        .flat_map(|chunk| chunk.split(PARAGRAPH_SEPARATOR))
        .collect();
    let expected: Vec<&str> = paragraphs.iter().map(String::as_str).collect();
    assert_eq!(rejoined, expected);
}

#[test]
fn budget_counts_characters_not_bytes() {
    // 15 characters including the separator, 41 bytes in UTF-8
    let chunks = chunk_text("太阳从东边升起\n\n植物需要光合", &budget(16));
    assert_eq!(chunks.len(), 1);
}

#[test]
fn document_page_range_label() {
    let document = chunk_document("one\n\ntwo", 12, &ChunkingConfig::default());
    assert_eq!(document.chunks, vec!["one\n\ntwo"]);
    assert_eq!(document.page_range.as_deref(), Some("1-12"));

    assert_eq!(page_range_label(0), None);
}
