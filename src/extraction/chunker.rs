/// Split text into chunks of at most `max_chars` characters.
///
/// Paragraphs (blank-line separated) are packed together while they fit; a paragraph
/// that is too long on its own is split on word boundaries, and a single word longer
/// than the limit is cut by characters.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for para in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let para_len = para.chars().count();
        let current_len = current.chars().count();

        if para_len > max_chars {
            flush(&mut current, &mut chunks);
            chunks.extend(split_long_paragraph(para, max_chars));
            continue;
        }

        if !current.is_empty() && current_len + 2 + para_len > max_chars {
            flush(&mut current, &mut chunks);
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(para);
    }

    flush(&mut current, &mut chunks);
    chunks
}

fn flush(current: &mut String, chunks: &mut Vec<String>) {
    if !current.trim().is_empty() {
        chunks.push(std::mem::take(current));
    } else {
        current.clear();
    }
}

fn split_long_paragraph(para: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in para.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > max_chars {
            flush(&mut current, &mut pieces);
            current_len = 0;
            let chars: Vec<char> = word.chars().collect();
            pieces.extend(chars.chunks(max_chars).map(|c| c.iter().collect::<String>()));
            continue;
        }

        let needed = if current.is_empty() { word_len } else { current_len + 1 + word_len };
        if needed > max_chars {
            flush(&mut current, &mut pieces);
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    flush(&mut current, &mut pieces);
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_paragraphs_are_packed() {
        let chunks = chunk_text("Blood pressure 120/80.\n\nPulse 72.", 100);
        assert_eq!(chunks, vec!["Blood pressure 120/80.\n\nPulse 72."]);
    }

    #[test]
    fn test_paragraphs_split_when_full() {
        let chunks = chunk_text("aaaa aaaa\n\nbbbb bbbb\n\ncccc", 12);
        assert_eq!(chunks, vec!["aaaa aaaa", "bbbb bbbb", "cccc"]);
    }

    #[test]
    fn test_long_paragraph_split_on_words() {
        let chunks = chunk_text("one two three four five", 9);
        assert_eq!(chunks, vec!["one two", "three", "four five"]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 9));
    }

    #[test]
    fn test_long_word_cut_by_chars() {
        let chunks = chunk_text("abcdefghij", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_multibyte_text_respects_char_limit() {
        let chunks = chunk_text("résumé über naïve café", 7);
        assert!(chunks.iter().all(|c| c.chars().count() <= 7));
        assert_eq!(chunks.join(" "), "résumé über naïve café");
    }

    #[test]
    fn test_blank_text_has_no_chunks() {
        assert!(chunk_text("  \n\n \n\n", 10).is_empty());
    }
}
