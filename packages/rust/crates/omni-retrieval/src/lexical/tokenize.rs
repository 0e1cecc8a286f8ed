//! Tokenizer shared by index build and query.
//!
//! Unicode word segmentation (UAX #29), lowercased. Han ideographs come out of
//! segmentation one character at a time, so adjacent ideographs additionally
//! emit a character bigram ("退款流程" -> 退, 款, 流, 程, 退款, 款流, 流程).

use unicode_segmentation::UnicodeSegmentation;

/// Split `text` into lexical terms.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let mut terms = Vec::new();
    // (end byte offset, char) of the previous single-ideograph word
    let mut prev_ideograph: Option<(usize, char)> = None;

    for (offset, word) in text.unicode_word_indices() {
        let ideograph = single_ideograph(word);
        if let Some(current) = ideograph
            && let Some((prev_end, prev)) = prev_ideograph
            && prev_end == offset
        {
            let mut bigram = String::with_capacity(prev.len_utf8() + current.len_utf8());
            bigram.push(prev);
            bigram.push(current);
            terms.push(bigram);
        }
        prev_ideograph = ideograph.map(|ch| (offset + word.len(), ch));
        terms.push(word.to_lowercase());
    }

    terms
}

fn single_ideograph(word: &str) -> Option<char> {
    let mut chars = word.chars();
    let first = chars.next()?;
    if chars.next().is_none() && is_han(first) {
        Some(first)
    } else {
        None
    }
}

fn is_han(ch: char) -> bool {
    matches!(
        u32::from(ch),
        0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xF900..=0xFAFF | 0x20000..=0x2FFFF
    )
}
