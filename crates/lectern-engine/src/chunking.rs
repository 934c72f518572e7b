//! Overlapping text windows for long documents

/// One window of a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextWindow {
    /// Position in document order
    pub index: usize,
    /// Character offset of the window start
    pub start_char: usize,
    /// Window text
    pub text: String,
}

/// Splits text into windows of `chunk_chars` characters, each repeating the last
/// `overlap` characters of the previous one
///
/// Sizes count Unicode scalar values, so a window never splits a character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlidingWindow {
    chunk_chars: usize,
    overlap: usize,
}

impl SlidingWindow {
    /// Create a new sliding window
    ///
    /// The overlap is clamped below the chunk size so every window advances.
    pub fn new(chunk_chars: usize, overlap: usize) -> Self {
        let chunk_chars = chunk_chars.max(1);
        Self {
            chunk_chars,
            overlap: overlap.min(chunk_chars - 1),
        }
    }

    /// Window size in characters
    pub fn chunk_chars(&self) -> usize {
        self.chunk_chars
    }

    /// Overlap in characters
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` into windows
    ///
    /// Text that fits in one window yields exactly one window; empty text yields none.
    /// The last window always ends at the end of the text.
    pub fn windows(&self, text: &str) -> Vec<TextWindow> {
        // Byte offset of every char boundary, plus the end of the text
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let total_chars = boundaries.len() - 1;
        if total_chars == 0 {
            return Vec::new();
        }

        let step = self.chunk_chars - self.overlap;
        let mut windows = Vec::new();
        let mut start = 0;

        loop {
            let end = (start + self.chunk_chars).min(total_chars);
            windows.push(TextWindow {
                index: windows.len(),
                start_char: start,
                text: text[boundaries[start]..boundaries[end]].to_string(),
            });
            if end == total_chars {
                break;
            }
            start += step;
        }

        windows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_short_text_is_one_window() {
        let windows = SlidingWindow::new(100, 10).windows("short document");
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].text, "short document");
        assert_eq!(windows[0].start_char, 0);
    }

    #[test]
    fn test_empty_text_has_no_windows() {
        assert!(SlidingWindow::new(100, 10).windows("").is_empty());
    }

    #[test]
    fn test_windows_overlap() {
        let text = "abcdefghij";
        let windows = SlidingWindow::new(4, 1).windows(text);
        let texts: Vec<&str> = windows.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["abcd", "defg", "ghij"]);
        assert_eq!(windows[2].start_char, 6);
    }

    #[test]
    fn test_last_window_ends_at_text_end() {
        let windows = SlidingWindow::new(4, 1).windows("abcdefgh");
        let texts: Vec<&str> = windows.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["abcd", "defg", "gh"]);
    }

    #[test]
    fn test_multibyte_characters_are_not_split() {
        let text = "ÄÖÜßéèàç";
        let windows = SlidingWindow::new(3, 1).windows(text);
        assert_eq!(windows[0].text, "ÄÖÜ");
        assert_eq!(windows[1].text, "Üßé");
        assert_eq!(windows.last().unwrap().text.chars().last(), Some('ç'));
    }

    #[test]
    fn test_overlap_clamped() {
        let window = SlidingWindow::new(5, 50);
        assert_eq!(window.overlap(), 4);
        assert_eq!(window.windows("abcdefg").len(), 3);
    }

    proptest! {
        #[test]
        fn prop_windows_cover_text(text in "\\PC{0,400}", chunk in 1usize..60, overlap in 0usize..30) {
            let slider = SlidingWindow::new(chunk, overlap);
            let windows = slider.windows(&text);
            let total = text.chars().count();

            if total == 0 {
                prop_assert!(windows.is_empty());
            } else {
                prop_assert_eq!(windows[0].start_char, 0);
                let last = windows.last().unwrap();
                prop_assert_eq!(last.start_char + last.text.chars().count(), total);

                // Reassembling the non-overlapping parts gives back the text
                let mut rebuilt = String::new();
                let mut covered = 0;
                for w in &windows {
                    prop_assert!(w.text.chars().count() <= slider.chunk_chars());
                    let skip = covered - w.start_char;
                    rebuilt.extend(w.text.chars().skip(skip));
                    covered = w.start_char + w.text.chars().count();
                }
                prop_assert_eq!(rebuilt, text);
            }
        }
    }
}
