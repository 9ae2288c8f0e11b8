/// RGBA color with components in `0.0..=1.0`.
pub type Color = [f32; 4];

/// Attributed string: ordered styled runs laid out together.
///
/// The layout engine walks the runs in order and builds line fragments from
/// them. Character indices reported by the engine (visible ranges, fragment
/// char ranges) count the characters of every run in sequence, including
/// runs whose font cannot be resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributedText {
    /// The list of runs to be processed, in display order.
    pub runs: Vec<TextRun>,
}

/// Single run of text sharing one font, size, and color treatment.
#[derive(Clone, Debug, PartialEq)]
pub struct TextRun {
    /// The face used for this run.
    pub font_id: fontdb::ID,
    /// Font size in pixels.
    pub font_size: f32,
    /// The text content of the run.
    pub content: String,
    /// Foreground color of the run's glyphs.
    pub color: Color,
    /// Optional background fill behind the run's glyphs.
    pub background: Option<Color>,
}

impl TextRun {
    /// Creates a run with an opaque black foreground and no background.
    pub fn new(font_id: fontdb::ID, font_size: f32, content: impl Into<String>) -> Self {
        Self {
            font_id,
            font_size,
            content: content.into(),
            color: [0.0, 0.0, 0.0, 1.0],
            background: None,
        }
    }
}

impl Default for AttributedText {
    fn default() -> Self {
        Self::new()
    }
}

impl AttributedText {
    /// Creates an empty attributed string.
    pub fn new() -> Self {
        Self { runs: vec![] }
    }

    /// Appends a run. Runs are laid out in the order they were appended.
    pub fn push(&mut self, run: TextRun) {
        self.runs.push(run);
    }

    /// Total number of characters across all runs.
    pub fn char_count(&self) -> usize {
        self.runs.iter().map(|run| run.content.chars().count()).sum()
    }

    /// Returns whether the string holds no characters at all.
    pub fn is_empty(&self) -> bool {
        self.runs.iter().all(|run| run.content.is_empty())
    }

    /// Multiplies every run's font size by `factor`, in place.
    ///
    /// Content, colors, and run order are untouched; this is the destructive
    /// rewrite the font-size adjuster applies to *duplicates* of the backing
    /// text when probing candidate scales.
    pub fn scale_font_sizes(&mut self, factor: f32) {
        for run in &mut self.runs {
            run.font_size *= factor;
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_font_id() -> fontdb::ID {
        // fontdb::ID is 64-bit on this platform. It might be NonZero, so use 1.
        unsafe { std::mem::transmute(1u64) }
    }

    #[test]
    fn char_count_spans_runs() {
        let mut text = AttributedText::new();
        text.push(TextRun::new(dummy_font_id(), 16.0, "Hello "));
        text.push(TextRun::new(dummy_font_id(), 16.0, "world"));
        assert_eq!(text.char_count(), 11);
        assert!(!text.is_empty());
    }

    #[test]
    fn empty_runs_count_as_empty() {
        let mut text = AttributedText::new();
        text.push(TextRun::new(dummy_font_id(), 16.0, ""));
        assert_eq!(text.char_count(), 0);
        assert!(text.is_empty());
    }

    #[test]
    fn scale_rewrites_only_font_sizes() {
        let mut text = AttributedText::new();
        text.push(TextRun::new(dummy_font_id(), 16.0, "a"));
        text.push(TextRun::new(dummy_font_id(), 20.0, "b"));
        let original = text.clone();

        text.scale_font_sizes(0.5);

        assert_eq!(text.runs[0].font_size, 8.0);
        assert_eq!(text.runs[1].font_size, 10.0);
        assert_eq!(text.runs[0].content, original.runs[0].content);
        assert_eq!(text.runs[1].color, original.runs[1].color);
    }
}
