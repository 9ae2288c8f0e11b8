use std::{collections::HashSet, ops::Range, sync::Arc};

use crate::{
    context::{LayoutComponents, LayoutContext},
    text::layout::TruncationPolicy,
};

/// Tail truncation front-end.
///
/// Construction attaches the truncation policy to the context's engine, so
/// any query made through the context afterwards already sees truncated
/// content. The truncater itself only reads results back out.
pub struct TailTruncater {
    context: Arc<LayoutContext>,
}

impl TailTruncater {
    pub fn new(
        context: Arc<LayoutContext>,
        marker: String,
        avoid: HashSet<char, fxhash::FxBuildHasher>,
    ) -> Self {
        context.with_components(|components, _| {
            components.engine.set_truncation(TruncationPolicy { marker, avoid });
        });
        Self { context }
    }

    /// Character ranges of the original string that remain visible after
    /// truncation, ascending and non-overlapping. Forces a layout pass when
    /// none is cached.
    pub fn visible_ranges(&self) -> Vec<Range<usize>> {
        self.context.with_components(|components, fonts| {
            let LayoutComponents {
                storage,
                container,
                engine,
            } = components;
            engine.ensure(storage, container, fonts).visible_ranges.clone()
        })
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        attributes::TextAttributes,
        font_storage::FontStorage,
        text::data::{AttributedText, TextRun},
    };
    use euclid::default::Size2D;
    use parking_lot::Mutex;

    fn dummy_font_id() -> fontdb::ID {
        // fontdb::ID is 64-bit on this platform. It might be NonZero, so use 1.
        unsafe { std::mem::transmute(1u64) }
    }

    fn context_for(content: &str) -> Arc<LayoutContext> {
        let mut text = AttributedText::new();
        text.push(TextRun::new(dummy_font_id(), 16.0, content));
        let attributes = TextAttributes::new(text);
        LayoutContext::new(
            &attributes,
            Size2D::new(100.0, f32::INFINITY),
            Arc::new(Mutex::new(FontStorage::new())),
        )
    }

    #[test]
    fn construction_attaches_the_policy() {
        let context = context_for("hello");
        assert!(context.with_components(|c, _| !c.engine.has_truncation()));

        let _truncater = TailTruncater::new(
            Arc::clone(&context),
            "…".to_string(),
            HashSet::default(),
        );
        assert!(context.with_components(|c, _| c.engine.has_truncation()));
    }

    #[test]
    fn visible_ranges_are_ascending_and_in_bounds() {
        let context = context_for("hello");
        let truncater =
            TailTruncater::new(Arc::clone(&context), "…".to_string(), HashSet::default());

        let ranges = truncater.visible_ranges();
        let total = context.with_components(|c, _| c.storage.char_count());
        let mut last_end = 0;
        for range in &ranges {
            assert!(range.start >= last_end);
            assert!(range.end <= total);
            last_end = range.end;
        }
    }

    #[test]
    fn empty_text_has_no_visible_ranges() {
        let context = LayoutContext::new(
            &TextAttributes::new(AttributedText::new()),
            Size2D::new(100.0, f32::INFINITY),
            Arc::new(Mutex::new(FontStorage::new())),
        );
        let truncater = TailTruncater::new(context, "…".to_string(), HashSet::default());
        assert!(truncater.visible_ranges().is_empty());
    }
}
