use std::sync::Arc;

use euclid::default::Size2D;

use crate::{
    attributes::TextAttributes,
    context::{LayoutComponents, LayoutContext},
    text::data::AttributedText,
    text::layout::SubstituteScope,
};

/// Searches the candidate scale factors for the largest one whose scaled
/// text still fits the shadow-inset-adjusted constrained size.
///
/// A candidate fits when the scaled layout truncates nothing and stays
/// within the finite dimensions of the constraint and the line limit. The
/// result is cached until the constrained size changes. Probing never
/// touches the original text: each candidate is measured through a scaled
/// duplicate attached to the engine behind a [`SubstituteScope`].
pub struct FontScaleAdjuster {
    context: Arc<LayoutContext>,
    constrained_size: Size2D<f32>,
    candidates: Vec<f32>,
    max_lines: usize,
    cached: Option<f32>,
}

impl FontScaleAdjuster {
    pub fn new(
        context: Arc<LayoutContext>,
        constrained_size: Size2D<f32>,
        attributes: &TextAttributes,
    ) -> Self {
        Self {
            context,
            constrained_size,
            candidates: attributes.scale_candidates.clone(),
            max_lines: attributes.max_lines,
            cached: None,
        }
    }

    /// The largest fitting candidate; the smallest candidate when none fit;
    /// `1.0` when there are no candidates at all.
    pub fn scale_factor(&mut self) -> f32 {
        if let Some(scale) = self.cached {
            return scale;
        }
        let scale = self.search();
        self.cached = Some(scale);
        scale
    }

    /// Updates the constrained size the search measures against and drops
    /// the cached factor.
    pub fn set_constrained_size(&mut self, size: Size2D<f32>) {
        if size != self.constrained_size {
            self.constrained_size = size;
            self.cached = None;
        }
    }

    /// Multiplies every run's font size by `scale`, in place. Callers apply
    /// this to duplicates; the backing storage is never scaled directly.
    pub fn apply_scale(text: &mut AttributedText, scale: f32) {
        text.scale_font_sizes(scale);
    }

    fn search(&self) -> f32 {
        let mut ordered = self.candidates.clone();
        ordered.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        for &candidate in &ordered {
            if candidate <= 0.0 {
                continue;
            }
            if self.fits(candidate) {
                return candidate;
            }
        }
        // nothing fits: shrink as far as the candidate set allows
        ordered
            .iter()
            .rev()
            .copied()
            .find(|s| *s > 0.0)
            .unwrap_or(1.0)
    }

    fn fits(&self, scale: f32) -> bool {
        let constrained = self.constrained_size;
        let max_lines = self.max_lines;
        self.context.with_components(|components, fonts| {
            let LayoutComponents {
                storage,
                container,
                engine,
            } = components;
            let mut probe = container.clone();
            probe.size = constrained;

            let substitute = (scale != 1.0).then(|| {
                let mut copy = storage.clone();
                Self::apply_scale(&mut copy, scale);
                copy
            });
            let mut scope = SubstituteScope::attach(engine, substitute);
            let result = scope.engine().ensure(storage, &probe, fonts);

            if result.truncated {
                return false;
            }
            if max_lines > 0 && result.fragments.len() > max_lines {
                return false;
            }
            let used = result.used_rect;
            if probe.size.width.is_finite() && used.origin.x + used.size.width > probe.size.width {
                return false;
            }
            if probe.size.height.is_finite()
                && used.origin.y + used.size.height > probe.size.height
            {
                return false;
            }
            true
        })
    }
}
