pub mod canvas;
pub mod painter;

pub use canvas::{Canvas, ShadowState};
pub use painter::GlyphPainter;

use std::{ops::Range, sync::Arc};

use euclid::default::{Point2D, Rect, Size2D};
use parking_lot::Mutex;

use crate::{
    attributes::TextAttributes,
    context::{LayoutComponents, LayoutContext},
    font_storage::FontStorage,
    scale::FontScaleAdjuster,
    shadow::ShadowGeometry,
    text::data::AttributedText,
    text::layout::{LayoutResult, SubstituteScope},
    truncation::TailTruncater,
};

/// The cached measurement together with the constraint it was computed
/// under. Compared by value on every read; a stale constraint simply never
/// matches.
struct ComputedSize {
    constraint: Size2D<f32>,
    size: Size2D<f32>,
}

/// Orchestrates measurement and drawing of one attributed string.
///
/// The renderer owns the immutable [`TextAttributes`] bundle and the mutable
/// size constraint, and lazily builds four collaborators on first use:
/// shadow geometry, the locked layout context, the tail truncater, and the
/// font-size adjuster. Construction order matters: the shadow geometry must
/// exist before the context or the adjuster, because both are sized with
/// the shadow-inset-adjusted constraint. Shadows consume visual space that
/// must not be counted as available text area.
///
/// Measurement and drawing share one pipeline: force truncation attachment,
/// resolve the scale factor when applicable, then lay out under the
/// context's lock, substituting a scaled duplicate of the text when the
/// factor is below one and always restoring the original before the lock
/// is released.
///
/// A renderer instance is not internally serialized; callers sharing one
/// across threads must serialize access themselves.
pub struct TextRenderer {
    attributes: TextAttributes,
    constrained_size: Size2D<f32>,
    fonts: Arc<Mutex<FontStorage>>,

    shadower: Option<ShadowGeometry>,
    context: Option<Arc<LayoutContext>>,
    truncater: Option<TailTruncater>,
    adjuster: Option<FontScaleAdjuster>,

    painter: GlyphPainter,
    computed: Option<ComputedSize>,
    /// Current scale factor; `0.0` until computed or when not applicable.
    scale: f32,
}

impl TextRenderer {
    /// Stores the bundle and the constraint. No collaborator is built yet.
    pub fn new(
        attributes: TextAttributes,
        constrained_size: Size2D<f32>,
        fonts: Arc<Mutex<FontStorage>>,
    ) -> Self {
        Self {
            attributes,
            constrained_size,
            fonts,
            shadower: None,
            context: None,
            truncater: None,
            adjuster: None,
            painter: GlyphPainter::new(painter::DEFAULT_RASTER_CAPACITY),
            computed: None,
            scale: 0.0,
        }
    }

    pub fn attributes(&self) -> &TextAttributes {
        &self.attributes
    }

    pub fn constrained_size(&self) -> Size2D<f32> {
        self.constrained_size
    }

    /// The scale factor selected by the last measurement, `0.0` when none
    /// has been computed.
    pub fn current_scale(&self) -> f32 {
        self.scale
    }

    /// Computes (or returns the cached) bounding size of the laid-out text,
    /// shadow extent included.
    pub fn size(&mut self) -> Size2D<f32> {
        if let Some(computed) = &self.computed
            && computed.constraint == self.constrained_size
        {
            return computed.size;
        }

        // truncation must be attached before the engine's first layout pass
        self.truncater();
        if self.scaling_applicable() {
            self.scale = self.adjuster().scale_factor();
        }

        let scale = self.scale;
        let context = self.context();
        let (used, inset_size) = context.with_components(|components, fonts| {
            let LayoutComponents {
                storage,
                container,
                engine,
            } = components;
            let substitute = scaled_duplicate(storage, scale);
            let mut scope = SubstituteScope::attach(engine, substitute);
            let result = scope.engine().ensure(storage, container, fonts);
            (result.used_rect, container.size)
        });

        // defensive clip: the engine may report glyph extents overflowing
        // the requested width, and those must not inflate the result
        let constraint_rect = Rect::new(Point2D::origin(), inset_size);
        let clipped = used.intersection(&constraint_rect).unwrap_or_else(Rect::zero);
        let measured = Size2D::new(clipped.max_x().max(0.0), clipped.max_y().max(0.0));

        let size = self.shadower().outset_size(measured);
        self.computed = Some(ComputedSize {
            constraint: self.constrained_size,
            size,
        });
        size
    }

    /// Replaces the size constraint. A no-op when `size` equals the current
    /// constraint exactly; otherwise the cached measurement and scale factor
    /// are dropped and the new shadow-inset-adjusted size is pushed into the
    /// collaborators that already exist. Nothing is rebuilt.
    pub fn set_constrained_size(&mut self, size: Size2D<f32>) {
        if size == self.constrained_size {
            return;
        }
        self.constrained_size = size;
        self.computed = None;
        self.scale = 0.0;

        if self.context.is_some() || self.adjuster.is_some() {
            let inset = self.shadower().inset_size(size);
            if let Some(context) = &self.context {
                context.set_constrained_size(inset);
            }
            if let Some(adjuster) = &mut self.adjuster {
                adjuster.set_constrained_size(inset);
            }
        }
    }

    /// Draws background fills and glyphs into `canvas`, anchored at
    /// `bounds` and clipped to it, shadow included.
    ///
    /// Panics when the canvas has no area; drawing into nothing is a
    /// programmer error, not a recoverable condition. Never touches the
    /// cached measurement; a caller may draw without ever asking for the
    /// size.
    pub fn draw(&mut self, canvas: &mut Canvas, bounds: Rect<f32>) {
        assert!(!canvas.is_empty(), "draw requires a non-empty canvas");
        if !bounds.size.width.is_finite() || !bounds.size.height.is_finite() {
            log::warn!("draw called with non-finite bounds; output clips to the canvas");
        }

        self.truncater();
        if self.computed.is_none() && self.scaling_applicable() {
            // drawing may happen before any size() call; the scaled variant
            // must still be selected
            self.scale = self.adjuster().scale_factor();
        }

        let inset_bounds = self.shadower().inset_rect(bounds);
        let shadow = *self.shadower();
        let scale = self.scale;
        let context = self.context();
        let painter = &mut self.painter;

        let mut shadow_scope = shadow.configure(canvas);
        context.with_components(|components, fonts| {
            let LayoutComponents {
                storage,
                container,
                engine,
            } = components;
            let substitute = scaled_duplicate(storage, scale);
            let mut scope = SubstituteScope::attach(engine, substitute);
            let result = scope.engine().ensure(storage, container, fonts);

            let local = Rect::new(Point2D::origin(), inset_bounds.size);
            let range = result.glyph_range_for_rect(&local);
            draw_background(result, range.clone(), inset_bounds.origin, shadow_scope.canvas());
            painter.paint(
                &result.glyphs[range],
                inset_bounds.origin,
                shadow_scope.canvas(),
                fonts,
            );
        });
    }

    /// Number of laid-out lines, walked fragment by fragment from glyph
    /// zero. An empty layout has zero lines.
    pub fn line_count(&mut self) -> usize {
        self.truncater();
        let context = self.context();
        context.with_components(|components, fonts| {
            let LayoutComponents {
                storage,
                container,
                engine,
            } = components;
            let result = engine.ensure(storage, container, fonts);
            let total = result.glyph_count();
            let mut index = 0;
            let mut count = 0;
            while index < total {
                match result.fragment_containing(index) {
                    Some(fragment) if fragment.glyph_range.end > index => {
                        index = fragment.glyph_range.end;
                        count += 1;
                    }
                    _ => break,
                }
            }
            count
        })
    }

    /// Character ranges of the original string still visible after
    /// truncation.
    pub fn visible_ranges(&mut self) -> Vec<Range<usize>> {
        self.truncater().visible_ranges()
    }

    fn scaling_applicable(&self) -> bool {
        self.constrained_size.width.is_finite() && !self.attributes.scale_candidates.is_empty()
    }

    fn shadower(&mut self) -> &ShadowGeometry {
        let style = self.attributes.shadow;
        self.shadower.get_or_insert_with(|| ShadowGeometry::new(style))
    }

    fn context(&mut self) -> Arc<LayoutContext> {
        if let Some(context) = &self.context {
            return Arc::clone(context);
        }
        let constrained_size = self.constrained_size;
        let inset = self.shadower().inset_size(constrained_size);
        let context = LayoutContext::new(&self.attributes, inset, Arc::clone(&self.fonts));
        self.context = Some(Arc::clone(&context));
        context
    }

    fn truncater(&mut self) -> &mut TailTruncater {
        if self.truncater.is_none() {
            let context = self.context();
            let marker = self.attributes.truncation_marker.clone();
            let avoid = self.attributes.avoid_truncation.clone();
            self.truncater = Some(TailTruncater::new(context, marker, avoid));
        }
        self.truncater.as_mut().expect("truncater built above")
    }

    fn adjuster(&mut self) -> &mut FontScaleAdjuster {
        if self.adjuster.is_none() {
            let context = self.context();
            let constrained_size = self.constrained_size;
            let inset = self.shadower().inset_size(constrained_size);
            self.adjuster = Some(FontScaleAdjuster::new(context, inset, &self.attributes));
        }
        self.adjuster.as_mut().expect("adjuster built above")
    }
}

/// A scaled duplicate of the storage, or `None` when scaling is inactive.
/// The original is never rewritten.
fn scaled_duplicate(storage: &AttributedText, scale: f32) -> Option<AttributedText> {
    (scale > 0.0 && scale < 1.0).then(|| {
        let mut duplicate = storage.clone();
        FontScaleAdjuster::apply_scale(&mut duplicate, scale);
        duplicate
    })
}

/// Fills the background cells of the glyphs in `range`, merging horizontal
/// runs that share a color so each line gets contiguous fills.
fn draw_background(
    result: &LayoutResult,
    range: Range<usize>,
    origin: Point2D<f32>,
    canvas: &mut Canvas,
) {
    for fragment in &result.fragments {
        let start = fragment.glyph_range.start.max(range.start);
        let end = fragment.glyph_range.end.min(range.end);
        let mut index = start;
        while index < end {
            let Some(background) = result.glyphs[index].background else {
                index += 1;
                continue;
            };
            let run_start = index;
            while index < end && result.glyphs[index].background == Some(background) {
                index += 1;
            }
            let first = &result.glyphs[run_start];
            let last = &result.glyphs[index - 1];
            let rect = Rect::new(
                Point2D::new(origin.x + first.pen_x, origin.y + fragment.rect.origin.y),
                Size2D::new(
                    last.pen_x + last.advance - first.pen_x,
                    fragment.rect.size.height,
                ),
            );
            canvas.fill_rect(rect, background);
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::shadow::ShadowStyle;
    use crate::text::data::{AttributedText, TextRun};
    use euclid::default::Vector2D;

    fn dummy_font_id() -> fontdb::ID {
        // fontdb::ID is 64-bit on this platform. It might be NonZero, so use 1.
        unsafe { std::mem::transmute(1u64) }
    }

    fn attributed(content: &str) -> AttributedText {
        let mut text = AttributedText::new();
        text.push(TextRun::new(dummy_font_id(), 16.0, content));
        text
    }

    fn renderer(attributes: TextAttributes, size: Size2D<f32>) -> TextRenderer {
        TextRenderer::new(attributes, size, Arc::new(Mutex::new(FontStorage::new())))
    }

    #[test]
    fn size_is_idempotent_and_restores_the_storage() {
        let attributes = TextAttributes::new(attributed("hello world"));
        let original = attributes.text.clone();
        let mut renderer = renderer(attributes, Size2D::new(100.0, f32::INFINITY));

        let first = renderer.size();
        let second = renderer.size();
        assert_eq!(first, second);

        let context = renderer.context();
        context.with_components(|components, _| {
            assert!(!components.engine.has_substitute());
            assert_eq!(components.storage, original);
        });
    }

    #[test]
    fn equal_constraint_update_keeps_the_cache() {
        let size = Size2D::new(100.0, f32::INFINITY);
        let mut renderer = renderer(TextAttributes::new(attributed("abc")), size);
        renderer.size();
        assert!(renderer.computed.is_some());

        renderer.set_constrained_size(size);
        assert!(renderer.computed.is_some());
    }

    #[test]
    fn changed_constraint_invalidates_and_pushes_the_inset_size() {
        let mut renderer = renderer(
            TextAttributes::new(attributed("abc")),
            Size2D::new(100.0, f32::INFINITY),
        );
        renderer.size();
        let context = renderer.context();

        renderer.set_constrained_size(Size2D::new(60.0, f32::INFINITY));
        assert!(renderer.computed.is_none());
        assert_eq!(renderer.current_scale(), 0.0);
        assert_eq!(
            context.constrained_size(),
            Size2D::new(60.0, f32::INFINITY)
        );
    }

    #[test]
    fn constraint_update_before_any_collaborator_builds_nothing() {
        let mut renderer = renderer(
            TextAttributes::new(attributed("abc")),
            Size2D::new(100.0, f32::INFINITY),
        );
        renderer.set_constrained_size(Size2D::new(50.0, 50.0));
        assert!(renderer.context.is_none());
        assert!(renderer.adjuster.is_none());
    }

    #[test]
    fn empty_candidate_set_never_builds_the_adjuster() {
        let mut renderer = renderer(
            TextAttributes::new(attributed("abc")),
            Size2D::new(100.0, f32::INFINITY),
        );
        renderer.size();
        assert!(renderer.adjuster.is_none());
        assert_eq!(renderer.current_scale(), 0.0);
    }

    #[test]
    fn infinite_width_disables_scaling() {
        let attributes = TextAttributes::new(attributed("abc"))
            .with_scale_candidates(vec![1.0, 0.5]);
        let mut renderer = renderer(attributes, Size2D::new(f32::INFINITY, f32::INFINITY));
        renderer.size();
        assert!(renderer.adjuster.is_none());
    }

    #[test]
    fn finite_width_with_candidates_selects_a_scale() {
        let attributes = TextAttributes::new(attributed("abc"))
            .with_scale_candidates(vec![0.5, 0.8]);
        let mut renderer = renderer(attributes, Size2D::new(100.0, f32::INFINITY));
        renderer.size();
        // unresolvable fonts lay out empty, so the largest candidate fits
        assert_eq!(renderer.current_scale(), 0.8);

        let context = renderer.context();
        context.with_components(|components, _| {
            assert!(!components.engine.has_substitute());
        });
    }

    #[test]
    fn size_forces_truncation_attachment() {
        let mut renderer = renderer(
            TextAttributes::new(attributed("abc")),
            Size2D::new(100.0, f32::INFINITY),
        );
        renderer.size();
        let context = renderer.context();
        context.with_components(|components, _| {
            assert!(components.engine.has_truncation());
        });
    }

    #[test]
    fn shadow_outset_is_reported_even_for_empty_layouts() {
        let shadow = ShadowStyle {
            offset: Vector2D::new(0.0, 0.0),
            color: [0.0, 0.0, 0.0, 1.0],
            opacity: 1.0,
            radius: 2.0,
        };
        let attributes = TextAttributes::new(attributed("abc")).with_shadow(shadow);
        let mut renderer = renderer(attributes, Size2D::new(100.0, f32::INFINITY));
        // no resolvable fonts: the text itself measures to zero
        assert_eq!(renderer.size(), Size2D::new(4.0, 4.0));
    }

    #[test]
    fn line_count_of_an_empty_layout_is_zero() {
        let mut renderer = renderer(
            TextAttributes::new(AttributedText::new()),
            Size2D::new(100.0, f32::INFINITY),
        );
        assert_eq!(renderer.line_count(), 0);
    }

    #[test]
    fn visible_ranges_stay_in_bounds() {
        let mut renderer = renderer(
            TextAttributes::new(attributed("hello world")),
            Size2D::new(100.0, f32::INFINITY),
        );
        let ranges = renderer.visible_ranges();
        let mut last_end = 0;
        for range in &ranges {
            assert!(range.start >= last_end);
            assert!(range.end <= 11);
            last_end = range.end;
        }
    }

    #[test]
    fn draw_does_not_touch_the_size_cache() {
        let mut renderer = renderer(
            TextAttributes::new(attributed("abc")),
            Size2D::new(100.0, f32::INFINITY),
        );
        let mut canvas = Canvas::new(50, 20);
        renderer.draw(
            &mut canvas,
            Rect::new(Point2D::origin(), Size2D::new(50.0, 20.0)),
        );
        assert!(renderer.computed.is_none());

        // and drawing restores the canvas shadow state
        assert!(canvas.shadow().is_none());
    }

    #[test]
    fn draw_populates_the_scale_cache_when_applicable() {
        let attributes = TextAttributes::new(attributed("abc"))
            .with_scale_candidates(vec![0.9]);
        let mut renderer = renderer(attributes, Size2D::new(100.0, f32::INFINITY));
        let mut canvas = Canvas::new(50, 20);
        renderer.draw(
            &mut canvas,
            Rect::new(Point2D::origin(), Size2D::new(50.0, 20.0)),
        );
        assert_eq!(renderer.current_scale(), 0.9);
    }

    #[test]
    #[should_panic(expected = "non-empty canvas")]
    fn drawing_into_an_empty_canvas_panics() {
        let mut renderer = renderer(
            TextAttributes::new(attributed("abc")),
            Size2D::new(100.0, f32::INFINITY),
        );
        let mut canvas = Canvas::new(0, 0);
        renderer.draw(
            &mut canvas,
            Rect::new(Point2D::origin(), Size2D::new(10.0, 10.0)),
        );
    }

    // --- end-to-end tests below need a real font; they skip on hosts
    // --- without system fonts

    fn system_font(fonts: &mut FontStorage) -> Option<fontdb::ID> {
        fonts.load_system_fonts();
        let query = fontdb::Query {
            families: &[fontdb::Family::SansSerif],
            weight: fontdb::Weight::NORMAL,
            stretch: fontdb::Stretch::Normal,
            style: fontdb::Style::Normal,
        };
        fonts.query(&query).map(|(id, _)| id)
    }

    fn real_renderer(
        content: &str,
        font_size: f32,
        configure: impl FnOnce(TextAttributes) -> TextAttributes,
        constrained: Size2D<f32>,
    ) -> Option<TextRenderer> {
        let mut fonts = FontStorage::new();
        let font_id = system_font(&mut fonts)?;
        let mut text = AttributedText::new();
        text.push(TextRun::new(font_id, font_size, content));
        let attributes = configure(TextAttributes::new(text));
        Some(TextRenderer::new(
            attributes,
            constrained,
            Arc::new(Mutex::new(fonts)),
        ))
    }

    #[test]
    fn hello_world_fits_one_line() {
        let Some(mut renderer) =
            real_renderer("Hello world", 12.0, |a| a, Size2D::new(200.0, f32::INFINITY))
        else {
            return;
        };
        let size = renderer.size();
        assert!(size.width > 0.0 && size.width <= 200.0);
        assert!(size.height > 0.0);
        assert_eq!(renderer.line_count(), 1);
        assert_eq!(renderer.visible_ranges(), vec![0..11]);
    }

    #[test]
    fn narrow_constraint_truncates_with_a_marker() {
        let Some(mut renderer) = real_renderer(
            "Hello world",
            16.0,
            |a| a.with_max_lines(1),
            Size2D::new(40.0, f32::INFINITY),
        ) else {
            return;
        };
        renderer.size();
        assert_eq!(renderer.line_count(), 1);
        let ranges = renderer.visible_ranges();
        assert_eq!(ranges.len(), 1);
        assert!(ranges[0].end < 11);
    }

    #[test]
    fn scaling_selects_the_largest_fitting_candidate() {
        // establish the unscaled single-line width first, then constrain to
        // a width only the 0.5 candidate can satisfy
        let Some(mut probe) =
            real_renderer("Hello world", 16.0, |a| a, Size2D::new(f32::INFINITY, f32::INFINITY))
        else {
            return;
        };
        let natural = probe.size();

        let Some(mut renderer) = real_renderer(
            "Hello world",
            16.0,
            |a| a.with_max_lines(1).with_scale_candidates(vec![1.0, 0.8, 0.5]),
            Size2D::new(natural.width * 0.55, f32::INFINITY),
        ) else {
            return;
        };
        renderer.size();
        assert_eq!(renderer.current_scale(), 0.5);

        // the original storage still carries the unscaled sizes
        let context = renderer.context();
        context.with_components(|components, _| {
            assert_eq!(components.storage.runs[0].font_size, 16.0);
            assert!(!components.engine.has_substitute());
        });
    }

    #[test]
    fn drawing_writes_glyph_pixels() {
        let Some(mut renderer) =
            real_renderer("Hi", 14.0, |a| a, Size2D::new(60.0, 30.0))
        else {
            return;
        };
        let mut canvas = Canvas::new(60, 30);
        renderer.draw(
            &mut canvas,
            Rect::new(Point2D::origin(), Size2D::new(60.0, 30.0)),
        );
        let any_ink = (0..30).any(|y| (0..60).any(|x| canvas.pixel(x, y)[3] > 0));
        assert!(any_ink);
    }
}
