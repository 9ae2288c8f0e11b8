use std::{collections::HashSet, ops::Range, sync::Arc};

use euclid::default::{Box2D, Point2D, Rect, Size2D};

use crate::{
    font_storage::FontStorage,
    glyph_id::GlyphId,
    text::data::{AttributedText, Color},
};

/// Wrapping rules that define where line breaks may occur.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineBreakMode {
    /// Break at word boundaries; words wider than a whole line are split.
    WordWrap,
    /// Break after any character.
    CharWrap,
    /// Never break for width; only explicit newlines start a new line.
    Clip,
}

/// The geometric region text is laid into: a bounded size, regions that
/// lines must flow around, and the line limit.
#[derive(Clone, Debug, PartialEq)]
pub struct TextContainer {
    /// Constrained size; either dimension may be `f32::INFINITY`.
    pub size: Size2D<f32>,
    /// Regions no line may overlap. Lines are placed into the widest free
    /// interval of their vertical band.
    pub exclusions: Vec<Rect<f32>>,
    /// Maximum number of lines, `0` meaning unlimited.
    pub max_lines: usize,
    pub line_break: LineBreakMode,
}

impl TextContainer {
    pub fn new(size: Size2D<f32>) -> Self {
        Self {
            size,
            exclusions: vec![],
            max_lines: 0,
            line_break: LineBreakMode::WordWrap,
        }
    }
}

/// Tail truncation configuration attached by the truncater.
///
/// When present, content that would overflow the container's line limit or
/// height is cut and `marker` is appended to the last visible line. The cut
/// backs off over whitespace and over `avoid` characters so the marker never
/// lands mid-word.
#[derive(Clone, Debug)]
pub struct TruncationPolicy {
    pub marker: String,
    pub avoid: HashSet<char, fxhash::FxBuildHasher>,
}

/// Observer invoked when the engine completes a layout pass.
pub trait LayoutEvents: Send + Sync {
    fn layout_finished(&self, result: &LayoutResult) {
        let _ = result;
    }
}

/// **Y-axis goes down.**
///
/// A positioned glyph in final layout coordinates. `x`/`y` locate the
/// top-left corner of the glyph's coverage bitmap; `pen_x`/`advance` give the
/// horizontal cell the glyph occupies, which background fills use.
#[derive(Clone, Debug, PartialEq)]
pub struct PositionedGlyph {
    pub glyph_id: GlyphId,
    pub x: f32,
    pub y: f32,
    pub pen_x: f32,
    pub advance: f32,
    /// Index of the source character in the original attributed string, or
    /// `None` for glyphs synthesized by truncation (the marker).
    pub source: Option<usize>,
    pub color: Color,
    pub background: Option<Color>,
}

/// A single laid-out line: its glyph slice, the source characters it covers,
/// and its bounding rectangle.
#[derive(Clone, Debug, PartialEq)]
pub struct LineFragment {
    pub glyph_range: Range<usize>,
    /// Source characters covered by this line. Empty for blank lines and for
    /// lines holding only synthesized marker glyphs.
    pub char_range: Range<usize>,
    pub rect: Rect<f32>,
    pub baseline: f32,
}

/// Output of a layout pass over the active text and container.
#[derive(Clone, Debug, PartialEq)]
pub struct LayoutResult {
    pub glyphs: Vec<PositionedGlyph>,
    pub fragments: Vec<LineFragment>,
    /// Union of the line rectangles. Zero when nothing was laid out.
    pub used_rect: Rect<f32>,
    /// Character ranges of the original string still visible after
    /// truncation. A single `0..len` range when nothing was cut; empty for
    /// an empty string.
    pub visible_ranges: Vec<Range<usize>>,
    /// Whether content was dropped for exceeding the line limit or height.
    pub truncated: bool,
}

impl LayoutResult {
    pub fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }

    /// Returns the line fragment whose glyph range contains `glyph_index`.
    pub fn fragment_containing(&self, glyph_index: usize) -> Option<&LineFragment> {
        self.fragments
            .iter()
            .find(|f| f.glyph_range.start <= glyph_index && glyph_index < f.glyph_range.end)
    }

    /// Returns the contiguous glyph range covered by lines intersecting
    /// `rect`. `0..0` when no line intersects.
    pub fn glyph_range_for_rect(&self, rect: &Rect<f32>) -> Range<usize> {
        let mut bounds: Option<(usize, usize)> = None;
        for fragment in &self.fragments {
            if fragment.glyph_range.is_empty() || !fragment.rect.intersects(rect) {
                continue;
            }
            bounds = Some(match bounds {
                None => (fragment.glyph_range.start, fragment.glyph_range.end),
                Some((lo, hi)) => (
                    lo.min(fragment.glyph_range.start),
                    hi.max(fragment.glyph_range.end),
                ),
            });
        }
        match bounds {
            Some((lo, hi)) => lo..hi,
            None => 0..0,
        }
    }

    fn empty() -> Self {
        Self {
            glyphs: vec![],
            fragments: vec![],
            used_rect: Rect::zero(),
            visible_ranges: vec![],
            truncated: false,
        }
    }
}

#[derive(Clone, PartialEq)]
struct LayoutKey {
    size: Size2D<f32>,
    max_lines: usize,
}

/// The layout engine: turns the active text and container geometry into a
/// cached [`LayoutResult`] and answers queries against it.
///
/// The engine normally reads the storage it is handed. For scaled
/// measurement a *substitute* text can be attached; while attached, layout
/// passes read the substitute instead. Attaching, detaching, and truncation
/// changes all drop the cached result so no caller can observe a layout
/// computed for different content.
pub struct LayoutEngine {
    cache: Option<(LayoutKey, LayoutResult)>,
    substitute: Option<AttributedText>,
    truncation: Option<TruncationPolicy>,
    events: Option<Arc<dyn LayoutEvents>>,
}

impl Default for LayoutEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutEngine {
    pub fn new() -> Self {
        Self {
            cache: None,
            substitute: None,
            truncation: None,
            events: None,
        }
    }

    pub fn set_events(&mut self, events: Option<Arc<dyn LayoutEvents>>) {
        self.events = events;
    }

    /// Points the next layout pass at `text` instead of the backing storage.
    pub fn attach_substitute(&mut self, text: AttributedText) {
        self.substitute = Some(text);
        self.cache = None;
    }

    /// Restores the backing storage as the layout source.
    pub fn clear_substitute(&mut self) {
        if self.substitute.take().is_some() {
            self.cache = None;
        }
    }

    pub fn has_substitute(&self) -> bool {
        self.substitute.is_some()
    }

    /// Attaches the tail truncation policy. Applied on every subsequent
    /// layout pass.
    pub fn set_truncation(&mut self, policy: TruncationPolicy) {
        self.truncation = Some(policy);
        self.cache = None;
    }

    pub fn has_truncation(&self) -> bool {
        self.truncation.is_some()
    }

    /// Drops the cached layout; the next [`Self::ensure`] recomputes.
    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    /// Returns the layout for the active text in `container`, computing it
    /// if the cache is missing or was produced under different container
    /// geometry.
    pub fn ensure(
        &mut self,
        storage: &AttributedText,
        container: &TextContainer,
        fonts: &mut FontStorage,
    ) -> &LayoutResult {
        let key = LayoutKey {
            size: container.size,
            max_lines: container.max_lines,
        };
        let stale = match &self.cache {
            Some((cached_key, _)) => *cached_key != key,
            None => true,
        };
        if stale {
            let active = self.substitute.as_ref().unwrap_or(storage);
            let result = compute_layout(active, container, self.truncation.as_ref(), fonts);
            if let Some(events) = &self.events {
                events.layout_finished(&result);
            }
            self.cache = Some((key, result));
        }
        match &self.cache {
            Some((_, result)) => result,
            None => unreachable!("cache populated above"),
        }
    }
}

/// Scoped substitute attachment.
///
/// Attaches an optional substitute text on entry and detaches it when the
/// scope drops, so the engine is restored to the backing storage on every
/// exit path, unwinding included.
pub struct SubstituteScope<'a> {
    engine: &'a mut LayoutEngine,
}

impl<'a> SubstituteScope<'a> {
    pub fn attach(engine: &'a mut LayoutEngine, substitute: Option<AttributedText>) -> Self {
        if let Some(text) = substitute {
            engine.attach_substitute(text);
        }
        Self { engine }
    }

    pub fn engine(&mut self) -> &mut LayoutEngine {
        self.engine
    }
}

impl Drop for SubstituteScope<'_> {
    fn drop(&mut self) {
        self.engine.clear_substitute();
    }
}

/// Precomputed per-character data carried through line breaking.
#[derive(Clone)]
struct Frag {
    ch: char,
    glyph_idx: u16,
    metrics: fontdue::Metrics,
    line_metrics: fontdue::LineMetrics,
    font: Arc<fontdue::Font>,
    font_id: fontdb::ID,
    font_size: f32,
    color: Color,
    background: Option<Color>,
    source: Option<usize>,
}

fn kern_between(prev: Option<&Frag>, next: &Frag) -> f32 {
    match prev {
        Some(prev)
            if prev.font_id == next.font_id
                && (prev.font_size - next.font_size).abs() < f32::EPSILON =>
        {
            next.font
                .horizontal_kern_indexed(prev.glyph_idx, next.glyph_idx, next.font_size)
                .unwrap_or(0.0)
        }
        // kerning across font or size boundaries is ignored
        _ => 0.0,
    }
}

/// A fragment committed to a line, with the pen positions recorded so the
/// truncation backoff can pop fragments without re-measuring the line.
struct Slot {
    frag: Frag,
    pen: f32,
    pen_after: f32,
}

/// A line under construction: committed slots plus the band interval the
/// line was opened into.
struct LineBuild {
    slots: Vec<Slot>,
    pen: f32,
    /// Line origin and available width from exclusion placement.
    x0: f32,
    avail: f32,
    /// Metrics fallback for blank lines (an explicit newline with no
    /// content still reserves vertical space).
    blank_metrics: Option<fontdue::LineMetrics>,
}

impl LineBuild {
    fn open(x0: f32, avail: f32) -> Self {
        Self {
            slots: vec![],
            pen: 0.0,
            x0,
            avail,
            blank_metrics: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn width(&self) -> f32 {
        self.pen
    }

    fn push(&mut self, frag: Frag) {
        let kern = kern_between(self.slots.last().map(|s| &s.frag), &frag);
        let pen = self.pen + kern;
        let pen_after = pen + frag.metrics.advance_width;
        self.pen = pen_after;
        self.slots.push(Slot {
            frag,
            pen,
            pen_after,
        });
    }

    fn pop(&mut self) -> Option<Frag> {
        let slot = self.slots.pop()?;
        self.pen = self.slots.last().map(|s| s.pen_after).unwrap_or(0.0);
        Some(slot.frag)
    }

    /// Width the line would have after appending `frags`, without committing.
    fn projected(&self, frags: &[Frag]) -> f32 {
        let mut pen = self.pen;
        let mut prev = self.slots.last().map(|s| &s.frag);
        for frag in frags {
            pen += kern_between(prev, frag) + frag.metrics.advance_width;
            prev = Some(frag);
        }
        pen
    }

    fn line_metrics(&self) -> (f32, f32, f32) {
        let mut ascent = 0.0f32;
        let mut descent = 0.0f32;
        let mut line_gap = 0.0f32;
        let mut any = false;
        for slot in &self.slots {
            ascent = ascent.max(slot.frag.line_metrics.ascent);
            descent = descent.min(slot.frag.line_metrics.descent);
            line_gap = line_gap.max(slot.frag.line_metrics.line_gap);
            any = true;
        }
        if !any && let Some(metrics) = self.blank_metrics {
            return (metrics.ascent, metrics.descent, metrics.line_gap);
        }
        (ascent, descent, line_gap)
    }

    fn height(&self) -> f32 {
        let (ascent, descent, line_gap) = self.line_metrics();
        (ascent - descent + line_gap).max(0.0)
    }

    fn ascent(&self) -> f32 {
        self.line_metrics().0
    }
}

/// Returns the `(x, width)` of the widest horizontal interval of
/// `[0, width]` left free by the exclusion rectangles overlapping the band
/// `[top, top + height)`.
fn free_interval(width: f32, exclusions: &[Rect<f32>], top: f32, height: f32) -> (f32, f32) {
    let band_bottom = top + height;
    let mut blocked: Vec<(f32, f32)> = exclusions
        .iter()
        .filter(|r| r.origin.y < band_bottom && r.origin.y + r.size.height > top)
        .map(|r| (r.origin.x.max(0.0), (r.origin.x + r.size.width).min(width)))
        .filter(|(lo, hi)| hi > lo)
        .collect();
    if blocked.is_empty() {
        return (0.0, width);
    }
    blocked.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut best = (0.0f32, 0.0f32);
    let mut cursor = 0.0f32;
    for (lo, hi) in blocked {
        if lo > cursor && lo - cursor > best.1 {
            best = (cursor, lo - cursor);
        }
        cursor = cursor.max(hi);
    }
    if width - cursor > best.1 {
        best = (cursor, width - cursor);
    }
    best
}

enum Token<'a> {
    Word(&'a [Frag]),
    Separator(&'a Frag),
    Newline(&'a Frag),
}

fn tokenize(frags: &[Frag], mode: LineBreakMode) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut word_start: Option<usize> = None;
    for (i, frag) in frags.iter().enumerate() {
        if frag.ch == '\n' || frag.ch.is_whitespace() || matches!(mode, LineBreakMode::CharWrap) {
            if let Some(start) = word_start.take() {
                tokens.push(Token::Word(&frags[start..i]));
            }
            if frag.ch == '\n' {
                tokens.push(Token::Newline(frag));
            } else if frag.ch.is_whitespace() {
                tokens.push(Token::Separator(frag));
            } else {
                // char-wrap: each character wraps independently
                tokens.push(Token::Word(std::slice::from_ref(frag)));
            }
        } else if word_start.is_none() {
            word_start = Some(i);
        }
    }
    if let Some(start) = word_start {
        tokens.push(Token::Word(&frags[start..]));
    }
    tokens
}

/// Sequential line breaker. Lines are opened lazily when content arrives,
/// into the widest free band interval at the current cursor, and the line
/// and height limits are enforced at open time.
struct Breaker<'a> {
    container: &'a TextContainer,
    lines: Vec<LineBuild>,
    cur: Option<LineBuild>,
    cursor_y: f32,
    overflowed: bool,
}

impl<'a> Breaker<'a> {
    fn new(container: &'a TextContainer) -> Self {
        Self {
            container,
            lines: vec![],
            cur: None,
            cursor_y: 0.0,
            overflowed: false,
        }
    }

    /// Opens a new current line, or records overflow and returns false when
    /// the line limit or container height forbids one.
    ///
    /// The height check uses the metrics of the fragment that triggers the
    /// open; later, taller fragments joining the line do not re-run it.
    fn open_line(&mut self, est_height: f32) -> bool {
        if self.container.max_lines > 0 && self.lines.len() >= self.container.max_lines {
            self.overflowed = true;
            return false;
        }
        let height = self.container.size.height;
        if height.is_finite() && self.cursor_y + est_height > height && !self.lines.is_empty() {
            self.overflowed = true;
            return false;
        }
        let (x0, avail) = free_interval(
            self.container.size.width,
            &self.container.exclusions,
            self.cursor_y,
            est_height,
        );
        self.cur = Some(LineBuild::open(x0, avail));
        true
    }

    fn close_line(&mut self) {
        if let Some(line) = self.cur.take() {
            self.cursor_y += line.height();
            self.lines.push(line);
        }
    }

    fn place_newline(&mut self, frag: &Frag) -> bool {
        if self.cur.is_none() {
            if !self.open_line(line_height_of(frag)) {
                return false;
            }
            if let Some(line) = &mut self.cur {
                line.blank_metrics = Some(frag.line_metrics);
            }
        }
        self.close_line();
        true
    }

    fn place_separator(&mut self, frag: &Frag) -> bool {
        let Some(line) = &mut self.cur else {
            // separators never start a line
            return true;
        };
        if line.is_empty() {
            return true;
        }
        let fits = matches!(self.container.line_break, LineBreakMode::Clip)
            || line.projected(std::slice::from_ref(frag)) <= line.avail;
        if fits {
            line.push(frag.clone());
        } else {
            // the separator is consumed by the break itself
            self.close_line();
        }
        true
    }

    fn place_word(&mut self, mut word: &'a [Frag]) -> bool {
        while !word.is_empty() {
            if self.cur.is_none() && !self.open_line(line_height_of(&word[0])) {
                return false;
            }
            let Some(line) = &mut self.cur else {
                return false;
            };
            let clip = matches!(self.container.line_break, LineBreakMode::Clip);
            if clip || line.projected(word) <= line.avail {
                for frag in word {
                    line.push(frag.clone());
                }
                return true;
            }
            if !line.is_empty() {
                self.close_line();
                continue;
            }
            // the word alone exceeds the line: split it, emitting at least
            // one fragment per line so layout always makes progress
            let mut taken = 0;
            for frag in word {
                if taken > 0 && line.projected(std::slice::from_ref(frag)) > line.avail {
                    break;
                }
                line.push(frag.clone());
                taken += 1;
            }
            word = &word[taken..];
            if !word.is_empty() {
                self.close_line();
            }
        }
        true
    }
}

fn line_height_of(frag: &Frag) -> f32 {
    let m = frag.line_metrics;
    (m.ascent - m.descent + m.line_gap).max(0.0)
}

fn collect_fragments(
    text: &AttributedText,
    fonts: &mut FontStorage,
) -> (Vec<Frag>, usize) {
    let mut frags = Vec::new();
    let mut source = 0usize;
    for run in &text.runs {
        let Some(font) = fonts.font(run.font_id) else {
            source += run.content.chars().count();
            continue;
        };
        let Some(line_metrics) = font.horizontal_line_metrics(run.font_size) else {
            source += run.content.chars().count();
            continue;
        };
        for ch in run.content.chars() {
            let glyph_idx = font.lookup_glyph_index(ch);
            let metrics = font.metrics_indexed(glyph_idx, run.font_size);
            frags.push(Frag {
                ch,
                glyph_idx,
                metrics,
                line_metrics,
                font: Arc::clone(&font),
                font_id: run.font_id,
                font_size: run.font_size,
                color: run.color,
                background: run.background,
                source: Some(source),
            });
            source += 1;
        }
    }
    (frags, source)
}

/// Lays out the marker string in the style of `style_frag`'s run.
fn marker_fragments(marker: &str, style_frag: &Frag, fonts: &mut FontStorage) -> Vec<Frag> {
    let Some(font) = fonts.font(style_frag.font_id) else {
        return vec![];
    };
    marker
        .chars()
        .map(|ch| {
            let glyph_idx = font.lookup_glyph_index(ch);
            let metrics = font.metrics_indexed(glyph_idx, style_frag.font_size);
            Frag {
                ch,
                glyph_idx,
                metrics,
                line_metrics: style_frag.line_metrics,
                font: Arc::clone(&font),
                font_id: style_frag.font_id,
                font_size: style_frag.font_size,
                color: style_frag.color,
                background: style_frag.background,
                source: None,
            }
        })
        .collect()
}

fn standalone_width(frags: &[Frag]) -> f32 {
    let mut pen = 0.0;
    let mut prev: Option<&Frag> = None;
    for frag in frags {
        pen += kern_between(prev, frag) + frag.metrics.advance_width;
        prev = Some(frag);
    }
    pen
}

fn compute_layout(
    text: &AttributedText,
    container: &TextContainer,
    truncation: Option<&TruncationPolicy>,
    fonts: &mut FontStorage,
) -> LayoutResult {
    let (frags, total_chars) = collect_fragments(text, fonts);
    if frags.is_empty() {
        let mut result = LayoutResult::empty();
        if total_chars > 0 {
            result.visible_ranges = vec![0..total_chars];
        }
        return result;
    }

    let mut breaker = Breaker::new(container);
    for token in tokenize(&frags, container.line_break) {
        let keep_going = match token {
            Token::Newline(frag) => breaker.place_newline(frag),
            Token::Separator(frag) => breaker.place_separator(frag),
            Token::Word(word) => breaker.place_word(word),
        };
        if !keep_going {
            break;
        }
    }
    breaker.close_line();

    let Breaker {
        mut lines,
        overflowed,
        ..
    } = breaker;

    let mut visible_end = total_chars;
    let truncated = overflowed;
    if overflowed {
        if let (Some(policy), Some(last)) = (truncation, lines.last_mut()) {
            let style = last
                .slots
                .last()
                .map(|s| s.frag.clone())
                .or_else(|| frags.first().cloned());
            let marker = match style {
                Some(style) => marker_fragments(&policy.marker, &style, fonts),
                None => vec![],
            };
            let marker_width = standalone_width(&marker);
            while !last.is_empty() && last.width() + marker_width > last.avail {
                last.pop();
            }
            while let Some(slot) = last.slots.last() {
                let ch = slot.frag.ch;
                if ch.is_whitespace() || policy.avoid.contains(&ch) {
                    last.pop();
                } else {
                    break;
                }
            }
            for frag in marker {
                last.push(frag);
            }
        }
        visible_end = lines
            .iter()
            .rev()
            .flat_map(|line| line.slots.iter().rev())
            .find_map(|slot| slot.frag.source)
            .map(|source| source + 1)
            .unwrap_or(0);
    }

    // positioning pass: shift baseline-relative fragments into final
    // y-down coordinates, line by line
    let mut glyphs = Vec::new();
    let mut fragments = Vec::new();
    let mut used: Option<Box2D<f32>> = None;
    let mut cursor_y = 0.0f32;
    for line in &lines {
        let height = line.height();
        let baseline = cursor_y + line.ascent();
        let glyph_start = glyphs.len();
        let mut char_lo: Option<usize> = None;
        let mut char_hi = 0usize;
        for slot in &line.slots {
            let m = &slot.frag.metrics;
            glyphs.push(PositionedGlyph {
                glyph_id: GlyphId::new(slot.frag.font_id, slot.frag.glyph_idx, slot.frag.font_size),
                x: line.x0 + slot.pen + m.xmin as f32,
                y: baseline - (m.ymin as f32 + m.height as f32),
                pen_x: line.x0 + slot.pen,
                advance: slot.pen_after - slot.pen,
                source: slot.frag.source,
                color: slot.frag.color,
                background: slot.frag.background,
            });
            if let Some(source) = slot.frag.source {
                char_lo = Some(char_lo.map_or(source, |lo: usize| lo.min(source)));
                char_hi = char_hi.max(source + 1);
            }
        }
        let rect = Rect::new(
            Point2D::new(line.x0, cursor_y),
            Size2D::new(line.width(), height),
        );
        let char_start = char_lo.unwrap_or(char_hi);
        fragments.push(LineFragment {
            glyph_range: glyph_start..glyphs.len(),
            char_range: char_start..char_hi.max(char_start),
            rect,
            baseline,
        });
        let line_box = Box2D::new(
            Point2D::new(rect.origin.x, rect.origin.y),
            Point2D::new(rect.origin.x + rect.size.width, rect.origin.y + rect.size.height),
        );
        used = Some(match used {
            None => line_box,
            Some(existing) => existing.union(&line_box),
        });
        cursor_y += height;
    }

    let visible_ranges = if visible_end > 0 {
        vec![0..visible_end]
    } else {
        vec![]
    };

    LayoutResult {
        glyphs,
        fragments,
        used_rect: used.map(|b| b.to_rect()).unwrap_or_else(Rect::zero),
        visible_ranges,
        truncated,
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::data::TextRun;

    fn dummy_font_id() -> fontdb::ID {
        // fontdb::ID is 64-bit on this platform. It might be NonZero, so use 1.
        unsafe { std::mem::transmute(1u64) }
    }

    fn rect(x: f32, y: f32, w: f32, h: f32) -> Rect<f32> {
        Rect::new(Point2D::new(x, y), Size2D::new(w, h))
    }

    #[test]
    fn free_interval_without_exclusions_spans_the_container() {
        assert_eq!(free_interval(100.0, &[], 0.0, 10.0), (0.0, 100.0));
        let (x0, avail) = free_interval(f32::INFINITY, &[], 0.0, 10.0);
        assert_eq!(x0, 0.0);
        assert!(avail.is_infinite());
    }

    #[test]
    fn free_interval_picks_the_widest_gap() {
        // 100 wide, blocked 30..40: gaps are 0..30 and 40..100
        let exclusions = [rect(30.0, 0.0, 10.0, 50.0)];
        assert_eq!(free_interval(100.0, &exclusions, 0.0, 10.0), (40.0, 60.0));
    }

    #[test]
    fn free_interval_ignores_exclusions_outside_the_band() {
        let exclusions = [rect(0.0, 100.0, 100.0, 20.0)];
        assert_eq!(free_interval(100.0, &exclusions, 0.0, 10.0), (0.0, 100.0));
    }

    #[test]
    fn free_interval_with_leading_block_starts_after_it() {
        let exclusions = [rect(0.0, 0.0, 70.0, 10.0)];
        assert_eq!(free_interval(100.0, &exclusions, 5.0, 10.0), (70.0, 30.0));
    }

    fn result_with_two_lines() -> LayoutResult {
        LayoutResult {
            glyphs: vec![],
            fragments: vec![
                LineFragment {
                    glyph_range: 0..3,
                    char_range: 0..3,
                    rect: rect(0.0, 0.0, 50.0, 10.0),
                    baseline: 8.0,
                },
                LineFragment {
                    glyph_range: 3..5,
                    char_range: 4..6,
                    rect: rect(0.0, 10.0, 30.0, 10.0),
                    baseline: 18.0,
                },
            ],
            used_rect: rect(0.0, 0.0, 50.0, 20.0),
            visible_ranges: vec![0..6],
            truncated: false,
        }
    }

    #[test]
    fn fragment_containing_respects_glyph_ranges() {
        let result = result_with_two_lines();
        assert_eq!(result.fragment_containing(0).unwrap().glyph_range, 0..3);
        assert_eq!(result.fragment_containing(4).unwrap().glyph_range, 3..5);
        assert!(result.fragment_containing(5).is_none());
    }

    #[test]
    fn glyph_range_for_rect_covers_intersecting_lines() {
        let result = result_with_two_lines();
        assert_eq!(result.glyph_range_for_rect(&rect(0.0, 0.0, 50.0, 20.0)), 0..5);
        assert_eq!(result.glyph_range_for_rect(&rect(0.0, 12.0, 50.0, 5.0)), 3..5);
        assert_eq!(result.glyph_range_for_rect(&rect(0.0, 50.0, 10.0, 5.0)), 0..0);
    }

    fn empty_text() -> AttributedText {
        AttributedText::new()
    }

    fn unresolvable_text(content: &str) -> AttributedText {
        let mut text = AttributedText::new();
        text.push(TextRun::new(dummy_font_id(), 16.0, content));
        text
    }

    #[test]
    fn ensure_caches_until_container_changes() {
        let mut engine = LayoutEngine::new();
        let mut fonts = FontStorage::new();
        let storage = empty_text();
        let mut container = TextContainer::new(Size2D::new(100.0, f32::INFINITY));

        engine.ensure(&storage, &container, &mut fonts);
        assert!(engine.is_cached());

        // same geometry: cache stays
        engine.ensure(&storage, &container, &mut fonts);
        assert!(engine.is_cached());

        // new size: the pass recomputes instead of serving the stale result
        container.size = Size2D::new(50.0, f32::INFINITY);
        let result = engine.ensure(&storage, &container, &mut fonts).clone();
        assert_eq!(result.glyph_count(), 0);
    }

    #[test]
    fn unresolvable_runs_still_report_their_characters_visible() {
        let mut engine = LayoutEngine::new();
        let mut fonts = FontStorage::new();
        let storage = unresolvable_text("abc");
        let container = TextContainer::new(Size2D::new(100.0, f32::INFINITY));

        let result = engine.ensure(&storage, &container, &mut fonts);
        assert_eq!(result.glyph_count(), 0);
        assert_eq!(result.visible_ranges, vec![0..3]);
        assert!(!result.truncated);
    }

    #[test]
    fn substitute_scope_restores_on_drop() {
        let mut engine = LayoutEngine::new();
        {
            let mut scope =
                SubstituteScope::attach(&mut engine, Some(unresolvable_text("scaled")));
            assert!(scope.engine().has_substitute());
        }
        assert!(!engine.has_substitute());
        assert!(!engine.is_cached());
    }

    #[test]
    fn substitute_scope_without_substitute_keeps_the_cache() {
        let mut engine = LayoutEngine::new();
        let mut fonts = FontStorage::new();
        let storage = empty_text();
        let container = TextContainer::new(Size2D::new(100.0, f32::INFINITY));
        engine.ensure(&storage, &container, &mut fonts);

        {
            let mut scope = SubstituteScope::attach(&mut engine, None);
            scope.engine().ensure(&storage, &container, &mut fonts);
        }
        assert!(engine.is_cached());
    }

    #[test]
    fn truncation_attachment_invalidates_the_cache() {
        let mut engine = LayoutEngine::new();
        let mut fonts = FontStorage::new();
        let storage = empty_text();
        let container = TextContainer::new(Size2D::new(100.0, f32::INFINITY));
        engine.ensure(&storage, &container, &mut fonts);

        engine.set_truncation(TruncationPolicy {
            marker: "…".to_string(),
            avoid: HashSet::default(),
        });
        assert!(!engine.is_cached());
        assert!(engine.has_truncation());
    }
}
