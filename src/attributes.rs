use std::{collections::HashSet, sync::Arc};

use euclid::default::Rect;

use crate::{
    shadow::ShadowStyle,
    text::data::AttributedText,
    text::layout::{LayoutEngine, LayoutEvents, LineBreakMode},
};

/// Factory hook for supplying a custom layout engine.
pub type EngineFactory = dyn Fn(&TextAttributes) -> LayoutEngine + Send + Sync;

/// Everything the renderer needs to know about the text, fixed at
/// construction.
///
/// The bundle is set once and never mutated afterward; the renderer's only
/// mutable input is the constrained size.
#[derive(Clone)]
pub struct TextAttributes {
    /// The attributed string to measure and draw.
    pub text: AttributedText,
    pub line_break: LineBreakMode,
    /// Maximum number of lines, `0` meaning unlimited.
    pub max_lines: usize,
    /// Regions the laid-out lines must flow around.
    pub exclusions: Vec<Rect<f32>>,
    pub shadow: ShadowStyle,
    /// String appended where truncation cuts the text.
    pub truncation_marker: String,
    /// Characters the truncation cut backs away from.
    pub avoid_truncation: HashSet<char, fxhash::FxBuildHasher>,
    /// Candidate font-size scale factors for fitting overflowing text.
    /// Empty disables scaling entirely.
    pub scale_candidates: Vec<f32>,
    /// Optional hook constructing the layout engine.
    pub engine_factory: Option<Arc<EngineFactory>>,
    /// Optional observer notified after each layout pass.
    pub layout_events: Option<Arc<dyn LayoutEvents>>,
}

impl TextAttributes {
    pub fn new(text: AttributedText) -> Self {
        Self {
            text,
            line_break: LineBreakMode::WordWrap,
            max_lines: 0,
            exclusions: vec![],
            shadow: ShadowStyle::NONE,
            truncation_marker: "…".to_string(),
            avoid_truncation: HashSet::default(),
            scale_candidates: vec![],
            engine_factory: None,
            layout_events: None,
        }
    }

    pub fn with_line_break(mut self, mode: LineBreakMode) -> Self {
        self.line_break = mode;
        self
    }

    pub fn with_max_lines(mut self, max_lines: usize) -> Self {
        self.max_lines = max_lines;
        self
    }

    pub fn with_exclusions(mut self, exclusions: Vec<Rect<f32>>) -> Self {
        self.exclusions = exclusions;
        self
    }

    pub fn with_shadow(mut self, shadow: ShadowStyle) -> Self {
        self.shadow = shadow;
        self
    }

    pub fn with_truncation_marker(mut self, marker: impl Into<String>) -> Self {
        self.truncation_marker = marker.into();
        self
    }

    pub fn with_avoid_truncation(mut self, avoid: impl IntoIterator<Item = char>) -> Self {
        self.avoid_truncation = avoid.into_iter().collect();
        self
    }

    pub fn with_scale_candidates(mut self, candidates: Vec<f32>) -> Self {
        self.scale_candidates = candidates;
        self
    }

    pub fn with_engine_factory(mut self, factory: Arc<EngineFactory>) -> Self {
        self.engine_factory = Some(factory);
        self
    }

    pub fn with_layout_events(mut self, events: Arc<dyn LayoutEvents>) -> Self {
        self.layout_events = Some(events);
        self
    }

    /// Builds the layout engine for this bundle, honoring the factory hook
    /// and wiring in the layout observer.
    pub(crate) fn build_engine(&self) -> LayoutEngine {
        let mut engine = match &self.engine_factory {
            Some(factory) => factory(self),
            None => LayoutEngine::new(),
        };
        engine.set_events(self.layout_events.clone());
        engine
    }
}
