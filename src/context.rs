use std::sync::Arc;

use euclid::default::Size2D;
use parking_lot::Mutex;

use crate::{
    attributes::TextAttributes,
    font_storage::FontStorage,
    text::data::AttributedText,
    text::layout::{LayoutEngine, TextContainer},
};

/// The {storage, container, engine} triple the context protects.
///
/// The triple is expensive to build and is treated as a single shared
/// resource: measurement and drawing both mutate it (substitute attachment,
/// layout caching), so it only ever travels together under one lock.
pub struct LayoutComponents {
    /// The original attributed string. Never mutated after construction;
    /// scaled measurement attaches *duplicates* to the engine instead.
    pub storage: AttributedText,
    pub container: TextContainer,
    pub engine: LayoutEngine,
}

/// Owns the layout triple behind a mutex, plus the shared font storage.
///
/// Every read or mutation of the triple goes through
/// [`Self::with_components`], which holds the components lock (and the fonts
/// lock, acquired second) for the duration of the closure and releases both
/// on every exit path.
pub struct LayoutContext {
    components: Mutex<LayoutComponents>,
    fonts: Arc<Mutex<FontStorage>>,
}

impl LayoutContext {
    /// Builds the triple from the attributes bundle and the
    /// shadow-inset-adjusted constrained size.
    pub fn new(
        attributes: &TextAttributes,
        inset_size: Size2D<f32>,
        fonts: Arc<Mutex<FontStorage>>,
    ) -> Arc<Self> {
        let container = TextContainer {
            size: inset_size,
            exclusions: attributes.exclusions.clone(),
            max_lines: attributes.max_lines,
            line_break: attributes.line_break,
        };
        let components = LayoutComponents {
            storage: attributes.text.clone(),
            container,
            engine: attributes.build_engine(),
        };
        Arc::new(Self {
            components: Mutex::new(components),
            fonts,
        })
    }

    /// Runs `f` with exclusive access to the triple and the font storage.
    pub fn with_components<R>(
        &self,
        f: impl FnOnce(&mut LayoutComponents, &mut FontStorage) -> R,
    ) -> R {
        let mut components = self.components.lock();
        let mut fonts = self.fonts.lock();
        f(&mut components, &mut fonts)
    }

    /// Updates the container's constrained size in place, invalidating the
    /// engine's cached layout. The triple is not rebuilt.
    pub fn set_constrained_size(&self, size: Size2D<f32>) {
        let mut components = self.components.lock();
        if components.container.size != size {
            components.container.size = size;
            components.engine.invalidate();
        }
    }

    pub fn constrained_size(&self) -> Size2D<f32> {
        self.components.lock().container.size
    }
}
