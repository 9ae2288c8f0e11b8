use std::collections::HashMap;

use euclid::default::Point2D;

use crate::{
    font_storage::FontStorage, glyph_id::GlyphId, renderer::canvas::Canvas,
    text::layout::PositionedGlyph,
};

pub const DEFAULT_RASTER_CAPACITY: usize = 512;

struct CachedRaster {
    width: usize,
    height: usize,
    coverage: Vec<u8>,
    stamp: u64,
}

/// Rasterizes glyphs through fontdue and composites them onto a canvas.
///
/// Coverage bitmaps are cached per [`GlyphId`]; when the cache exceeds its
/// capacity the least-recently-used entry is evicted.
pub struct GlyphPainter {
    cache: HashMap<GlyphId, CachedRaster, fxhash::FxBuildHasher>,
    capacity: usize,
    clock: u64,
}

impl GlyphPainter {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: HashMap::with_hasher(fxhash::FxBuildHasher::default()),
            capacity: capacity.max(1),
            clock: 0,
        }
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Draws the glyphs onto `canvas`, each anchored at `origin` plus its
    /// layout position. Glyphs whose font cannot be resolved are skipped.
    pub fn paint(
        &mut self,
        glyphs: &[PositionedGlyph],
        origin: Point2D<f32>,
        canvas: &mut Canvas,
        fonts: &mut FontStorage,
    ) {
        for glyph in glyphs {
            let Some(raster) = self.raster(glyph.glyph_id, fonts) else {
                continue;
            };
            if raster.width == 0 || raster.height == 0 {
                continue;
            }
            let position = Point2D::new(origin.x + glyph.x, origin.y + glyph.y);
            canvas.blend_coverage(
                position,
                raster.width,
                raster.height,
                &raster.coverage,
                glyph.color,
            );
        }
    }

    fn raster(&mut self, id: GlyphId, fonts: &mut FontStorage) -> Option<&CachedRaster> {
        self.clock += 1;
        let clock = self.clock;
        if !self.cache.contains_key(&id) {
            let font = fonts.font(id.font_id())?;
            let (metrics, coverage) = font.rasterize_indexed(id.glyph_index(), id.font_size());
            self.insert(
                id,
                CachedRaster {
                    width: metrics.width,
                    height: metrics.height,
                    coverage,
                    stamp: clock,
                },
            );
        }
        let entry = self.cache.get_mut(&id)?;
        entry.stamp = clock;
        Some(entry)
    }

    fn insert(&mut self, id: GlyphId, entry: CachedRaster) {
        if self.cache.len() >= self.capacity {
            self.evict_oldest();
        }
        self.cache.insert(id, entry);
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .cache
            .iter()
            .min_by_key(|(_, entry)| entry.stamp)
            .map(|(id, _)| *id);
        if let Some(id) = oldest {
            self.cache.remove(&id);
        }
    }
}
