use euclid::default::{Rect, SideOffsets2D, Size2D, Vector2D};

use crate::renderer::canvas::{Canvas, ShadowState};
use crate::text::data::Color;

/// Drop shadow parameters for the text as a whole.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowStyle {
    /// Offset of the shadow from the glyphs, y-down.
    pub offset: Vector2D<f32>,
    pub color: Color,
    /// Overall shadow opacity, multiplied into the color's alpha.
    pub opacity: f32,
    /// Blur radius in pixels.
    pub radius: f32,
}

impl ShadowStyle {
    pub const NONE: Self = Self {
        offset: Vector2D::new(0.0, 0.0),
        color: [0.0, 0.0, 0.0, 1.0],
        opacity: 0.0,
        radius: 0.0,
    };

    /// Whether the shadow draws anything at all.
    pub fn is_visible(&self) -> bool {
        self.opacity > 0.0
            && self.color[3] > 0.0
            && (self.radius > 0.0 || self.offset.x != 0.0 || self.offset.y != 0.0)
    }
}

impl Default for ShadowStyle {
    fn default() -> Self {
        Self::NONE
    }
}

/// Pure shadow geometry: how much visual space the shadow consumes on each
/// side, and the derived size/rect conversions.
///
/// Layout runs in the *inset* space (the shadow must not be counted as
/// available text area); the reported size is the measured result *outset*
/// back so it covers the full visual extent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowGeometry {
    style: ShadowStyle,
    insets: SideOffsets2D<f32>,
}

impl ShadowGeometry {
    pub fn new(style: ShadowStyle) -> Self {
        let insets = if style.is_visible() {
            SideOffsets2D::new(
                (style.radius - style.offset.y).max(0.0), // top
                (style.radius + style.offset.x).max(0.0), // right
                (style.radius + style.offset.y).max(0.0), // bottom
                (style.radius - style.offset.x).max(0.0), // left
            )
        } else {
            SideOffsets2D::zero()
        };
        Self { style, insets }
    }

    pub fn style(&self) -> &ShadowStyle {
        &self.style
    }

    /// Shrinks a constrained size to the area actually available for text.
    /// Infinite dimensions stay infinite.
    pub fn inset_size(&self, size: Size2D<f32>) -> Size2D<f32> {
        Size2D::new(
            (size.width - self.insets.horizontal()).max(0.0),
            (size.height - self.insets.vertical()).max(0.0),
        )
    }

    /// Shrinks a drawing rectangle to the glyph area.
    pub fn inset_rect(&self, rect: Rect<f32>) -> Rect<f32> {
        rect.inner_rect(self.insets)
    }

    /// Grows a measured size back to the full visual extent.
    pub fn outset_size(&self, size: Size2D<f32>) -> Size2D<f32> {
        Size2D::new(
            size.width + self.insets.horizontal(),
            size.height + self.insets.vertical(),
        )
    }

    /// Installs this shadow on the canvas for the duration of the returned
    /// scope. The canvas's previous shadow state comes back when the scope
    /// drops, on every exit path.
    pub fn configure<'a>(&self, canvas: &'a mut Canvas) -> ShadowScope<'a> {
        let state = if self.style.is_visible() {
            let mut color = self.style.color;
            color[3] *= self.style.opacity;
            Some(ShadowState {
                offset: self.style.offset,
                radius: self.style.radius,
                color,
            })
        } else {
            None
        };
        let previous = canvas.replace_shadow(state);
        ShadowScope { canvas, previous }
    }
}

/// Scoped canvas shadow configuration; see [`ShadowGeometry::configure`].
pub struct ShadowScope<'a> {
    canvas: &'a mut Canvas,
    previous: Option<ShadowState>,
}

impl ShadowScope<'_> {
    pub fn canvas(&mut self) -> &mut Canvas {
        self.canvas
    }
}

impl Drop for ShadowScope<'_> {
    fn drop(&mut self) {
        self.canvas.replace_shadow(self.previous.take());
    }
}
