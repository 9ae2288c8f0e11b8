/// Defines the attributed string fed into layout.
pub mod data;
/// The layout engine: line breaking, truncation, and glyph positioning.
pub mod layout;

pub use data::{AttributedText, Color, TextRun};
pub use layout::{
    LayoutEngine, LayoutEvents, LayoutResult, LineBreakMode, LineFragment, PositionedGlyph,
    SubstituteScope, TextContainer, TruncationPolicy,
};
