//! # Tanzaku
//!
//! An attributed-text measurement and rendering library for Rust.
//!
//! ## Overview
//!
//! `Tanzaku` measures and draws rich (attributed) strings under a size
//! constraint. The core of the library is the [`TextRenderer`], which
//! coordinates shadow geometry, a locked layout context, tail truncation,
//! and dynamic font-size scaling to produce one authoritative size and
//! drawing pass.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tanzaku::{
//!     AttributedText, Canvas, FontStorage, TextAttributes, TextRenderer, TextRun,
//!     euclid::default::{Point2D, Rect, Size2D},
//!     parking_lot::Mutex,
//! };
//!
//! // 1. Load fonts
//! let mut fonts = FontStorage::new();
//! fonts.load_system_fonts();
//! let query = tanzaku::fontdb::Query {
//!     families: &[tanzaku::fontdb::Family::SansSerif],
//!     weight: tanzaku::fontdb::Weight::NORMAL,
//!     stretch: tanzaku::fontdb::Stretch::Normal,
//!     style: tanzaku::fontdb::Style::Normal,
//! };
//! let (font_id, _) = fonts.query(&query).expect("a sans-serif font");
//!
//! // 2. Build the attributed string and its attributes
//! let mut text = AttributedText::new();
//! text.push(TextRun::new(font_id, 16.0, "Hello world"));
//! let attributes = TextAttributes::new(text).with_max_lines(2);
//!
//! // 3. Measure and draw
//! let mut renderer = TextRenderer::new(
//!     attributes,
//!     Size2D::new(200.0, f32::INFINITY),
//!     Arc::new(Mutex::new(fonts)),
//! );
//! let size = renderer.size();
//! let mut canvas = Canvas::new(size.width.ceil() as usize, size.height.ceil() as usize);
//! renderer.draw(&mut canvas, Rect::new(Point2D::origin(), size));
//! ```
//!
//! ## Features
//!
//! *   **Single authoritative pipeline**: sizing and drawing share the same
//!     scale/measure/restore dance over one locked layout context.
//! *   **Tail truncation**: overflowing text is cut at a word-safe position
//!     and finished with a marker, with the surviving ranges reported back.
//! *   **Dynamic type scaling**: candidate scale factors are probed for the
//!     largest one that makes the text fit its constraint.
//! *   **Shadow-aware measurement**: shadows reserve layout space and are
//!     added back into the reported size.

pub mod attributes;
pub mod context;
pub mod font_storage;
pub mod glyph_id;
pub mod renderer;
pub mod scale;
pub mod shadow;
pub mod text;
pub mod truncation;

// common re-exports
pub use attributes::TextAttributes;
pub use context::LayoutContext;
pub use font_storage::FontStorage;
pub use glyph_id::GlyphId;
pub use renderer::{Canvas, TextRenderer};
pub use scale::FontScaleAdjuster;
pub use shadow::{ShadowGeometry, ShadowStyle};
pub use text::{AttributedText, LineBreakMode, TextRun};
pub use truncation::TailTruncater;

// re-export dependencies
pub use euclid;
pub use fontdb;
pub use fontdue;
pub use parking_lot;
