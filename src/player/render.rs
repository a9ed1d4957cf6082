//! Frame rendering seam.
//!
//! Single-expression display and batch frames both go through
//! [`FrameRenderer::render`] with a resolved [`Frame`].

use std::collections::HashSet;
use std::sync::Arc;

use crate::catalog::Catalog;
use crate::state::types::VisualState;

/// A fully resolved frame, ready to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub expression_name: String,
    pub image_ref: String,
    pub visual: VisualState,
}

/// Draws frames. Implemented by whatever owns the actual overlay.
pub trait FrameRenderer: Send {
    fn render(&mut self, frame: &Frame);
}

impl<R: FrameRenderer + ?Sized> FrameRenderer for Box<R> {
    fn render(&mut self, frame: &Frame) {
        (**self).render(frame)
    }
}

/// Renderer that reports frames through `tracing`. Used by headless clients.
#[derive(Debug, Default)]
pub struct LogRenderer {
    rendered: u64,
}

impl LogRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rendered(&self) -> u64 {
        self.rendered
    }
}

impl FrameRenderer for LogRenderer {
    fn render(&mut self, frame: &Frame) {
        self.rendered += 1;
        tracing::info!(
            expression = %frame.expression_name,
            image = %frame.image_ref,
            direction = %frame.visual.direction,
            mirrored = frame.visual.direction.is_mirrored(),
            pos_x = frame.visual.pos_x,
            pos_y = frame.visual.pos_y,
            rotation = frame.visual.rotation,
            scale = frame.visual.scale,
            "Render frame"
        );
    }
}

/// Maps expression names to image references on the display side.
///
/// Catalog entries win; names the display knows locally get a
/// conventional `<prefix><name>.png` reference.
#[derive(Debug, Clone, Default)]
pub struct ImageResolver {
    catalog: Option<Arc<Catalog>>,
    known_names: HashSet<String>,
    image_prefix: String,
}

impl ImageResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_known_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_names.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_image_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.image_prefix = prefix.into();
        self
    }

    pub fn resolve(&self, name: &str) -> Option<String> {
        if let Some(entry) = self.catalog.as_ref().and_then(|c| c.lookup(name)) {
            return Some(entry.image_ref.clone());
        }
        if self.known_names.contains(name) {
            return Some(format!("{}{}.png", self.image_prefix, name));
        }
        None
    }
}
