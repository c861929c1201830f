//! Floating images over the page content box
//!
//! Images never take part in text flow. All geometry here is a pure
//! function of the start rectangle, a pointer delta and the container, so
//! drag handling can be replayed and tested without a UI.

use crate::document::{Document, FloatingImage, ImageId, SectionId};
use crate::error::EditError;
use crate::{Point, Rect, Size};
use tracing::debug;

/// Gap between a freshly attached image and the content box edge
pub const DEFAULT_INSET: f32 = 16.0;

/// Smallest short side an image may be resized to
pub const MIN_IMAGE_SIZE: f32 = 24.0;

fn safe_aspect(aspect: f32) -> f32 {
    if aspect.is_finite() && aspect > 0.0 {
        aspect
    } else {
        1.0
    }
}

/// Initial rectangle for a new image: at most half the container width,
/// shrunk to fit, at `position` or the default inset.
pub fn place_initial(container: Size, natural: Size, position: Option<Point>) -> Rect {
    let aspect = safe_aspect(natural.width / natural.height);
    let avail_w = (container.width - 2.0 * DEFAULT_INSET).max(container.width.min(MIN_IMAGE_SIZE));
    let avail_h = (container.height - 2.0 * DEFAULT_INSET).max(container.height.min(MIN_IMAGE_SIZE));

    let mut width = natural.width.min(container.width / 2.0).min(avail_w).max(0.0);
    let mut height = width / aspect;
    if height > avail_h {
        height = avail_h;
        width = height * aspect;
    }

    let origin = position.unwrap_or(Point {
        x: DEFAULT_INSET,
        y: DEFAULT_INSET,
    });
    clamp_rect(Rect::new(origin.x, origin.y, width, height), aspect, container)
}

/// Move by a pointer delta, keeping the whole rectangle inside
pub fn clamp_move(start: Rect, dx: f32, dy: f32, container: Size) -> Rect {
    let max_x = (container.width - start.width).max(0.0);
    let max_y = (container.height - start.height).max(0.0);
    Rect::new(
        (start.x + dx).clamp(0.0, max_x),
        (start.y + dy).clamp(0.0, max_y),
        start.width,
        start.height,
    )
}

/// Resize from the bottom-right corner by a width delta.
///
/// The aspect ratio is preserved; the image shrinks rather than crossing
/// the container edge, and keeps a short side of at least
/// [`MIN_IMAGE_SIZE`] unless the space left forces it smaller.
pub fn clamp_resize(start: Rect, delta: f32, aspect: f32, container: Size) -> Rect {
    let aspect = safe_aspect(aspect);
    let max_w = (container.width - start.x)
        .min((container.height - start.y) * aspect)
        .max(0.0);
    let min_w = if aspect >= 1.0 {
        MIN_IMAGE_SIZE * aspect
    } else {
        MIN_IMAGE_SIZE
    };

    let width = (start.width + delta).max(min_w).min(max_w);
    Rect::new(start.x, start.y, width, width / aspect)
}

/// Force an arbitrary rectangle into the container, shrinking it first
/// if it cannot fit at any position
pub fn clamp_rect(rect: Rect, aspect: f32, container: Size) -> Rect {
    let aspect = safe_aspect(aspect);
    let mut width = rect.width.max(0.0);
    let mut height = rect.height.max(0.0);
    if width > container.width {
        width = container.width;
        height = width / aspect;
    }
    if height > container.height {
        height = container.height;
        width = height * aspect;
    }
    clamp_move(Rect::new(rect.x, rect.y, width, height), 0.0, 0.0, container)
}

/// What a drag gesture changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragMode {
    Move,
    Resize,
}

/// Pointer interaction state for one image
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Interaction {
    #[default]
    Idle,
    Dragging {
        image: ImageId,
        mode: DragMode,
        start_pointer: Point,
        start_rect: Rect,
        aspect: f32,
    },
}

impl Interaction {
    pub fn is_dragging(&self) -> bool {
        matches!(self, Interaction::Dragging { .. })
    }

    /// Start a gesture; any gesture in progress is abandoned
    pub fn begin(&mut self, image: &FloatingImage, mode: DragMode, pointer: Point) {
        *self = Interaction::Dragging {
            image: image.id,
            mode,
            start_pointer: pointer,
            start_rect: image.rect(),
            aspect: image.aspect_ratio,
        };
    }

    /// Rectangle the image would have with the pointer at `pointer`
    pub fn preview(&self, pointer: Point, container: Size) -> Option<(ImageId, Rect)> {
        let Interaction::Dragging {
            image,
            mode,
            start_pointer,
            start_rect,
            aspect,
        } = *self
        else {
            return None;
        };
        let dx = pointer.x - start_pointer.x;
        let dy = pointer.y - start_pointer.y;
        let rect = match mode {
            DragMode::Move => clamp_move(start_rect, dx, dy, container),
            DragMode::Resize => clamp_resize(start_rect, dx, aspect, container),
        };
        Some((image, rect))
    }

    /// Finish the gesture and return the committed rectangle
    pub fn release(&mut self, pointer: Point, container: Size) -> Option<(ImageId, Rect)> {
        let result = self.preview(pointer, container);
        *self = Interaction::Idle;
        result
    }

    pub fn cancel(&mut self) {
        *self = Interaction::Idle;
    }
}

/// Image operations against a document, bounded by one content box
#[derive(Debug, Clone, Copy)]
pub struct FloatingLayer {
    container: Size,
}

impl FloatingLayer {
    pub fn new(container: Size) -> Self {
        Self { container }
    }

    pub fn container(&self) -> Size {
        self.container
    }

    /// Pin a registered asset to a section page
    pub fn attach(
        &self,
        document: &mut Document,
        section: SectionId,
        page: usize,
        image_ref: &str,
        natural: Size,
        position: Option<Point>,
    ) -> Result<FloatingImage, EditError> {
        if document.asset(image_ref).is_none() {
            return Err(EditError::UnknownAsset(image_ref.to_string()));
        }
        if document.section(section).is_none() {
            return Err(EditError::UnknownSection(section.to_string()));
        }

        let rect = place_initial(self.container, natural, position);
        let image = FloatingImage {
            id: document.allocate_image_id(),
            image_ref: image_ref.to_string(),
            page,
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
            aspect_ratio: safe_aspect(natural.width / natural.height),
        };
        document.push_image(section, image.clone())?;
        debug!(image = image.id.0, %section, page, "image attached");
        Ok(image)
    }

    pub fn move_image(&self, document: &mut Document, id: ImageId, dx: f32, dy: f32) -> Result<Rect, EditError> {
        self.update(document, id, |image, container| clamp_move(image.rect(), dx, dy, container))
    }

    pub fn resize_image(&self, document: &mut Document, id: ImageId, delta: f32) -> Result<Rect, EditError> {
        self.update(document, id, |image, container| {
            clamp_resize(image.rect(), delta, image.aspect_ratio, container)
        })
    }

    /// Commit a rectangle produced by a gesture
    pub fn set_rect(&self, document: &mut Document, id: ImageId, rect: Rect) -> Result<Rect, EditError> {
        self.update(document, id, |image, container| {
            clamp_rect(rect, image.aspect_ratio, container)
        })
    }

    /// Pull every image back inside the container after it shrank.
    /// Returns how many moved.
    pub fn refit(&self, document: &mut Document) -> usize {
        let mut moved = 0;
        for image in document.images_mut() {
            let rect = clamp_rect(image.rect(), image.aspect_ratio, self.container);
            if rect != image.rect() {
                image.set_rect(rect);
                moved += 1;
            }
        }
        if moved > 0 {
            document.touch();
        }
        moved
    }

    pub fn delete_image(&self, document: &mut Document, id: ImageId) -> Result<FloatingImage, EditError> {
        document.remove_image(id).map(|(_, image)| image)
    }

    fn update(
        &self,
        document: &mut Document,
        id: ImageId,
        f: impl FnOnce(&FloatingImage, Size) -> Rect,
    ) -> Result<Rect, EditError> {
        let (_, image) = document.image_mut(id).ok_or(EditError::UnknownImage(id.0))?;
        let rect = f(image, self.container);
        image.set_rect(rect);
        document.touch();
        Ok(rect)
    }
}
