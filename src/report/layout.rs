//! Page geometry, word wrapping, and the draw-operation composer.
//!
//! Coordinates are PDF points with the origin at the bottom-left of a US
//! Letter page. Content flows top-down from a vertical cursor; section
//! writers reserve space ahead of time and a new page starts whenever the
//! cursor would cross the bottom margin.

use lopdf::content::Operation;
use lopdf::Object;

use super::fonts::{text_width, Font};

pub(crate) const PAGE_WIDTH: f32 = 612.0;
pub(crate) const PAGE_HEIGHT: f32 = 792.0;
pub(crate) const TOP_Y: f32 = 750.0;
pub(crate) const BOTTOM_MARGIN: f32 = 50.0;

pub(crate) type Color = (f32, f32, f32);
pub(crate) const TEAL: Color = (0.0, 0.44, 0.49);
pub(crate) const CORAL: Color = (1.0, 0.42, 0.34);
pub(crate) const DARK_GRAY: Color = (0.2, 0.2, 0.2);
pub(crate) const LIGHT_GRAY: Color = (0.5, 0.5, 0.5);

/// Baseline-to-baseline distance for wrapped text.
pub(crate) fn line_height(size: f32) -> f32 {
    size + 2.0
}

/// Greedy word wrap by measured width.
///
/// Words are never reordered or broken: a single word wider than the column
/// gets a line to itself and overflows the margin rather than being split.
pub(crate) fn wrap_text(text: &str, font: Font, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if text_width(font, &candidate, size) <= max_width {
            current = candidate;
        } else if current.is_empty() {
            lines.push(word.to_string());
        } else {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// The operations for one positioned run of text.
pub(crate) fn text_ops(
    text: &str,
    x: f32,
    y: f32,
    size: f32,
    font: Font,
    color: Color,
) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![font.resource_tag().into(), size.into()]),
        Operation::new("rg", vec![color.0.into(), color.1.into(), color.2.into()]),
        Operation::new("Td", vec![x.into(), y.into()]),
        Operation::new("Tj", vec![Object::string_literal(text)]),
        Operation::new("ET", vec![]),
    ]
}

/// Accumulates draw operations page by page while tracking the cursor.
pub(crate) struct PageComposer {
    completed: Vec<Vec<Operation>>,
    current: Vec<Operation>,
    y: f32,
}

impl PageComposer {
    pub(crate) fn new() -> Self {
        PageComposer {
            completed: Vec::new(),
            current: Vec::new(),
            y: TOP_Y,
        }
    }

    pub(crate) fn y(&self) -> f32 {
        self.y
    }

    pub(crate) fn move_down(&mut self, amount: f32) {
        self.y -= amount;
    }

    /// Start a new page if `needed` points would cross the bottom margin.
    pub(crate) fn ensure_space(&mut self, needed: f32) {
        if self.y - needed < BOTTOM_MARGIN {
            self.new_page();
        }
    }

    pub(crate) fn new_page(&mut self) {
        self.completed.push(std::mem::take(&mut self.current));
        self.y = TOP_Y;
    }

    /// Draw one line of text at an absolute position on the current page.
    pub(crate) fn draw_text(
        &mut self,
        text: &str,
        x: f32,
        y: f32,
        size: f32,
        font: Font,
        color: Color,
    ) {
        self.current.extend(text_ops(text, x, y, size, font, color));
    }

    /// Draw a wrapped paragraph downward from the cursor in body gray.
    /// Returns the block height; the cursor itself is not moved.
    pub(crate) fn draw_wrapped(
        &mut self,
        text: &str,
        x: f32,
        max_width: f32,
        size: f32,
        font: Font,
    ) -> f32 {
        let lines = wrap_text(text, font, size, max_width);
        let top = self.y;
        for (i, line) in lines.iter().enumerate() {
            self.draw_text(
                line,
                x,
                top - (i as f32) * line_height(size),
                size,
                font,
                DARK_GRAY,
            );
        }
        lines.len() as f32 * line_height(size)
    }

    /// Finish composition and hand back the per-page operations.
    pub(crate) fn finish(mut self) -> Vec<Vec<Operation>> {
        self.completed.push(self.current);
        self.completed
    }
}
