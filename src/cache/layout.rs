//! Grid layout
//!
//! Virtualizer arithmetic for a tiled grid: how many columns fit, how many
//! rows exist, and which rows/items a scroll position shows.

use crate::config::Config;

/// Column/row geometry of one dataset's grid
#[derive(Debug, Clone, PartialEq)]
pub struct GridLayout {
    min_card_width: f32,
    card_gap: f32,
    row_height: f32,
    width: f32,
    columns: usize,
    total_items: usize,
}

impl GridLayout {
    /// Layout for `total_items` cards in a viewport `width` pixels wide
    pub fn new(total_items: usize, width: f32, config: &Config) -> Self {
        let mut layout = Self {
            min_card_width: config.min_card_width,
            card_gap: config.card_gap,
            row_height: config.row_height,
            width,
            columns: 1,
            total_items,
        };
        layout.resize(width);
        layout
    }

    /// Recompute the column count for a new viewport width
    pub fn resize(&mut self, width: f32) {
        self.width = width;
        self.columns = columns_for(width, self.min_card_width, self.card_gap);
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn total_items(&self) -> usize {
        self.total_items
    }

    /// Virtual rows: `ceil(total / columns)`
    pub fn row_count(&self) -> usize {
        self.total_items.div_ceil(self.columns)
    }

    pub fn row_height(&self) -> f32 {
        self.row_height
    }

    /// Total scrollable height
    pub fn content_height(&self) -> f32 {
        self.row_count() as f32 * self.row_height
    }

    /// Largest valid scroll offset for a viewport of `viewport_height`
    pub fn max_scroll(&self, viewport_height: f32) -> f32 {
        (self.content_height() - viewport_height).max(0.0)
    }

    /// Rows intersecting the viewport, inclusive; `None` for an empty grid
    pub fn visible_rows(&self, scroll_y: f32, viewport_height: f32) -> Option<(usize, usize)> {
        let rows = self.row_count();
        if rows == 0 {
            return None;
        }
        let scroll_y = scroll_y.clamp(0.0, self.max_scroll(viewport_height));
        let first = ((scroll_y / self.row_height).floor() as usize).min(rows - 1);
        let bottom = scroll_y + viewport_height.max(0.0);
        let last = ((bottom / self.row_height).ceil() as usize)
            .saturating_sub(1)
            .clamp(first, rows - 1);
        Some((first, last))
    }

    /// Flat item indices covered by a row window, inclusive
    pub fn item_range(&self, first_row: usize, last_row: usize) -> Option<(usize, usize)> {
        if self.total_items == 0 {
            return None;
        }
        let first = first_row.saturating_mul(self.columns);
        if first >= self.total_items {
            return None;
        }
        let last = (last_row.saturating_add(1))
            .saturating_mul(self.columns)
            .saturating_sub(1)
            .min(self.total_items - 1);
        Some((first, last.max(first)))
    }
}

/// `max(1, floor((width + gap) / (min_card_width + gap)))`
pub fn columns_for(width: f32, min_card_width: f32, gap: f32) -> usize {
    let slot = min_card_width + gap;
    if !(width > 0.0) || !(slot > 0.0) {
        return 1;
    }
    (((width + gap) / slot).floor() as usize).max(1)
}
