/// Scroll container measurements taken by the view layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl ViewportMetrics {
    pub fn distance_from_bottom(&self) -> f64 {
        (self.scroll_height - self.scroll_top - self.client_height).max(0.0)
    }
}

/// Scroll top that keeps the same content under the viewport after older
/// history was prepended above it.
pub fn preserved_scroll_top(before: &ViewportMetrics, scroll_height_after: f64) -> f64 {
    (scroll_height_after - before.scroll_height + before.scroll_top).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepend_shifts_scroll_top_by_added_height() {
        let before = ViewportMetrics {
            scroll_top: 120.0,
            scroll_height: 2_000.0,
            client_height: 600.0,
        };
        assert_eq!(preserved_scroll_top(&before, 2_750.0), 870.0);
        assert_eq!(before.distance_from_bottom(), 1_280.0);
    }
}
