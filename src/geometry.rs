//! Window geometry shared between the lifecycle state machine and the
//! compositor-facing entry points.

/// Window geometry in global screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Whether the daemon can represent this size. Requests outside these
    /// bounds are dropped before they reach the wire.
    pub fn in_bounds(&self, max_width: u32, max_height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.width <= max_width
            && self.height <= max_height
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{MAX_WINDOW_HEIGHT, MAX_WINDOW_WIDTH};

    #[test]
    fn bounds() {
        let ok = |g: Geometry| g.in_bounds(MAX_WINDOW_WIDTH, MAX_WINDOW_HEIGHT);
        assert!(ok(Geometry::new(0, 0, 800, 600)));
        assert!(ok(Geometry::new(-5, -5, 1, 1)));
        assert!(!ok(Geometry::new(0, 0, 0, 600)));
        assert!(!ok(Geometry::new(0, 0, 800, 0)));
        assert!(!ok(Geometry::new(0, 0, MAX_WINDOW_WIDTH + 1, 10)));
        assert!(!ok(Geometry::new(0, 0, 10, MAX_WINDOW_HEIGHT + 1)));
    }
}
