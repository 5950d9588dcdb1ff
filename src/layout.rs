//! Where the targets are, and whether a click landed on one.
//!
//! Everything here is in canvas pixels: the task is laid out on a virtual
//! `width` x `height` canvas with the origin at the top left and `y`
//! growing downwards. The terminal UI maps character cells onto this canvas
//! with a [`Viewport`].
//!
//! Target coordinates are rounded to the nearest pixel, not truncated. On
//! the default 900 x 700 canvas with a 250 px ring that gives
//!
//! | target | position   | truncated  |
//! |--------|------------|------------|
//! | 0      | (700, 350) | (700, 350) |
//! | 1      | (627, 527) | (626, 526) |
//! | 2      | (450, 600) | (450, 600) |
//! | 3      | (273, 527) | (273, 526) |
//! | 4      | (200, 350) | (200, 350) |
//! | 5      | (273, 173) | (273, 173) |
//! | 6      | (450, 100) | (449, 100) |
//! | 7      | (627, 173) | (626, 173) |
//!
//! Offline analysis written against a truncated target table is off by up
//! to one pixel for targets 1, 3, 6 and 7 and should take positions from
//! the left column.

use ratatui::layout::Rect;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Number of peripheral targets.
pub const N_TARGETS: usize = 8;

/// A position on the canvas.
#[derive(Debug, PartialEq, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn abs_dist(&self, other: &Self) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}

/// The center target and the eight targets on the ring around it.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetLayout {
    width: f64,
    height: f64,
    center: Point,
    targets: [Point; N_TARGETS],
    target_radius: f64,
    center_radius: f64,
    capture_radius: f64,
}

impl TargetLayout {
    /// Lay out the targets on a `ring_radius` circle around the middle of a
    /// `width` x `height` canvas, 45° apart starting from the positive x
    /// axis. Coordinates are rounded to whole pixels.
    pub fn new(
        width: f64,
        height: f64,
        ring_radius: f64,
        target_radius: f64,
        center_radius: f64,
        capture_radius: f64,
    ) -> Self {
        let center = Point::new((width / 2.0).trunc(), (height / 2.0).trunc());
        let mut targets = [Point::default(); N_TARGETS];
        for (i, target) in targets.iter_mut().enumerate() {
            let angle = (i as f64 * 45.0).to_radians();
            *target = Point::new(
                (center.x + ring_radius * angle.cos()).round(),
                (center.y + ring_radius * angle.sin()).round(),
            );
        }

        Self {
            width,
            height,
            center,
            targets,
            target_radius,
            center_radius,
            capture_radius,
        }
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn center(&self) -> Point {
        self.center
    }

    /// The position of target `index`, if there is one.
    pub fn target(&self, index: usize) -> Option<Point> {
        self.targets.get(index).copied()
    }

    pub fn targets(&self) -> &[Point; N_TARGETS] {
        &self.targets
    }

    /// Drawn radius of every target.
    pub fn target_radius(&self) -> f64 {
        self.target_radius
    }

    pub fn center_radius(&self) -> f64 {
        self.center_radius
    }

    pub fn capture_radius(&self) -> f64 {
        self.capture_radius
    }

    /// Whether `p` is close enough to the center to start a trial.
    pub fn hits_center(&self, p: Point) -> bool {
        p.abs_dist(&self.center) <= self.center_radius
    }

    /// Whether `p` is within the capture radius of target `index`.
    pub fn hits_target(&self, index: usize, p: Point) -> bool {
        self.target(index)
            .is_some_and(|t| p.abs_dist(&t) <= self.capture_radius)
    }
}

/// Maps terminal cells inside `area` onto a canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    area: Rect,
    width: f64,
    height: f64,
}

impl Viewport {
    pub fn new(area: Rect, width: f64, height: f64) -> Self {
        Self {
            area,
            width,
            height,
        }
    }

    /// The canvas position under the middle of cell `(column, row)`, or
    /// `None` when the cell is outside the viewport.
    pub fn cell_to_canvas(&self, column: u16, row: u16) -> Option<Point> {
        let Rect {
            x,
            y,
            width,
            height,
        } = self.area;
        if width == 0 || height == 0 {
            return None;
        }
        if column < x || row < y || column >= x + width || row >= y + height {
            return None;
        }

        let fx = (f64::from(column - x) + 0.5) / f64::from(width);
        let fy = (f64::from(row - y) + 0.5) / f64::from(height);
        Some(Point::new(fx * self.width, fy * self.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> TargetLayout {
        TargetLayout::new(900.0, 700.0, 250.0, 10.0, 30.0, 10.0)
    }

    #[test]
    fn eight_targets_on_the_ring() {
        let layout = layout();
        assert_eq!(layout.center(), Point::new(450.0, 350.0));
        assert_eq!(layout.target(0), Some(Point::new(700.0, 350.0)));
        assert_eq!(layout.target(1), Some(Point::new(627.0, 527.0)));
        assert_eq!(layout.target(2), Some(Point::new(450.0, 600.0)));
        assert_eq!(layout.target(4), Some(Point::new(200.0, 350.0)));
        assert_eq!(layout.target(6), Some(Point::new(450.0, 100.0)));
        assert_eq!(layout.target(8), None);

        layout.targets().iter().for_each(|t| {
            assert!((t.abs_dist(&layout.center()) - 250.0).abs() < 1.5);
        });
    }

    #[test]
    fn default_target_table() {
        let positions: Vec<(f64, f64)> = layout().targets().iter().map(|p| (p.x, p.y)).collect();
        assert_eq!(
            positions,
            [
                (700.0, 350.0),
                (627.0, 527.0),
                (450.0, 600.0),
                (273.0, 527.0),
                (200.0, 350.0),
                (273.0, 173.0),
                (450.0, 100.0),
                (627.0, 173.0),
            ]
        );
    }

    #[test]
    fn capture_radius() {
        let layout = layout();
        let t = layout.target(3).unwrap();
        assert!(layout.hits_target(3, t));
        assert!(layout.hits_target(3, Point::new(t.x + 10.0, t.y)));
        assert!(!layout.hits_target(3, Point::new(t.x + 50.0, t.y)));
        assert!(!layout.hits_target(4, t));
        assert!(!layout.hits_target(9, t));
    }

    #[test]
    fn center_radius() {
        let layout = layout();
        assert!(layout.hits_center(Point::new(460.0, 360.0)));
        assert!(!layout.hits_center(Point::new(500.0, 350.0)));
    }

    #[test]
    fn viewport_mapping() {
        let viewport = Viewport::new(Rect::new(1, 1, 90, 35), 900.0, 700.0);
        assert_eq!(viewport.cell_to_canvas(0, 5), None);
        assert_eq!(viewport.cell_to_canvas(91, 5), None);
        assert_eq!(viewport.cell_to_canvas(5, 36), None);

        let p = viewport.cell_to_canvas(1, 1).unwrap();
        assert!((p.x - 5.0).abs() < 1e-9);
        assert!((p.y - 10.0).abs() < 1e-9);

        let p = viewport.cell_to_canvas(90, 35).unwrap();
        assert!((p.x - 895.0).abs() < 1e-9);
        assert!((p.y - 690.0).abs() < 1e-9);
    }
}
