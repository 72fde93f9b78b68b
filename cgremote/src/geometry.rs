use serde::Deserialize;
use serde::Serialize;

/// A position in global display coordinates.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// A rectangle in global display coordinates. The layout matches `CGRect` so
/// that lists handed out by the window server can be viewed in place.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            origin: Point::new(x, y),
            size: Size::new(width, height),
        }
    }

    pub fn min_x(&self) -> f64 {
        self.origin.x.min(self.origin.x + self.size.width)
    }

    pub fn min_y(&self) -> f64 {
        self.origin.y.min(self.origin.y + self.size.height)
    }

    pub fn max_x(&self) -> f64 {
        self.origin.x.max(self.origin.x + self.size.width)
    }

    pub fn max_y(&self) -> f64 {
        self.origin.y.max(self.origin.y + self.size.height)
    }

    pub fn is_empty(&self) -> bool {
        self.size.width == 0.0 || self.size.height == 0.0
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.min_x() < other.max_x()
            && other.min_x() < self.max_x()
            && self.min_y() < other.max_y()
            && other.min_y() < self.max_y()
    }

    /// Like [`Rect::intersects`] but shared edges count too.
    pub fn touches(&self, other: &Rect) -> bool {
        self.min_x() <= other.max_x()
            && other.min_x() <= self.max_x()
            && self.min_y() <= other.max_y()
            && other.min_y() <= self.max_y()
    }

    /// Smallest rectangle containing both.
    #[must_use]
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }

        if other.is_empty() {
            return *self;
        }

        let min_x = self.min_x().min(other.min_x());
        let min_y = self.min_y().min(other.min_y());
        let max_x = self.max_x().max(other.max_x());
        let max_y = self.max_y().max(other.max_y());

        Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    /// Where this rectangle ends up after a screen move by `delta`.
    #[must_use]
    pub fn offset_by(&self, delta: MoveDelta) -> Rect {
        Rect {
            origin: Point::new(
                self.origin.x + f64::from(delta.dx),
                self.origin.y + f64::from(delta.dy),
            ),
            size: self.size,
        }
    }

    pub fn contains_point(&self, point: Point) -> bool {
        point.x >= self.min_x()
            && point.x <= self.max_x()
            && point.y >= self.min_y()
            && point.y <= self.max_y()
    }
}

/// Distance a screen region moved, in pixels.
///
/// Positive `dx` is a move to the right and positive `dy` a move downward,
/// following the global coordinate space where y grows towards the bottom.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct MoveDelta {
    pub dx: i32,
    pub dy: i32,
}

impl MoveDelta {
    pub const fn new(dx: i32, dy: i32) -> Self {
        Self { dx, dy }
    }

    pub const fn is_rightward(&self) -> bool {
        self.dx > 0
    }

    pub const fn is_leftward(&self) -> bool {
        self.dx < 0
    }

    pub const fn is_downward(&self) -> bool {
        self.dy > 0
    }

    pub const fn is_upward(&self) -> bool {
        self.dy < 0
    }

    pub const fn is_zero(&self) -> bool {
        self.dx == 0 && self.dy == 0
    }
}

/// Merge rectangles that overlap or share an edge until no two do.
pub fn coalesce(rects: &[Rect]) -> Vec<Rect> {
    let mut merged: Vec<Rect> = Vec::with_capacity(rects.len());

    for rect in rects.iter().filter(|r| !r.is_empty()) {
        let mut current = *rect;

        // keep folding until the accumulated rect stops absorbing neighbours
        loop {
            let before = merged.len();
            merged.retain(|existing| {
                if existing.touches(&current) {
                    current = current.union(existing);
                    false
                } else {
                    true
                }
            });

            if merged.len() == before {
                break;
            }
        }

        merged.push(current);
    }

    merged
}

#[cfg(target_os = "macos")]
mod quartz {
    use super::Point;
    use super::Rect;
    use super::Size;
    use objc2_core_foundation::CGFloat;
    use objc2_core_foundation::CGPoint;
    use objc2_core_foundation::CGRect;
    use objc2_core_foundation::CGSize;

    impl From<CGPoint> for Point {
        fn from(value: CGPoint) -> Self {
            Self::new(value.x as f64, value.y as f64)
        }
    }

    impl From<Point> for CGPoint {
        fn from(value: Point) -> Self {
            CGPoint::new(value.x as CGFloat, value.y as CGFloat)
        }
    }

    impl From<CGRect> for Rect {
        fn from(value: CGRect) -> Self {
            Self {
                origin: Point::from(value.origin),
                size: Size::new(value.size.width as f64, value.size.height as f64),
            }
        }
    }

    impl From<&Rect> for CGRect {
        fn from(value: &Rect) -> Self {
            Self {
                origin: CGPoint::from(value.origin),
                size: CGSize {
                    width: value.size.width as CGFloat,
                    height: value.size.height as CGFloat,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_delta_sign_convention() {
        let delta = MoveDelta::new(10, 20);
        assert!(delta.is_rightward());
        assert!(delta.is_downward());
        assert!(!delta.is_leftward());
        assert!(!delta.is_upward());

        let moved = Rect::new(0.0, 0.0, 5.0, 5.0).offset_by(delta);
        assert_eq!(moved, Rect::new(10.0, 20.0, 5.0, 5.0));

        let back = moved.offset_by(MoveDelta::new(-10, -20));
        assert_eq!(back, Rect::new(0.0, 0.0, 5.0, 5.0));
        assert!(MoveDelta::new(-1, -1).is_leftward());
        assert!(MoveDelta::new(-1, -1).is_upward());
    }

    #[test]
    fn test_intersects_and_touches() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(10.0, 0.0, 10.0, 10.0);
        let c = Rect::new(5.0, 5.0, 10.0, 10.0);

        assert!(!a.intersects(&b));
        assert!(a.touches(&b));
        assert!(a.intersects(&c));
        assert!(!a.intersects(&Rect::default()));
    }

    #[test]
    fn test_union() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(20.0, 30.0, 5.0, 5.0);

        assert_eq!(a.union(&b), Rect::new(0.0, 0.0, 25.0, 35.0));
        assert_eq!(a.union(&Rect::default()), a);
    }

    #[test]
    fn test_coalesce_merges_chains() {
        let rects = [
            Rect::new(0.0, 0.0, 10.0, 10.0),
            Rect::new(100.0, 100.0, 10.0, 10.0),
            Rect::new(10.0, 0.0, 10.0, 10.0),
            Rect::new(20.0, 5.0, 10.0, 10.0),
        ];

        let merged = coalesce(&rects);
        assert_eq!(merged.len(), 2);
        assert!(merged.contains(&Rect::new(0.0, 0.0, 30.0, 15.0)));
        assert!(merged.contains(&Rect::new(100.0, 100.0, 10.0, 10.0)));
    }

    #[test]
    fn test_coalesce_drops_empty_rects() {
        assert!(coalesce(&[Rect::default()]).is_empty());
    }

    #[test]
    fn test_rect_layout_matches_four_doubles() {
        assert_eq!(std::mem::size_of::<Rect>(), 4 * std::mem::size_of::<f64>());
        assert_eq!(std::mem::size_of::<MoveDelta>(), 2 * std::mem::size_of::<i32>());
    }
}
