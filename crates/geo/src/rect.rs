use approx::{AbsDiffEq, RelativeEq};

pub type Point = geo_types::Point<f64>;

/// Axis aligned envelope, stored as its north-west and south-east corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    top_left: Point,
    bottom_right: Point,
}

impl Rect {
    pub fn from_points(p1: Point, p2: Point) -> Self {
        Rect {
            top_left: Point::new(p1.x().min(p2.x()), p1.y().max(p2.y())),
            bottom_right: Point::new(p1.x().max(p2.x()), p1.y().min(p2.y())),
        }
    }

    pub fn from_nw_se(nw: Point, se: Point) -> Self {
        Rect {
            top_left: nw,
            bottom_right: se,
        }
    }

    pub fn top_left(&self) -> Point {
        self.top_left
    }

    pub fn top_right(&self) -> Point {
        Point::new(self.bottom_right.x(), self.top_left.y())
    }

    pub fn bottom_left(&self) -> Point {
        Point::new(self.top_left.x(), self.bottom_right.y())
    }

    pub fn bottom_right(&self) -> Point {
        self.bottom_right
    }

    pub fn left(&self) -> f64 {
        self.top_left.x()
    }

    pub fn right(&self) -> f64 {
        self.bottom_right.x()
    }

    pub fn top(&self) -> f64 {
        self.top_left.y()
    }

    pub fn bottom(&self) -> f64 {
        self.bottom_right.y()
    }

    pub fn width(&self) -> f64 {
        (self.bottom_right.x() - self.top_left.x()).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.top_left.y() - self.bottom_right.y()).max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0.0 || self.height() == 0.0
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.left() < other.right()
            && self.right() > other.left()
            && self.top() > other.bottom()
            && self.bottom() < other.top()
    }

    pub fn intersection(&self, other: &Rect) -> Rect {
        if !self.intersects(other) {
            return Rect::from_nw_se(Point::new(0.0, 0.0), Point::new(0.0, 0.0));
        }

        Rect::from_nw_se(
            Point::new(self.left().max(other.left()), self.top().min(other.top())),
            Point::new(self.right().min(other.right()), self.bottom().max(other.bottom())),
        )
    }
}

impl AbsDiffEq for Rect {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.top_left.abs_diff_eq(&other.top_left, epsilon) && self.bottom_right.abs_diff_eq(&other.bottom_right, epsilon)
    }
}

impl RelativeEq for Rect {
    fn default_max_relative() -> Self::Epsilon {
        f64::default_max_relative()
    }

    fn relative_eq(&self, other: &Self, epsilon: Self::Epsilon, max_relative: Self::Epsilon) -> bool {
        self.top_left.relative_eq(&other.top_left, epsilon, max_relative)
            && self.bottom_right.relative_eq(&other.bottom_right, epsilon, max_relative)
    }
}
