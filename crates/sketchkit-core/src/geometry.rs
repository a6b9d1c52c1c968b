//! 2D geometric primitives of a sketch.
//!
//! Geometry is a tagged union over the nine primitive kinds. Each element
//! additionally carries a construction-mode flag and an internal-alignment
//! role (e.g. "this circle visualizes a B-spline pole"). Parametric
//! evaluation lives here so the tessellator stays geometry-agnostic.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::id::PointPos;

/// A point in sketch-plane coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2d {
    pub x: f64,
    pub y: f64,
}

impl Point2d {
    pub const ORIGIN: Point2d = Point2d { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2d) -> f64 {
        self.distance_squared(other).sqrt()
    }

    pub fn distance_squared(&self, other: &Point2d) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn dot(&self, other: &Point2d) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Z component of the 2D cross product.
    pub fn cross(&self, other: &Point2d) -> f64 {
        self.x * other.y - self.y * other.x
    }

    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Unit vector in this direction, or `None` for a degenerate vector.
    pub fn normalized(&self) -> Option<Point2d> {
        let n = self.norm();
        if n < 1e-12 {
            None
        } else {
            Some(Point2d::new(self.x / n, self.y / n))
        }
    }

    pub fn lerp(&self, other: &Point2d, t: f64) -> Point2d {
        Point2d::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }

    pub fn midpoint(&self, other: &Point2d) -> Point2d {
        self.lerp(other, 0.5)
    }
}

impl std::ops::Add for Point2d {
    type Output = Point2d;
    fn add(self, rhs: Point2d) -> Point2d {
        Point2d::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Point2d {
    type Output = Point2d;
    fn sub(self, rhs: Point2d) -> Point2d {
        Point2d::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Mul<f64> for Point2d {
    type Output = Point2d;
    fn mul(self, rhs: f64) -> Point2d {
        Point2d::new(self.x * rhs, self.y * rhs)
    }
}

/// A line segment between two points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSeg {
    pub start: Point2d,
    pub end: Point2d,
}

impl LineSeg {
    pub fn new(start: Point2d, end: Point2d) -> Self {
        Self { start, end }
    }

    pub fn direction(&self) -> Point2d {
        self.end - self.start
    }

    pub fn length(&self) -> f64 {
        self.start.distance(&self.end)
    }
}

/// A full circle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: Point2d,
    pub radius: f64,
}

impl Circle {
    pub fn new(center: Point2d, radius: f64) -> Self {
        Self { center, radius }
    }
}

/// A full ellipse. `angle` rotates the major axis from +X.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ellipse {
    pub center: Point2d,
    pub major_radius: f64,
    pub minor_radius: f64,
    pub angle: f64,
}

/// A circular arc swept counter-clockwise from `start_angle` to `end_angle`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircArc {
    pub center: Point2d,
    pub radius: f64,
    pub start_angle: f64,
    pub end_angle: f64,
}

impl CircArc {
    /// Angular span in `(0, 2π]`.
    pub fn span(&self) -> f64 {
        let mut span = self.end_angle - self.start_angle;
        while span <= 0.0 {
            span += std::f64::consts::TAU;
        }
        span
    }
}

/// An elliptical arc over the parameter range `[start_param, end_param]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EllipseArc {
    pub center: Point2d,
    pub major_radius: f64,
    pub minor_radius: f64,
    pub angle: f64,
    pub start_param: f64,
    pub end_param: f64,
}

/// One branch segment of a hyperbola, `x(t) = a·cosh t`, `y(t) = b·sinh t`
/// in the local frame rotated by `angle` about `center`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HyperbolaArc {
    pub center: Point2d,
    pub major_radius: f64,
    pub minor_radius: f64,
    pub angle: f64,
    pub start_param: f64,
    pub end_param: f64,
}

/// A parabola segment, `x(t) = f·t²`, `y(t) = 2·f·t` in the local frame
/// with the axis along +X rotated by `angle` about the vertex.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParabolaArc {
    pub vertex: Point2d,
    pub focal: f64,
    pub angle: f64,
    pub start_param: f64,
    pub end_param: f64,
}

/// A (possibly rational, possibly periodic) B-spline curve.
///
/// `knots` is the full knot vector, length `control_points.len() + degree + 1`
/// for clamped curves. `weights` is empty for non-rational curves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BSpline {
    pub degree: usize,
    pub control_points: Vec<Point2d>,
    pub weights: Vec<f64>,
    pub knots: Vec<f64>,
    pub periodic: bool,
}

impl BSpline {
    /// A clamped uniform B-spline through the given control points.
    pub fn clamped(degree: usize, control_points: Vec<Point2d>) -> Self {
        let n = control_points.len();
        let mut knots = Vec::with_capacity(n + degree + 1);
        for _ in 0..=degree {
            knots.push(0.0);
        }
        let interior = n.saturating_sub(degree + 1);
        for i in 0..interior {
            knots.push((i + 1) as f64 / (interior + 1) as f64);
        }
        for _ in 0..=degree {
            knots.push(1.0);
        }
        Self {
            degree,
            control_points,
            weights: Vec::new(),
            knots,
            periodic: false,
        }
    }

    pub fn is_rational(&self) -> bool {
        !self.weights.is_empty()
    }

    pub fn first_param(&self) -> f64 {
        self.knots[self.degree]
    }

    pub fn last_param(&self) -> f64 {
        self.knots[self.knots.len() - self.degree - 1]
    }

    /// Weight of the given pole; 1.0 for non-rational curves.
    pub fn weight(&self, pole: usize) -> f64 {
        self.weights.get(pole).copied().unwrap_or(1.0)
    }

    /// True when every weight is equal, i.e. the curve is effectively
    /// non-rational no matter what the weights read.
    pub fn has_uniform_weights(&self) -> bool {
        if self.weights.len() < 2 {
            return true;
        }
        let w0 = self.weights[0];
        self.weights.iter().all(|w| (w - w0).abs() < 1e-12)
    }

    /// De Boor evaluation at parameter `u`, rational when weighted.
    pub fn eval(&self, u: f64) -> Point2d {
        let p = self.degree;
        let n = self.control_points.len();
        if n == 0 {
            return Point2d::ORIGIN;
        }
        if n <= p {
            return self.control_points[0];
        }
        let u = u.clamp(self.first_param(), self.last_param());

        // Knot span containing u.
        let mut k = p;
        while k < n - 1 && !(u >= self.knots[k] && u < self.knots[k + 1]) {
            k += 1;
        }
        if u >= self.knots[n] {
            k = n - 1;
        }

        // Homogeneous de Boor.
        let mut d: Vec<(f64, f64, f64)> = (0..=p)
            .map(|j| {
                let i = k - p + j;
                let w = self.weight(i);
                let c = self.control_points[i];
                (c.x * w, c.y * w, w)
            })
            .collect();
        for r in 1..=p {
            for j in (r..=p).rev() {
                let i = k - p + j;
                let denom = self.knots[i + p - r + 1] - self.knots[i];
                let alpha = if denom.abs() < 1e-12 {
                    0.0
                } else {
                    (u - self.knots[i]) / denom
                };
                d[j] = (
                    d[j - 1].0 * (1.0 - alpha) + d[j].0 * alpha,
                    d[j - 1].1 * (1.0 - alpha) + d[j].1 * alpha,
                    d[j - 1].2 * (1.0 - alpha) + d[j].2 * alpha,
                );
            }
        }
        let (x, y, w) = d[p];
        if w.abs() < 1e-12 {
            Point2d::ORIGIN
        } else {
            Point2d::new(x / w, y / w)
        }
    }
}

/// The tagged union over all geometry kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GeometryKind {
    Point { point: Point2d },
    LineSegment(LineSeg),
    Circle(Circle),
    Ellipse(Ellipse),
    ArcOfCircle(CircArc),
    ArcOfEllipse(EllipseArc),
    ArcOfHyperbola(HyperbolaArc),
    ArcOfParabola(ParabolaArc),
    BSpline(BSpline),
}

/// Role of helper geometry that visualizes internal structure of a host
/// element (B-spline poles/knots, conic foci and axes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InternalAlignment {
    None,
    EllipseMajorDiameter,
    EllipseMinorDiameter,
    EllipseFocus1,
    EllipseFocus2,
    HyperbolaMajorDiameter,
    HyperbolaMinorDiameter,
    HyperbolaFocus,
    ParabolaFocus,
    /// Pole circle of a B-spline; the payload is the pole index.
    BSplineControlPoint(usize),
    /// Knot point of a B-spline; the payload is the knot index.
    BSplineKnotPoint(usize),
}

impl Default for InternalAlignment {
    fn default() -> Self {
        InternalAlignment::None
    }
}

/// One geometry element of the sketch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryElement {
    pub kind: GeometryKind,
    /// Construction geometry is cosmetic: it guides other geometry but is
    /// never part of the sketch's output profile.
    pub construction: bool,
    #[serde(default)]
    pub internal_alignment: InternalAlignment,
}

impl GeometryElement {
    pub fn new(kind: GeometryKind) -> Self {
        Self {
            kind,
            construction: false,
            internal_alignment: InternalAlignment::None,
        }
    }

    pub fn construction(kind: GeometryKind) -> Self {
        Self {
            kind,
            construction: true,
            internal_alignment: InternalAlignment::None,
        }
    }

    pub fn with_alignment(mut self, alignment: InternalAlignment) -> Self {
        self.internal_alignment = alignment;
        self
    }

    /// The point this element exposes at `pos`, if it has one.
    pub fn point_at(&self, pos: PointPos) -> Option<Point2d> {
        use GeometryKind::*;
        match (&self.kind, pos) {
            (Point { point }, PointPos::Start) | (Point { point }, PointPos::Mid) => Some(*point),
            (LineSegment(l), PointPos::Start) => Some(l.start),
            (LineSegment(l), PointPos::End) => Some(l.end),
            (Circle(c), PointPos::Mid) => Some(c.center),
            (Ellipse(e), PointPos::Mid) => Some(e.center),
            (ArcOfCircle(a), PointPos::Start) => Some(self.eval_param(a.start_angle)),
            (ArcOfCircle(a), PointPos::End) => Some(self.eval_param(a.end_angle)),
            (ArcOfCircle(a), PointPos::Mid) => Some(a.center),
            (ArcOfEllipse(a), PointPos::Start) => Some(self.eval_param(a.start_param)),
            (ArcOfEllipse(a), PointPos::End) => Some(self.eval_param(a.end_param)),
            (ArcOfEllipse(a), PointPos::Mid) => Some(a.center),
            (ArcOfHyperbola(a), PointPos::Start) => Some(self.eval_param(a.start_param)),
            (ArcOfHyperbola(a), PointPos::End) => Some(self.eval_param(a.end_param)),
            (ArcOfHyperbola(a), PointPos::Mid) => Some(a.center),
            (ArcOfParabola(a), PointPos::Start) => Some(self.eval_param(a.start_param)),
            (ArcOfParabola(a), PointPos::End) => Some(self.eval_param(a.end_param)),
            (ArcOfParabola(a), PointPos::Mid) => Some(a.vertex),
            (BSpline(b), PointPos::Start) if !b.periodic => {
                b.control_points.first().copied()
            }
            (BSpline(b), PointPos::End) if !b.periodic => b.control_points.last().copied(),
            _ => None,
        }
    }

    /// The renderable points of this element in vertex-table order.
    pub fn vertices(&self) -> SmallVec<[(PointPos, Point2d); 3]> {
        use GeometryKind::*;
        let order: &[PointPos] = match &self.kind {
            Point { .. } => &[PointPos::Start],
            LineSegment(_) => &[PointPos::Start, PointPos::End],
            Circle(_) | Ellipse(_) => &[PointPos::Mid],
            ArcOfCircle(_) | ArcOfEllipse(_) | ArcOfHyperbola(_) | ArcOfParabola(_) => {
                &[PointPos::Start, PointPos::End, PointPos::Mid]
            }
            BSpline(b) => {
                if b.periodic {
                    &[]
                } else {
                    &[PointPos::Start, PointPos::End]
                }
            }
        };
        order
            .iter()
            .filter_map(|&pos| self.point_at(pos).map(|p| (pos, p)))
            .collect()
    }

    /// Parameter range for tessellation, when the element is a curve.
    pub fn param_range(&self) -> Option<(f64, f64)> {
        use GeometryKind::*;
        match &self.kind {
            Point { .. } => None,
            LineSegment(_) => Some((0.0, 1.0)),
            Circle(_) | Ellipse(_) => Some((0.0, std::f64::consts::TAU)),
            ArcOfCircle(a) => Some((a.start_angle, a.start_angle + a.span())),
            ArcOfEllipse(a) => Some((a.start_param, a.end_param)),
            ArcOfHyperbola(a) => Some((a.start_param, a.end_param)),
            ArcOfParabola(a) => Some((a.start_param, a.end_param)),
            BSpline(b) => Some((b.first_param(), b.last_param())),
        }
    }

    /// Evaluates the curve at a parameter value. Points evaluate to
    /// themselves regardless of the parameter.
    pub fn eval_param(&self, t: f64) -> Point2d {
        use GeometryKind::*;
        match &self.kind {
            Point { point } => *point,
            LineSegment(l) => l.start.lerp(&l.end, t),
            Circle(c) => Point2d::new(
                c.center.x + c.radius * t.cos(),
                c.center.y + c.radius * t.sin(),
            ),
            Ellipse(e) => eval_ellipse(e.center, e.major_radius, e.minor_radius, e.angle, t),
            ArcOfCircle(a) => Point2d::new(
                a.center.x + a.radius * t.cos(),
                a.center.y + a.radius * t.sin(),
            ),
            ArcOfEllipse(a) => eval_ellipse(a.center, a.major_radius, a.minor_radius, a.angle, t),
            ArcOfHyperbola(a) => {
                let lx = a.major_radius * t.cosh();
                let ly = a.minor_radius * t.sinh();
                rotate_about(a.center, a.angle, lx, ly)
            }
            ArcOfParabola(a) => {
                let lx = a.focal * t * t;
                let ly = 2.0 * a.focal * t;
                rotate_about(a.vertex, a.angle, lx, ly)
            }
            BSpline(b) => b.eval(t),
        }
    }

    /// True for closed curves (circles, ellipses, periodic splines).
    pub fn is_closed_curve(&self) -> bool {
        matches!(
            &self.kind,
            GeometryKind::Circle(_) | GeometryKind::Ellipse(_)
        ) || matches!(&self.kind, GeometryKind::BSpline(b) if b.periodic)
    }

    /// Short kind name used in logs and constraint diagnostics.
    pub fn kind_name(&self) -> &'static str {
        use GeometryKind::*;
        match &self.kind {
            Point { .. } => "Point",
            LineSegment(_) => "LineSegment",
            Circle(_) => "Circle",
            Ellipse(_) => "Ellipse",
            ArcOfCircle(_) => "ArcOfCircle",
            ArcOfEllipse(_) => "ArcOfEllipse",
            ArcOfHyperbola(_) => "ArcOfHyperbola",
            ArcOfParabola(_) => "ArcOfParabola",
            BSpline(_) => "BSplineCurve",
        }
    }
}

fn eval_ellipse(center: Point2d, major: f64, minor: f64, angle: f64, t: f64) -> Point2d {
    rotate_about(center, angle, major * t.cos(), minor * t.sin())
}

fn rotate_about(origin: Point2d, angle: f64, lx: f64, ly: f64) -> Point2d {
    let (sin, cos) = angle.sin_cos();
    Point2d::new(
        origin.x + lx * cos - ly * sin,
        origin.y + lx * sin + ly * cos,
    )
}
