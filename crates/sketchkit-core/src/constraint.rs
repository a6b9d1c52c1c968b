//! Sketch constraints.
//!
//! A constraint references one to three `(GeoId, PointPos)` operands plus a
//! label placement pair used purely for glyph positioning. The label pair
//! is mutable by dragging and is never solver input. Driving/active flags
//! affect rendering color only.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::id::{GeoId, GeoPointRef};

/// Internal-alignment role assigned by an `InternalAlignment` constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlignmentRole {
    EllipseMajorDiameter,
    EllipseMinorDiameter,
    EllipseFocus1,
    EllipseFocus2,
    HyperbolaMajorDiameter,
    HyperbolaMinorDiameter,
    HyperbolaFocus,
    ParabolaFocus,
    BSplineControlPoint(usize),
    BSplineKnotPoint(usize),
}

/// The constraint kinds of the sketch, with their operands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConstraintKind {
    /// Two points occupy the same location.
    Coincident { a: GeoPointRef, b: GeoPointRef },
    /// A line (or point pair) is horizontal.
    Horizontal {
        first: GeoPointRef,
        second: Option<GeoPointRef>,
    },
    /// A line (or point pair) is vertical.
    Vertical {
        first: GeoPointRef,
        second: Option<GeoPointRef>,
    },
    /// Two lines are parallel.
    Parallel { a: GeoId, b: GeoId },
    /// Two edges meet at a right angle.
    Perpendicular { a: GeoId, b: GeoId },
    /// Two edges are tangent.
    Tangent { a: GeoId, b: GeoId },
    /// Equal length (lines) or equal radius (circles/arcs).
    Equal { a: GeoId, b: GeoId },
    /// Two points are symmetric about a reference line or point.
    Symmetric {
        a: GeoPointRef,
        b: GeoPointRef,
        reference: GeoPointRef,
    },
    /// The edge is blocked in place.
    Block { edge: GeoId },
    /// A point lies on an edge.
    PointOnObject { point: GeoPointRef, object: GeoId },
    /// Distance between two points, or edge length when `b` is absent.
    Distance {
        a: GeoPointRef,
        b: Option<GeoPointRef>,
        value: f64,
    },
    /// Horizontal distance between two points (or from origin).
    DistanceX {
        a: GeoPointRef,
        b: Option<GeoPointRef>,
        value: f64,
    },
    /// Vertical distance between two points (or from origin).
    DistanceY {
        a: GeoPointRef,
        b: Option<GeoPointRef>,
        value: f64,
    },
    /// Radius of a circle or arc.
    Radius { edge: GeoId, value: f64 },
    /// Diameter of a circle or arc.
    Diameter { edge: GeoId, value: f64 },
    /// Weight of a B-spline pole (visualized as the pole circle radius).
    Weight { edge: GeoId, value: f64 },
    /// Angle of an edge, or between two edges.
    Angle {
        a: GeoId,
        b: Option<GeoId>,
        value: f64,
    },
    /// Ties helper geometry to internal structure of a host element.
    InternalAlignment {
        element: GeoId,
        host: GeoId,
        role: AlignmentRole,
    },
    /// Snell's law refraction at a boundary edge: n1·sin θ1 = n2·sin θ2.
    SnellsLaw {
        ray1: GeoPointRef,
        ray2: GeoPointRef,
        boundary: GeoId,
        ratio: f64,
    },
}

impl ConstraintKind {
    /// Short kind name used in labels, logs and diagnostics.
    pub fn name(&self) -> &'static str {
        use ConstraintKind::*;
        match self {
            Coincident { .. } => "Coincident",
            Horizontal { .. } => "Horizontal",
            Vertical { .. } => "Vertical",
            Parallel { .. } => "Parallel",
            Perpendicular { .. } => "Perpendicular",
            Tangent { .. } => "Tangent",
            Equal { .. } => "Equal",
            Symmetric { .. } => "Symmetric",
            Block { .. } => "Block",
            PointOnObject { .. } => "PointOnObject",
            Distance { .. } => "Distance",
            DistanceX { .. } => "DistanceX",
            DistanceY { .. } => "DistanceY",
            Radius { .. } => "Radius",
            Diameter { .. } => "Diameter",
            Weight { .. } => "Weight",
            Angle { .. } => "Angle",
            InternalAlignment { .. } => "InternalAlignment",
            SnellsLaw { .. } => "SnellsLaw",
        }
    }

    /// All operand references, points and edges alike.
    pub fn refs(&self) -> SmallVec<[GeoPointRef; 3]> {
        use ConstraintKind::*;
        let mut out = SmallVec::new();
        match self {
            Coincident { a, b } => {
                out.push(*a);
                out.push(*b);
            }
            Horizontal { first, second } | Vertical { first, second } => {
                out.push(*first);
                if let Some(s) = second {
                    out.push(*s);
                }
            }
            Parallel { a, b } | Perpendicular { a, b } | Tangent { a, b } | Equal { a, b } => {
                out.push(GeoPointRef::edge(*a));
                out.push(GeoPointRef::edge(*b));
            }
            Symmetric { a, b, reference } => {
                out.push(*a);
                out.push(*b);
                out.push(*reference);
            }
            Block { edge } | Radius { edge, .. } | Diameter { edge, .. }
            | Weight { edge, .. } => out.push(GeoPointRef::edge(*edge)),
            PointOnObject { point, object } => {
                out.push(*point);
                out.push(GeoPointRef::edge(*object));
            }
            Distance { a, b, .. } | DistanceX { a, b, .. } | DistanceY { a, b, .. } => {
                out.push(*a);
                if let Some(b) = b {
                    out.push(*b);
                }
            }
            Angle { a, b, .. } => {
                out.push(GeoPointRef::edge(*a));
                if let Some(b) = b {
                    out.push(GeoPointRef::edge(*b));
                }
            }
            InternalAlignment { element, host, .. } => {
                out.push(GeoPointRef::edge(*element));
                out.push(GeoPointRef::edge(*host));
            }
            SnellsLaw {
                ray1,
                ray2,
                boundary,
                ..
            } => {
                out.push(*ray1);
                out.push(*ray2);
                out.push(GeoPointRef::edge(*boundary));
            }
        }
        out
    }

    /// The dimensional value, for constraints that carry one.
    pub fn value(&self) -> Option<f64> {
        use ConstraintKind::*;
        match self {
            Distance { value, .. }
            | DistanceX { value, .. }
            | DistanceY { value, .. }
            | Radius { value, .. }
            | Diameter { value, .. }
            | Weight { value, .. }
            | Angle { value, .. } => Some(*value),
            SnellsLaw { ratio, .. } => Some(*ratio),
            _ => None,
        }
    }

    /// Sets the dimensional value; ignored for non-dimensional kinds.
    pub fn set_value(&mut self, new: f64) {
        use ConstraintKind::*;
        match self {
            Distance { value, .. }
            | DistanceX { value, .. }
            | DistanceY { value, .. }
            | Radius { value, .. }
            | Diameter { value, .. }
            | Weight { value, .. }
            | Angle { value, .. } => *value = new,
            SnellsLaw { ratio, .. } => *ratio = new,
            _ => {}
        }
    }

    /// Dimensional constraints render a value label and support the
    /// double-click edit dialog.
    pub fn is_dimensional(&self) -> bool {
        self.value().is_some()
    }
}

/// A constraint instance in the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub kind: ConstraintKind,
    /// Optional user-assigned name, surfaced in glyph labels and in the
    /// `Constraint<name-or-index>` sub-element string.
    #[serde(default)]
    pub name: Option<String>,
    /// Driving constraints feed the solver; reference (non-driving)
    /// dimensions only report. Rendering color only, as far as this crate
    /// is concerned.
    pub driving: bool,
    /// Inactive constraints are kept but not enforced.
    pub active: bool,
    /// Constraints in virtual space are hidden unless virtual-space display
    /// is toggled on.
    #[serde(default)]
    pub in_virtual_space: bool,
    /// Distance of the glyph/label from its anchor, in sketch units.
    #[serde(default)]
    pub label_distance: f64,
    /// Position of the label along the dimension line.
    #[serde(default)]
    pub label_position: f64,
}

impl Constraint {
    pub fn new(kind: ConstraintKind) -> Self {
        Self {
            kind,
            name: None,
            driving: true,
            active: true,
            in_virtual_space: false,
            label_distance: 0.0,
            label_position: 0.0,
        }
    }

    pub fn named(kind: ConstraintKind, name: impl Into<String>) -> Self {
        let mut c = Self::new(kind);
        c.name = Some(name.into());
        c
    }

    /// The `name-or-index` text used by the selection scheme; `index` is
    /// this constraint's zero-based position in the model.
    pub fn display_name(&self, index: usize) -> String {
        match &self.name {
            Some(n) if !n.is_empty() => n.clone(),
            _ => (index + 1).to_string(),
        }
    }

    /// All distinct GeoIds this constraint touches.
    pub fn geo_ids(&self) -> SmallVec<[GeoId; 3]> {
        let mut ids: SmallVec<[GeoId; 3]> = SmallVec::new();
        for r in self.kind.refs() {
            if !ids.contains(&r.geo_id) {
                ids.push(r.geo_id);
            }
        }
        ids
    }
}
