//! The geometry model: source of truth for one sketch.
//!
//! Owns the internal and external geometry lists plus the constraint list.
//! GeoIds are stable across incremental edits; only explicit delete
//! operations renumber, and constraint operands are remapped (or the
//! constraint dropped) at the same time.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::constraint::Constraint;
use crate::error::ModelError;
use crate::geometry::{GeometryElement, Point2d};
use crate::id::{external_index, GeoId, PointPos, GEOID_H_AXIS, GEOID_V_AXIS};

/// The sketch model: geometry plus constraints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeometryModel {
    internal: Vec<GeometryElement>,
    external: Vec<GeometryElement>,
    constraints: Vec<Constraint>,
}

impl GeometryModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds normal geometry; returns its GeoId.
    pub fn add_geometry(&mut self, element: GeometryElement) -> GeoId {
        self.internal.push(element);
        (self.internal.len() - 1) as GeoId
    }

    /// Adds external reference geometry; returns its (negative) GeoId.
    pub fn add_external(&mut self, element: GeometryElement) -> GeoId {
        self.external.push(element);
        crate::id::external_geo_id(self.external.len() - 1)
    }

    /// Index of the highest internal GeoId, `-1` for an empty sketch.
    pub fn highest_internal_index(&self) -> i32 {
        self.internal.len() as i32 - 1
    }

    pub fn internal_count(&self) -> usize {
        self.internal.len()
    }

    pub fn external_count(&self) -> usize {
        self.external.len()
    }

    /// Whether `geo_id` resolves against the current model. Axis ids are
    /// always valid.
    pub fn contains(&self, geo_id: GeoId) -> bool {
        if geo_id == GEOID_H_AXIS || geo_id == GEOID_V_AXIS {
            return true;
        }
        match external_index(geo_id) {
            Some(i) => i < self.external.len(),
            None => (geo_id as usize) < self.internal.len(),
        }
    }

    /// Looks up a geometry element. Axis ids are not elements and fail.
    pub fn geometry(&self, geo_id: GeoId) -> Result<&GeometryElement, ModelError> {
        match external_index(geo_id) {
            Some(i) => self.external.get(i),
            None if geo_id >= 0 => self.internal.get(geo_id as usize),
            None => None,
        }
        .ok_or(ModelError::InvalidGeoId { geo_id })
    }

    pub fn geometry_mut(&mut self, geo_id: GeoId) -> Result<&mut GeometryElement, ModelError> {
        match external_index(geo_id) {
            Some(i) => self.external.get_mut(i),
            None if geo_id >= 0 => self.internal.get_mut(geo_id as usize),
            None => None,
        }
        .ok_or(ModelError::InvalidGeoId { geo_id })
    }

    /// Resolves a point reference. The axis ids expose the origin as their
    /// start/mid point.
    pub fn point(&self, geo_id: GeoId, pos: PointPos) -> Result<Point2d, ModelError> {
        if geo_id == GEOID_H_AXIS || geo_id == GEOID_V_AXIS {
            return match pos {
                PointPos::Start | PointPos::Mid => Ok(Point2d::ORIGIN),
                _ => Err(ModelError::InvalidPointPos { geo_id, pos }),
            };
        }
        self.geometry(geo_id)?
            .point_at(pos)
            .ok_or(ModelError::InvalidPointPos { geo_id, pos })
    }

    pub fn internal_geometry(&self) -> &[GeometryElement] {
        &self.internal
    }

    pub fn external_geometry(&self) -> &[GeometryElement] {
        &self.external
    }

    /// Iterates `(GeoId, element)` over internal then external geometry.
    pub fn iter_geometry(&self) -> impl Iterator<Item = (GeoId, &GeometryElement)> {
        let internal = self
            .internal
            .iter()
            .enumerate()
            .map(|(i, e)| (i as GeoId, e));
        let external = self
            .external
            .iter()
            .enumerate()
            .map(|(i, e)| (crate::id::external_geo_id(i), e));
        internal.chain(external)
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn constraint(&self, index: usize) -> Option<&Constraint> {
        self.constraints.get(index)
    }

    pub fn constraint_mut(&mut self, index: usize) -> Option<&mut Constraint> {
        self.constraints.get_mut(index)
    }

    /// Adds a constraint; returns its index.
    pub fn add_constraint(&mut self, constraint: Constraint) -> usize {
        self.constraints.push(constraint);
        self.constraints.len() - 1
    }

    /// Removes a constraint by index; later indices shift down.
    pub fn remove_constraint(&mut self, index: usize) -> Option<Constraint> {
        if index < self.constraints.len() {
            Some(self.constraints.remove(index))
        } else {
            None
        }
    }

    /// Checks that every operand of constraint `index` resolves in the
    /// current model. Stale references are reported, never panicked on:
    /// during undo/redo the constraint list can transiently point at
    /// deleted geometry.
    pub fn validate_constraint(&self, index: usize) -> Result<(), ModelError> {
        let constraint = self
            .constraints
            .get(index)
            .ok_or(ModelError::Degenerate {
                reason: format!("constraint index {index} out of range"),
            })?;
        for r in constraint.kind.refs() {
            if !self.contains(r.geo_id) {
                return Err(ModelError::StaleConstraint {
                    index,
                    geo_id: r.geo_id,
                });
            }
        }
        Ok(())
    }

    /// Removes geometry and renumbers. Constraints referencing the removed
    /// element are dropped; references to higher ids in the same sign
    /// partition are shifted to stay stable.
    pub fn remove_geometry(&mut self, geo_id: GeoId) -> Result<GeometryElement, ModelError> {
        let removed = match external_index(geo_id) {
            Some(i) if i < self.external.len() => self.external.remove(i),
            Some(_) => return Err(ModelError::InvalidGeoId { geo_id }),
            None if geo_id >= 0 && (geo_id as usize) < self.internal.len() => {
                self.internal.remove(geo_id as usize)
            }
            None => return Err(ModelError::InvalidGeoId { geo_id }),
        };

        let shift = |id: GeoId| -> Option<GeoId> {
            if id == geo_id {
                None
            } else if geo_id >= 0 && id > geo_id {
                Some(id - 1)
            } else if geo_id < 0 && id < geo_id {
                // External ids count down; ids below the removed one move up.
                Some(id + 1)
            } else {
                Some(id)
            }
        };

        let before = self.constraints.len();
        let mut kept = Vec::with_capacity(before);
        'outer: for mut c in std::mem::take(&mut self.constraints) {
            for r in c.kind.refs() {
                if shift(r.geo_id).is_none() {
                    continue 'outer;
                }
            }
            remap_constraint_ids(&mut c, &shift);
            kept.push(c);
        }
        self.constraints = kept;
        trace!(
            geo_id,
            dropped = before - self.constraints.len(),
            "removed geometry and dependent constraints"
        );
        Ok(removed)
    }

    /// Deep copy of the model for a drag session. Live solver iterations
    /// mutate the copy; the committed model stays untouched until the drag
    /// is committed.
    pub fn extract_geometry(&self) -> GeometryModel {
        self.clone()
    }

    /// Replaces the geometry lists with those of a solved temporary copy,
    /// keeping this model's constraint list authoritative.
    pub fn adopt_geometry(&mut self, temp: &GeometryModel) {
        self.internal = temp.internal.clone();
        self.external = temp.external.clone();
    }

    /// Axis-aligned bounds over all geometry vertices, if any.
    pub fn bounds(&self) -> Option<(Point2d, Point2d)> {
        let mut min = Point2d::new(f64::INFINITY, f64::INFINITY);
        let mut max = Point2d::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        let mut any = false;
        for (_, element) in self.iter_geometry() {
            for (_, p) in element.vertices() {
                min.x = min.x.min(p.x);
                min.y = min.y.min(p.y);
                max.x = max.x.max(p.x);
                max.y = max.y.max(p.y);
                any = true;
            }
        }
        if any {
            Some((min, max))
        } else {
            None
        }
    }
}

fn remap_constraint_ids<F: Fn(GeoId) -> Option<GeoId>>(constraint: &mut Constraint, shift: &F) {
    use crate::constraint::ConstraintKind::*;
    let remap_ref = |r: &mut crate::id::GeoPointRef| {
        if let Some(new) = shift(r.geo_id) {
            r.geo_id = new;
        }
    };
    let remap_id = |g: &mut GeoId| {
        if let Some(new) = shift(*g) {
            *g = new;
        }
    };
    match &mut constraint.kind {
        Coincident { a, b } => {
            remap_ref(a);
            remap_ref(b);
        }
        Horizontal { first, second } | Vertical { first, second } => {
            remap_ref(first);
            if let Some(s) = second {
                remap_ref(s);
            }
        }
        Parallel { a, b } | Perpendicular { a, b } | Tangent { a, b } | Equal { a, b } => {
            remap_id(a);
            remap_id(b);
        }
        Symmetric { a, b, reference } => {
            remap_ref(a);
            remap_ref(b);
            remap_ref(reference);
        }
        Block { edge } | Radius { edge, .. } | Diameter { edge, .. } | Weight { edge, .. } => {
            remap_id(edge)
        }
        PointOnObject { point, object } => {
            remap_ref(point);
            remap_id(object);
        }
        Distance { a, b, .. } | DistanceX { a, b, .. } | DistanceY { a, b, .. } => {
            remap_ref(a);
            if let Some(b) = b {
                remap_ref(b);
            }
        }
        Angle { a, b, .. } => {
            remap_id(a);
            if let Some(b) = b {
                remap_id(b);
            }
        }
        InternalAlignment { element, host, .. } => {
            remap_id(element);
            remap_id(host);
        }
        SnellsLaw {
            ray1,
            ray2,
            boundary,
            ..
        } => {
            remap_ref(ray1);
            remap_ref(ray2);
            remap_id(boundary);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::ConstraintKind;
    use crate::geometry::{GeometryKind, LineSeg};
    use crate::id::GeoPointRef;

    fn line(x0: f64, y0: f64, x1: f64, y1: f64) -> GeometryElement {
        GeometryElement::new(GeometryKind::LineSegment(LineSeg::new(
            Point2d::new(x0, y0),
            Point2d::new(x1, y1),
        )))
    }

    #[test]
    fn geo_ids_are_positional() {
        let mut m = GeometryModel::new();
        assert_eq!(m.highest_internal_index(), -1);
        let a = m.add_geometry(line(0.0, 0.0, 1.0, 0.0));
        let b = m.add_geometry(line(1.0, 0.0, 1.0, 1.0));
        assert_eq!((a, b), (0, 1));
        assert_eq!(m.highest_internal_index(), 1);

        let e = m.add_external(line(5.0, 5.0, 6.0, 5.0));
        assert_eq!(e, -3);
        assert_eq!(m.external_count(), 1);
        assert!(m.contains(e));
        assert!(m.contains(-1));
        assert!(!m.contains(-4));
    }

    #[test]
    fn axis_points_resolve_to_origin() {
        let m = GeometryModel::new();
        assert_eq!(m.point(-1, PointPos::Start).unwrap(), Point2d::ORIGIN);
        assert_eq!(m.point(-2, PointPos::Mid).unwrap(), Point2d::ORIGIN);
        assert!(m.point(-1, PointPos::End).is_err());
        assert!(m.geometry(-1).is_err());
    }

    #[test]
    fn invalid_geo_id_fails() {
        let m = GeometryModel::new();
        assert!(matches!(
            m.geometry(3),
            Err(ModelError::InvalidGeoId { geo_id: 3 })
        ));
    }

    #[test]
    fn remove_geometry_renumbers_and_drops_constraints() {
        let mut m = GeometryModel::new();
        m.add_geometry(line(0.0, 0.0, 1.0, 0.0)); // 0
        m.add_geometry(line(1.0, 0.0, 1.0, 1.0)); // 1
        m.add_geometry(line(1.0, 1.0, 0.0, 1.0)); // 2
        m.add_constraint(Constraint::new(ConstraintKind::Horizontal {
            first: GeoPointRef::edge(0),
            second: None,
        }));
        m.add_constraint(Constraint::new(ConstraintKind::Parallel { a: 0, b: 2 }));
        m.add_constraint(Constraint::new(ConstraintKind::Vertical {
            first: GeoPointRef::edge(1),
            second: None,
        }));

        m.remove_geometry(1).unwrap();

        // Vertical on geo 1 dropped; Parallel's operand 2 renumbered to 1.
        assert_eq!(m.constraints().len(), 2);
        assert!(matches!(
            m.constraints()[1].kind,
            ConstraintKind::Parallel { a: 0, b: 1 }
        ));
        assert_eq!(m.internal_count(), 2);
    }

    #[test]
    fn stale_reference_is_reported_not_panicked() {
        let mut m = GeometryModel::new();
        m.add_geometry(line(0.0, 0.0, 1.0, 0.0));
        // Simulate an undo/redo transient: a constraint pointing past the end.
        m.add_constraint(Constraint::new(ConstraintKind::Parallel { a: 0, b: 7 }));
        assert!(matches!(
            m.validate_constraint(0),
            Err(ModelError::StaleConstraint { index: 0, geo_id: 7 })
        ));
    }

    #[test]
    fn extract_geometry_is_independent() {
        let mut m = GeometryModel::new();
        let id = m.add_geometry(line(0.0, 0.0, 1.0, 0.0));
        let mut temp = m.extract_geometry();
        if let GeometryKind::LineSegment(l) = &mut temp.geometry_mut(id).unwrap().kind {
            l.end = Point2d::new(9.0, 9.0);
        }
        let committed = m.point(id, PointPos::End).unwrap();
        assert_eq!(committed, Point2d::new(1.0, 0.0));
    }
}
