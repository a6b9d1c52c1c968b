//! Selection and preselection state for one edit session.
//!
//! Points and curves are refcounted: a vertex can be implicitly selected by
//! several overlapping constraint highlights at once, and only drops out of
//! the selection when the last reference releases it. The two sketch axes
//! live in the curve map under their sentinel GeoIds. Every change is
//! broadcast to observers keyed by the exact sub-element name strings.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use sketchkit_core::id::{GeoId, SubElement, GEOID_H_AXIS, GEOID_V_AXIS, ROOT_POINT_VERTEX};
use sketchkit_core::model::GeometryModel;

/// Which part of the origin cross is preselected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossTarget {
    Origin,
    HorizontalAxis,
    VerticalAxis,
}

impl CrossTarget {
    fn sub_element(&self) -> SubElement {
        match self {
            CrossTarget::Origin => SubElement::RootPoint,
            CrossTarget::HorizontalAxis => SubElement::HAxis,
            CrossTarget::VerticalAxis => SubElement::VAxis,
        }
    }
}

/// Selection change notifications, carrying the load-bearing name strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionEvent {
    Selected(String),
    Deselected(String),
    Preselected(String),
    PreselectCleared,
}

/// Observer of selection broadcasts.
pub trait SelectionObserver {
    fn selection_changed(&mut self, event: &SelectionEvent);
}

/// Refcounted selection state plus single-valued preselect slots.
#[derive(Default)]
pub struct SelectionManager {
    /// Vertex id -> refcount; the root point uses the `-1` sentinel.
    sel_points: HashMap<i32, usize>,
    /// GeoId -> refcount; axes via sentinel ids `-1`/`-2`.
    sel_curves: HashMap<GeoId, usize>,
    sel_constraints: HashSet<usize>,

    preselect_point: Option<i32>,
    preselect_curve: Option<GeoId>,
    preselect_cross: Option<CrossTarget>,
    preselect_constraints: HashSet<usize>,

    observers: Vec<Box<dyn SelectionObserver>>,
}

impl std::fmt::Debug for SelectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionManager")
            .field("sel_points", &self.sel_points)
            .field("sel_curves", &self.sel_curves)
            .field("sel_constraints", &self.sel_constraints)
            .field("observers", &self.observers.len())
            .finish()
    }
}

fn vertex_sub_element(vertex_id: i32) -> SubElement {
    if vertex_id == ROOT_POINT_VERTEX {
        SubElement::RootPoint
    } else {
        SubElement::Vertex(vertex_id as usize)
    }
}

impl SelectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(&mut self, observer: Box<dyn SelectionObserver>) {
        self.observers.push(observer);
    }

    fn broadcast(&mut self, event: SelectionEvent) {
        for observer in &mut self.observers {
            observer.selection_changed(&event);
        }
    }

    // Points ---------------------------------------------------------------

    /// Adds one reference to a vertex; broadcasts only on the 0 -> 1 edge.
    pub fn select_point(&mut self, vertex_id: i32) {
        let count = self.sel_points.entry(vertex_id).or_insert(0);
        *count += 1;
        if *count == 1 {
            let name = vertex_sub_element(vertex_id).to_string();
            self.broadcast(SelectionEvent::Selected(name));
        }
    }

    /// Releases one reference; the vertex deselects when the count hits 0.
    pub fn deselect_point(&mut self, vertex_id: i32) {
        let Some(count) = self.sel_points.get_mut(&vertex_id) else {
            return;
        };
        *count -= 1;
        if *count == 0 {
            self.sel_points.remove(&vertex_id);
            let name = vertex_sub_element(vertex_id).to_string();
            self.broadcast(SelectionEvent::Deselected(name));
        }
    }

    pub fn is_point_selected(&self, vertex_id: i32) -> bool {
        self.sel_points.contains_key(&vertex_id)
    }

    /// Toggle used by click-release; returns the new state.
    pub fn toggle_point(&mut self, vertex_id: i32) -> bool {
        if self.is_point_selected(vertex_id) {
            // A toggle removes the entry outright regardless of refcount:
            // the user explicitly deselected it.
            self.sel_points.remove(&vertex_id);
            let name = vertex_sub_element(vertex_id).to_string();
            self.broadcast(SelectionEvent::Deselected(name));
            false
        } else {
            self.select_point(vertex_id);
            true
        }
    }

    // Curves ---------------------------------------------------------------

    pub fn select_curve(&mut self, geo_id: GeoId) {
        let count = self.sel_curves.entry(geo_id).or_insert(0);
        *count += 1;
        if *count == 1 {
            let name = SubElement::for_edge(geo_id).to_string();
            self.broadcast(SelectionEvent::Selected(name));
        }
    }

    pub fn deselect_curve(&mut self, geo_id: GeoId) {
        let Some(count) = self.sel_curves.get_mut(&geo_id) else {
            return;
        };
        *count -= 1;
        if *count == 0 {
            self.sel_curves.remove(&geo_id);
            let name = SubElement::for_edge(geo_id).to_string();
            self.broadcast(SelectionEvent::Deselected(name));
        }
    }

    pub fn is_curve_selected(&self, geo_id: GeoId) -> bool {
        self.sel_curves.contains_key(&geo_id)
    }

    pub fn toggle_curve(&mut self, geo_id: GeoId) -> bool {
        if self.is_curve_selected(geo_id) {
            self.sel_curves.remove(&geo_id);
            let name = SubElement::for_edge(geo_id).to_string();
            self.broadcast(SelectionEvent::Deselected(name));
            false
        } else {
            self.select_curve(geo_id);
            true
        }
    }

    /// Selected curve GeoIds, sorted for deterministic reads.
    pub fn selected_curves(&self) -> Vec<GeoId> {
        let mut ids: Vec<GeoId> = self.sel_curves.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn selected_points(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.sel_points.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    // Constraints ----------------------------------------------------------

    pub fn select_constraint(&mut self, index: usize, model: &GeometryModel) {
        if self.sel_constraints.insert(index) {
            let name = constraint_name(model, index);
            self.broadcast(SelectionEvent::Selected(name));
        }
    }

    pub fn deselect_constraint(&mut self, index: usize, model: &GeometryModel) {
        if self.sel_constraints.remove(&index) {
            let name = constraint_name(model, index);
            self.broadcast(SelectionEvent::Deselected(name));
        }
    }

    pub fn is_constraint_selected(&self, index: usize) -> bool {
        self.sel_constraints.contains(&index)
    }

    pub fn toggle_constraint(&mut self, index: usize, model: &GeometryModel) -> bool {
        if self.is_constraint_selected(index) {
            self.deselect_constraint(index, model);
            false
        } else {
            self.select_constraint(index, model);
            true
        }
    }

    pub fn selected_constraints(&self) -> Vec<usize> {
        let mut ids: Vec<usize> = self.sel_constraints.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    // Preselection ---------------------------------------------------------

    pub fn set_preselect_point(&mut self, vertex_id: i32) {
        self.clear_preselect();
        self.preselect_point = Some(vertex_id);
        let name = vertex_sub_element(vertex_id).to_string();
        self.broadcast(SelectionEvent::Preselected(name));
    }

    pub fn set_preselect_curve(&mut self, geo_id: GeoId) {
        self.clear_preselect();
        self.preselect_curve = Some(geo_id);
        let name = SubElement::for_edge(geo_id).to_string();
        self.broadcast(SelectionEvent::Preselected(name));
    }

    pub fn set_preselect_cross(&mut self, target: CrossTarget) {
        self.clear_preselect();
        self.preselect_cross = Some(target);
        let name = target.sub_element().to_string();
        self.broadcast(SelectionEvent::Preselected(name));
    }

    pub fn set_preselect_constraints(
        &mut self,
        indices: impl IntoIterator<Item = usize>,
        model: &GeometryModel,
    ) {
        self.clear_preselect();
        self.preselect_constraints = indices.into_iter().collect();
        let mut sorted: Vec<usize> = self.preselect_constraints.iter().copied().collect();
        sorted.sort_unstable();
        for index in sorted {
            let name = constraint_name(model, index);
            self.broadcast(SelectionEvent::Preselected(name));
        }
    }

    pub fn clear_preselect(&mut self) {
        let had_any = self.preselect_point.is_some()
            || self.preselect_curve.is_some()
            || self.preselect_cross.is_some()
            || !self.preselect_constraints.is_empty();
        self.preselect_point = None;
        self.preselect_curve = None;
        self.preselect_cross = None;
        self.preselect_constraints.clear();
        if had_any {
            self.broadcast(SelectionEvent::PreselectCleared);
        }
    }

    pub fn preselect_point(&self) -> Option<i32> {
        self.preselect_point
    }

    pub fn preselect_curve(&self) -> Option<GeoId> {
        self.preselect_curve
    }

    pub fn preselect_cross(&self) -> Option<CrossTarget> {
        self.preselect_cross
    }

    // Bulk operations ------------------------------------------------------

    /// Selects every internal curve and vertex plus all constraints.
    pub fn select_all(&mut self, model: &GeometryModel, vertex_count: usize) {
        for geo_id in 0..model.internal_count() as GeoId {
            if !self.is_curve_selected(geo_id) {
                self.select_curve(geo_id);
            }
        }
        for vertex_id in 0..vertex_count as i32 {
            if !self.is_point_selected(vertex_id) {
                self.select_point(vertex_id);
            }
        }
        for index in 0..model.constraints().len() {
            self.select_constraint(index, model);
        }
        debug!(
            curves = model.internal_count(),
            vertices = vertex_count,
            "selected all"
        );
    }

    /// Drops the whole selection, broadcasting a deselect per entry.
    pub fn clear_all(&mut self, model: &GeometryModel) {
        for vertex_id in self.selected_points() {
            let name = vertex_sub_element(vertex_id).to_string();
            self.broadcast(SelectionEvent::Deselected(name));
        }
        for geo_id in self.selected_curves() {
            let name = SubElement::for_edge(geo_id).to_string();
            self.broadcast(SelectionEvent::Deselected(name));
        }
        for index in self.selected_constraints() {
            let name = constraint_name(model, index);
            self.broadcast(SelectionEvent::Deselected(name));
        }
        self.sel_points.clear();
        self.sel_curves.clear();
        self.sel_constraints.clear();
        self.clear_preselect();
    }

    pub fn is_empty(&self) -> bool {
        self.sel_points.is_empty() && self.sel_curves.is_empty() && self.sel_constraints.is_empty()
    }
}

fn constraint_name(model: &GeometryModel, index: usize) -> String {
    let name = model
        .constraint(index)
        .map(|c| c.display_name(index))
        .unwrap_or_else(|| (index + 1).to_string());
    SubElement::Constraint(name).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        events: Rc<RefCell<Vec<SelectionEvent>>>,
    }

    impl SelectionObserver for Recorder {
        fn selection_changed(&mut self, event: &SelectionEvent) {
            self.events.borrow_mut().push(event.clone());
        }
    }

    fn with_recorder() -> (SelectionManager, Rc<RefCell<Vec<SelectionEvent>>>) {
        let mut sel = SelectionManager::new();
        let events = Rc::new(RefCell::new(Vec::new()));
        sel.add_observer(Box::new(Recorder {
            events: events.clone(),
        }));
        (sel, events)
    }

    #[test]
    fn refcounted_point_selection() {
        let (mut sel, events) = with_recorder();
        // Three overlapping constraint highlights grab the same vertex.
        sel.select_point(4);
        sel.select_point(4);
        sel.select_point(4);
        assert!(sel.is_point_selected(4));
        // Only one Selected event for the first reference.
        assert_eq!(
            events.borrow().as_slice(),
            &[SelectionEvent::Selected("Vertex5".into())]
        );

        sel.deselect_point(4);
        sel.deselect_point(4);
        assert!(sel.is_point_selected(4), "still one reference left");
        sel.deselect_point(4);
        assert!(!sel.is_point_selected(4));
        assert_eq!(
            events.borrow().last(),
            Some(&SelectionEvent::Deselected("Vertex5".into()))
        );
    }

    #[test]
    fn axes_select_under_sentinel_ids() {
        let (mut sel, events) = with_recorder();
        sel.select_curve(GEOID_H_AXIS);
        sel.select_curve(GEOID_V_AXIS);
        assert!(sel.is_curve_selected(GEOID_H_AXIS));
        let names: Vec<String> = events
            .borrow()
            .iter()
            .map(|e| match e {
                SelectionEvent::Selected(n) => n.clone(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(names, vec!["H_Axis".to_string(), "V_Axis".to_string()]);
    }

    #[test]
    fn root_point_event_name() {
        let (mut sel, events) = with_recorder();
        sel.select_point(ROOT_POINT_VERTEX);
        assert_eq!(
            events.borrow().as_slice(),
            &[SelectionEvent::Selected("RootPoint".into())]
        );
    }

    #[test]
    fn toggle_cycles_state() {
        let (mut sel, _) = with_recorder();
        assert!(sel.toggle_curve(2));
        assert!(sel.is_curve_selected(2));
        assert!(!sel.toggle_curve(2));
        assert!(!sel.is_curve_selected(2));
    }

    #[test]
    fn preselect_slots_are_single_valued() {
        let (mut sel, events) = with_recorder();
        sel.set_preselect_point(1);
        sel.set_preselect_curve(0);
        assert_eq!(sel.preselect_point(), None);
        assert_eq!(sel.preselect_curve(), Some(0));
        let recorded = events.borrow();
        assert!(recorded.contains(&SelectionEvent::Preselected("Vertex2".into())));
        assert!(recorded.contains(&SelectionEvent::PreselectCleared));
        assert!(recorded.contains(&SelectionEvent::Preselected("Edge1".into())));
    }

    #[test]
    fn constraint_selection_uses_display_name() {
        use sketchkit_core::constraint::{Constraint, ConstraintKind};
        use sketchkit_core::geometry::{GeometryElement, GeometryKind, LineSeg, Point2d};
        use sketchkit_core::id::GeoPointRef;

        let mut model = GeometryModel::new();
        model.add_geometry(GeometryElement::new(GeometryKind::LineSegment(
            LineSeg::new(Point2d::new(0.0, 0.0), Point2d::new(1.0, 0.0)),
        )));
        model.add_constraint(Constraint::new(ConstraintKind::Horizontal {
            first: GeoPointRef::edge(0),
            second: None,
        }));
        model.add_constraint(Constraint::named(
            ConstraintKind::Distance {
                a: GeoPointRef::edge(0),
                b: None,
                value: 1.0,
            },
            "Width",
        ));

        let (mut sel, events) = with_recorder();
        sel.select_constraint(0, &model);
        sel.select_constraint(1, &model);
        let recorded = events.borrow();
        assert!(recorded.contains(&SelectionEvent::Selected("Constraint1".into())));
        assert!(recorded.contains(&SelectionEvent::Selected("ConstraintWidth".into())));
    }

    #[test]
    fn clear_all_broadcasts_each_entry() {
        let model = GeometryModel::new();
        let (mut sel, events) = with_recorder();
        sel.select_point(0);
        sel.select_curve(1);
        events.borrow_mut().clear();

        sel.clear_all(&model);
        let recorded = events.borrow();
        assert!(recorded.contains(&SelectionEvent::Deselected("Vertex1".into())));
        assert!(recorded.contains(&SelectionEvent::Deselected("Edge2".into())));
        drop(recorded);
        assert!(sel.is_empty());
    }
}
