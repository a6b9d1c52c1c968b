//! # SketchKit Core
//!
//! Geometry model, constraints, and shared vocabulary for SketchKit.
//! Provides the source-of-truth sketch model consumed by the solver facade
//! and the interactive editor.

pub mod config;
pub mod constraint;
pub mod error;
pub mod geometry;
pub mod id;
pub mod model;

pub use config::{Color, PreferenceStore, RenderConfig, SketchPalette};
pub use constraint::{AlignmentRole, Constraint, ConstraintKind};
pub use error::{Error, ModelError, ProjectionError, Result, SubElementError};
pub use geometry::{
    BSpline, CircArc, Circle, Ellipse, EllipseArc, GeometryElement, GeometryKind, HyperbolaArc,
    InternalAlignment, LineSeg, ParabolaArc, Point2d,
};
pub use id::{
    external_geo_id, external_index, is_external, GeoId, GeoPointRef, PointPos, SubElement,
    GEOID_H_AXIS, GEOID_REF_EXT, GEOID_V_AXIS, ROOT_POINT_VERTEX,
};
pub use model::GeometryModel;
