//! Sketch plane placement and screen-ray projection.
//!
//! The sketch lives on an arbitrarily placed plane in 3D document space.
//! Cursor hit-testing casts a view ray against that plane; a view direction
//! parallel to the plane has no intersection and surfaces as
//! [`ProjectionError::ZeroDivision`], which callers treat as "nothing under
//! the cursor".

use nalgebra::{Point3, Unit, UnitQuaternion, Vector3};

use sketchkit_core::error::ProjectionError;
use sketchkit_core::geometry::Point2d;

/// Intersections shallower than this are numerically meaningless.
const PARALLEL_EPS: f64 = 1e-10;

/// Placement of the sketch plane in document space.
#[derive(Debug, Clone)]
pub struct SketchPlane {
    origin: Point3<f64>,
    rotation: UnitQuaternion<f64>,
}

impl SketchPlane {
    /// The XY plane at the document origin.
    pub fn identity() -> Self {
        Self {
            origin: Point3::origin(),
            rotation: UnitQuaternion::identity(),
        }
    }

    pub fn new(origin: Point3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        Self { origin, rotation }
    }

    pub fn origin(&self) -> Point3<f64> {
        self.origin
    }

    /// Plane normal (sketch local +Z) in document space.
    pub fn normal(&self) -> Unit<Vector3<f64>> {
        Unit::new_unchecked(self.rotation * Vector3::z())
    }

    /// Lifts a sketch-space point into document space.
    pub fn to_document(&self, p: Point2d) -> Point3<f64> {
        self.origin + self.rotation * Vector3::new(p.x, p.y, 0.0)
    }

    /// Projects a document-space point onto the sketch plane, dropping the
    /// out-of-plane component.
    pub fn to_sketch(&self, p: Point3<f64>) -> Point2d {
        let local = self.rotation.inverse() * (p - self.origin);
        Point2d::new(local.x, local.y)
    }

    /// Intersects a ray with the sketch plane and returns sketch-space
    /// coordinates. Fails when the ray runs parallel to the plane.
    pub fn intersect_ray(
        &self,
        ray_origin: Point3<f64>,
        ray_dir: Vector3<f64>,
    ) -> Result<Point2d, ProjectionError> {
        let n = self.normal();
        let denom = n.dot(&ray_dir);
        if denom.abs() < PARALLEL_EPS {
            return Err(ProjectionError::ZeroDivision);
        }
        let t = n.dot(&(self.origin - ray_origin)) / denom;
        let hit = ray_origin + ray_dir * t;
        Ok(self.to_sketch(hit))
    }
}

impl Default for SketchPlane {
    fn default() -> Self {
        Self::identity()
    }
}
