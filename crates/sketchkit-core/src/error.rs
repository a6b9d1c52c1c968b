//! Error handling for SketchKit
//!
//! Provides error types for the model and projection layers. Solver and
//! editor crates layer their own error enums on top of these.
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

use crate::id::{GeoId, PointPos};

/// Geometry model error type
///
/// Represents errors raised when resolving geometry or constraint
/// references against the current model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// GeoId outside the valid range `-external_count .. internal_count-1`
    #[error("Invalid GeoId {geo_id}")]
    InvalidGeoId {
        /// The offending geometry id.
        geo_id: GeoId,
    },

    /// The geometry exists but has no point at the requested position
    #[error("Geometry {geo_id} has no {pos:?} point")]
    InvalidPointPos {
        /// The geometry id.
        geo_id: GeoId,
        /// The requested point position.
        pos: PointPos,
    },

    /// A constraint operand points at geometry that no longer exists.
    /// Tolerated during redraw (skipped), fatal only when committing edits.
    #[error("Constraint {index} references missing geometry {geo_id}")]
    StaleConstraint {
        /// Index of the constraint in the model.
        index: usize,
        /// The dangling geometry id.
        geo_id: GeoId,
    },

    /// Structural precondition failed (e.g. an operation that needs two
    /// geometry elements was invoked on an emptier sketch).
    #[error("Degenerate model state: {reason}")]
    Degenerate {
        /// What was structurally missing.
        reason: String,
    },
}

/// Projection error type
///
/// Raised when mapping a screen ray onto the sketch plane.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    /// View direction is parallel to the sketch plane. Callers treat this
    /// as "no geometry under cursor", never as a crash.
    #[error("Zero division: view direction parallel to sketch plane")]
    ZeroDivision,
}

/// Sub-element name parsing error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubElementError {
    /// The name does not follow the `Edge<n>`/`Vertex<n>`/... scheme
    #[error("Unrecognized sub-element name: {name}")]
    Unrecognized {
        /// The string that failed to parse.
        name: String,
    },

    /// The numeric suffix was present but out of range (zero or overflow)
    #[error("Sub-element index out of range in: {name}")]
    IndexOutOfRange {
        /// The string that failed to parse.
        name: String,
    },
}

/// Main error type for SketchKit core
///
/// A unified error type used in public APIs of the core crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Model resolution error
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Sketch-plane projection error
    #[error(transparent)]
    Projection(#[from] ProjectionError),

    /// Sub-element name error
    #[error(transparent)]
    SubElement(#[from] SubElementError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this error is the tolerated stale-reference condition
    pub fn is_stale_reference(&self) -> bool {
        matches!(self, Error::Model(ModelError::StaleConstraint { .. }))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
