//! Geometry identifiers and the sub-element naming scheme.
//!
//! A sketch addresses geometry by a stable integer `GeoId`. Non-negative
//! ids are normal (internal) geometry; negative ids are reserved:
//!
//! - `-1`: the horizontal sketch axis
//! - `-2`: the vertical sketch axis
//! - `-3` and below: external reference geometry, counting down, so the
//!   1-based external edge `n` maps to `GeoId = -(n + 2)`.
//!
//! The textual sub-element scheme (`Edge3`, `ExternalEdge1`, `Vertex7`,
//! `RootPoint`, `H_Axis`, `V_Axis`, `Constraint2`) is what the surrounding
//! document/selection system speaks; it is load-bearing and round-trips
//! exactly through [`SubElement`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SubElementError;

/// Stable geometry identifier within one sketch.
pub type GeoId = i32;

/// GeoId of the horizontal sketch axis.
pub const GEOID_H_AXIS: GeoId = -1;
/// GeoId of the vertical sketch axis.
pub const GEOID_V_AXIS: GeoId = -2;
/// First external-geometry GeoId; external ids count down from here.
pub const GEOID_REF_EXT: GeoId = -3;

/// Logical vertex id of the root (origin) point. Always present at render
/// slot 0 of the vertex tables.
pub const ROOT_POINT_VERTEX: i32 = -1;

/// Returns true for external reference geometry ids.
pub fn is_external(geo_id: GeoId) -> bool {
    geo_id <= GEOID_REF_EXT
}

/// Zero-based index into the external geometry list, if `geo_id` is external.
pub fn external_index(geo_id: GeoId) -> Option<usize> {
    if is_external(geo_id) {
        Some((GEOID_REF_EXT - geo_id) as usize)
    } else {
        None
    }
}

/// GeoId for the zero-based external geometry index.
pub fn external_geo_id(index: usize) -> GeoId {
    GEOID_REF_EXT - index as GeoId
}

/// Which point of a geometry element a reference denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointPos {
    /// The element as a whole (an edge reference).
    None,
    /// Start point.
    Start,
    /// End point.
    End,
    /// Midpoint / center.
    Mid,
}

/// A (GeoId, PointPos) pair; the operand currency of constraints and the
/// vertex-index translation tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeoPointRef {
    pub geo_id: GeoId,
    pub pos: PointPos,
}

impl GeoPointRef {
    pub fn new(geo_id: GeoId, pos: PointPos) -> Self {
        Self { geo_id, pos }
    }

    /// An edge reference (no specific point).
    pub fn edge(geo_id: GeoId) -> Self {
        Self {
            geo_id,
            pos: PointPos::None,
        }
    }

    /// Whether this reference denotes a point rather than a whole edge.
    pub fn is_point(&self) -> bool {
        self.pos != PointPos::None
    }
}

/// A named sub-element of the sketch as the selection broadcaster sees it.
///
/// `Edge` carries a non-negative GeoId, `ExternalEdge` an id `<= -3`;
/// `Vertex` carries the zero-based logical vertex index. Formatting is
/// 1-based per the document system's convention.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubElement {
    Edge(GeoId),
    ExternalEdge(GeoId),
    Vertex(usize),
    RootPoint,
    HAxis,
    VAxis,
    /// Constraint addressed by user name or 1-based index rendered as text.
    Constraint(String),
}

impl SubElement {
    /// Sub-element for a constraint addressed by its zero-based index.
    pub fn constraint_index(index: usize) -> Self {
        SubElement::Constraint((index + 1).to_string())
    }

    /// Sub-element for an edge GeoId of either sign partition. Axis ids
    /// resolve to their named elements.
    pub fn for_edge(geo_id: GeoId) -> Self {
        match geo_id {
            GEOID_H_AXIS => SubElement::HAxis,
            GEOID_V_AXIS => SubElement::VAxis,
            g if is_external(g) => SubElement::ExternalEdge(g),
            g => SubElement::Edge(g),
        }
    }

    /// The GeoId this element maps to, when it denotes an edge or axis.
    pub fn geo_id(&self) -> Option<GeoId> {
        match self {
            SubElement::Edge(g) | SubElement::ExternalEdge(g) => Some(*g),
            SubElement::HAxis => Some(GEOID_H_AXIS),
            SubElement::VAxis => Some(GEOID_V_AXIS),
            _ => None,
        }
    }
}

impl fmt::Display for SubElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubElement::Edge(g) => write!(f, "Edge{}", g + 1),
            SubElement::ExternalEdge(g) => write!(f, "ExternalEdge{}", -g - 2),
            SubElement::Vertex(v) => write!(f, "Vertex{}", v + 1),
            SubElement::RootPoint => write!(f, "RootPoint"),
            SubElement::HAxis => write!(f, "H_Axis"),
            SubElement::VAxis => write!(f, "V_Axis"),
            SubElement::Constraint(name) => write!(f, "Constraint{}", name),
        }
    }
}

impl FromStr for SubElement {
    type Err = SubElementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        fn suffix_index(s: &str, prefix: &str) -> Result<usize, SubElementError> {
            let n: i64 = s[prefix.len()..]
                .parse()
                .map_err(|_| SubElementError::Unrecognized {
                    name: s.to_string(),
                })?;
            if n < 1 {
                return Err(SubElementError::IndexOutOfRange {
                    name: s.to_string(),
                });
            }
            Ok((n - 1) as usize)
        }

        match s {
            "RootPoint" => return Ok(SubElement::RootPoint),
            "H_Axis" => return Ok(SubElement::HAxis),
            "V_Axis" => return Ok(SubElement::VAxis),
            _ => {}
        }
        // Order matters: "ExternalEdge" also starts with "E" but not "Edge".
        if s.starts_with("ExternalEdge") {
            let n = suffix_index(s, "ExternalEdge")?;
            return Ok(SubElement::ExternalEdge(external_geo_id(n)));
        }
        if s.starts_with("Edge") {
            let n = suffix_index(s, "Edge")?;
            return Ok(SubElement::Edge(n as GeoId));
        }
        if s.starts_with("Vertex") {
            let n = suffix_index(s, "Vertex")?;
            return Ok(SubElement::Vertex(n));
        }
        if let Some(rest) = s.strip_prefix("Constraint") {
            if rest.is_empty() {
                return Err(SubElementError::Unrecognized {
                    name: s.to_string(),
                });
            }
            return Ok(SubElement::Constraint(rest.to_string()));
        }
        Err(SubElementError::Unrecognized {
            name: s.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_id_convention() {
        // 1-based external edge n <=> GeoId -(n+2)
        assert_eq!(external_geo_id(0), -3);
        assert_eq!(external_geo_id(4), -7);
        assert_eq!(external_index(-3), Some(0));
        assert_eq!(external_index(-7), Some(4));
        assert_eq!(external_index(-2), None);
    }

    #[test]
    fn subelement_display() {
        assert_eq!(SubElement::Edge(0).to_string(), "Edge1");
        assert_eq!(SubElement::ExternalEdge(-3).to_string(), "ExternalEdge1");
        assert_eq!(SubElement::Vertex(6).to_string(), "Vertex7");
        assert_eq!(SubElement::HAxis.to_string(), "H_Axis");
        assert_eq!(SubElement::constraint_index(1).to_string(), "Constraint2");
    }

    #[test]
    fn subelement_round_trip() {
        let elements = [
            SubElement::Edge(11),
            SubElement::ExternalEdge(-5),
            SubElement::Vertex(0),
            SubElement::RootPoint,
            SubElement::HAxis,
            SubElement::VAxis,
            SubElement::Constraint("Width".to_string()),
            SubElement::constraint_index(3),
        ];
        for e in elements {
            let parsed: SubElement = e.to_string().parse().unwrap();
            assert_eq!(parsed, e);
        }
    }

    #[test]
    fn external_edge_name_round_trip() {
        // GeoId -(n+2) reports as ExternalEdge<n+1> and parses back.
        let geo_id = external_geo_id(3); // -6
        let name = SubElement::for_edge(geo_id).to_string();
        assert_eq!(name, "ExternalEdge4");
        let parsed: SubElement = name.parse().unwrap();
        assert_eq!(parsed.geo_id(), Some(geo_id));
    }

    #[test]
    fn bad_names_rejected() {
        assert!("Edge0".parse::<SubElement>().is_err());
        assert!("Face1".parse::<SubElement>().is_err());
        assert!("Vertex".parse::<SubElement>().is_err());
        assert!("Constraint".parse::<SubElement>().is_err());
    }
}
