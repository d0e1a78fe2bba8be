//! Min/max node-group size annotations
//!
//! Scaling bounds are declared on the scalable resource itself through two
//! well-known annotations. Either side may be absent independently, meaning
//! "unbounded" for that side. Malformed values fail wrapper construction
//! rather than being clamped, so a typo in an annotation surfaces as an
//! error instead of silently scaling a group to the wrong range.

use crate::error::Error;
use crate::object::GenericObject;
use crate::Result;

/// Annotation carrying the declared minimum node-group size
pub const NODE_GROUP_MIN_SIZE_ANNOTATION: &str =
    "cluster.x-k8s.io/cluster-api-autoscaler-node-group-min-size";

/// Annotation carrying the declared maximum node-group size
pub const NODE_GROUP_MAX_SIZE_ANNOTATION: &str =
    "cluster.x-k8s.io/cluster-api-autoscaler-node-group-max-size";

/// Sentinel returned by [`ScalingBounds::max_size`] when no ceiling is declared
pub const UNBOUNDED_MAX_SIZE: i32 = i32::MAX;

/// Declared scaling bounds for one node group.
///
/// `None` on either side means that side is unbounded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScalingBounds {
    min: Option<i32>,
    max: Option<i32>,
}

impl ScalingBounds {
    /// Parse bounds from the object's annotations.
    ///
    /// Fails on non-integer values, a negative bound, or min > max.
    pub fn from_annotations(object: &GenericObject) -> Result<ScalingBounds> {
        let min = parse_bound(object, NODE_GROUP_MIN_SIZE_ANNOTATION)?;
        let max = parse_bound(object, NODE_GROUP_MAX_SIZE_ANNOTATION)?;

        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                return Err(Error::validation(format!(
                    "node group size annotations on {}: min {} exceeds max {}",
                    object.name().unwrap_or("<unnamed>"),
                    min,
                    max
                )));
            }
        }

        Ok(ScalingBounds { min, max })
    }

    /// Declared floor, or 0 when none is declared
    pub fn min_size(&self) -> i32 {
        self.min.unwrap_or(0)
    }

    /// Declared ceiling, or [`UNBOUNDED_MAX_SIZE`] when none is declared
    pub fn max_size(&self) -> i32 {
        self.max.unwrap_or(UNBOUNDED_MAX_SIZE)
    }

    /// Whether the object opted into autoscaling by declaring any bound
    pub fn declared(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }
}

fn parse_bound(object: &GenericObject, key: &str) -> Result<Option<i32>> {
    let Some(raw) = object.annotation(key) else {
        return Ok(None);
    };

    let value: i32 = raw.parse().map_err(|_| {
        Error::validation(format!(
            "annotation {} on {}: {:?} is not a base-10 integer",
            key,
            object.name().unwrap_or("<unnamed>"),
            raw
        ))
    })?;

    if value < 0 {
        return Err(Error::validation(format!(
            "annotation {} on {}: size must not be negative, got {}",
            key,
            object.name().unwrap_or("<unnamed>"),
            value
        )));
    }

    Ok(Some(value))
}
