//! Longitudinal geometry of a road.
//!
//! Every quantity here is measured along a single lane, in metres from the
//! lane's origin. A straight lane is the bounded interval `[0, length)`.
//! A circular lane identifies `length` with `0`, so "ahead" is only
//! meaningful relative to a reference point.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The shape of a road, which determines how positions and distances wrap.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RoadShape {
    /// A bounded road. Vehicles that drive past the end leave the road.
    Straight,
    /// A closed ring. Every lane has the same length as the circumference.
    Circular {
        /// The length of the ring in m.
        circumference: f64,
    },
}

impl RoadShape {
    /// Whether positions wrap around at the end of a lane.
    pub fn is_circular(&self) -> bool {
        matches!(self, RoadShape::Circular { .. })
    }

    /// The forward distance from `behind` to `ahead` on a lane of the given length.
    ///
    /// On a circular road the result lies in `[0, lane_length)` and is zero
    /// only when the two positions coincide. On a straight road it is the
    /// plain signed difference.
    pub fn distance(&self, ahead: f64, behind: f64, lane_length: f64) -> f64 {
        match self {
            RoadShape::Straight => ahead - behind,
            RoadShape::Circular { .. } => {
                let dist = (ahead - behind).rem_euclid(lane_length);
                if dist < lane_length {
                    dist
                } else {
                    // A tiny negative difference rounds up to the full length.
                    prev_float(lane_length)
                }
            }
        }
    }

    /// Maps a raw integrated position onto the lane.
    ///
    /// Returns `None` if the position is off the end of a straight lane
    /// (or is not a finite number), meaning the vehicle has left the road.
    pub fn position(&self, raw: f64, lane_length: f64) -> Option<f64> {
        if !raw.is_finite() {
            return None;
        }
        match self {
            RoadShape::Straight => (0.0..lane_length).contains(&raw).then_some(raw),
            RoadShape::Circular { .. } => {
                let pos = raw.rem_euclid(lane_length);
                Some(if pos < lane_length { pos } else { 0.0 })
            }
        }
    }

    /// Whether `second` lies between `first` and `third`, walking backwards from `first`.
    ///
    /// On a circular lane this is the only well-defined ordering: `second` is
    /// between the two if it is reached no later than `third` when moving
    /// against the direction of travel from `first`.
    pub fn between(&self, first: f64, second: f64, third: f64, lane_length: f64) -> bool {
        match self {
            RoadShape::Straight => first >= second && second >= third,
            RoadShape::Circular { .. } => {
                self.distance(first, second, lane_length) <= self.distance(first, third, lane_length)
            }
        }
    }

    /// Whether a vehicle at `predecessor` counts as ahead of one at `successor`.
    ///
    /// On a circular lane the forward gap must be less than half the lane length.
    pub fn in_front(&self, predecessor: f64, successor: f64, lane_length: f64) -> bool {
        match self {
            RoadShape::Straight => predecessor >= successor,
            RoadShape::Circular { .. } => {
                self.distance(predecessor, successor, lane_length) < 0.5 * lane_length
            }
        }
    }
}

/// The largest float strictly smaller than a positive, finite `x`.
fn prev_float(x: f64) -> f64 {
    f64::from_bits(x.to_bits() - 1)
}
