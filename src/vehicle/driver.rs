use crate::error::{ensure_non_negative, ensure_positive, SimResult};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The gap below which the interaction term no longer grows, in m.
///
/// Keeps the acceleration finite when two vehicles touch or overlap.
pub(crate) const GAP_FLOOR: f64 = 1e-3; // m

/// The parameters of the intelligent driver model.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DriverParams {
    /// The minimum gap kept to the vehicle ahead when stopped, in m (`s0`).
    pub min_gap: f64,
    /// The speed the driver wants to travel at on a free road, in m/s (`v0`).
    pub desired_speed: f64,
    /// How sharply the free-road acceleration falls off near `v0` (`delta`).
    pub acceleration_exponent: f64,
    /// The desired time gap to the vehicle ahead, in s (`T`).
    pub time_headway: f64,
    /// The maximum acceleration, in m/s<sup>2</sup> (`a`).
    pub max_acceleration: f64,
    /// The comfortable deceleration, a positive number in m/s<sup>2</sup> (`b`).
    pub comfort_deceleration: f64,
}

impl Default for DriverParams {
    fn default() -> Self {
        Self {
            min_gap: 7.0,
            desired_speed: 26.0,
            acceleration_exponent: 4.0,
            time_headway: 1.0,
            max_acceleration: 1.0,
            comfort_deceleration: 1.5,
        }
    }
}

impl DriverParams {
    /// A slow heavy vehicle.
    pub fn truck() -> Self {
        Self {
            desired_speed: 10.0,
            ..Default::default()
        }
    }
}

/// The vehicle ahead, as seen by a driver.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Leader {
    /// The free gap between the driver's front bumper and the leader's rear, in m.
    pub gap: f64,
    /// The leader's velocity in m/s.
    pub velocity: f64,
}

/// The partial derivatives of a driver's acceleration.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AccelerationPartials {
    /// With respect to the driver's own velocity.
    pub d_velocity: f64,
    /// With respect to the gap to the leader.
    pub d_gap: f64,
    /// With respect to the leader's velocity.
    pub d_leader_velocity: f64,
}

/// A driver following the intelligent driver model.
#[derive(Clone, Debug)]
pub struct IntelligentDriver {
    params: DriverParams,
    /// `1 / (2 * sqrt(a * b))`
    braking_factor: f64,
    /// Multiplier applied to the desired speed.
    vel_adj: f64,
}

impl IntelligentDriver {
    /// Creates a new driver, rejecting non-physical parameters.
    pub fn new(params: DriverParams) -> SimResult<Self> {
        ensure_non_negative("min_gap", params.min_gap)?;
        ensure_positive("desired_speed", params.desired_speed)?;
        ensure_positive("acceleration_exponent", params.acceleration_exponent)?;
        ensure_non_negative("time_headway", params.time_headway)?;
        ensure_positive("max_acceleration", params.max_acceleration)?;
        ensure_positive("comfort_deceleration", params.comfort_deceleration)?;

        let ab = params.max_acceleration * params.comfort_deceleration;
        Ok(Self {
            params,
            braking_factor: 1.0 / (2.0 * ab.sqrt()),
            vel_adj: 1.0,
        })
    }

    /// The driver's model parameters.
    pub fn params(&self) -> &DriverParams {
        &self.params
    }

    /// The desired speed in m/s, including any velocity adjustment.
    pub fn desired_speed(&self) -> f64 {
        self.vel_adj * self.params.desired_speed
    }

    /// Set the desired velocity adjustment factor, a scalar which is
    /// multiplied with the configured desired speed.
    pub(crate) fn set_velocity_adjust(&mut self, factor: f64) {
        self.vel_adj = factor;
    }

    /// The gap the driver aims to keep at velocity `vel` while closing in
    /// on the vehicle ahead at `approach` m/s.
    pub fn desired_gap(&self, vel: f64, approach: f64) -> f64 {
        self.params.min_gap + f64::max(0.0, self.dynamic_gap(vel, approach))
    }

    /// The acceleration the driver would choose on an empty road.
    pub fn free_acceleration(&self, vel: f64) -> f64 {
        self.params.max_acceleration * (1.0 - self.speed_ratio(vel))
    }

    /// Computes the desired acceleration of the driver.
    ///
    /// # Arguments
    /// * `vel` - The velocity of the simulated vehicle (m/s).
    /// * `leader` - The vehicle ahead, or `None` if the lane is otherwise empty.
    pub fn acceleration(&self, vel: f64, leader: Option<Leader>) -> f64 {
        let leader = match leader {
            Some(leader) => leader,
            None => return self.free_acceleration(vel),
        };
        let gap = f64::max(leader.gap, GAP_FLOOR);
        let term = self.desired_gap(vel, vel - leader.velocity) / gap;
        self.params.max_acceleration * (1.0 - self.speed_ratio(vel) - term * term)
    }

    /// Computes the partial derivatives of [Self::acceleration].
    pub fn acceleration_partials(&self, vel: f64, leader: Option<Leader>) -> AccelerationPartials {
        let a = self.params.max_acceleration;
        let delta = self.params.acceleration_exponent;
        let v0 = self.desired_speed();
        let d_free = if vel > 0.0 {
            delta * vel.powf(delta - 1.0) / v0.powf(delta)
        } else {
            0.0
        };

        let leader = match leader {
            Some(leader) => leader,
            None => {
                return AccelerationPartials {
                    d_velocity: -a * d_free,
                    ..Default::default()
                }
            }
        };

        let dynamic = self.dynamic_gap(vel, vel - leader.velocity);
        let desired_gap = self.params.min_gap + f64::max(0.0, dynamic);
        let (ds_dv, ds_dvl) = if dynamic > 0.0 {
            let k = self.braking_factor;
            (
                self.params.time_headway + (2.0 * vel - leader.velocity) * k,
                -vel * k,
            )
        } else {
            (0.0, 0.0)
        };

        let gap = f64::max(leader.gap, GAP_FLOOR);
        let ratio = desired_gap / gap;
        AccelerationPartials {
            d_velocity: a * (-d_free - 2.0 * ratio / gap * ds_dv),
            d_gap: if leader.gap > GAP_FLOOR {
                2.0 * a * ratio * ratio / gap
            } else {
                0.0
            },
            d_leader_velocity: -2.0 * a * ratio / gap * ds_dvl,
        }
    }

    /// Whether the driver is held up by the vehicle ahead and wants to pass it.
    ///
    /// This is the case when the leader is slower than the driver's desired
    /// speed and closer than `safety_distance`.
    pub fn wants_to_pass(&self, leader: Option<Leader>, safety_distance: f64) -> bool {
        leader.map_or(false, |leader| {
            leader.velocity < self.desired_speed() && leader.gap < safety_distance
        })
    }

    /// `(v / v0)^delta`, with the velocity clamped to be non-negative.
    fn speed_ratio(&self, vel: f64) -> f64 {
        (f64::max(vel, 0.0) / self.desired_speed()).powf(self.params.acceleration_exponent)
    }

    /// The velocity-dependent part of the desired gap, before clamping.
    fn dynamic_gap(&self, vel: f64, approach: f64) -> f64 {
        vel * self.params.time_headway + vel * approach * self.braking_factor
    }
}

/// Whether a gap to a neighbour is large enough to change lanes.
/// A missing neighbour is infinitely far away.
pub fn is_safe_gap(gap: Option<f64>, safety_distance: f64) -> bool {
    gap.map_or(true, |gap| gap >= safety_distance)
}
