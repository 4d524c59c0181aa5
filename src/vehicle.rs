pub use self::driver::{AccelerationPartials, DriverParams, IntelligentDriver, Leader};
use crate::error::{ensure_non_negative, ensure_positive, SimResult};
use crate::{LaneId, VehicleId};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

mod driver;

pub(crate) use self::driver::is_safe_gap;

/// A simulated vehicle.
#[derive(Clone, Debug)]
pub struct Vehicle {
    /// The vehicle's ID
    pub(crate) id: VehicleId,
    /// A free-form name, used in logs and by renderers.
    label: String,
    /// The lane the vehicle is currently on.
    lane: LaneId,
    /// The vehicle's length in m.
    length: f64,
    /// The smallest gap to either new neighbour that allows a lane change, in m.
    lc_safety_dist: f64,
    /// The driver model.
    driver: IntelligentDriver,
    /// The longitudinal position of the rear of the vehicle along its lane, in m.
    pos: f64,
    /// The velocity in m/s.
    vel: f64,
    /// Cached neighbour pointers.
    neighbours: Neighbours,
}

/// The attributes of a simulated vehicle.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct VehicleAttributes {
    /// The vehicle length in m.
    pub length: f64,
    /// The smallest gap to either new neighbour that allows a lane change, in m.
    pub lane_change_safety_distance: f64,
    /// The parameters of the driver model.
    pub driver: DriverParams,
    /// A free-form name for the vehicle.
    pub label: String,
}

impl Default for VehicleAttributes {
    fn default() -> Self {
        Self {
            length: 4.0,
            lane_change_safety_distance: 10.0,
            driver: DriverParams::default(),
            label: String::new(),
        }
    }
}

/// The vehicles next to a vehicle, in its own lane and in the adjacent lanes.
///
/// These are caches: they are refreshed after every lane change pass and
/// may refer to vehicles which have since left the road.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Neighbours {
    /// The vehicle ahead in the same lane.
    pub predecessor: Option<VehicleId>,
    /// The vehicle behind in the same lane.
    pub successor: Option<VehicleId>,
    /// The nearest vehicle ahead in the lane to the left.
    pub predecessor_left: Option<VehicleId>,
    /// The nearest vehicle behind in the lane to the left.
    pub successor_left: Option<VehicleId>,
    /// The nearest vehicle ahead in the lane to the right.
    pub predecessor_right: Option<VehicleId>,
    /// The nearest vehicle behind in the lane to the right.
    pub successor_right: Option<VehicleId>,
}

/// One of the two lanes next to a vehicle's own.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Side {
    Left,
    Right,
}

impl Vehicle {
    /// Creates a new vehicle.
    pub(crate) fn new(id: VehicleId, attributes: &VehicleAttributes, lane: LaneId) -> SimResult<Self> {
        ensure_positive("length", attributes.length)?;
        ensure_non_negative(
            "lane_change_safety_distance",
            attributes.lane_change_safety_distance,
        )?;
        Ok(Self {
            id,
            label: attributes.label.clone(),
            lane,
            length: attributes.length,
            lc_safety_dist: attributes.lane_change_safety_distance,
            driver: IntelligentDriver::new(attributes.driver)?,
            pos: 0.0,
            vel: 0.0,
            neighbours: Neighbours::default(),
        })
    }

    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// The vehicle's label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The ID of the lane the vehicle is currently travelling on.
    pub fn lane_id(&self) -> LaneId {
        self.lane
    }

    /// The vehicle's length in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// The longitudinal position of the rear of the vehicle in m.
    pub fn position(&self) -> f64 {
        self.pos
    }

    /// The longitudinal position of the front of the vehicle in m.
    /// On a circular road this may exceed the lane length.
    pub fn pos_front(&self) -> f64 {
        self.pos + self.length
    }

    /// The vehicle's velocity in m/s.
    pub fn velocity(&self) -> f64 {
        self.vel
    }

    /// Whether the vehicle is stopped.
    pub fn has_stopped(&self) -> bool {
        self.vel < 0.1
    }

    /// The smallest gap to either new neighbour that allows a lane change, in m.
    pub fn lane_change_safety_distance(&self) -> f64 {
        self.lc_safety_dist
    }

    /// The vehicle's driver model.
    pub fn driver(&self) -> &IntelligentDriver {
        &self.driver
    }

    /// The cached neighbour pointers, as of the end of the last step.
    pub fn neighbours(&self) -> &Neighbours {
        &self.neighbours
    }

    /// The acceleration the driver wants given the vehicle ahead.
    pub fn desired_acceleration(&self, leader: Option<Leader>) -> f64 {
        self.driver.acceleration(self.vel, leader)
    }

    /// Set the desired velocity adjustment factor for the vehicle.
    pub(crate) fn set_velocity_adjust(&mut self, factor: f64) {
        self.driver.set_velocity_adjust(factor);
    }

    /// Sets the vehicle's position and velocity.
    pub(crate) fn set_state(&mut self, pos: f64, vel: f64) {
        self.pos = pos;
        self.vel = vel;
    }

    /// Moves the vehicle to another lane, keeping its position.
    pub(crate) fn set_lane(&mut self, lane: LaneId) {
        self.lane = lane;
    }

    pub(crate) fn neighbours_mut(&mut self) -> &mut Neighbours {
        &mut self.neighbours
    }
}

impl Neighbours {
    /// The cached (predecessor, successor) pair in the lane on the given side.
    pub(crate) fn adjacent(&self, side: Side) -> (Option<VehicleId>, Option<VehicleId>) {
        match side {
            Side::Left => (self.predecessor_left, self.successor_left),
            Side::Right => (self.predecessor_right, self.successor_right),
        }
    }

    /// Sets the (predecessor, successor) pair in the lane on the given side.
    pub(crate) fn set_adjacent(&mut self, side: Side, pair: (Option<VehicleId>, Option<VehicleId>)) {
        match side {
            Side::Left => (self.predecessor_left, self.successor_left) = pair,
            Side::Right => (self.predecessor_right, self.successor_right) = pair,
        }
    }
}
