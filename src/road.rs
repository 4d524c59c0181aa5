use crate::error::{ensure_non_negative, ensure_positive, SimError, SimResult};
use crate::geometry::RoadShape;
use crate::lane_change::refresh_neighbours;
use crate::scheme::State;
use crate::vehicle::Leader;
use crate::{Lane, LaneAttributes, LaneId, LaneSet, Vehicle, VehicleAttributes, VehicleId, VehicleSet};
use log::debug;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use smallvec::SmallVec;

/// A road made up of parallel lanes, together with the vehicles on them.
pub struct Road {
    /// The shape of the road.
    pub(crate) shape: RoadShape,
    /// The lanes of the road.
    pub(crate) lanes: LaneSet,
    /// The lane IDs, ordered from the rightmost lane to the leftmost.
    pub(crate) lane_order: Vec<LaneId>,
    /// The vehicles on the road.
    pub(crate) vehicles: VehicleSet,
    /// Whether every vehicle has been placed.
    initialized: bool,
}

impl Road {
    /// Creates an empty road of the given shape.
    pub fn new(shape: RoadShape) -> SimResult<Self> {
        if let RoadShape::Circular { circumference } = shape {
            ensure_positive("circumference", circumference)?;
        }
        Ok(Self {
            shape,
            lanes: LaneSet::default(),
            lane_order: vec![],
            vehicles: VehicleSet::default(),
            initialized: false,
        })
    }

    /// Creates an empty straight road.
    pub fn straight() -> Self {
        Self {
            shape: RoadShape::Straight,
            lanes: LaneSet::default(),
            lane_order: vec![],
            vehicles: VehicleSet::default(),
            initialized: false,
        }
    }

    /// Creates an empty circular road with the given circumference in m.
    pub fn circular(circumference: f64) -> SimResult<Self> {
        Self::new(RoadShape::Circular { circumference })
    }

    /// The shape of the road.
    pub fn shape(&self) -> RoadShape {
        self.shape
    }

    /// Whether every vehicle on the road has been placed.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Adds a lane to the left of the existing lanes.
    pub fn add_lane(&mut self, attributes: &LaneAttributes) -> SimResult<LaneId> {
        ensure_positive("full_length", attributes.full_length)?;
        if let RoadShape::Circular { circumference } = self.shape {
            let tolerance = 1e-9 * circumference;
            if (attributes.full_length - circumference).abs() > tolerance {
                return Err(SimError::LaneLengthMismatch {
                    expected: circumference,
                    got: attributes.full_length,
                });
            }
        }

        let lane_id = self.lanes.insert_with_key(|id| Lane::new(id, attributes));
        if let Some(&right) = self.lane_order.last() {
            self.lanes[right].set_left(lane_id);
            self.lanes[lane_id].set_right(right);
        }
        self.lane_order.push(lane_id);
        Ok(lane_id)
    }

    /// Adds a vehicle to the end of a lane's sequence.
    ///
    /// The vehicle is not placed until the road is initialized again.
    pub fn add_vehicle(&mut self, attributes: &VehicleAttributes, lane_id: LaneId) -> SimResult<VehicleId> {
        let lane = self
            .lanes
            .get_mut(lane_id)
            .ok_or(SimError::UnknownLane(lane_id))?;
        let mut vehicle = Vehicle::new(VehicleId::default(), attributes, lane_id)?;
        let vehicle_id = self.vehicles.insert_with_key(|id| {
            vehicle.id = id;
            vehicle
        });
        lane.push_vehicle(vehicle_id);
        lane.set_initialized(false);
        self.initialized = false;
        Ok(vehicle_id)
    }

    /// Removes a vehicle from the road.
    pub fn remove_vehicle(&mut self, id: VehicleId) -> Option<Vehicle> {
        let vehicle = self.take_vehicle(id);
        if vehicle.is_some() {
            refresh_neighbours(self);
        }
        vehicle
    }

    /// Places the vehicles on each lane equidistantly, at rest.
    pub fn initialize_default(&mut self) {
        self.place_evenly(0.0);
    }

    /// Places the vehicles on each lane equidistantly, all travelling at `velocity`.
    pub fn initialize_uniformly(&mut self, velocity: f64) -> SimResult<()> {
        ensure_non_negative("velocity", velocity)?;
        self.place_evenly(velocity);
        Ok(())
    }

    /// Places the vehicles of one lane at the given positions and velocities,
    /// listed in the lane's current vehicle order.
    ///
    /// The lane is re-sorted by position afterwards. The road counts as
    /// initialized once every lane holding vehicles has been placed.
    pub fn initialize_lane(&mut self, lane_id: LaneId, positions: &[f64], velocities: &[f64]) -> SimResult<()> {
        let lane = self
            .lanes
            .get_mut(lane_id)
            .ok_or(SimError::UnknownLane(lane_id))?;
        let count = lane.vehicles().len();
        for (what, got) in [("positions", positions.len()), ("velocities", velocities.len())] {
            if got != count {
                return Err(SimError::StateLengthMismatch {
                    expected: count,
                    got,
                    what,
                });
            }
        }

        // Validate everything before touching any vehicle
        let full_length = lane.full_length();
        let mut states = Vec::with_capacity(count);
        for (&raw, &vel) in positions.iter().zip(velocities) {
            ensure_non_negative("velocity", vel)?;
            let pos = self
                .shape
                .position(raw, full_length)
                .ok_or(SimError::InvalidParameter {
                    name: "position",
                    value: raw,
                })?;
            states.push((pos, vel));
        }

        for (id, (pos, vel)) in lane.vehicles().iter().zip(states) {
            self.vehicles[*id].set_state(pos, vel);
        }
        lane.sort_by_position(&self.vehicles);
        lane.set_initialized(true);

        self.initialized = self.lanes.values().all(Lane::is_initialized);
        refresh_neighbours(self);
        debug!("initialized lane {:?} with {} vehicles", lane_id, count);
        Ok(())
    }

    /// Randomly scales each driver's desired speed by a factor which is sampled
    /// from a normal distribution with a mean of 1 (no adjustment)
    /// and standard deviation of `stddev`.
    pub fn randomise_desired_speeds<R: Rng + ?Sized>(&mut self, rng: &mut R, stddev: f64) -> SimResult<()> {
        ensure_non_negative("stddev", stddev)?;
        let distr = Normal::new(1.0, stddev).map_err(|_| SimError::InvalidParameter {
            name: "stddev",
            value: stddev,
        })?;
        for vehicle in self.vehicles.values_mut() {
            let factor = distr.sample(rng).clamp(0.75, 1.25);
            vehicle.set_velocity_adjust(factor);
        }
        Ok(())
    }

    /// The lane IDs, ordered from the rightmost lane to the leftmost.
    pub fn lane_ids(&self) -> &[LaneId] {
        &self.lane_order
    }

    /// Returns an iterator over the lanes, from right to left.
    pub fn iter_lanes(&self) -> impl Iterator<Item = &Lane> {
        self.lane_order.iter().map(move |id| &self.lanes[*id])
    }

    /// Returns an iterator over all the vehicles on the road,
    /// lane by lane and in each lane's sequence order.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.iter_lanes()
            .flat_map(|lane| lane.vehicles())
            .map(move |id| &self.vehicles[*id])
    }

    /// Gets a reference to the lane with the given ID.
    pub fn lane(&self, lane_id: LaneId) -> Option<&Lane> {
        self.lanes.get(lane_id)
    }

    /// Gets a reference to the vehicle with the given ID,
    /// or `None` if it has left the road.
    pub fn vehicle(&self, vehicle_id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(vehicle_id)
    }

    /// The number of vehicles on the road.
    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    /// The forward distance from `behind` to `ahead`, measured along the lane of `behind`.
    ///
    /// If either vehicle is missing, the lane length of the other stands in
    /// as an effectively infinite distance. If both are missing the result
    /// is infinite.
    pub fn distance(&self, ahead: Option<VehicleId>, behind: Option<VehicleId>) -> f64 {
        let ahead = ahead.and_then(|id| self.vehicles.get(id));
        let behind = behind.and_then(|id| self.vehicles.get(id));
        match (ahead, behind) {
            (Some(ahead), Some(behind)) => {
                let full_length = self.lanes[behind.lane_id()].full_length();
                self.shape
                    .distance(ahead.position(), behind.position(), full_length)
            }
            (Some(vehicle), None) | (None, Some(vehicle)) => {
                self.lanes[vehicle.lane_id()].full_length()
            }
            (None, None) => f64::INFINITY,
        }
    }

    /// The vehicle ahead of the given one in its lane, read from the lane's sequence.
    pub fn predecessor(&self, id: VehicleId) -> Option<VehicleId> {
        let vehicle = self.vehicles.get(id)?;
        let lane = &self.lanes[vehicle.lane_id()];
        let idx = lane.index_of(id)?;
        lane.nearby_vehicles(idx, self.shape).0
    }

    /// The vehicle ahead as seen by the given vehicle's driver.
    pub fn leader(&self, id: VehicleId) -> Option<Leader> {
        let vehicle = self.vehicles.get(id)?;
        let pred = self.predecessor(id)?;
        Some(Leader {
            gap: self.distance(Some(pred), Some(id)) - vehicle.length(),
            velocity: self.vehicles[pred].velocity(),
        })
    }

    /// The acceleration the vehicle's driver currently wants.
    pub fn desired_acceleration(&self, id: VehicleId) -> Option<f64> {
        let vehicle = self.vehicles.get(id)?;
        Some(vehicle.desired_acceleration(self.leader(id)))
    }

    /// The vehicle IDs flattened lane by lane, in each lane's sequence order.
    /// This is the layout of the integration state vector.
    pub(crate) fn vehicle_order(&self) -> Vec<VehicleId> {
        self.iter_lanes()
            .flat_map(|lane| lane.vehicles().iter().copied())
            .collect()
    }

    /// Writes an integrated state vector back onto the vehicles.
    ///
    /// Negative velocities are clamped to zero. Vehicles whose new position
    /// is off the end of the road are removed; their IDs are returned.
    pub(crate) fn apply_state(&mut self, order: &[VehicleId], state: &State) -> SmallVec<[VehicleId; 4]> {
        let count = order.len();
        let mut removed = SmallVec::new();
        for (i, id) in order.iter().enumerate() {
            let vehicle = &mut self.vehicles[*id];
            let full_length = self.lanes[vehicle.lane_id()].full_length();
            let vel = f64::max(state[count + i], 0.0);
            match self.shape.position(state[i], full_length) {
                Some(pos) => vehicle.set_state(pos, vel),
                None => removed.push(*id),
            }
        }
        for id in &removed {
            debug!("vehicle {:?} drove off the end of the road", id);
            self.take_vehicle(*id);
        }
        removed
    }

    /// Removes a vehicle without refreshing anyone's neighbour pointers.
    fn take_vehicle(&mut self, id: VehicleId) -> Option<Vehicle> {
        let vehicle = self.vehicles.remove(id)?;
        if let Some(lane) = self.lanes.get_mut(vehicle.lane_id()) {
            lane.remove_vehicle(id);
        }
        Some(vehicle)
    }

    fn place_evenly(&mut self, velocity: f64) {
        for lane_id in &self.lane_order {
            let lane = &mut self.lanes[*lane_id];
            let spacing = lane.full_length() / lane.vehicles().len().max(1) as f64;
            for (i, id) in lane.vehicles().iter().enumerate() {
                self.vehicles[*id].set_state(i as f64 * spacing, velocity);
            }
            lane.set_initialized(true);
        }
        self.initialized = true;
        refresh_neighbours(self);
        debug!(
            "placed {} vehicles on {} lanes",
            self.vehicles.len(),
            self.lane_order.len()
        );
    }
}
