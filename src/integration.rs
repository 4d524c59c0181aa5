//! The car-following model as a system of ordinary differential equations.
//!
//! The state vector holds all positions followed by all velocities:
//! `[x_0 .. x_{n-1}, v_0 .. v_{n-1}]`, with vehicles ordered lane by lane
//! (right to left) and in each lane's sequence order. The leader of each
//! vehicle is fixed for the duration of a step, so the right-hand side can
//! be evaluated at any intermediate state a multi-stage scheme asks for.

use crate::geometry::RoadShape;
use crate::lane_change::change_lanes;
use crate::scheme::{OdeSystem, State, SteppingScheme};
use crate::util::cyclic_next;
use crate::vehicle::{IntelligentDriver, Leader};
use crate::{Road, SimError, SimResult, VehicleId};
use log::debug;
use nalgebra::DMatrix;

/// The right-hand side of the car-following ODE for a road.
pub struct CarFollowingSystem<'a> {
    shape: RoadShape,
    /// The vehicles in state vector order.
    order: Vec<VehicleId>,
    /// Per vehicle, in state vector order.
    entries: Vec<Entry<'a>>,
}

struct Entry<'a> {
    driver: &'a IntelligentDriver,
    length: f64,
    full_length: f64,
    /// The state vector index of the vehicle ahead.
    leader: Option<usize>,
}

impl<'a> CarFollowingSystem<'a> {
    /// Captures the current vehicle order and leader relations of a road.
    pub fn new(road: &'a Road) -> Self {
        let shape = road.shape();
        let order = road.vehicle_order();
        let mut entries = Vec::with_capacity(order.len());
        let mut offset = 0;
        for lane in road.iter_lanes() {
            let ids = lane.vehicles();
            for (idx, id) in ids.iter().enumerate() {
                let vehicle = &road.vehicles[*id];
                let leader = lane.nearby_vehicles(idx, shape).0.map(|_| {
                    if shape.is_circular() {
                        offset + cyclic_next(idx, ids.len())
                    } else {
                        offset + idx + 1
                    }
                });
                entries.push(Entry {
                    driver: vehicle.driver(),
                    length: vehicle.length(),
                    full_length: lane.full_length(),
                    leader,
                });
            }
            offset += ids.len();
        }
        Self {
            shape,
            order,
            entries,
        }
    }

    /// The number of vehicles in the system.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the system has no vehicles.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The vehicles, in state vector order.
    pub fn order(&self) -> &[VehicleId] {
        &self.order
    }

    /// Builds the state vector from the road's current positions and velocities.
    pub fn state(&self, road: &Road) -> State {
        let n = self.len();
        let mut y = State::zeros(2 * n);
        for (i, id) in self.order.iter().enumerate() {
            let vehicle = &road.vehicles[*id];
            y[i] = vehicle.position();
            y[n + i] = vehicle.velocity();
        }
        y
    }

    /// The leader of vehicle `i`, as seen in state `y`.
    fn leader(&self, i: usize, y: &State) -> Option<Leader> {
        let n = self.len();
        let entry = &self.entries[i];
        entry.leader.map(|j| Leader {
            gap: self.shape.distance(y[j], y[i], entry.full_length) - entry.length,
            velocity: y[n + j],
        })
    }
}

impl OdeSystem for CarFollowingSystem<'_> {
    fn rhs(&self, _t: f64, y: &State) -> State {
        let n = self.len();
        let mut dy = State::zeros(2 * n);
        for (i, entry) in self.entries.iter().enumerate() {
            dy[i] = y[n + i];
            dy[n + i] = entry.driver.acceleration(y[n + i], self.leader(i, y));
        }
        dy
    }

    fn jacobian(&self, _t: f64, y: &State) -> DMatrix<f64> {
        let n = self.len();
        let mut jacobian = DMatrix::zeros(2 * n, 2 * n);
        for (i, entry) in self.entries.iter().enumerate() {
            jacobian[(i, n + i)] = 1.0;

            let leader = self.leader(i, y);
            let partials = entry.driver.acceleration_partials(y[n + i], leader);
            jacobian[(n + i, n + i)] = partials.d_velocity;
            if let Some(j) = entry.leader {
                // gap = x_j - x_i - length
                jacobian[(n + i, i)] -= partials.d_gap;
                jacobian[(n + i, j)] += partials.d_gap;
                jacobian[(n + i, n + j)] += partials.d_leader_velocity;
            }
        }
        jacobian
    }
}

/// Advances the road by one time step.
///
/// Integrates all positions and velocities with `scheme`, clamps negative
/// velocities to zero, wraps positions onto the road (removing vehicles that
/// leave it), and finally performs a lane change pass. If the scheme fails the
/// road is left untouched.
pub(crate) fn advance<S: SteppingScheme + ?Sized>(road: &mut Road, scheme: &S, t: f64, dt: f64) -> SimResult<()> {
    let (order, y_new) = {
        let system = CarFollowingSystem::new(road);
        let y_old = system.state(road);
        let y_new = scheme.apply(&system, t, dt, &y_old)?;
        if y_new.len() != y_old.len() {
            return Err(SimError::StateLengthMismatch {
                expected: y_old.len(),
                got: y_new.len(),
                what: "integrated state",
            });
        }
        (system.order, y_new)
    };

    let removed = road.apply_state(&order, &y_new);
    let moves = change_lanes(road);
    if !removed.is_empty() || moves > 0 {
        debug!(
            "t = {:.2}: {} vehicles left the road, {} lane changes",
            t + dt,
            removed.len(),
            moves
        );
    }
    Ok(())
}
