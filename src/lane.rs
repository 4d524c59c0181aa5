use crate::geometry::RoadShape;
use crate::util::{cyclic_next, cyclic_prev, rotated_range};
use crate::{LaneId, VehicleId, VehicleSet};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single lane of traffic.
#[derive(Clone, Debug)]
pub struct Lane {
    /// The lane ID.
    id: LaneId,
    /// The length of the lane in m.
    full_length: f64,
    /// The vehicles on the lane, ordered by position.
    /// On a circular road this is a cyclic order and may start anywhere.
    vehicles: Vec<VehicleId>,
    /// The lane to the left, if any.
    left: Option<LaneId>,
    /// The lane to the right, if any.
    right: Option<LaneId>,
    /// Whether the vehicles on the lane have been placed.
    initialized: bool,
}

/// The attributes of a lane.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LaneAttributes {
    /// The length of the lane in m.
    pub full_length: f64,
}

/// The result of a position lookup on a lane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nearby {
    /// The nearest vehicle ahead of the position.
    pub predecessor: Option<VehicleId>,
    /// The nearest vehicle behind the position.
    pub successor: Option<VehicleId>,
    /// The index at which a vehicle at the position belongs in the lane's sequence.
    pub index: usize,
}

impl Lane {
    /// Creates a new, empty lane.
    pub(crate) fn new(id: LaneId, attributes: &LaneAttributes) -> Self {
        Self {
            id,
            full_length: attributes.full_length,
            vehicles: vec![],
            left: None,
            right: None,
            initialized: false,
        }
    }

    /// Gets the lane's ID.
    pub fn id(&self) -> LaneId {
        self.id
    }

    /// Gets the length of the lane in m.
    pub fn full_length(&self) -> f64 {
        self.full_length
    }

    /// The vehicles on the lane, ordered by position.
    pub fn vehicles(&self) -> &[VehicleId] {
        &self.vehicles
    }

    /// The lane to the left, if any.
    pub fn left(&self) -> Option<LaneId> {
        self.left
    }

    /// The lane to the right, if any.
    pub fn right(&self) -> Option<LaneId> {
        self.right
    }

    /// Whether the vehicles on the lane have been placed.
    /// An empty lane has nothing to place and always counts as initialized.
    pub fn is_initialized(&self) -> bool {
        self.initialized || self.vehicles.is_empty()
    }

    pub(crate) fn set_initialized(&mut self, initialized: bool) {
        self.initialized = initialized;
    }

    /// Gets the index of a vehicle in the lane's sequence.
    pub fn index_of(&self, id: VehicleId) -> Option<usize> {
        self.vehicles.iter().position(|v| *v == id)
    }

    pub(crate) fn set_left(&mut self, lane: LaneId) {
        self.left = Some(lane);
    }

    pub(crate) fn set_right(&mut self, lane: LaneId) {
        self.right = Some(lane);
    }

    /// Appends a vehicle to the end of the sequence.
    pub(crate) fn push_vehicle(&mut self, id: VehicleId) {
        self.vehicles.push(id);
    }

    /// Inserts a vehicle at the given index of the sequence.
    pub(crate) fn insert_vehicle(&mut self, index: usize, id: VehicleId) {
        let index = usize::min(index, self.vehicles.len());
        self.vehicles.insert(index, id);
    }

    /// Removes the vehicle with the given ID from the lane.
    /// Returns `true` if it was on the lane.
    pub(crate) fn remove_vehicle(&mut self, id: VehicleId) -> bool {
        if let Some(idx) = self.vehicles.iter().rposition(|v| *v == id) {
            self.vehicles.remove(idx);
            true
        } else {
            false
        }
    }

    /// Sorts the vehicles by ascending position.
    pub(crate) fn sort_by_position(&mut self, vehicles: &VehicleSet) {
        self.vehicles
            .sort_by(|a, b| vehicles[*a].position().total_cmp(&vehicles[*b].position()));
    }

    /// Finds the vehicles immediately ahead of and behind the vehicle at `index`.
    ///
    /// Returns `(predecessor, successor)`. On a circular road the sequence wraps,
    /// so with two or more vehicles both are always present.
    pub fn nearby_vehicles(&self, index: usize, shape: RoadShape) -> (Option<VehicleId>, Option<VehicleId>) {
        let count = self.vehicles.len();
        if count <= 1 || index >= count {
            return (None, None);
        }
        if shape.is_circular() {
            (
                Some(self.vehicles[cyclic_next(index, count)]),
                Some(self.vehicles[cyclic_prev(index, count)]),
            )
        } else {
            (
                self.vehicles.get(index + 1).copied(),
                index.checked_sub(1).map(|i| self.vehicles[i]),
            )
        }
    }

    /// Finds the vehicles that would be ahead of and behind a vehicle at `pos`,
    /// and the index at which it would be inserted.
    ///
    /// The lane's own vehicles are the only candidates; the search is linear.
    pub fn nearby_vehicles_at_position(&self, pos: f64, shape: RoadShape, vehicles: &VehicleSet) -> Nearby {
        self.locate(pos, shape, vehicles, 0)
    }

    /// Like [Self::nearby_vehicles_at_position], but starts scanning at `start`.
    pub(crate) fn locate(&self, pos: f64, shape: RoadShape, vehicles: &VehicleSet, start: usize) -> Nearby {
        let count = self.vehicles.len();
        let position = |idx: usize| vehicles[self.vehicles[idx]].position();

        if !shape.is_circular() {
            let index = self
                .vehicles
                .iter()
                .position(|id| vehicles[*id].position() > pos)
                .unwrap_or(count);
            return Nearby {
                predecessor: self.vehicles.get(index).copied(),
                successor: index.checked_sub(1).map(|i| self.vehicles[i]),
                index,
            };
        }

        match count {
            0 => Nearby {
                predecessor: None,
                successor: None,
                index: 0,
            },
            1 => Nearby {
                predecessor: Some(self.vehicles[0]),
                successor: Some(self.vehicles[0]),
                index: 1,
            },
            _ => {
                let start = if start < count { start } else { 0 };
                let index = rotated_range(count, start)
                    .find(|&i| {
                        let ahead = position(cyclic_next(i, count));
                        shape.between(ahead, pos, position(i), self.full_length)
                    })
                    .map(|i| i + 1)
                    .unwrap_or(count);
                Nearby {
                    predecessor: Some(self.vehicles[if index == count { 0 } else { index }]),
                    successor: Some(self.vehicles[index - 1]),
                    index,
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{LaneSet, Vehicle, VehicleAttributes};

    const RING: RoadShape = RoadShape::Circular {
        circumference: 300.0,
    };

    /// Builds a detached lane holding vehicles at the given positions, in order.
    fn lane_with(positions: &[f64]) -> (Lane, VehicleSet, Vec<VehicleId>) {
        let mut lanes = LaneSet::default();
        let lane_id = lanes.insert_with_key(|id| Lane::new(id, &LaneAttributes { full_length: 300.0 }));
        let mut lane = lanes.remove(lane_id).unwrap();
        let mut vehicles = VehicleSet::default();
        let ids = positions
            .iter()
            .map(|&pos| {
                let id = vehicles.insert_with_key(|id| {
                    let mut vehicle = Vehicle::new(id, &VehicleAttributes::default(), lane_id).unwrap();
                    vehicle.set_state(pos, 0.0);
                    vehicle
                });
                lane.push_vehicle(id);
                id
            })
            .collect();
        (lane, vehicles, ids)
    }

    #[test]
    fn nearby_vehicles_wrap_on_a_ring() {
        let (lane, _, ids) = lane_with(&[0.0, 100.0, 200.0]);
        assert_eq!(lane.nearby_vehicles(0, RING), (Some(ids[1]), Some(ids[2])));
        assert_eq!(lane.nearby_vehicles(2, RING), (Some(ids[0]), Some(ids[1])));
    }

    #[test]
    fn nearby_vehicles_end_on_a_straight_road() {
        let (lane, _, ids) = lane_with(&[0.0, 100.0, 200.0]);
        let road = RoadShape::Straight;
        assert_eq!(lane.nearby_vehicles(0, road), (Some(ids[1]), None));
        assert_eq!(lane.nearby_vehicles(1, road), (Some(ids[2]), Some(ids[0])));
        assert_eq!(lane.nearby_vehicles(2, road), (None, Some(ids[1])));
    }

    #[test]
    fn lone_vehicle_has_no_neighbours() {
        let (lane, _, _) = lane_with(&[50.0]);
        assert_eq!(lane.nearby_vehicles(0, RING), (None, None));
        assert_eq!(lane.nearby_vehicles(0, RoadShape::Straight), (None, None));
    }

    #[test]
    fn position_lookup_on_a_rotated_ring() {
        // Vehicle at 290 has been overtaken in sequence by the wrap of the first.
        let (lane, vehicles, ids) = lane_with(&[100.0, 200.0, 290.0, 5.0]);
        let nearby = lane.nearby_vehicles_at_position(150.0, RING, &vehicles);
        assert_eq!(nearby.predecessor, Some(ids[1]));
        assert_eq!(nearby.successor, Some(ids[0]));
        assert_eq!(nearby.index, 1);

        let nearby = lane.nearby_vehicles_at_position(295.0, RING, &vehicles);
        assert_eq!(nearby.predecessor, Some(ids[3]));
        assert_eq!(nearby.successor, Some(ids[2]));
        assert_eq!(nearby.index, 3);

        let nearby = lane.nearby_vehicles_at_position(50.0, RING, &vehicles);
        assert_eq!(nearby.predecessor, Some(ids[0]));
        assert_eq!(nearby.successor, Some(ids[3]));
        assert_eq!(nearby.index, 4);
    }

    #[test]
    fn position_lookup_matches_from_any_start() {
        let (lane, vehicles, _) = lane_with(&[100.0, 200.0, 290.0, 5.0]);
        for pos in [0.0, 50.0, 150.0, 250.0, 299.0] {
            let expected = lane.nearby_vehicles_at_position(pos, RING, &vehicles);
            for start in 0..4 {
                assert_eq!(lane.locate(pos, RING, &vehicles, start), expected);
            }
        }
    }

    #[test]
    fn position_lookup_on_small_lanes() {
        let (lane, vehicles, _) = lane_with(&[]);
        let nearby = lane.nearby_vehicles_at_position(10.0, RING, &vehicles);
        assert_eq!(nearby, Nearby { predecessor: None, successor: None, index: 0 });

        let (lane, vehicles, ids) = lane_with(&[100.0]);
        let nearby = lane.nearby_vehicles_at_position(10.0, RING, &vehicles);
        assert_eq!(nearby.predecessor, Some(ids[0]));
        assert_eq!(nearby.successor, Some(ids[0]));

        let nearby = lane.nearby_vehicles_at_position(10.0, RoadShape::Straight, &vehicles);
        assert_eq!(nearby, Nearby { predecessor: Some(ids[0]), successor: None, index: 0 });
        let nearby = lane.nearby_vehicles_at_position(110.0, RoadShape::Straight, &vehicles);
        assert_eq!(nearby, Nearby { predecessor: None, successor: Some(ids[0]), index: 1 });
    }

    #[test]
    fn insert_and_remove() {
        let (mut lane, _, ids) = lane_with(&[0.0, 100.0]);
        assert!(lane.remove_vehicle(ids[0]));
        assert!(!lane.remove_vehicle(ids[0]));
        lane.insert_vehicle(5, ids[0]);
        assert_eq!(lane.vehicles(), &[ids[1], ids[0]]);
        assert_eq!(lane.index_of(ids[0]), Some(1));
    }
}
