//! Lane changing and the neighbour pointers it invalidates.
//!
//! Lane changes are decided one vehicle at a time, in the order the vehicles
//! had at the start of the pass, against the live lane sequences. Once all
//! moves are done, every vehicle's cached neighbour pointers are rebuilt in
//! a separate pass.

use crate::util::{cyclic_next, cyclic_prev};
use crate::vehicle::{is_safe_gap, Side};
use crate::{LaneId, Neighbours, Road, VehicleId};
use log::debug;

/// Performs one lane change pass over every vehicle on the road,
/// then repairs all neighbour pointers. Returns the number of moves.
pub(crate) fn change_lanes(road: &mut Road) -> usize {
    let mut moves = 0;
    if road.lane_order.len() > 1 {
        let snapshot = road.vehicle_order();
        for vehicle_id in snapshot {
            if let Some((lane_id, index)) = choose_lane(road, vehicle_id) {
                move_vehicle(road, vehicle_id, lane_id, index);
                moves += 1;
            }
        }
    }
    refresh_neighbours(road);
    moves
}

/// Decides whether a vehicle should change lanes.
///
/// A vehicle held up by a slower vehicle ahead looks to the left lane;
/// otherwise it keeps right when it can. Either way the move only happens
/// if the gaps to both new neighbours are at least the vehicle's safety distance.
///
/// Returns the target lane and the index to insert the vehicle at.
fn choose_lane(road: &Road, vehicle_id: VehicleId) -> Option<(LaneId, usize)> {
    let vehicle = road.vehicles.get(vehicle_id)?;
    let lane = &road.lanes[vehicle.lane_id()];
    let safety_dist = vehicle.lane_change_safety_distance();

    let target = if vehicle
        .driver()
        .wants_to_pass(road.leader(vehicle_id), safety_dist)
    {
        lane.left()?
    } else {
        lane.right()?
    };

    let target_lane = &road.lanes[target];
    let full_length = target_lane.full_length();
    let pos = vehicle.position();
    road.shape.position(pos, full_length)?;

    let nearby = target_lane.nearby_vehicles_at_position(pos, road.shape, &road.vehicles);
    let gap_ahead = nearby.predecessor.map(|id| {
        road.shape
            .distance(road.vehicles[id].position(), pos, full_length)
            - vehicle.length()
    });
    let gap_behind = nearby.successor.map(|id| {
        let other = &road.vehicles[id];
        road.shape.distance(pos, other.position(), full_length) - other.length()
    });

    (is_safe_gap(gap_ahead, safety_dist) && is_safe_gap(gap_behind, safety_dist))
        .then_some((target, nearby.index))
}

/// Moves a vehicle into another lane's sequence at the given index.
fn move_vehicle(road: &mut Road, vehicle_id: VehicleId, target: LaneId, index: usize) {
    let vehicle = &mut road.vehicles[vehicle_id];
    let source = vehicle.lane_id();
    road.lanes[source].remove_vehicle(vehicle_id);
    road.lanes[target].insert_vehicle(index, vehicle_id);
    vehicle.set_lane(target);
    debug!(
        "vehicle {:?} {:?} changed lanes {:?} -> {:?} at {:.1} m",
        vehicle_id,
        vehicle.label(),
        source,
        target,
        vehicle.position()
    );
}

/// Rebuilds the neighbour pointers of every vehicle from the lane sequences.
///
/// Same-lane pointers come straight from sequence adjacency. Pointers into
/// the adjacent lanes start from the cached value and are walked one place
/// if the cached neighbour has crossed the vehicle; failing that they are
/// found by a full search of the adjacent lane.
pub(crate) fn refresh_neighbours(road: &mut Road) {
    let mut updates = Vec::with_capacity(road.vehicles.len());
    for lane in road.iter_lanes() {
        for (idx, vehicle_id) in lane.vehicles().iter().enumerate() {
            let (predecessor, successor) = lane.nearby_vehicles(idx, road.shape);
            let cached = road.vehicles[*vehicle_id].neighbours();
            let mut neighbours = Neighbours {
                predecessor,
                successor,
                ..*cached
            };
            for (side, adjacent) in [(Side::Left, lane.left()), (Side::Right, lane.right())] {
                let pair = match adjacent {
                    Some(adjacent) => repair_adjacent(road, *vehicle_id, adjacent, cached.adjacent(side)),
                    None => (None, None),
                };
                neighbours.set_adjacent(side, pair);
            }
            updates.push((*vehicle_id, neighbours));
        }
    }
    for (vehicle_id, neighbours) in updates {
        *road.vehicles[vehicle_id].neighbours_mut() = neighbours;
    }
}

/// Finds the (predecessor, successor) of a vehicle in an adjacent lane,
/// starting from the cached pair.
fn repair_adjacent(
    road: &Road,
    vehicle_id: VehicleId,
    lane_id: LaneId,
    cached: (Option<VehicleId>, Option<VehicleId>),
) -> (Option<VehicleId>, Option<VehicleId>) {
    let lane = &road.lanes[lane_id];
    let shape = road.shape;
    let full_length = lane.full_length();
    let pos = road.vehicles[vehicle_id].position();
    let seq = lane.vehicles();
    let count = seq.len();
    let position = |idx: usize| road.vehicles[seq[idx]].position();

    // Index of a cached pointer, if it still refers to a vehicle on this lane
    let index_in_lane = |id: Option<VehicleId>| {
        id.and_then(|id| road.vehicles.get(id))
            .filter(|v| v.lane_id() == lane_id)
            .and_then(|v| lane.index_of(v.id()))
    };
    let hint = index_in_lane(cached.0).or_else(|| index_in_lane(cached.1).map(|i| i + 1));

    if shape.is_circular() && count >= 2 {
        if let Some(hint) = hint {
            let mut ahead = hint % count;
            if !shape.in_front(position(ahead), pos, full_length) {
                // The cached predecessor has dropped behind
                ahead = cyclic_next(ahead, count);
            } else if shape.in_front(position(cyclic_prev(ahead, count)), pos, full_length) {
                // The cached successor has moved ahead
                ahead = cyclic_prev(ahead, count);
            }
            let behind = cyclic_prev(ahead, count);
            if shape.between(position(ahead), pos, position(behind), full_length) {
                return (Some(seq[ahead]), Some(seq[behind]));
            }
        }
    }

    let nearby = lane.locate(pos, shape, &road.vehicles, hint.unwrap_or(0));
    (nearby.predecessor, nearby.successor)
}
