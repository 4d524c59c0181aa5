//! Tests that simulate traffic on a circular road.

use assert_approx_eq::assert_approx_eq;
use rand::{Rng, SeedableRng};
use traffic_flow::{
    DriverParams, ExplicitEuler, Heun, ImplicitEuler, LaneAttributes, LaneId, Road, SimError,
    Simulation, VehicleAttributes,
};

/// Builds a ring of the given circumference with `per_lane` default vehicles on each lane.
fn ring(circumference: f64, lanes: usize, per_lane: usize) -> (Road, Vec<LaneId>) {
    let mut road = Road::circular(circumference).unwrap();
    let lane_ids = (0..lanes)
        .map(|_| {
            road.add_lane(&LaneAttributes {
                full_length: circumference,
            })
            .unwrap()
        })
        .collect::<Vec<_>>();
    for lane in &lane_ids {
        for _ in 0..per_lane {
            road.add_vehicle(&VehicleAttributes::default(), *lane).unwrap();
        }
    }
    (road, lane_ids)
}

#[test]
fn simulation_requires_placed_vehicles() {
    let (road, _) = ring(300.0, 1, 4);
    assert!(matches!(
        Simulation::new(road, ExplicitEuler),
        Err(SimError::NotInitialized)
    ));
}

#[test]
fn even_placement_forms_a_neighbour_cycle() {
    let (mut road, lanes) = ring(300.0, 1, 7);
    road.initialize_default();

    let start = road.lane(lanes[0]).unwrap().vehicles()[0];
    let mut id = start;
    let mut visited = 0;
    loop {
        let pred = road.vehicle(id).unwrap().neighbours().predecessor.unwrap();
        assert_eq!(road.vehicle(pred).unwrap().neighbours().successor, Some(id));
        assert_approx_eq!(road.distance(Some(pred), Some(id)), 300.0 / 7.0);
        visited += 1;
        id = pred;
        if id == start {
            break;
        }
    }
    assert_eq!(visited, 7);
}

/// A single explicit Euler step on a two-vehicle ring matches the closed form.
#[test]
fn explicit_step_on_two_vehicle_ring() {
    let (mut road, lanes) = ring(300.0, 1, 2);
    road.initialize_lane(lanes[0], &[0.0, 150.0], &[20.0, 20.0])
        .unwrap();
    let ids = road.lane(lanes[0]).unwrap().vehicles().to_vec();

    // gap = 150 - 4, desired gap = 7 + 20 * 1 + 0
    let accel = 1.0 - (20.0f64 / 26.0).powi(4) - (27.0f64 / 146.0).powi(2);
    assert_approx_eq!(road.desired_acceleration(ids[0]).unwrap(), accel);

    let dt = 0.05;
    let mut sim = Simulation::new(road, ExplicitEuler).unwrap();
    sim.step(dt).unwrap();
    for (id, start) in ids.iter().zip([0.0, 150.0]) {
        let vehicle = sim.get_vehicle(*id).unwrap();
        assert_approx_eq!(vehicle.velocity(), 20.0 + dt * accel);
        assert_approx_eq!(vehicle.position(), start + dt * 20.0);
    }
}

#[test]
fn velocities_stay_non_negative() {
    let mut rng = rand::rngs::StdRng::from_seed(*b"A crowded ring road at rush hour");
    let (mut road, lanes) = ring(300.0, 2, 12);
    for lane in &lanes {
        let count = road.lane(*lane).unwrap().vehicles().len();
        let positions = (0..count)
            .map(|i| i as f64 * 25.0 + rng.gen_range(0.0..5.0))
            .collect::<Vec<_>>();
        let velocities = (0..count)
            .map(|_| rng.gen_range(0.0..30.0))
            .collect::<Vec<_>>();
        road.initialize_lane(*lane, &positions, &velocities).unwrap();
    }

    let mut sim = Simulation::new(road, ExplicitEuler).unwrap();
    for _ in 0..500 {
        sim.step(0.1).unwrap();
        for vehicle in sim.iter_vehicles() {
            assert!(vehicle.velocity() >= 0.0);
            assert!((0.0..300.0).contains(&vehicle.position()));
        }
    }
    // Nothing leaves a ring
    assert_eq!(sim.road().vehicle_count(), 24);
}

#[test]
fn uniform_flow_stays_uniform() {
    let (mut road, _) = ring(300.0, 1, 6);
    road.initialize_uniformly(10.0).unwrap();
    let mut sim = Simulation::new(road, ImplicitEuler::default()).unwrap();
    sim.run(100, 0.5).unwrap();

    let velocities = sim.iter_vehicles().map(|v| v.velocity()).collect::<Vec<_>>();
    for vel in &velocities {
        assert_approx_eq!(*vel, velocities[0], 1e-6);
    }
    // gap 46, so the equilibrium speed is well above the starting speed
    assert!(velocities[0] > 10.0);
}

#[test]
fn implicit_and_explicit_euler_agree_for_small_steps() {
    let build = || {
        let (mut road, lanes) = ring(300.0, 1, 4);
        road.initialize_lane(lanes[0], &[0.0, 60.0, 150.0, 220.0], &[15.0, 5.0, 20.0, 10.0])
            .unwrap();
        road
    };
    let mut explicit = Simulation::new(build(), ExplicitEuler).unwrap();
    let mut implicit = Simulation::new(build(), ImplicitEuler::default()).unwrap();
    explicit.run(100, 0.01).unwrap();
    implicit.run(100, 0.01).unwrap();

    for (a, b) in explicit.iter_vehicles().zip(implicit.iter_vehicles()) {
        assert_eq!(a.id(), b.id());
        assert_approx_eq!(a.velocity(), b.velocity(), 0.1);
        assert_approx_eq!(a.position(), b.position(), 0.1);
    }
}

#[test]
fn lone_vehicle_approaches_desired_speed() {
    let (mut road, _) = ring(300.0, 1, 1);
    road.initialize_default();
    let mut sim = Simulation::new(road, Heun).unwrap();
    let mut last = 0.0;
    for _ in 0..200 {
        sim.step(0.5).unwrap();
        let vel = sim.iter_vehicles().next().unwrap().velocity();
        assert!(vel >= last);
        assert!(vel <= 26.0 + 1e-9);
        last = vel;
    }
    assert!(last > 25.0);
}

#[test]
fn randomised_drivers_keep_driving() {
    let mut rng = rand::rngs::StdRng::from_seed(*b"Everybody drives a bit different");
    let (mut road, lanes) = ring(500.0, 2, 5);
    road.add_vehicle(
        &VehicleAttributes {
            driver: DriverParams::truck(),
            label: "truck".into(),
            ..Default::default()
        },
        lanes[0],
    )
    .unwrap();
    road.initialize_uniformly(5.0).unwrap();
    road.randomise_desired_speeds(&mut rng, 0.1).unwrap();

    let mut sim = Simulation::new(road, Heun).unwrap();
    sim.run(300, 0.2).unwrap();
    assert_approx_eq!(sim.time(), 60.0, 1e-9);
    assert_eq!(sim.road().vehicle_count(), 11);
    assert!(sim.iter_vehicles().any(|v| v.label() == "truck"));
    assert!(sim.iter_vehicles().all(|v| v.velocity() >= 0.0));
}
