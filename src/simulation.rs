use crate::error::{SimError, SimResult};
use crate::integration::advance;
use crate::scheme::SteppingScheme;
use crate::{Lane, LaneId, Road, Vehicle, VehicleId};
use log::debug;

/// A traffic simulation on a single road.
///
/// Owns the road and the stepping scheme, and keeps the simulation clock.
pub struct Simulation<S: SteppingScheme> {
    /// The road and the vehicles on it.
    road: Road,
    /// The numerical scheme used to integrate the vehicles' motion.
    scheme: S,
    /// The current simulation time in s.
    time: f64,
    /// The current frame of simulation.
    frame: usize,
}

impl<S: SteppingScheme> Simulation<S> {
    /// Creates a new simulation starting at time zero.
    ///
    /// The road's vehicles must already have been placed with one of the
    /// `initialize_*` methods of [Road].
    pub fn new(road: Road, scheme: S) -> SimResult<Self> {
        if !road.is_initialized() {
            return Err(SimError::NotInitialized);
        }
        debug!(
            "starting simulation with {} vehicles on {} lanes",
            road.vehicle_count(),
            road.lane_ids().len()
        );
        Ok(Self {
            road,
            scheme,
            time: 0.0,
            frame: 0,
        })
    }

    /// Advances the simulation by `dt` seconds.
    ///
    /// If the step fails, neither the road nor the clock is changed.
    pub fn step(&mut self, dt: f64) -> SimResult<()> {
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(SimError::InvalidParameter { name: "dt", value: dt });
        }
        if !self.road.is_initialized() {
            return Err(SimError::NotInitialized);
        }
        advance(&mut self.road, &self.scheme, self.time, dt)?;
        self.time += dt;
        self.frame += 1;
        Ok(())
    }

    /// Performs `steps` consecutive steps of `dt` seconds each,
    /// stopping at the first failure.
    pub fn run(&mut self, steps: usize, dt: f64) -> SimResult<()> {
        for _ in 0..steps {
            self.step(dt)?;
        }
        Ok(())
    }

    /// Gets the current simulation time in s.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Gets the current simulation frame index.
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Gets a reference to the road.
    pub fn road(&self) -> &Road {
        &self.road
    }

    /// Gets a mutable reference to the road.
    ///
    /// Adding vehicles leaves the road uninitialized, and stepping will fail
    /// until they have been placed.
    pub fn road_mut(&mut self) -> &mut Road {
        &mut self.road
    }

    /// Gets a reference to the stepping scheme.
    pub fn scheme(&self) -> &S {
        &self.scheme
    }

    /// Ends the simulation, handing back the road.
    pub fn into_road(self) -> Road {
        self.road
    }

    /// Returns an iterator over the lanes, from right to left.
    pub fn iter_lanes(&self) -> impl Iterator<Item = &Lane> {
        self.road.iter_lanes()
    }

    /// Returns an iterator over all the vehicles in the simulation.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.road.iter_vehicles()
    }

    /// Gets a reference to the lane with the given ID.
    pub fn get_lane(&self, lane_id: LaneId) -> Option<&Lane> {
        self.road.lane(lane_id)
    }

    /// Gets a reference to the vehicle with the given ID,
    /// or `None` if it has left the road.
    pub fn get_vehicle(&self, vehicle_id: VehicleId) -> Option<&Vehicle> {
        self.road.vehicle(vehicle_id)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::scheme::{ExplicitEuler, ImplicitEuler, OdeSystem, State};
    use crate::{LaneAttributes, VehicleAttributes};
    use assert_approx_eq::assert_approx_eq;

    fn ring(vehicles: usize) -> Road {
        let mut road = Road::circular(300.0).unwrap();
        let lane = road.add_lane(&LaneAttributes { full_length: 300.0 }).unwrap();
        for _ in 0..vehicles {
            road.add_vehicle(&VehicleAttributes::default(), lane).unwrap();
        }
        road
    }

    /// A scheme which always fails, or returns a state of the wrong size.
    enum BrokenScheme {
        Diverges,
        Truncates,
    }

    impl SteppingScheme for BrokenScheme {
        fn apply(&self, _system: &dyn OdeSystem, _t: f64, _dt: f64, _y_old: &State) -> SimResult<State> {
            match self {
                BrokenScheme::Diverges => Err(SimError::NumericalConvergenceFailure {
                    iterations: 50,
                    residual: f64::INFINITY,
                }),
                BrokenScheme::Truncates => Ok(State::zeros(1)),
            }
        }
    }

    fn snapshot<S: SteppingScheme>(sim: &Simulation<S>) -> Vec<(VehicleId, f64, f64)> {
        sim.iter_vehicles()
            .map(|v| (v.id(), v.position(), v.velocity()))
            .collect()
    }

    #[test]
    fn failed_step_changes_nothing() {
        for scheme in [BrokenScheme::Diverges, BrokenScheme::Truncates] {
            let mut road = ring(2);
            let lane = road.lane_ids()[0];
            road.initialize_lane(lane, &[0.0, 150.0], &[20.0, 20.0]).unwrap();
            let mut sim = Simulation::new(road, scheme).unwrap();
            let before = snapshot(&sim);

            let result = sim.step(0.1);
            match sim.scheme() {
                BrokenScheme::Diverges => assert!(matches!(
                    result,
                    Err(SimError::NumericalConvergenceFailure { .. })
                )),
                BrokenScheme::Truncates => assert!(matches!(
                    result,
                    Err(SimError::StateLengthMismatch { expected: 4, got: 1, .. })
                )),
            }
            assert_eq!(snapshot(&sim), before);
            assert_eq!(sim.frame(), 0);
            assert_eq!(sim.time(), 0.0);
        }
    }

    #[test]
    fn requires_an_initialized_road() {
        assert!(matches!(
            Simulation::new(ring(3), ExplicitEuler),
            Err(SimError::NotInitialized)
        ));
        let mut road = ring(3);
        road.initialize_default();
        assert!(Simulation::new(road, ExplicitEuler).is_ok());
    }

    #[test]
    fn clock_advances_per_step() {
        let mut road = ring(3);
        road.initialize_default();
        let mut sim = Simulation::new(road, ImplicitEuler::default()).unwrap();
        sim.run(10, 0.1).unwrap();
        assert_eq!(sim.frame(), 10);
        assert_approx_eq!(sim.time(), 1.0);
    }

    #[test]
    fn rejects_bad_time_steps() {
        let mut road = ring(1);
        road.initialize_default();
        let mut sim = Simulation::new(road, ExplicitEuler).unwrap();
        for dt in [0.0, -0.1, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                sim.step(dt),
                Err(SimError::InvalidParameter { name: "dt", .. })
            ));
        }
        assert_eq!(sim.frame(), 0);
    }

    #[test]
    fn adding_vehicles_mid_run_requires_placement() {
        let mut road = ring(2);
        road.initialize_default();
        let mut sim = Simulation::new(road, ExplicitEuler).unwrap();
        sim.step(0.1).unwrap();
        let lane = sim.road().lane_ids()[0];
        sim.road_mut()
            .add_vehicle(&VehicleAttributes::default(), lane)
            .unwrap();
        assert!(matches!(sim.step(0.1), Err(SimError::NotInitialized)));
        sim.road_mut().initialize_default();
        sim.step(0.1).unwrap();
        assert_eq!(sim.frame(), 2);
    }

    #[test]
    fn empty_road_steps() {
        let mut road = Road::straight();
        road.add_lane(&LaneAttributes { full_length: 100.0 }).unwrap();
        road.initialize_default();
        let mut sim = Simulation::new(road, ExplicitEuler).unwrap();
        sim.run(3, 0.5).unwrap();
        assert_eq!(sim.iter_vehicles().count(), 0);
    }
}
