//! A microscopic car-following traffic simulation.
//!
//! Vehicles drive along the lanes of a [Road], which is either straight or
//! circular. Each vehicle accelerates according to the intelligent driver
//! model, and all positions and velocities are advanced together by a
//! pluggable [SteppingScheme].

pub use error::{SimError, SimResult};
pub use geometry::RoadShape;
pub use integration::CarFollowingSystem;
pub use lane::{Lane, LaneAttributes, Nearby};
pub use road::Road;
pub use scheme::{ExplicitEuler, FnSystem, Heun, ImplicitEuler, OdeSystem, State, SteppingScheme};
pub use simulation::Simulation;
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use vehicle::{
    AccelerationPartials, DriverParams, IntelligentDriver, Leader, Neighbours, Vehicle, VehicleAttributes,
};

mod error;
mod geometry;
mod integration;
mod lane;
mod lane_change;
mod road;
pub mod scheme;
mod simulation;
mod util;
mod vehicle;

new_key_type! {
    /// Unique ID of a [Lane].
    pub struct LaneId;
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
}

type LaneSet = SlotMap<LaneId, Lane>;
type VehicleSet = SlotMap<VehicleId, Vehicle>;
