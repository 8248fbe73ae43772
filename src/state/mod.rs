//! State Store — the derived model of the remote world, built entirely
//! from packets observed on the wire.

pub mod store;
pub mod types;

pub use store::StateStore;
pub use types::{
    Alliance, Army, Building, Castle, MapObject, Movement, MovementResources, Player, Resources,
    UnitMap, MOVEMENT_TYPE_RETURN,
};
