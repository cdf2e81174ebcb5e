mod data;
mod store;

pub use data::{ScaleData, ScaleOwner, ScaleValues};
pub use store::{EntityId, EntityScales, SimulationSide};
