pub mod agents;
pub mod amm;
pub mod controller;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod price_process;
pub mod regime;
pub mod replenish;
pub mod scenario;
pub mod scenarios;
pub mod state;
pub mod sweep;

pub use engine::{simulate, SimulationEngine, StepResult};
pub use error::{SimError, SimResult};
pub use scenario::ScenarioConfig;
pub use state::{SimulationState, Termination, Trajectory};
