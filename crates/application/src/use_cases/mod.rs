pub mod scenario;

pub use scenario::{PlayReport, PlayScenarioUseCase};
