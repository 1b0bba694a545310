mod play_scenario;

pub use play_scenario::{PlayReport, PlayScenarioUseCase};
