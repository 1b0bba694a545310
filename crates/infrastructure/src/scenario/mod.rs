//! Scenario text format.

mod lexer;
mod parser;
mod record;

pub use parser::{parse_file, ScenarioParser};
