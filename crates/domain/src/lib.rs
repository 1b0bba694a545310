//! Ferrous Replay Domain Layer
//!
//! Scripted DNS transactions: entries, ranges, steps and the scenario that
//! ties them together, plus the message matcher used to verify answers.
pub mod assertion;
pub mod config;
pub mod dns_text;
pub mod entry;
pub mod errors;
pub mod matcher;
pub mod range;
pub mod reply;
pub mod scenario;
pub mod step;
pub mod tsig;
pub mod wire;

pub use assertion::{AssertField, Assertion, Comparison};
pub use config::{CliOverrides, Config, SutEndpoint};
pub use entry::{AdjustField, EdnsTemplate, Entry, RawReply};
pub use errors::{MatchError, ScenarioError};
pub use matcher::{match_part, MatchCriterion};
pub use range::Range;
pub use reply::Reply;
pub use scenario::Scenario;
pub use step::{Step, StepType, Transport};
pub use tsig::TsigKey;
