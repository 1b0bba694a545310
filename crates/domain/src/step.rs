use crate::assertion::Assertion;
use crate::entry::Entry;
use crate::errors::ScenarioError;
use hickory_proto::op::Query;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepType {
    Query,
    CheckOutQuery,
    CheckAnswer,
    Answer,
    TimePasses,
    Reply,
    Mock,
    Log,
    Replay,
    Assert,
}

impl StepType {
    /// Steps that cannot exist without an entry block.
    pub fn has_data(self) -> bool {
        matches!(self, StepType::Query | StepType::CheckAnswer | StepType::Reply)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepType::Query => "QUERY",
            StepType::CheckOutQuery => "CHECK_OUT_QUERY",
            StepType::CheckAnswer => "CHECK_ANSWER",
            StepType::Answer => "ANSWER",
            StepType::TimePasses => "TIME_PASSES",
            StepType::Reply => "REPLY",
            StepType::Mock => "MOCK",
            StepType::Log => "LOG",
            StepType::Replay => "REPLAY",
            StepType::Assert => "ASSERT",
        }
    }
}

impl FromStr for StepType {
    type Err = ScenarioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUERY" => Ok(StepType::Query),
            "CHECK_OUT_QUERY" => Ok(StepType::CheckOutQuery),
            "CHECK_ANSWER" => Ok(StepType::CheckAnswer),
            "ANSWER" => Ok(StepType::Answer),
            "TIME_PASSES" => Ok(StepType::TimePasses),
            "REPLY" => Ok(StepType::Reply),
            "MOCK" => Ok(StepType::Mock),
            "LOG" => Ok(StepType::Log),
            "REPLAY" => Ok(StepType::Replay),
            "ASSERT" => Ok(StepType::Assert),
            other => Err(ScenarioError::UnknownStepType(other.to_string())),
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    #[default]
    Udp,
    Tcp,
}

/// One action on the scenario timeline.
#[derive(Debug)]
pub struct Step {
    pub id: i64,
    pub step_type: StepType,
    pub args: Vec<String>,
    pub data: Option<Entry>,
    /// Retries left after a failure of this step.
    pub repeat_count: u32,
    pub pause: Duration,
    /// Step id the cursor jumps to when a retry is taken.
    pub next_on_failure: Option<i64>,
    /// Question list flooded by REPLAY steps.
    pub queries: Vec<Query>,
    pub assertion: Option<Assertion>,
    pub source_line: usize,
}

impl Step {
    pub fn new(id: i64, step_type: StepType, args: Vec<String>, source_line: usize) -> Self {
        Self {
            id,
            step_type,
            args,
            data: None,
            repeat_count: 0,
            pause: Duration::ZERO,
            next_on_failure: None,
            queries: Vec::new(),
            assertion: None,
            source_line,
        }
    }

    /// `TCP` among the QUERY arguments selects stream transport.
    pub fn transport(&self) -> Transport {
        if self.args.iter().any(|a| a.eq_ignore_ascii_case("TCP")) {
            Transport::Tcp
        } else {
            Transport::Udp
        }
    }

    /// `SOURCE=<ip>` binds the client socket to a specific address.
    pub fn source_address(&self) -> Option<IpAddr> {
        self.arg_value("SOURCE").and_then(|v| v.parse().ok())
    }

    /// First bare argument that is neither a transport nor a key=value pair
    /// names the SUT endpoint to talk to.
    pub fn endpoint_name(&self) -> Option<&str> {
        self.args
            .iter()
            .map(String::as_str)
            .find(|a| {
                !a.contains('=') && !a.eq_ignore_ascii_case("TCP") && !a.eq_ignore_ascii_case("UDP")
            })
    }

    pub fn arg_value(&self, key: &str) -> Option<&str> {
        self.args.iter().find_map(|a| {
            let (k, v) = a.split_once('=')?;
            k.eq_ignore_ascii_case(key).then_some(v)
        })
    }
}
