use crate::ports::{FakeClock, QueryFlooder, ReplayRequest, SutRequest, SutTransport};
use ferrous_replay_domain::config::PlayerConfig;
use ferrous_replay_domain::{
    wire, Entry, RawReply, Scenario, ScenarioError, Step, StepType, SutEndpoint,
};
use hickory_proto::op::{Message, MessageType, OpCode};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Answer received for the most recent QUERY step.
#[derive(Debug, Clone)]
struct LastAnswer {
    wire: Vec<u8>,
    message: Option<Message>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayReport {
    pub steps_executed: u64,
    pub retries: u64,
}

/// Drives the step timeline of a scenario against the system under test.
///
/// The mock server runs concurrently and reads the current step id that
/// this use case publishes before every step.
pub struct PlayScenarioUseCase {
    transport: Arc<dyn SutTransport>,
    clock: Arc<dyn FakeClock>,
    flooder: Arc<dyn QueryFlooder>,
    config: PlayerConfig,
}

impl PlayScenarioUseCase {
    pub fn new(
        transport: Arc<dyn SutTransport>,
        clock: Arc<dyn FakeClock>,
        flooder: Arc<dyn QueryFlooder>,
        config: PlayerConfig,
    ) -> Self {
        Self {
            transport,
            clock,
            flooder,
            config,
        }
    }

    pub async fn execute(
        &self,
        scenario: &Scenario,
        endpoints: &[SutEndpoint],
    ) -> Result<PlayReport, ScenarioError> {
        info!(scenario = %scenario.name, file = %scenario.file, steps = scenario.steps.len(), "Playing scenario");

        let mut report = PlayReport::default();
        let mut retries_left: HashMap<usize, u32> = HashMap::new();
        let mut last_answer: Option<LastAnswer> = None;
        let mut index = 0;

        while index < scenario.steps.len() {
            let step = &scenario.steps[index];
            scenario.set_current_step(step.id);
            report.steps_executed += 1;
            debug!(step = step.id, step_type = %step.step_type, line = step.source_line, "Executing step");

            let Err(err) = self
                .play_step(scenario, step, endpoints, &mut last_answer)
                .await
            else {
                index += 1;
                continue;
            };

            let left = retries_left.entry(index).or_insert(step.repeat_count);
            if *left == 0 {
                return Err(ScenarioError::StepFailed {
                    file: scenario.file.clone(),
                    step: step.id,
                    source: Box::new(err),
                });
            }
            *left -= 1;
            report.retries += 1;
            warn!(step = step.id, retries_left = *left, error = %err, "Step failed, retrying");

            if !step.pause.is_zero() {
                tokio::time::sleep(step.pause).await;
            }
            if let Some(target) = step.next_on_failure {
                index = scenario
                    .step_index(target)
                    .ok_or_else(|| ScenarioError::BranchTargetNotFound {
                        file: scenario.file.clone(),
                        step: step.id,
                        target,
                    })?;
            }
        }

        scenario.check_mandatory()?;
        info!(scenario = %scenario.name, steps = report.steps_executed, retries = report.retries, "Scenario passed");
        Ok(report)
    }

    async fn play_step(
        &self,
        scenario: &Scenario,
        step: &Step,
        endpoints: &[SutEndpoint],
        last_answer: &mut Option<LastAnswer>,
    ) -> Result<(), ScenarioError> {
        match step.step_type {
            StepType::Query => {
                *last_answer = self.send_query(step, endpoints).await?;
                Ok(())
            }
            StepType::CheckAnswer | StepType::Answer => {
                check_answer(step, last_answer.as_ref())
            }
            StepType::TimePasses => self.time_passes(step).await,
            StepType::Replay => {
                self.replay(step, endpoints).await;
                Ok(())
            }
            StepType::Assert => match &step.assertion {
                Some(assertion) => assertion.evaluate(scenario),
                None => Err(ScenarioError::InvalidStep(format!(
                    "ASSERT step {} has no expression",
                    step.id
                ))),
            },
            StepType::Log => {
                info!(step = step.id, "{}", step.args.join(" "));
                Ok(())
            }
            StepType::CheckOutQuery | StepType::Reply | StepType::Mock => Ok(()),
        }
    }

    async fn send_query(
        &self,
        step: &Step,
        endpoints: &[SutEndpoint],
    ) -> Result<Option<LastAnswer>, ScenarioError> {
        let entry = step_entry(step)?;
        let request = SutRequest {
            wire: entry.query_wire()?,
            destination: select_endpoint(step, endpoints)?,
            source: step.source_address(),
            transport: step.transport(),
            timeout: self.config.query_timeout(),
        };

        match self.transport.exchange(&request).await? {
            Some(bytes) => {
                // Raw queries may provoke answers that are not valid DNS
                let message = match wire::decode(&bytes) {
                    Ok(message) => Some(message),
                    Err(e) if entry.is_raw() => {
                        debug!(step = step.id, error = %e, "Undecodable answer to raw query");
                        None
                    }
                    Err(e) => return Err(e),
                };
                Ok(Some(LastAnswer {
                    wire: bytes,
                    message,
                }))
            }
            None if entry.is_raw() => {
                debug!(step = step.id, "No answer to raw query");
                Ok(None)
            }
            None => Err(ScenarioError::Timeout(request.destination.to_string())),
        }
    }

    async fn time_passes(&self, step: &Step) -> Result<(), ScenarioError> {
        let seconds = step
            .args
            .get(1)
            .and_then(|v| v.parse::<f64>().ok())
            .ok_or_else(|| {
                ScenarioError::InvalidStep(format!(
                    "TIME_PASSES step {} needs 'ELAPSE <seconds>'",
                    step.id
                ))
            })?;
        debug!(step = step.id, seconds, "Advancing fake clock");
        self.clock.advance(seconds).await
    }

    /// Best effort: failures are logged and never fail the scenario.
    async fn replay(&self, step: &Step, endpoints: &[SutEndpoint]) {
        if step.queries.is_empty() {
            warn!(step = step.id, "REPLAY step without queries");
            return;
        }

        let mut queries = Vec::with_capacity(step.queries.len());
        for (i, query) in step.queries.iter().enumerate() {
            let mut message = Message::new(i as u16, MessageType::Query, OpCode::Query);
            message.set_recursion_desired(true);
            message.add_query(query.clone());
            match wire::encode(&message) {
                Ok(bytes) => queries.push(bytes),
                Err(e) => warn!(step = step.id, error = %e, "Skipping unencodable REPLAY query"),
            }
        }

        let destination = match select_endpoint(step, endpoints) {
            Ok(addr) => addr,
            Err(e) => {
                warn!(step = step.id, error = %e, "REPLAY skipped");
                return;
            }
        };

        let request = ReplayRequest {
            count: queries.len() * self.config.replay_multiplier.max(1) as usize,
            queries,
            destination,
            window: self.config.replay_window.max(1),
            drain_timeout: self.config.query_timeout(),
        };

        let started = Instant::now();
        match self.flooder.flood(request).await {
            Ok(report) => info!(
                step = step.id,
                sent = report.sent,
                received = report.received,
                qps = report.qps(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "REPLAY finished"
            ),
            Err(e) => warn!(step = step.id, error = %e, "REPLAY failed"),
        }
    }
}

fn step_entry(step: &Step) -> Result<&Entry, ScenarioError> {
    step.data.as_ref().ok_or_else(|| {
        ScenarioError::InvalidStep(format!(
            "{} step {} has no entry",
            step.step_type, step.id
        ))
    })
}

fn check_answer(step: &Step, answer: Option<&LastAnswer>) -> Result<(), ScenarioError> {
    let entry = step_entry(step)?;

    match (&entry.raw, answer) {
        (Some(RawReply::Silent), None) => Ok(()),
        (Some(RawReply::Silent), Some(_)) => Err(ScenarioError::InvalidStep(format!(
            "line {}: expected no answer, got one",
            entry.source_line
        ))),
        (_, None) => Err(ScenarioError::InvalidStep(format!(
            "line {}: no answer from preceding query",
            entry.source_line
        ))),
        (Some(RawReply::Bytes(expected)), Some(got)) => {
            if *expected == got.wire {
                Ok(())
            } else {
                Err(ScenarioError::DataMismatch {
                    line: entry.source_line,
                    criterion: "raw".to_string(),
                    expected: ferrous_replay_domain::dns_text::hex(expected),
                    got: ferrous_replay_domain::dns_text::hex(&got.wire),
                })
            }
        }
        (None, Some(got)) => match &got.message {
            Some(message) => entry.matches(message),
            None => Err(ScenarioError::Codec(format!(
                "line {}: answer is not a DNS message",
                entry.source_line
            ))),
        },
    }
}

/// Named endpoint from the step arguments, the first configured one otherwise.
fn select_endpoint(step: &Step, endpoints: &[SutEndpoint]) -> Result<SocketAddr, ScenarioError> {
    let endpoint = match step.endpoint_name() {
        Some(name) if step.step_type == StepType::Query || step.step_type == StepType::Replay => {
            endpoints.iter().find(|e| e.name == name).ok_or_else(|| {
                ScenarioError::InvalidStep(format!(
                    "step {}: unknown SUT endpoint '{}'",
                    step.id, name
                ))
            })?
        }
        _ => endpoints.first().ok_or_else(|| {
            ScenarioError::Connection("no SUT endpoint configured".to_string())
        })?,
    };
    Ok(endpoint.address)
}
