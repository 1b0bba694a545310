use ferrous_replay_domain::{wire, Reply, Scenario, ScenarioError};
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// What the server must do with one inbound upstream query.
#[derive(Debug, Default)]
pub struct HandledQuery {
    /// Bytes to send back, `None` when the query goes unanswered.
    pub response: Option<Vec<u8>>,
    /// Addresses introduced by glue in the reply.
    pub glue: Vec<IpAddr>,
}

/// Answers upstream queries from the scripted scenario.
pub struct UpstreamHandler {
    scenario: Arc<Scenario>,
    undefined_answers: AtomicU64,
}

impl UpstreamHandler {
    pub fn new(scenario: Arc<Scenario>) -> Self {
        Self {
            scenario,
            undefined_answers: AtomicU64::new(0),
        }
    }

    /// Queries answered with the synthesized SERVFAIL so far.
    pub fn undefined_answers(&self) -> u64 {
        self.undefined_answers.load(Ordering::Relaxed)
    }

    pub fn handle(
        &self,
        query_wire: &[u8],
        local: IpAddr,
    ) -> Result<HandledQuery, ScenarioError> {
        let query = match wire::decode(query_wire) {
            Ok(query) => query,
            Err(e) => {
                warn!(addr = %local, error = %e, "Dropping undecodable upstream query");
                return Ok(HandledQuery::default());
            }
        };

        let reply = self.scenario.reply(&query, Some(local));
        match &reply {
            Reply::NoMatch => {
                self.undefined_answers.fetch_add(1, Ordering::Relaxed);
                warn!(
                    step = self.scenario.current_step_id(),
                    addr = %local,
                    query = ?query.queries().first(),
                    "No scripted answer, sending SERVFAIL"
                );
            }
            Reply::Drop => {
                debug!(step = self.scenario.current_step_id(), addr = %local, "Query dropped");
            }
            _ => {
                debug!(step = self.scenario.current_step_id(), addr = %local, id = query.id(), "Answering upstream query");
            }
        }

        Ok(HandledQuery {
            glue: reply.glue(),
            response: reply.encode(&query, query_wire)?,
        })
    }
}
