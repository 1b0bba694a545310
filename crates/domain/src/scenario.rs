use crate::errors::ScenarioError;
use crate::range::Range;
use crate::reply::Reply;
use crate::step::{Step, StepType};
use hickory_proto::op::Message;
use std::collections::{BTreeSet, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use tracing::{debug, warn};

/// A parsed test case: upstream ranges plus the step timeline.
///
/// Shared between the player and the mock server. The player is the only
/// writer of the current step id; the server is the only writer of range
/// and entry counters. The server may read a current step id that is one
/// step stale; eligibility windows are sized with that slack in mind.
#[derive(Debug)]
pub struct Scenario {
    pub name: String,
    pub file: String,
    pub config: Vec<(String, String)>,
    pub ranges: Vec<Range>,
    pub steps: Vec<Step>,
    current_step: AtomicI64,
    range_addresses: BTreeSet<IpAddr>,
    consumed_replies: Mutex<HashSet<usize>>,
    unknown_addresses: Mutex<HashSet<IpAddr>>,
}

impl Scenario {
    pub fn new(
        name: impl Into<String>,
        file: impl Into<String>,
        config: Vec<(String, String)>,
        ranges: Vec<Range>,
        steps: Vec<Step>,
    ) -> Self {
        let range_addresses = ranges
            .iter()
            .flat_map(|r| r.addresses.iter().copied())
            .collect();
        Self {
            name: name.into(),
            file: file.into(),
            config,
            ranges,
            steps,
            current_step: AtomicI64::new(0),
            range_addresses,
            consumed_replies: Mutex::new(HashSet::new()),
            unknown_addresses: Mutex::new(HashSet::new()),
        }
    }

    /// Last value of `key` in the header block.
    pub fn config_value(&self, key: &str) -> Option<&str> {
        self.config
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Id of the step being played, 0 before play starts.
    pub fn current_step_id(&self) -> i64 {
        self.current_step.load(Ordering::Acquire)
    }

    pub fn set_current_step(&self, id: i64) {
        self.current_step.store(id, Ordering::Release);
    }

    /// Every address named by any range.
    pub fn range_addresses(&self) -> &BTreeSet<IpAddr> {
        &self.range_addresses
    }

    pub fn step_index(&self, id: i64) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }

    /// Resolves an upstream query received on `address`.
    ///
    /// The first eligible range owns the query even when none of its
    /// entries match. One-shot REPLY steps only answer when no range is
    /// eligible.
    pub fn reply(&self, query: &Message, address: Option<IpAddr>) -> Reply {
        let step_id = self.current_step_id();
        let address = address.filter(|addr| self.known_address(*addr));

        match self.ranges.iter().find(|r| r.eligible(step_id, address)) {
            Some(range) => range.reply(query).unwrap_or(Reply::NoMatch),
            None => self.one_shot_reply(query, step_id).unwrap_or(Reply::NoMatch),
        }
    }

    /// Queries sent to an address no range names fall back to wildcard
    /// matching. Each such address is reported once since it often means
    /// a mistyped address in the scenario.
    fn known_address(&self, addr: IpAddr) -> bool {
        if self.range_addresses.contains(&addr) {
            return true;
        }
        if let Ok(mut seen) = self.unknown_addresses.lock() {
            if seen.insert(addr) {
                warn!(addr = %addr, file = %self.file, "Query on address not bound to any RANGE, matching unaddressed");
            }
        }
        false
    }

    fn one_shot_reply(&self, query: &Message, step_id: i64) -> Option<Reply> {
        let mut consumed = self.consumed_replies.lock().ok()?;
        for (index, step) in self.steps.iter().enumerate() {
            if step.step_type != StepType::Reply || step.id < step_id || consumed.contains(&index) {
                continue;
            }
            let Some(entry) = &step.data else { continue };
            if entry.matches(query).is_err() {
                continue;
            }
            if !entry.is_raw() {
                consumed.insert(index);
            }
            debug!(step = step.id, "One-shot REPLY step used");
            entry.mark_fired();
            return Some(entry.reply(query));
        }
        None
    }

    /// Fails when some mandatory entry was never used.
    pub fn check_mandatory(&self) -> Result<(), ScenarioError> {
        for range in &self.ranges {
            if let Some(entry) = range.entries.iter().find(|e| e.mandatory && e.fired() == 0) {
                return Err(ScenarioError::MandatoryUnfired {
                    file: self.file.clone(),
                    line: entry.source_line,
                });
            }
        }
        Ok(())
    }
}
