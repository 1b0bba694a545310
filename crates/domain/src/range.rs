use crate::entry::Entry;
use crate::reply::Reply;
use hickory_proto::op::Message;
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// A step-window and address scoped set of entries simulating one upstream server.
#[derive(Debug)]
pub struct Range {
    pub first_step: i64,
    pub last_step: i64,
    /// Empty means the range answers on any address.
    pub addresses: BTreeSet<IpAddr>,
    pub entries: Vec<Entry>,
    pub args: BTreeMap<String, String>,
    pub source_line: usize,
    received: AtomicU64,
    sent: AtomicU64,
}

impl Range {
    pub fn new(first_step: i64, last_step: i64, source_line: usize) -> Self {
        Self {
            first_step,
            last_step,
            addresses: BTreeSet::new(),
            entries: Vec::new(),
            args: BTreeMap::new(),
            source_line,
            received: AtomicU64::new(0),
            sent: AtomicU64::new(0),
        }
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Both window ends are inclusive. A query without an address hint is
    /// compatible with every range.
    pub fn eligible(&self, step_id: i64, address: Option<IpAddr>) -> bool {
        let in_window = self.first_step <= step_id && step_id <= self.last_step;
        let address_ok = match address {
            None => true,
            Some(addr) => self.addresses.is_empty() || self.addresses.contains(&addr),
        };
        in_window && address_ok
    }

    /// Drop probability from the `LOSS` argument.
    pub fn loss(&self) -> Option<f64> {
        self.args
            .get("LOSS")
            .and_then(|value| value.parse::<f64>().ok())
            .map(|p| p.clamp(0.0, 1.0))
    }

    /// First entry matching `query` answers it. `None` when no entry matched.
    pub fn reply(&self, query: &Message) -> Option<Reply> {
        self.received.fetch_add(1, Ordering::Relaxed);
        let entry = self.entries.iter().find(|e| e.matches(query).is_ok())?;
        let reply = entry.reply(query);

        if let Some(loss) = self.loss() {
            if fastrand::f64() < loss {
                debug!(range_line = self.source_line, loss, "Simulated packet loss");
                return Some(Reply::Drop);
            }
        }

        self.sent.fetch_add(1, Ordering::Relaxed);
        entry.mark_fired();
        Some(reply)
    }
}
