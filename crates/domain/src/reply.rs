use crate::dns_text::glue_addresses;
use crate::errors::ScenarioError;
use crate::tsig::{self, TsigKey};
use crate::wire;
use hickory_proto::op::Message;
use std::net::IpAddr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Outcome of resolving an inbound upstream query against the scenario.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Adjusted scripted answer, optionally TSIG-signed on the way out.
    Message {
        message: Message,
        tsig: Option<TsigKey>,
    },
    /// Opaque wire bytes sent verbatim.
    Raw(Vec<u8>),
    /// Deliberately unanswered (packet loss or a RAW entry without data).
    Drop,
    /// Nothing scripted matched; the server answers SERVFAIL.
    NoMatch,
}

impl Reply {
    /// A/AAAA addresses the reply introduces, used for listener discovery.
    pub fn glue(&self) -> Vec<IpAddr> {
        match self {
            Reply::Message { message, .. } => glue_addresses(message),
            _ => Vec::new(),
        }
    }

    /// Wire bytes to send for `query_wire`, or `None` when nothing must be sent.
    pub fn encode(&self, query: &Message, query_wire: &[u8]) -> Result<Option<Vec<u8>>, ScenarioError> {
        match self {
            Reply::Message { message, tsig } => {
                let bytes = wire::encode(message)?;
                Ok(Some(match tsig {
                    Some(key) => {
                        let mac = tsig::request_mac(query_wire);
                        key.sign(&bytes, mac.as_deref(), unix_now())
                    }
                    None => bytes,
                }))
            }
            Reply::Raw(bytes) => Ok(Some(bytes.clone())),
            Reply::Drop => Ok(None),
            Reply::NoMatch => wire::encode(&wire::servfail_for(query)).map(Some),
        }
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
