use crate::errors::ScenarioError;
use crate::matcher::{match_part, MatchCriterion};
use crate::reply::{unix_now, Reply};
use crate::tsig::TsigKey;
use crate::wire;
use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query};
use hickory_proto::rr::rdata::opt::EdnsOption;
use hickory_proto::rr::Name;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// EDNS payload advertised when a template does not name one.
pub const DEFAULT_EDNS_PAYLOAD: u16 = 1232;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdjustField {
    CopyId,
    CopyQuery,
}

impl FromStr for AdjustField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "copy_id" => Ok(AdjustField::CopyId),
            "copy_query" => Ok(AdjustField::CopyQuery),
            other => Err(format!("unknown adjust field '{}'", other)),
        }
    }
}

impl fmt::Display for AdjustField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdjustField::CopyId => f.write_str("copy_id"),
            AdjustField::CopyQuery => f.write_str("copy_query"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdnsTemplate {
    pub version: u8,
    pub payload: u16,
    pub dnssec_ok: bool,
    pub options: Vec<(u16, Vec<u8>)>,
}

impl Default for EdnsTemplate {
    fn default() -> Self {
        Self {
            version: 0,
            payload: DEFAULT_EDNS_PAYLOAD,
            dnssec_ok: false,
            options: Vec::new(),
        }
    }
}

impl EdnsTemplate {
    pub fn build(&self, version: u8, dnssec_ok: bool) -> Edns {
        let mut edns = Edns::new();
        edns.set_version(version);
        edns.set_max_payload(self.payload);
        edns.set_dnssec_ok(dnssec_ok);
        for (code, data) in &self.options {
            edns.options_mut()
                .insert(EdnsOption::Unknown(*code, data.clone()));
        }
        edns
    }
}

/// Opaque wire reply of a `RAW` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawReply {
    Bytes(Vec<u8>),
    /// `RAW` without data: the entry answers nothing.
    Silent,
}

/// A scripted DNS message plus the rules used to match queries against it
/// and to turn it into a concrete reply.
///
/// Only `fired` changes after parsing.
#[derive(Debug)]
pub struct Entry {
    pub match_fields: Vec<MatchCriterion>,
    pub adjust_fields: Vec<AdjustField>,
    pub message: Message,
    pub edns: Option<EdnsTemplate>,
    pub origin: Name,
    pub raw: Option<RawReply>,
    pub tsig: Option<TsigKey>,
    pub mandatory: bool,
    pub source_line: usize,
    fired: AtomicU64,
}

impl Entry {
    pub fn new(source_line: usize) -> Self {
        Self {
            match_fields: MatchCriterion::DEFAULT.to_vec(),
            adjust_fields: vec![AdjustField::CopyId],
            message: Message::new(fastrand::u16(..), MessageType::Query, OpCode::Query),
            edns: None,
            origin: Name::root(),
            raw: None,
            tsig: None,
            mandatory: false,
            source_line,
            fired: AtomicU64::new(0),
        }
    }

    pub fn is_raw(&self) -> bool {
        self.raw.is_some()
    }

    pub fn fired(&self) -> u64 {
        self.fired.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_fired(&self) {
        self.fired.fetch_add(1, Ordering::Relaxed);
    }

    /// Installs the EDNS template (if any) on the template message.
    pub fn apply_edns(&mut self) {
        if let Some(template) = &self.edns {
            let edns = template.build(template.version, template.dnssec_ok);
            self.message.set_edns(edns);
        }
    }

    /// Checks every match field of this entry against `msg`.
    pub fn matches(&self, msg: &Message) -> Result<(), ScenarioError> {
        for criterion in &self.match_fields {
            match_part(&self.message, msg, *criterion)
                .map_err(|e| ScenarioError::mismatch(self.source_line, e))?;
        }
        Ok(())
    }

    /// Builds a fresh reply for `query` from the template.
    pub fn adjust(&self, query: &Message) -> Message {
        let template = &self.message;
        let mut answer = Message::new(template.id(), template.message_type(), template.op_code());
        answer.set_authoritative(template.authoritative());
        answer.set_truncated(template.truncated());
        answer.set_recursion_desired(template.recursion_desired());
        answer.set_recursion_available(template.recursion_available());
        answer.set_authentic_data(template.authentic_data());
        answer.set_checking_disabled(template.checking_disabled());

        if let Some(query_edns) = query.extensions() {
            let edns = self
                .edns
                .clone()
                .unwrap_or_default()
                .build(query_edns.version(), query_edns.flags().dnssec_ok);
            answer.set_edns(edns);
        }

        let mut question: Vec<Query> = template.queries().to_vec();
        if self.adjust_fields.contains(&AdjustField::CopyId) {
            wire::set_id(&mut answer, query.id());
            if let (Some(first), Some(asked)) = (question.first_mut(), query.queries().first()) {
                first.set_name(asked.name().clone());
            }
        }
        if self.adjust_fields.contains(&AdjustField::CopyQuery) {
            question = query.queries().to_vec();
        }
        answer.add_queries(question);
        answer.add_answers(template.answers().to_vec());
        answer.add_name_servers(template.name_servers().to_vec());
        answer.add_additionals(template.additionals().to_vec());

        // EDNS rebuild can reset the extended bits
        answer.set_response_code(template.response_code());
        answer
    }

    /// Reply this entry gives to `query`; raw entries are returned verbatim.
    pub fn reply(&self, query: &Message) -> Reply {
        match &self.raw {
            Some(RawReply::Bytes(bytes)) => Reply::Raw(bytes.clone()),
            Some(RawReply::Silent) => Reply::Drop,
            None => Reply::Message {
                message: self.adjust(query),
                tsig: self.tsig.clone(),
            },
        }
    }

    /// Wire form used when this entry is sent as a query to the SUT.
    pub fn query_wire(&self) -> Result<Vec<u8>, ScenarioError> {
        let bytes = match &self.raw {
            Some(RawReply::Bytes(bytes)) => bytes.clone(),
            Some(RawReply::Silent) => {
                return Err(ScenarioError::InvalidStep(format!(
                    "entry at line {} has no RAW data to send",
                    self.source_line
                )))
            }
            None => wire::encode(&self.message)?,
        };
        Ok(match &self.tsig {
            Some(key) => key.sign(&bytes, None, unix_now()),
            None => bytes,
        })
    }
}
