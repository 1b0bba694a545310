#![allow(dead_code)]
use ferrous_replay_domain::{wire, AdjustField, Entry, MatchCriterion, Range};
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

pub struct EntryBuilder {
    qname: String,
    qtype: RecordType,
    answers: Vec<(String, Ipv4Addr)>,
    rcode: ResponseCode,
    match_fields: Vec<MatchCriterion>,
    adjust_fields: Vec<AdjustField>,
    mandatory: bool,
    line: usize,
}

impl EntryBuilder {
    pub fn new() -> Self {
        Self {
            qname: "example.com.".to_string(),
            qtype: RecordType::A,
            answers: Vec::new(),
            rcode: ResponseCode::NoError,
            match_fields: MatchCriterion::DEFAULT.to_vec(),
            adjust_fields: vec![AdjustField::CopyId],
            mandatory: false,
            line: 1,
        }
    }

    pub fn qname(mut self, name: &str) -> Self {
        self.qname = name.to_string();
        self
    }

    pub fn qtype(mut self, qtype: RecordType) -> Self {
        self.qtype = qtype;
        self
    }

    pub fn answer_a(mut self, owner: &str, addr: &str) -> Self {
        self.answers
            .push((owner.to_string(), Ipv4Addr::from_str(addr).unwrap()));
        self
    }

    pub fn rcode(mut self, rcode: ResponseCode) -> Self {
        self.rcode = rcode;
        self
    }

    pub fn match_fields(mut self, fields: &[MatchCriterion]) -> Self {
        self.match_fields = fields.to_vec();
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn line(mut self, line: usize) -> Self {
        self.line = line;
        self
    }

    pub fn build(self) -> Entry {
        let mut entry = Entry::new(self.line);
        entry.match_fields = self.match_fields;
        entry.adjust_fields = self.adjust_fields;
        entry.mandatory = self.mandatory;
        wire::set_message_type(&mut entry.message, MessageType::Response);
        entry.message.set_response_code(self.rcode);
        entry
            .message
            .add_query(Query::query(Name::from_ascii(&self.qname).unwrap(), self.qtype));
        for (owner, addr) in self.answers {
            entry.message.add_answer(Record::from_rdata(
                Name::from_ascii(&owner).unwrap(),
                300,
                RData::A(A(addr)),
            ));
        }
        entry
    }
}

impl Default for EntryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn range_with(first: i64, last: i64, addresses: &[&str], entries: Vec<Entry>) -> Range {
    let mut range = Range::new(first, last, 1);
    range.addresses = addresses
        .iter()
        .map(|a| IpAddr::from_str(a).unwrap())
        .collect();
    range.entries = entries;
    range
}

pub fn query(name: &str, qtype: RecordType) -> Message {
    let mut message = Message::new(4321, MessageType::Query, OpCode::Query);
    message.set_recursion_desired(true);
    message.add_query(Query::query(Name::from_ascii(name).unwrap(), qtype));
    message
}
