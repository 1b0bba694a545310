#![allow(dead_code)]

use async_trait::async_trait;
use ferrous_replay_application::ports::{
    FakeClock, QueryFlooder, ReplayReport, ReplayRequest, SutRequest, SutTransport,
};
use ferrous_replay_domain::{wire, Entry, ScenarioError, Step, StepType};
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Responder = Box<dyn Fn(&Message) -> Option<Message> + Send + Sync>;

/// Stand-in for the resolver under test: answers through a closure, or
/// from a queue of canned outcomes when one is scripted.
pub struct MockSutTransport {
    responder: Responder,
    scripted: Mutex<VecDeque<Option<Vec<u8>>>>,
    requests: Mutex<Vec<SutRequest>>,
}

impl MockSutTransport {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&Message) -> Option<Message> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            scripted: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers every A question with `addr`.
    pub fn answering_a(addr: &'static str) -> Self {
        Self::new(move |query| Some(answer_a(query, addr)))
    }

    pub fn silent() -> Self {
        Self::new(|_| None)
    }

    pub fn push_scripted(&self, outcome: Option<Vec<u8>>) {
        self.scripted.lock().unwrap().push_back(outcome);
    }

    pub fn requests(&self) -> Vec<SutRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl SutTransport for MockSutTransport {
    async fn exchange(&self, request: &SutRequest) -> Result<Option<Vec<u8>>, ScenarioError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(outcome) = self.scripted.lock().unwrap().pop_front() {
            return Ok(outcome);
        }
        let query = wire::decode(&request.wire)?;
        match (self.responder)(&query) {
            Some(answer) => Ok(Some(wire::encode(&answer)?)),
            None => Ok(None),
        }
    }
}

#[derive(Default)]
pub struct MockFakeClock {
    advances: Mutex<Vec<f64>>,
}

impl MockFakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advances(&self) -> Vec<f64> {
        self.advances.lock().unwrap().clone()
    }
}

#[async_trait]
impl FakeClock for MockFakeClock {
    async fn advance(&self, seconds: f64) -> Result<(), ScenarioError> {
        self.advances.lock().unwrap().push(seconds);
        Ok(())
    }
}

#[derive(Default)]
pub struct MockQueryFlooder {
    requests: Mutex<Vec<ReplayRequest>>,
    should_fail: Mutex<bool>,
}

impl MockQueryFlooder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_should_fail(&self, fail: bool) {
        *self.should_fail.lock().unwrap() = fail;
    }

    pub fn requests(&self) -> Vec<ReplayRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryFlooder for MockQueryFlooder {
    async fn flood(&self, request: ReplayRequest) -> Result<ReplayReport, ScenarioError> {
        let count = request.count as u64;
        self.requests.lock().unwrap().push(request);
        if *self.should_fail.lock().unwrap() {
            return Err(ScenarioError::Connection("flood refused".to_string()));
        }
        Ok(ReplayReport {
            sent: count,
            received: count,
            elapsed: Duration::from_millis(10),
        })
    }
}

pub fn answer_a(query: &Message, addr: &str) -> Message {
    let mut answer = Message::new(query.id(), MessageType::Response, OpCode::Query);
    answer.set_recursion_desired(query.recursion_desired());
    answer.set_recursion_available(true);
    answer.add_queries(query.queries().to_vec());
    if let Some(q) = query.queries().first() {
        answer.add_answer(Record::from_rdata(
            q.name().clone(),
            300,
            RData::A(A(Ipv4Addr::from_str(addr).unwrap())),
        ));
    }
    answer.set_response_code(ResponseCode::NoError);
    answer
}

/// QUERY step asking `name A`.
pub fn query_step(id: i64, name: &str, line: usize) -> Step {
    let mut entry = Entry::new(line + 1);
    entry.message.set_recursion_desired(true);
    entry
        .message
        .add_query(Query::query(Name::from_ascii(name).unwrap(), RecordType::A));
    let mut step = Step::new(id, StepType::Query, vec![], line);
    step.data = Some(entry);
    step
}

/// CHECK_ANSWER expecting `name A addr` with `MATCH qname qtype answer`.
pub fn check_step(id: i64, name: &str, addr: &str, line: usize) -> Step {
    let mut entry = Entry::new(line + 1);
    entry.match_fields = ferrous_replay_domain::MatchCriterion::parse_list(["qname", "qtype", "answer"])
        .unwrap();
    wire::set_message_type(&mut entry.message, MessageType::Response);
    let owner = Name::from_ascii(name).unwrap();
    entry.message.add_query(Query::query(owner.clone(), RecordType::A));
    entry.message.add_answer(Record::from_rdata(
        owner,
        300,
        RData::A(A(Ipv4Addr::from_str(addr).unwrap())),
    ));
    let mut step = Step::new(id, StepType::CheckAnswer, vec![], line);
    step.data = Some(entry);
    step
}

pub fn mock_ports(
    transport: MockSutTransport,
) -> (Arc<MockSutTransport>, Arc<MockFakeClock>, Arc<MockQueryFlooder>) {
    (
        Arc::new(transport),
        Arc::new(MockFakeClock::new()),
        Arc::new(MockQueryFlooder::new()),
    )
}
