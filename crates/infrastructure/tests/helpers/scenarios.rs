#![allow(dead_code)]
use ferrous_replay_domain::Scenario;
use ferrous_replay_infrastructure::scenario::ScenarioParser;
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RecordType};

/// One range answering `example. A` with 192.0.2.1 on `addr`, then a query
/// and an exact check of the answer.
pub fn basic_scenario(addr: &str) -> String {
    format!(
        r#"; basic lookup through a single upstream
stub-addr: {addr}
CONFIG_END

SCENARIO_BEGIN Basic A lookup

RANGE_BEGIN 0 100
	ADDRESS {addr}
ENTRY_BEGIN
MATCH opcode qtype qname
ADJUST copy_id
REPLY QR NOERROR
SECTION QUESTION
example. IN A
SECTION ANSWER
example. IN A 192.0.2.1
ENTRY_END
RANGE_END

STEP 1 QUERY
ENTRY_BEGIN
REPLY RD
SECTION QUESTION
example. IN A
ENTRY_END

STEP 2 CHECK_ANSWER
ENTRY_BEGIN
MATCH qtype qname answer
REPLY QR RD NOERROR
SECTION QUESTION
example. IN A
SECTION ANSWER
example. IN A 192.0.2.1
ENTRY_END

SCENARIO_END
"#
    )
}

/// Same upstream, but its only entry is mandatory and the step asks for
/// a different name.
pub fn unfired_mandatory_scenario(addr: &str) -> String {
    format!(
        r#"SCENARIO_BEGIN Mandatory entry never used

RANGE_BEGIN 0 100 {addr}
ENTRY_BEGIN
MATCH opcode qtype qname
ADJUST copy_id
REPLY QR NOERROR
MANDATORY
SECTION QUESTION
example. IN A
SECTION ANSWER
example. IN A 192.0.2.1
ENTRY_END
RANGE_END

STEP 1 QUERY
ENTRY_BEGIN
REPLY RD
SECTION QUESTION
other. IN A
ENTRY_END

SCENARIO_END
"#
    )
}

/// A referral from `parent` whose glue points at `child`, and the child
/// answering authoritatively.
pub fn referral_scenario(parent: &str, child: &str) -> String {
    format!(
        r#"SCENARIO_BEGIN Referral with glue

RANGE_BEGIN 0 100 {parent}
ENTRY_BEGIN
MATCH opcode subdomain
ADJUST copy_id copy_query
REPLY QR NOERROR
SECTION QUESTION
example. IN NS
SECTION AUTHORITY
example. IN NS ns.example.
SECTION ADDITIONAL
ns.example. IN A {child}
ENTRY_END
RANGE_END

RANGE_BEGIN 0 100 {child}
ENTRY_BEGIN
MATCH opcode qtype qname
ADJUST copy_id
REPLY QR AA NOERROR
SECTION QUESTION
www.example. IN A
SECTION ANSWER
www.example. IN A 192.0.2.80
ENTRY_END
RANGE_END

SCENARIO_END
"#
    )
}

pub fn parse(text: &str) -> Scenario {
    ScenarioParser::new("test.rpl", text).parse().unwrap()
}

pub fn query(name: &str, qtype: RecordType) -> Message {
    let mut message = Message::new(4242, MessageType::Query, OpCode::Query);
    message.set_recursion_desired(true);
    message.add_query(Query::query(Name::from_ascii(name).unwrap(), qtype));
    message
}

/// A port currently free on loopback.
pub fn free_port() -> u16 {
    std::net::UdpSocket::bind("127.0.0.1:0")
        .and_then(|s| s.local_addr())
        .map(|a| a.port())
        .unwrap()
}
