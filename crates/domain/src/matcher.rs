//! Message Matcher
//!
//! Pure predicates comparing an expected (scripted) message with a received
//! one on a single named criterion. A failed predicate always yields a
//! [`MatchError`] carrying the rendered expected and received values.

use crate::dns_text::{
    flags_to_text, hex, opcode_to_text, rcode_to_text, records_to_text, rrsig_covered,
};
use crate::errors::MatchError;
use hickory_proto::op::{Edns, Message, Query};
use hickory_proto::rr::rdata::opt::EdnsCode;
use hickory_proto::rr::{Record, RecordType};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchCriterion {
    Opcode,
    Qtype,
    Qname,
    Qcase,
    Subdomain,
    Flags,
    Rcode,
    Question,
    Answer,
    Authority,
    Additional,
    Ttl,
    AnswerTypes,
    AnswerRrsigs,
    Edns,
    Nsid,
}

impl MatchCriterion {
    pub const DEFAULT: [MatchCriterion; 3] = [
        MatchCriterion::Opcode,
        MatchCriterion::Qtype,
        MatchCriterion::Qname,
    ];

    /// What `all` stands for.
    pub const ALL: [MatchCriterion; 6] = [
        MatchCriterion::Flags,
        MatchCriterion::Rcode,
        MatchCriterion::Question,
        MatchCriterion::Answer,
        MatchCriterion::Authority,
        MatchCriterion::Additional,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchCriterion::Opcode => "opcode",
            MatchCriterion::Qtype => "qtype",
            MatchCriterion::Qname => "qname",
            MatchCriterion::Qcase => "qcase",
            MatchCriterion::Subdomain => "subdomain",
            MatchCriterion::Flags => "flags",
            MatchCriterion::Rcode => "rcode",
            MatchCriterion::Question => "question",
            MatchCriterion::Answer => "answer",
            MatchCriterion::Authority => "authority",
            MatchCriterion::Additional => "additional",
            MatchCriterion::Ttl => "ttl",
            MatchCriterion::AnswerTypes => "answertypes",
            MatchCriterion::AnswerRrsigs => "answerrrsigs",
            MatchCriterion::Edns => "edns",
            MatchCriterion::Nsid => "nsid",
        }
    }

    /// Parses a list of criterion names, expanding `all` and dropping duplicates
    /// while keeping first-seen order.
    pub fn parse_list<'a, I>(names: I) -> Result<Vec<MatchCriterion>, String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut fields = Vec::new();
        for name in names {
            let expanded: Vec<MatchCriterion> = if name.eq_ignore_ascii_case("all") {
                Self::ALL.to_vec()
            } else {
                vec![name.parse()?]
            };
            for criterion in expanded {
                if !fields.contains(&criterion) {
                    fields.push(criterion);
                }
            }
        }
        Ok(fields)
    }
}

impl fmt::Display for MatchCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchCriterion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "opcode" => Ok(MatchCriterion::Opcode),
            "qtype" => Ok(MatchCriterion::Qtype),
            "qname" => Ok(MatchCriterion::Qname),
            "qcase" => Ok(MatchCriterion::Qcase),
            "subdomain" => Ok(MatchCriterion::Subdomain),
            "flags" => Ok(MatchCriterion::Flags),
            "rcode" => Ok(MatchCriterion::Rcode),
            "question" => Ok(MatchCriterion::Question),
            "answer" => Ok(MatchCriterion::Answer),
            "authority" => Ok(MatchCriterion::Authority),
            "additional" => Ok(MatchCriterion::Additional),
            "ttl" => Ok(MatchCriterion::Ttl),
            "answertypes" => Ok(MatchCriterion::AnswerTypes),
            "answerrrsigs" => Ok(MatchCriterion::AnswerRrsigs),
            "edns" => Ok(MatchCriterion::Edns),
            "nsid" => Ok(MatchCriterion::Nsid),
            other => Err(format!("unknown match criterion '{}'", other)),
        }
    }
}

/// Checks `got` against `expected` on one criterion.
pub fn match_part(
    expected: &Message,
    got: &Message,
    criterion: MatchCriterion,
) -> Result<(), MatchError> {
    let name = criterion.as_str();
    match criterion {
        MatchCriterion::Opcode => compare_text(
            name,
            opcode_to_text(expected.op_code()),
            opcode_to_text(got.op_code()),
        ),
        MatchCriterion::Rcode => compare_text(
            name,
            rcode_to_text(expected.response_code()),
            rcode_to_text(got.response_code()),
        ),
        MatchCriterion::Flags => compare_text(name, flags_to_text(expected), flags_to_text(got)),
        MatchCriterion::Qtype => match_question(name, expected, got, |exp, got| {
            (exp.query_type() == got.query_type())
                .then_some(())
                .ok_or_else(|| (exp.query_type().to_string(), got.query_type().to_string()))
        }),
        MatchCriterion::Qname => match_question(name, expected, got, |exp, got| {
            (exp.name() == got.name())
                .then_some(())
                .ok_or_else(|| (exp.name().to_string(), got.name().to_string()))
        }),
        MatchCriterion::Qcase => match_question(name, expected, got, |exp, got| {
            exp.name()
                .iter()
                .eq(got.name().iter())
                .then_some(())
                .ok_or_else(|| (exp.name().to_ascii(), got.name().to_ascii()))
        }),
        MatchCriterion::Subdomain => match_question(name, expected, got, |exp, got| {
            let lowered = got.name().to_lowercase();
            exp.name()
                .zone_of(&lowered)
                .then_some(())
                .ok_or_else(|| (exp.name().to_string(), lowered.to_string()))
        }),
        MatchCriterion::Question => {
            compare_questions(name, expected.queries(), got.queries())
        }
        MatchCriterion::Answer | MatchCriterion::Ttl => {
            compare_records(name, expected.answers(), got.answers())
        }
        MatchCriterion::Authority => {
            compare_records(name, expected.name_servers(), got.name_servers())
        }
        MatchCriterion::Additional => {
            compare_records(name, expected.additionals(), got.additionals())
        }
        MatchCriterion::AnswerTypes => {
            compare_types(name, expected.answers(), got.answers(), true)
        }
        MatchCriterion::AnswerRrsigs => {
            compare_types(name, expected.answers(), got.answers(), false)
        }
        MatchCriterion::Edns => compare_edns(name, expected.extensions(), got.extensions()),
        MatchCriterion::Nsid => compare_nsid(name, expected.extensions(), got.extensions()),
    }
}

fn compare_text(criterion: &str, expected: String, got: String) -> Result<(), MatchError> {
    if expected == got {
        Ok(())
    } else {
        Err(MatchError::new(criterion, expected, got))
    }
}

/// An expected message without a question matches anything.
fn match_question<F>(
    criterion: &str,
    expected: &Message,
    got: &Message,
    check: F,
) -> Result<(), MatchError>
where
    F: Fn(&Query, &Query) -> Result<(), (String, String)>,
{
    let Some(exp) = expected.queries().first() else {
        return Ok(());
    };
    let Some(got) = got.queries().first() else {
        return Err(MatchError::new(criterion, exp.to_string(), "no question"));
    };
    check(exp, got).map_err(|(e, g)| MatchError::new(criterion, e, g))
}

fn compare_questions(criterion: &str, expected: &[Query], got: &[Query]) -> Result<(), MatchError> {
    let same = expected.len() == got.len()
        && expected.iter().all(|q| got.contains(q))
        && got.iter().all(|q| expected.contains(q));
    if same {
        return Ok(());
    }
    let render = |qs: &[Query]| {
        format!(
            "[{}]",
            qs.iter().map(|q| q.to_string()).collect::<Vec<_>>().join("; ")
        )
    };
    Err(MatchError::new(criterion, render(expected), render(got)))
}

/// Owner, type, class, TTL and RDATA all take part in equality.
fn record_eq(a: &Record, b: &Record) -> bool {
    a.name() == b.name()
        && a.record_type() == b.record_type()
        && a.dns_class() == b.dns_class()
        && a.ttl() == b.ttl()
        && a.data() == b.data()
}

fn compare_records(criterion: &str, expected: &[Record], got: &[Record]) -> Result<(), MatchError> {
    let same = expected.len() == got.len()
        && expected.iter().all(|e| got.iter().any(|g| record_eq(e, g)))
        && got.iter().all(|g| expected.iter().any(|e| record_eq(e, g)));
    if same {
        Ok(())
    } else {
        Err(MatchError::new(
            criterion,
            records_to_text(expected),
            records_to_text(got),
        ))
    }
}

/// Type key of a record: signatures are keyed by the type they cover.
fn type_key(record: &Record) -> (bool, u16) {
    match rrsig_covered(record) {
        Some(covered) => (true, u16::from(covered)),
        None => (false, u16::from(record.record_type())),
    }
}

fn compare_types(
    criterion: &str,
    expected: &[Record],
    got: &[Record],
    skip_rrsigs: bool,
) -> Result<(), MatchError> {
    let collect = |records: &[Record]| -> BTreeSet<(bool, u16)> {
        records
            .iter()
            .filter(|r| !(skip_rrsigs && r.record_type() == RecordType::RRSIG))
            .map(type_key)
            .collect()
    };
    let exp_types = collect(expected);
    let got_types = collect(got);
    if exp_types == got_types {
        return Ok(());
    }
    let render = |types: &BTreeSet<(bool, u16)>| {
        let names: Vec<String> = types
            .iter()
            .map(|(sig, t)| {
                let name = RecordType::from(*t).to_string();
                if *sig {
                    format!("RRSIG({})", name)
                } else {
                    name
                }
            })
            .collect();
        format!("({})", names.join(", "))
    };
    Err(MatchError::new(
        criterion,
        render(&exp_types),
        render(&got_types),
    ))
}

fn edns_to_text(edns: Option<&Edns>) -> String {
    match edns {
        Some(e) => format!("version {}, payload {}", e.version(), e.max_payload()),
        None => "no EDNS".to_string(),
    }
}

fn compare_edns(
    criterion: &str,
    expected: &Option<Edns>,
    got: &Option<Edns>,
) -> Result<(), MatchError> {
    let same = match (expected, got) {
        (None, None) => true,
        (Some(e), Some(g)) => e.version() == g.version() && e.max_payload() == g.max_payload(),
        _ => false,
    };
    if same {
        Ok(())
    } else {
        Err(MatchError::new(
            criterion,
            edns_to_text(expected.as_ref()),
            edns_to_text(got.as_ref()),
        ))
    }
}

fn nsid_of(edns: &Option<Edns>) -> Option<Vec<u8>> {
    let option = edns.as_ref()?.option(EdnsCode::NSID)?;
    Vec::<u8>::try_from(option).ok()
}

fn compare_nsid(
    criterion: &str,
    expected: &Option<Edns>,
    got: &Option<Edns>,
) -> Result<(), MatchError> {
    let render = |nsid: &Option<Vec<u8>>| match nsid {
        Some(data) => format!("NSID {}", hex(data)),
        None => "no NSID".to_string(),
    };
    let exp = nsid_of(expected);
    let got = nsid_of(got);
    if exp == got {
        Ok(())
    } else {
        Err(MatchError::new(criterion, render(&exp), render(&got)))
    }
}
