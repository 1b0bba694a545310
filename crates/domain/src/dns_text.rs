//! Symbolic names for header fields and small record helpers shared by the
//! matcher, the scenario parser and the mock server.

use data_encoding::{HEXLOWER, HEXLOWER_PERMISSIVE};
use hickory_proto::op::{Message, OpCode, ResponseCode};
use hickory_proto::rr::{DNSClass, RData, Record, RecordType};
use hickory_proto::serialize::binary::BinEncodable;
use std::net::IpAddr;

const RCODES: &[(&str, u16)] = &[
    ("NOERROR", 0),
    ("FORMERR", 1),
    ("SERVFAIL", 2),
    ("NXDOMAIN", 3),
    ("NOTIMP", 4),
    ("REFUSED", 5),
    ("YXDOMAIN", 6),
    ("YXRRSET", 7),
    ("NXRRSET", 8),
    ("NOTAUTH", 9),
    ("NOTZONE", 10),
    ("BADVERS", 16),
];

/// Header flag names in wire bit order (most significant first).
pub const FLAG_NAMES: [&str; 7] = ["QR", "AA", "TC", "RD", "RA", "AD", "CD"];

pub fn rcode_to_text(rcode: ResponseCode) -> String {
    let value = u16::from(rcode);
    RCODES
        .iter()
        .find(|(_, v)| *v == value)
        .map(|(name, _)| (*name).to_string())
        .unwrap_or_else(|| format!("RCODE{}", value))
}

pub fn rcode_from_text(text: &str) -> Option<ResponseCode> {
    let upper = text.to_ascii_uppercase();
    RCODES
        .iter()
        .find(|(name, _)| *name == upper)
        .map(|(_, v)| <ResponseCode as From<u16>>::from(*v))
}

pub fn opcode_to_text(opcode: OpCode) -> String {
    match opcode {
        OpCode::Query => "QUERY".to_string(),
        OpCode::Status => "STATUS".to_string(),
        OpCode::Notify => "NOTIFY".to_string(),
        OpCode::Update => "UPDATE".to_string(),
        #[allow(unreachable_patterns)]
        other => format!("OPCODE{}", u8::from(other)),
    }
}

pub fn opcode_from_text(text: &str) -> Option<OpCode> {
    match text.to_ascii_uppercase().as_str() {
        "QUERY" => Some(OpCode::Query),
        "STATUS" => Some(OpCode::Status),
        "NOTIFY" => Some(OpCode::Notify),
        "UPDATE" => Some(OpCode::Update),
        _ => None,
    }
}

pub fn class_from_text(text: &str) -> Option<DNSClass> {
    match text.to_ascii_uppercase().as_str() {
        "IN" => Some(DNSClass::IN),
        "CH" => Some(DNSClass::CH),
        "HS" => Some(DNSClass::HS),
        "NONE" => Some(DNSClass::NONE),
        "ANY" => Some(DNSClass::ANY),
        _ => None,
    }
}

/// Header flags of `message` rendered as space separated names, e.g. `QR RD RA`.
pub fn flags_to_text(message: &Message) -> String {
    let set = [
        message.message_type() == hickory_proto::op::MessageType::Response,
        message.authoritative(),
        message.truncated(),
        message.recursion_desired(),
        message.recursion_available(),
        message.authentic_data(),
        message.checking_disabled(),
    ];
    FLAG_NAMES
        .iter()
        .zip(set)
        .filter(|(_, on)| *on)
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn hex(bytes: &[u8]) -> String {
    HEXLOWER.encode(bytes)
}

/// Hex digits in either case, whitespace between them ignored.
pub fn unhex(text: &str) -> Option<Vec<u8>> {
    let digits: String = text.split_whitespace().collect();
    HEXLOWER_PERMISSIVE.decode(digits.as_bytes()).ok()
}

/// Skips one (possibly compressed) domain name in `wire` starting at `pos`,
/// returning the offset just past it.
pub fn skip_name(wire: &[u8], mut pos: usize) -> Option<usize> {
    loop {
        let len = *wire.get(pos)? as usize;
        if len == 0 {
            return Some(pos + 1);
        }
        if len & 0xC0 == 0xC0 {
            return Some(pos + 2);
        }
        pos += 1 + len;
    }
}

/// Type covered by an RRSIG record, read from the first two octets of its RDATA.
pub fn rrsig_covered(record: &Record) -> Option<RecordType> {
    if record.record_type() != RecordType::RRSIG {
        return None;
    }
    let wire = record.to_bytes().ok()?;
    let rdata = skip_name(&wire, 0)? + 10;
    let covered = u16::from_be_bytes([*wire.get(rdata)?, *wire.get(rdata + 1)?]);
    Some(RecordType::from(covered))
}

/// Every A/AAAA address carried in any section of `message`.
pub fn glue_addresses(message: &Message) -> Vec<IpAddr> {
    message
        .answers()
        .iter()
        .chain(message.name_servers())
        .chain(message.additionals())
        .filter_map(|record| match record.data() {
            RData::A(a) => Some(IpAddr::V4(a.0)),
            RData::AAAA(aaaa) => Some(IpAddr::V6(aaaa.0)),
            _ => None,
        })
        .collect()
}

pub fn records_to_text(records: &[Record]) -> String {
    if records.is_empty() {
        return "[]".to_string();
    }
    let lines: Vec<String> = records.iter().map(|r| r.to_string()).collect();
    format!("[{}]", lines.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::MessageType;

    #[test]
    fn test_rcode_names_round_trip() {
        assert_eq!(rcode_from_text("nxdomain"), Some(ResponseCode::NXDomain));
        assert_eq!(rcode_to_text(ResponseCode::ServFail), "SERVFAIL");
        assert_eq!(rcode_from_text("BOGUS"), None);
    }

    #[test]
    fn test_flags_to_text_follows_wire_order() {
        let mut message = Message::new(1, MessageType::Response, OpCode::Query);
        message.set_recursion_available(true);
        message.set_recursion_desired(true);
        message.set_authoritative(true);
        assert_eq!(flags_to_text(&message), "QR AA RD RA");
    }

    #[test]
    fn test_unhex_rejects_odd_length() {
        assert_eq!(unhex("abc"), None);
        assert_eq!(unhex("00 ff"), Some(vec![0x00, 0xff]));
        assert_eq!(unhex("DEad"), Some(vec![0xde, 0xad]));
    }

    #[test]
    fn test_unhex_rejects_non_ascii() {
        assert_eq!(unhex("aé0"), None);
        assert_eq!(unhex("ééff"), None);
    }

    #[test]
    fn test_rcode_above_four_bits() {
        assert_eq!(rcode_from_text("BADVERS").map(u16::from), Some(16));
        assert_eq!(rcode_to_text(ResponseCode::BADVERS), "BADVERS");
    }

    #[test]
    fn test_skip_name_handles_pointer() {
        let wire = [3, b'f', b'o', b'o', 0xC0, 0x0C, 0xFF];
        assert_eq!(skip_name(&wire, 0), Some(6));
    }
}
