//! Presentation-format resource records.
//!
//! RR lines are compiled to uncompressed wire form and handed to the codec,
//! so every type the codec understands decodes to its structured RDATA and
//! anything else survives as opaque data.

use base64::Engine;
use chrono::NaiveDateTime;
use data_encoding::BASE32HEX_NOPAD;
use ferrous_replay_domain::dns_text::{class_from_text, unhex};
use hickory_proto::op::Query;
use hickory_proto::rr::{DNSClass, Name, Record, RecordType};
use hickory_proto::serialize::binary::BinDecodable;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// TTL of records that do not name one.
pub(crate) const DEFAULT_TTL: u32 = 3600;

pub(crate) type RecordResult<T> = Result<T, String>;

pub(crate) fn parse_name(token: &str, origin: &Name) -> RecordResult<Name> {
    if token == "@" {
        return Ok(origin.clone());
    }
    let name =
        Name::from_ascii(token).map_err(|e| format!("invalid domain name '{}': {}", token, e))?;
    if name.is_fqdn() {
        Ok(name)
    } else {
        name.append_domain(origin)
            .map_err(|e| format!("invalid domain name '{}': {}", token, e))
    }
}

pub(crate) fn parse_type(token: &str) -> RecordResult<RecordType> {
    let upper = token.to_ascii_uppercase();
    if let Some(code) = upper.strip_prefix("TYPE") {
        if let Ok(code) = code.parse::<u16>() {
            return Ok(RecordType::from(code));
        }
    }
    RecordType::from_str(&upper).map_err(|_| format!("unknown record type '{}'", token))
}

fn parse_class(token: &str) -> Option<DNSClass> {
    class_from_text(token)
}

/// `<owner> [class] <type>`
pub(crate) fn parse_question(tokens: &[String], origin: &Name) -> RecordResult<Query> {
    let (owner, rest) = tokens
        .split_first()
        .ok_or_else(|| "empty question line".to_string())?;
    let name = parse_name(owner, origin)?;
    let mut class = DNSClass::IN;
    let mut rtype = None;
    for token in rest {
        if let Some(c) = parse_class(token) {
            class = c;
        } else if rtype.is_none() {
            rtype = Some(parse_type(token)?);
        } else {
            return Err(format!("unexpected token '{}' in question", token));
        }
    }
    let rtype = rtype.ok_or_else(|| format!("question for '{}' has no type", owner))?;
    let mut query = Query::query(name, rtype);
    query.set_query_class(class);
    Ok(query)
}

/// `<owner> [ttl] [class] <type> <rdata...>`; ttl and class may come in either order.
pub(crate) fn parse_record(tokens: &[String], origin: &Name) -> RecordResult<Record> {
    let (owner, rest) = tokens
        .split_first()
        .ok_or_else(|| "empty record line".to_string())?;
    let name = parse_name(owner, origin)?;

    let mut ttl = DEFAULT_TTL;
    let mut class = DNSClass::IN;
    let mut pos = 0;
    while let Some(token) = rest.get(pos) {
        if let Ok(value) = token.parse::<u32>() {
            ttl = value;
        } else if let Some(c) = parse_class(token) {
            class = c;
        } else {
            break;
        }
        pos += 1;
    }
    let type_token = rest
        .get(pos)
        .ok_or_else(|| format!("record '{}' has no type", owner))?;
    let rtype = parse_type(type_token)?;
    let rdata_tokens: Vec<&str> = rest[pos + 1..]
        .iter()
        .map(String::as_str)
        .filter(|t| *t != "(" && *t != ")")
        .collect();

    let rdata = rdata_wire(rtype, &rdata_tokens, origin)?;
    if rdata.len() > u16::MAX as usize {
        return Err(format!("RDATA of '{}' too long", owner));
    }

    let mut wire = name_wire(&name);
    wire.extend_from_slice(&u16::from(rtype).to_be_bytes());
    wire.extend_from_slice(&u16::from(class).to_be_bytes());
    wire.extend_from_slice(&ttl.to_be_bytes());
    wire.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
    wire.extend_from_slice(&rdata);

    Record::from_bytes(&wire).map_err(|e| format!("invalid {} record: {}", rtype, e))
}

/// Uncompressed wire form keeping the label case as written.
pub(crate) fn name_wire(name: &Name) -> Vec<u8> {
    let mut out = Vec::with_capacity(name.len() + 1);
    for label in name.iter() {
        out.push(label.len() as u8);
        out.extend_from_slice(label);
    }
    out.push(0);
    out
}

struct Rdata<'a> {
    tokens: &'a [&'a str],
    pos: usize,
    origin: &'a Name,
    out: Vec<u8>,
}

impl<'a> Rdata<'a> {
    fn next(&mut self, what: &str) -> RecordResult<&'a str> {
        let token = self
            .tokens
            .get(self.pos)
            .copied()
            .ok_or_else(|| format!("missing {} in RDATA", what))?;
        self.pos += 1;
        Ok(token)
    }

    fn rest(&mut self) -> String {
        let joined = self.tokens[self.pos.min(self.tokens.len())..].concat();
        self.pos = self.tokens.len();
        joined
    }

    fn number<T: FromStr>(&mut self, what: &str) -> RecordResult<T> {
        let token = self.next(what)?;
        token
            .parse()
            .map_err(|_| format!("invalid {} '{}'", what, token))
    }

    fn u8(&mut self, what: &str) -> RecordResult<()> {
        let value: u8 = self.number(what)?;
        self.out.push(value);
        Ok(())
    }

    fn u16(&mut self, what: &str) -> RecordResult<()> {
        let value: u16 = self.number(what)?;
        self.out.extend_from_slice(&value.to_be_bytes());
        Ok(())
    }

    fn u32(&mut self, what: &str) -> RecordResult<()> {
        let value: u32 = self.number(what)?;
        self.out.extend_from_slice(&value.to_be_bytes());
        Ok(())
    }

    fn name(&mut self) -> RecordResult<()> {
        let token = self.next("domain name")?;
        let name = parse_name(token, self.origin)?;
        self.out.extend(name_wire(&name));
        Ok(())
    }

    fn rtype(&mut self) -> RecordResult<()> {
        let rtype = parse_type(self.next("record type")?)?;
        self.out.extend_from_slice(&u16::from(rtype).to_be_bytes());
        Ok(())
    }

    fn timestamp(&mut self) -> RecordResult<()> {
        let token = self.next("signature time")?;
        let value = if token.len() == 14 {
            NaiveDateTime::parse_from_str(token, "%Y%m%d%H%M%S")
                .map(|t| t.and_utc().timestamp() as u32)
                .map_err(|e| format!("invalid signature time '{}': {}", token, e))?
        } else {
            token
                .parse::<u32>()
                .map_err(|_| format!("invalid signature time '{}'", token))?
        };
        self.out.extend_from_slice(&value.to_be_bytes());
        Ok(())
    }

    fn character_string(&mut self, token: &str) -> RecordResult<()> {
        let inner = token
            .strip_prefix('"')
            .and_then(|t| t.strip_suffix('"'))
            .unwrap_or(token);
        let bytes = unescape(inner)?;
        for chunk in bytes.chunks(255) {
            self.out.push(chunk.len() as u8);
            self.out.extend_from_slice(chunk);
        }
        if bytes.is_empty() {
            self.out.push(0);
        }
        Ok(())
    }

    fn hex_rest(&mut self) -> RecordResult<()> {
        let text = self.rest();
        let bytes = unhex(&text).ok_or_else(|| format!("invalid hex data '{}'", text))?;
        self.out.extend(bytes);
        Ok(())
    }

    fn base64_rest(&mut self) -> RecordResult<()> {
        let text = self.rest();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(text.as_bytes())
            .map_err(|e| format!("invalid base64 data: {}", e))?;
        self.out.extend(bytes);
        Ok(())
    }

    fn type_bitmap(&mut self) -> RecordResult<()> {
        let mut types = Vec::new();
        while self.pos < self.tokens.len() {
            types.push(u16::from(parse_type(self.next("record type")?)?));
        }
        self.out.extend(type_bitmap(&types));
        Ok(())
    }

    fn finish(self) -> RecordResult<Vec<u8>> {
        if self.pos < self.tokens.len() {
            return Err(format!(
                "unexpected RDATA '{}'",
                self.tokens[self.pos..].join(" ")
            ));
        }
        Ok(self.out)
    }
}

fn rdata_wire(rtype: RecordType, tokens: &[&str], origin: &Name) -> RecordResult<Vec<u8>> {
    let mut rd = Rdata {
        tokens,
        pos: 0,
        origin,
        out: Vec::new(),
    };

    if tokens.first() == Some(&"\\#") {
        rd.pos = 1;
        let len: usize = rd.number("RDATA length")?;
        rd.hex_rest()?;
        if rd.out.len() != len {
            return Err(format!(
                "generic RDATA length {} does not match {} octets",
                len,
                rd.out.len()
            ));
        }
        return rd.finish();
    }

    match rtype {
        RecordType::A => {
            let token = rd.next("IPv4 address")?;
            let addr = Ipv4Addr::from_str(token)
                .map_err(|_| format!("invalid IPv4 address '{}'", token))?;
            rd.out.extend_from_slice(&addr.octets());
        }
        RecordType::AAAA => {
            let token = rd.next("IPv6 address")?;
            let addr = Ipv6Addr::from_str(token)
                .map_err(|_| format!("invalid IPv6 address '{}'", token))?;
            rd.out.extend_from_slice(&addr.octets());
        }
        RecordType::NS | RecordType::CNAME | RecordType::PTR | RecordType::ANAME => rd.name()?,
        RecordType::MX => {
            rd.u16("preference")?;
            rd.name()?;
        }
        RecordType::SOA => {
            rd.name()?;
            rd.name()?;
            for field in ["serial", "refresh", "retry", "expire", "minimum"] {
                rd.u32(field)?;
            }
        }
        RecordType::SRV => {
            rd.u16("priority")?;
            rd.u16("weight")?;
            rd.u16("port")?;
            rd.name()?;
        }
        RecordType::TXT | RecordType::HINFO => {
            while rd.pos < tokens.len() {
                let token = rd.next("character string")?;
                rd.character_string(token)?;
            }
        }
        RecordType::DS => {
            rd.u16("key tag")?;
            rd.u8("algorithm")?;
            rd.u8("digest type")?;
            rd.hex_rest()?;
        }
        RecordType::DNSKEY => {
            rd.u16("flags")?;
            rd.u8("protocol")?;
            rd.u8("algorithm")?;
            rd.base64_rest()?;
        }
        RecordType::RRSIG => {
            rd.rtype()?;
            rd.u8("algorithm")?;
            rd.u8("labels")?;
            rd.u32("original ttl")?;
            rd.timestamp()?;
            rd.timestamp()?;
            rd.u16("key tag")?;
            rd.name()?;
            rd.base64_rest()?;
        }
        RecordType::NSEC => {
            rd.name()?;
            rd.type_bitmap()?;
        }
        RecordType::NSEC3 => {
            rd.u8("hash algorithm")?;
            rd.u8("flags")?;
            rd.u16("iterations")?;
            salt(&mut rd)?;
            let token = rd.next("next hashed owner")?;
            let hash = base32hex_decode(token)
                .ok_or_else(|| format!("invalid base32hex '{}'", token))?;
            rd.out.push(hash.len() as u8);
            rd.out.extend(hash);
            rd.type_bitmap()?;
        }
        RecordType::NSEC3PARAM => {
            rd.u8("hash algorithm")?;
            rd.u8("flags")?;
            rd.u16("iterations")?;
            salt(&mut rd)?;
        }
        other if u16::from(other) == 39 => rd.name()?, // DNAME
        other => {
            return Err(format!(
                "no presentation parser for {}, use '\\# <len> <hex>'",
                other
            ))
        }
    }
    rd.finish()
}

fn salt(rd: &mut Rdata<'_>) -> RecordResult<()> {
    let token = rd.next("salt")?;
    if token == "-" {
        rd.out.push(0);
        return Ok(());
    }
    let salt = unhex(token).ok_or_else(|| format!("invalid salt '{}'", token))?;
    rd.out.push(salt.len() as u8);
    rd.out.extend(salt);
    Ok(())
}

/// RFC 4034 §4.1.2 window blocks.
fn type_bitmap(types: &[u16]) -> Vec<u8> {
    let mut sorted = types.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut out = Vec::new();
    let mut index = 0;
    while index < sorted.len() {
        let window = (sorted[index] >> 8) as u8;
        let mut bitmap = [0u8; 32];
        let mut used = 0;
        while index < sorted.len() && (sorted[index] >> 8) as u8 == window {
            let low = (sorted[index] & 0xff) as usize;
            bitmap[low / 8] |= 0x80 >> (low % 8);
            used = low / 8 + 1;
            index += 1;
        }
        out.push(window);
        out.push(used as u8);
        out.extend_from_slice(&bitmap[..used]);
    }
    out
}

fn base32hex_decode(text: &str) -> Option<Vec<u8>> {
    let digits = text.trim_end_matches('=').to_ascii_uppercase();
    BASE32HEX_NOPAD.decode(digits.as_bytes()).ok()
}

/// Resolves `\"`, `\\` and `\DDD` escapes of a character-string.
fn unescape(text: &str) -> RecordResult<Vec<u8>> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let digits = bytes.get(i + 1..i + 4).filter(|d| d.iter().all(u8::is_ascii_digit));
        if let Some(digits) = digits {
            let value = std::str::from_utf8(digits)
                .ok()
                .and_then(|d| d.parse::<u8>().ok())
                .ok_or_else(|| format!("invalid escape in '{}'", text))?;
            out.push(value);
            i += 4;
        } else {
            let escaped = bytes
                .get(i + 1)
                .ok_or_else(|| format!("dangling escape in '{}'", text))?;
            out.push(*escaped);
            i += 2;
        }
    }
    Ok(out)
}
