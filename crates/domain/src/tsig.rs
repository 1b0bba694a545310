//! TSIG signing (RFC 8945) for scripted queries and mock replies.
//!
//! Only HMAC-SHA256 is produced. Signing works on already encoded wire
//! messages so it can be applied to both structured and raw entries.

use crate::dns_text::skip_name;
use base64::Engine;
use hickory_proto::rr::Name;
use ring::hmac;

const TSIG_TYPE: u16 = 250;
const CLASS_ANY: u16 = 255;
const FUDGE: u16 = 300;
const ALGORITHM: &str = "hmac-sha256.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsigKey {
    pub name: Name,
    pub secret: Vec<u8>,
}

impl TsigKey {
    pub fn from_text(name: &str, secret: &str) -> Result<Self, String> {
        let name = Name::from_ascii(name)
            .map_err(|e| format!("invalid TSIG key name '{}': {}", name, e))?;
        let secret = base64::engine::general_purpose::STANDARD
            .decode(secret)
            .map_err(|e| format!("invalid TSIG secret: {}", e))?;
        Ok(Self {
            name: name.to_lowercase(),
            secret,
        })
    }

    /// Appends a TSIG record to `wire` and bumps ARCOUNT. `request_mac` is the
    /// MAC of the query when signing a response.
    pub fn sign(&self, wire: &[u8], request_mac: Option<&[u8]>, time_signed: u64) -> Vec<u8> {
        if wire.len() < 12 {
            return wire.to_vec();
        }
        let key_name = name_wire(&self.name);
        let algorithm = Name::from_ascii(ALGORITHM)
            .map(|n| name_wire(&n))
            .unwrap_or_default();
        let time = &time_signed.to_be_bytes()[2..];

        let mut digest_input = Vec::with_capacity(wire.len() + 64);
        if let Some(mac) = request_mac {
            digest_input.extend_from_slice(&(mac.len() as u16).to_be_bytes());
            digest_input.extend_from_slice(mac);
        }
        digest_input.extend_from_slice(wire);
        digest_input.extend_from_slice(&key_name);
        digest_input.extend_from_slice(&CLASS_ANY.to_be_bytes());
        digest_input.extend_from_slice(&0u32.to_be_bytes());
        digest_input.extend_from_slice(&algorithm);
        digest_input.extend_from_slice(time);
        digest_input.extend_from_slice(&FUDGE.to_be_bytes());
        digest_input.extend_from_slice(&0u16.to_be_bytes());
        digest_input.extend_from_slice(&0u16.to_be_bytes());

        let key = hmac::Key::new(hmac::HMAC_SHA256, &self.secret);
        let mac = hmac::sign(&key, &digest_input);
        let mac = mac.as_ref();

        let mut rdata = Vec::with_capacity(algorithm.len() + mac.len() + 16);
        rdata.extend_from_slice(&algorithm);
        rdata.extend_from_slice(time);
        rdata.extend_from_slice(&FUDGE.to_be_bytes());
        rdata.extend_from_slice(&(mac.len() as u16).to_be_bytes());
        rdata.extend_from_slice(mac);
        rdata.extend_from_slice(&wire[0..2]);
        rdata.extend_from_slice(&0u16.to_be_bytes());
        rdata.extend_from_slice(&0u16.to_be_bytes());

        let mut signed = wire.to_vec();
        signed.extend_from_slice(&key_name);
        signed.extend_from_slice(&TSIG_TYPE.to_be_bytes());
        signed.extend_from_slice(&CLASS_ANY.to_be_bytes());
        signed.extend_from_slice(&0u32.to_be_bytes());
        signed.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        signed.extend_from_slice(&rdata);

        let arcount = u16::from_be_bytes([signed[10], signed[11]]).wrapping_add(1);
        signed[10..12].copy_from_slice(&arcount.to_be_bytes());
        signed
    }
}

/// Uncompressed, lower-cased wire form of `name`.
fn name_wire(name: &Name) -> Vec<u8> {
    let mut out = Vec::new();
    for label in name.iter() {
        out.push(label.len() as u8);
        out.extend(label.iter().map(|b| b.to_ascii_lowercase()));
    }
    out.push(0);
    out
}

/// MAC of the TSIG record closing `wire`, if the message is signed.
pub fn request_mac(wire: &[u8]) -> Option<Vec<u8>> {
    let count = |at: usize| -> Option<usize> {
        Some(u16::from_be_bytes([*wire.get(at)?, *wire.get(at + 1)?]) as usize)
    };
    let (qd, an, ns, ar) = (count(4)?, count(6)?, count(8)?, count(10)?);
    if ar == 0 {
        return None;
    }
    let mut pos = 12;
    for _ in 0..qd {
        pos = skip_name(wire, pos)? + 4;
    }
    let mut last = None;
    for _ in 0..an + ns + ar {
        let start = skip_name(wire, pos)?;
        let rtype = count(start)?;
        let rdlen = count(start + 8)?;
        last = Some((rtype, start + 10));
        pos = start + 10 + rdlen;
    }
    let (rtype, rdata) = last?;
    if rtype != TSIG_TYPE as usize {
        return None;
    }
    let mac_len_at = skip_name(wire, rdata)? + 8;
    let mac_len = count(mac_len_at)?;
    wire.get(mac_len_at + 2..mac_len_at + 2 + mac_len)
        .map(|mac| mac.to_vec())
}
