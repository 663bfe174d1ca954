//! OSC 1.0 wire codec and the address routing table.
//!
//! Inbound packets are parsed with nom: single messages and `#bundle`
//! containers (recursively; the time tag is ignored, elements apply
//! immediately). `,i` is the canonical argument type; `,f` is accepted with
//! truncation since patching environments commonly emit floats. Outbound
//! traffic only ever needs single int32 messages.

use log::{debug, warn};
use nom::bytes::complete::{tag, take, take_till};
use nom::number::complete::{be_f32, be_i32, be_u32};
use nom::IResult;
use thiserror::Error;

use fibril_core::{ControlEvent, OutboundEvent};

#[derive(Error, Debug, PartialEq)]
pub enum OscError {
    #[error("packet truncated or misaligned")]
    Malformed,

    #[error("address is not valid UTF-8")]
    BadAddress,

    #[error("type tag string missing leading ','")]
    BadTypeTags,

    #[error("unsupported argument type '{0}'")]
    UnsupportedType(char),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OscArg {
    Int(i32),
    Float(f32),
}

impl OscArg {
    /// Integer view of the argument; floats are truncated.
    pub fn as_i32(self) -> i32 {
        match self {
            OscArg::Int(v) => v,
            OscArg::Float(v) => v as i32,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OscMessage {
    pub address: String,
    pub args: Vec<OscArg>,
}

/// OSC strings are null-terminated and padded so the total length is a
/// multiple of 4 (the terminator counts toward the padding).
fn osc_string(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (rest, s) = take_till(|b| b == 0)(input)?;
    let pad = 4 - s.len() % 4;
    let (rest, _) = take(pad)(rest)?;
    Ok((rest, s))
}

fn parse_message(input: &[u8]) -> Result<OscMessage, OscError> {
    let (input, address) = osc_string(input).map_err(|_| OscError::Malformed)?;
    let address = std::str::from_utf8(address)
        .map_err(|_| OscError::BadAddress)?
        .to_string();

    // A bare address with no type-tag string is tolerated as zero-arg.
    if input.is_empty() {
        return Ok(OscMessage { address, args: Vec::new() });
    }

    let (mut input, tags) = osc_string(input).map_err(|_| OscError::Malformed)?;
    let Some((&b',', types)) = tags.split_first() else {
        return Err(OscError::BadTypeTags);
    };

    let mut args = Vec::with_capacity(types.len());
    for &t in types {
        match t {
            b'i' => {
                let (rest, v) = be_i32::<_, nom::error::Error<&[u8]>>(input)
                    .map_err(|_| OscError::Malformed)?;
                input = rest;
                args.push(OscArg::Int(v));
            }
            b'f' => {
                let (rest, v) = be_f32::<_, nom::error::Error<&[u8]>>(input)
                    .map_err(|_| OscError::Malformed)?;
                input = rest;
                args.push(OscArg::Float(v));
            }
            other => return Err(OscError::UnsupportedType(other as char)),
        }
    }
    Ok(OscMessage { address, args })
}

fn parse_bundle(input: &[u8], out: &mut Vec<OscMessage>, depth: u8) -> Result<(), OscError> {
    let (input, _) = tag::<_, _, nom::error::Error<&[u8]>>(&b"#bundle\0"[..])(input)
        .map_err(|_| OscError::Malformed)?;
    // Time tag is ignored: bundle contents apply immediately.
    let (mut input, _) = take::<_, _, nom::error::Error<&[u8]>>(8usize)(input)
        .map_err(|_| OscError::Malformed)?;

    while !input.is_empty() {
        let (rest, size) = be_u32::<_, nom::error::Error<&[u8]>>(input)
            .map_err(|_| OscError::Malformed)?;
        let (rest, element) = take::<_, _, nom::error::Error<&[u8]>>(size as usize)(rest)
            .map_err(|_| OscError::Malformed)?;
        decode_into(element, out, depth + 1)?;
        input = rest;
    }
    Ok(())
}

fn decode_into(input: &[u8], out: &mut Vec<OscMessage>, depth: u8) -> Result<(), OscError> {
    if depth > 8 {
        return Err(OscError::Malformed);
    }
    if input.starts_with(b"#bundle\0") {
        parse_bundle(input, out, depth)
    } else {
        out.push(parse_message(input)?);
        Ok(())
    }
}

/// Decode one UDP datagram into its messages, flattening bundles.
pub fn decode(input: &[u8]) -> Result<Vec<OscMessage>, OscError> {
    let mut out = Vec::with_capacity(1);
    decode_into(input, &mut out, 0)?;
    Ok(out)
}

/// Encode a single-argument int32 message.
pub fn encode_message(address: &str, value: i32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(address.len() + 12);
    buf.extend_from_slice(address.as_bytes());
    buf.push(0);
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
    buf.extend_from_slice(b",i\0\0");
    buf.extend_from_slice(&value.to_be_bytes());
    buf
}

/// Wire form of one engine output event.
pub fn encode_event(event: &OutboundEvent) -> Vec<u8> {
    match *event {
        OutboundEvent::VoiceMidi { voice, midi } => {
            encode_message(&format!("/voice_{voice}_MIDI"), i32::from(midi))
        }
        OutboundEvent::VoiceVolume { voice, on } => {
            encode_message(&format!("/voice_{voice}_Volume"), i32::from(on))
        }
        OutboundEvent::ActiveCount(count) => encode_message("/active_count", count as i32),
    }
}

/// Map a decoded message onto the control surface. Returns None for
/// unknown addresses or hopeless payloads; the caller logs and drops.
pub fn route(msg: &OscMessage) -> Option<ControlEvent> {
    let value = match msg.args.first() {
        Some(arg) => {
            if let OscArg::Float(f) = arg {
                debug!("coercing float argument {f} on {}", msg.address);
            }
            arg.as_i32()
        }
        None => {
            warn!("message {} carries no argument", msg.address);
            return None;
        }
    };

    match msg.address.as_str() {
        "/sustain" => return Some(ControlEvent::Sustain(value != 0)),
        "/keyCenter" | "/key_center" => {
            return match u8::try_from(value) {
                Ok(midi) if midi <= 127 => Some(ControlEvent::KeyCenter(midi)),
                _ => {
                    warn!("key center {value} outside MIDI range");
                    None
                }
            };
        }
        _ => {}
    }

    // Rank addresses: /R{n}_{1000|0100|0010|0001|priority|tonicization}
    let rest = msg.address.strip_prefix("/R")?;
    let (number, suffix) = rest.split_once('_')?;
    let rank: u8 = number.parse().ok()?;

    let bit = |slot| ControlEvent::RankBit { rank, slot, value: u8::from(value != 0) };
    match suffix {
        "1000" => Some(bit(0)),
        "0100" => Some(bit(1)),
        "0010" => Some(bit(2)),
        "0001" => Some(bit(3)),
        "priority" => {
            let priority = u8::try_from(value).ok()?;
            Some(ControlEvent::RankPriority { rank, priority })
        }
        "tonicization" => {
            let tonicization = u8::try_from(value).ok()?;
            Some(ControlEvent::RankTonicization { rank, tonicization })
        }
        _ => None,
    }
}
