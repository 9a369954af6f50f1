/*!
All deserialization routines for the OpenFlow message primitives

The header uses a special deserialization because its size is known.
Use the trait `Deserialize` for any other deserialization implementation.
Variable sized primitives are read from a `Cursor`; any inconsistent
inner length makes the whole message a `OfpBadRequestCode::BadLen`.
*/

use byteorder::{ByteOrder, NetworkEndian, ReadBytesExt};
use openflow::error::{Error, Result};
use openflow::messages::*;

use std::io;
use std::io::{Cursor, Read};

impl OfpHeader {
    /// Deserializes an OpenFlow header
    pub fn deserialize(bytes: &[u8; 8]) -> OfpHeader {
        OfpHeader {
            version: bytes[0],
            typ: bytes[1],
            length: NetworkEndian::read_u16(&bytes[2..4]),
            xid: NetworkEndian::read_u32(&bytes[4..]),
        }
    }
}

/// To be implemented by all OpenFlow message parts that are received.
pub trait Deserialize {
    /// The type to deserialize
    type R;

    /// Deserialize the bytes buffer
    /// Fails on providing a too small or too large buffer
    fn deserialize(bytes: Vec<u8>) -> Result<Self::R> {
        if Self::min_length() > bytes.len() || Self::max_length() < bytes.len() {
            return Err(Error::BadRequest(OfpBadRequestCode::BadLen, bytes));
        }
        Self::deserialize_len_ok(bytes)
    }

    /// Deserializes the byte buffer (network byte order)
    /// Implementers can rely on the bytes buffer's size to be greater or equal Self::min_length()
    fn deserialize_len_ok(bytes: Vec<u8>) -> Result<Self::R>;

    /// The minimum length of the message part in bytes
    fn min_length() -> usize;

    /// The maximum length of the message part in bytes
    /// May not return a value greater than 0xFFF7
    /// If Self::R is fixed size, you probably have to
    /// override this implementation.
    fn max_length() -> usize {
        0xffff - OfpHeader::header_length()
    }
}

fn malformed(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, what)
}

/// Runs a cursor based parser and turns any read error into `BadLen`
fn parse_with<T, F>(bytes: Vec<u8>, parser: F) -> Result<T>
where
    F: FnOnce(&mut Cursor<&[u8]>) -> io::Result<T>,
{
    let parsed = parser(&mut Cursor::new(&bytes[..]));
    parsed.map_err(|e| {
        debug!("Malformed message body: {}", e);
        Error::BadRequest(OfpBadRequestCode::BadLen, bytes)
    })
}

fn read_vec(cursor: &mut Cursor<&[u8]>, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0; len];
    cursor.read_exact(&mut buf)?;
    Ok(buf)
}

fn remaining(cursor: &Cursor<&[u8]>) -> usize {
    cursor.get_ref().len().saturating_sub(cursor.position() as usize)
}

fn ensure(body: &[u8], len: usize, what: &str) -> io::Result<()> {
    if body.len() < len {
        return Err(malformed(what));
    }
    Ok(())
}

fn parse_oxm(cursor: &mut Cursor<&[u8]>) -> io::Result<OfpOxmTlv> {
    let header = cursor.read_u32::<NetworkEndian>()?;
    let body = read_vec(cursor, (header & 0xff) as usize)?;
    Ok(OfpOxmTlv {
        class: (header >> 16) as u16,
        field: ((header >> 9) & 0x7f) as u8,
        hasmask: (header >> 8) & 1 == 1,
        body,
    })
}

fn parse_match(cursor: &mut Cursor<&[u8]>) -> io::Result<OfpMatch> {
    let typ = cursor.read_u16::<NetworkEndian>()?;
    let length = cursor.read_u16::<NetworkEndian>()? as usize;
    if length < 4 {
        return Err(malformed("match shorter than its header"));
    }
    let fields = read_vec(cursor, length - 4)?;
    let mut oxm_cursor = Cursor::new(&fields[..]);
    let mut oxm_fields = vec![];
    while remaining(&oxm_cursor) > 0 {
        oxm_fields.push(parse_oxm(&mut oxm_cursor)?);
    }
    read_vec(cursor, (length + 7) / 8 * 8 - length)?;
    Ok(OfpMatch { typ, oxm_fields })
}

/// Reads one TLV shaped element (type, length, body) as used by actions and instructions
fn read_tlv(cursor: &mut Cursor<&[u8]>) -> io::Result<(u16, Vec<u8>)> {
    let typ = cursor.read_u16::<NetworkEndian>()?;
    let len = cursor.read_u16::<NetworkEndian>()? as usize;
    if len < 4 {
        return Err(malformed("element shorter than its header"));
    }
    Ok((typ, read_vec(cursor, len - 4)?))
}

fn parse_actions(bytes: &[u8]) -> io::Result<Vec<OfpAction>> {
    let mut cursor = Cursor::new(bytes);
    let mut actions = vec![];
    while remaining(&cursor) > 0 {
        let (typ, body) = read_tlv(&mut cursor)?;
        let action = if typ == OfpActionType::Output as u16 {
            ensure(&body, 6, "output action")?;
            OfpAction::Output {
                port: NetworkEndian::read_u32(&body[0..4]),
                max_len: NetworkEndian::read_u16(&body[4..6]),
            }
        }
        else if typ == OfpActionType::PushVlan as u16 {
            ensure(&body, 2, "push vlan action")?;
            OfpAction::PushVlan(NetworkEndian::read_u16(&body[0..2]))
        }
        else if typ == OfpActionType::PopVlan as u16 {
            OfpAction::PopVlan
        }
        else if typ == OfpActionType::Group as u16 {
            ensure(&body, 4, "group action")?;
            OfpAction::Group(NetworkEndian::read_u32(&body[0..4]))
        }
        else if typ == OfpActionType::SetField as u16 {
            OfpAction::SetField(parse_oxm(&mut Cursor::new(&body[..]))?)
        }
        else {
            OfpAction::Other { typ, body }
        };
        actions.push(action);
    }
    Ok(actions)
}

fn parse_instructions(bytes: &[u8]) -> io::Result<Vec<OfpInstruction>> {
    let mut cursor = Cursor::new(bytes);
    let mut instructions = vec![];
    while remaining(&cursor) > 0 {
        let (typ, body) = read_tlv(&mut cursor)?;
        let instruction = if typ == OfpInstructionType::GotoTable as u16 {
            ensure(&body, 1, "goto table instruction")?;
            OfpInstruction::GotoTable(body[0])
        }
        else if typ == OfpInstructionType::ApplyActions as u16 {
            ensure(&body, 4, "apply actions instruction")?;
            OfpInstruction::ApplyActions(parse_actions(&body[4..])?)
        }
        else if typ == OfpInstructionType::Meter as u16 {
            ensure(&body, 4, "meter instruction")?;
            OfpInstruction::Meter(NetworkEndian::read_u32(&body[0..4]))
        }
        else {
            OfpInstruction::Other { typ, body }
        };
        instructions.push(instruction);
    }
    Ok(instructions)
}

fn parse_bucket(cursor: &mut Cursor<&[u8]>) -> io::Result<OfpBucket> {
    let len = cursor.read_u16::<NetworkEndian>()? as usize;
    if len < 16 {
        return Err(malformed("bucket shorter than its header"));
    }
    let weight = cursor.read_u16::<NetworkEndian>()?;
    let watch_port = cursor.read_u32::<NetworkEndian>()?;
    let watch_group = cursor.read_u32::<NetworkEndian>()?;
    read_vec(cursor, 4)?;
    let actions = read_vec(cursor, len - 16)?;
    Ok(OfpBucket {
        weight,
        watch_port,
        watch_group,
        actions: parse_actions(&actions)?,
    })
}

impl Deserialize for OfpHello {
    type R = OfpHello;

    fn deserialize_len_ok(bytes: Vec<u8>) -> Result<Self::R> {
        // Only the version bitmap element is of interest
        let bitmap = if bytes.len() >= 8 && NetworkEndian::read_u16(&bytes[0..2]) == 1 {
            NetworkEndian::read_u32(&bytes[4..8])
        }
        else {
            0
        };
        Ok(OfpHello { bitmap })
    }

    fn min_length() -> usize {
        0
    }
}

impl OfpHello {
    /// Checks whether the peer offers OpenFlow 1.3.
    /// A Hello without version bitmap offers its header version only.
    pub fn supports(&self, header_version: u8) -> bool {
        if self.bitmap == 0 {
            header_version >= OFP_VERSION
        }
        else {
            self.bitmap & (1 << OFP_VERSION) != 0
        }
    }
}

impl Deserialize for OfpEchoRequest {
    type R = OfpEchoRequest;

    fn deserialize_len_ok(bytes: Vec<u8>) -> Result<Self::R> {
        Ok(OfpEchoRequest { arbitrary: bytes })
    }

    fn min_length() -> usize {
        0
    }
}

impl Deserialize for OfpErrorMsg {
    type R = OfpErrorMsg;

    fn deserialize_len_ok(bytes: Vec<u8>) -> Result<Self::R> {
        let typ = NetworkEndian::read_u16(&bytes[0..2]);
        let code = NetworkEndian::read_u16(&bytes[2..4]);
        Ok(OfpErrorMsg {
            typ: typ,
            code: code,
            data: bytes[4..].to_vec(),
        })
    }

    fn min_length() -> usize {
        4
    }
}

impl Deserialize for OfpFlowMod {
    type R = OfpFlowMod;

    fn deserialize_len_ok(bytes: Vec<u8>) -> Result<Self::R> {
        parse_with(bytes, |c| {
            let cookie = c.read_u64::<NetworkEndian>()?;
            let cookie_mask = c.read_u64::<NetworkEndian>()?;
            let table_id = c.read_u8()?;
            let command = c.read_u8()?;
            let idle_timeout = c.read_u16::<NetworkEndian>()?;
            let hard_timeout = c.read_u16::<NetworkEndian>()?;
            let priority = c.read_u16::<NetworkEndian>()?;
            let buffer_id = c.read_u32::<NetworkEndian>()?;
            let out_port = c.read_u32::<NetworkEndian>()?;
            let out_group = c.read_u32::<NetworkEndian>()?;
            let flags = c.read_u16::<NetworkEndian>()?;
            c.read_u16::<NetworkEndian>()?;
            let match_field = parse_match(c)?;
            let rest_len = remaining(c);
            let rest = read_vec(c, rest_len)?;
            Ok(OfpFlowMod {
                cookie,
                cookie_mask,
                table_id,
                command,
                idle_timeout,
                hard_timeout,
                priority,
                buffer_id,
                out_port,
                out_group,
                flags,
                match_field,
                instructions: parse_instructions(&rest)?,
            })
        })
    }

    fn min_length() -> usize {
        // fixed part and an empty, padded match
        40 + 8
    }
}

impl Deserialize for OfpMeterMod {
    type R = OfpMeterMod;

    fn deserialize_len_ok(bytes: Vec<u8>) -> Result<Self::R> {
        parse_with(bytes, |c| {
            let command = c.read_u16::<NetworkEndian>()?;
            let flags = c.read_u16::<NetworkEndian>()?;
            let meter_id = c.read_u32::<NetworkEndian>()?;
            let mut bands = vec![];
            while remaining(c) > 0 {
                let typ = c.read_u16::<NetworkEndian>()?;
                let len = c.read_u16::<NetworkEndian>()? as usize;
                if len < 12 {
                    return Err(malformed("meter band shorter than its header"));
                }
                let rate = c.read_u32::<NetworkEndian>()?;
                let burst_size = c.read_u32::<NetworkEndian>()?;
                read_vec(c, len - 12)?;
                bands.push(OfpMeterBand {
                    typ,
                    rate,
                    burst_size,
                });
            }
            Ok(OfpMeterMod {
                command,
                flags,
                meter_id,
                bands,
            })
        })
    }

    fn min_length() -> usize {
        8
    }
}

impl Deserialize for OfpGroupMod {
    type R = OfpGroupMod;

    fn deserialize_len_ok(bytes: Vec<u8>) -> Result<Self::R> {
        parse_with(bytes, |c| {
            let command = c.read_u16::<NetworkEndian>()?;
            let typ = c.read_u8()?;
            c.read_u8()?;
            let group_id = c.read_u32::<NetworkEndian>()?;
            let mut buckets = vec![];
            while remaining(c) > 0 {
                buckets.push(parse_bucket(c)?);
            }
            Ok(OfpGroupMod {
                command,
                typ,
                group_id,
                buckets,
            })
        })
    }

    fn min_length() -> usize {
        8
    }
}

impl Deserialize for OfpMultipartRequest {
    type R = OfpMultipartRequest;

    fn deserialize_len_ok(bytes: Vec<u8>) -> Result<Self::R> {
        Ok(OfpMultipartRequest {
            typ: NetworkEndian::read_u16(&bytes[0..2]),
            flags: NetworkEndian::read_u16(&bytes[2..4]),
            body: bytes[8..].to_vec(),
        })
    }

    fn min_length() -> usize {
        8
    }
}

impl Deserialize for OfpRoleRequest {
    type R = OfpRoleRequest;

    fn deserialize_len_ok(bytes: Vec<u8>) -> Result<Self::R> {
        Ok(OfpRoleRequest {
            role: NetworkEndian::read_u32(&bytes[0..4]),
            generation_id: NetworkEndian::read_u64(&bytes[8..16]),
        })
    }

    fn min_length() -> usize {
        16
    }

    fn max_length() -> usize {
        16
    }
}
