/*!
All serialization and construction routines for the OpenFlow message primitives

Use the trait `OfpPacket` for serialization implementations of messages
that are sent. Other primitives that are part of a message should
implement a serialize funtion that operates on a given byte stream.
*/

use byteorder::{NetworkEndian, WriteBytesExt};
use openflow::messages::*;
use std::io;
use std::io::Write;
use std::mem;
use std::mem::size_of;

const DESC_STR_LEN: usize = 256;
const SERIAL_NUM_LEN: usize = 32;
const MAX_PORT_NAME_LEN: usize = 16;

impl OfpHeader {
    /// Constructs an `OfpHeader`
    pub fn new(typ: OfpType, xid: u32) -> OfpHeader {
        OfpHeader {
            version: OFP_VERSION,
            typ: typ as u8,
            length: OfpHeader::header_length() as u16,
            xid: xid,
        }
    }

    /// Returns the fixed header length of 8 (in byte)
    pub fn header_length() -> usize {
        size_of::<OfpHeader>()
    }

    /// Returns the body length in byte
    pub fn body_length(&self) -> usize {
        (self.length as usize).saturating_sub(OfpHeader::header_length())
    }

    /// Serializes this header on the given stream
    pub fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_all(&[self.version, self.typ])?;
        stream.write_u16::<NetworkEndian>(self.length)?;
        stream.write_u32::<NetworkEndian>(self.xid)
    }
}

/// Writes `s` NUL-padded into a field of `width` bytes, keeping a trailing NUL
fn write_fixed_str<S: Write>(stream: &mut S, s: &str, width: usize) -> io::Result<()> {
    let mut field = vec![0; width];
    let bytes = s.as_bytes();
    let len = bytes.len().min(width - 1);
    field[..len].copy_from_slice(&bytes[..len]);
    stream.write_all(&field)
}

impl OfpMatch {
    /// Constructs an empty match.
    pub fn new() -> OfpMatch {
        OfpMatch {
            typ: OfpMatchType::Oxm as u16,
            oxm_fields: vec![],
        }
    }

    /// Adds a single match field to the match.
    pub fn add_tlv(&mut self, oxm_tlv: OfpOxmTlv) -> &mut OfpMatch {
        self.oxm_fields.push(oxm_tlv);
        self
    }

    /// Length of OfpMatch (excluding padding)
    fn length(&self) -> usize {
        let mut length = 4;
        for oxm in &self.oxm_fields {
            length += oxm.length();
        }
        length
    }

    /// Padding of OfpMatch
    fn pad_len(&self) -> usize {
        let len = self.length();
        (len + 7) / 8 * 8 - len
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u16::<NetworkEndian>(self.typ)?;
        stream.write_u16::<NetworkEndian>(self.length() as u16)?;
        for oxm in &self.oxm_fields {
            oxm.serialize(stream)?;
        }
        // make its overall size a multiple of 8; fill with zeros
        stream.write_all(&vec![0; self.pad_len()])
    }
}

impl OfpOxmTlv {
    fn length(&self) -> usize {
        4 + self.body.len()
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        let class = u32::from(self.class);
        let hasmask_u32 = if self.hasmask { 1 } else { 0 };
        let header = (class << 16) | (u32::from(self.field) << 9) | (hasmask_u32 << 8)
            | self.body.len() as u32;
        stream.write_u32::<NetworkEndian>(header)?;
        stream.write_all(&self.body)
    }
}

impl OfpAction {
    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        match *self {
            OfpAction::Output { port, max_len } => {
                stream.write_u16::<NetworkEndian>(OfpActionType::Output as u16)?;
                stream.write_u16::<NetworkEndian>(16)?;
                stream.write_u32::<NetworkEndian>(port)?;
                stream.write_u16::<NetworkEndian>(max_len)?;
                stream.write_all(&[0; 6])
            }
            OfpAction::PushVlan(ethertype) => {
                stream.write_u16::<NetworkEndian>(OfpActionType::PushVlan as u16)?;
                stream.write_u16::<NetworkEndian>(8)?;
                stream.write_u16::<NetworkEndian>(ethertype)?;
                stream.write_all(&[0; 2])
            }
            OfpAction::PopVlan => {
                stream.write_u16::<NetworkEndian>(OfpActionType::PopVlan as u16)?;
                stream.write_u16::<NetworkEndian>(8)?;
                stream.write_all(&[0; 4])
            }
            OfpAction::Group(group_id) => {
                stream.write_u16::<NetworkEndian>(OfpActionType::Group as u16)?;
                stream.write_u16::<NetworkEndian>(8)?;
                stream.write_u32::<NetworkEndian>(group_id)
            }
            OfpAction::SetField(ref oxm) => {
                // the action is padded to 64 bits including its own header
                let len = (4 + oxm.length() + 7) / 8 * 8;
                stream.write_u16::<NetworkEndian>(OfpActionType::SetField as u16)?;
                stream.write_u16::<NetworkEndian>(len as u16)?;
                oxm.serialize(stream)?;
                stream.write_all(&vec![0; len - 4 - oxm.length()])
            }
            OfpAction::Other { typ, ref body } => {
                stream.write_u16::<NetworkEndian>(typ)?;
                stream.write_u16::<NetworkEndian>(4 + body.len() as u16)?;
                stream.write_all(body)
            }
        }
    }
}

fn serialize_actions(actions: &[OfpAction]) -> io::Result<Vec<u8>> {
    let mut buf = vec![];
    for action in actions {
        action.serialize(&mut buf)?;
    }
    Ok(buf)
}

impl OfpInstruction {
    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        match *self {
            OfpInstruction::GotoTable(table_id) => {
                stream.write_u16::<NetworkEndian>(OfpInstructionType::GotoTable as u16)?;
                stream.write_u16::<NetworkEndian>(8)?;
                stream.write_all(&[table_id, 0, 0, 0])
            }
            OfpInstruction::ApplyActions(ref actions) => {
                let actions = serialize_actions(actions)?;
                stream.write_u16::<NetworkEndian>(OfpInstructionType::ApplyActions as u16)?;
                stream.write_u16::<NetworkEndian>(8 + actions.len() as u16)?;
                stream.write_all(&[0; 4])?;
                stream.write_all(&actions)
            }
            OfpInstruction::Meter(meter_id) => {
                stream.write_u16::<NetworkEndian>(OfpInstructionType::Meter as u16)?;
                stream.write_u16::<NetworkEndian>(8)?;
                stream.write_u32::<NetworkEndian>(meter_id)
            }
            OfpInstruction::Other { typ, ref body } => {
                stream.write_u16::<NetworkEndian>(typ)?;
                stream.write_u16::<NetworkEndian>(4 + body.len() as u16)?;
                stream.write_all(body)
            }
        }
    }
}

impl OfpBucket {
    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        let actions = serialize_actions(&self.actions)?;
        stream.write_u16::<NetworkEndian>(16 + actions.len() as u16)?;
        stream.write_u16::<NetworkEndian>(self.weight)?;
        stream.write_u32::<NetworkEndian>(self.watch_port)?;
        stream.write_u32::<NetworkEndian>(self.watch_group)?;
        stream.write_all(&[0; 4])?;
        stream.write_all(&actions)
    }
}

impl OfpPort {
    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u32::<NetworkEndian>(self.port_no)?;
        stream.write_all(&[0; 4])?;
        stream.write_all(&self.hw_addr)?;
        stream.write_all(&[0; 2])?;
        write_fixed_str(stream, &self.name, MAX_PORT_NAME_LEN)?;
        stream.write_u32::<NetworkEndian>(self.config)?;
        stream.write_u32::<NetworkEndian>(self.state)?;
        stream.write_u32::<NetworkEndian>(self.curr)?;
        stream.write_u32::<NetworkEndian>(self.advertised)?;
        stream.write_u32::<NetworkEndian>(self.supported)?;
        stream.write_u32::<NetworkEndian>(self.peer)?;
        stream.write_u32::<NetworkEndian>(self.curr_speed)?;
        stream.write_u32::<NetworkEndian>(self.max_speed)
    }
}

impl OfpFlowStats {
    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        let mut tail = vec![];
        self.match_field.serialize(&mut tail)?;
        for instr in &self.instructions {
            instr.serialize(&mut tail)?;
        }
        stream.write_u16::<NetworkEndian>(48 + tail.len() as u16)?;
        stream.write_all(&[self.table_id, 0])?;
        stream.write_u32::<NetworkEndian>(self.duration_sec)?;
        stream.write_u32::<NetworkEndian>(self.duration_nsec)?;
        stream.write_u16::<NetworkEndian>(self.priority)?;
        stream.write_u16::<NetworkEndian>(self.idle_timeout)?;
        stream.write_u16::<NetworkEndian>(self.hard_timeout)?;
        stream.write_u16::<NetworkEndian>(self.flags)?;
        stream.write_all(&[0; 4])?;
        stream.write_u64::<NetworkEndian>(self.cookie)?;
        stream.write_u64::<NetworkEndian>(self.packet_count)?;
        stream.write_u64::<NetworkEndian>(self.byte_count)?;
        stream.write_all(&tail)
    }
}

impl OfpGroupStats {
    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u16::<NetworkEndian>(40 + 16 * self.bucket_stats.len() as u16)?;
        stream.write_all(&[0; 2])?;
        stream.write_u32::<NetworkEndian>(self.group_id)?;
        stream.write_u32::<NetworkEndian>(self.ref_count)?;
        stream.write_all(&[0; 4])?;
        stream.write_u64::<NetworkEndian>(self.packet_count)?;
        stream.write_u64::<NetworkEndian>(self.byte_count)?;
        stream.write_u32::<NetworkEndian>(self.duration_sec)?;
        stream.write_u32::<NetworkEndian>(self.duration_nsec)?;
        for counter in &self.bucket_stats {
            stream.write_u64::<NetworkEndian>(counter.packet_count)?;
            stream.write_u64::<NetworkEndian>(counter.byte_count)?;
        }
        Ok(())
    }
}

impl OfpGroupDesc {
    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        let mut buckets = vec![];
        for bucket in &self.buckets {
            bucket.serialize(&mut buckets)?;
        }
        stream.write_u16::<NetworkEndian>(8 + buckets.len() as u16)?;
        stream.write_all(&[self.typ, 0])?;
        stream.write_u32::<NetworkEndian>(self.group_id)?;
        stream.write_all(&buckets)
    }
}

impl OfpMeterStats {
    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u32::<NetworkEndian>(self.meter_id)?;
        stream.write_u16::<NetworkEndian>(40 + 16 * self.band_stats.len() as u16)?;
        stream.write_all(&[0; 6])?;
        stream.write_u32::<NetworkEndian>(self.flow_count)?;
        stream.write_u64::<NetworkEndian>(self.packet_in_count)?;
        stream.write_u64::<NetworkEndian>(self.byte_in_count)?;
        stream.write_u32::<NetworkEndian>(self.duration_sec)?;
        stream.write_u32::<NetworkEndian>(self.duration_nsec)?;
        for band in &self.band_stats {
            stream.write_u64::<NetworkEndian>(band.packet_band_count)?;
            stream.write_u64::<NetworkEndian>(band.byte_band_count)?;
        }
        Ok(())
    }
}

impl OfpMultipartBody {
    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        match *self {
            OfpMultipartBody::Desc(ref desc) => {
                write_fixed_str(stream, &desc.mfr_desc, DESC_STR_LEN)?;
                write_fixed_str(stream, &desc.hw_desc, DESC_STR_LEN)?;
                write_fixed_str(stream, &desc.sw_desc, DESC_STR_LEN)?;
                write_fixed_str(stream, &desc.serial_num, SERIAL_NUM_LEN)?;
                write_fixed_str(stream, &desc.dp_desc, DESC_STR_LEN)
            }
            OfpMultipartBody::Flows(ref flows) => {
                for flow in flows {
                    flow.serialize(stream)?;
                }
                Ok(())
            }
            OfpMultipartBody::Groups(ref groups) => {
                for group in groups {
                    group.serialize(stream)?;
                }
                Ok(())
            }
            OfpMultipartBody::GroupDescs(ref descs) => {
                for desc in descs {
                    desc.serialize(stream)?;
                }
                Ok(())
            }
            OfpMultipartBody::Meters(ref meters) => {
                for meter in meters {
                    meter.serialize(stream)?;
                }
                Ok(())
            }
            OfpMultipartBody::MeterFeatures(ref features) => {
                stream.write_u32::<NetworkEndian>(features.max_meter)?;
                stream.write_u32::<NetworkEndian>(features.band_types)?;
                stream.write_u32::<NetworkEndian>(features.capabilities)?;
                stream.write_all(&[features.max_bands, features.max_color, 0, 0])
            }
            OfpMultipartBody::Ports(ref ports) => {
                for port in ports {
                    port.serialize(stream)?;
                }
                Ok(())
            }
            OfpMultipartBody::Empty => Ok(()),
        }
    }
}

/// An OpenFlow packet. Must be implemented for all OpenFlow messsages that are sent.
pub trait OfpPacket {
    /// Constructs an OfpHeader with the given body length and transaction ID
    /// Fails if the message does not fit into the 16 bit length field
    fn header(&self, body_length: usize, xid: u32) -> io::Result<OfpHeader> {
        let length = OfpHeader::header_length() + body_length;
        if length > u16::max_value() as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{:?} message of {} bytes is too long", Self::typ(), length),
            ));
        }
        Ok(OfpHeader {
            version: OFP_VERSION,
            typ: Self::typ() as u8,
            length: length as u16,
            xid: xid,
        })
    }

    /// Returns the packet's type
    fn typ() -> OfpType;

    /// Serializes this packet with network byte order.
    /// The xid is used as its header's transaction id.
    fn serialize<S: Write>(&self, stream: &mut S, xid: u32) -> io::Result<()> {
        let mut body = vec![];
        self.serialize_body(&mut body)?;
        let header = self.header(body.len(), xid)?;
        debug!("Outgoing message: {:?}", header);
        header.serialize(stream)?;
        stream.write_all(&body)
    }

    /// Serializes this packet's body.
    /// Implementers have to output network byte order on the given stream.
    fn serialize_body<S: Write>(&self, stream: &mut S) -> io::Result<()>;
}

/// Type of a hello element carrying the version bitmap.
const OFPHET_VERSIONBITMAP: u16 = 1;

impl OfpHello {
    /// Constructs a Hello that offers `OFP_VERSION` only
    pub fn new() -> OfpHello {
        OfpHello {
            bitmap: 1 << OFP_VERSION,
        }
    }
}
impl OfpPacket for OfpHello {
    fn typ() -> OfpType {
        OfpType::Hello
    }

    fn serialize_body<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u16::<NetworkEndian>(OFPHET_VERSIONBITMAP)?;
        stream.write_u16::<NetworkEndian>(8)?;
        stream.write_u32::<NetworkEndian>(self.bitmap)
    }
}

impl OfpEchoReply {
    /// Constructs a new `OfpEchoReply` with `arbitrary` content.
    /// This should be the same as in the `OfpEchoRequest` that issued this reply.
    pub fn new(arbitrary: Vec<u8>) -> OfpEchoReply {
        OfpEchoReply {
            arbitrary: arbitrary,
        }
    }
}
impl OfpPacket for OfpEchoReply {
    fn typ() -> OfpType {
        OfpType::EchoReply
    }

    fn serialize_body<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_all(&self.arbitrary)
    }
}

impl OfpPacket for OfpErrorMsg {
    fn typ() -> OfpType {
        OfpType::Error
    }

    fn serialize_body<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u16::<NetworkEndian>(self.typ)?;
        stream.write_u16::<NetworkEndian>(self.code)?;
        stream.write_all(&self.data)
    }
}

impl OfpSwitchFeatures {
    /// Constructs the features of a datapath without auxiliary connections
    pub fn new(datapath_id: u64, n_buffers: u32, n_tables: u8, capabilities: u32) -> Self {
        OfpSwitchFeatures {
            datapath_id,
            n_buffers,
            n_tables,
            auxiliary_id: 0,
            pad: [0; 2],
            capabilities,
            reserved: 0,
        }
    }
}
impl OfpPacket for OfpSwitchFeatures {
    fn typ() -> OfpType {
        OfpType::FeaturesReply
    }

    fn serialize_body<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u64::<NetworkEndian>(self.datapath_id)?;
        stream.write_u32::<NetworkEndian>(self.n_buffers)?;
        stream.write_all(&[self.n_tables, self.auxiliary_id])?;
        stream.write_all(&self.pad)?;
        stream.write_u32::<NetworkEndian>(self.capabilities)?;
        stream.write_u32::<NetworkEndian>(self.reserved)
    }
}

impl OfpPacket for OfpSwitchConfig {
    fn typ() -> OfpType {
        OfpType::GetConfigReply
    }

    fn serialize_body<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u16::<NetworkEndian>(self.flags)?;
        stream.write_u16::<NetworkEndian>(self.miss_send_len)
    }
}

/// Room for the elements of one reply part: the message length minus the
/// OpenFlow header and the multipart type, flags and padding
const MAX_PART_BODY: usize = 0xffff - 16;

/// An element of a multipart reply list
trait PartElement {
    fn write<S: Write>(&self, stream: &mut S) -> io::Result<()>;

    fn encoded_len(&self) -> usize {
        let mut buf = vec![];
        match self.write(&mut buf) {
            Ok(()) => buf.len(),
            Err(_) => 0,
        }
    }
}

macro_rules! part_element {
    ($($t:ty),*) => {
        $(impl PartElement for $t {
            fn write<S: Write>(&self, stream: &mut S) -> io::Result<()> {
                self.serialize(stream)
            }
        })*
    };
}

part_element!(OfpFlowStats, OfpGroupStats, OfpGroupDesc, OfpMeterStats, OfpPort);

/// Cuts the list into runs that fit into one reply part each.
/// There is always at least one, possibly empty, run.
fn split<T: PartElement>(items: Vec<T>) -> Vec<Vec<T>> {
    let mut parts = vec![];
    let mut part = vec![];
    let mut len = 0;
    for item in items {
        let item_len = item.encoded_len();
        if !part.is_empty() && len + item_len > MAX_PART_BODY {
            parts.push(mem::replace(&mut part, vec![]));
            len = 0;
        }
        len += item_len;
        part.push(item);
    }
    parts.push(part);
    parts
}

impl OfpMultipartReply {
    /// Constructs the parts of a reply, each fitting into one message.
    /// Every part but the last is flagged `OFPMPF_REPLY_MORE`.
    pub fn parts(typ: OfpMultipartType, body: OfpMultipartBody) -> Vec<OfpMultipartReply> {
        let bodies: Vec<OfpMultipartBody> = match body {
            OfpMultipartBody::Flows(flows) => {
                split(flows).into_iter().map(OfpMultipartBody::Flows).collect()
            }
            OfpMultipartBody::Groups(groups) => {
                split(groups).into_iter().map(OfpMultipartBody::Groups).collect()
            }
            OfpMultipartBody::GroupDescs(descs) => {
                split(descs).into_iter().map(OfpMultipartBody::GroupDescs).collect()
            }
            OfpMultipartBody::Meters(meters) => {
                split(meters).into_iter().map(OfpMultipartBody::Meters).collect()
            }
            OfpMultipartBody::Ports(ports) => {
                split(ports).into_iter().map(OfpMultipartBody::Ports).collect()
            }
            other => vec![other],
        };
        let typ = typ as u16;
        let last = bodies.len() - 1;
        bodies
            .into_iter()
            .enumerate()
            .map(|(i, body)| OfpMultipartReply {
                typ,
                flags: if i < last { OFPMPF_REPLY_MORE } else { 0 },
                body,
            })
            .collect()
    }
}
impl OfpPacket for OfpMultipartReply {
    fn typ() -> OfpType {
        OfpType::MultipartReply
    }

    fn serialize_body<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u16::<NetworkEndian>(self.typ)?;
        stream.write_u16::<NetworkEndian>(self.flags)?;
        stream.write_all(&[0; 4])?;
        self.body.serialize(stream)
    }
}

impl OfpPacket for OfpPortStatus {
    fn typ() -> OfpType {
        OfpType::PortStatus
    }

    fn serialize_body<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_all(&[self.reason as u8, 0, 0, 0, 0, 0, 0, 0])?;
        self.desc.serialize(stream)
    }
}

impl OfpPacket for OfpRoleReply {
    fn typ() -> OfpType {
        OfpType::RoleReply
    }

    fn serialize_body<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u32::<NetworkEndian>(self.role)?;
        stream.write_all(&[0; 4])?;
        stream.write_u64::<NetworkEndian>(self.generation_id)
    }
}

/* Controller-side messages, only sent by the tests */

#[cfg(test)]
impl OfpPacket for OfpFlowMod {
    fn typ() -> OfpType {
        OfpType::FlowMod
    }

    fn serialize_body<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u64::<NetworkEndian>(self.cookie)?;
        stream.write_u64::<NetworkEndian>(self.cookie_mask)?;
        stream.write_all(&[self.table_id, self.command])?;
        stream.write_u16::<NetworkEndian>(self.idle_timeout)?;
        stream.write_u16::<NetworkEndian>(self.hard_timeout)?;
        stream.write_u16::<NetworkEndian>(self.priority)?;
        stream.write_u32::<NetworkEndian>(self.buffer_id)?;
        stream.write_u32::<NetworkEndian>(self.out_port)?;
        stream.write_u32::<NetworkEndian>(self.out_group)?;
        stream.write_u16::<NetworkEndian>(self.flags)?;
        stream.write_all(&[0; 2])?;
        self.match_field.serialize(stream)?;
        for instr in &self.instructions {
            instr.serialize(stream)?;
        }
        Ok(())
    }
}

#[cfg(test)]
impl OfpFlowMod {
    /// Constructs a permanent `OfpFlowMod` with the given fields.
    pub fn new(
        command: OfpFlowModCommand,
        cookie: u64,
        table_id: u8,
        priority: u16,
        match_field: OfpMatch,
        instructions: Vec<OfpInstruction>,
    ) -> OfpFlowMod {
        OfpFlowMod {
            cookie,
            cookie_mask: 0,
            table_id,
            command: command as u8,
            idle_timeout: OFP_FLOW_PERMANENT,
            hard_timeout: OFP_FLOW_PERMANENT,
            priority,
            buffer_id: OFP_NO_BUFFER,
            out_port: OFPP_ANY,
            out_group: OFPG_ANY,
            flags: 0,
            match_field,
            instructions,
        }
    }
}

#[cfg(test)]
impl OfpPacket for OfpMeterMod {
    fn typ() -> OfpType {
        OfpType::MeterMod
    }

    fn serialize_body<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u16::<NetworkEndian>(self.command)?;
        stream.write_u16::<NetworkEndian>(self.flags)?;
        stream.write_u32::<NetworkEndian>(self.meter_id)?;
        for band in &self.bands {
            stream.write_u16::<NetworkEndian>(band.typ)?;
            stream.write_u16::<NetworkEndian>(16)?;
            stream.write_u32::<NetworkEndian>(band.rate)?;
            stream.write_u32::<NetworkEndian>(band.burst_size)?;
            stream.write_all(&[0; 4])?;
        }
        Ok(())
    }
}

#[cfg(test)]
impl OfpPacket for OfpGroupMod {
    fn typ() -> OfpType {
        OfpType::GroupMod
    }

    fn serialize_body<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u16::<NetworkEndian>(self.command)?;
        stream.write_all(&[self.typ, 0])?;
        stream.write_u32::<NetworkEndian>(self.group_id)?;
        for bucket in &self.buckets {
            bucket.serialize(stream)?;
        }
        Ok(())
    }
}

#[cfg(test)]
impl OfpPacket for OfpMultipartRequest {
    fn typ() -> OfpType {
        OfpType::MultipartRequest
    }

    fn serialize_body<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u16::<NetworkEndian>(self.typ)?;
        stream.write_u16::<NetworkEndian>(self.flags)?;
        stream.write_all(&[0; 4])?;
        stream.write_all(&self.body)
    }
}

#[cfg(test)]
impl OfpPacket for OfpRoleRequest {
    fn typ() -> OfpType {
        OfpType::RoleRequest
    }

    fn serialize_body<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u32::<NetworkEndian>(self.role)?;
        stream.write_all(&[0; 4])?;
        stream.write_u64::<NetworkEndian>(self.generation_id)
    }
}
