/*!
The OpenFlow 1.3 message primitives an OLT needs to act as a switch

This is based on the openflow.h from OpenFlow Switch Specification 1.3.5.
The type names are changed to align with the Rust conventions.
Messages received from the controller are parsed in `deserialize`,
the replies and asynchronous messages are written in `serialize`.
*/

pub mod deserialize;
pub mod serialize;

use byteorder::{ByteOrder, NetworkEndian};
use ipnetwork::Ipv4Network;
use std::fmt;
use std::net::Ipv4Addr;

/// A marker to express the endpoint
/// of any end-to-end network protocol
pub enum ProtocolEndpoint {
    /// The endpoint is the source
    Src,
    /// The endpoint is the destination
    Dst,
}

impl OfpErrorMsg {
    fn first_64_bytes(header: &[u8], body: &[u8]) -> Vec<u8> {
        let mut buf = vec![];
        buf.extend_from_slice(header);
        let target_length = 64 - header.len();
        let shrunk_body = if body.len() < target_length {
            body
        }
        else {
            &body[0..target_length]
        };
        buf.extend_from_slice(shrunk_body);
        buf
    }

    /// Constructs a Hello Failed error
    pub fn new_hello_failed() -> OfpErrorMsg {
        OfpErrorMsg {
            typ: OfpErrorType::HelloFailed as u16,
            code: OfpHelloFailedCode::Incompatible as u16,
            data: vec![],
        }
    }

    /// Constructs a Bad Request error
    pub fn new_bad_request(code: OfpBadRequestCode, header: &[u8], body: &[u8]) -> OfpErrorMsg {
        OfpErrorMsg {
            typ: OfpErrorType::BadRequest as u16,
            code: code as u16,
            data: Self::first_64_bytes(header, body),
        }
    }

    /// Constructs a Flow Mod Failed error carrying the complete failed request
    pub fn new_flow_mod_failed(code: OfpFlowModFailedCode, request: &[u8]) -> OfpErrorMsg {
        OfpErrorMsg {
            typ: OfpErrorType::FlowModFailed as u16,
            code: code as u16,
            data: request.to_vec(),
        }
    }
}

impl fmt::Display for OfpErrorMsg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let t = self.typ;
        let typ = if t == OfpErrorType::HelloFailed as u16 {
            OfpErrorType::HelloFailed
        }
        else if t == OfpErrorType::BadRequest as u16 {
            OfpErrorType::BadRequest
        }
        else if t == OfpErrorType::FlowModFailed as u16 {
            OfpErrorType::FlowModFailed
        }
        else if t == OfpErrorType::GroupModFailed as u16 {
            OfpErrorType::GroupModFailed
        }
        else if t == OfpErrorType::MeterModFailed as u16 {
            OfpErrorType::MeterModFailed
        }
        else {
            return write!(f, "OpenFlow Error: type({}), code({})", self.typ, self.code);
        };
        write!(f, "OpenFlow Error: {:?}, code({})", typ, self.code)
    }
}

/* Some getters */

impl OfpHeader {
    /// Gets the packet's OpenFlow version
    pub fn version(&self) -> u8 {
        self.version
    }
    /// Gets this packet's `OfpType`'s numerical respresentation.
    pub fn typ(&self) -> u8 {
        self.typ
    }
    /// Gets the packet's transaction id
    pub fn xid(&self) -> u32 {
        self.xid
    }
}
impl OfpEchoRequest {
    /// Gets the message's content
    pub fn arbitrary(self) -> Vec<u8> {
        self.arbitrary
    }
}
impl OfpErrorMsg {
    /// Gets the error type
    pub fn typ(&self) -> u16 {
        self.typ
    }
    /// Gets the error code
    pub fn code(&self) -> u16 {
        self.code
    }
    /// Gets the data describing the failed request
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// An OpenFlow Hello advertising the supported versions in a bitmap element
#[derive(Debug)]
pub struct OfpHello {
    bitmap: u32,
}

/// An OpenFlow Echo Request
#[derive(Debug)]
pub struct OfpEchoRequest {
    arbitrary: Vec<u8>,
}

/// An OpenFlow Echo Reply
#[derive(Debug)]
pub struct OfpEchoReply {
    arbitrary: Vec<u8>,
}

/// An OpenFlow TLV (Type, Length, Value) for
/// the OpenFlow Extensible Match format
#[derive(Debug, Clone, PartialEq)]
pub struct OfpOxmTlv {
    /// Header class
    class: u16,
    /// Header field
    field: u8,
    /// Header hasmask
    hasmask: bool,
    /// Body
    body: Vec<u8>,
}

/* Copyright (c) 2008 The Board of Trustees of The Leland Stanford Junior University
 * Copyright (c) 2011, 2012 Open Networking Foundation
 *
 * We are making the OpenFlow specification and associated documentation
 * (Software) available for public use and benefit with the expectation
 * that others will use, modify and enhance the Software and contribute
 * those enhancements back to the community. However, since we would
 * like to make the Software available for broadest use, with as few
 * restrictions as possible permission is hereby granted, free of
 * charge, to any person obtaining a copy of this Software to deal in
 * the Software under the copyrights without restriction, including
 * without limitation the rights to use, copy, modify, merge, publish,
 * distribute, sublicense, and/or sell copies of the Software, and to
 * permit persons to whom the Software is furnished to do so, subject to
 * the following conditions:
 *
 * The above copyright notice and this permission notice shall be
 * included in all copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND,
 * EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF
 * MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
 * NONINFRINGEMENT.  IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS
 * BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN
 * ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
 * CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 *
 * The name and trademarks of copyright holder(s) may NOT be used in
 * advertising or publicity pertaining to the Software or any
 * derivatives without specific, written prior permission.
 */

/// Version number:
/// OpenFlow versions released: 0x01 = 1.0 ; 0x02 = 1.1 ; 0x03 = 1.2; 0x04 = 1.3.
///
/// The most significant bit in the version field is reserved and must be set to zero.
pub const OFP_VERSION: u8 = 0x04;

/// Official IANA registered port for OpenFlow.
pub const OFP_TCP_PORT: u16 = 6653;

/// Special value used in some requests when no port is specified (i.e. wildcarded).
pub const OFPP_ANY: u32 = 0xffff_ffff;
/// Wildcard group used only for flow stats requests.
pub const OFPG_ANY: u32 = 0xffff_ffff;

/// Bit that indicate that a VLAN id is set.
pub const OFPVID_PRESENT: u16 = 0x1000;

/// Indicates that no buffering should be applied and the whole packet is to be
/// sent to the controller.
pub const OFPCML_NO_BUFFER: u16 = 0xffff;

/// A message's type, the most fundamental to
/// distinguish information between messages
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OfpType {
    /* Immutable messages. */
    /// Symmetric message
    Hello = 0,
    /// Symmetric message
    Error = 1,
    /// Symmetric message
    EchoRequest = 2,
    /// Symmetric message
    EchoReply = 3,

    /* Switch configuration messages. */
    /// Controller/switch message
    FeaturesRequest = 5,
    /// Controller/switch message
    FeaturesReply = 6,
    /// Controller/switch message
    GetConfigRequest = 7,
    /// Controller/switch message
    GetConfigReply = 8,
    /// Controller/switch message
    SetConfig = 9,

    /* Asynchronous messages. */
    /// Async message
    PortStatus = 12,

    /* Controller command messages. */
    /// Controller/switch message
    FlowMod = 14,
    /// Controller/switch message
    GroupMod = 15,

    /* Multipart messages. */
    /// Controller/switch message
    MultipartRequest = 18,
    /// Controller/switch message
    MultipartReply = 19,

    /* Barrier messages. */
    /// Controller/switch message
    BarrierRequest = 20,
    /// Controller/switch message
    BarrierReply = 21,

    /* Controller role change request messages. */
    /// Controller/switch message
    RoleRequest = 24,
    /// Controller/switch message
    RoleReply = 25,

    /* Meters and rate limiters configuration messages. */
    /// Controller/switch message
    MeterMod = 29,
}

/// Header on all OpenFlow packets.
#[derive(Debug, Clone, PartialEq)]
pub struct OfpHeader {
    /// OFP_VERSION.
    version: u8,
    /// This packet's OfpType.
    typ: u8,
    /// This packet's length including this OfpHeader.
    length: u16,
    /// Transaction id associated with this packet.
    /// Replies use the same id as was in the request
    /// to facilitate pairing.
    xid: u32,
}

/// Switch features.
#[derive(Debug, PartialEq)]
pub struct OfpSwitchFeatures {
    /// Datapath unique ID. The lower 48-bits are for
    /// a MAC address, while the upper 16-bits are
    /// implementer-defined.
    datapath_id: u64,
    /// Max packets buffered at once.
    n_buffers: u32,
    /// Number of tables supported by datapath.
    n_tables: u8,
    /// Identify auxiliary connections
    auxiliary_id: u8,
    /// Align to 64-bits.
    pad: [u8; 2],

    /* Features. */
    /// Bitmap of support OfpCapabilities.
    capabilities: u32,
    reserved: u32,
}

/// Capabilities supported by the datapath.
pub enum OfpCapabilities {
    /// Flow statistics.
    FlowStats = 1 << 0,
    /// Table statistics.
    TableStats = 1 << 1,
    /// Port statistics.
    PortStats = 1 << 2,
    /// Group statistics.
    GroupStats = 1 << 3,
}

/// Handling of IP fragments.
pub enum OfpConfigFlags {
    /// No special handling for fragments.
    FragNormal = 0,
}

/// Switch configuration.
#[derive(Debug, PartialEq)]
pub struct OfpSwitchConfig {
    /// Bitmap of OfpConfigFlags.
    pub flags: u16,
    /// Max bytes of packet that datapath should send to the controller.
    pub miss_send_len: u16,
}

/* ## -------------------------- ## */
/* ## OpenFlow Extensible Match. ## */
/* ## -------------------------- ## */

/// The match type indicates the match structure (set of fields that compose the match) in use.
///
/// The match type is placed in the type field at the beginning
/// of all match structures. The "OpenFlow Extensible Match" type corresponds
/// to OXM TLV format described below and must be supported by all OpenFlow
/// switches.
pub enum OfpMatchType {
    /// OpenFlow Extensible Match
    Oxm = 1,
}

/// Fields to match against flows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OfpMatch {
    /// One of OfpMatchType
    typ: u16,
    // length(): Length of OfpMatch (excluding padding)
    /* Followed by:
     *   - Exactly (length - 4) (possibly 0) bytes containing OXM TLVs, then
     *   - Exactly ((length + 7)/8*8 - length) (between 0 and 7) bytes of
     *     all-zero bytes
     * In summary, OfpMatch is padded as needed, to make its overall size
     * a multiple of 8, to preserve alignment in structures using it.
     */
    /// 0 or more OXM match fields
    oxm_fields: Vec<OfpOxmTlv>,
    // Zero bytes - see above for sizing
}

impl OfpMatch {
    /// Looks up an OpenFlow basic class field
    pub fn field(&self, field: OxmOfbMatchFields) -> Option<&OfpOxmTlv> {
        self.oxm_fields
            .iter()
            .find(|tlv| tlv.class == OfpOxmClass::OpenflowBasic as u16 && tlv.field == field as u8)
    }
}

/// Construction and inspection of an OXM TLV.
impl OfpOxmTlv {
    fn new(field: OxmOfbMatchFields, hasmask: bool, body: Vec<u8>) -> OfpOxmTlv {
        OfpOxmTlv {
            class: OfpOxmClass::OpenflowBasic as u16,
            hasmask,
            field: field as u8,
            body,
        }
    }

    /// OpenFlow port on which the packet was received.
    /// May be a physical port, a logical port, or the reserved port OFPP_LOCAL
    /// Prereqs: None.
    /// Format: 32-bit integer in network byte order.
    pub fn new_in_port(in_port: u32) -> OfpOxmTlv {
        let mut port_bytes = vec![0; 4];
        NetworkEndian::write_u32(&mut port_bytes, in_port);
        OfpOxmTlv::new(OxmOfbMatchFields::InPort, false, port_bytes)
    }

    /// Packet's Ethernet type.
    /// Prereqs: None.
    /// Format: 16-bit integer in network byte order.
    pub fn new_eth_type(eth_type: u16) -> OfpOxmTlv {
        let mut type_bytes = vec![0; 2];
        NetworkEndian::write_u16(&mut type_bytes, eth_type);
        OfpOxmTlv::new(OxmOfbMatchFields::EthType, false, type_bytes)
    }

    /// 802.1Q VLAN id. The OFPVID_PRESENT bit is set for tagged frames.
    /// Prereqs: None.
    /// Format: 16-bit integer in network byte order with bit 13 indicating
    /// presence of VLAN header and 3 most-significant bits forced to 0.
    pub fn new_vlan_vid(vid: u16) -> OfpOxmTlv {
        let mut vid_bytes = vec![0; 2];
        NetworkEndian::write_u16(&mut vid_bytes, vid);
        OfpOxmTlv::new(OxmOfbMatchFields::VlanVid, false, vid_bytes)
    }

    /// The "protocol" byte in the IP header.
    /// Prereqs: OxmOfbMatchFields::EthType must be either 0x0800 or 0x86dd.
    /// Format: 8-bit integer.
    pub fn new_ip_proto(proto: u8) -> OfpOxmTlv {
        OfpOxmTlv::new(OxmOfbMatchFields::IpProto, false, vec![proto])
    }

    /// The source or destination address in the IP header.
    /// Prereqs: OxmOfbMatchFields::EthType must match 0x0800 exactly.
    /// Format: 32-bit integer in network byte order.
    /// Masking: Arbitrary masks.
    pub fn new_ipv4(cidr: &Ipv4Network, endpoint: &ProtocolEndpoint) -> OfpOxmTlv {
        let field = match *endpoint {
            ProtocolEndpoint::Src => OxmOfbMatchFields::Ipv4Src,
            ProtocolEndpoint::Dst => OxmOfbMatchFields::Ipv4Dst,
        };
        let mut oxm_val = vec![];
        oxm_val.extend_from_slice(&cidr.network().octets());
        if cidr.prefix() == 32 {
            return OfpOxmTlv::new(field, false, oxm_val);
        }
        oxm_val.extend_from_slice(&cidr.mask().octets());
        OfpOxmTlv::new(field, true, oxm_val)
    }

    /// The source or destination port in the UDP header.
    /// Prereqs:
    /// OxmOfbMatchFields::EthType must be either 0x0800 or 0x86dd.
    /// OxmOfbMatchFields::IpProto must match 17 exactly.
    /// Format: 16-bit integer in network byte order.
    pub fn new_udp_port(port: u16, endpoint: &ProtocolEndpoint) -> OfpOxmTlv {
        let field = match *endpoint {
            ProtocolEndpoint::Src => OxmOfbMatchFields::UdpSrc,
            ProtocolEndpoint::Dst => OxmOfbMatchFields::UdpDst,
        };
        let mut port_bytes = vec![0; 2];
        NetworkEndian::write_u16(&mut port_bytes, port);
        OfpOxmTlv::new(field, false, port_bytes)
    }

    /// Gets the numerical field type
    pub fn field(&self) -> u8 {
        self.field
    }

    /// Reads the value as an 8-bit integer
    pub fn value_u8(&self) -> Option<u8> {
        self.body.first().cloned()
    }

    /// Reads the value as a 16-bit integer in network byte order
    pub fn value_u16(&self) -> Option<u16> {
        if self.body.len() < 2 {
            return None;
        }
        Some(NetworkEndian::read_u16(&self.body[0..2]))
    }

    /// Reads the value as a 32-bit integer in network byte order
    pub fn value_u32(&self) -> Option<u32> {
        if self.body.len() < 4 {
            return None;
        }
        Some(NetworkEndian::read_u32(&self.body[0..4]))
    }

    /// Reads the value (ignoring a possible mask) as IPv4 address
    pub fn value_ipv4(&self) -> Option<Ipv4Addr> {
        self.value_u32().map(Ipv4Addr::from)
    }
}

/// OXM Class IDs.
/// The high order bit differentiate reserved classes from member classes.
/// Classes 0x0000 to 0x7FFF are member classes, allocated by ONF.
/// Classes 0x8000 to 0xFFFE are reserved classes, reserved for standardisation.
#[derive(Debug, Clone, Copy)]
pub enum OfpOxmClass {
    /// Basic class for OpenFlow
    OpenflowBasic = 0x8000,
}

/// OXM Flow match field types for OpenFlow basic class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OxmOfbMatchFields {
    /// Switch input port.
    InPort = 0,
    /// Ethernet frame type.
    EthType = 5,
    /// VLAN id.
    VlanVid = 6,
    /// IP protocol.
    IpProto = 10,
    /// IPv4 source address.
    Ipv4Src = 11,
    /// IPv4 destination address.
    Ipv4Dst = 12,
    /// UDP source port.
    UdpSrc = 15,
    /// UDP destination port.
    UdpDst = 16,
}

/// Values for 'type' in `OfpErrorMsg`. These values are immutable: they will
/// not change in future versions of the protocol (although new values may be added).
#[derive(Debug)]
pub enum OfpErrorType {
    /// Hello protocol failed.
    HelloFailed = 0,
    /// Request was not understood.
    BadRequest = 1,
    /// Problem modifying flow entry.
    FlowModFailed = 5,
    /// Problem modifying group entry.
    GroupModFailed = 6,
    /// Error in meter.
    MeterModFailed = 12,
}

/// `OfpErrorMsg` 'code' values for `OfpErrorType::HelloFailed`.
///
/// 'data' contains an ASCII text string that may give failure details.
pub enum OfpHelloFailedCode {
    /// No compatible version.
    Incompatible = 0,
}

/// `OfpErrorMsg` 'code' values for `OfpErrorType::BadRequest`.
///
/// 'data' contains at least the first 64 bytes of the failed request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OfpBadRequestCode {
    /// ofp_header.version not supported.
    BadVersion = 0,
    /// ofp_header.type not supported.
    BadType = 1,
    /// ofp_multipart_request.type not supported.
    BadMultipart = 2,
    /// Wrong request length for type.
    BadLen = 6,
}

/* ## ----------------- ## */
/* ## OpenFlow Actions. ## */
/* ## ----------------- ## */

/// The type of an OpenFlow Action
pub enum OfpActionType {
    /// Output to switch port.
    Output = 0,
    /// Push a new VLAN tag
    PushVlan = 17,
    /// Pop the outer VLAN tag
    PopVlan = 18,
    /// Apply group.
    Group = 22,
    /// Set a header field using OXM TLV format.
    SetField = 25,
}

/// An action of an `OfpInstruction::ApplyActions` or of a group bucket.
///
/// Actions the agent does not interpret are kept as raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum OfpAction {
    /// Sends packets out 'port'.
    Output {
        /// Output port.
        port: u32,
        /// Max length to send to controller.
        max_len: u16,
    },
    /// Pushes a VLAN tag with the given Ethertype.
    PushVlan(u16),
    /// Pops the outer VLAN tag.
    PopVlan,
    /// Applies the group.
    Group(u32),
    /// Sets a header field.
    SetField(OfpOxmTlv),
    /// Any other action.
    Other {
        /// One of OfpActionType.
        typ: u16,
        /// Body after type and length.
        body: Vec<u8>,
    },
}

/* ## ---------------------- ## */
/* ## OpenFlow Instructions. ## */
/* ## ---------------------- ## */

/// The type of an OpenFlow Instruction
pub enum OfpInstructionType {
    /// Setup the next table in the lookup pipeline
    GotoTable = 1,
    /// Applies the action(s) immediately
    ApplyActions = 4,
    /// Apply meter (rate limiter)
    Meter = 6,
}

/// An instruction of a flow entry.
#[derive(Debug, Clone, PartialEq)]
pub enum OfpInstruction {
    /// Continues the lookup in the given table.
    GotoTable(u8),
    /// Applies the actions immediately.
    ApplyActions(Vec<OfpAction>),
    /// Sends the packets through the given meter.
    Meter(u32),
    /// Any other instruction.
    Other {
        /// One of OfpInstructionType.
        typ: u16,
        /// Body after type and length.
        body: Vec<u8>,
    },
}

/* ## --------------------------- ## */
/* ## OpenFlow Flow Modification. ## */
/* ## --------------------------- ## */

/// The command that is embedded in a flow mod message
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OfpFlowModCommand {
    /// New flow.
    Add = 0,
    /// Modify all matching flows.
    Modify = 1,
    /// Modify entry strictly matching wildcards and priority.
    ModifyStrict = 2,
    /// Delete all matching flows.
    Delete = 3,
    /// Delete entry strictly matching wildcards and priority.
    DeleteStrict = 4,
}

impl OfpFlowModCommand {
    /// Maps the wire representation
    pub fn from_u8(command: u8) -> Option<OfpFlowModCommand> {
        match command {
            0 => Some(OfpFlowModCommand::Add),
            1 => Some(OfpFlowModCommand::Modify),
            2 => Some(OfpFlowModCommand::ModifyStrict),
            3 => Some(OfpFlowModCommand::Delete),
            4 => Some(OfpFlowModCommand::DeleteStrict),
            _ => None,
        }
    }
}

/// Value used in `idle_timeout` and `hard_timeout` to indicate that the entry is permanent.
pub const OFP_FLOW_PERMANENT: u16 = 0;

/// Flow setup and teardown (controller -> datapath).
#[derive(Debug, Clone, PartialEq)]
pub struct OfpFlowMod {
    /// Opaque controller-issued identifier.
    pub cookie: u64,
    /// Mask used to restrict the cookie bits
    /// that must match when the command is
    /// OfpFlowModCommand::Modify* or OfpFlowModCommand::Delete*.
    /// A value of 0 indicates no restriction.
    pub cookie_mask: u64,
    /// ID of the table to put the flow in.
    pub table_id: u8,
    /// One of OfpFlowModCommand.
    pub command: u8,
    /// Idle time before discarding (seconds).
    pub idle_timeout: u16,
    /// Max time before discarding (seconds).
    pub hard_timeout: u16,
    /// Priority level of flow entry.
    pub priority: u16,
    /// Buffered packet to apply to, or
    /// OFP_NO_BUFFER.
    pub buffer_id: u32,
    /// For OfpFlowModCommand::Delete* commands, require
    /// matching entries to include this as an
    /// output port.  A value of OFPP_ANY
    /// indicates no restriction.
    pub out_port: u32,
    /// For OfpFlowModCommand::Delete* commands, require
    /// matching entries to include this as an
    /// output group.  A value of OFPG_ANY
    /// indicates no restriction.
    pub out_group: u32,
    /// Bitmap of OfpFlowModFlags.
    pub flags: u16,
    /// Fields to match. Variable size.
    pub match_field: OfpMatch,

    /* The variable size and padded match is always followed by instructions. */
    /// Instruction set - 0 or more.
    pub instructions: Vec<OfpInstruction>,
}

/// A reserved buffer ID to express that no buffer is assigned
pub const OFP_NO_BUFFER: u32 = 0xffff_ffff;

/// `OfpErrorMsg` 'code' values for `OfpErrorType::FlowModFailed`.
///
/// 'data' contains at least the first 64 bytes of the failed request.
#[derive(Debug)]
pub enum OfpFlowModFailedCode {
    /// Unspecified error.
    Unknown = 0,
    /// Flow not added because table was full.
    TableFull = 1,
}

/// Error message (datapath -> controller).
#[derive(Debug, PartialEq)]
pub struct OfpErrorMsg {
    typ: u16,
    code: u16,
    /// Variable-length data. Interpreted based on the type and code. No padding.
    data: Vec<u8>,
}

/* ## ------------------ ## */
/* ## OpenFlow Meters.  ## */
/* ## ------------------ ## */

/// Meter commands
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OfpMeterModCommand {
    /// New meter.
    Add = 0,
    /// Modify specified meter.
    Modify = 1,
    /// Delete specified meter.
    Delete = 2,
}

/// Meter band types
pub enum OfpMeterBandType {
    /// Drop packet.
    Drop = 1,
    /// Remark DSCP in the IP header.
    DscpRemark = 2,
}

/// Meter configuration flags
pub enum OfpMeterFlags {
    /// Rate value in kb/s (kilo-bit per second).
    Kbps = 1 << 0,
}

/// One band of a meter.
#[derive(Debug, Clone, PartialEq)]
pub struct OfpMeterBand {
    /// One of OfpMeterBandType.
    pub typ: u16,
    /// Rate for this band.
    pub rate: u32,
    /// Size of bursts.
    pub burst_size: u32,
}

/// Meter configuration (controller -> datapath).
#[derive(Debug, Clone, PartialEq)]
pub struct OfpMeterMod {
    /// One of OfpMeterModCommand.
    pub command: u16,
    /// Bitmap of OfpMeterFlags.
    pub flags: u16,
    /// Meter instance.
    pub meter_id: u32,
    /// The band list length is inferred from the length field in the header.
    pub bands: Vec<OfpMeterBand>,
}

/* ## ------------------ ## */
/* ## OpenFlow Groups.  ## */
/* ## ------------------ ## */

/// Group commands
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OfpGroupModCommand {
    /// New group.
    Add = 0,
    /// Modify all matching groups.
    Modify = 1,
    /// Delete all matching groups.
    Delete = 2,
}

/// Group types.
pub enum OfpGroupType {
    /// All (multicast/broadcast) group.
    All = 0,
}

/// Bucket for use in groups.
#[derive(Debug, Clone, PartialEq)]
pub struct OfpBucket {
    /// Relative weight of bucket. Only defined for select groups.
    pub weight: u16,
    /// Port whose state affects whether this bucket is live.
    pub watch_port: u32,
    /// Group whose state affects whether this bucket is live.
    pub watch_group: u32,
    /// The action length is inferred from the length field in the header.
    pub actions: Vec<OfpAction>,
}

/// Group setup and teardown (controller -> datapath).
#[derive(Debug, Clone, PartialEq)]
pub struct OfpGroupMod {
    /// One of OfpGroupModCommand.
    pub command: u16,
    /// One of OfpGroupType.
    pub typ: u8,
    /// Group identifier.
    pub group_id: u32,
    /// The length of the bucket array is inferred from the length field in the header.
    pub buckets: Vec<OfpBucket>,
}

/* ## --------------------- ## */
/* ## OpenFlow Multipart.  ## */
/* ## --------------------- ## */

/// The type of a multipart request or reply
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OfpMultipartType {
    /// Description of this OpenFlow switch.
    Desc = 0,
    /// Individual flow statistics.
    Flow = 1,
    /// Flow table statistics.
    Table = 3,
    /// Port statistics.
    PortStats = 4,
    /// Group counter statistics.
    Group = 6,
    /// Group description.
    GroupDesc = 7,
    /// Meter statistics.
    Meter = 9,
    /// Meter features.
    MeterFeatures = 11,
    /// Port description.
    PortDesc = 13,
}

impl OfpMultipartType {
    /// Maps the wire representation
    pub fn from_u16(typ: u16) -> Option<OfpMultipartType> {
        match typ {
            0 => Some(OfpMultipartType::Desc),
            1 => Some(OfpMultipartType::Flow),
            3 => Some(OfpMultipartType::Table),
            4 => Some(OfpMultipartType::PortStats),
            6 => Some(OfpMultipartType::Group),
            7 => Some(OfpMultipartType::GroupDesc),
            9 => Some(OfpMultipartType::Meter),
            11 => Some(OfpMultipartType::MeterFeatures),
            13 => Some(OfpMultipartType::PortDesc),
            _ => None,
        }
    }
}

/// A multipart request. The body depends on the type and is not interpreted.
#[derive(Debug, PartialEq)]
pub struct OfpMultipartRequest {
    /// One of the OfpMultipartType.
    pub typ: u16,
    /// OFPMPF_REQ_* flags.
    pub flags: u16,
    /// Body of the request. 0 or more bytes.
    pub body: Vec<u8>,
}

/// Flag of a multipart reply part announcing more parts to follow.
pub const OFPMPF_REPLY_MORE: u16 = 1 << 0;

/// A multipart reply.
#[derive(Debug)]
pub struct OfpMultipartReply {
    typ: u16,
    flags: u16,
    body: OfpMultipartBody,
}

/// The typed body of an `OfpMultipartReply`
#[derive(Debug)]
pub enum OfpMultipartBody {
    /// Reply to an `OfpMultipartType::Desc` request
    Desc(OfpDesc),
    /// Reply to an `OfpMultipartType::Flow` request
    Flows(Vec<OfpFlowStats>),
    /// Reply to an `OfpMultipartType::Group` request
    Groups(Vec<OfpGroupStats>),
    /// Reply to an `OfpMultipartType::GroupDesc` request
    GroupDescs(Vec<OfpGroupDesc>),
    /// Reply to an `OfpMultipartType::Meter` request
    Meters(Vec<OfpMeterStats>),
    /// Reply to an `OfpMultipartType::MeterFeatures` request
    MeterFeatures(OfpMeterFeatures),
    /// Reply to an `OfpMultipartType::PortDesc` request
    Ports(Vec<OfpPort>),
    /// An empty reply
    Empty,
}

/// Body of reply to `OfpMultipartType::Desc` request.
/// Each entry is a NULL-terminated ASCII string.
#[derive(Debug, Clone, PartialEq)]
pub struct OfpDesc {
    /// Manufacturer description.
    pub mfr_desc: String,
    /// Hardware description.
    pub hw_desc: String,
    /// Software description.
    pub sw_desc: String,
    /// Serial number.
    pub serial_num: String,
    /// Human readable description of datapath.
    pub dp_desc: String,
}

/// Body of reply to `OfpMultipartType::Flow` request.
#[derive(Debug, Clone, PartialEq)]
pub struct OfpFlowStats {
    /// ID of table flow came from.
    pub table_id: u8,
    /// Time flow has been alive in seconds.
    pub duration_sec: u32,
    /// Time flow has been alive in nanoseconds beyond duration_sec.
    pub duration_nsec: u32,
    /// Priority of the entry.
    pub priority: u16,
    /// Number of seconds idle before expiration.
    pub idle_timeout: u16,
    /// Number of seconds before expiration.
    pub hard_timeout: u16,
    /// Bitmap of OFPFF_* flags.
    pub flags: u16,
    /// Opaque controller-issued identifier.
    pub cookie: u64,
    /// Number of packets in flow.
    pub packet_count: u64,
    /// Number of bytes in flow.
    pub byte_count: u64,
    /// Description of fields. Variable size.
    pub match_field: OfpMatch,
    /// Instruction set - 0 or more.
    pub instructions: Vec<OfpInstruction>,
}

/// Used in group stats replies.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OfpBucketCounter {
    /// Number of packets processed by bucket.
    pub packet_count: u64,
    /// Number of bytes processed by bucket.
    pub byte_count: u64,
}

/// Body of reply to `OfpMultipartType::Group` request.
#[derive(Debug, Clone, PartialEq)]
pub struct OfpGroupStats {
    /// Group identifier.
    pub group_id: u32,
    /// Number of flows or groups that directly forward to this group.
    pub ref_count: u32,
    /// Number of packets processed by group.
    pub packet_count: u64,
    /// Number of bytes processed by group.
    pub byte_count: u64,
    /// Time group has been alive in seconds.
    pub duration_sec: u32,
    /// Time group has been alive in nanoseconds beyond duration_sec.
    pub duration_nsec: u32,
    /// One counter set per bucket.
    pub bucket_stats: Vec<OfpBucketCounter>,
}

/// Body of reply to `OfpMultipartType::GroupDesc` request.
#[derive(Debug, Clone, PartialEq)]
pub struct OfpGroupDesc {
    /// One of OfpGroupType.
    pub typ: u8,
    /// Group identifier.
    pub group_id: u32,
    /// List of buckets - 0 or more.
    pub buckets: Vec<OfpBucket>,
}

/// Statistics for each meter band
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OfpMeterBandStats {
    /// Number of packets in band.
    pub packet_band_count: u64,
    /// Number of bytes in band.
    pub byte_band_count: u64,
}

/// Body of reply to `OfpMultipartType::Meter` request. Meter statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct OfpMeterStats {
    /// Meter instance.
    pub meter_id: u32,
    /// Number of flows bound to meter.
    pub flow_count: u32,
    /// Number of packets in input.
    pub packet_in_count: u64,
    /// Number of bytes in input.
    pub byte_in_count: u64,
    /// Time meter has been alive in seconds.
    pub duration_sec: u32,
    /// Time meter has been alive in nanoseconds beyond duration_sec.
    pub duration_nsec: u32,
    /// The band_stats length is inferred from the length field.
    pub band_stats: Vec<OfpMeterBandStats>,
}

/// Body of reply to `OfpMultipartType::MeterFeatures` request. Meter features.
#[derive(Debug, Clone, PartialEq)]
pub struct OfpMeterFeatures {
    /// Maximum number of meters.
    pub max_meter: u32,
    /// Bitmaps of (1 << OfpMeterBandType) values supported.
    pub band_types: u32,
    /// Bitmaps of OfpMeterFlags.
    pub capabilities: u32,
    /// Maximum bands per meters
    pub max_bands: u8,
    /// Maximum color value
    pub max_color: u8,
}

/* ## ---------------- ## */
/* ## OpenFlow Ports.  ## */
/* ## ---------------- ## */

/// Current state of the physical port. These are not configurable from the controller.
pub enum OfpPortState {
    /// No physical link present.
    LinkDown = 1 << 0,
    /// Port is blocked
    Blocked = 1 << 1,
    /// Live for Fast Failover Group.
    Live = 1 << 2,
}

/// Features of ports available in a datapath.
pub enum OfpPortFeatures {
    /// 10 Mb half-duplex rate support.
    Rate10MbHd = 1 << 0,
    /// 10 Mb full-duplex rate support.
    Rate10MbFd = 1 << 1,
    /// 100 Mb half-duplex rate support.
    Rate100MbHd = 1 << 2,
    /// 100 Mb full-duplex rate support.
    Rate100MbFd = 1 << 3,
    /// 1 Gb half-duplex rate support.
    Rate1GbHd = 1 << 4,
    /// 1 Gb full-duplex rate support.
    Rate1GbFd = 1 << 5,
    /// 10 Gb full-duplex rate support.
    Rate10GbFd = 1 << 6,
    /// 40 Gb full-duplex rate support.
    Rate40GbFd = 1 << 7,
    /// Other rate, not in the list.
    Other = 1 << 10,
    /// Copper medium.
    Copper = 1 << 11,
    /// Fiber medium.
    Fiber = 1 << 12,
    /// Auto-negotiation.
    Autoneg = 1 << 13,
}

/// Description of a port
#[derive(Debug, Clone, PartialEq)]
pub struct OfpPort {
    /// Port number.
    pub port_no: u32,
    /// Hardware address.
    pub hw_addr: [u8; 6],
    /// Null-terminated name.
    pub name: String,
    /// Bitmap of OFPPC_* flags.
    pub config: u32,
    /// Bitmap of OfpPortState flags.
    pub state: u32,

    /* Bitmaps of OfpPortFeatures that describe features. All bits zeroed if
     * unsupported or unavailable. */
    /// Current features.
    pub curr: u32,
    /// Features being advertised by the port.
    pub advertised: u32,
    /// Features supported by the port.
    pub supported: u32,
    /// Features advertised by peer.
    pub peer: u32,

    /// Current port bitrate in kbps.
    pub curr_speed: u32,
    /// Max port bitrate in kbps
    pub max_speed: u32,
}

/// What changed about the physical port
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OfpPortReason {
    /// The port was added.
    Add = 0,
    /// The port was removed.
    Delete = 1,
    /// Some attribute of the port has changed.
    Modify = 2,
}

/// A physical port has changed in the datapath
#[derive(Debug, Clone, PartialEq)]
pub struct OfpPortStatus {
    /// One of OfpPortReason.
    pub reason: OfpPortReason,
    /// The changed port.
    pub desc: OfpPort,
}

/* ## ------------------------ ## */
/* ## OpenFlow Controller Role ## */
/* ## ------------------------ ## */

/// Controller roles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OfpControllerRole {
    /// Don't change current role.
    NoChange = 0,
    /// Default role, full access.
    Equal = 1,
    /// Full access, at most one master.
    Master = 2,
    /// Read-only access.
    Slave = 3,
}

/// Role request messages (controller -> switch).
#[derive(Debug, Clone, PartialEq)]
pub struct OfpRoleRequest {
    /// One of OfpControllerRole.
    pub role: u32,
    /// Master Election Generation Id
    pub generation_id: u64,
}

/// Role reply messages (switch -> controller).
#[derive(Debug, Clone, PartialEq)]
pub struct OfpRoleReply {
    /// One of OfpControllerRole.
    pub role: u32,
    /// Master Election Generation Id
    pub generation_id: u64,
}
