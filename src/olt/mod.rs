/*!
The hardware side of an OLT: the data model of its remote procedure interface
and the `OltDriver` trait the provisioning code calls into.
*/

pub mod jsonrpc;
#[cfg(test)]
pub mod mock;

use service::Direction;

use serde_json;

use std::error;
use std::fmt;
use std::io;
use std::result;

/// A failed call to the OLT
#[derive(Debug)]
pub enum Error {
    /// The OLT answered with an error status
    Rpc { code: i32, message: String },
    /// The connection to the OLT broke
    Io(io::Error),
    /// A message could not be encoded or decoded
    Decode(serde_json::Error),
}

impl error::Error for Error {
    fn description(&self) -> &str {
        "OLT remote procedure call error"
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Rpc { code, ref message } => write!(f, "RPC error {} | Details: {}", code, message),
            Error::Io(ref e) => write!(f, "{}", e),
            Error::Decode(ref e) => write!(f, "Malformed message: {}", e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Decode(e)
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Identification and resource ranges reported by the OLT
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub vendor: String,
    pub model: String,
    pub hardware_version: String,
    pub firmware_version: String,
    pub device_id: String,
    pub device_serial_number: String,
    pub pon_ports: u32,
    pub onu_id_start: u32,
    pub onu_id_end: u32,
    pub alloc_id_start: u32,
    pub alloc_id_end: u32,
    pub gemport_id_start: u32,
    pub gemport_id_end: u32,
    pub flow_id_start: u32,
    pub flow_id_end: u32,
}

impl DeviceInfo {
    /// The datapath id announced to the controller, built from the hex
    /// digits of the device id (usually its MAC address).
    pub fn datapath_id(&self) -> Option<u64> {
        let digits: String = self.device_id
            .chars()
            .filter(|c| c.is_digit(16))
            .collect();
        if digits.is_empty() || digits.len() > 16 {
            return None;
        }
        u64::from_str_radix(&digits, 16).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialNumber {
    pub vendor_id: String,
    pub vendor_specific: Vec<u8>,
}

impl fmt::Display for SerialNumber {
    /// Vendor id followed by the first 8 hex digits of the vendor specific part
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.vendor_id)?;
        for byte in self.vendor_specific.iter().take(4) {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Onu {
    pub intf_id: u32,
    pub onu_id: u32,
    pub serial_number: SerialNumber,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagType {
    Untagged,
    SingleTag,
    DoubleTag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classifier {
    pub o_vid: u16,
    pub i_vid: u16,
    pub pkt_tag_type: TagType,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionCmd {
    pub add_outer_tag: bool,
    pub remove_outer_tag: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub o_vid: u16,
    pub cmd: ActionCmd,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    Upstream,
    Downstream,
    Multicast,
}

impl From<Direction> for FlowType {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Upstream => FlowType::Upstream,
            Direction::Downstream => FlowType::Downstream,
        }
    }
}

/// A forwarding rule of the OLT
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub access_intf_id: u32,
    pub onu_id: u32,
    pub uni_id: u32,
    pub flow_id: u32,
    pub symmetric_flow_id: u32,
    pub flow_type: FlowType,
    pub network_intf_id: u32,
    pub gemport_id: u32,
    pub classifier: Classifier,
    pub action: Action,
    pub priority: u16,
    pub cookie: u64,
    pub port_no: u32,
    pub group_id: u32,
    pub tech_profile_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdditionalBw {
    None,
    BestEffort,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrafficShaping {
    pub cir: u32,
    pub pir: u32,
    pub pbs: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficScheduler {
    pub direction: Direction,
    pub alloc_id: u32,
    pub additional_bw: AdditionalBw,
    pub priority: u32,
    pub weight: u32,
    pub traffic_shaping_info: TrafficShaping,
    pub tech_profile_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficSchedulers {
    pub intf_id: u32,
    pub onu_id: u32,
    pub uni_id: u32,
    pub port_no: u32,
    pub traffic_scheds: Vec<TrafficScheduler>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficQueue {
    pub direction: Direction,
    pub gemport_id: u32,
    pub priority: u32,
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficQueues {
    pub intf_id: u32,
    pub onu_id: u32,
    pub uni_id: u32,
    pub port_no: u32,
    pub tech_profile_id: u32,
    pub traffic_queues: Vec<TrafficQueue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    pub interface_id: u32,
    pub gem_port_id: u32,
    pub priority: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupCommand {
    SetMembers,
    AddMembers,
    RemoveMembers,
}

/// A multicast replication group of the OLT
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub group_id: u32,
    pub command: GroupCommand,
    pub members: Vec<GroupMember>,
    pub action: Action,
}

/// An OMCI frame toward an ONU
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmciMsg {
    pub intf_id: u32,
    pub onu_id: u32,
    pub pkt: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperState {
    Up,
    Down,
}

/// Asynchronous events of an OLT
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Indication {
    OnuDiscovery {
        intf_id: u32,
        serial_number: SerialNumber,
    },
    Onu {
        intf_id: u32,
        onu_id: u32,
        oper_state: OperState,
        admin_state: OperState,
        fail_reason: u32,
    },
    Omci {
        intf_id: u32,
        onu_id: u32,
        pkt: Vec<u8>,
    },
    FlowStats {
        flow_id: u32,
        rx_bytes: u64,
        rx_packets: u64,
        tx_bytes: u64,
        tx_packets: u64,
        timestamp: u64,
    },
}

pub type Indications = Box<dyn Iterator<Item = Result<Indication>> + Send>;

/// The remote procedure interface of an OLT.
/// Every call is synchronous and reports the remote failure.
pub trait OltDriver: Send + Sync {
    fn device_info(&self) -> Result<DeviceInfo>;
    fn activate_onu(&self, onu: &Onu) -> Result<()>;
    fn flow_add(&self, flow: &Flow) -> Result<()>;
    fn flow_remove(&self, flow: &Flow) -> Result<()>;
    fn perform_group_operation(&self, group: &Group) -> Result<()>;
    fn delete_group(&self, group: &Group) -> Result<()>;
    fn create_traffic_schedulers(&self, scheds: &TrafficSchedulers) -> Result<()>;
    fn remove_traffic_schedulers(&self, scheds: &TrafficSchedulers) -> Result<()>;
    fn create_traffic_queues(&self, queues: &TrafficQueues) -> Result<()>;
    fn remove_traffic_queues(&self, queues: &TrafficQueues) -> Result<()>;
    fn omci_msg_out(&self, msg: &OmciMsg) -> Result<()>;
    /// Opens the indication stream, which ends when the connection is lost
    fn enable_indication(&self) -> Result<Indications>;
}
