/*!
Management of the ONUs behind an OLT: the managed entities, the local copy of
each ONU's MIB and the `OnuManagement` trait the provisioning code drives.

The entity wire codec is not part of this crate; entities are exchanged as
class, instance and named attributes.
*/

pub mod omci;
pub mod sequence;
#[cfg(test)]
pub mod mock;

use olt;

use std::collections::BTreeMap;
use std::error;
use std::fmt;
use std::net::Ipv4Addr;
use std::result;

/// The managed entity classes the agent creates or reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityClass {
    OntData,
    OntG,
    CardHolder,
    AniG,
    PptpEthernetUni,
    PptpPotsUni,
    Tcont,
    GemPortNetworkCtp,
    GemInterworkingTp,
    MulticastGemInterworkingTp,
    GalEthernetProfile,
    MacBridgeServiceProfile,
    MacBridgePortConfigData,
    VlanTaggingFilterData,
    ExtendedVlanTaggingOperationConfigData,
    MulticastOperationsProfile,
    MulticastSubscriberConfigInfo,
    VoipConfigData,
    IpHostConfigData,
    TcpUdpConfigData,
    VoiceServiceProfile,
    RtpProfileData,
    VoipMediaProfile,
    SipAgentConfigData,
    SipUserData,
    VoipVoiceCtp,
}

impl EntityClass {
    /// The ITU-T G.988 class id
    pub fn class_id(self) -> u16 {
        match self {
            EntityClass::OntData => 2,
            EntityClass::OntG => 256,
            EntityClass::CardHolder => 5,
            EntityClass::AniG => 263,
            EntityClass::PptpEthernetUni => 11,
            EntityClass::PptpPotsUni => 53,
            EntityClass::Tcont => 262,
            EntityClass::GemPortNetworkCtp => 268,
            EntityClass::GemInterworkingTp => 266,
            EntityClass::MulticastGemInterworkingTp => 281,
            EntityClass::GalEthernetProfile => 272,
            EntityClass::MacBridgeServiceProfile => 45,
            EntityClass::MacBridgePortConfigData => 47,
            EntityClass::VlanTaggingFilterData => 84,
            EntityClass::ExtendedVlanTaggingOperationConfigData => 171,
            EntityClass::MulticastOperationsProfile => 309,
            EntityClass::MulticastSubscriberConfigInfo => 310,
            EntityClass::VoipConfigData => 138,
            EntityClass::IpHostConfigData => 134,
            EntityClass::TcpUdpConfigData => 136,
            EntityClass::VoiceServiceProfile => 58,
            EntityClass::RtpProfileData => 143,
            EntityClass::VoipMediaProfile => 142,
            EntityClass::SipAgentConfigData => 150,
            EntityClass::SipUserData => 153,
            EntityClass::VoipVoiceCtp => 139,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrValue {
    Int(u64),
    Bool(bool),
    Text(String),
    Ip(Ipv4Addr),
    /// VLAN filter lists and similar tables
    List(Vec<u64>),
}

impl AttrValue {
    pub fn as_int(&self) -> Option<u64> {
        match *self {
            AttrValue::Int(i) => Some(i),
            AttrValue::Bool(b) => Some(b as u64),
            _ => None,
        }
    }
}

pub type Attributes = BTreeMap<String, AttrValue>;

/// A managed entity instance with (some of) its attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub class: EntityClass,
    pub instance: u16,
    #[serde(default)]
    pub attributes: Attributes,
}

impl Entity {
    pub fn new(class: EntityClass, instance: u16) -> Entity {
        Entity {
            class,
            instance,
            attributes: Attributes::new(),
        }
    }

    pub fn int(mut self, name: &str, value: u64) -> Entity {
        self.attributes.insert(name.to_string(), AttrValue::Int(value));
        self
    }

    pub fn flag(mut self, name: &str, value: bool) -> Entity {
        self.attributes.insert(name.to_string(), AttrValue::Bool(value));
        self
    }

    pub fn text(mut self, name: &str, value: &str) -> Entity {
        self.attributes.insert(name.to_string(), AttrValue::Text(value.to_string()));
        self
    }

    pub fn ip(mut self, name: &str, value: Ipv4Addr) -> Entity {
        self.attributes.insert(name.to_string(), AttrValue::Ip(value));
        self
    }

    pub fn list(mut self, name: &str, value: Vec<u64>) -> Entity {
        self.attributes.insert(name.to_string(), AttrValue::List(value));
        self
    }
}

/// One step of an entity sequence
#[derive(Debug, Clone, PartialEq)]
pub enum EntityOp {
    Create(Entity),
    Set(Entity),
    Delete(EntityClass, u16),
}

impl fmt::Display for EntityOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            EntityOp::Create(ref e) => write!(f, "create {:?} {}", e.class, e.instance),
            EntityOp::Set(ref e) => write!(f, "set {:?} {}", e.class, e.instance),
            EntityOp::Delete(class, instance) => write!(f, "delete {:?} {}", class, instance),
        }
    }
}

/// The local copy of the MIB of one ONU
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OnuMib {
    entities: BTreeMap<(EntityClass, u16), Attributes>,
}

impl OnuMib {
    pub fn new() -> OnuMib {
        OnuMib::default()
    }

    /// Adds the entity or merges its attributes into the known ones
    pub fn insert(&mut self, entity: Entity) {
        self.entities
            .entry((entity.class, entity.instance))
            .or_insert_with(Attributes::new)
            .extend(entity.attributes);
    }

    pub fn remove(&mut self, class: EntityClass, instance: u16) -> bool {
        self.entities.remove(&(class, instance)).is_some()
    }

    /// Mirrors a successful operation
    pub fn apply(&mut self, op: &EntityOp) {
        match *op {
            EntityOp::Create(ref e) | EntityOp::Set(ref e) => self.insert(e.clone()),
            EntityOp::Delete(class, instance) => {
                self.remove(class, instance);
            }
        }
    }

    /// The instance ids of a class, ascending
    pub fn entity_ids(&self, class: EntityClass) -> Vec<u16> {
        self.entities
            .keys()
            .filter(|&&(c, _)| c == class)
            .map(|&(_, id)| id)
            .collect()
    }

    pub fn exists(&self, class: EntityClass, instance: u16) -> bool {
        self.entities.contains_key(&(class, instance))
    }

    pub fn get(&self, class: EntityClass, instance: u16, field: &str) -> Option<&AttrValue> {
        self.entities.get(&(class, instance))?.get(field)
    }

    pub fn get_int(&self, class: EntityClass, instance: u16, field: &str) -> Option<u64> {
        self.get(class, instance, field)?.as_int()
    }

    pub fn set(&mut self, class: EntityClass, instance: u16, field: &str, value: AttrValue) {
        self.entities
            .entry((class, instance))
            .or_insert_with(Attributes::new)
            .insert(field.to_string(), value);
    }

    pub fn entities(&self) -> Vec<Entity> {
        self.entities
            .iter()
            .map(|(&(class, instance), attributes)| Entity {
                class,
                instance,
                attributes: attributes.clone(),
            })
            .collect()
    }

    /// The first instance of a class with the field set to the value
    pub fn find(&self, class: EntityClass, field: &str, value: u64) -> Option<u16> {
        self.entity_ids(class)
            .into_iter()
            .find(|&id| self.get_int(class, id, field) == Some(value))
    }
}

#[derive(Debug)]
pub enum Error {
    /// No answer after all attempts
    Timeout { tci: u16 },
    /// The ONU refused the operation
    Rejected { op: String, success_code: u8 },
    /// The answer does not belong to the request
    Mismatch(String),
    /// The MIB of the ONU has not been uploaded
    MissingMib { intf_id: u32, onu_id: u32 },
    MissingEntity(EntityClass),
    Olt(olt::Error),
}

impl error::Error for Error {
    fn description(&self) -> &str {
        "ONU management error"
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Timeout { tci } => write!(f, "No OMCI response to transaction {}", tci),
            Error::Rejected {
                ref op,
                success_code,
            } => write!(f, "OMCI {} failed with result {}", op, success_code),
            Error::Mismatch(ref detail) => write!(f, "Wrong OMCI response: {}", detail),
            Error::MissingMib { intf_id, onu_id } => {
                write!(f, "No MIB of ONU {} on interface {}", onu_id, intf_id)
            }
            Error::MissingEntity(class) => write!(f, "No {:?} entity in the MIB", class),
            Error::Olt(ref e) => write!(f, "{}", e),
        }
    }
}

impl From<olt::Error> for Error {
    fn from(e: olt::Error) -> Self {
        Error::Olt(e)
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Entity operations on the ONUs of one OLT, keyed by PON interface and ONU
/// id. A successful operation is mirrored into the MIB copy.
pub trait OnuManagement {
    fn create(&mut self, intf_id: u32, onu_id: u32, entity: &Entity) -> Result<()>;
    fn set(&mut self, intf_id: u32, onu_id: u32, entity: &Entity) -> Result<()>;
    fn delete(&mut self, intf_id: u32, onu_id: u32, class: EntityClass, instance: u16) -> Result<()>;
    fn mib(&self, intf_id: u32, onu_id: u32) -> Option<&OnuMib>;
    /// Brings a newly activated ONU to its default configuration and
    /// uploads its MIB
    fn initialize(&mut self, intf_id: u32, onu_id: u32) -> Result<()>;
    /// Drops the MIB copy of an ONU that went down
    fn forget(&mut self, intf_id: u32, onu_id: u32);

    fn execute(&mut self, intf_id: u32, onu_id: u32, op: &EntityOp) -> Result<()> {
        match *op {
            EntityOp::Create(ref e) => self.create(intf_id, onu_id, e),
            EntityOp::Set(ref e) => self.set(intf_id, onu_id, e),
            EntityOp::Delete(class, instance) => self.delete(intf_id, onu_id, class, instance),
        }
    }

    /// Runs a sequence in order. On a failure the entities created so far
    /// are deleted again, newest first.
    fn run(&mut self, intf_id: u32, onu_id: u32, ops: &[EntityOp]) -> Result<()> {
        for (done, op) in ops.iter().enumerate() {
            debug!("ONU {} interface {}: {}", onu_id, intf_id, op);
            if let Err(e) = self.execute(intf_id, onu_id, op) {
                error!("ONU {} interface {}: {} failed: {}", onu_id, intf_id, op, e);
                for undo in ops[..done].iter().rev() {
                    if let EntityOp::Create(ref entity) = *undo {
                        if let Err(e) = self.delete(intf_id, onu_id, entity.class, entity.instance) {
                            warn!(
                                "ONU {} interface {}: undoing {} failed: {}",
                                onu_id, intf_id, undo, e
                            );
                        }
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }
}
