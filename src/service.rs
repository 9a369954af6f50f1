/*!
Subscriber services as the OLT understands them, and how a reconstructed
service descriptor is turned into schedulers, queues and flows of the OLT.
*/

use olt;
use olt::{Action, ActionCmd, AdditionalBw, Classifier, FlowType, GroupCommand, GroupMember, TagType,
          TrafficQueue, TrafficQueues, TrafficScheduler, TrafficSchedulers, TrafficShaping};
use resources::OnuPort;

use rand::{thread_rng, Rng};

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

/// Interface id of the network facing port on the OLT side
pub const NNI_INTF_ID: u32 = 0;
const MAX_VLAN: u16 = 4096;
const MAX_TECH_PROFILE_ID: u32 = 32768;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Upstream,
    Downstream,
}

impl Direction {
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Upstream => Direction::Downstream,
            Direction::Downstream => Direction::Upstream,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Direction::Upstream => write!(f, "upstream"),
            Direction::Downstream => write!(f, "downstream"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceType {
    Unicast,
    Voip,
    Multicast,
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ServiceType::Unicast => write!(f, "unicast"),
            ServiceType::Voip => write!(f, "voip"),
            ServiceType::Multicast => write!(f, "multicast"),
        }
    }
}

/// SIP server and subscriber side of a VoIP service
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VoipTuple {
    pub sip_server: Option<Ipv4Addr>,
    pub sip_port: Option<u16>,
    pub ip_address: Option<Ipv4Addr>,
    pub rtp_port: Option<u16>,
}

/// One service direction reconstructed from the flow entries contributing to it
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDescriptor {
    /// Outermost table first
    pub cookies: Vec<u64>,
    pub vlans: Vec<u16>,
    pub meter_ids: Vec<u32>,
    /// One per contributing flow, outermost table first
    pub priorities: Vec<u16>,
    pub direction: Direction,
    pub service_type: ServiceType,
    pub onu_port: Option<u32>,
    pub nni_port: Option<u32>,
    pub group_id: Option<u32>,
    pub voip: VoipTuple,
}

/// Identifies one logical service of the OLT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceKey {
    Internet { intf_id: u32, onu_id: u32, uni_id: u32 },
    Voip { intf_id: u32, onu_id: u32, uni_id: u32 },
    Multicast { group_id: u32 },
}

impl ServiceKey {
    /// The key of a descriptor, None for a subscriber service without ONU port.
    /// A POTS port gives a VoIP key, any other port an internet key.
    pub fn of(descriptor: &ServiceDescriptor) -> Option<ServiceKey> {
        if descriptor.service_type == ServiceType::Multicast {
            return descriptor
                .group_id
                .map(|group_id| ServiceKey::Multicast { group_id });
        }
        let port = OnuPort::from_port_no(descriptor.onu_port?);
        Some(if port.pots {
            ServiceKey::Voip {
                intf_id: port.intf_id,
                onu_id: port.onu_id,
                uni_id: port.uni_id,
            }
        }
        else {
            ServiceKey::Internet {
                intf_id: port.intf_id,
                onu_id: port.onu_id,
                uni_id: port.uni_id,
            }
        })
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ServiceKey::Internet { intf_id, onu_id, uni_id } => write!(
                f,
                "internet service of interface {} ONU {} UNI {}",
                intf_id, onu_id, uni_id
            ),
            ServiceKey::Voip { intf_id, onu_id, uni_id } => write!(
                f,
                "VoIP service of interface {} ONU {} UNI {}",
                intf_id, onu_id, uni_id
            ),
            ServiceKey::Multicast { group_id } => write!(f, "multicast service of group {}", group_id),
        }
    }
}

/// True if the new priorities win over the installed ones: the first
/// differing element decides, equal lists keep the installed service.
pub fn preempts(new: &[u16], installed: &[u16]) -> bool {
    for (n, i) in new.iter().zip(installed) {
        match n.cmp(i) {
            Ordering::Greater => return true,
            Ordering::Less => return false,
            Ordering::Equal => {}
        }
    }
    false
}

/// Customer and service tag of a service direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VlanTags {
    pub c_tag: u16,
    pub s_tag: Option<u16>,
}

impl VlanTags {
    /// Derives the tags from the VLAN stack of a descriptor. An upstream
    /// stack is read from the subscriber side, so it is reversed first.
    pub fn from_stack(vlans: &[u16], direction: Direction) -> Option<VlanTags> {
        let mut stack = vlans.to_vec();
        if stack.len() > 1 && direction == Direction::Upstream {
            stack.reverse();
        }
        let first = *stack.first()?;
        Some(match stack.iter().find(|&&v| v != first && v > 0) {
            Some(&c_tag) => VlanTags {
                c_tag,
                s_tag: Some(first),
            },
            None => VlanTags {
                c_tag: first,
                s_tag: None,
            },
        })
    }

    pub fn is_double_tagged(&self) -> bool {
        self.s_tag.map_or(false, |s| s > 0 && s < MAX_VLAN)
    }

    /// The classifier of traffic arriving from the network
    pub fn downstream_classifier(&self) -> Classifier {
        match self.s_tag {
            Some(s_tag) if self.is_double_tagged() => Classifier {
                o_vid: s_tag,
                i_vid: self.c_tag,
                pkt_tag_type: TagType::DoubleTag,
            },
            _ => Classifier {
                o_vid: self.c_tag,
                i_vid: 0,
                pkt_tag_type: TagType::SingleTag,
            },
        }
    }

    pub fn downstream_action(&self) -> Action {
        Action {
            o_vid: 0,
            cmd: ActionCmd {
                add_outer_tag: false,
                remove_outer_tag: self.is_double_tagged(),
            },
        }
    }

    /// The classifier of traffic arriving from the subscriber
    pub fn upstream_classifier(&self) -> Classifier {
        Classifier {
            o_vid: self.c_tag,
            i_vid: 0,
            pkt_tag_type: TagType::SingleTag,
        }
    }

    pub fn upstream_action(&self) -> Action {
        Action {
            o_vid: self.s_tag.unwrap_or(0),
            cmd: ActionCmd {
                add_outer_tag: self.is_double_tagged(),
                remove_outer_tag: false,
            },
        }
    }
}

/// The installed state of one service direction
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionConfig {
    pub flow_id: u32,
    pub cookies: Vec<u64>,
    pub tags: VlanTags,
    pub priorities: Vec<u16>,
    pub shaping: TrafficShaping,
}

/// SIP account and addressing of a VoIP service
#[derive(Debug, Clone, PartialEq)]
pub struct VoipProfile {
    pub sip_server: Ipv4Addr,
    pub sip_port: u16,
    pub extension: u32,
    pub password: String,
    pub ip_address: Option<Ipv4Addr>,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub rtp_port: Option<u16>,
}

pub fn random_tech_profile_id() -> u32 {
    thread_rng().gen_range(0, MAX_TECH_PROFILE_ID)
}

/// An internet or VoIP service of one UNI, installed per direction
#[derive(Debug, Clone)]
pub struct UnicastService {
    pub port: OnuPort,
    pub gemport_id: u32,
    pub tech_profile_id: u32,
    pub voip: Option<VoipProfile>,
    pub downstream: Option<DirectionConfig>,
    pub upstream: Option<DirectionConfig>,
}

impl UnicastService {
    pub fn new(port: OnuPort, gemport_id: u32, voip: Option<VoipProfile>) -> UnicastService {
        UnicastService {
            port,
            gemport_id,
            tech_profile_id: random_tech_profile_id(),
            voip,
            downstream: None,
            upstream: None,
        }
    }

    pub fn alloc_id(&self) -> u32 {
        self.gemport_id
    }

    pub fn direction(&self, direction: Direction) -> Option<&DirectionConfig> {
        match direction {
            Direction::Downstream => self.downstream.as_ref(),
            Direction::Upstream => self.upstream.as_ref(),
        }
    }

    pub fn set_direction(&mut self, direction: Direction, config: Option<DirectionConfig>) {
        match direction {
            Direction::Downstream => self.downstream = config,
            Direction::Upstream => self.upstream = config,
        }
    }

    /// No direction is installed
    pub fn is_empty(&self) -> bool {
        self.downstream.is_none() && self.upstream.is_none()
    }

    pub fn schedulers(&self, direction: Direction, config: &DirectionConfig) -> TrafficSchedulers {
        let (alloc_id, additional_bw) = match direction {
            Direction::Upstream => (self.alloc_id(), AdditionalBw::BestEffort),
            Direction::Downstream => (0, AdditionalBw::Auto),
        };
        TrafficSchedulers {
            intf_id: self.port.intf_id,
            onu_id: self.port.onu_id,
            uni_id: self.port.uni_id,
            port_no: self.port.port_no(),
            traffic_scheds: vec![TrafficScheduler {
                direction,
                alloc_id,
                additional_bw,
                priority: 0,
                weight: 0,
                traffic_shaping_info: config.shaping,
                tech_profile_id: self.tech_profile_id,
            }],
        }
    }

    pub fn queues(&self, direction: Direction) -> TrafficQueues {
        TrafficQueues {
            intf_id: self.port.intf_id,
            onu_id: self.port.onu_id,
            uni_id: self.port.uni_id,
            port_no: self.port.port_no(),
            tech_profile_id: self.tech_profile_id,
            traffic_queues: vec![TrafficQueue {
                direction,
                gemport_id: self.gemport_id,
                priority: 0,
                weight: 0,
            }],
        }
    }

    /// The OLT flow of a direction. It is symmetric to the installed
    /// opposite direction when both use the same tags.
    pub fn flow(&self, direction: Direction, config: &DirectionConfig) -> olt::Flow {
        let opposite = match direction {
            Direction::Downstream => self.upstream.as_ref(),
            Direction::Upstream => self.downstream.as_ref(),
        };
        let symmetric_flow_id = match opposite {
            Some(other) if other.tags == config.tags => other.flow_id,
            _ => 0,
        };
        let (classifier, action) = match direction {
            Direction::Downstream => (
                config.tags.downstream_classifier(),
                config.tags.downstream_action(),
            ),
            Direction::Upstream => (
                config.tags.upstream_classifier(),
                config.tags.upstream_action(),
            ),
        };
        olt::Flow {
            access_intf_id: self.port.intf_id,
            onu_id: self.port.onu_id,
            uni_id: self.port.uni_id,
            flow_id: config.flow_id,
            symmetric_flow_id,
            flow_type: FlowType::from(direction),
            network_intf_id: NNI_INTF_ID,
            gemport_id: self.gemport_id,
            classifier,
            action,
            priority: config.priorities.first().cloned().unwrap_or(0),
            cookie: u64::from(config.flow_id),
            port_no: self.port.port_no(),
            group_id: 0,
            tech_profile_id: self.tech_profile_id,
        }
    }
}

/// A multicast group served by one GEM port. The OLT replicates to every
/// PON interface with a member; the ONU side is configured per member port.
#[derive(Debug, Clone)]
pub struct MulticastService {
    pub group_id: u32,
    pub gemport_id: u32,
    pub tech_profile_id: u32,
    pub flow_id: u32,
    pub cookies: Vec<u64>,
    pub tags: VlanTags,
    pub priorities: Vec<u16>,
    pub shaping: TrafficShaping,
    pub members: BTreeMap<u32, OnuPort>,
}

impl MulticastService {
    pub fn has_interface(&self, intf_id: u32) -> bool {
        self.members.values().any(|p| p.intf_id == intf_id)
    }

    pub fn group(&self, command: GroupCommand, intfs: &[u32]) -> olt::Group {
        olt::Group {
            group_id: self.group_id,
            command,
            members: intfs
                .iter()
                .map(|&interface_id| GroupMember {
                    interface_id,
                    gem_port_id: self.gemport_id,
                    priority: 0,
                })
                .collect(),
            action: self.tags.downstream_action(),
        }
    }

    pub fn schedulers(&self, intf_id: u32) -> TrafficSchedulers {
        TrafficSchedulers {
            intf_id,
            onu_id: 0,
            uni_id: 0,
            port_no: 0,
            traffic_scheds: vec![TrafficScheduler {
                direction: Direction::Downstream,
                alloc_id: 0,
                additional_bw: AdditionalBw::Auto,
                priority: 0,
                weight: 0,
                traffic_shaping_info: self.shaping,
                tech_profile_id: self.tech_profile_id,
            }],
        }
    }

    pub fn queues(&self, intf_id: u32) -> TrafficQueues {
        TrafficQueues {
            intf_id,
            onu_id: 0,
            uni_id: 0,
            port_no: 0,
            tech_profile_id: self.tech_profile_id,
            traffic_queues: vec![TrafficQueue {
                direction: Direction::Downstream,
                gemport_id: self.gemport_id,
                priority: 0,
                weight: 0,
            }],
        }
    }

    pub fn flow(&self, intf_id: u32) -> olt::Flow {
        olt::Flow {
            access_intf_id: intf_id,
            onu_id: 0,
            uni_id: 0,
            flow_id: self.flow_id,
            symmetric_flow_id: 0,
            flow_type: FlowType::Multicast,
            network_intf_id: NNI_INTF_ID,
            gemport_id: self.gemport_id,
            classifier: self.tags.downstream_classifier(),
            action: Action::default(),
            priority: self.priorities.first().cloned().unwrap_or(0),
            cookie: u64::from(self.flow_id),
            port_no: 0,
            group_id: self.group_id,
            tech_profile_id: self.tech_profile_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(service_type: ServiceType) -> ServiceDescriptor {
        ServiceDescriptor {
            cookies: vec![1, 2],
            vlans: vec![900, 0],
            meter_ids: vec![7],
            priorities: vec![1000, 1000],
            direction: Direction::Downstream,
            service_type,
            onu_port: Some(OnuPort::new(1, 2, 3, false).port_no()),
            nni_port: Some(0x14),
            group_id: None,
            voip: VoipTuple::default(),
        }
    }

    fn config(flow_id: u32, tags: VlanTags) -> DirectionConfig {
        DirectionConfig {
            flow_id,
            cookies: vec![1],
            tags,
            priorities: vec![1000],
            shaping: TrafficShaping {
                cir: 1000,
                pir: 2000,
                pbs: 100,
            },
        }
    }

    #[test]
    fn service_keys() {
        assert_eq!(
            Some(ServiceKey::Internet {
                intf_id: 1,
                onu_id: 2,
                uni_id: 3,
            }),
            ServiceKey::of(&descriptor(ServiceType::Unicast))
        );
        let mut voip = descriptor(ServiceType::Voip);
        voip.onu_port = Some(OnuPort::new(1, 2, 3, true).port_no());
        assert_eq!(
            Some(ServiceKey::Voip {
                intf_id: 1,
                onu_id: 2,
                uni_id: 3,
            }),
            ServiceKey::of(&voip)
        );
        let mut multicast = descriptor(ServiceType::Multicast);
        multicast.onu_port = None;
        assert_eq!(None, ServiceKey::of(&multicast));
        multicast.group_id = Some(5);
        assert_eq!(
            Some(ServiceKey::Multicast { group_id: 5 }),
            ServiceKey::of(&multicast)
        );
    }

    #[test]
    fn service_kind_follows_the_port() {
        let internet = ServiceKey::Internet {
            intf_id: 1,
            onu_id: 2,
            uni_id: 3,
        };
        assert_eq!(Some(internet), ServiceKey::of(&descriptor(ServiceType::Voip)));

        let mut on_pots = descriptor(ServiceType::Unicast);
        on_pots.onu_port = Some(OnuPort::new(1, 2, 3, true).port_no());
        assert_eq!(
            Some(ServiceKey::Voip {
                intf_id: 1,
                onu_id: 2,
                uni_id: 3,
            }),
            ServiceKey::of(&on_pots)
        );
    }

    #[test]
    fn priority_comparison() {
        assert!(preempts(&[2000, 10], &[1000, 20]));
        assert!(!preempts(&[1000, 10], &[1000, 20]));
        assert!(preempts(&[1000, 30], &[1000, 20]));
        assert!(!preempts(&[1000, 20], &[1000, 20]));
        assert!(!preempts(&[1000], &[1000, 20]));
    }

    #[test]
    fn vlan_tags_from_stack() {
        assert_eq!(
            Some(VlanTags {
                c_tag: 900,
                s_tag: None,
            }),
            VlanTags::from_stack(&[900, 0], Direction::Downstream)
        );
        assert_eq!(
            Some(VlanTags {
                c_tag: 20,
                s_tag: Some(100),
            }),
            VlanTags::from_stack(&[100, 20], Direction::Downstream)
        );
        assert_eq!(
            Some(VlanTags {
                c_tag: 20,
                s_tag: Some(100),
            }),
            VlanTags::from_stack(&[20, 100], Direction::Upstream)
        );
        assert_eq!(
            Some(VlanTags {
                c_tag: 30,
                s_tag: None,
            }),
            VlanTags::from_stack(&[30], Direction::Upstream)
        );
        assert_eq!(None, VlanTags::from_stack(&[], Direction::Upstream));
    }

    #[test]
    fn double_tagged_classifiers() {
        let tags = VlanTags {
            c_tag: 20,
            s_tag: Some(100),
        };
        assert!(tags.is_double_tagged());
        let dw = tags.downstream_classifier();
        assert_eq!((100, 20, TagType::DoubleTag), (dw.o_vid, dw.i_vid, dw.pkt_tag_type));
        assert!(tags.downstream_action().cmd.remove_outer_tag);
        let up = tags.upstream_action();
        assert_eq!(100, up.o_vid);
        assert!(up.cmd.add_outer_tag);

        let single = VlanTags {
            c_tag: 20,
            s_tag: Some(4096),
        };
        assert!(!single.is_double_tagged());
        assert_eq!(TagType::SingleTag, single.downstream_classifier().pkt_tag_type);
    }

    #[test]
    fn symmetric_flows() {
        let tags = VlanTags {
            c_tag: 20,
            s_tag: None,
        };
        let mut testee = UnicastService::new(OnuPort::new(1, 2, 3, false), 1024, None);
        testee.set_direction(Direction::Downstream, Some(config(11, tags)));

        let up = testee.flow(Direction::Upstream, &config(22, tags));
        assert_eq!(11, up.symmetric_flow_id);
        assert_eq!(FlowType::Upstream, up.flow_type);
        assert_eq!(1024, up.gemport_id);
        assert_eq!(OnuPort::new(1, 2, 3, false).port_no(), up.port_no);

        let other = VlanTags {
            c_tag: 21,
            s_tag: None,
        };
        assert_eq!(0, testee.flow(Direction::Upstream, &config(22, other)).symmetric_flow_id);
    }

    #[test]
    fn upstream_scheduler_uses_alloc_id() {
        let tags = VlanTags {
            c_tag: 20,
            s_tag: None,
        };
        let testee = UnicastService::new(OnuPort::new(1, 2, 3, false), 1024, None);
        let up = testee.schedulers(Direction::Upstream, &config(1, tags));
        assert_eq!(1024, up.traffic_scheds[0].alloc_id);
        assert_eq!(AdditionalBw::BestEffort, up.traffic_scheds[0].additional_bw);
        assert_eq!(1000, up.traffic_scheds[0].traffic_shaping_info.cir);
        let dw = testee.schedulers(Direction::Downstream, &config(1, tags));
        assert_eq!(0, dw.traffic_scheds[0].alloc_id);
        assert!(testee.tech_profile_id < MAX_TECH_PROFILE_ID);
    }
}
