//! The entity sequences configuring an ONU for its default bridge and for
//! each service type. Sequences are planned against the MIB copy before any
//! of them is sent.

use onu::{EntityClass, EntityOp, Entity, OnuMib, Result, Error};
use service::VoipProfile;

use std::net::Ipv4Addr;

/// Alloc id of a T-CONT not bound to a service
pub const FREE_ALLOC_ID: u64 = 0xffff;
const GAL_PROFILE_ID: u16 = 1;
const DEFAULT_RTP_PORT: u16 = 5004;
/// Priority value telling the ONU to keep the received priority bits
const ANY_PRIORITY: u64 = 8;

const TP_PPTP_ETH_UNI: u64 = 1;
const TP_GEM_IW_TP: u64 = 5;
const TP_MC_GEM_IW_TP: u64 = 6;

const GEM_BIDIRECTIONAL: u64 = 3;
const GEM_DOWNSTREAM: u64 = 2;

const ASSOC_PPTP_ETH_UNI: u64 = 2;
const ASSOC_IP_HOST: u64 = 3;

/// The parameters of an internet or VoIP service on one ONU
#[derive(Debug, Clone)]
pub struct UnicastEntities<'a> {
    /// Ethernet UNI for internet, POTS UNI for VoIP
    pub uni_id: u16,
    pub gemport_id: u16,
    pub c_tag: u16,
    /// C-tag of the other installed direction
    pub other_c_tag: Option<u16>,
    pub voip: Option<&'a VoipProfile>,
}

impl<'a> UnicastEntities<'a> {
    fn vlan_filter(&self) -> EntityOp {
        let mut vlans = vec![u64::from(self.c_tag)];
        if let Some(other) = self.other_c_tag {
            if other > 0 && other != self.c_tag {
                vlans.push(u64::from(other));
            }
        }
        EntityOp::Create(vlan_filter(self.gemport_id, vlans))
    }

    /// The extended VLAN tagging entity forwarding the c-tag
    fn tagging_target(&self, mib: &OnuMib) -> Result<u16> {
        match self.voip {
            Some(_) => ip_host(mib),
            None => Ok(self.uni_id),
        }
    }
}

/// The parameters of one multicast member
#[derive(Debug, Clone)]
pub struct MulticastEntities {
    pub uni_id: u16,
    pub gemport_id: u16,
    pub c_tag: u16,
}

fn vlan_filter(gemport_id: u16, vlans: Vec<u64>) -> Entity {
    Entity::new(EntityClass::VlanTaggingFilterData, gemport_id)
        .int("forward_operation", 0x10)
        .int("number_of_entries", vlans.len() as u64)
        .int("priority", ANY_PRIORITY)
        .list("vlan_filter_list", vlans)
}

fn single_tag_rule(instance: u16, c_tag: u16, delete: bool) -> EntityOp {
    EntityOp::Set(
        Entity::new(EntityClass::ExtendedVlanTaggingOperationConfigData, instance)
            .text("filter", "single_tag")
            .int("filter_inner_vid", u64::from(c_tag))
            .int("tags_to_remove", 0)
            .int("treatment_inner_priority", ANY_PRIORITY)
            .int("treatment_inner_vid", u64::from(c_tag))
            .flag("delete", delete),
    )
}

fn default_rule(instance: u16, filter: &str) -> EntityOp {
    EntityOp::Set(
        Entity::new(EntityClass::ExtendedVlanTaggingOperationConfigData, instance)
            .text("filter", filter)
            .int("tags_to_remove", 3)
            .int("treatment_tpid", 0),
    )
}

/// The MAC bridge service profile of the ONU
pub fn bridge_id(mib: &OnuMib) -> u16 {
    mib.entity_ids(EntityClass::MacBridgeServiceProfile)
        .first()
        .cloned()
        .unwrap_or(1)
}

fn ip_host(mib: &OnuMib) -> Result<u16> {
    mib.entity_ids(EntityClass::IpHostConfigData)
        .first()
        .cloned()
        .ok_or(Error::MissingEntity(EntityClass::IpHostConfigData))
}

/// The default entities of a freshly uploaded MIB: the bridge, the GAL
/// profile and a bridge port with restrictive tagging rules per Ethernet UNI
pub fn init(mib: &OnuMib) -> Result<Vec<EntityOp>> {
    let ani = *mib.entity_ids(EntityClass::AniG)
        .first()
        .ok_or(Error::MissingEntity(EntityClass::AniG))?;
    let slot = (ani >> 8) & 0xff;
    let bridge = if mib.exists(EntityClass::CardHolder, slot) {
        ((slot << 8) & 0xff00) | 0x01
    }
    else {
        1
    };

    let mut ops = vec![
        EntityOp::Create(
            Entity::new(EntityClass::MacBridgeServiceProfile, bridge)
                .flag("spanning_tree_ind", true)
                .flag("learning_ind", true)
                .flag("port_bridging_ind", true)
                .int("priority", 32000)
                .int("max_age", 1536)
                .int("hello_time", 512)
                .int("forward_delay", 1024)
                .flag("unknown_mac_address_discard", false),
        ),
        EntityOp::Create(
            Entity::new(EntityClass::GalEthernetProfile, GAL_PROFILE_ID).int("max_gem_payload_size", 48),
        ),
    ];
    for uni in mib.entity_ids(EntityClass::PptpEthernetUni) {
        ops.push(EntityOp::Create(
            Entity::new(EntityClass::MacBridgePortConfigData, uni)
                .int("bridge_id_pointer", u64::from(bridge))
                .int("port_num", u64::from(uni & 0xff))
                .int("tp_type", TP_PPTP_ETH_UNI)
                .int("tp_pointer", u64::from(uni)),
        ));
        ops.push(EntityOp::Create(
            Entity::new(EntityClass::ExtendedVlanTaggingOperationConfigData, uni)
                .int("association_type", ASSOC_PPTP_ETH_UNI)
                .int("associated_me_pointer", u64::from(uni)),
        ));
        for filter in &["untagged", "single_tag", "double_tag"] {
            ops.push(default_rule(uni, filter));
        }
    }
    Ok(ops)
}

fn voip_install(mib: &OnuMib, uni_id: u16, gemport_id: u16, voip: &VoipProfile) -> Result<Vec<EntityOp>> {
    let ip_host = ip_host(mib)?;
    let rtp_port = voip.rtp_port.unwrap_or(DEFAULT_RTP_PORT);
    let uni = u64::from(uni_id);
    let ip_address = voip.ip_address.unwrap_or_else(|| Ipv4Addr::new(0, 0, 0, 0));
    Ok(vec![
        EntityOp::Set(
            Entity::new(EntityClass::VoipConfigData, 0)
                .int("signalling_protocol_used", 1)
                .int("voip_configuration_method_used", 1),
        ),
        EntityOp::Set(
            Entity::new(EntityClass::IpHostConfigData, ip_host)
                .int("ip_options", if voip.ip_address.is_some() { 0 } else { 1 })
                .ip("ip_address", ip_address)
                .ip("mask", voip.netmask)
                .ip("gateway", voip.gateway),
        ),
        EntityOp::Create(
            Entity::new(EntityClass::TcpUdpConfigData, rtp_port)
                .int("port_id", u64::from(rtp_port))
                .int("protocol", 17)
                .int("ip_host_pointer", u64::from(ip_host)),
        ),
        EntityOp::Create(
            Entity::new(EntityClass::ExtendedVlanTaggingOperationConfigData, ip_host)
                .int("association_type", ASSOC_IP_HOST)
                .int("associated_me_pointer", u64::from(ip_host)),
        ),
        EntityOp::Create(Entity::new(EntityClass::VoiceServiceProfile, uni_id).int("announcement_type", 3)),
        EntityOp::Create(
            Entity::new(EntityClass::RtpProfileData, uni_id)
                .int("local_port_min", u64::from(rtp_port))
                .int("local_port_max", u64::from(rtp_port)),
        ),
        EntityOp::Create(
            Entity::new(EntityClass::VoipMediaProfile, uni_id)
                .int("voice_service_profile_pointer", uni)
                .int("rtp_profile_pointer", uni),
        ),
        EntityOp::Create(
            Entity::new(EntityClass::SipAgentConfigData, uni_id)
                .ip("proxy_server_address", voip.sip_server)
                .ip("registrar", voip.sip_server)
                .int("sip_port", u64::from(voip.sip_port))
                .int("tcp_udp_pointer", u64::from(rtp_port)),
        ),
        EntityOp::Create(
            Entity::new(EntityClass::SipUserData, uni_id)
                .int("sip_agent_pointer", uni)
                .text("user_part_aor", &voip.extension.to_string())
                .text("username", &voip.extension.to_string())
                .text("password", &voip.password)
                .int("pptp_pointer", uni)
                .int("voip_media_profile_pointer", uni)
                .int("gemport_id", u64::from(gemport_id)),
        ),
        EntityOp::Set(Entity::new(EntityClass::PptpPotsUni, uni_id).int("administrative_state", 0)),
        EntityOp::Create(
            Entity::new(EntityClass::VoipVoiceCtp, uni_id)
                .int("user_protocol_pointer", uni)
                .int("pptp_pointer", uni)
                .int("voip_media_profile_pointer", uni)
                .int("signalling_code", 1),
        ),
    ])
}

fn voip_remove(mib: &OnuMib, uni_id: u16, voip: &VoipProfile) -> Result<Vec<EntityOp>> {
    let ip_host = ip_host(mib)?;
    Ok(vec![
        EntityOp::Delete(EntityClass::VoipVoiceCtp, uni_id),
        EntityOp::Set(Entity::new(EntityClass::PptpPotsUni, uni_id).int("administrative_state", 1)),
        EntityOp::Delete(EntityClass::SipUserData, uni_id),
        EntityOp::Delete(EntityClass::SipAgentConfigData, uni_id),
        EntityOp::Delete(EntityClass::VoipMediaProfile, uni_id),
        EntityOp::Delete(EntityClass::RtpProfileData, uni_id),
        EntityOp::Delete(EntityClass::VoiceServiceProfile, uni_id),
        EntityOp::Delete(EntityClass::ExtendedVlanTaggingOperationConfigData, ip_host),
        EntityOp::Delete(
            EntityClass::TcpUdpConfigData,
            voip.rtp_port.unwrap_or(DEFAULT_RTP_PORT),
        ),
    ])
}

/// Full configuration of the first installed direction of a service
pub fn unicast_install(mib: &OnuMib, u: &UnicastEntities) -> Result<Vec<EntityOp>> {
    let tcont = mib.find(EntityClass::Tcont, "alloc_id", FREE_ALLOC_ID)
        .ok_or(Error::MissingEntity(EntityClass::Tcont))?;
    let gem = u64::from(u.gemport_id);
    let bridge = u64::from(bridge_id(mib));

    let mut ops = vec![
        EntityOp::Set(Entity::new(EntityClass::Tcont, tcont).int("alloc_id", gem)),
        EntityOp::Create(
            Entity::new(EntityClass::GemPortNetworkCtp, u.gemport_id)
                .int("port_id", gem)
                .int("tcont_pointer", u64::from(tcont))
                .int("direction", GEM_BIDIRECTIONAL)
                .int("priority_queue_pointer", 0)
                .int("encryption_key_ring", 0),
        ),
        EntityOp::Create(
            Entity::new(EntityClass::GemInterworkingTp, u.gemport_id)
                .int("gem_port_network_ctp_pointer", gem)
                .int("interworking_option", 1)
                .int("service_profile_pointer", bridge)
                .int("gal_profile_pointer", u64::from(GAL_PROFILE_ID)),
        ),
        EntityOp::Create(
            Entity::new(EntityClass::MacBridgePortConfigData, u.gemport_id)
                .int("bridge_id_pointer", bridge)
                .int("port_num", gem & 0xff)
                .int("tp_type", TP_GEM_IW_TP)
                .int("tp_pointer", gem),
        ),
    ];
    if let Some(voip) = u.voip {
        ops.extend(voip_install(mib, u.uni_id, u.gemport_id, voip)?);
    }
    ops.push(u.vlan_filter());
    ops.push(single_tag_rule(u.tagging_target(mib)?, u.c_tag, false));
    Ok(ops)
}

/// Adds the c-tag of a complementary direction to the configured service
pub fn unicast_update(mib: &OnuMib, u: &UnicastEntities) -> Result<Vec<EntityOp>> {
    Ok(vec![
        EntityOp::Delete(EntityClass::VlanTaggingFilterData, u.gemport_id),
        u.vlan_filter(),
        single_tag_rule(u.tagging_target(mib)?, u.c_tag, false),
    ])
}

/// Removes a direction; `last` removes the whole service from the ONU,
/// otherwise the VLAN filter keeps the c-tag of the other direction.
pub fn unicast_remove(mib: &OnuMib, u: &UnicastEntities, last: bool) -> Result<Vec<EntityOp>> {
    let target = u.tagging_target(mib)?;
    let mut ops = vec![];
    if last || u.other_c_tag != Some(u.c_tag) {
        ops.push(single_tag_rule(target, u.c_tag, true));
    }
    ops.push(EntityOp::Delete(EntityClass::VlanTaggingFilterData, u.gemport_id));

    if !last {
        if let Some(other) = u.other_c_tag {
            ops.push(EntityOp::Create(vlan_filter(u.gemport_id, vec![u64::from(other)])));
        }
        return Ok(ops);
    }

    if let Some(voip) = u.voip {
        ops.extend(voip_remove(mib, u.uni_id, voip)?);
    }
    ops.push(EntityOp::Delete(EntityClass::MacBridgePortConfigData, u.gemport_id));
    ops.push(EntityOp::Delete(EntityClass::GemInterworkingTp, u.gemport_id));
    ops.push(EntityOp::Delete(EntityClass::GemPortNetworkCtp, u.gemport_id));
    match mib.find(EntityClass::Tcont, "alloc_id", u64::from(u.gemport_id)) {
        Some(tcont) => ops.push(EntityOp::Set(
            Entity::new(EntityClass::Tcont, tcont).int("alloc_id", FREE_ALLOC_ID),
        )),
        None => warn!("No T-CONT holds alloc id {}", u.gemport_id),
    }
    Ok(ops)
}

/// Joins a UNI to a multicast GEM port. The GEM port entities are created
/// once per ONU.
pub fn multicast_install(mib: &OnuMib, m: &MulticastEntities) -> Vec<EntityOp> {
    let gem = u64::from(m.gemport_id);
    let mut ops = vec![];
    if !mib.exists(EntityClass::GemPortNetworkCtp, m.gemport_id) {
        ops.push(EntityOp::Create(
            Entity::new(EntityClass::GemPortNetworkCtp, m.gemport_id)
                .int("port_id", gem)
                .int("tcont_pointer", 0)
                .int("direction", GEM_DOWNSTREAM),
        ));
        ops.push(EntityOp::Create(
            Entity::new(EntityClass::MulticastGemInterworkingTp, m.gemport_id)
                .int("gem_port_network_ctp_pointer", gem)
                .int("interworking_option", 0)
                .int("service_profile_pointer", u64::from(bridge_id(mib)))
                .int("gal_profile_pointer", u64::from(GAL_PROFILE_ID)),
        ));
        ops.push(EntityOp::Create(
            Entity::new(EntityClass::MacBridgePortConfigData, m.gemport_id)
                .int("bridge_id_pointer", u64::from(bridge_id(mib)))
                .int("port_num", gem & 0xff)
                .int("tp_type", TP_MC_GEM_IW_TP)
                .int("tp_pointer", gem),
        ));
        ops.push(EntityOp::Create(
            Entity::new(EntityClass::MulticastOperationsProfile, m.gemport_id)
                .int("upstream_igmp_tci", u64::from(m.c_tag))
                .int("upstream_igmp_priority", ANY_PRIORITY)
                .list("dynamic_access_control_list", vec![gem]),
        ));
    }
    ops.push(EntityOp::Create(
        Entity::new(EntityClass::MulticastSubscriberConfigInfo, m.uni_id)
            .int("me_type", 0)
            .int("multicast_operations_profile_pointer", gem),
    ));
    ops
}

/// Removes a UNI from a multicast GEM port, and the GEM port entities with
/// the last UNI of the ONU
pub fn multicast_remove(m: &MulticastEntities, last_of_onu: bool) -> Vec<EntityOp> {
    let mut ops = vec![EntityOp::Delete(EntityClass::MulticastSubscriberConfigInfo, m.uni_id)];
    if last_of_onu {
        ops.push(EntityOp::Delete(EntityClass::MulticastOperationsProfile, m.gemport_id));
        ops.push(EntityOp::Delete(EntityClass::MacBridgePortConfigData, m.gemport_id));
        ops.push(EntityOp::Delete(EntityClass::MulticastGemInterworkingTp, m.gemport_id));
        ops.push(EntityOp::Delete(EntityClass::GemPortNetworkCtp, m.gemport_id));
    }
    ops
}
