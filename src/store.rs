/*!
The switch state as the controller sees it: accepted flow entries, meters,
groups, ports and their counters.

Flow entries are validated on insertion (`check_flows`) and carry their
classification (direction and service type) from then on. The store never
talks to the hardware; the provisioning side reads it to derive services.
*/

use openflow::messages::*;
use service::{Direction, ServiceType};

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::{SystemTime, UNIX_EPOCH};

/// UDP port of SIP signalling, which marks a flow as VoIP.
pub const SIP_PORT: u16 = 5060;
const IP_PROTO_UDP: u8 = 17;

/// Seconds since the epoch, as used by the hardware statistics
pub fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Why the store refused a controller request
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    TableOutOfRange(u8),
    UnknownInPort(u32),
    MissingSipServer,
    VoipOverMulticast,
    UnknownGroup(u32),
    UnknownOutPort(u32),
    OutPortIsInPort(u32),
    BadGotoTable(u8),
    NoTerminalInstruction,
    DuplicateCookie(u64),
    UnsupportedGroupType(u8),
    InvalidBucket(u32),
    ExistingGroup(u32),
    ExistingMeter(u32),
    GroupInUse(u32),
    MeterInUse(u32),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Rejection::TableOutOfRange(t) => write!(f, "table {} does not exist", t),
            Rejection::UnknownInPort(p) => write!(f, "ingress port {} does not exist", p),
            Rejection::MissingSipServer => write!(f, "no VoIP server address in the match"),
            Rejection::VoipOverMulticast => {
                write!(f, "a VoIP flow can not be configured over a multicast group")
            }
            Rejection::UnknownGroup(g) => write!(f, "group {} does not exist", g),
            Rejection::UnknownOutPort(p) => write!(f, "output port {} does not exist", p),
            Rejection::OutPortIsInPort(p) => write!(f, "output port {} is the ingress port", p),
            Rejection::BadGotoTable(t) => write!(f, "goto table {} is out of order", t),
            Rejection::NoTerminalInstruction => {
                write!(f, "neither output, group nor goto table instruction")
            }
            Rejection::DuplicateCookie(c) => write!(f, "cookie {:#x} is already in use", c),
            Rejection::UnsupportedGroupType(t) => write!(f, "group type {} is not ALL", t),
            Rejection::InvalidBucket(g) => {
                write!(f, "a bucket of group {} does not output to a known port", g)
            }
            Rejection::ExistingGroup(g) => write!(f, "group {} already exists", g),
            Rejection::ExistingMeter(m) => write!(f, "meter {} already exists", m),
            Rejection::GroupInUse(g) => write!(f, "group {} is attached to a flow", g),
            Rejection::MeterInUse(m) => write!(f, "meter {} is attached to a flow", m),
        }
    }
}

/// Cumulative packet and byte counters of one entry
#[derive(Debug, Clone, PartialEq)]
pub struct Counters {
    pub packet_count: u64,
    pub byte_count: u64,
    start: u64,
    duration: u64,
}

impl Counters {
    pub fn new(start: u64) -> Counters {
        Counters {
            packet_count: 0,
            byte_count: 0,
            start,
            duration: 0,
        }
    }

    /// Adds a report. The lifetime only ever grows.
    fn add(&mut self, packets: u64, bytes: u64, timestamp: u64) {
        self.packet_count += packets;
        self.byte_count += bytes;
        self.duration = self.duration.max(timestamp.saturating_sub(self.start));
    }

    /// Seconds between creation and the newest report
    pub fn duration(&self) -> u64 {
        self.duration
    }
}

/// The fields of a flow match the agent classifies on
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlowMatch {
    pub in_port: u32,
    /// VLAN id without the OFPVID_PRESENT bit
    pub vlan_id: u16,
    pub ip_proto: Option<u8>,
    pub udp_src: Option<u16>,
    pub udp_dst: Option<u16>,
    pub ipv4_src: Option<Ipv4Addr>,
    pub ipv4_dst: Option<Ipv4Addr>,
}

/// A VLAN operation of an apply actions instruction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VlanOp {
    /// Rewrites the outer tag to the VLAN
    Set(u16),
    /// Pushes a new outer tag with the VLAN
    Push(u16),
    /// Pops the outer tag, which carried the matched VLAN
    Pop(u16),
}

/// The instructions of a flow as seen by the service reconstruction
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlowActions {
    /// In the order of the apply actions
    pub vlan_ops: Vec<VlanOp>,
    pub meter_id: Option<u32>,
    pub out_port: Option<u32>,
    pub group_id: Option<u32>,
    pub goto_table: Option<u8>,
}

impl FlowActions {
    /// True if the VLAN operations are pops only
    pub fn pops_only(&self) -> bool {
        !self.vlan_ops.is_empty() && self.vlan_ops.iter().all(|op| match *op {
            VlanOp::Pop(_) => true,
            _ => false,
        })
    }
}

/// A controller flow-mod ADD reduced to the classification keys, not yet validated
#[derive(Debug, Clone)]
pub struct FlowRequest {
    pub cookie: u64,
    pub table_id: u8,
    pub priority: u16,
    pub flow_match: FlowMatch,
    pub actions: FlowActions,
    flow_mod: OfpFlowMod,
}

impl FlowRequest {
    /// Extracts the classification keys. A flow without VLAN id or ingress
    /// port, or matching an untagged VLAN id, can not be part of a service.
    pub fn from_flow_mod(flow_mod: OfpFlowMod) -> Option<FlowRequest> {
        let m = &flow_mod.match_field;
        let in_port = m.field(OxmOfbMatchFields::InPort)?.value_u32()?;
        let vid = m.field(OxmOfbMatchFields::VlanVid)?.value_u16()?;
        if vid & OFPVID_PRESENT == 0 {
            return None;
        }
        let flow_match = FlowMatch {
            in_port,
            vlan_id: vid & !OFPVID_PRESENT,
            ip_proto: m.field(OxmOfbMatchFields::IpProto).and_then(|f| f.value_u8()),
            udp_src: m.field(OxmOfbMatchFields::UdpSrc).and_then(|f| f.value_u16()),
            udp_dst: m.field(OxmOfbMatchFields::UdpDst).and_then(|f| f.value_u16()),
            ipv4_src: m.field(OxmOfbMatchFields::Ipv4Src).and_then(|f| f.value_ipv4()),
            ipv4_dst: m.field(OxmOfbMatchFields::Ipv4Dst).and_then(|f| f.value_ipv4()),
        };

        let mut actions = FlowActions::default();
        for instruction in &flow_mod.instructions {
            match *instruction {
                OfpInstruction::ApplyActions(ref list) => {
                    let mut pushing = false;
                    for action in list {
                        match *action {
                            OfpAction::PopVlan => {
                                actions.vlan_ops.push(VlanOp::Pop(flow_match.vlan_id))
                            }
                            OfpAction::PushVlan(_) => pushing = true,
                            OfpAction::SetField(ref oxm)
                                if oxm.field() == OxmOfbMatchFields::VlanVid as u8 =>
                            {
                                let vlan = oxm.value_u16().unwrap_or(0) & !OFPVID_PRESENT;
                                actions.vlan_ops.push(if pushing {
                                    VlanOp::Push(vlan)
                                }
                                else {
                                    VlanOp::Set(vlan)
                                });
                                pushing = false;
                            }
                            OfpAction::Output { port, .. } => actions.out_port = Some(port),
                            OfpAction::Group(group_id) => actions.group_id = Some(group_id),
                            _ => {}
                        }
                    }
                }
                OfpInstruction::GotoTable(table_id) => actions.goto_table = Some(table_id),
                OfpInstruction::Meter(meter_id) => actions.meter_id = Some(meter_id),
                OfpInstruction::Other { typ, .. } => {
                    debug!("Ignoring instruction type {} of flow {:#x}", typ, flow_mod.cookie)
                }
            }
        }

        Some(FlowRequest {
            cookie: flow_mod.cookie,
            table_id: flow_mod.table_id,
            priority: flow_mod.priority,
            flow_match,
            actions,
            flow_mod,
        })
    }
}

/// An accepted and classified flow entry
#[derive(Debug, Clone)]
pub struct FlowEntry {
    pub cookie: u64,
    pub table_id: u8,
    pub priority: u16,
    pub flow_match: FlowMatch,
    pub actions: FlowActions,
    pub direction: Direction,
    pub service_type: Option<ServiceType>,
    pub stats: Counters,
    flow_mod: OfpFlowMod,
}

impl FlowEntry {
    /// True if the flow carries SIP signalling
    pub fn is_voip(&self) -> bool {
        self.service_type == Some(ServiceType::Voip)
    }
}

/// Committed/peak rate and burst, in the meter's units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bandwidth {
    pub cir: u32,
    pub pir: u32,
    pub pbs: u32,
}

#[derive(Debug, Clone)]
pub struct MeterEntry {
    pub meter_id: u32,
    pub flags: u16,
    pub bands: Vec<OfpMeterBand>,
    pub stats: Counters,
    pub band_stats: Vec<OfpMeterBandStats>,
}

impl MeterEntry {
    /// Derives the bandwidth from the DROP bands: the lowest rate is
    /// committed, a higher one is the peak, the burst is the largest.
    pub fn bandwidth(&self) -> Option<Bandwidth> {
        let mut cir: Option<u32> = None;
        let mut pir: Option<u32> = None;
        let mut pbs = 0;
        for band in self.bands
            .iter()
            .filter(|b| b.typ == OfpMeterBandType::Drop as u16)
        {
            match cir {
                None => cir = Some(band.rate),
                Some(c) if band.rate >= c => {
                    if pir.map_or(true, |p| band.rate > p) {
                        pir = Some(band.rate);
                    }
                }
                Some(c) => {
                    if pir.map_or(true, |p| c > p) {
                        pir = Some(c);
                    }
                    cir = Some(band.rate);
                }
            }
            pbs = pbs.max(band.burst_size);
        }
        cir.map(|cir| Bandwidth {
            cir,
            pir: pir.unwrap_or(cir),
            pbs,
        })
    }

    fn add(&mut self, packets: u64, bytes: u64, timestamp: u64) {
        self.stats.add(packets, bytes, timestamp);
        if self.band_stats.is_empty() {
            return;
        }
        let n = self.band_stats.len() as u64;
        for band in &mut self.band_stats {
            band.packet_band_count += packets / n;
            band.byte_band_count += bytes / n;
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroupEntry {
    pub group_id: u32,
    pub group_type: u8,
    pub buckets: Vec<OfpBucket>,
    pub stats: Counters,
    pub bucket_stats: Vec<OfpBucketCounter>,
}

impl GroupEntry {
    /// The output ports of all buckets
    pub fn ports(&self) -> Vec<u32> {
        bucket_ports(&self.buckets)
    }

    fn add(&mut self, packets: u64, bytes: u64, timestamp: u64) {
        self.stats.add(packets, bytes, timestamp);
        for bucket in &mut self.bucket_stats {
            bucket.packet_count += packets;
            bucket.byte_count += bytes;
        }
    }
}

fn bucket_ports(buckets: &[OfpBucket]) -> Vec<u32> {
    let mut ports = vec![];
    for bucket in buckets {
        for action in &bucket.actions {
            if let OfpAction::Output { port, .. } = *action {
                if !ports.contains(&port) {
                    ports.push(port);
                }
            }
        }
    }
    ports
}

/// The membership change of a modified group
#[derive(Debug, Clone, PartialEq)]
pub struct GroupChange {
    pub group_id: u32,
    pub added: Vec<u32>,
    pub removed: Vec<u32>,
}

/// Flows, meters, groups and ports of one datapath
#[derive(Debug)]
pub struct Store {
    n_tables: u8,
    nni_port: u32,
    ports: BTreeMap<u32, OfpPort>,
    flows: BTreeMap<u64, FlowEntry>,
    meters: BTreeMap<u32, MeterEntry>,
    groups: BTreeMap<u32, GroupEntry>,
    /// Newest applied statistics timestamp per hardware flow
    watermarks: HashMap<u32, u64>,
}

impl Store {
    pub fn new(n_tables: u8, nni: OfpPort) -> Store {
        let nni_port = nni.port_no;
        let mut ports = BTreeMap::new();
        ports.insert(nni_port, nni);
        Store {
            n_tables,
            nni_port,
            ports,
            flows: BTreeMap::new(),
            meters: BTreeMap::new(),
            groups: BTreeMap::new(),
            watermarks: HashMap::new(),
        }
    }

    pub fn n_tables(&self) -> u8 {
        self.n_tables
    }

    pub fn nni_port(&self) -> u32 {
        self.nni_port
    }

    /* Ports */

    /// Stores the port description and tells if it was new or modified
    pub fn add_port(&mut self, port: OfpPort) -> OfpPortReason {
        match self.ports.insert(port.port_no, port) {
            Some(_) => OfpPortReason::Modify,
            None => OfpPortReason::Add,
        }
    }

    pub fn port(&self, port_no: u32) -> Option<&OfpPort> {
        self.ports.get(&port_no)
    }

    pub fn port_exists(&self, port_no: u32) -> bool {
        self.ports.contains_key(&port_no)
    }

    pub fn ports(&self) -> Vec<OfpPort> {
        self.ports.values().cloned().collect()
    }

    /* Flows */

    /// Validates and classifies the request, then stores it
    pub fn add_flow(&mut self, request: FlowRequest) -> Result<(), Rejection> {
        if self.flows.contains_key(&request.cookie) {
            return Err(Rejection::DuplicateCookie(request.cookie));
        }
        let (direction, service_type) = self.check_flows(&request)?;
        let entry = FlowEntry {
            cookie: request.cookie,
            table_id: request.table_id,
            priority: request.priority,
            flow_match: request.flow_match,
            actions: request.actions,
            direction,
            service_type,
            stats: Counters::new(unix_time()),
            flow_mod: request.flow_mod,
        };
        self.flows.insert(entry.cookie, entry);
        Ok(())
    }

    fn check_flows(
        &self,
        request: &FlowRequest,
    ) -> Result<(Direction, Option<ServiceType>), Rejection> {
        if request.table_id >= self.n_tables {
            return Err(Rejection::TableOutOfRange(request.table_id));
        }

        let m = &request.flow_match;
        let udp = m.ip_proto == Some(IP_PROTO_UDP);
        let mut service_type = None;
        let direction = if m.in_port != self.nni_port {
            if !self.port_exists(m.in_port) {
                return Err(Rejection::UnknownInPort(m.in_port));
            }
            if udp && m.udp_dst == Some(SIP_PORT) {
                service_type = Some(ServiceType::Voip);
                if m.ipv4_dst.is_none() {
                    return Err(Rejection::MissingSipServer);
                }
            }
            Direction::Upstream
        }
        else {
            if udp && m.udp_src == Some(SIP_PORT) {
                service_type = Some(ServiceType::Voip);
                if m.ipv4_src.is_none() {
                    return Err(Rejection::MissingSipServer);
                }
            }
            Direction::Downstream
        };

        let a = &request.actions;
        if let Some(group_id) = a.group_id {
            if service_type.is_some() {
                return Err(Rejection::VoipOverMulticast);
            }
            service_type = Some(ServiceType::Multicast);
            if !self.groups.contains_key(&group_id) {
                return Err(Rejection::UnknownGroup(group_id));
            }
        }
        else if let Some(out_port) = a.out_port {
            service_type = service_type.or(Some(ServiceType::Unicast));
            if !self.port_exists(out_port) {
                return Err(Rejection::UnknownOutPort(out_port));
            }
            if out_port == m.in_port {
                return Err(Rejection::OutPortIsInPort(out_port));
            }
        }
        else if let Some(goto) = a.goto_table {
            if goto <= request.table_id || goto >= self.n_tables {
                return Err(Rejection::BadGotoTable(goto));
            }
        }
        else {
            return Err(Rejection::NoTerminalInstruction);
        }
        Ok((direction, service_type))
    }

    pub fn flow(&self, cookie: u64) -> Option<&FlowEntry> {
        self.flows.get(&cookie)
    }

    pub fn remove_flow(&mut self, cookie: u64) -> Option<FlowEntry> {
        self.flows.remove(&cookie)
    }

    /// The flows of a table, highest priority first
    pub fn table(&self, table_id: u8) -> Vec<&FlowEntry> {
        let mut flows: Vec<&FlowEntry> = self.flows
            .values()
            .filter(|f| f.table_id == table_id)
            .collect();
        flows.sort_by(|a, b| b.priority.cmp(&a.priority));
        flows
    }

    /// The highest table holding a flow
    pub fn max_table(&self) -> Option<u8> {
        self.flows.values().map(|f| f.table_id).max()
    }

    /* Meters */

    pub fn add_meter(&mut self, meter_mod: OfpMeterMod) -> Result<(), Rejection> {
        if self.meters.contains_key(&meter_mod.meter_id) {
            return Err(Rejection::ExistingMeter(meter_mod.meter_id));
        }
        let entry = MeterEntry {
            meter_id: meter_mod.meter_id,
            flags: meter_mod.flags,
            band_stats: vec![OfpMeterBandStats::default(); meter_mod.bands.len()],
            bands: meter_mod.bands,
            stats: Counters::new(unix_time()),
        };
        self.meters.insert(entry.meter_id, entry);
        Ok(())
    }

    pub fn remove_meter(&mut self, meter_id: u32) -> Result<Option<MeterEntry>, Rejection> {
        if self.flows
            .values()
            .any(|f| f.actions.meter_id == Some(meter_id))
        {
            return Err(Rejection::MeterInUse(meter_id));
        }
        Ok(self.meters.remove(&meter_id))
    }

    pub fn meter(&self, meter_id: u32) -> Option<&MeterEntry> {
        self.meters.get(&meter_id)
    }

    /// Combines the bandwidth of several meters by taking the minimum of
    /// each figure. Any unknown meter makes the combination unknown.
    pub fn bandwidth(&self, meter_ids: &[u32]) -> Option<Bandwidth> {
        let mut total: Option<Bandwidth> = None;
        for meter_id in meter_ids {
            let bw = self.meters.get(meter_id)?.bandwidth()?;
            total = Some(match total {
                None => bw,
                Some(t) => Bandwidth {
                    cir: t.cir.min(bw.cir),
                    pir: t.pir.min(bw.pir),
                    pbs: t.pbs.min(bw.pbs),
                },
            });
        }
        total
    }

    /* Groups */

    fn check_group(&self, group_mod: &OfpGroupMod) -> Result<(), Rejection> {
        if group_mod.typ != OfpGroupType::All as u8 {
            return Err(Rejection::UnsupportedGroupType(group_mod.typ));
        }
        let valid = !group_mod.buckets.is_empty() && group_mod.buckets.iter().all(|b| {
            let ports = bucket_ports(::std::slice::from_ref(b));
            !ports.is_empty() && ports.iter().all(|p| self.port_exists(*p))
        });
        if !valid {
            return Err(Rejection::InvalidBucket(group_mod.group_id));
        }
        Ok(())
    }

    pub fn add_group(&mut self, group_mod: OfpGroupMod) -> Result<(), Rejection> {
        if self.groups.contains_key(&group_mod.group_id) {
            return Err(Rejection::ExistingGroup(group_mod.group_id));
        }
        self.check_group(&group_mod)?;
        let entry = GroupEntry {
            group_id: group_mod.group_id,
            group_type: group_mod.typ,
            bucket_stats: vec![OfpBucketCounter::default(); group_mod.buckets.len()],
            buckets: group_mod.buckets,
            stats: Counters::new(unix_time()),
        };
        self.groups.insert(entry.group_id, entry);
        Ok(())
    }

    /// Replaces the buckets of a known group, keeping its counters
    pub fn modify_group(&mut self, group_mod: OfpGroupMod) -> Result<GroupChange, Rejection> {
        self.check_group(&group_mod)?;
        let group = self.groups
            .get_mut(&group_mod.group_id)
            .ok_or(Rejection::UnknownGroup(group_mod.group_id))?;
        let old = group.ports();
        let new = bucket_ports(&group_mod.buckets);
        group.bucket_stats.resize(group_mod.buckets.len(), OfpBucketCounter::default());
        group.buckets = group_mod.buckets;
        Ok(GroupChange {
            group_id: group.group_id,
            added: new.iter().filter(|p| !old.contains(p)).cloned().collect(),
            removed: old.into_iter().filter(|p| !new.contains(p)).collect(),
        })
    }

    pub fn remove_group(&mut self, group_id: u32) -> Result<Option<GroupEntry>, Rejection> {
        if self.flows
            .values()
            .any(|f| f.actions.group_id == Some(group_id))
        {
            return Err(Rejection::GroupInUse(group_id));
        }
        Ok(self.groups.remove(&group_id))
    }

    pub fn group(&self, group_id: u32) -> Option<&GroupEntry> {
        self.groups.get(&group_id)
    }

    /// The member ports of a group, empty for an unknown group
    pub fn group_ports(&self, group_id: u32) -> Vec<u32> {
        self.groups
            .get(&group_id)
            .map(|g| g.ports())
            .unwrap_or_default()
    }

    /// The groups having the port as member
    pub fn groups_by_port(&self, port_no: u32) -> Vec<u32> {
        self.groups
            .values()
            .filter(|g| g.ports().contains(&port_no))
            .map(|g| g.group_id)
            .collect()
    }

    /* Statistics */

    /// Applies a hardware statistics report of a service flow to all of its
    /// contributing flows and their meters and groups.
    /// A report not newer than the last one from the same `source` is ignored.
    pub fn record_stats(
        &mut self,
        source: u32,
        cookies: &[u64],
        packets: u64,
        bytes: u64,
        timestamp: u64,
    ) -> bool {
        if let Some(&last) = self.watermarks.get(&source) {
            if timestamp <= last {
                debug!(
                    "Ignoring statistics of flow {} at {}, already applied {}",
                    source, timestamp, last
                );
                return false;
            }
        }
        self.watermarks.insert(source, timestamp);

        for cookie in cookies {
            let (meter_id, group_id) = match self.flows.get_mut(cookie) {
                Some(flow) => {
                    flow.stats.add(packets, bytes, timestamp);
                    (flow.actions.meter_id, flow.actions.group_id)
                }
                None => continue,
            };
            if let Some(meter) = meter_id.and_then(|m| self.meters.get_mut(&m)) {
                meter.add(packets, bytes, timestamp);
            }
            if let Some(group) = group_id.and_then(|g| self.groups.get_mut(&g)) {
                group.add(packets, bytes, timestamp);
            }
        }
        true
    }

    /// Forgets the statistics watermark of a removed hardware flow
    pub fn forget_stats_source(&mut self, source: u32) {
        self.watermarks.remove(&source);
    }

    pub fn flow_stats(&self) -> Vec<OfpFlowStats> {
        self.flows
            .values()
            .map(|f| OfpFlowStats {
                table_id: f.table_id,
                duration_sec: f.stats.duration() as u32,
                duration_nsec: 0,
                priority: f.priority,
                idle_timeout: f.flow_mod.idle_timeout,
                hard_timeout: f.flow_mod.hard_timeout,
                flags: f.flow_mod.flags,
                cookie: f.cookie,
                packet_count: f.stats.packet_count,
                byte_count: f.stats.byte_count,
                match_field: f.flow_mod.match_field.clone(),
                instructions: f.flow_mod.instructions.clone(),
            })
            .collect()
    }

    pub fn group_stats(&self) -> Vec<OfpGroupStats> {
        self.groups
            .values()
            .map(|g| OfpGroupStats {
                group_id: g.group_id,
                ref_count: self.flows
                    .values()
                    .filter(|f| f.actions.group_id == Some(g.group_id))
                    .count() as u32,
                packet_count: g.stats.packet_count,
                byte_count: g.stats.byte_count,
                duration_sec: g.stats.duration() as u32,
                duration_nsec: 0,
                bucket_stats: g.bucket_stats.clone(),
            })
            .collect()
    }

    pub fn group_descs(&self) -> Vec<OfpGroupDesc> {
        self.groups
            .values()
            .map(|g| OfpGroupDesc {
                typ: g.group_type,
                group_id: g.group_id,
                buckets: g.buckets.clone(),
            })
            .collect()
    }

    pub fn meter_stats(&self) -> Vec<OfpMeterStats> {
        self.meters
            .values()
            .map(|m| OfpMeterStats {
                meter_id: m.meter_id,
                flow_count: self.flows
                    .values()
                    .filter(|f| f.actions.meter_id == Some(m.meter_id))
                    .count() as u32,
                packet_in_count: m.stats.packet_count,
                byte_in_count: m.stats.byte_count,
                duration_sec: m.stats.duration() as u32,
                duration_nsec: 0,
                band_stats: m.band_stats.clone(),
            })
            .collect()
    }
}
