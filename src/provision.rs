/*!
Installs reconciled service descriptors on the OLT and its ONUs, and tears
them down again.

A service direction is installed as traffic schedulers, traffic queues and a
flow of the OLT, followed by the ONU entities. Every failing step undoes the
steps of the same attempt, so a service is either fully installed and
recorded or not recorded at all.
*/

use olt;
use olt::{GroupCommand, OltDriver, TrafficQueues, TrafficSchedulers, TrafficShaping};
use onu;
use onu::{OnuManagement, OnuMib};
use onu::sequence;
use onu::sequence::{MulticastEntities, UnicastEntities};
use resources::{flow_hash, FlowHashes, GemPorts, OnuPort};
use service::*;
use store::{Store, SIP_PORT};
use subscribers;
use subscribers::Subscribers;

use std::collections::BTreeMap;
use std::error;
use std::fmt;
use std::net::Ipv4Addr;
use std::result;
use std::sync::Arc;

#[derive(Debug)]
pub enum Error {
    Olt(olt::Error),
    Onu(onu::Error),
    Subscribers(subscribers::Error),
    NoMeters,
    /// A meter of the service is unknown or has no DROP band
    MissingBandwidth(Vec<u32>),
    NoVlan,
    /// No GEM port left
    Exhausted,
    /// A subscriber service without ONU port
    NoOnuPort,
    /// A multicast service without group
    NotMulticast,
    MissingSipServer,
}

impl error::Error for Error {
    fn description(&self) -> &str {
        "Service provisioning error"
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Olt(ref e) => write!(f, "OLT: {}", e),
            Error::Onu(ref e) => write!(f, "ONU: {}", e),
            Error::Subscribers(ref e) => write!(f, "{}", e),
            Error::NoMeters => write!(f, "The service has no meter"),
            Error::MissingBandwidth(ref meters) => write!(f, "No bandwidth in meters {:?}", meters),
            Error::NoVlan => write!(f, "The service has no VLAN"),
            Error::Exhausted => write!(f, "No free GEM port"),
            Error::NoOnuPort => write!(f, "The service does not lead to an ONU port"),
            Error::NotMulticast => write!(f, "The service does not lead to a group"),
            Error::MissingSipServer => write!(f, "The VoIP service has no SIP server address"),
        }
    }
}

impl From<olt::Error> for Error {
    fn from(e: olt::Error) -> Self {
        Error::Olt(e)
    }
}

impl From<onu::Error> for Error {
    fn from(e: onu::Error) -> Self {
        Error::Onu(e)
    }
}

impl From<subscribers::Error> for Error {
    fn from(e: subscribers::Error) -> Self {
        Error::Subscribers(e)
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Schedulers, queues and flow of one installed OLT path
struct Hardware {
    scheds: TrafficSchedulers,
    queues: TrafficQueues,
    flow: olt::Flow,
}

pub struct Provisioner {
    olt: Arc<dyn OltDriver>,
    onus: Box<dyn OnuManagement + Send>,
    subscribers: Subscribers,
    gemports: GemPorts,
    hashes: FlowHashes,
    unicast: BTreeMap<ServiceKey, UnicastService>,
    multicast: BTreeMap<u32, MulticastService>,
}

impl Provisioner {
    pub fn new(
        olt: Arc<dyn OltDriver>,
        onus: Box<dyn OnuManagement + Send>,
        subscribers: Subscribers,
        gemports: GemPorts,
    ) -> Provisioner {
        Provisioner {
            olt,
            onus,
            subscribers,
            gemports,
            hashes: FlowHashes::new(),
            unicast: BTreeMap::new(),
            multicast: BTreeMap::new(),
        }
    }

    pub fn onus(&mut self) -> &mut dyn OnuManagement {
        &mut *self.onus
    }

    pub fn subscribers(&mut self) -> &mut Subscribers {
        &mut self.subscribers
    }

    pub fn hashes(&self) -> &FlowHashes {
        &self.hashes
    }

    pub fn unicast_service(&self, key: &ServiceKey) -> Option<&UnicastService> {
        self.unicast.get(key)
    }

    pub fn multicast_service(&self, group_id: u32) -> Option<&MulticastService> {
        self.multicast.get(&group_id)
    }

    /// True if the cookie contributes to an installed service
    pub fn is_installed(&self, cookie: u64) -> bool {
        !self.hashes.hashes_of(cookie).is_empty()
    }

    /* Hardware steps */

    fn add_hardware(&self, hw: &Hardware) -> Result<()> {
        self.olt.create_traffic_schedulers(&hw.scheds)?;
        if let Err(e) = self.olt.create_traffic_queues(&hw.queues) {
            self.undo("traffic schedulers", self.olt.remove_traffic_schedulers(&hw.scheds));
            return Err(e.into());
        }
        if let Err(e) = self.olt.flow_add(&hw.flow) {
            self.undo("traffic queues", self.olt.remove_traffic_queues(&hw.queues));
            self.undo("traffic schedulers", self.olt.remove_traffic_schedulers(&hw.scheds));
            return Err(e.into());
        }
        Ok(())
    }

    fn undo(&self, what: &str, result: olt::Result<()>) {
        if let Err(e) = result {
            error!("Rolling back {} failed: {}", what, e);
        }
    }

    /// Removes flow, queues and schedulers; failures are only logged
    fn remove_hardware(&self, hw: &Hardware) {
        if let Err(e) = self.olt.flow_remove(&hw.flow) {
            error!("Removing flow {} failed: {}", hw.flow.flow_id, e);
        }
        if let Err(e) = self.olt.remove_traffic_queues(&hw.queues) {
            error!("Removing traffic queues of flow {} failed: {}", hw.flow.flow_id, e);
        }
        if let Err(e) = self.olt.remove_traffic_schedulers(&hw.scheds) {
            error!("Removing traffic schedulers of flow {} failed: {}", hw.flow.flow_id, e);
        }
    }

    fn mib(&self, port: &OnuPort) -> Result<&OnuMib> {
        self.onus
            .mib(port.intf_id, port.onu_id)
            .ok_or_else(|| {
                Error::Onu(onu::Error::MissingMib {
                    intf_id: port.intf_id,
                    onu_id: port.onu_id,
                })
            })
    }

    fn run_onu(&mut self, port: &OnuPort, ops: &[onu::EntityOp]) -> Result<()> {
        Ok(self.onus.run(port.intf_id, port.onu_id, ops)?)
    }

    /* Installation */

    /// Installs the service described by `descriptor`. Returns false if an
    /// installed service of the same key and direction keeps its place.
    pub fn install(&mut self, store: &mut Store, descriptor: &ServiceDescriptor) -> Result<bool> {
        let key = match ServiceKey::of(descriptor) {
            Some(key) => key,
            None if descriptor.service_type == ServiceType::Multicast => return Err(Error::NotMulticast),
            None => return Err(Error::NoOnuPort),
        };
        if let ServiceKey::Multicast { group_id } = key {
            return self.install_multicast(store, descriptor, group_id);
        }
        let direction = descriptor.direction;
        let config = self.direction_config(store, descriptor)?;
        let port = match descriptor.onu_port {
            Some(port_no) => OnuPort::from_port_no(port_no),
            None => return Err(Error::NoOnuPort),
        };

        let installed = self.unicast
            .get(&key)
            .and_then(|s| s.direction(direction))
            .map(|c| (c.cookies.clone(), c.priorities.clone()));
        if let Some((cookies, priorities)) = installed {
            if cookies == descriptor.cookies {
                debug!("{} {} is already installed", key, direction);
                return Ok(false);
            }
            if !preempts(&descriptor.priorities, &priorities) {
                info!(
                    "{} {} with priorities {:?} keeps its place against {:?}",
                    key, direction, priorities, descriptor.priorities
                );
                return Ok(false);
            }
            info!(
                "{} {} with priorities {:?} is preempted by {:?}",
                key, direction, priorities, descriptor.priorities
            );
            self.remove_direction(store, key, direction);
        }

        let (mut service, fresh) = match self.unicast.get(&key) {
            Some(service) => (service.clone(), false),
            None => {
                let gemport_id = self.gemports
                    .alloc_unicast(port.intf_id)
                    .ok_or(Error::Exhausted)?;
                let voip = match key {
                    ServiceKey::Voip { .. } => match self.voip_profile(&port, descriptor) {
                        Ok(profile) => Some(profile),
                        Err(e) => {
                            self.gemports.free_unicast(port.intf_id, gemport_id);
                            return Err(e);
                        }
                    },
                    _ => None,
                };
                (UnicastService::new(port, gemport_id, voip), true)
            }
        };

        if let Err(e) = self.install_direction(&service, direction, &config) {
            error!("Installing {} {} failed: {}", key, direction, e);
            if fresh {
                self.gemports.free_unicast(port.intf_id, service.gemport_id);
            }
            return Err(e);
        }

        info!(
            "Installed {} {} as flow {} on GEM port {}",
            key, direction, config.flow_id, service.gemport_id
        );
        self.hashes.insert(config.flow_id, config.cookies.clone());
        service.set_direction(direction, Some(config));
        self.unicast.insert(key, service);
        Ok(true)
    }

    fn direction_config(&self, store: &Store, descriptor: &ServiceDescriptor) -> Result<DirectionConfig> {
        if descriptor.meter_ids.is_empty() {
            return Err(Error::NoMeters);
        }
        let bw = store
            .bandwidth(&descriptor.meter_ids)
            .ok_or_else(|| Error::MissingBandwidth(descriptor.meter_ids.clone()))?;
        let tags = VlanTags::from_stack(&descriptor.vlans, descriptor.direction).ok_or(Error::NoVlan)?;
        Ok(DirectionConfig {
            flow_id: flow_hash(&descriptor.cookies),
            cookies: descriptor.cookies.clone(),
            tags,
            priorities: descriptor.priorities.clone(),
            shaping: TrafficShaping {
                cir: bw.cir,
                pir: bw.pir,
                pbs: bw.pbs,
            },
        })
    }

    fn voip_profile(&mut self, port: &OnuPort, descriptor: &ServiceDescriptor) -> Result<VoipProfile> {
        let sip_server = descriptor.voip.sip_server.ok_or(Error::MissingSipServer)?;
        let account = self.subscribers
            .voip_account(port.intf_id, port.onu_id, port.uni_id)?;
        Ok(VoipProfile {
            sip_server,
            sip_port: descriptor.voip.sip_port.unwrap_or(SIP_PORT),
            extension: account.extension,
            password: account.password,
            ip_address: descriptor.voip.ip_address,
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: sip_server,
            rtp_port: descriptor.voip.rtp_port,
        })
    }

    fn install_direction(&mut self, service: &UnicastService, direction: Direction, config: &DirectionConfig) -> Result<()> {
        let hw = Hardware {
            scheds: service.schedulers(direction, config),
            queues: service.queues(direction),
            flow: service.flow(direction, config),
        };
        self.add_hardware(&hw)?;

        let other = service.direction(direction.opposite());
        let entities = UnicastEntities {
            uni_id: service.port.uni_id as u16,
            gemport_id: service.gemport_id as u16,
            c_tag: config.tags.c_tag,
            other_c_tag: other.map(|o| o.tags.c_tag),
            voip: service.voip.as_ref(),
        };
        let onu_result = self.mib(&service.port).and_then(|mib| {
            Ok(match other {
                None => sequence::unicast_install(mib, &entities)?,
                Some(_) => sequence::unicast_update(mib, &entities)?,
            })
        });
        let onu_result = match onu_result {
            Ok(ops) => self.run_onu(&service.port, &ops),
            Err(e) => Err(e),
        };
        if let Err(e) = onu_result {
            self.remove_hardware(&hw);
            return Err(e);
        }
        Ok(())
    }

    /* Teardown */

    /// Tears down every service the cookie contributes to. Returns the
    /// ports and directions that became free.
    pub fn uninstall(&mut self, store: &mut Store, cookie: u64) -> Vec<(u32, Direction)> {
        let mut freed = vec![];
        for flow_id in self.hashes.hashes_of(cookie) {
            let unicast = self.unicast
                .iter()
                .filter_map(|(key, s)| {
                    if s.downstream.as_ref().map(|c| c.flow_id) == Some(flow_id) {
                        Some((*key, Direction::Downstream, s.port.port_no()))
                    }
                    else if s.upstream.as_ref().map(|c| c.flow_id) == Some(flow_id) {
                        Some((*key, Direction::Upstream, s.port.port_no()))
                    }
                    else {
                        None
                    }
                })
                .next();
            if let Some((key, direction, port_no)) = unicast {
                self.remove_direction(store, key, direction);
                freed.push((port_no, direction));
                continue;
            }
            let group = self.multicast
                .values()
                .find(|s| s.flow_id == flow_id)
                .map(|s| s.group_id);
            if let Some(group_id) = group {
                freed.extend(
                    self.remove_multicast(store, group_id)
                        .into_iter()
                        .map(|p| (p, Direction::Downstream)),
                );
            }
        }
        freed
    }

    fn remove_direction(&mut self, store: &mut Store, key: ServiceKey, direction: Direction) {
        let mut service = match self.unicast.get(&key) {
            Some(service) => service.clone(),
            None => return,
        };
        let config = match service.direction(direction) {
            Some(config) => config.clone(),
            None => return,
        };
        let hw = Hardware {
            scheds: service.schedulers(direction, &config),
            queues: service.queues(direction),
            flow: service.flow(direction, &config),
        };
        self.remove_hardware(&hw);

        let other = service.direction(direction.opposite()).map(|o| o.tags.c_tag);
        let last = other.is_none();
        let entities = UnicastEntities {
            uni_id: service.port.uni_id as u16,
            gemport_id: service.gemport_id as u16,
            c_tag: config.tags.c_tag,
            other_c_tag: other,
            voip: service.voip.as_ref(),
        };
        let onu_result = self.mib(&service.port)
            .and_then(|mib| Ok(sequence::unicast_remove(mib, &entities, last)?))
            .and_then(|ops| self.run_onu(&service.port, &ops));
        if let Err(e) = onu_result {
            error!("Removing the ONU entities of {} {} failed: {}", key, direction, e);
        }

        self.hashes.remove(config.flow_id);
        store.forget_stats_source(config.flow_id);
        service.set_direction(direction, None);
        info!("Removed {} {} (flow {})", key, direction, config.flow_id);
        if service.is_empty() {
            self.gemports
                .free_unicast(service.port.intf_id, service.gemport_id);
            self.unicast.remove(&key);
        }
        else {
            self.unicast.insert(key, service);
        }
    }

    /* Multicast */

    fn install_multicast(&mut self, store: &mut Store, descriptor: &ServiceDescriptor, group_id: u32) -> Result<bool> {
        let config = self.direction_config(store, descriptor)?;
        let installed = self.multicast
            .get(&group_id)
            .map(|s| (s.cookies.clone(), s.priorities.clone()));
        if let Some((cookies, priorities)) = installed {
            if cookies == descriptor.cookies {
                return Ok(false);
            }
            if !preempts(&descriptor.priorities, &priorities) {
                info!(
                    "Multicast group {} with priorities {:?} keeps its place against {:?}",
                    group_id, priorities, descriptor.priorities
                );
                return Ok(false);
            }
            info!("Multicast group {} is preempted", group_id);
            self.remove_multicast(store, group_id);
        }

        let gemport_id = self.gemports.alloc_multicast().ok_or(Error::Exhausted)?;
        let service = MulticastService {
            group_id,
            gemport_id,
            tech_profile_id: random_tech_profile_id(),
            flow_id: config.flow_id,
            cookies: config.cookies,
            tags: config.tags,
            priorities: config.priorities,
            shaping: config.shaping,
            members: BTreeMap::new(),
        };
        if let Err(e) = self.olt
            .perform_group_operation(&service.group(GroupCommand::SetMembers, &[]))
        {
            self.gemports.free_multicast(gemport_id);
            return Err(e.into());
        }
        info!(
            "Installed multicast group {} as flow {} on GEM port {}",
            group_id, service.flow_id, gemport_id
        );
        self.hashes.insert(service.flow_id, service.cookies.clone());
        self.multicast.insert(group_id, service);

        for port_no in store.group_ports(group_id) {
            if let Err(e) = self.add_member(group_id, port_no) {
                error!(
                    "Adding port {} to multicast group {} failed: {}",
                    port_no, group_id, e
                );
            }
        }
        Ok(true)
    }

    /// Joins an ONU port to an installed multicast service. The first member
    /// of a PON interface brings the OLT path of that interface.
    pub fn add_member(&mut self, group_id: u32, port_no: u32) -> Result<()> {
        let mut service = self.multicast
            .get(&group_id)
            .cloned()
            .ok_or(Error::NotMulticast)?;
        if service.members.contains_key(&port_no) {
            return Ok(());
        }
        let port = OnuPort::from_port_no(port_no);
        let hw = if service.has_interface(port.intf_id) {
            None
        }
        else {
            let hw = Hardware {
                scheds: service.schedulers(port.intf_id),
                queues: service.queues(port.intf_id),
                flow: service.flow(port.intf_id),
            };
            self.add_hardware(&hw)?;
            let join = service.group(GroupCommand::AddMembers, &[port.intf_id]);
            if let Err(e) = self.olt.perform_group_operation(&join) {
                self.remove_hardware(&hw);
                return Err(e.into());
            }
            Some(hw)
        };

        let entities = MulticastEntities {
            uni_id: port.uni_id as u16,
            gemport_id: service.gemport_id as u16,
            c_tag: service.tags.c_tag,
        };
        let onu_result = self.mib(&port)
            .map(|mib| sequence::multicast_install(mib, &entities))
            .and_then(|ops| self.run_onu(&port, &ops));
        if let Err(e) = onu_result {
            if let Some(hw) = hw {
                let leave = service.group(GroupCommand::RemoveMembers, &[port.intf_id]);
                self.undo("group membership", self.olt.perform_group_operation(&leave));
                self.remove_hardware(&hw);
            }
            return Err(e);
        }

        info!("Port {} joined multicast group {}", port, group_id);
        service.members.insert(port_no, port);
        self.multicast.insert(group_id, service);
        Ok(())
    }

    /// Removes one member. The last member takes the group and its GEM
    /// port along. Returns true if the service is gone.
    pub fn remove_member(&mut self, store: &mut Store, group_id: u32, port_no: u32) -> bool {
        let mut service = match self.multicast.get(&group_id) {
            Some(service) => service.clone(),
            None => return false,
        };
        let port = match service.members.remove(&port_no) {
            Some(port) => port,
            None => return false,
        };
        self.leave(&service, &port);
        info!("Port {} left multicast group {}", port, group_id);

        if service.members.is_empty() {
            self.release_multicast(store, &service);
            self.multicast.remove(&group_id);
            return true;
        }
        self.multicast.insert(group_id, service);
        false
    }

    /// The ONU and, for the last member of its interface, the OLT side of
    /// a member that is no longer in `service.members`
    fn leave(&mut self, service: &MulticastService, port: &OnuPort) {
        let last_of_onu = !service
            .members
            .values()
            .any(|p| p.intf_id == port.intf_id && p.onu_id == port.onu_id);
        let entities = MulticastEntities {
            uni_id: port.uni_id as u16,
            gemport_id: service.gemport_id as u16,
            c_tag: service.tags.c_tag,
        };
        let ops = sequence::multicast_remove(&entities, last_of_onu);
        if let Err(e) = self.run_onu(port, &ops) {
            error!("Removing multicast entities of port {} failed: {}", port, e);
        }

        if !service.has_interface(port.intf_id) {
            let leave = service.group(GroupCommand::RemoveMembers, &[port.intf_id]);
            if let Err(e) = self.olt.perform_group_operation(&leave) {
                error!("Removing interface {} from group {} failed: {}", port.intf_id, service.group_id, e);
            }
            self.remove_hardware(&Hardware {
                scheds: service.schedulers(port.intf_id),
                queues: service.queues(port.intf_id),
                flow: service.flow(port.intf_id),
            });
        }
    }

    fn release_multicast(&mut self, store: &mut Store, service: &MulticastService) {
        if let Err(e) = self.olt
            .delete_group(&service.group(GroupCommand::SetMembers, &[]))
        {
            error!("Deleting group {} failed: {}", service.group_id, e);
        }
        self.gemports.free_multicast(service.gemport_id);
        self.hashes.remove(service.flow_id);
        store.forget_stats_source(service.flow_id);
        info!("Removed multicast group {}", service.group_id);
    }

    /// Removes a multicast service with all its members. Returns the
    /// member ports.
    fn remove_multicast(&mut self, store: &mut Store, group_id: u32) -> Vec<u32> {
        let mut service = match self.multicast.remove(&group_id) {
            Some(service) => service,
            None => return vec![],
        };
        let ports: Vec<u32> = service.members.keys().cloned().collect();
        for port_no in &ports {
            if let Some(port) = service.members.remove(port_no) {
                self.leave(&service, &port);
            }
        }
        self.release_multicast(store, &service);
        ports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use olt::mock::{Call, MockOlt};
    use onu::EntityClass;
    use onu::mock::MockOnus;
    use onu::sequence::tests::uploaded_mib;
    use reconcile::reconcile;
    use store::tests::*;
    use openflow::messages::*;
    use tempfile;

    struct Fixture {
        olt: Arc<MockOlt>,
        store: Store,
        testee: Provisioner,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut subscribers = Subscribers::open(&dir.path().join("subscribers.json"), 1111, 9999).unwrap();
        let mut onus = MockOnus::new(uploaded_mib());
        for &port_no in &[UNI_A, UNI_B, UNI_C] {
            let port = OnuPort::from_port_no(port_no);
            onus.add_onu(port.intf_id, port.onu_id);
            subscribers
                .onu_id(port.intf_id, &format!("ALCL{:08x}", port.onu_id))
                .unwrap();
        }
        let olt = Arc::new(MockOlt::new());
        let mut store = store();
        store.add_meter(meter_mod(7, &[(1000, 100), (2000, 200)])).unwrap();
        store.add_meter(meter_mod(8, &[(500, 50)])).unwrap();
        Fixture {
            olt: olt.clone(),
            store,
            testee: Provisioner::new(
                olt,
                Box::new(onus),
                subscribers,
                GemPorts::with_ranges(1024, 1030, 4100),
            ),
            _dir: dir,
        }
    }

    fn descriptor(cookies: &[u64], vlans: &[u16], priorities: &[u16], direction: Direction, port: u32) -> ServiceDescriptor {
        ServiceDescriptor {
            cookies: cookies.to_vec(),
            vlans: vlans.to_vec(),
            meter_ids: vec![7],
            priorities: priorities.to_vec(),
            direction,
            service_type: ServiceType::Unicast,
            onu_port: Some(port),
            nni_port: Some(NNI),
            group_id: None,
            voip: VoipTuple::default(),
        }
    }

    fn internet(port_no: u32) -> ServiceKey {
        let port = OnuPort::from_port_no(port_no);
        ServiceKey::Internet {
            intf_id: port.intf_id,
            onu_id: port.onu_id,
            uni_id: port.uni_id,
        }
    }

    #[test]
    fn downstream_pop_set_meter_output() {
        let mut f = fixture();
        let pop = OfpAction::PopVlan;
        f.store
            .add_flow(request(flow_mod(
                10,
                0,
                1000,
                NNI,
                900,
                vec![
                    OfpInstruction::ApplyActions(vec![pop]),
                    OfpInstruction::GotoTable(1),
                ],
            )))
            .unwrap();
        f.store
            .add_flow(request(flow_mod(
                11,
                1,
                1000,
                NNI,
                20,
                vec![
                    OfpInstruction::Meter(7),
                    OfpInstruction::ApplyActions(vec![set_vlan(0), output(UNI_A)]),
                ],
            )))
            .unwrap();
        let descriptors = reconcile(&f.store, 11).into_services();
        assert_eq!(1, descriptors.len());
        assert!(f.testee.install(&mut f.store, &descriptors[0]).unwrap());

        assert_eq!(
            vec!["create_traffic_schedulers", "create_traffic_queues", "flow_add"],
            f.olt.call_names()
        );
        let service = f.testee.unicast_service(&internet(UNI_A)).unwrap();
        let config = service.downstream.as_ref().unwrap();
        assert_eq!(VlanTags { c_tag: 20, s_tag: Some(900) }, config.tags);
        assert_eq!(1000, config.shaping.cir);
        assert_eq!(2000, config.shaping.pir);
        assert_eq!(1024, service.gemport_id);
        match f.olt.calls()[2] {
            Call::FlowAdd(ref flow) => {
                assert_eq!(flow_hash(&[10, 11]), flow.flow_id);
                assert_eq!(1024, flow.gemport_id);
                assert!(flow.action.cmd.remove_outer_tag);
            }
            ref other => panic!("unexpected {:?}", other),
        }
        assert_eq!(Some(&[10u64, 11][..]), f.testee.hashes().cookies(flow_hash(&[10, 11])));
        assert!(f.testee.is_installed(10));
    }

    #[test]
    fn flow_add_failure_rolls_back() {
        let mut f = fixture();
        f.olt.fail("flow_add");
        let desc = descriptor(&[1, 2], &[900, 20], &[10, 10], Direction::Downstream, UNI_A);
        assert!(f.testee.install(&mut f.store, &desc).is_err());
        assert_eq!(
            vec![
                "create_traffic_schedulers",
                "create_traffic_queues",
                "flow_add",
                "remove_traffic_queues",
                "remove_traffic_schedulers",
            ],
            f.olt.call_names()
        );
        assert!(f.testee.unicast_service(&internet(UNI_A)).is_none());
        assert!(!f.testee.is_installed(1));

        // the GEM port of the failed attempt is handed out again
        f.olt.heal();
        assert!(f.testee.install(&mut f.store, &desc).unwrap());
        assert_eq!(1024, f.testee.unicast_service(&internet(UNI_A)).unwrap().gemport_id);
    }

    #[test]
    fn onu_failure_rolls_back_hardware() {
        let olt = Arc::new(MockOlt::new());
        let dir = tempfile::tempdir().unwrap();
        let subscribers = Subscribers::open(&dir.path().join("s.json"), 1111, 9999).unwrap();
        let mut onus = MockOnus::new(uploaded_mib());
        onus.add_onu(1, 1);
        onus.failing = Some(EntityClass::VlanTaggingFilterData);
        let mut testee = Provisioner::new(
            olt.clone(),
            Box::new(onus),
            subscribers,
            GemPorts::with_ranges(1024, 1030, 4100),
        );
        let mut store = store();
        store.add_meter(meter_mod(7, &[(1000, 100)])).unwrap();

        let desc = descriptor(&[1, 2], &[900, 20], &[10, 10], Direction::Downstream, UNI_A);
        match testee.install(&mut store, &desc) {
            Err(Error::Onu(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            vec![
                "create_traffic_schedulers",
                "create_traffic_queues",
                "flow_add",
                "flow_remove",
                "remove_traffic_queues",
                "remove_traffic_schedulers",
            ],
            olt.call_names()
        );
        assert!(testee.unicast_service(&internet(UNI_A)).is_none());
    }

    #[test]
    fn lower_priority_is_ignored_higher_preempts() {
        let mut f = fixture();
        let first = descriptor(&[1, 2], &[900, 20], &[10, 20], Direction::Downstream, UNI_A);
        assert!(f.testee.install(&mut f.store, &first).unwrap());
        assert!(!f.testee.install(&mut f.store, &first).unwrap());

        let lower = descriptor(&[3, 4], &[900, 21], &[10, 19], Direction::Downstream, UNI_A);
        assert!(!f.testee.install(&mut f.store, &lower).unwrap());
        let equal = descriptor(&[3, 4], &[900, 21], &[10, 20], Direction::Downstream, UNI_A);
        assert!(!f.testee.install(&mut f.store, &equal).unwrap());

        f.olt.take_calls();
        let higher = descriptor(&[5, 6], &[900, 22], &[11, 0], Direction::Downstream, UNI_A);
        assert!(f.testee.install(&mut f.store, &higher).unwrap());
        assert_eq!(
            vec![
                "flow_remove",
                "remove_traffic_queues",
                "remove_traffic_schedulers",
                "create_traffic_schedulers",
                "create_traffic_queues",
                "flow_add",
            ],
            f.olt.call_names()
        );
        let config = f.testee.unicast_service(&internet(UNI_A)).unwrap().downstream.clone().unwrap();
        assert_eq!(vec![5, 6], config.cookies);
        assert!(!f.testee.is_installed(1));
        assert!(f.testee.hashes().cookies(flow_hash(&[1, 2])).is_none());
    }

    #[test]
    fn both_directions_share_gemport() {
        let mut f = fixture();
        let down = descriptor(&[1, 2], &[900, 20], &[10, 10], Direction::Downstream, UNI_A);
        let up = descriptor(&[3, 4], &[20, 900], &[10, 10], Direction::Upstream, UNI_A);
        assert!(f.testee.install(&mut f.store, &down).unwrap());
        assert!(f.testee.install(&mut f.store, &up).unwrap());

        let service = f.testee.unicast_service(&internet(UNI_A)).unwrap().clone();
        assert_eq!(1024, service.gemport_id);
        match f.olt.calls()[5] {
            Call::FlowAdd(ref flow) => {
                assert_eq!(flow_hash(&[1, 2]), flow.symmetric_flow_id);
                assert!(flow.action.cmd.add_outer_tag);
            }
            ref other => panic!("unexpected {:?}", other),
        }

        let freed = f.testee.uninstall(&mut f.store, 1);
        assert_eq!(vec![(UNI_A, Direction::Downstream)], freed);
        assert!(f.testee.unicast_service(&internet(UNI_A)).is_some());

        // a second service takes the next GEM port while the first lives
        let other = descriptor(&[7, 8], &[900, 30], &[10, 10], Direction::Downstream, UNI_B);
        assert!(f.testee.install(&mut f.store, &other).unwrap());
        assert_eq!(1025, f.testee.unicast_service(&internet(UNI_B)).unwrap().gemport_id);

        assert_eq!(vec![(UNI_A, Direction::Upstream)], f.testee.uninstall(&mut f.store, 4));
        assert!(f.testee.unicast_service(&internet(UNI_A)).is_none());
        assert!(f.testee.uninstall(&mut f.store, 4).is_empty());

        let again = descriptor(&[9, 10], &[900, 40], &[10, 10], Direction::Downstream, UNI_C);
        assert!(f.testee.install(&mut f.store, &again).unwrap());
        assert_eq!(1024, f.testee.unicast_service(&internet(UNI_C)).unwrap().gemport_id);
    }

    #[test]
    fn invalid_descriptors() {
        let mut f = fixture();
        let mut no_meter = descriptor(&[1], &[20], &[10], Direction::Downstream, UNI_A);
        no_meter.meter_ids.clear();
        match f.testee.install(&mut f.store, &no_meter) {
            Err(Error::NoMeters) => {}
            other => panic!("unexpected {:?}", other),
        }
        let mut unknown_meter = descriptor(&[1], &[20], &[10], Direction::Downstream, UNI_A);
        unknown_meter.meter_ids = vec![99];
        match f.testee.install(&mut f.store, &unknown_meter) {
            Err(Error::MissingBandwidth(ref meters)) if meters == &vec![99] => {}
            other => panic!("unexpected {:?}", other),
        }
        let no_vlan = descriptor(&[1], &[], &[10], Direction::Downstream, UNI_A);
        match f.testee.install(&mut f.store, &no_vlan) {
            Err(Error::NoVlan) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert!(f.olt.calls().is_empty());
    }

    #[test]
    fn gemports_exhausted_before_remote_calls() {
        let mut f = fixture();
        for (i, &port) in [UNI_A, UNI_B, UNI_C].iter().enumerate() {
            let cookie = i as u64 * 2;
            let desc = descriptor(&[cookie, cookie + 1], &[900, 20], &[1, 1], Direction::Downstream, port);
            assert!(f.testee.install(&mut f.store, &desc).unwrap());
        }
        let mut tight = fixture();
        tight.testee.gemports = GemPorts::with_ranges(1024, 1025, 4100);
        let a = descriptor(&[1, 2], &[900, 20], &[1, 1], Direction::Downstream, UNI_A);
        assert!(tight.testee.install(&mut tight.store, &a).unwrap());
        tight.olt.take_calls();
        let b = descriptor(&[3, 4], &[900, 20], &[1, 1], Direction::Downstream, UNI_B);
        match tight.testee.install(&mut tight.store, &b) {
            Err(Error::Exhausted) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert!(tight.olt.calls().is_empty());
    }

    #[test]
    fn voip_needs_sip_server() {
        let mut f = fixture();
        let pots = OnuPort::new(1, 1, 0x0201, true).port_no();
        let mut desc = descriptor(&[1, 2], &[30], &[10, 10], Direction::Upstream, pots);
        desc.service_type = ServiceType::Voip;
        match f.testee.install(&mut f.store, &desc) {
            Err(Error::MissingSipServer) => {}
            other => panic!("unexpected {:?}", other),
        }
        desc.voip = VoipTuple {
            sip_server: Some(Ipv4Addr::new(10, 0, 0, 5)),
            sip_port: Some(5060),
            ip_address: Some(Ipv4Addr::new(10, 0, 0, 20)),
            rtp_port: None,
        };
        assert!(f.testee.install(&mut f.store, &desc).unwrap());
        let key = ServiceKey::Voip {
            intf_id: 1,
            onu_id: 1,
            uni_id: 0x0201,
        };
        let voip = f.testee.unicast_service(&key).unwrap().voip.clone().unwrap();
        assert_eq!(1111, voip.extension);
        assert_eq!(Ipv4Addr::new(10, 0, 0, 5), voip.gateway);
        assert!(f.testee
            .onus()
            .mib(1, 1)
            .unwrap()
            .exists(EntityClass::SipUserData, 0x0201));
    }

    #[test]
    fn voip_flow_on_ethernet_port_stays_internet() {
        let mut f = fixture();
        let mut desc = descriptor(&[1, 2], &[900, 20], &[10, 10], Direction::Downstream, UNI_A);
        desc.service_type = ServiceType::Voip;
        assert!(f.testee.install(&mut f.store, &desc).unwrap());
        let service = f.testee.unicast_service(&internet(UNI_A)).unwrap();
        assert!(service.voip.is_none());
        let port = OnuPort::from_port_no(UNI_A);
        let voip = ServiceKey::Voip {
            intf_id: port.intf_id,
            onu_id: port.onu_id,
            uni_id: port.uni_id,
        };
        assert!(f.testee.unicast_service(&voip).is_none());
    }

    fn multicast_descriptor(cookies: &[u64], group_id: u32) -> ServiceDescriptor {
        ServiceDescriptor {
            cookies: cookies.to_vec(),
            vlans: vec![4000],
            meter_ids: vec![8],
            priorities: vec![10; cookies.len()],
            direction: Direction::Downstream,
            service_type: ServiceType::Multicast,
            onu_port: None,
            nni_port: Some(NNI),
            group_id: Some(group_id),
            voip: VoipTuple::default(),
        }
    }

    #[test]
    fn multicast_member_removal_keeps_others() {
        let mut f = fixture();
        f.store.add_group(group_mod(5, &[UNI_A, UNI_B, UNI_C])).unwrap();
        assert!(f.testee
            .install(&mut f.store, &multicast_descriptor(&[40, 41], 5))
            .unwrap());

        let service = f.testee.multicast_service(5).unwrap().clone();
        assert_eq!(4094, service.gemport_id);
        assert_eq!(vec![UNI_A, UNI_B, UNI_C], service.members.keys().cloned().collect::<Vec<_>>());
        // one OLT path for the shared PON interface
        assert_eq!(
            vec![
                "perform_group_operation",
                "create_traffic_schedulers",
                "create_traffic_queues",
                "flow_add",
                "perform_group_operation",
            ],
            f.olt.take_calls().iter().map(|c| c.name()).collect::<Vec<_>>()
        );
        assert!(f.testee
            .onus()
            .mib(1, 2)
            .unwrap()
            .exists(EntityClass::MulticastSubscriberConfigInfo, 1));

        assert!(!f.testee.remove_member(&mut f.store, 5, UNI_B));
        assert!(f.olt.calls().is_empty());
        assert!(!f.testee
            .onus()
            .mib(1, 2)
            .unwrap()
            .exists(EntityClass::GemPortNetworkCtp, 4094));
        assert!(f.testee
            .onus()
            .mib(1, 1)
            .unwrap()
            .exists(EntityClass::GemPortNetworkCtp, 4094));

        assert!(!f.testee.remove_member(&mut f.store, 5, UNI_A));
        assert!(f.testee.remove_member(&mut f.store, 5, UNI_C));
        assert_eq!(
            vec![
                "perform_group_operation",
                "flow_remove",
                "remove_traffic_queues",
                "remove_traffic_schedulers",
                "delete_group",
            ],
            f.olt.call_names()
        );
        assert!(f.testee.multicast_service(5).is_none());
        assert!(!f.testee.is_installed(40));

        // the multicast GEM port is free again
        f.olt.take_calls();
        assert!(f.testee
            .install(&mut f.store, &multicast_descriptor(&[40, 41], 5))
            .unwrap());
        assert_eq!(4094, f.testee.multicast_service(5).unwrap().gemport_id);
    }

    #[test]
    fn multicast_flow_removal_tears_down_all() {
        let mut f = fixture();
        f.store.add_group(group_mod(5, &[UNI_A, UNI_B])).unwrap();
        f.testee
            .install(&mut f.store, &multicast_descriptor(&[40, 41], 5))
            .unwrap();
        let mut freed = f.testee.uninstall(&mut f.store, 41);
        freed.sort();
        assert_eq!(
            vec![(UNI_A, Direction::Downstream), (UNI_B, Direction::Downstream)],
            freed
        );
        assert!(f.testee.multicast_service(5).is_none());
        assert!(f.olt.call_names().contains(&"delete_group"));
    }
}
