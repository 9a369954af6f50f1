/*!
One OLT as one OpenFlow datapath: the glue between the controller messages,
the flow store, the service provisioning and the OLT indications.

A `Device` is owned by the dispatch worker. Everything it does happens in
response to one event, in the order the events were queued.
*/

use olt;
use olt::{Indication, OltDriver, Onu, OperState, SerialNumber};
use onu::{AttrValue, EntityClass, OnuManagement, OnuMib};
use openflow;
use openflow::{ControllerLink, Effect, Message, OfSwitch};
use openflow::messages::*;
use provision::Provisioner;
use reconcile;
use reconcile::Outcome;
use resources::{GemPorts, OnuPort};
use service::{Direction, ServiceDescriptor};
use store::{GroupChange, Store};
use subscribers::Subscribers;

use byteorder::{ByteOrder, NetworkEndian};

use std::sync::Arc;

/// Port number of the network side
pub const NNI_PORT: u32 = 0x14;
const N_TABLES: u8 = 2;
const NNI_SPEED: u32 = 100_000;
const POTS_SPEED: u32 = 10_000;

pub struct Device {
    name: String,
    olt: Arc<dyn OltDriver>,
    store: Store,
    switch: OfSwitch,
    provisioner: Provisioner,
    link: ControllerLink,
}

impl Device {
    /// Reads the device info of the OLT and sets up an empty datapath
    pub fn new(
        name: &str,
        olt: Arc<dyn OltDriver>,
        onus: Box<dyn OnuManagement + Send>,
        subscribers: Subscribers,
        link: ControllerLink,
    ) -> olt::Result<Device> {
        let info = olt.device_info()?;
        let datapath_id = info.datapath_id().unwrap_or_else(|| {
            warn!(
                "{}: device id {} does not make a datapath id",
                name, info.device_id
            );
            0
        });
        info!(
            "{}: {} {} with datapath id {:#x}",
            name, info.vendor, info.model, datapath_id
        );
        let desc = OfpDesc {
            mfr_desc: "OpenFlow Agent".to_string(),
            hw_desc: info.model.clone(),
            sw_desc: info.firmware_version.clone(),
            serial_num: info.device_serial_number.clone(),
            dp_desc: "None".to_string(),
        };
        Ok(Device {
            name: name.to_string(),
            store: Store::new(N_TABLES, nni_port(datapath_id)),
            switch: OfSwitch::new(datapath_id, desc),
            provisioner: Provisioner::new(olt.clone(), onus, subscribers, GemPorts::new(&info)),
            olt,
            link,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /* Controller side */

    pub fn handle_message(&mut self, message: &Message) {
        let mut out = vec![];
        let effects = match self.switch.handle(&mut self.store, message, &mut out) {
            Ok(effects) => effects,
            Err(e) => {
                error!("{}: handling {:?} failed: {}", self.name, message.header, e);
                vec![]
            }
        };
        self.link.send_bytes(&out);

        for effect in effects {
            match effect {
                Effect::Reconcile(cookie) => self.flow_added(cookie),
                Effect::Teardown(cookie) => self.flow_deleted(cookie),
                Effect::MembersChanged(change) => self.members_changed(change),
            }
        }
    }

    fn flow_added(&mut self, cookie: u64) {
        let services = match reconcile::reconcile(&self.store, cookie) {
            Outcome::Reconciled(services) => services,
            Outcome::Ambiguous => {
                info!("{}: flow {:#x} follows more than one flow", self.name, cookie);
                return;
            }
            Outcome::NoMatch => {
                debug!("{}: flow {:#x} does not complete a service yet", self.name, cookie);
                return;
            }
        };
        for service in services {
            if let Err(e) = self.provisioner.install(&mut self.store, &service) {
                error!(
                    "{}: installing the {} {} service of flows {:x?} failed: {}",
                    self.name, service.direction, service.service_type, service.cookies, e
                );
                self.reject_flow(cookie);
                return;
            }
        }
    }

    /// Answers the controller's flow-mod with an error and forgets the flow
    fn reject_flow(&mut self, cookie: u64) {
        let mut out = vec![];
        match self.switch.flow_mod_failed(cookie, &mut out) {
            Ok(true) => self.link.send_bytes(&out),
            Ok(false) => warn!("{}: no request of flow {:#x} to answer", self.name, cookie),
            Err(e) => error!("{}: {}", self.name, e),
        }
        self.forget_flow(cookie);
    }

    fn flow_deleted(&mut self, cookie: u64) {
        info!("{}: controller deleted flow {:#x}", self.name, cookie);
        self.forget_flow(cookie);
    }

    /// Tears down what the flow contributes to, removes it and lets the
    /// remaining flows take the freed ports
    fn forget_flow(&mut self, cookie: u64) {
        let freed = self.provisioner.uninstall(&mut self.store, cookie);
        self.store.remove_flow(cookie);
        self.switch.forget_flow_mod(cookie);
        self.reinstall(&freed);
    }

    fn reinstall(&mut self, freed: &[(u32, Direction)]) {
        if freed.is_empty() {
            return;
        }
        let services = reconcile::reconcile_ports(&self.store, freed);
        self.install_all(&services);
    }

    fn install_all(&mut self, services: &[ServiceDescriptor]) {
        for service in services {
            match self.provisioner.install(&mut self.store, service) {
                Ok(true) => info!(
                    "{}: {} {} service of flows {:x?} installed",
                    self.name, service.direction, service.service_type, service.cookies
                ),
                Ok(false) => {}
                Err(e) => error!(
                    "{}: installing service of flows {:x?} failed: {}",
                    self.name, service.cookies, e
                ),
            }
        }
    }

    fn members_changed(&mut self, change: GroupChange) {
        let group_id = change.group_id;
        if self.provisioner.multicast_service(group_id).is_none() {
            let added: Vec<(u32, Direction)> = change
                .added
                .iter()
                .map(|p| (*p, Direction::Downstream))
                .collect();
            let services = reconcile::reconcile_ports(&self.store, &added);
            self.install_all(&services);
            return;
        }
        for port_no in change.removed {
            if self.provisioner
                .remove_member(&mut self.store, group_id, port_no)
            {
                info!("{}: multicast group {} has no members left", self.name, group_id);
            }
        }
        for port_no in change.added {
            if self.provisioner.multicast_service(group_id).is_none() {
                break;
            }
            if let Err(e) = self.provisioner.add_member(group_id, port_no) {
                error!(
                    "{}: adding port {:#x} to multicast group {} failed: {}",
                    self.name, port_no, group_id, e
                );
            }
        }
    }

    fn announce(&mut self, port: OfpPort) {
        let mut out = vec![];
        match openflow::port_status(&mut self.store, port, &mut out) {
            Ok(()) => self.link.send_bytes(&out),
            Err(e) => error!("{}: {}", self.name, e),
        }
    }

    /* OLT side */

    pub fn handle_indication(&mut self, indication: Indication) {
        match indication {
            Indication::OnuDiscovery {
                intf_id,
                serial_number,
            } => self.onu_discovered(intf_id, serial_number),
            Indication::Onu {
                intf_id,
                onu_id,
                oper_state,
                admin_state,
                fail_reason,
            } => {
                if let Some(reason) = fail_reason_text(fail_reason) {
                    warn!(
                        "{}: ONU {} on interface {} failed: {}",
                        self.name, onu_id, intf_id, reason
                    );
                }
                if oper_state == OperState::Down || admin_state == OperState::Down {
                    self.onu_down(intf_id, onu_id);
                }
                else {
                    self.onu_up(intf_id, onu_id);
                }
            }
            Indication::Omci { intf_id, onu_id, .. } => debug!(
                "{}: unsolicited OMCI message of ONU {} on interface {}",
                self.name, onu_id, intf_id
            ),
            Indication::FlowStats {
                flow_id,
                tx_packets,
                tx_bytes,
                timestamp,
                ..
            } => {
                let cookies = match self.provisioner.hashes().cookies(flow_id) {
                    Some(cookies) => cookies.to_vec(),
                    None => {
                        trace!("{}: statistics of unknown flow {}", self.name, flow_id);
                        return;
                    }
                };
                self.store
                    .record_stats(flow_id, &cookies, tx_packets, tx_bytes, timestamp);
            }
        }
    }

    fn onu_discovered(&mut self, intf_id: u32, serial_number: SerialNumber) {
        let sn = serial_number.to_string();
        info!("{}: ONU {} discovered on interface {}", self.name, sn, intf_id);
        let onu_id = match self.provisioner.subscribers().onu_id(intf_id, &sn) {
            Ok(onu_id) => onu_id,
            Err(e) => {
                error!("{}: no ONU id for {}: {}", self.name, sn, e);
                return;
            }
        };
        let onu = Onu {
            intf_id,
            onu_id,
            serial_number,
        };
        if let Err(e) = self.olt.activate_onu(&onu) {
            error!("{}: activating ONU {} as {} failed: {}", self.name, sn, onu_id, e);
        }
    }

    fn onu_up(&mut self, intf_id: u32, onu_id: u32) {
        let sn = match self.provisioner.subscribers().serial_number(intf_id, onu_id) {
            Some(sn) => sn.to_string(),
            None => {
                error!("{}: ONU {} on interface {} not found", self.name, onu_id, intf_id);
                return;
            }
        };
        if let Err(e) = self.provisioner.onus().initialize(intf_id, onu_id) {
            error!(
                "{}: initializing ONU {} on interface {} failed: {}",
                self.name, onu_id, intf_id, e
            );
            return;
        }
        info!("{}: ONU {} on interface {} successfully activated", self.name, onu_id, intf_id);

        let ports = match self.provisioner.onus().mib(intf_id, onu_id) {
            Some(mib) => uni_ports(mib, intf_id, onu_id, &sn),
            None => vec![],
        };
        for port in ports {
            self.announce(port);
        }
    }

    fn onu_down(&mut self, intf_id: u32, onu_id: u32) {
        error!("{}: ONU {} on interface {} is down", self.name, onu_id, intf_id);
        self.provisioner.onus().forget(intf_id, onu_id);
        let nni = self.store.nni_port();
        let ports: Vec<OfpPort> = self.store
            .ports()
            .into_iter()
            .filter(|p| {
                let port = OnuPort::from_port_no(p.port_no);
                p.port_no != nni && port.intf_id == intf_id && port.onu_id == onu_id
            })
            .collect();
        for mut port in ports {
            port.state = OfpPortState::LinkDown as u32;
            self.announce(port);
        }
    }
}

fn fail_reason_text(fail_reason: u32) -> Option<&'static str> {
    match fail_reason {
        1 => Some("ranging"),
        2 => Some("password authentication"),
        3 => Some("loss of signal"),
        4 => Some("ONU alarm"),
        5 => Some("switch over"),
        _ => None,
    }
}

fn nni_port(datapath_id: u64) -> OfpPort {
    let features = OfpPortFeatures::Rate10GbFd as u32 | OfpPortFeatures::Fiber as u32;
    let mut dpid = [0; 8];
    NetworkEndian::write_u64(&mut dpid, datapath_id);
    let mut hw_addr = [0; 6];
    hw_addr.copy_from_slice(&dpid[2..]);
    OfpPort {
        port_no: NNI_PORT,
        hw_addr,
        name: "NNI".to_string(),
        config: 0,
        state: OfpPortState::Live as u32,
        curr: features,
        advertised: features,
        supported: features,
        peer: features,
        curr_speed: NNI_SPEED,
        max_speed: NNI_SPEED,
    }
}

/// Ethernet features and current speed of a PPTP configuration indication
fn link_mode(config_ind: u64) -> (u32, u32) {
    let (rate, speed) = match config_ind {
        0x01 => (OfpPortFeatures::Rate10MbFd, 10_000),
        0x02 => (OfpPortFeatures::Rate100MbFd, 100_000),
        0x03 => (OfpPortFeatures::Rate1GbFd, 1_000_000),
        0x04 => (OfpPortFeatures::Rate10GbFd, 10_000_000),
        0x05 => (OfpPortFeatures::Other, 2_500_000),
        0x06 => (OfpPortFeatures::Other, 5_000_000),
        0x07 => (OfpPortFeatures::Other, 25_000_000),
        0x08 => (OfpPortFeatures::Rate40GbFd, 40_000_000),
        0x11 => (OfpPortFeatures::Rate10MbHd, 10_000),
        0x12 => (OfpPortFeatures::Rate100MbHd, 100_000),
        0x13 => (OfpPortFeatures::Rate1GbHd, 1_000_000),
        _ => (OfpPortFeatures::Other, 0),
    };
    (rate as u32 | OfpPortFeatures::Copper as u32, speed)
}

/// Maximum speed of a sensed circuit pack type
fn max_speed(sensed_type: u64) -> u32 {
    match sensed_type {
        22 => 10_000,
        23 | 24 => 100_000,
        47 => 1_000_000,
        49 => 10_000_000,
        50 => 2_500_000,
        51 => 5_000_000,
        52 => 25_000_000,
        53 => 40_000_000,
        _ => 0,
    }
}

fn parse_mac(text: &str) -> Option<[u8; 6]> {
    let mut mac = [0; 6];
    let mut parts = text.split(':');
    for byte in mac.iter_mut() {
        *byte = u8::from_str_radix(parts.next()?, 16).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(mac)
}

fn port_state(mib: &OnuMib, class: EntityClass, instance: u16) -> u32 {
    match mib.get_int(class, instance, "operational_state") {
        Some(0) | None => OfpPortState::Live as u32,
        Some(_) => OfpPortState::LinkDown as u32,
    }
}

/// The switch ports of an ONU: one per PPTP Ethernet UNI and one per PPTP
/// POTS UNI of its MIB
fn uni_ports(mib: &OnuMib, intf_id: u32, onu_id: u32, serial_number: &str) -> Vec<OfpPort> {
    let mut ports = vec![];
    for pptp in mib.entity_ids(EntityClass::PptpEthernetUni) {
        let config_ind = mib.get_int(EntityClass::PptpEthernetUni, pptp, "config_ind")
            .unwrap_or(0);
        let sensed_type = mib.get_int(EntityClass::PptpEthernetUni, pptp, "sensed_type")
            .unwrap_or(0);
        let hw_addr = match mib.get(EntityClass::MacBridgePortConfigData, pptp, "port_mac_address") {
            Some(&AttrValue::Text(ref mac)) => parse_mac(mac).unwrap_or([0; 6]),
            _ => [0; 6],
        };
        let (features, speed) = link_mode(config_ind);
        ports.push(OfpPort {
            port_no: OnuPort::new(intf_id, onu_id, u32::from(pptp), false).port_no(),
            hw_addr,
            name: format!("{}-{}", serial_number, pptp & 0xff),
            config: 0,
            state: port_state(mib, EntityClass::PptpEthernetUni, pptp),
            curr: features,
            advertised: features,
            supported: features,
            peer: features,
            curr_speed: speed,
            max_speed: max_speed(sensed_type),
        });
    }
    for pptp in mib.entity_ids(EntityClass::PptpPotsUni) {
        let on_hook = mib.get_int(EntityClass::PptpPotsUni, pptp, "hook_state").unwrap_or(0) == 0;
        let features = OfpPortFeatures::Other as u32 | OfpPortFeatures::Copper as u32;
        ports.push(OfpPort {
            port_no: OnuPort::new(intf_id, onu_id, u32::from(pptp), true).port_no(),
            hw_addr: [0; 6],
            name: format!("{}-{}P", serial_number, pptp & 0xff),
            config: 0,
            state: port_state(mib, EntityClass::PptpPotsUni, pptp),
            curr: features,
            advertised: features,
            supported: features,
            peer: features,
            curr_speed: if on_hook { POTS_SPEED } else { 0 },
            max_speed: POTS_SPEED,
        });
    }
    ports
}
