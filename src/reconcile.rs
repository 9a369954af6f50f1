/*!
Reconstruction of subscriber services from the multi-table flow entries of the
store.

A service direction is a chain of flows linked by `goto` instructions, from a
flow in table 0 to a flow terminating with an output port or a group. Starting
from any flow of the chain, the backward pass walks down to table 0 and the
forward pass walks up to the terminating flows. A flow whose VLAN operations
only pop may lead to several terminating flows, so the result is a list.
*/

use service::{Direction, ServiceDescriptor, ServiceType, VoipTuple};
use store::{FlowEntry, Store, VlanOp};

/// The result of reconciling one flow entry
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Complete service directions the flow contributes to
    Reconciled(Vec<ServiceDescriptor>),
    /// More than one flow of a lower table may lead to the flow
    Ambiguous,
    /// The chain is not complete (yet)
    NoMatch,
}

impl Outcome {
    pub fn into_services(self) -> Vec<ServiceDescriptor> {
        match self {
            Outcome::Reconciled(services) => services,
            _ => vec![],
        }
    }
}

/// A service descriptor under construction
#[derive(Debug, Clone)]
struct Chain {
    cookies: Vec<u64>,
    vlans: Vec<u16>,
    meter_ids: Vec<u32>,
    priorities: Vec<u16>,
    direction: Direction,
    service_type: Option<ServiceType>,
    onu_port: Option<u32>,
    nni_port: Option<u32>,
    group_id: Option<u32>,
    voip: VoipTuple,
}

impl Chain {
    fn new(direction: Direction) -> Chain {
        Chain {
            cookies: vec![],
            vlans: vec![],
            meter_ids: vec![],
            priorities: vec![],
            direction,
            service_type: None,
            onu_port: None,
            nni_port: None,
            group_id: None,
            voip: VoipTuple::default(),
        }
    }

    fn ingress_port(&mut self, port_no: u32, overwrite: bool) {
        let port = match self.direction {
            Direction::Upstream => &mut self.onu_port,
            Direction::Downstream => &mut self.nni_port,
        };
        if overwrite || port.is_none() {
            *port = Some(port_no);
        }
    }

    fn egress_port(&mut self, port_no: u32) {
        match self.direction {
            Direction::Upstream => self.nni_port = Some(port_no),
            Direction::Downstream => self.onu_port = Some(port_no),
        }
    }

    /// Takes the SIP server and subscriber side of a VoIP flow
    fn take_voip(&mut self, flow: &FlowEntry) {
        if !flow.is_voip() {
            return;
        }
        self.service_type = Some(ServiceType::Voip);
        let m = &flow.flow_match;
        let (sip_port, sip_server, rtp_port, ip_address) = match self.direction {
            Direction::Upstream => (m.udp_dst, m.ipv4_dst, m.udp_src, m.ipv4_src),
            Direction::Downstream => (m.udp_src, m.ipv4_src, m.udp_dst, m.ipv4_dst),
        };
        self.voip.sip_port = sip_port.or(self.voip.sip_port);
        self.voip.sip_server = sip_server.or(self.voip.sip_server);
        self.voip.rtp_port = rtp_port.or(self.voip.rtp_port);
        self.voip.ip_address = ip_address.or(self.voip.ip_address);
    }

    fn finish(self, service_type: ServiceType) -> ServiceDescriptor {
        ServiceDescriptor {
            cookies: self.cookies,
            vlans: self.vlans,
            meter_ids: self.meter_ids,
            priorities: self.priorities,
            direction: self.direction,
            service_type,
            onu_port: self.onu_port,
            nni_port: self.nni_port,
            group_id: self.group_id,
            voip: self.voip,
        }
    }
}

/// Reconciles the flow with the given cookie
pub fn reconcile(store: &Store, cookie: u64) -> Outcome {
    let seed = match store.flow(cookie) {
        Some(flow) => flow,
        None => {
            warn!("Flow {:#x} does not exist", cookie);
            return Outcome::NoMatch;
        }
    };

    let mut chain = Chain::new(seed.direction);
    if seed.table_id > 0 {
        if let Err(outcome) = backward(store, seed, &mut chain) {
            return outcome;
        }
    }

    let mut services = vec![];
    forward(store, seed, chain, &mut services);
    if services.is_empty() {
        Outcome::NoMatch
    }
    else {
        Outcome::Reconciled(services)
    }
}

/// Reconciles the flows terminating at the ports: upstream the table 0
/// flows coming from the port, downstream the flows sending to the port
/// directly or through a group.
pub fn reconcile_ports(store: &Store, ports: &[(u32, Direction)]) -> Vec<ServiceDescriptor> {
    let mut services: Vec<ServiceDescriptor> = vec![];
    for &(port_no, direction) in ports {
        let groups = store.groups_by_port(port_no);
        let tables: Vec<u8> = match direction {
            Direction::Upstream => vec![0],
            Direction::Downstream => (0..store.max_table().map_or(0, |t| t + 1)).rev().collect(),
        };
        for table_id in tables {
            for flow in store.table(table_id) {
                if flow.direction != direction {
                    continue;
                }
                let selected = match direction {
                    Direction::Upstream => flow.flow_match.in_port == port_no,
                    Direction::Downstream => {
                        flow.actions.out_port == Some(port_no)
                            || flow.actions.group_id.map_or(false, |g| groups.contains(&g))
                    }
                };
                if !selected {
                    continue;
                }
                for service in reconcile(store, flow.cookie).into_services() {
                    if !services.iter().any(|s| s.cookies == service.cookies) {
                        services.push(service);
                    }
                }
            }
        }
    }
    services
}

fn same_path(a: &FlowEntry, b: &FlowEntry) -> bool {
    a.flow_match.in_port == b.flow_match.in_port && a.direction == b.direction && voip_agrees(a, b)
}

/// Two VoIP flows must not contradict each other on the SIP fields
fn voip_agrees(a: &FlowEntry, b: &FlowEntry) -> bool {
    if !a.is_voip() || !b.is_voip() {
        return true;
    }
    fn agree<T: PartialEq>(x: &Option<T>, y: &Option<T>) -> bool {
        match (x, y) {
            (&Some(ref x), &Some(ref y)) => x == y,
            _ => true,
        }
    }
    let (a, b) = (&a.flow_match, &b.flow_match);
    agree(&a.udp_src, &b.udp_src) && agree(&a.udp_dst, &b.udp_dst) && agree(&a.ipv4_src, &b.ipv4_src)
        && agree(&a.ipv4_dst, &b.ipv4_dst)
}

/// True if the VLAN operations of the flow may lead to the VLAN: a set or
/// push of it does, a pop toggles the result.
fn leads_to_vlan(flow: &FlowEntry, vlan: u16) -> bool {
    let mut matched = false;
    for op in &flow.actions.vlan_ops {
        match *op {
            VlanOp::Set(v) | VlanOp::Push(v) => {
                if v == vlan {
                    matched = true;
                }
            }
            VlanOp::Pop(_) => matched = !matched,
        }
    }
    matched
}

fn backward(store: &Store, flow: &FlowEntry, chain: &mut Chain) -> Result<(), Outcome> {
    let table_id = flow.table_id - 1;
    let candidates: Vec<&FlowEntry> = store
        .table(table_id)
        .into_iter()
        .filter(|c| {
            same_path(flow, c) && c.actions.goto_table == Some(flow.table_id)
                && leads_to_vlan(c, flow.flow_match.vlan_id)
        })
        .collect();
    let back = match candidates.len() {
        0 => {
            debug!(
                "No flow of table {} leads to flow {:#x}",
                table_id, flow.cookie
            );
            return Err(Outcome::NoMatch);
        }
        1 => candidates[0],
        n => {
            warn!(
                "{} flows of table {} lead to flow {:#x}",
                n, table_id, flow.cookie
            );
            return Err(Outcome::Ambiguous);
        }
    };

    chain.cookies.insert(0, back.cookie);
    chain.priorities.insert(0, back.priority);
    if let Some(meter_id) = back.actions.meter_id {
        chain.meter_ids.insert(0, meter_id);
    }
    chain.ingress_port(back.flow_match.in_port, true);
    chain.take_voip(back);
    if back.flow_match.vlan_id > 0 {
        chain.vlans.insert(0, back.flow_match.vlan_id);
    }

    if back.table_id > 0 {
        backward(store, back, chain)
    }
    else {
        Ok(())
    }
}

fn forward(store: &Store, flow: &FlowEntry, mut chain: Chain, services: &mut Vec<ServiceDescriptor>) {
    chain.cookies.push(flow.cookie);
    chain.priorities.push(flow.priority);
    chain.ingress_port(flow.flow_match.in_port, false);
    chain.take_voip(flow);

    let vlan = flow.flow_match.vlan_id;
    if vlan > 0 && chain.vlans.last() != Some(&vlan) {
        chain.vlans.push(vlan);
    }
    for op in &flow.actions.vlan_ops {
        match *op {
            VlanOp::Set(v) | VlanOp::Push(v) => chain.vlans.push(v),
            VlanOp::Pop(_) => {}
        }
    }
    if let Some(meter_id) = flow.actions.meter_id {
        chain.meter_ids.push(meter_id);
    }

    if let Some(group_id) = flow.actions.group_id {
        if chain.direction != Direction::Downstream {
            debug!("Upstream flow {:#x} outputs to group {}", flow.cookie, group_id);
        }
        else if chain.service_type == Some(ServiceType::Voip) {
            warn!("VoIP flow {:#x} outputs to group {}", flow.cookie, group_id);
        }
        else {
            chain.group_id = Some(group_id);
            services.push(chain.finish(ServiceType::Multicast));
        }
        return;
    }

    if let Some(port_no) = flow.actions.out_port {
        chain.egress_port(port_no);
        let service_type = chain.service_type.unwrap_or(ServiceType::Unicast);
        services.push(chain.finish(service_type));
        return;
    }

    if let Some(next) = flow.actions.goto_table {
        let pops_only = flow.actions.pops_only();
        for candidate in store.table(next) {
            if !same_path(flow, candidate) {
                continue;
            }
            if pops_only {
                forward(store, candidate, chain.clone(), services);
            }
            else if leads_to_vlan(flow, candidate.flow_match.vlan_id) {
                forward(store, candidate, chain, services);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openflow::messages::*;
    use store::tests::*;

    use ipnetwork::Ipv4Network;

    use std::net::Ipv4Addr;

    fn goto(table_id: u8, actions: Vec<OfpAction>) -> Vec<OfpInstruction> {
        vec![
            OfpInstruction::ApplyActions(actions),
            OfpInstruction::GotoTable(table_id),
        ]
    }

    fn out(port: u32, meter_id: u32, mut actions: Vec<OfpAction>) -> Vec<OfpInstruction> {
        actions.push(output(port));
        vec![
            OfpInstruction::ApplyActions(actions),
            OfpInstruction::Meter(meter_id),
        ]
    }

    fn push_vlan(vlan: u16) -> Vec<OfpAction> {
        vec![OfpAction::PushVlan(0x8100), set_vlan(vlan)]
    }

    fn add(store: &mut Store, fm: OfpFlowMod) {
        store.add_flow(request(fm)).unwrap();
    }

    /// Downstream: pop 900 in table 0, set 0 with meter 7 towards UNI_A in table 1
    fn downstream(store: &mut Store) {
        add(store, flow_mod(10, 0, 1000, NNI, 900, goto(1, vec![OfpAction::PopVlan])));
        add(store, flow_mod(11, 1, 1000, NNI, 20, out(UNI_A, 7, vec![set_vlan(0)])));
    }

    /// Upstream: tag 20 in table 0, push 900 with meter 8 towards the NNI in table 1
    fn upstream(store: &mut Store) {
        add(store, flow_mod(20, 0, 1000, UNI_A, 0, goto(1, vec![set_vlan(20)])));
        add(store, flow_mod(21, 1, 1000, UNI_A, 20, out(NNI, 8, push_vlan(900))));
    }

    fn single(outcome: Outcome) -> ServiceDescriptor {
        match outcome {
            Outcome::Reconciled(mut services) => {
                assert_eq!(1, services.len());
                services.remove(0)
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn downstream_unicast_from_both_seeds() {
        let mut testee = store();
        downstream(&mut testee);

        let service = single(reconcile(&testee, 11));
        assert_eq!(vec![10, 11], service.cookies);
        assert_eq!(vec![7], service.meter_ids);
        assert_eq!(vec![900, 20, 0], service.vlans);
        assert_eq!(vec![1000, 1000], service.priorities);
        assert_eq!(Some(UNI_A), service.onu_port);
        assert_eq!(Some(NNI), service.nni_port);
        assert_eq!(ServiceType::Unicast, service.service_type);
        assert_eq!(Direction::Downstream, service.direction);

        assert_eq!(service, single(reconcile(&testee, 10)));
    }

    #[test]
    fn upstream_unicast_from_both_seeds() {
        let mut testee = store();
        upstream(&mut testee);

        let service = single(reconcile(&testee, 21));
        assert_eq!(vec![20, 21], service.cookies);
        assert_eq!(vec![20, 900], service.vlans);
        assert_eq!(vec![8], service.meter_ids);
        assert_eq!(Some(UNI_A), service.onu_port);
        assert_eq!(Some(NNI), service.nni_port);
        assert_eq!(Direction::Upstream, service.direction);

        assert_eq!(service, single(reconcile(&testee, 20)));
    }

    #[test]
    fn incomplete_chains() {
        let mut testee = store();
        add(&mut testee, flow_mod(11, 1, 1000, NNI, 20, out(UNI_A, 7, vec![set_vlan(0)])));
        assert_eq!(Outcome::NoMatch, reconcile(&testee, 11));
        assert_eq!(Outcome::NoMatch, reconcile(&testee, 99));

        // a set to another VLAN does not lead to the flow
        add(&mut testee, flow_mod(20, 0, 1000, NNI, 900, goto(1, vec![set_vlan(21)])));
        assert_eq!(Outcome::NoMatch, reconcile(&testee, 11));
        assert_eq!(Outcome::NoMatch, reconcile(&testee, 20));
    }

    #[test]
    fn backward_ambiguity() {
        let mut testee = store();
        downstream(&mut testee);
        add(&mut testee, flow_mod(12, 0, 2000, NNI, 901, goto(1, vec![OfpAction::PopVlan])));
        assert_eq!(Outcome::Ambiguous, reconcile(&testee, 11));
    }

    #[test]
    fn pop_only_seed_fans_out() {
        let mut testee = store();
        downstream(&mut testee);
        add(&mut testee, flow_mod(13, 1, 500, NNI, 21, out(UNI_B, 7, vec![set_vlan(0)])));

        let services = reconcile(&testee, 10).into_services();
        assert_eq!(2, services.len());
        assert_eq!(vec![10, 11], services[0].cookies);
        assert_eq!(vec![10, 13], services[1].cookies);
        assert_eq!(Some(UNI_B), services[1].onu_port);
        assert_eq!(vec![900, 21, 0], services[1].vlans);
    }

    #[test]
    fn multicast_never_has_onu_port() {
        let mut testee = store();
        testee.add_group(group_mod(5, &[UNI_A, UNI_B])).unwrap();
        add(
            &mut testee,
            flow_mod(
                30,
                0,
                1000,
                NNI,
                4000,
                vec![
                    OfpInstruction::ApplyActions(vec![OfpAction::Group(5)]),
                    OfpInstruction::Meter(9),
                ],
            ),
        );
        let service = single(reconcile(&testee, 30));
        assert_eq!(ServiceType::Multicast, service.service_type);
        assert_eq!(Some(5), service.group_id);
        assert_eq!(None, service.onu_port);
        assert_eq!(vec![4000], service.vlans);
        assert_eq!(vec![9], service.meter_ids);
    }

    #[test]
    fn voip_upstream_tuple() {
        let mut testee = store();
        add(&mut testee, flow_mod(40, 0, 1000, UNI_B, 0, goto(1, vec![set_vlan(30)])));
        let mut fm = flow_mod(41, 1, 1000, UNI_B, 30, out(NNI, 7, push_vlan(901)));
        fm.match_field.add_tlv(OfpOxmTlv::new_eth_type(0x0800));
        fm.match_field.add_tlv(OfpOxmTlv::new_ip_proto(17));
        fm.match_field
            .add_tlv(OfpOxmTlv::new_udp_port(5060, &ProtocolEndpoint::Dst));
        fm.match_field
            .add_tlv(OfpOxmTlv::new_udp_port(5070, &ProtocolEndpoint::Src));
        let server = Ipv4Network::new(Ipv4Addr::new(10, 0, 0, 5), 32).unwrap();
        fm.match_field
            .add_tlv(OfpOxmTlv::new_ipv4(&server, &ProtocolEndpoint::Dst));
        add(&mut testee, fm);

        let service = single(reconcile(&testee, 40));
        assert_eq!(ServiceType::Voip, service.service_type);
        assert_eq!(vec![40, 41], service.cookies);
        assert_eq!(Some(Ipv4Addr::new(10, 0, 0, 5)), service.voip.sip_server);
        assert_eq!(Some(5060), service.voip.sip_port);
        assert_eq!(Some(5070), service.voip.rtp_port);
        assert_eq!(None, service.voip.ip_address);
        assert_eq!(service, single(reconcile(&testee, 41)));
    }

    #[test]
    fn ports_select_terminating_flows() {
        let mut testee = store();
        downstream(&mut testee);
        upstream(&mut testee);

        let services = reconcile_ports(
            &testee,
            &[(UNI_A, Direction::Downstream), (UNI_A, Direction::Upstream)],
        );
        assert_eq!(2, services.len());
        assert_eq!(vec![10, 11], services[0].cookies);
        assert_eq!(vec![20, 21], services[1].cookies);

        assert!(reconcile_ports(&testee, &[(UNI_B, Direction::Downstream)]).is_empty());
    }
}
