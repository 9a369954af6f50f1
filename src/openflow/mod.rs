/*!
The switch side of OpenFlow 1.3 toward one controller.

The agent dials the controller and keeps the connection alive. The connection
thread answers echo requests itself and forwards every other message to the
worker, which handles it with an `OfSwitch` against the device's `Store`.
Handling a message never talks to the hardware: accepted flow and group
modifications are returned as `Effect`s for the provisioning side.
*/

pub mod error;
pub mod messages;

use openflow::error::{Error, Result};
use openflow::messages::*;
use openflow::messages::deserialize::Deserialize;
use openflow::messages::serialize::OfpPacket;
use store::{FlowRequest, GroupChange, Store};

use rand;

use std::collections::HashMap;
use std::io;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const N_BUFFERS: u32 = 256;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

pub fn gen_xid() -> u32 {
    let xid = rand::random();
    trace!("Using xid {} for the outgoing message", xid);
    xid
}

/// One message as read from the controller connection
#[derive(Debug, Clone)]
pub struct Message {
    pub header: OfpHeader,
    pub raw_header: [u8; 8],
    pub body: Vec<u8>,
}

impl Message {
    pub fn read<R: Read>(stream: &mut R) -> io::Result<Message> {
        let mut raw_header = [0; 8];
        stream.read_exact(&mut raw_header)?;
        let header = OfpHeader::deserialize(&raw_header);
        let mut body = vec![0; header.body_length()];
        stream.read_exact(&mut body)?;
        Ok(Message {
            header,
            raw_header,
            body,
        })
    }

    /// The complete message as received
    pub fn bytes(&self) -> Vec<u8> {
        let mut bytes = self.raw_header.to_vec();
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

/// The sending half of the controller connection, shared by the connection
/// thread and the worker. Messages sent while disconnected are dropped.
#[derive(Clone, Default)]
pub struct ControllerLink {
    stream: Arc<Mutex<Option<Box<dyn Write + Send>>>>,
}

impl ControllerLink {
    pub fn new() -> ControllerLink {
        ControllerLink::default()
    }

    pub fn attach(&self, stream: Box<dyn Write + Send>) {
        *self.stream.lock().unwrap_or_else(|e| e.into_inner()) = Some(stream);
    }

    pub fn detach(&self) {
        *self.stream.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Writes serialized messages in one go
    pub fn send_bytes(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut stream = self.stream.lock().unwrap_or_else(|e| e.into_inner());
        let result = match *stream {
            Some(ref mut s) => s.write_all(bytes).and_then(|_| s.flush()),
            None => {
                debug!("Not connected to the controller, dropping {} bytes", bytes.len());
                return;
            }
        };
        if let Err(e) = result {
            warn!("Sending to the controller failed: {}", e);
        }
    }

    pub fn send<P: OfpPacket>(&self, packet: &P, xid: u32) {
        let mut buf = vec![];
        match packet.serialize(&mut buf, xid) {
            Ok(()) => self.send_bytes(&buf),
            Err(e) => error!("Serializing an outgoing message failed: {}", e),
        }
    }
}

#[cfg(test)]
impl ControllerLink {
    pub fn is_connected(&self) -> bool {
        self.stream.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }
}

/// Keeps a connection to the controller at `address`, reconnecting after a
/// delay whenever it is lost. Returns once `forward` refuses a message.
pub fn run<F>(address: &str, link: &ControllerLink, mut forward: F)
where
    F: FnMut(Message) -> bool,
{
    loop {
        match serve(address, link, &mut forward) {
            Ok(false) => {
                link.detach();
                return;
            }
            Ok(true) => {}
            Err(e) => warn!("Connection to the controller at {} lost: {}", address, e),
        }
        link.detach();
        thread::sleep(RECONNECT_DELAY);
    }
}

fn serve<F>(address: &str, link: &ControllerLink, forward: &mut F) -> io::Result<bool>
where
    F: FnMut(Message) -> bool,
{
    let mut stream = TcpStream::connect(address)?;
    stream.set_nodelay(true)?;
    info!("Connected to the controller at {}", address);
    link.attach(Box::new(stream.try_clone()?));
    link.send(&OfpHello::new(), gen_xid());

    loop {
        let message = Message::read(&mut stream)?;
        if message.header.typ() == OfpType::EchoRequest as u8 {
            // the worker may be busy with the hardware
            trace!("Echo request {}", message.header.xid());
            link.send(&OfpEchoReply::new(message.body), message.header.xid());
            continue;
        }
        if !forward(message) {
            return Ok(false);
        }
    }
}

/// What the provisioning side has to do after an accepted request
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// A flow was added and may complete a service
    Reconcile(u64),
    /// The controller deleted the flow; it is forgotten after its teardown
    Teardown(u64),
    /// The buckets of a group were replaced
    MembersChanged(GroupChange),
}

/// The OpenFlow switch state beyond the store: identity, controller role
/// and the requests a late error may refer to
#[derive(Debug)]
pub struct OfSwitch {
    datapath_id: u64,
    desc: OfpDesc,
    role: Option<u32>,
    /// xid and bytes of each accepted flow-mod by cookie
    flow_mods: HashMap<u64, (u32, Vec<u8>)>,
}

impl OfSwitch {
    pub fn new(datapath_id: u64, desc: OfpDesc) -> OfSwitch {
        OfSwitch {
            datapath_id,
            desc,
            role: None,
            flow_mods: HashMap::new(),
        }
    }

    pub fn datapath_id(&self) -> u64 {
        self.datapath_id
    }

    /// Handles one controller message, writing the replies to `out`.
    /// Only a broken `out` is an error; a bad request is answered.
    pub fn handle<W: Write>(
        &mut self,
        store: &mut Store,
        message: &Message,
        out: &mut W,
    ) -> io::Result<Vec<Effect>> {
        debug!("Incoming message: {:?}", message.header);
        match self.handle_ofp_message(store, message, out) {
            Ok(effects) => Ok(effects),
            Err(e) => {
                self.handle_of_errors(e, message, out)?;
                Ok(vec![])
            }
        }
    }

    fn handle_ofp_message<W: Write>(
        &mut self,
        store: &mut Store,
        message: &Message,
        out: &mut W,
    ) -> Result<Vec<Effect>> {
        let header = &message.header;
        let xid = header.xid();
        let t = header.typ();
        let body = message.body.clone();

        if t == OfpType::Hello as u8 {
            let hello = OfpHello::deserialize(body)?;
            if !hello.supports(header.version()) {
                return Err(Error::HelloFailed);
            }
            info!("Controller greeted with OpenFlow version {}", header.version());
            return Ok(vec![]);
        }
        if header.version() != OFP_VERSION {
            return Err(Error::BadRequest(OfpBadRequestCode::BadVersion, body));
        }

        if t == OfpType::EchoRequest as u8 {
            let req = OfpEchoRequest::deserialize(body)?;
            OfpEchoReply::new(req.arbitrary()).serialize(out, xid)?;
        }
        else if t == OfpType::EchoReply as u8 {
            trace!("Echo reply {}", xid);
        }
        else if t == OfpType::FeaturesRequest as u8 {
            let capabilities = OfpCapabilities::FlowStats as u32 | OfpCapabilities::TableStats as u32
                | OfpCapabilities::GroupStats as u32;
            let features =
                OfpSwitchFeatures::new(self.datapath_id, N_BUFFERS, store.n_tables(), capabilities);
            features.serialize(out, xid)?;
        }
        else if t == OfpType::GetConfigRequest as u8 {
            let config = OfpSwitchConfig {
                flags: OfpConfigFlags::FragNormal as u16,
                miss_send_len: OFPCML_NO_BUFFER,
            };
            config.serialize(out, xid)?;
        }
        else if t == OfpType::SetConfig as u8 {
            debug!("Ignoring switch configuration");
        }
        else if t == OfpType::FlowMod as u8 {
            let flow_mod = OfpFlowMod::deserialize(body)?;
            return Ok(self.flow_mod(store, flow_mod, message));
        }
        else if t == OfpType::MeterMod as u8 {
            self.meter_mod(store, OfpMeterMod::deserialize(body)?);
        }
        else if t == OfpType::GroupMod as u8 {
            return Ok(self.group_mod(store, OfpGroupMod::deserialize(body)?));
        }
        else if t == OfpType::MultipartRequest as u8 {
            let request = OfpMultipartRequest::deserialize(body)?;
            for part in self.multipart_reply(store, &request, &message.body)? {
                part.serialize(out, xid)?;
            }
        }
        else if t == OfpType::BarrierRequest as u8 {
            OfpHeader::new(OfpType::BarrierReply, xid).serialize(out)?;
        }
        else if t == OfpType::RoleRequest as u8 {
            let request = OfpRoleRequest::deserialize(body)?;
            self.role_reply(&request).serialize(out, xid)?;
        }
        else if t == OfpType::Error as u8 {
            let error = OfpErrorMsg::deserialize(body)?;
            error!("Controller reported {}", error);
        }
        else {
            debug!(
                "Cannot interpret message of type {}. Full message body: {:?}",
                t, message.body
            );
            return Err(Error::BadRequest(OfpBadRequestCode::BadType, body));
        }
        Ok(vec![])
    }

    fn handle_of_errors<W: Write>(&self, error: Error, message: &Message, out: &mut W) -> io::Result<()> {
        let err_msg = match error {
            Error::Io(e) => return Err(e),
            Error::HelloFailed => {
                warn!(
                    "The controller does not offer OpenFlow 1.3, its version is {:x}",
                    message.header.version()
                );
                OfpErrorMsg::new_hello_failed()
            }
            Error::BadRequest(code, buf) => OfpErrorMsg::new_bad_request(code, &message.raw_header, &buf),
        };
        debug!("Outgoing error message: {:?}", err_msg);
        err_msg.serialize(out, message.header.xid())
    }

    /* Controller commands */

    fn flow_mod(&mut self, store: &mut Store, flow_mod: OfpFlowMod, message: &Message) -> Vec<Effect> {
        let cookie = flow_mod.cookie;
        match OfpFlowModCommand::from_u8(flow_mod.command) {
            Some(OfpFlowModCommand::Add) => {
                let request = match FlowRequest::from_flow_mod(flow_mod) {
                    Some(request) => request,
                    None => {
                        info!("Dropping flow {:#x} without ingress port or VLAN", cookie);
                        return vec![];
                    }
                };
                if let Err(rejection) = store.add_flow(request) {
                    info!("Dropping flow {:#x}: {}", cookie, rejection);
                    return vec![];
                }
                self.flow_mods
                    .insert(cookie, (message.header.xid(), message.bytes()));
                vec![Effect::Reconcile(cookie)]
            }
            Some(OfpFlowModCommand::Delete) | Some(OfpFlowModCommand::DeleteStrict) => {
                if store.flow(cookie).is_some() {
                    vec![Effect::Teardown(cookie)]
                }
                else {
                    info!("Flow {:#x} to delete does not exist", cookie);
                    vec![]
                }
            }
            other => {
                debug!("Ignoring flow-mod command {:?} of flow {:#x}", other, cookie);
                vec![]
            }
        }
    }

    fn meter_mod(&self, store: &mut Store, meter_mod: OfpMeterMod) {
        let meter_id = meter_mod.meter_id;
        if meter_mod.command == OfpMeterModCommand::Add as u16 {
            match store.add_meter(meter_mod) {
                Ok(()) => debug!("Meter {} added", meter_id),
                Err(rejection) => info!("Dropping meter {}: {}", meter_id, rejection),
            }
        }
        else if meter_mod.command == OfpMeterModCommand::Delete as u16 {
            match store.remove_meter(meter_id) {
                Ok(Some(_)) => debug!("Meter {} removed", meter_id),
                Ok(None) => info!("Meter {} to delete does not exist", meter_id),
                Err(rejection) => info!("Keeping meter {}: {}", meter_id, rejection),
            }
        }
        else {
            debug!("Ignoring meter-mod command {} of meter {}", meter_mod.command, meter_id);
        }
    }

    fn group_mod(&self, store: &mut Store, group_mod: OfpGroupMod) -> Vec<Effect> {
        let group_id = group_mod.group_id;
        if group_mod.command == OfpGroupModCommand::Add as u16 {
            match store.add_group(group_mod) {
                Ok(()) => debug!("Group {} added", group_id),
                Err(rejection) => info!("Dropping group {}: {}", group_id, rejection),
            }
        }
        else if group_mod.command == OfpGroupModCommand::Modify as u16 {
            match store.modify_group(group_mod) {
                Ok(change) => return vec![Effect::MembersChanged(change)],
                Err(rejection) => info!("Dropping modification of group {}: {}", group_id, rejection),
            }
        }
        else if group_mod.command == OfpGroupModCommand::Delete as u16 {
            match store.remove_group(group_id) {
                Ok(Some(_)) => debug!("Group {} removed", group_id),
                Ok(None) => info!("Group {} to delete does not exist", group_id),
                Err(rejection) => info!("Keeping group {}: {}", group_id, rejection),
            }
        }
        else {
            debug!("Ignoring group-mod command {} of group {}", group_mod.command, group_id);
        }
        vec![]
    }

    /* Replies */

    fn multipart_reply(
        &self,
        store: &Store,
        request: &OfpMultipartRequest,
        raw_body: &[u8],
    ) -> Result<Vec<OfpMultipartReply>> {
        let typ = match OfpMultipartType::from_u16(request.typ) {
            Some(typ) => typ,
            None => {
                return Err(Error::BadRequest(
                    OfpBadRequestCode::BadMultipart,
                    raw_body.to_vec(),
                ))
            }
        };
        let body = match typ {
            OfpMultipartType::Desc => OfpMultipartBody::Desc(self.desc.clone()),
            OfpMultipartType::Flow => OfpMultipartBody::Flows(store.flow_stats()),
            OfpMultipartType::Table | OfpMultipartType::PortStats => OfpMultipartBody::Empty,
            OfpMultipartType::Group => OfpMultipartBody::Groups(store.group_stats()),
            OfpMultipartType::GroupDesc => OfpMultipartBody::GroupDescs(store.group_descs()),
            OfpMultipartType::Meter => OfpMultipartBody::Meters(store.meter_stats()),
            OfpMultipartType::MeterFeatures => OfpMultipartBody::MeterFeatures(OfpMeterFeatures {
                max_meter: 0xffff_ffff,
                band_types: 1 << OfpMeterBandType::Drop as u32,
                capabilities: OfpMeterFlags::Kbps as u32,
                max_bands: 255,
                max_color: 255,
            }),
            OfpMultipartType::PortDesc => OfpMultipartBody::Ports(store.ports()),
        };
        Ok(OfpMultipartReply::parts(typ, body))
    }

    fn role_reply(&mut self, request: &OfpRoleRequest) -> OfpRoleReply {
        let role = if request.role == OfpControllerRole::NoChange as u32 {
            *self.role.get_or_insert(OfpControllerRole::Equal as u32)
        }
        else {
            self.role = Some(request.role);
            request.role
        };
        OfpRoleReply {
            role,
            generation_id: request.generation_id,
        }
    }

    /* Asynchronous messages */

    /// Reports the failure of an accepted flow-mod with its original xid
    /// and bytes. Returns false if the flow-mod is not known.
    pub fn flow_mod_failed<W: Write>(&mut self, cookie: u64, out: &mut W) -> io::Result<bool> {
        let (xid, request) = match self.flow_mods.remove(&cookie) {
            Some(r) => r,
            None => return Ok(false),
        };
        OfpErrorMsg::new_flow_mod_failed(OfpFlowModFailedCode::Unknown, &request).serialize(out, xid)?;
        Ok(true)
    }

    /// Drops the request of a flow that is gone
    pub fn forget_flow_mod(&mut self, cookie: u64) {
        self.flow_mods.remove(&cookie);
    }
}

/// Stores the port and announces it, as added if it is new
pub fn port_status<W: Write>(store: &mut Store, port: OfpPort, out: &mut W) -> io::Result<()> {
    let reason = store.add_port(port.clone());
    info!("Port {:#x} ({}) {:?}", port.port_no, port.name, reason);
    OfpPortStatus { reason, desc: port }.serialize(out, gen_xid())
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use byteorder::{ByteOrder, NetworkEndian};
    use std::io::Cursor;
    use std::net::TcpListener;
    use std::sync::mpsc::channel;
    use store::tests::*;

    /// A link writing into a shared buffer
    pub struct Capture(pub Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    pub fn captured_link() -> (ControllerLink, Arc<Mutex<Vec<u8>>>) {
        let buffer = Arc::new(Mutex::new(vec![]));
        let link = ControllerLink::new();
        link.attach(Box::new(Capture(buffer.clone())));
        (link, buffer)
    }

    /// Splits a byte stream into messages
    pub fn messages(bytes: &[u8]) -> Vec<Message> {
        let mut cursor = Cursor::new(bytes);
        let mut messages = vec![];
        while (cursor.position() as usize) < bytes.len() {
            messages.push(Message::read(&mut cursor).unwrap());
        }
        messages
    }

    pub fn message<P: OfpPacket>(packet: &P, xid: u32) -> Message {
        let mut buf = vec![];
        packet.serialize(&mut buf, xid).unwrap();
        Message::read(&mut Cursor::new(buf)).unwrap()
    }

    fn header_only(typ: OfpType, xid: u32) -> Message {
        let mut buf = vec![];
        OfpHeader::new(typ, xid).serialize(&mut buf).unwrap();
        Message::read(&mut Cursor::new(buf)).unwrap()
    }

    fn switch() -> OfSwitch {
        OfSwitch::new(
            0xa82bb5010203,
            OfpDesc {
                mfr_desc: "OpenFlow Agent".to_string(),
                hw_desc: "asgvolt64".to_string(),
                sw_desc: "BAL.3.4".to_string(),
                serial_num: "EC1840000192".to_string(),
                dp_desc: "None".to_string(),
            },
        )
    }

    fn handle(testee: &mut OfSwitch, store: &mut Store, message: &Message) -> (Vec<Effect>, Vec<Message>) {
        let mut out = vec![];
        let effects = testee.handle(store, message, &mut out).unwrap();
        (effects, messages(&out))
    }

    fn internet_flow(cookie: u64) -> OfpFlowMod {
        flow_mod(
            cookie,
            0,
            1000,
            UNI_A,
            20,
            vec![OfpInstruction::ApplyActions(vec![output(NNI)])],
        )
    }

    #[test]
    fn features_reply() {
        let mut store = store();
        let (_, replies) = handle(&mut switch(), &mut store, &header_only(OfpType::FeaturesRequest, 5));
        assert_eq!(1, replies.len());
        assert_eq!(OfpType::FeaturesReply as u8, replies[0].header.typ());
        assert_eq!(5, replies[0].header.xid());
        assert_eq!(0xa82bb5010203, NetworkEndian::read_u64(&replies[0].body[0..8]));
        assert_eq!(256, NetworkEndian::read_u32(&replies[0].body[8..12]));
        assert_eq!(2, replies[0].body[12]);
        assert_eq!(0b1011, NetworkEndian::read_u32(&replies[0].body[16..20]));
    }

    #[test]
    fn get_config_and_barrier() {
        let mut store = store();
        let mut testee = switch();
        let (_, replies) = handle(&mut testee, &mut store, &header_only(OfpType::GetConfigRequest, 1));
        assert_eq!(vec![0, 0, 0xff, 0xff], replies[0].body);
        let (_, replies) = handle(&mut testee, &mut store, &header_only(OfpType::BarrierRequest, 2));
        assert_eq!(OfpType::BarrierReply as u8, replies[0].header.typ());
        assert!(replies[0].body.is_empty());
    }

    #[test]
    fn hello_of_older_version_fails() {
        let mut store = store();
        let mut buf = vec![];
        OfpHeader::new(OfpType::Hello, 3).serialize(&mut buf).unwrap();
        buf[0] = 1;
        let hello = Message::read(&mut Cursor::new(buf)).unwrap();
        let (_, replies) = handle(&mut switch(), &mut store, &hello);
        assert_eq!(OfpType::Error as u8, replies[0].header.typ());
        assert_eq!(vec![0, 0, 0, 0], replies[0].body);

        let (_, replies) = handle(&mut switch(), &mut store, &message(&OfpHello::new(), 4));
        assert!(replies.is_empty());
    }

    #[test]
    fn flow_add_is_stored_and_reconciled() {
        let mut store = store();
        let mut testee = switch();
        let request = message(&internet_flow(0x10), 77);
        let (effects, replies) = handle(&mut testee, &mut store, &request);
        assert!(replies.is_empty());
        assert_eq!(vec![Effect::Reconcile(0x10)], effects);
        assert!(store.flow(0x10).is_some());

        let mut out = vec![];
        assert!(testee.flow_mod_failed(0x10, &mut out).unwrap());
        let error = &messages(&out)[0];
        assert_eq!(77, error.header.xid());
        assert_eq!(vec![0, 5, 0, 0], error.body[0..4].to_vec());
        assert_eq!(request.bytes(), error.body[4..].to_vec());
        assert!(!testee.flow_mod_failed(0x10, &mut vec![]).unwrap());
    }

    #[test]
    fn invalid_flow_add_is_dropped_silently() {
        let mut store = store();
        let mut testee = switch();
        let mut untagged = internet_flow(0x11);
        untagged.match_field = OfpMatch::new();
        untagged.match_field.add_tlv(OfpOxmTlv::new_in_port(UNI_A));
        let (effects, replies) = handle(&mut testee, &mut store, &message(&untagged, 1));
        assert!(effects.is_empty() && replies.is_empty());

        let unknown_port = flow_mod(
            0x12,
            0,
            1000,
            0x4444,
            20,
            vec![OfpInstruction::ApplyActions(vec![output(NNI)])],
        );
        let (effects, replies) = handle(&mut testee, &mut store, &message(&unknown_port, 2));
        assert!(effects.is_empty() && replies.is_empty());
        assert!(store.flow(0x11).is_none() && store.flow(0x12).is_none());
    }

    #[test]
    fn flow_delete() {
        let mut store = store();
        let mut testee = switch();
        handle(&mut testee, &mut store, &message(&internet_flow(0x10), 1));

        let mut delete = internet_flow(0x10);
        delete.command = OfpFlowModCommand::DeleteStrict as u8;
        let (effects, _) = handle(&mut testee, &mut store, &message(&delete, 2));
        assert_eq!(vec![Effect::Teardown(0x10)], effects);
        assert!(store.flow(0x10).is_some());

        delete.cookie = 0x99;
        let (effects, replies) = handle(&mut testee, &mut store, &message(&delete, 3));
        assert!(effects.is_empty() && replies.is_empty());
    }

    #[test]
    fn meter_in_use_is_kept() {
        let mut store = store();
        let mut testee = switch();
        handle(&mut testee, &mut store, &message(&meter_mod(7, &[(1000, 100)]), 1));
        let metered = flow_mod(
            0x10,
            0,
            1000,
            UNI_A,
            20,
            vec![
                OfpInstruction::Meter(7),
                OfpInstruction::ApplyActions(vec![output(NNI)]),
            ],
        );
        handle(&mut testee, &mut store, &message(&metered, 2));

        let mut delete = meter_mod(7, &[]);
        delete.command = OfpMeterModCommand::Delete as u16;
        let (_, replies) = handle(&mut testee, &mut store, &message(&delete, 3));
        assert!(replies.is_empty());
        assert!(store.meter(7).is_some());

        store.remove_flow(0x10);
        handle(&mut testee, &mut store, &message(&delete, 4));
        assert!(store.meter(7).is_none());
    }

    #[test]
    fn group_modify_reports_members() {
        let mut store = store();
        let mut testee = switch();
        handle(&mut testee, &mut store, &message(&group_mod(1, &[UNI_A, UNI_B]), 1));
        let mut modify = group_mod(1, &[UNI_B, UNI_C]);
        modify.command = OfpGroupModCommand::Modify as u16;
        let (effects, _) = handle(&mut testee, &mut store, &message(&modify, 2));
        assert_eq!(
            vec![Effect::MembersChanged(GroupChange {
                group_id: 1,
                added: vec![UNI_C],
                removed: vec![UNI_A],
            })],
            effects
        );

        let mut select = group_mod(2, &[UNI_A]);
        select.typ = 1;
        handle(&mut testee, &mut store, &message(&select, 3));
        assert!(store.group(2).is_none());
    }

    #[test]
    fn multipart_replies() {
        let mut store = store();
        let mut testee = switch();
        handle(&mut testee, &mut store, &message(&internet_flow(0x10), 1));

        let request = |typ: u16| OfpMultipartRequest {
            typ,
            flags: 0,
            body: vec![],
        };
        let (_, replies) = handle(&mut testee, &mut store, &message(&request(0), 2));
        assert_eq!(8 + 1056, replies[0].body.len());

        let (_, replies) = handle(&mut testee, &mut store, &message(&request(1), 3));
        let flow_len = NetworkEndian::read_u16(&replies[0].body[8..10]) as usize;
        assert_eq!(8 + flow_len, replies[0].body.len());
        assert_eq!(0x10, NetworkEndian::read_u64(&replies[0].body[8 + 24..8 + 32]));

        let (_, replies) = handle(&mut testee, &mut store, &message(&request(13), 4));
        assert_eq!(8 + 4 * 64, replies[0].body.len());

        let (_, replies) = handle(&mut testee, &mut store, &message(&request(11), 5));
        assert_eq!(
            vec![0xff, 0xff, 0xff, 0xff, 0, 0, 0, 2, 0, 0, 0, 1, 255, 255, 0, 0],
            replies[0].body[8..].to_vec()
        );

        let (_, replies) = handle(&mut testee, &mut store, &message(&request(2), 6));
        assert_eq!(OfpType::Error as u8, replies[0].header.typ());
        assert_eq!(vec![0, 1, 0, 2], replies[0].body[0..4].to_vec());
    }

    #[test]
    fn port_desc_of_many_ports_is_split() {
        let mut store = store();
        for onu_id in 1..1100 {
            store.add_port(port(0x1000_0000 | onu_id << 16 | 1));
        }
        let request = OfpMultipartRequest {
            typ: OfpMultipartType::PortDesc as u16,
            flags: 0,
            body: vec![],
        };
        let (_, replies) = handle(&mut switch(), &mut store, &message(&request, 8));
        assert_eq!(2, replies.len());
        assert!(replies.iter().all(|r| r.header.xid() == 8));
        assert_eq!(OFPMPF_REPLY_MORE, NetworkEndian::read_u16(&replies[0].body[2..4]));
        assert_eq!(0, NetworkEndian::read_u16(&replies[1].body[2..4]));
        let n_ports: usize = replies.iter().map(|r| (r.body.len() - 8) / 64).sum();
        assert_eq!(store.ports().len(), n_ports);
    }

    #[test]
    fn role_request() {
        let mut store = store();
        let mut testee = switch();
        let role = |role: OfpControllerRole, generation_id: u64| OfpRoleRequest {
            role: role as u32,
            generation_id,
        };
        let reply_role = |m: &Message| {
            (
                NetworkEndian::read_u32(&m.body[0..4]),
                NetworkEndian::read_u64(&m.body[8..16]),
            )
        };

        let (_, replies) = handle(&mut testee, &mut store, &message(&role(OfpControllerRole::NoChange, 3), 1));
        assert_eq!((1, 3), reply_role(&replies[0]));
        let (_, replies) = handle(&mut testee, &mut store, &message(&role(OfpControllerRole::Master, 4), 2));
        assert_eq!((2, 4), reply_role(&replies[0]));
        let (_, replies) = handle(&mut testee, &mut store, &message(&role(OfpControllerRole::NoChange, 5), 3));
        assert_eq!((2, 5), reply_role(&replies[0]));
    }

    #[test]
    fn unknown_type_and_bad_length() {
        let mut store = store();
        let mut testee = switch();
        let (_, replies) = handle(&mut testee, &mut store, &header_only(OfpType::PortStatus, 9));
        assert_eq!(vec![0, 1, 0, 1], replies[0].body[0..4].to_vec());
        assert_eq!(9, replies[0].header.xid());

        let mut buf = vec![];
        OfpHeader::new(OfpType::RoleRequest, 10).serialize(&mut buf).unwrap();
        let (_, replies) = handle(&mut testee, &mut store, &Message::read(&mut Cursor::new(buf)).unwrap());
        assert_eq!(vec![0, 1, 0, 6], replies[0].body[0..4].to_vec());
    }

    #[test]
    fn port_status_add_then_modify() {
        let mut store = store();
        let mut out = vec![];
        port_status(&mut store, port(0x2001_0101), &mut out).unwrap();
        port_status(&mut store, port(0x2001_0101), &mut out).unwrap();
        let sent = messages(&out);
        assert_eq!(0, sent[0].body[0]);
        assert_eq!(2, sent[1].body[0]);
        assert!(store.port_exists(0x2001_0101));
    }

    #[test]
    fn link_drops_while_disconnected() {
        let link = ControllerLink::new();
        assert!(!link.is_connected());
        link.send(&OfpHello::new(), 1);
        link.attach(Box::new(Vec::new()));
        assert!(link.is_connected());
        link.detach();
        assert!(!link.is_connected());
        let (link, buffer) = captured_link();
        link.send(&OfpHello::new(), 1);
        assert_eq!(16, buffer.lock().unwrap().len());
    }

    #[test]
    fn connection_answers_echo_and_forwards() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let (tx, rx) = channel();
        let link = ControllerLink::new();
        let agent = thread::spawn(move || {
            run(&address, &link, |m| {
                tx.send(m).unwrap();
                false
            })
        });

        let (mut controller, _) = listener.accept().unwrap();
        let hello = Message::read(&mut controller).unwrap();
        assert_eq!(OfpType::Hello as u8, hello.header.typ());

        let mut echo = vec![];
        OfpHeader::new(OfpType::EchoRequest, 21).serialize(&mut echo).unwrap();
        controller.write_all(&echo).unwrap();
        let reply = Message::read(&mut controller).unwrap();
        assert_eq!(OfpType::EchoReply as u8, reply.header.typ());
        assert_eq!(21, reply.header.xid());

        let mut features = vec![];
        OfpHeader::new(OfpType::FeaturesRequest, 22).serialize(&mut features).unwrap();
        controller.write_all(&features).unwrap();
        agent.join().unwrap();
        assert_eq!(22, rx.recv().unwrap().header.xid());
    }
}
