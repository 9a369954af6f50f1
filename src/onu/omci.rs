/*!
OMCI transactions over the OLT's message channel. A request is sent with a
random transaction correlation id (TCI) and the caller blocks until the
indication listener delivers the answer carrying the same TCI.
*/

use olt;
use olt::{OltDriver, OmciMsg};
use onu::{sequence, Entity, EntityClass, Error, OnuManagement, OnuMib, Result};

use serde_json;

use rand::{thread_rng, Rng};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

const MT_CREATE: u8 = 4;
const MT_DELETE: u8 = 6;
const MT_SET: u8 = 8;
const MT_MIB_UPLOAD: u8 = 13;
const MT_MIB_UPLOAD_NEXT: u8 = 14;
const MT_MIB_RESET: u8 = 15;
const MT_REBOOT: u8 = 25;
/// Acknowledge request bit of the message type
const MT_AR: u8 = 0x40;
const MT_MASK: u8 = 0x1f;

const RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);
const ATTEMPTS: u32 = 6;
const MAX_TCI: u16 = 32767;

/// One OMCI message. The binary layout belongs to the OLT's OMCI codec; the
/// agent exchanges the decoded fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmciFrame {
    pub tci: u16,
    pub message_type: u8,
    pub class_id: u16,
    pub instance: u16,
    /// Attributes of create and set requests, uploaded entity of a MIB
    /// upload next response
    #[serde(default)]
    pub entity: Option<Entity>,
    #[serde(default)]
    pub success_code: u8,
    /// MIB upload response
    #[serde(default)]
    pub number_of_commands: u16,
    /// MIB upload next request
    #[serde(default)]
    pub sequence_number: u16,
}

impl OmciFrame {
    fn request(message_type: u8, class: EntityClass, instance: u16) -> OmciFrame {
        OmciFrame {
            tci: 0,
            message_type: message_type | MT_AR,
            class_id: class.class_id(),
            instance,
            entity: None,
            success_code: 0,
            number_of_commands: 0,
            sequence_number: 0,
        }
    }

    fn with_entity(mut self, entity: &Entity) -> OmciFrame {
        self.entity = Some(entity.clone());
        self
    }

    fn answers(&self, request: &OmciFrame) -> bool {
        self.message_type & MT_MASK == request.message_type & MT_MASK
            && self.class_id == request.class_id
    }
}

type Delivery = (u32, u32, OmciFrame);

/// Routes OMCI indications to the transaction waiting for them.
/// Clones share the set of outstanding transactions.
#[derive(Debug, Clone, Default)]
pub struct OmciResponder {
    pending: Arc<Mutex<HashMap<u16, Sender<Delivery>>>>,
}

impl OmciResponder {
    pub fn new() -> OmciResponder {
        OmciResponder::default()
    }

    /// Hands the frame of an OMCI indication to its transaction.
    /// Returns false if the frame is unreadable or nobody waits for it.
    pub fn deliver(&self, intf_id: u32, onu_id: u32, pkt: &[u8]) -> bool {
        let frame: OmciFrame = match serde_json::from_slice(pkt) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Unreadable OMCI indication from ONU {} on interface {}: {}", onu_id, intf_id, e);
                return false;
            }
        };
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        match pending.get(&frame.tci) {
            Some(tx) => tx.send((intf_id, onu_id, frame)).is_ok(),
            None => {
                trace!("Dropping OMCI indication with unknown TCI {}", frame.tci);
                false
            }
        }
    }

    /// Reserves an unused TCI
    fn register(&self, tx: Sender<Delivery>) -> u16 {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let mut rng = thread_rng();
        loop {
            let tci = rng.gen_range(0, MAX_TCI + 1);
            if !pending.contains_key(&tci) {
                pending.insert(tci, tx);
                return tci;
            }
        }
    }

    fn unregister(&self, tci: u16) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&tci);
    }
}

/// The `OnuManagement` of a real OLT: entity operations become OMCI
/// transactions, and the MIB copies are filled by MIB uploads.
pub struct OmciChannel {
    driver: Arc<dyn OltDriver>,
    responder: OmciResponder,
    mibs: HashMap<(u32, u32), OnuMib>,
    timeout: Duration,
}

impl OmciChannel {
    pub fn new(driver: Arc<dyn OltDriver>, responder: OmciResponder) -> OmciChannel {
        OmciChannel {
            driver,
            responder,
            mibs: HashMap::new(),
            timeout: RESPONSE_TIMEOUT,
        }
    }

    #[cfg(test)]
    fn with_timeout(mut self, timeout: Duration) -> OmciChannel {
        self.timeout = timeout;
        self
    }

    /// Sends the request until an answer arrives, at most `ATTEMPTS` times
    fn transact(&self, intf_id: u32, onu_id: u32, mut request: OmciFrame) -> Result<OmciFrame> {
        let (tx, rx) = channel();
        request.tci = self.responder.register(tx);
        let result = self.exchange(intf_id, onu_id, &request, &rx);
        self.responder.unregister(request.tci);
        result
    }

    fn exchange(&self, intf_id: u32, onu_id: u32, request: &OmciFrame, rx: &Receiver<Delivery>) -> Result<OmciFrame> {
        let msg = OmciMsg {
            intf_id,
            onu_id,
            pkt: serde_json::to_vec(request).map_err(olt::Error::from)?,
        };
        for attempt in 1..ATTEMPTS + 1 {
            trace!(
                "OMCI TCI {} to ONU {} on interface {}, attempt {}",
                request.tci, onu_id, intf_id, attempt
            );
            self.driver.omci_msg_out(&msg)?;
            let (answer_intf, answer_onu, answer) = match rx.recv_timeout(self.timeout) {
                Ok(delivery) => delivery,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            if answer_intf != intf_id || answer_onu != onu_id {
                return Err(Error::Mismatch(format!(
                    "interface {} or ONU {}",
                    answer_intf, answer_onu
                )));
            }
            if !answer.answers(request) {
                return Err(Error::Mismatch(format!(
                    "message type {} or entity class {}",
                    answer.message_type, answer.class_id
                )));
            }
            return Ok(answer);
        }
        Err(Error::Timeout { tci: request.tci })
    }

    fn checked(&self, intf_id: u32, onu_id: u32, op: &str, request: OmciFrame) -> Result<OmciFrame> {
        let answer = self.transact(intf_id, onu_id, request)?;
        if answer.success_code != 0 {
            return Err(Error::Rejected {
                op: op.to_string(),
                success_code: answer.success_code,
            });
        }
        Ok(answer)
    }

    /// Resets the MIB of the ONU. An ONU refusing the reset is rebooted.
    pub fn mib_reset(&mut self, intf_id: u32, onu_id: u32) -> Result<()> {
        let request = OmciFrame::request(MT_MIB_RESET, EntityClass::OntData, 0);
        let answer = self.transact(intf_id, onu_id, request)?;
        if answer.success_code == 0 {
            self.mibs.remove(&(intf_id, onu_id));
            return Ok(());
        }
        warn!(
            "MIB reset of ONU {} on interface {} failed with result {}, rebooting it",
            onu_id, intf_id, answer.success_code
        );
        self.reboot(intf_id, onu_id)?;
        Err(Error::Rejected {
            op: "MIB reset".to_string(),
            success_code: answer.success_code,
        })
    }

    pub fn reboot(&mut self, intf_id: u32, onu_id: u32) -> Result<()> {
        self.mibs.remove(&(intf_id, onu_id));
        let request = OmciFrame::request(MT_REBOOT, EntityClass::OntG, 0);
        self.checked(intf_id, onu_id, "reboot", request).map(|_| ())
    }

    /// Reads the whole MIB of the ONU into a new local copy
    pub fn mib_upload(&mut self, intf_id: u32, onu_id: u32) -> Result<()> {
        let request = OmciFrame::request(MT_MIB_UPLOAD, EntityClass::OntData, 0);
        let commands = self.transact(intf_id, onu_id, request)?.number_of_commands;

        let mut mib = OnuMib::new();
        for sequence_number in 0..commands {
            let mut request = OmciFrame::request(MT_MIB_UPLOAD_NEXT, EntityClass::OntData, 0);
            request.sequence_number = sequence_number;
            match self.transact(intf_id, onu_id, request)?.entity {
                Some(entity) => mib.insert(entity),
                None => debug!("MIB upload step {} carried no entity", sequence_number),
            }
        }
        info!(
            "Uploaded {} MIB entries of ONU {} on interface {}",
            commands, onu_id, intf_id
        );
        self.mibs.insert((intf_id, onu_id), mib);
        Ok(())
    }

    fn mib_mut(&mut self, intf_id: u32, onu_id: u32) -> Result<&mut OnuMib> {
        self.mibs
            .get_mut(&(intf_id, onu_id))
            .ok_or(Error::MissingMib { intf_id, onu_id })
    }
}

impl OnuManagement for OmciChannel {
    fn create(&mut self, intf_id: u32, onu_id: u32, entity: &Entity) -> Result<()> {
        self.mib_mut(intf_id, onu_id)?;
        let request = OmciFrame::request(MT_CREATE, entity.class, entity.instance).with_entity(entity);
        self.checked(intf_id, onu_id, &format!("create {:?}", entity.class), request)?;
        self.mib_mut(intf_id, onu_id)?.insert(entity.clone());
        Ok(())
    }

    fn set(&mut self, intf_id: u32, onu_id: u32, entity: &Entity) -> Result<()> {
        self.mib_mut(intf_id, onu_id)?;
        let request = OmciFrame::request(MT_SET, entity.class, entity.instance).with_entity(entity);
        self.checked(intf_id, onu_id, &format!("set {:?}", entity.class), request)?;
        self.mib_mut(intf_id, onu_id)?.insert(entity.clone());
        Ok(())
    }

    fn delete(&mut self, intf_id: u32, onu_id: u32, class: EntityClass, instance: u16) -> Result<()> {
        self.mib_mut(intf_id, onu_id)?;
        let request = OmciFrame::request(MT_DELETE, class, instance);
        self.checked(intf_id, onu_id, &format!("delete {:?}", class), request)?;
        self.mib_mut(intf_id, onu_id)?.remove(class, instance);
        Ok(())
    }

    fn mib(&self, intf_id: u32, onu_id: u32) -> Option<&OnuMib> {
        self.mibs.get(&(intf_id, onu_id))
    }

    fn initialize(&mut self, intf_id: u32, onu_id: u32) -> Result<()> {
        self.mib_reset(intf_id, onu_id)?;
        self.mib_upload(intf_id, onu_id)?;
        let ops = match self.mibs.get(&(intf_id, onu_id)) {
            Some(mib) => sequence::init(mib),
            None => Err(Error::MissingMib { intf_id, onu_id }),
        };
        let ops = match ops {
            Ok(ops) => ops,
            Err(e) => {
                error!(
                    "ONU {} on interface {} can not be initialized: {}, rebooting it",
                    onu_id, intf_id, e
                );
                self.reboot(intf_id, onu_id)?;
                return Err(e);
            }
        };
        self.run(intf_id, onu_id, &ops)
    }

    fn forget(&mut self, intf_id: u32, onu_id: u32) {
        self.mibs.remove(&(intf_id, onu_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use olt::mock::MockOlt;
    use onu::sequence::tests::uploaded_mib;
    use serde_json;

    /// Answers OMCI requests the way an ONU holding `mib` would
    fn simulated_onu(olt: &MockOlt, responder: &OmciResponder, mib: OnuMib, reset_result: u8) {
        let responder = responder.clone();
        let entities: Vec<Entity> = mib.entities();
        olt.on_omci(move |msg| {
            let request: OmciFrame = serde_json::from_slice(&msg.pkt).unwrap();
            let mut answer = request.clone();
            answer.message_type = request.message_type & MT_MASK | 0x20;
            answer.entity = None;
            match request.message_type & MT_MASK {
                MT_MIB_RESET => answer.success_code = reset_result,
                MT_MIB_UPLOAD => answer.number_of_commands = entities.len() as u16,
                MT_MIB_UPLOAD_NEXT => {
                    answer.entity = entities.get(request.sequence_number as usize).cloned()
                }
                MT_CREATE if request.class_id == EntityClass::GalEthernetProfile.class_id() => {
                    answer.success_code = 3
                }
                _ => {}
            }
            responder.deliver(msg.intf_id, msg.onu_id, &serde_json::to_vec(&answer).unwrap());
        });
    }

    #[test]
    fn mib_upload_fills_cache() {
        let olt = Arc::new(MockOlt::new());
        let responder = OmciResponder::new();
        simulated_onu(&olt, &responder, uploaded_mib(), 0);
        let mut testee = OmciChannel::new(olt.clone(), responder);

        testee.mib_reset(1, 5).unwrap();
        testee.mib_upload(1, 5).unwrap();
        assert_eq!(Some(&uploaded_mib()), testee.mib(1, 5));
        assert!(testee.mib(1, 6).is_none());
        // reset, upload and one upload next per entity
        assert_eq!(2 + uploaded_mib().entities().len(), olt.omci_sent().len());
    }

    #[test]
    fn refused_reset_reboots() {
        let olt = Arc::new(MockOlt::new());
        let responder = OmciResponder::new();
        simulated_onu(&olt, &responder, uploaded_mib(), 1);
        let mut testee = OmciChannel::new(olt.clone(), responder);

        match testee.initialize(0, 1) {
            Err(Error::Rejected { success_code: 1, .. }) => {}
            other => panic!("unexpected {:?}", other),
        }
        let sent: Vec<OmciFrame> = olt.omci_sent()
            .iter()
            .map(|m| serde_json::from_slice(&m.pkt).unwrap())
            .collect();
        assert_eq!(MT_REBOOT | MT_AR, sent[1].message_type);
        assert_eq!(EntityClass::OntG.class_id(), sent[1].class_id);
    }

    #[test]
    fn failed_init_deletes_created_entities() {
        let olt = Arc::new(MockOlt::new());
        let responder = OmciResponder::new();
        simulated_onu(&olt, &responder, uploaded_mib(), 0);
        let mut testee = OmciChannel::new(olt.clone(), responder);

        match testee.initialize(0, 1) {
            Err(Error::Rejected { success_code: 3, .. }) => {}
            other => panic!("unexpected {:?}", other),
        }
        let last: OmciFrame = serde_json::from_slice(&olt.omci_sent().last().unwrap().pkt).unwrap();
        assert_eq!(MT_DELETE | MT_AR, last.message_type);
        assert_eq!(EntityClass::MacBridgeServiceProfile.class_id(), last.class_id);
        assert!(!testee
            .mib(0, 1)
            .unwrap()
            .exists(EntityClass::MacBridgeServiceProfile, 0x8001));
    }

    #[test]
    fn unanswered_requests_time_out() {
        let olt = Arc::new(MockOlt::new());
        let mut testee = OmciChannel::new(olt.clone(), OmciResponder::new())
            .with_timeout(Duration::from_millis(1));
        match testee.mib_reset(0, 1) {
            Err(Error::Timeout { .. }) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(ATTEMPTS as usize, olt.omci_sent().len());
    }

    #[test]
    fn answers_must_match_request() {
        let olt = Arc::new(MockOlt::new());
        let responder = OmciResponder::new();
        let relay = responder.clone();
        olt.on_omci(move |msg| {
            let request: OmciFrame = serde_json::from_slice(&msg.pkt).unwrap();
            relay.deliver(msg.intf_id, msg.onu_id + 1, &serde_json::to_vec(&request).unwrap());
        });
        let mut testee = OmciChannel::new(olt, responder);
        match testee.mib_reset(0, 1) {
            Err(Error::Mismatch(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert!(!OmciResponder::new().deliver(0, 1, b"garbage"));
    }

    #[test]
    fn operations_need_uploaded_mib() {
        let olt = Arc::new(MockOlt::new());
        let mut testee = OmciChannel::new(olt.clone(), OmciResponder::new());
        match testee.create(0, 1, &Entity::new(EntityClass::GalEthernetProfile, 1)) {
            Err(Error::MissingMib { intf_id: 0, onu_id: 1 }) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert!(olt.omci_sent().is_empty());
    }
}
