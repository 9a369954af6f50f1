//! The threads of the agent and the single worker owning all device state.
//!
//! Every OLT has a listener thread reading its indication stream and a
//! connection thread talking to the controller. Both funnel into one queue
//! consumed by `run`, so the devices are only ever touched by the worker.

use device::Device;
use olt::{Indication, Indications, OltDriver};
use onu::omci::OmciResponder;
use openflow;
use openflow::{ControllerLink, Message};

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

const RECEIVE_TIMEOUT: Duration = Duration::from_secs(3);
const INDICATION_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Work for the device with the index
#[derive(Debug)]
pub enum Event {
    Controller { device: usize, message: Message },
    Indication { device: usize, indication: Indication },
}

/// Feeds the events to their devices until every sender is gone
pub fn run(mut devices: Vec<Device>, rx: Receiver<Event>) {
    loop {
        let event = match rx.recv_timeout(RECEIVE_TIMEOUT) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                info!("All event sources are gone");
                return;
            }
        };
        match event {
            Event::Controller { device, message } => match devices.get_mut(device) {
                Some(d) => d.handle_message(&message),
                None => warn!("Message for unknown device {}", device),
            },
            Event::Indication { device, indication } => match devices.get_mut(device) {
                Some(d) => d.handle_indication(indication),
                None => warn!("Indication for unknown device {}", device),
            },
        }
    }
}

/// Routes OMCI responses to their waiting transaction and queues the rest.
/// Returns false once the worker is gone.
pub fn forward_indications(
    device: usize,
    indications: Indications,
    responder: &OmciResponder,
    tx: &Sender<Event>,
) -> bool {
    for indication in indications {
        let indication = match indication {
            Ok(indication) => indication,
            Err(e) => {
                warn!("Indication stream of device {} broken: {}", device, e);
                return true;
            }
        };
        if let Indication::Omci {
            intf_id,
            onu_id,
            ref pkt,
        } = indication
        {
            if responder.deliver(intf_id, onu_id, pkt) {
                continue;
            }
        }
        if tx.send(Event::Indication { device, indication }).is_err() {
            return false;
        }
    }
    true
}

/// Keeps an indication stream of the OLT open
pub fn listen_indications(
    device: usize,
    olt: Arc<dyn OltDriver>,
    responder: OmciResponder,
    tx: Sender<Event>,
) {
    loop {
        match olt.enable_indication() {
            Ok(indications) => {
                debug!("Indications of device {} enabled", device);
                if !forward_indications(device, indications, &responder, &tx) {
                    return;
                }
                warn!("Indication stream of device {} ended", device);
            }
            Err(e) => error!("Enabling indications of device {} failed: {}", device, e),
        }
        thread::sleep(INDICATION_RETRY_DELAY);
    }
}

/// Keeps the controller connection of a device open
pub fn connect_controller(device: usize, address: &str, link: &ControllerLink, tx: Sender<Event>) {
    openflow::run(address, link, |message| {
        tx.send(Event::Controller { device, message }).is_ok()
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use olt;
    use olt::mock::MockOlt;
    use olt::{OperState, SerialNumber};
    use onu::mock::MockOnus;
    use onu::sequence::tests::uploaded_mib;
    use openflow::tests::captured_link;
    use std::io;
    use std::sync::mpsc::channel;
    use subscribers::Subscribers;
    use tempfile;

    fn discovery(intf_id: u32) -> Indication {
        Indication::OnuDiscovery {
            intf_id,
            serial_number: SerialNumber {
                vendor_id: "BRCM".to_string(),
                vendor_specific: vec![0, 0, 0, intf_id as u8],
            },
        }
    }

    #[test]
    fn unawaited_omci_is_queued() {
        let (tx, rx) = channel();
        let indications: Vec<olt::Result<Indication>> = vec![
            Ok(Indication::Omci {
                intf_id: 0,
                onu_id: 1,
                pkt: b"garbage".to_vec(),
            }),
            Ok(discovery(1)),
        ];
        assert!(forward_indications(
            2,
            Box::new(indications.into_iter()),
            &OmciResponder::new(),
            &tx
        ));
        match rx.try_recv().unwrap() {
            Event::Indication {
                device: 2,
                indication: Indication::Omci { onu_id: 1, .. },
            } => {}
            other => panic!("unexpected {:?}", other),
        }
        match rx.try_recv().unwrap() {
            Event::Indication { device: 2, .. } => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn broken_stream_stops_forwarding() {
        let (tx, rx) = channel();
        let indications: Vec<olt::Result<Indication>> = vec![
            Err(olt::Error::Io(io::Error::new(io::ErrorKind::Other, "reset"))),
            Ok(discovery(1)),
        ];
        assert!(forward_indications(0, Box::new(indications.into_iter()), &OmciResponder::new(), &tx));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn gone_worker_ends_listener() {
        let (tx, rx) = channel();
        drop(rx);
        let olt = MockOlt::new();
        olt.push_indication(discovery(1));
        listen_indications(0, Arc::new(olt), OmciResponder::new(), tx);
    }

    #[test]
    fn worker_drives_devices() {
        let dir = tempfile::tempdir().unwrap();
        let olt = Arc::new(MockOlt::new());
        let (link, _) = captured_link();
        let device = Device::new(
            "olt1",
            olt.clone(),
            Box::new(MockOnus::new(uploaded_mib())),
            Subscribers::open(&dir.path().join("s.json"), 1111, 9999).unwrap(),
            link,
        ).unwrap();

        let (tx, rx) = channel();
        tx.send(Event::Indication {
            device: 0,
            indication: discovery(3),
        }).unwrap();
        tx.send(Event::Indication {
            device: 7,
            indication: Indication::Onu {
                intf_id: 3,
                onu_id: 1,
                oper_state: OperState::Up,
                admin_state: OperState::Up,
                fail_reason: 0,
            },
        }).unwrap();
        drop(tx);
        run(vec![device], rx);
        assert_eq!(vec!["activate_onu"], olt.call_names());
    }
}
