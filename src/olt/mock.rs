//! An in-memory OLT recording every call, with injectable failures.

use olt::*;

use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ActivateOnu(Onu),
    FlowAdd(Flow),
    FlowRemove(Flow),
    PerformGroup(Group),
    DeleteGroup(Group),
    CreateSchedulers(TrafficSchedulers),
    RemoveSchedulers(TrafficSchedulers),
    CreateQueues(TrafficQueues),
    RemoveQueues(TrafficQueues),
}

impl Call {
    pub fn name(&self) -> &'static str {
        match *self {
            Call::ActivateOnu(_) => "activate_onu",
            Call::FlowAdd(_) => "flow_add",
            Call::FlowRemove(_) => "flow_remove",
            Call::PerformGroup(_) => "perform_group_operation",
            Call::DeleteGroup(_) => "delete_group",
            Call::CreateSchedulers(_) => "create_traffic_schedulers",
            Call::RemoveSchedulers(_) => "remove_traffic_schedulers",
            Call::CreateQueues(_) => "create_traffic_queues",
            Call::RemoveQueues(_) => "remove_traffic_queues",
        }
    }
}

type OmciHook = Box<dyn Fn(&OmciMsg) + Send>;

pub struct MockOlt {
    info: DeviceInfo,
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<&'static str>>,
    omci: Mutex<Vec<OmciMsg>>,
    omci_hook: Mutex<Option<OmciHook>>,
    indications: Mutex<Vec<Indication>>,
}

pub fn device_info() -> DeviceInfo {
    DeviceInfo {
        vendor: "EdgeCore".to_string(),
        model: "asgvolt64".to_string(),
        hardware_version: "0.1".to_string(),
        firmware_version: "BAL.3.4".to_string(),
        device_id: "a8:2b:b5:01:02:03".to_string(),
        device_serial_number: "EC1840000192".to_string(),
        pon_ports: 16,
        onu_id_start: 1,
        onu_id_end: 127,
        alloc_id_start: 1024,
        alloc_id_end: 16383,
        gemport_id_start: 1024,
        gemport_id_end: 65535,
        flow_id_start: 1,
        flow_id_end: 16383,
    }
}

impl MockOlt {
    pub fn new() -> MockOlt {
        MockOlt {
            info: device_info(),
            calls: Mutex::new(vec![]),
            failing: Mutex::new(HashSet::new()),
            omci: Mutex::new(vec![]),
            omci_hook: Mutex::new(None),
            indications: Mutex::new(vec![]),
        }
    }

    /// Every following call of the named procedure fails
    pub fn fail(&self, name: &'static str) {
        self.failing.lock().unwrap().insert(name);
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Forgets the recorded calls
    pub fn take_calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().drain(..).collect()
    }

    pub fn call_names(&self) -> Vec<&'static str> {
        self.calls().iter().map(|c| c.name()).collect()
    }

    pub fn omci_sent(&self) -> Vec<OmciMsg> {
        self.omci.lock().unwrap().clone()
    }

    /// Runs `hook` on every OMCI message sent, e.g. to answer it
    pub fn on_omci<F: Fn(&OmciMsg) + Send + 'static>(&self, hook: F) {
        *self.omci_hook.lock().unwrap() = Some(Box::new(hook));
    }

    /// The indications of the next `enable_indication` stream
    pub fn push_indication(&self, indication: Indication) {
        self.indications.lock().unwrap().push(indication);
    }

    fn record(&self, call: Call) -> Result<()> {
        let failing = self.failing.lock().unwrap().contains(call.name());
        self.calls.lock().unwrap().push(call);
        if failing {
            return Err(Error::Rpc {
                code: 13,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

impl OltDriver for MockOlt {
    fn device_info(&self) -> Result<DeviceInfo> {
        Ok(self.info.clone())
    }

    fn activate_onu(&self, onu: &Onu) -> Result<()> {
        self.record(Call::ActivateOnu(onu.clone()))
    }

    fn flow_add(&self, flow: &Flow) -> Result<()> {
        self.record(Call::FlowAdd(flow.clone()))
    }

    fn flow_remove(&self, flow: &Flow) -> Result<()> {
        self.record(Call::FlowRemove(flow.clone()))
    }

    fn perform_group_operation(&self, group: &Group) -> Result<()> {
        self.record(Call::PerformGroup(group.clone()))
    }

    fn delete_group(&self, group: &Group) -> Result<()> {
        self.record(Call::DeleteGroup(group.clone()))
    }

    fn create_traffic_schedulers(&self, scheds: &TrafficSchedulers) -> Result<()> {
        self.record(Call::CreateSchedulers(scheds.clone()))
    }

    fn remove_traffic_schedulers(&self, scheds: &TrafficSchedulers) -> Result<()> {
        self.record(Call::RemoveSchedulers(scheds.clone()))
    }

    fn create_traffic_queues(&self, queues: &TrafficQueues) -> Result<()> {
        self.record(Call::CreateQueues(queues.clone()))
    }

    fn remove_traffic_queues(&self, queues: &TrafficQueues) -> Result<()> {
        self.record(Call::RemoveQueues(queues.clone()))
    }

    fn omci_msg_out(&self, msg: &OmciMsg) -> Result<()> {
        self.omci.lock().unwrap().push(msg.clone());
        if let Some(ref hook) = *self.omci_hook.lock().unwrap() {
            hook(msg);
        }
        Ok(())
    }

    fn enable_indication(&self) -> Result<Indications> {
        let indications: Vec<Result<Indication>> = self.indications
            .lock()
            .unwrap()
            .drain(..)
            .map(Ok)
            .collect();
        Ok(Box::new(indications.into_iter()))
    }
}
