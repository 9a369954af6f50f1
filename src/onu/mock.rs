//! ONUs kept in memory. Operations are mirrored into the MIB copies; one
//! entity class can be made to fail.

use onu::*;
use onu::sequence;

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct MockOnus {
    mibs: HashMap<(u32, u32), OnuMib>,
    /// Template for ONUs brought up by `initialize`
    pub uploaded: OnuMib,
    pub failing: Option<EntityClass>,
}

impl MockOnus {
    pub fn new(uploaded: OnuMib) -> MockOnus {
        MockOnus {
            uploaded,
            ..MockOnus::default()
        }
    }

    pub fn add_onu(&mut self, intf_id: u32, onu_id: u32) {
        self.mibs.insert((intf_id, onu_id), self.uploaded.clone());
    }

    fn apply(&mut self, intf_id: u32, onu_id: u32, op: EntityOp) -> Result<()> {
        let class = match op {
            EntityOp::Create(ref e) | EntityOp::Set(ref e) => e.class,
            EntityOp::Delete(class, _) => class,
        };
        if self.failing == Some(class) {
            return Err(Error::Rejected {
                op: op.to_string(),
                success_code: 3,
            });
        }
        match self.mibs.get_mut(&(intf_id, onu_id)) {
            Some(mib) => {
                mib.apply(&op);
                Ok(())
            }
            None => Err(Error::MissingMib { intf_id, onu_id }),
        }
    }
}

impl OnuManagement for MockOnus {
    fn create(&mut self, intf_id: u32, onu_id: u32, entity: &Entity) -> Result<()> {
        self.apply(intf_id, onu_id, EntityOp::Create(entity.clone()))
    }

    fn set(&mut self, intf_id: u32, onu_id: u32, entity: &Entity) -> Result<()> {
        self.apply(intf_id, onu_id, EntityOp::Set(entity.clone()))
    }

    fn delete(&mut self, intf_id: u32, onu_id: u32, class: EntityClass, instance: u16) -> Result<()> {
        self.apply(intf_id, onu_id, EntityOp::Delete(class, instance))
    }

    fn mib(&self, intf_id: u32, onu_id: u32) -> Option<&OnuMib> {
        self.mibs.get(&(intf_id, onu_id))
    }

    fn initialize(&mut self, intf_id: u32, onu_id: u32) -> Result<()> {
        self.add_onu(intf_id, onu_id);
        let ops = sequence::init(&self.uploaded)?;
        self.run(intf_id, onu_id, &ops)
    }

    fn forget(&mut self, intf_id: u32, onu_id: u32) {
        self.mibs.remove(&(intf_id, onu_id));
    }
}
