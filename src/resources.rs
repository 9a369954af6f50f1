/*!
Identifier pools and the mapping between OpenFlow cookies and the flow ids
handed to the OLT.
*/

use olt::DeviceInfo;

use sha2::{Digest, Sha256};

use byteorder::{ByteOrder, NetworkEndian};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// First GEM port of the multicast range
pub const MULTICAST_GEMPORT_START: u32 = 4094;

const POTS_BIT: u32 = 0x0800_0000;

/// An ONU UNI (Ethernet or POTS) as encoded into an OpenFlow port number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OnuPort {
    pub intf_id: u32,
    pub onu_id: u32,
    pub uni_id: u32,
    pub pots: bool,
}

impl OnuPort {
    pub fn new(intf_id: u32, onu_id: u32, uni_id: u32, pots: bool) -> OnuPort {
        OnuPort {
            intf_id,
            onu_id,
            uni_id,
            pots,
        }
    }

    pub fn from_port_no(port_no: u32) -> OnuPort {
        OnuPort {
            intf_id: (port_no >> 28) & 0x0f,
            onu_id: (port_no >> 16) & 0x07ff,
            uni_id: port_no & 0xffff,
            pots: port_no & POTS_BIT != 0,
        }
    }

    pub fn port_no(&self) -> u32 {
        let port_no = ((self.intf_id << 28) & 0xf000_0000) | ((self.onu_id << 16) & 0x07ff_0000)
            | (self.uni_id & 0xffff);
        if self.pots {
            port_no | POTS_BIT
        }
        else {
            port_no
        }
    }
}

impl fmt::Display for OnuPort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "interface {} ONU {} UNI {}{}",
            self.intf_id,
            self.onu_id,
            self.uni_id,
            if self.pots { " (POTS)" } else { "" }
        )
    }
}

/// Hands out the lowest free id of a half-open range
#[derive(Debug, Clone)]
pub struct IdPool {
    start: u32,
    end: u32,
    held: BTreeSet<u32>,
}

impl IdPool {
    pub fn new(start: u32, end: u32) -> IdPool {
        IdPool {
            start,
            end,
            held: BTreeSet::new(),
        }
    }

    pub fn alloc(&mut self) -> Option<u32> {
        let id = (self.start..self.end).find(|id| !self.held.contains(id))?;
        self.held.insert(id);
        Some(id)
    }

    /// Returns the id to the pool, false if it was not held
    pub fn free(&mut self, id: u32) -> bool {
        self.held.remove(&id)
    }
}

#[cfg(test)]
impl IdPool {
    pub fn is_held(&self, id: u32) -> bool {
        self.held.contains(&id)
    }
}

/// GEM ports per PON interface. A unicast GEM port is also used as the
/// allocation id of its service.
#[derive(Debug)]
pub struct GemPorts {
    start: u32,
    end: u32,
    unicast: HashMap<u32, IdPool>,
    multicast: IdPool,
}

impl GemPorts {
    pub fn new(info: &DeviceInfo) -> GemPorts {
        GemPorts::with_ranges(
            info.gemport_id_start,
            info.alloc_id_end.min(MULTICAST_GEMPORT_START),
            info.gemport_id_end,
        )
    }

    /// Unicast ids come from `[start, end)`, multicast ids from
    /// `[MULTICAST_GEMPORT_START, multicast_end)`.
    pub fn with_ranges(start: u32, end: u32, multicast_end: u32) -> GemPorts {
        GemPorts {
            start,
            end,
            unicast: HashMap::new(),
            multicast: IdPool::new(MULTICAST_GEMPORT_START, multicast_end),
        }
    }

    pub fn alloc_unicast(&mut self, intf_id: u32) -> Option<u32> {
        let (start, end) = (self.start, self.end);
        self.unicast
            .entry(intf_id)
            .or_insert_with(|| IdPool::new(start, end))
            .alloc()
    }

    pub fn free_unicast(&mut self, intf_id: u32, gemport_id: u32) {
        let freed = self.unicast
            .get_mut(&intf_id)
            .map_or(false, |pool| pool.free(gemport_id));
        if !freed {
            warn!("GEM port {} of interface {} was not allocated", gemport_id, intf_id);
        }
    }

    pub fn alloc_multicast(&mut self) -> Option<u32> {
        self.multicast.alloc()
    }

    pub fn free_multicast(&mut self, gemport_id: u32) {
        if !self.multicast.free(gemport_id) {
            warn!("Multicast GEM port {} was not allocated", gemport_id);
        }
    }
}

#[cfg(test)]
impl GemPorts {
    pub fn is_held(&self, intf_id: u32, gemport_id: u32) -> bool {
        self.unicast
            .get(&intf_id)
            .map_or(false, |pool| pool.is_held(gemport_id))
    }
}

/// The flow id of a service: the first 4 bytes of the SHA-256 digest over
/// the big-endian contributing cookies, outermost table first.
pub fn flow_hash(cookies: &[u64]) -> u32 {
    let mut bytes = vec![0; cookies.len() * 8];
    for (i, cookie) in cookies.iter().enumerate() {
        NetworkEndian::write_u64(&mut bytes[i * 8..(i + 1) * 8], *cookie);
    }
    let digest = Sha256::digest(&bytes);
    NetworkEndian::read_u32(&digest[0..4])
}

/// Flow id to contributing cookies of every installed service direction
#[derive(Debug, Default)]
pub struct FlowHashes {
    flows: BTreeMap<u32, Vec<u64>>,
}

impl FlowHashes {
    pub fn new() -> FlowHashes {
        FlowHashes::default()
    }

    pub fn insert(&mut self, hash: u32, cookies: Vec<u64>) {
        if let Some(old) = self.flows.insert(hash, cookies) {
            debug!("Flow hash {} replaced cookies {:?}", hash, old);
        }
    }

    pub fn cookies(&self, hash: u32) -> Option<&[u64]> {
        self.flows.get(&hash).map(|c| c.as_slice())
    }

    pub fn remove(&mut self, hash: u32) -> Option<Vec<u64>> {
        self.flows.remove(&hash)
    }

    /// The flow ids a cookie contributes to
    pub fn hashes_of(&self, cookie: u64) -> Vec<u32> {
        self.flows
            .iter()
            .filter(|&(_, cookies)| cookies.contains(&cookie))
            .map(|(hash, _)| *hash)
            .collect()
    }
}
