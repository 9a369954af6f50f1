/*!
The persistent identity of the subscribers of an OLT: which ONU id an ONU
serial number got on its PON interface, and the VoIP account of each of its
POTS ports. The file is rewritten on every assignment so that ONU ids and
extensions survive restarts.
*/

use serde_json;

use rand::{thread_rng, Rng};

use std::collections::{BTreeMap, BTreeSet};
use std::error;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::result;

const MAX_ONU_ID: u32 = 0x07ff;
const PASSWORD_LEN: usize = 4;
const PASSWORD_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Json(serde_json::Error),
    NoFreeOnuId(u32),
    NoFreeExtension,
}

impl error::Error for Error {
    fn description(&self) -> &str {
        "Subscriber file error"
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref e) => write!(f, "{}", e),
            Error::Json(ref e) => write!(f, "Malformed subscriber file: {}", e),
            Error::NoFreeOnuId(intf_id) => write!(f, "No free ONU id on interface {}", intf_id),
            Error::NoFreeExtension => write!(f, "No free VoIP extension"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

pub type Result<T> = result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoipAccount {
    pub extension: u32,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    pub intf_id: u32,
    pub onu_id: u32,
    /// Per POTS port
    #[serde(default)]
    pub voip: BTreeMap<u32, VoipAccount>,
}

#[derive(Debug)]
pub struct Subscribers {
    path: PathBuf,
    extension_start: u32,
    extension_end: u32,
    onus: BTreeMap<String, Subscriber>,
}

impl Subscribers {
    /// Loads the file if it exists. Extensions are taken from the
    /// inclusive range `[extension_start, extension_end]`.
    pub fn open(path: &Path, extension_start: u32, extension_end: u32) -> Result<Subscribers> {
        let onus = if path.exists() {
            serde_json::from_reader(File::open(path)?)?
        }
        else {
            BTreeMap::new()
        };
        Ok(Subscribers {
            path: path.to_path_buf(),
            extension_start,
            extension_end,
            onus,
        })
    }

    fn save(&self) -> Result<()> {
        let file = File::create(&self.path)?;
        serde_json::to_writer_pretty(file, &self.onus)?;
        Ok(())
    }

    /// The ONU id of a serial number, assigning the lowest free one of the
    /// interface to a new ONU. The assignment is undone if it can not be
    /// written to the file.
    pub fn onu_id(&mut self, intf_id: u32, serial_number: &str) -> Result<u32> {
        if let Some(subscriber) = self.onus.get(serial_number) {
            return Ok(subscriber.onu_id);
        }
        let used: BTreeSet<u32> = self.onus
            .values()
            .filter(|s| s.intf_id == intf_id)
            .map(|s| s.onu_id)
            .collect();
        let onu_id = (1..MAX_ONU_ID + 1)
            .find(|id| !used.contains(id))
            .ok_or(Error::NoFreeOnuId(intf_id))?;

        self.onus.insert(
            serial_number.to_string(),
            Subscriber {
                intf_id,
                onu_id,
                voip: BTreeMap::new(),
            },
        );
        if let Err(e) = self.save() {
            self.onus.remove(serial_number);
            return Err(e);
        }
        info!(
            "Assigned ONU id {} on interface {} to {}",
            onu_id, intf_id, serial_number
        );
        Ok(onu_id)
    }

    pub fn serial_number(&self, intf_id: u32, onu_id: u32) -> Option<&str> {
        self.onus
            .iter()
            .find(|&(_, s)| s.intf_id == intf_id && s.onu_id == onu_id)
            .map(|(sn, _)| sn.as_str())
    }

    pub fn contains(&self, intf_id: u32, onu_id: u32) -> bool {
        self.serial_number(intf_id, onu_id).is_some()
    }

    /// The VoIP account of a POTS port. A new one gets the lowest unused
    /// extension and a random password, and never changes afterwards.
    pub fn voip_account(&mut self, intf_id: u32, onu_id: u32, pots_id: u32) -> Result<VoipAccount> {
        let serial_number = match self.serial_number(intf_id, onu_id) {
            Some(sn) => sn.to_string(),
            None => {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("ONU {} of interface {} is not registered", onu_id, intf_id),
                )))
            }
        };
        if let Some(account) = self.onus[&serial_number].voip.get(&pots_id) {
            return Ok(account.clone());
        }

        let used: BTreeSet<u32> = self.onus
            .values()
            .flat_map(|s| s.voip.values().map(|a| a.extension))
            .collect();
        let extension = (self.extension_start..self.extension_end + 1)
            .find(|e| !used.contains(e))
            .ok_or(Error::NoFreeExtension)?;
        let mut rng = thread_rng();
        let password: String = (0..PASSWORD_LEN)
            .map(|_| PASSWORD_CHARS[rng.gen_range(0, PASSWORD_CHARS.len())] as char)
            .collect();
        let account = VoipAccount {
            extension,
            password,
        };

        if let Some(subscriber) = self.onus.get_mut(&serial_number) {
            subscriber.voip.insert(pots_id, account.clone());
        }
        if let Err(e) = self.save() {
            if let Some(subscriber) = self.onus.get_mut(&serial_number) {
                subscriber.voip.remove(&pots_id);
            }
            return Err(e);
        }
        info!(
            "Assigned VoIP extension {} to POTS {} of {}",
            extension, pots_id, serial_number
        );
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile;

    #[test]
    fn onu_ids_are_lowest_free_per_interface() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subscribers.json");
        let mut testee = Subscribers::open(&path, 1111, 9999).unwrap();
        assert_eq!(1, testee.onu_id(0, "ALCL00000001").unwrap());
        assert_eq!(2, testee.onu_id(0, "ALCL00000002").unwrap());
        assert_eq!(1, testee.onu_id(1, "ALCL00000003").unwrap());
        assert_eq!(1, testee.onu_id(0, "ALCL00000001").unwrap());
        assert_eq!(Some("ALCL00000002"), testee.serial_number(0, 2));
        assert!(!testee.contains(1, 2));

        let reopened = Subscribers::open(&path, 1111, 9999).unwrap();
        assert_eq!(Some("ALCL00000003"), reopened.serial_number(1, 1));
    }

    #[test]
    fn voip_accounts_are_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subscribers.json");
        let mut testee = Subscribers::open(&path, 1111, 1112).unwrap();
        testee.onu_id(0, "ALCL00000001").unwrap();
        testee.onu_id(0, "ALCL00000002").unwrap();

        let first = testee.voip_account(0, 1, 1).unwrap();
        assert_eq!(1111, first.extension);
        assert_eq!(4, first.password.len());
        assert!(first
            .password
            .bytes()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_eq!(first, testee.voip_account(0, 1, 1).unwrap());
        assert_eq!(1112, testee.voip_account(0, 2, 1).unwrap().extension);
        match testee.voip_account(0, 1, 2) {
            Err(Error::NoFreeExtension) => {}
            other => panic!("unexpected {:?}", other),
        }

        let mut reopened = Subscribers::open(&path, 1111, 1112).unwrap();
        assert_eq!(first, reopened.voip_account(0, 1, 1).unwrap());
        assert!(reopened.voip_account(3, 3, 1).is_err());
    }

    #[test]
    fn failed_write_aborts_assignment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("subscribers.json");
        let mut testee = Subscribers::open(&path, 1111, 9999).unwrap();
        assert!(testee.onu_id(0, "ALCL00000001").is_err());
        assert!(!testee.contains(0, 1));
    }
}
