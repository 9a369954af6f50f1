/*!
A parser for an INI file with the following structure:

```ini
[Controller]
uri=tcp:192.0.2.1:6653

[Olts]
devices=olt1 olt2

[olt1]
address=192.0.2.20:9191
voip_extension_start=1111
voip_extension_end=9999
subscribers=/var/lib/olt-of-agent/olt1.json

[olt2]
address=192.0.2.21:9191
```
*/

use openflow::messages::OFP_TCP_PORT;

use ini::Ini;
use ini::ini;

use std::convert::From;
use std::default::Default;
use std::error;
use std::fmt;
use std::io;
use std::net::*;
use std::num::ParseIntError;
use std::path::PathBuf;
use std::str::FromStr;

const CONTROLLER_SECTION: &str = "Controller";
const URI_KEY: &str = "uri";

const OLTS_SECTION: &str = "Olts";
const DEVICES_KEY: &str = "devices";

const ADDRESS_KEY: &str = "address";
const EXT_START_KEY: &str = "voip_extension_start";
const EXT_END_KEY: &str = "voip_extension_end";
const SUBSCRIBERS_KEY: &str = "subscribers";

const DEFAULT_EXT_START: u32 = 1111;
const DEFAULT_EXT_END: u32 = 9999;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Ini(ini::Error),
    ParseExtension(String, ParseIntError),
    InvalidExtensionRange(String),
    MissingSection(String),
    MissingEntry(String, &'static str),
    NoDevices,
    InvalidUri,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref e) => write!(f, "{}", e),
            Error::Ini(ref e) => write!(f, "{}", e),
            Error::ParseExtension(ref s, ref e) => {
                write!(f, "Error on trying to parse a VoIP extension of [{}]: {}", s, e)
            }
            Error::InvalidExtensionRange(ref s) => {
                write!(f, "The VoIP extension range of [{}] is empty", s)
            }
            Error::MissingSection(ref s) => write!(f, "The INI file does not have a [{}] section", s),
            Error::MissingEntry(ref s, k) => {
                write!(f, "The INI [{}] section does not have a '{}' key", s, k)
            }
            Error::NoDevices => write!(f, "The INI [{}] section names no OLT", OLTS_SECTION),
            Error::InvalidUri => write!(f, "The OpenFlow controller URI from INI file is invalid"),
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(ioe) => ioe,
            _ => io::Error::new(io::ErrorKind::InvalidData, e),
        }
    }
}
impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl error::Error for Error {
    fn description(&self) -> &str {
        "INI configuration parser error"
    }
}

trait Section {
    type S;

    fn from_ini(conf: &Ini) -> Result<Self::S, Error>;
}

/// Where the agent dials the controller
#[derive(Debug, PartialEq)]
pub struct OfConnection {
    pub socket: SocketAddr,
}

impl Section for OfConnection {
    type S = OfConnection;

    fn from_ini(conf: &Ini) -> Result<Self::S, Error> {
        debug!("Reading [{}] section", CONTROLLER_SECTION);

        match conf.section(Some(CONTROLLER_SECTION.to_owned())) {
            Some(section) => {
                let uri = section
                    .get(URI_KEY)
                    .ok_or_else(|| Error::MissingEntry(CONTROLLER_SECTION.to_owned(), URI_KEY))?;
                OfConnection::from_str(uri)
            }
            _ => Ok(OfConnection::default()),
        }
    }
}

impl FromStr for OfConnection {
    type Err = Error;

    fn from_str(conn: &str) -> Result<OfConnection, Self::Err> {
        let def_port = OFP_TCP_PORT.to_string();
        let mut conn_split: Vec<_> = conn.split(':').collect();
        if conn_split.len() == 2 {
            conn_split.push(&def_port);
        }
        if conn_split.len() == 3 && conn_split[0] == "tcp" {
            let joined = &format!("{}:{}", conn_split[1], conn_split[2]);
            if let Ok(socket) = SocketAddr::from_str(joined) {
                let connection = OfConnection { socket };
                debug!("Got {:?}", connection);
                return Ok(connection);
            }
        }
        Err(Error::InvalidUri)
    }
}

impl Default for OfConnection {
    fn default() -> Self {
        let socket_v4 = SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), OFP_TCP_PORT);
        OfConnection {
            socket: SocketAddr::V4(socket_v4),
        }
    }
}

/// One OLT reached through its adaptor
#[derive(Debug, PartialEq)]
pub struct OltConf {
    pub name: String,
    pub address: String,
    pub voip_extensions: (u32, u32),
    pub subscribers: PathBuf,
}

impl OltConf {
    fn from_section(conf: &Ini, name: &str) -> Result<OltConf, Error> {
        debug!("Reading [{}] section", name);

        let section = conf.section(Some(name.to_owned()))
            .ok_or_else(|| Error::MissingSection(name.to_owned()))?;
        let address = section
            .get(ADDRESS_KEY)
            .ok_or_else(|| Error::MissingEntry(name.to_owned(), ADDRESS_KEY))?;

        let extension = |key: &str, default: u32| match section.get(key) {
            Some(value) => value
                .parse()
                .map_err(|e| Error::ParseExtension(name.to_owned(), e)),
            None => Ok(default),
        };
        let start = extension(EXT_START_KEY, DEFAULT_EXT_START)?;
        let end = extension(EXT_END_KEY, DEFAULT_EXT_END)?;
        if start > end {
            return Err(Error::InvalidExtensionRange(name.to_owned()));
        }

        let subscribers = match section.get(SUBSCRIBERS_KEY) {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(format!("subscribers-{}.json", name)),
        };

        let olt = OltConf {
            name: name.to_owned(),
            address: address.to_owned(),
            voip_extensions: (start, end),
            subscribers,
        };
        debug!("Got {:?}", olt);
        Ok(olt)
    }
}

impl Section for Vec<OltConf> {
    type S = Vec<OltConf>;

    fn from_ini(conf: &Ini) -> Result<Self::S, Error> {
        debug!("Reading [{}] section", OLTS_SECTION);

        let devices = conf.section(Some(OLTS_SECTION.to_owned()))
            .ok_or_else(|| Error::MissingSection(OLTS_SECTION.to_owned()))?
            .get(DEVICES_KEY)
            .ok_or_else(|| Error::MissingEntry(OLTS_SECTION.to_owned(), DEVICES_KEY))?;

        let olts = devices
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|name| !name.is_empty())
            .map(|name| OltConf::from_section(conf, name))
            .collect::<Result<Vec<_>, _>>()?;
        if olts.is_empty() {
            return Err(Error::NoDevices);
        }
        Ok(olts)
    }
}

fn parse(conf: &Ini) -> Result<(OfConnection, Vec<OltConf>), Error> {
    Ok((OfConnection::from_ini(conf)?, Vec::<OltConf>::from_ini(conf)?))
}

pub fn parse_file(path: &str) -> Result<(OfConnection, Vec<OltConf>), Error> {
    info!("Reading INI file {}", path);

    let conf = match Ini::load_from_file(path) {
        Ok(i) => i,
        Err(e) => {
            return Err(Error::Ini(e));
        }
    };
    parse(&conf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(text: &str) -> Ini {
        Ini::load_from_str(text).unwrap()
    }

    #[test]
    fn full_file() {
        let conf = load(
            "[Controller]\nuri=tcp:192.0.2.1:6633\n\
             [Olts]\ndevices=olt1, olt2\n\
             [olt1]\naddress=192.0.2.20:9191\nvoip_extension_start=2000\n\
             voip_extension_end=2999\nsubscribers=/tmp/olt1.json\n\
             [olt2]\naddress=192.0.2.21:9191\n",
        );
        let (conn, olts) = parse(&conf).unwrap();
        assert_eq!("192.0.2.1:6633".parse::<SocketAddr>().unwrap(), conn.socket);
        assert_eq!(
            OltConf {
                name: "olt1".to_string(),
                address: "192.0.2.20:9191".to_string(),
                voip_extensions: (2000, 2999),
                subscribers: PathBuf::from("/tmp/olt1.json"),
            },
            olts[0]
        );
        assert_eq!((1111, 9999), olts[1].voip_extensions);
        assert_eq!(PathBuf::from("subscribers-olt2.json"), olts[1].subscribers);
    }

    #[test]
    fn controller_defaults() {
        let (conn, _) = parse(&load("[Olts]\ndevices=a\n[a]\naddress=x:1\n")).unwrap();
        assert_eq!(OfConnection::default(), conn);
        assert_eq!(6653, conn.socket.port());
        assert_eq!(6653, OfConnection::from_str("tcp:10.0.0.1").unwrap().socket.port());
    }

    #[test]
    fn invalid_uris() {
        for uri in &["tls:10.0.0.1:6653", "tcp:nohost", "10.0.0.1", "tcp:1.2.3.4:5:6"] {
            match OfConnection::from_str(uri) {
                Err(Error::InvalidUri) => {}
                other => panic!("{} gave {:?}", uri, other),
            }
        }
    }

    #[test]
    fn olt_errors() {
        match parse(&load("[Controller]\nuri=tcp:127.0.0.1\n")) {
            Err(Error::MissingSection(ref s)) if s == "Olts" => {}
            other => panic!("unexpected {:?}", other),
        }
        match parse(&load("[Olts]\ndevices=a\n")) {
            Err(Error::MissingSection(ref s)) if s == "a" => {}
            other => panic!("unexpected {:?}", other),
        }
        match parse(&load("[Olts]\ndevices=a\n[a]\nsubscribers=s.json\n")) {
            Err(Error::MissingEntry(ref s, ADDRESS_KEY)) if s == "a" => {}
            other => panic!("unexpected {:?}", other),
        }
        match parse(&load("[Olts]\ndevices= \n")) {
            Err(Error::NoDevices) => {}
            other => panic!("unexpected {:?}", other),
        }
        match parse(&load(
            "[Olts]\ndevices=a\n[a]\naddress=x:1\nvoip_extension_start=900\nvoip_extension_end=100\n",
        )) {
            Err(Error::InvalidExtensionRange(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }
}
