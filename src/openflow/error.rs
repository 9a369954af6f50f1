use openflow::messages::*;
use std::error;
use std::fmt;
use std::io;
use std::result;

/// Failures while serving one controller message
#[derive(Debug)]
pub enum Error {
    /// The controller connection broke
    Io(io::Error),
    /// The message is answered with a Bad Request error carrying its body
    BadRequest(OfpBadRequestCode, Vec<u8>),
    /// The controller does not speak OpenFlow 1.3
    HelloFailed,
}

impl error::Error for Error {
    fn description(&self) -> &str {
        "OpenFlow message handling error"
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref e) => write!(f, "{}", e),
            Error::BadRequest(code, ref body) => {
                write!(f, "Bad request {:?} with a {} byte body", code, body.len())
            }
            Error::HelloFailed => write!(f, "No common OpenFlow version"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = result::Result<T, Error>;
