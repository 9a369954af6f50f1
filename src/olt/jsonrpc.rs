/*!
An `OltDriver` speaking newline-delimited JSON over TCP to an OLT adaptor.

Every call is one request line `{"id":..,"method":..,"params":..}` answered
by one line carrying either `result` or `error` with the remote status code
and detail. The indication stream uses its own connection: after the
`enable_indication` request the adaptor writes one indication per line.
*/

use olt::*;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json;
use serde_json::Value;

use std::io;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct Request<'a, P: 'a> {
    id: usize,
    method: &'a str,
    params: &'a P,
}

#[derive(Debug, Deserialize)]
struct RemoteError {
    code: i32,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Response {
    id: usize,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RemoteError>,
}

struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Connection {
    fn open(address: &str, timeout: Option<Duration>) -> io::Result<Connection> {
        let writer = TcpStream::connect(address)?;
        writer.set_read_timeout(timeout)?;
        writer.set_nodelay(true)?;
        Ok(Connection {
            reader: BufReader::new(writer.try_clone()?),
            writer,
        })
    }

    fn send<P: Serialize>(&mut self, id: usize, method: &str, params: &P) -> Result<()> {
        let mut line = serde_json::to_vec(&Request { id, method, params })?;
        line.push(b'\n');
        self.writer.write_all(&line)?;
        Ok(())
    }

    fn receive<T: DeserializeOwned>(&mut self) -> Result<T> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "OLT adaptor closed the connection",
            )));
        }
        Ok(serde_json::from_str(&line)?)
    }
}

pub struct JsonRpcOlt {
    address: String,
    connection: Mutex<Option<Connection>>,
    next_id: AtomicUsize,
}

impl JsonRpcOlt {
    /// Connects lazily on the first call
    pub fn new(address: &str) -> JsonRpcOlt {
        JsonRpcOlt {
            address: address.to_string(),
            connection: Mutex::new(None),
            next_id: AtomicUsize::new(1),
        }
    }

    fn call<P: Serialize, R: DeserializeOwned>(&self, method: &str, params: &P) -> Result<R> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut connection = self.connection.lock().unwrap_or_else(|e| e.into_inner());
        let mut c = match connection.take() {
            Some(c) => c,
            None => {
                debug!("Connecting to the OLT adaptor at {}", self.address);
                Connection::open(&self.address, Some(CALL_TIMEOUT))?
            }
        };
        let result = exchange(&mut c, id, method, params);
        match result {
            // the stream may hold half a message
            Err(Error::Io(_)) => {}
            _ => *connection = Some(c),
        }
        let response = result?;
        if let Some(e) = response.error {
            return Err(Error::Rpc {
                code: e.code,
                message: e.message,
            });
        }
        Ok(serde_json::from_value(response.result)?)
    }
}

fn exchange<P: Serialize>(c: &mut Connection, id: usize, method: &str, params: &P) -> Result<Response> {
    trace!("OLT call {} {}", id, method);
    c.send(id, method, params)?;
    loop {
        let response: Response = c.receive()?;
        if response.id == id {
            return Ok(response);
        }
        warn!("Dropping OLT response {} while waiting for {}", response.id, id);
    }
}

impl OltDriver for JsonRpcOlt {
    fn device_info(&self) -> Result<DeviceInfo> {
        self.call("device_info", &Value::Null)
    }

    fn activate_onu(&self, onu: &Onu) -> Result<()> {
        self.call("activate_onu", onu)
    }

    fn flow_add(&self, flow: &Flow) -> Result<()> {
        self.call("flow_add", flow)
    }

    fn flow_remove(&self, flow: &Flow) -> Result<()> {
        self.call("flow_remove", flow)
    }

    fn perform_group_operation(&self, group: &Group) -> Result<()> {
        self.call("perform_group_operation", group)
    }

    fn delete_group(&self, group: &Group) -> Result<()> {
        self.call("delete_group", group)
    }

    fn create_traffic_schedulers(&self, scheds: &TrafficSchedulers) -> Result<()> {
        self.call("create_traffic_schedulers", scheds)
    }

    fn remove_traffic_schedulers(&self, scheds: &TrafficSchedulers) -> Result<()> {
        self.call("remove_traffic_schedulers", scheds)
    }

    fn create_traffic_queues(&self, queues: &TrafficQueues) -> Result<()> {
        self.call("create_traffic_queues", queues)
    }

    fn remove_traffic_queues(&self, queues: &TrafficQueues) -> Result<()> {
        self.call("remove_traffic_queues", queues)
    }

    fn omci_msg_out(&self, msg: &OmciMsg) -> Result<()> {
        self.call("omci_msg_out", msg)
    }

    fn enable_indication(&self) -> Result<Indications> {
        let mut c = Connection::open(&self.address, None)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        c.send(id, "enable_indication", &Value::Null)?;
        let lines = c.reader.lines().map(|line| -> Result<Indication> {
            let line = line?;
            Ok(serde_json::from_str(&line)?)
        });
        Ok(Box::new(lines))
    }
}
