/*!
An OpenFlow 1.3 agent making PON OLTs look like switches.

Every OLT configured in the INI file becomes one datapath connected to the
controller. Flows the controller installs are reconciled into subscriber
services, which are provisioned on the OLT through its adaptor and on the
ONUs through OMCI.

A local ONOS controller listens on port 6653 by default:

```sh
# olt-of-agent -vvv -c /etc/olt-of-agent.ini
```
*/

#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde;
extern crate byteorder;
extern crate ini;
extern crate ipnetwork;
extern crate rand;
extern crate serde_json;
extern crate sha2;
extern crate simple_logger;

#[cfg(unix)]
extern crate libc;
#[cfg(unix)]
extern crate log_panics;
#[cfg(unix)]
extern crate syslog;

#[cfg(test)]
extern crate tempfile;

mod conf;
mod device;
mod dispatch;
mod olt;
mod onu;
mod openflow;
mod provision;
mod reconcile;
mod resources;
mod service;
mod store;
mod subscribers;

use device::Device;
use olt::OltDriver;
use olt::jsonrpc::JsonRpcOlt;
use onu::omci::{OmciChannel, OmciResponder};
use openflow::ControllerLink;
use subscribers::Subscribers;

use std::error;
#[cfg(unix)]
use std::fs::File;
use std::io;
#[cfg(unix)]
use std::io::prelude::*;
use std::process::exit;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

/// Reads command line arguments and calls the corresponding functions.
fn handle_cli_args() -> Result<(), Box<dyn error::Error>> {
    #[cfg(unix)]
    let unix_opts =
        "-p, --pid [file] 'Daemonizes the process and writes a PID file'
        -s, --syslog      'Logs via syslog'
        ";
    #[cfg(not(unix))]
    let unix_opts = "";

    let usage = &format!(
        "{}-v...          'Repeat to set the level of verbosity'
        -c, --conf <ini>  'The INI configuration file.'"
    , unix_opts);
    let matches = app_from_crate!().args_from_usage(usage).get_matches();

    let log_lvl = match matches.occurrences_of("v") {
        0 => log::Level::Error,
        1 => log::Level::Warn,
        2 => log::Level::Info,
        3 => log::Level::Debug,
        _ => log::Level::Trace,
    };

    #[cfg(unix)]
    let use_syslog = matches.is_present("syslog");
    #[cfg(not(unix))]
    let use_syslog = false;

    if use_syslog {
        #[cfg(unix)]
        {
            syslog::init(
                syslog::Facility::LOG_USER,
                log_lvl.to_level_filter(),
                Some(crate_name!()),
            ).map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
            log_panics::init();
        }
    } else {
        simple_logger::init_with_level(log_lvl)?;
    }

    let conf_path = matches.value_of("conf").unwrap_or_default();
    let (conn, olts) = conf::parse_file(conf_path)?;

    #[cfg(unix)] {
        if matches.is_present("pid") {
            let pid = unsafe { libc::fork() };
            if pid < 0 {
                return Err(io::Error::last_os_error().into());
            } else if pid > 0 {
                // exit the parent process
                exit(0);
            }
            let pid_path = matches.value_of("pid").unwrap_or(concat!(crate_name!(), ".pid"));
            let mut file = File::create(pid_path)?;
            write!(file, "{}", unsafe { libc::getpid() })?;
        }
    }

    let controller = conn.socket.to_string();
    let (tx, rx) = mpsc::channel();
    let mut devices = vec![];

    for (index, olt_conf) in olts.iter().enumerate() {
        let olt: Arc<dyn OltDriver> = Arc::new(JsonRpcOlt::new(&olt_conf.address));
        let responder = OmciResponder::new();
        let onus = OmciChannel::new(olt.clone(), responder.clone());
        let subscribers = Subscribers::open(
            &olt_conf.subscribers,
            olt_conf.voip_extensions.0,
            olt_conf.voip_extensions.1,
        )?;
        let link = ControllerLink::new();
        devices.push(Device::new(
            &olt_conf.name,
            olt.clone(),
            Box::new(onus),
            subscribers,
            link.clone(),
        )?);

        let indication_tx = tx.clone();
        thread::Builder::new()
            .name(format!("{}-indications", olt_conf.name))
            .spawn(move || dispatch::listen_indications(index, olt, responder, indication_tx))?;

        let controller = controller.clone();
        let controller_tx = tx.clone();
        thread::Builder::new()
            .name(format!("{}-controller", olt_conf.name))
            .spawn(move || dispatch::connect_controller(index, &controller, &link, controller_tx))?;
        info!("{} at {} started", olt_conf.name, olt_conf.address);
    }
    drop(tx);

    dispatch::run(devices, rx);
    Ok(())
}

/// Entry function with top level error handling.
fn main() {
    if let Err(e) = handle_cli_args() {
        error!("{}", e);
        exit(1);
    }
}
