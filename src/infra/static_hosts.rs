//! Controller for hosts that already exist.
//!
//! Nothing is created or destroyed; the controller only exposes the listed
//! hosts once `create_infra` has run, which keeps the lifecycle contract
//! identical to real providers.

use std::convert::Infallible;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use super::{ControllerFuture, InfraController, InstanceDescriptor};

/// One pre-existing host reachable over SSH.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StaticHost {
    /// Alias used as the instance identifier.
    pub name: String,
    /// Address of the host.
    pub address: IpAddr,
    /// SSH port.
    pub port: u16,
}

/// Controller exposing a fixed list of hosts.
#[derive(Debug)]
pub struct StaticController {
    hosts: Vec<StaticHost>,
    active: AtomicBool,
}

impl StaticController {
    /// Creates a controller for `hosts`.
    #[must_use]
    pub const fn new(hosts: Vec<StaticHost>) -> Self {
        Self {
            hosts,
            active: AtomicBool::new(false),
        }
    }
}

impl InfraController for StaticController {
    type Error = Infallible;

    fn create_infra(&self) -> ControllerFuture<'_, (), Self::Error> {
        Box::pin(async move {
            info!(hosts = self.hosts.len(), "using pre-existing hosts");
            self.active.store(true, Ordering::SeqCst);
            Ok(())
        })
    }

    fn instances(&self) -> ControllerFuture<'_, Vec<InstanceDescriptor>, Self::Error> {
        Box::pin(async move {
            if !self.active.load(Ordering::SeqCst) {
                return Ok(Vec::new());
            }
            Ok(self
                .hosts
                .iter()
                .map(|host| {
                    let mut descriptor =
                        InstanceDescriptor::new(host.name.clone(), host.address, host.port);
                    descriptor
                        .metadata
                        .insert(String::from("provider"), String::from("static"));
                    descriptor
                })
                .collect())
        })
    }

    fn destroy_infra(&self) -> ControllerFuture<'_, (), Self::Error> {
        Box::pin(async move {
            if self.active.swap(false, Ordering::SeqCst) {
                info!("released pre-existing hosts; nothing to delete");
            }
            Ok(())
        })
    }
}
