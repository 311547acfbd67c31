//! Infrastructure controller abstraction.
//!
//! A controller owns the lifecycle of every instance described by a
//! resource plan: it creates them, reports how to reach them, and destroys
//! them. Destruction must be safe to call after a partial or failed
//! creation and must release whatever was actually created.

use std::collections::BTreeMap;
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;

use thiserror::Error;

use crate::scaleway::{ScalewayController, ScalewayControllerError};

mod static_hosts;

pub use static_hosts::{StaticController, StaticHost};

/// Boxed future returned by controller operations.
pub type ControllerFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Connection details for one provisioned instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceDescriptor {
    /// Stable identifier, also used as the SSH host alias.
    pub id: String,
    /// Address used to reach the instance.
    pub address: IpAddr,
    /// Port the SSH daemon listens on.
    pub ssh_port: u16,
    /// Availability zone, when the provider has one.
    pub zone: Option<String>,
    /// Provider specific labels such as image or commercial type.
    pub metadata: BTreeMap<String, String>,
}

impl InstanceDescriptor {
    /// Creates a descriptor with no zone and no metadata.
    #[must_use]
    pub fn new(id: impl Into<String>, address: IpAddr, ssh_port: u16) -> Self {
        Self {
            id: id.into(),
            address,
            ssh_port,
            zone: None,
            metadata: BTreeMap::new(),
        }
    }
}

/// Lifecycle operations over the instances of a resource plan.
pub trait InfraController: Send + Sync {
    /// Provider specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Creates every instance in the plan and waits until each is
    /// addressable.
    ///
    /// Instances are recorded as soon as the provider acknowledges them so
    /// [`InfraController::destroy_infra`] can release them even when this
    /// call fails part way.
    fn create_infra(&self) -> ControllerFuture<'_, (), Self::Error>;

    /// Lists the instances created so far with their connection details.
    fn instances(&self) -> ControllerFuture<'_, Vec<InstanceDescriptor>, Self::Error>;

    /// Releases every instance recorded by [`InfraController::create_infra`].
    ///
    /// Safe to call when nothing, or only part of the plan, was created.
    fn destroy_infra(&self) -> ControllerFuture<'_, (), Self::Error>;
}

/// Errors surfaced by [`ProvisionedController`].
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Raised by the Scaleway controller.
    #[error(transparent)]
    Scaleway(#[from] ScalewayControllerError),
}

/// Controller selected from the provider named in a resource plan.
#[derive(Debug)]
pub enum ProvisionedController {
    /// Scaleway Instances.
    Scaleway(ScalewayController),
    /// Pre-existing hosts.
    Static(StaticController),
}

impl InfraController for ProvisionedController {
    type Error = ProvisionError;

    fn create_infra(&self) -> ControllerFuture<'_, (), Self::Error> {
        Box::pin(async move {
            match self {
                Self::Scaleway(controller) => Ok(controller.create_infra().await?),
                Self::Static(controller) => {
                    let Ok(()) = controller.create_infra().await;
                    Ok(())
                }
            }
        })
    }

    fn instances(&self) -> ControllerFuture<'_, Vec<InstanceDescriptor>, Self::Error> {
        Box::pin(async move {
            match self {
                Self::Scaleway(controller) => Ok(controller.instances().await?),
                Self::Static(controller) => {
                    let Ok(instances) = controller.instances().await;
                    Ok(instances)
                }
            }
        })
    }

    fn destroy_infra(&self) -> ControllerFuture<'_, (), Self::Error> {
        Box::pin(async move {
            match self {
                Self::Scaleway(controller) => Ok(controller.destroy_infra().await?),
                Self::Static(controller) => {
                    let Ok(()) = controller.destroy_infra().await;
                    Ok(())
                }
            }
        })
    }
}
