//! Scaleway Instances controller.
//!
//! Servers are created stopped, receive cloud-init user-data authorising the
//! run's public key, and are then powered on. Every server is recorded as
//! soon as the API acknowledges it so teardown can release it even when a
//! later step fails.

mod error;
mod lifecycle;
mod types;
mod user_data;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use scaleway_rs::ScalewayApi;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ScalewayCredentials;
use crate::infra::{ControllerFuture, InfraController, InstanceDescriptor};
use crate::resources::{DEFAULT_SSH_PORT, InstanceSpec};
use types::{ServerRecord, Zone};

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const WAIT_TIMEOUT: Duration = Duration::from_secs(300);

pub use error::ScalewayControllerError;

/// Controller that provisions servers through the Scaleway Instances API.
pub struct ScalewayController {
    api: ScalewayApi,
    credentials: ScalewayCredentials,
    specs: Vec<InstanceSpec>,
    user_data: String,
    run_id: String,
    poll_interval: Duration,
    wait_timeout: Duration,
    servers: Mutex<Vec<ServerRecord>>,
}

impl fmt::Debug for ScalewayController {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ScalewayController")
            .field("project_id", &self.credentials.project_id)
            .field("specs", &self.specs)
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

impl ScalewayController {
    /// Creates a controller for `specs` that injects `user_data` into every
    /// new server.
    #[must_use]
    pub fn new(
        credentials: ScalewayCredentials,
        specs: Vec<InstanceSpec>,
        user_data: String,
    ) -> Self {
        Self {
            api: ScalewayApi::new(&credentials.secret_key),
            credentials,
            specs,
            user_data,
            run_id: Uuid::new_v4().simple().to_string(),
            poll_interval: POLL_INTERVAL,
            wait_timeout: WAIT_TIMEOUT,
            servers: Mutex::new(Vec::new()),
        }
    }

    async fn create_spec(&self, spec: &InstanceSpec) -> Result<(), ScalewayControllerError> {
        let image_id = self.resolve_image_id(spec).await?;
        let zone = Zone::from(spec.zone.as_str());
        for _ in 0..spec.count {
            let snapshot = self.create_instance_stopped(spec, &image_id).await?;
            info!(
                instance = snapshot.id.as_str(),
                zone = zone.as_str(),
                image = %spec.image,
                "created server"
            );
            self.servers.lock().await.push(ServerRecord {
                id: snapshot.id.clone(),
                zone: zone.clone(),
                image: spec.image.clone(),
                instance_type: spec.instance_type.clone(),
                public_ip: None,
            });

            self.upload_user_data(&zone, &snapshot.id).await?;
            self.power_on_if_needed(&zone, &snapshot).await?;
        }
        Ok(())
    }

    async fn await_addresses(&self) -> Result<(), ScalewayControllerError> {
        let pending: Vec<_> = self
            .servers
            .lock()
            .await
            .iter()
            .filter(|record| record.public_ip.is_none())
            .map(|record| (record.zone.clone(), record.id.clone()))
            .collect();

        for (zone, id) in pending {
            let address = self.wait_for_public_ip(&zone, &id).await?;
            info!(instance = id.as_str(), %address, "server is addressable");
            if let Some(record) = self
                .servers
                .lock()
                .await
                .iter_mut()
                .find(|record| record.id == id)
            {
                record.public_ip = Some(address);
            }
        }
        Ok(())
    }
}

fn descriptor(record: &ServerRecord) -> Option<InstanceDescriptor> {
    let address = record.public_ip?;
    let metadata = BTreeMap::from([
        (String::from("provider"), String::from("scaleway")),
        (String::from("image"), record.image.clone()),
        (String::from("instance_type"), record.instance_type.clone()),
    ]);
    Some(InstanceDescriptor {
        id: record.id.as_str().to_owned(),
        address,
        ssh_port: DEFAULT_SSH_PORT,
        zone: Some(record.zone.as_str().to_owned()),
        metadata,
    })
}

impl InfraController for ScalewayController {
    type Error = ScalewayControllerError;

    fn create_infra(&self) -> ControllerFuture<'_, (), Self::Error> {
        Box::pin(async move {
            for spec in &self.specs {
                self.create_spec(spec).await?;
            }
            self.await_addresses().await
        })
    }

    fn instances(&self) -> ControllerFuture<'_, Vec<InstanceDescriptor>, Self::Error> {
        Box::pin(async move {
            Ok(self
                .servers
                .lock()
                .await
                .iter()
                .filter_map(descriptor)
                .collect())
        })
    }

    fn destroy_infra(&self) -> ControllerFuture<'_, (), Self::Error> {
        Box::pin(async move {
            let records = std::mem::take(&mut *self.servers.lock().await);
            let mut remaining = Vec::new();
            let mut failures = Vec::new();

            for record in records {
                match self.release_server(&record.zone, &record.id).await {
                    Ok(()) => info!(instance = record.id.as_str(), "released server"),
                    Err(err) => {
                        warn!(instance = record.id.as_str(), error = %err, "failed to release server");
                        failures.push(format!("{}: {err}", record.id.as_str()));
                        remaining.push(record);
                    }
                }
            }

            if failures.is_empty() {
                return Ok(());
            }
            let count = remaining.len();
            self.servers.lock().await.extend(remaining);
            Err(ScalewayControllerError::Teardown {
                count,
                details: failures.join("; "),
            })
        })
    }
}
