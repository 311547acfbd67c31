//! Readiness and teardown wait helpers for the Scaleway controller.

use std::future::Future;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, info};

use crate::scaleway::types::{InstanceId, Zone};

use super::super::{ScalewayController, ScalewayControllerError};
use super::InstanceSnapshot;

/// Polls `fetch` until the server is running with a public address.
///
/// A server that reaches `running` but never reports an address yields
/// [`ScalewayControllerError::MissingPublicIp`]; one that never runs yields
/// [`ScalewayControllerError::Timeout`].
pub(in crate::scaleway) async fn poll_for_public_ip<Fetch, Fut>(
    instance_id: &str,
    poll_interval: Duration,
    wait_timeout: Duration,
    mut fetch: Fetch,
) -> Result<IpAddr, ScalewayControllerError>
where
    Fetch: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<InstanceSnapshot>, ScalewayControllerError>>,
{
    let deadline = Instant::now() + wait_timeout;
    let mut saw_running = false;

    while Instant::now() <= deadline {
        let Some(server) = fetch().await? else {
            sleep(poll_interval).await;
            continue;
        };

        if !server.state.is_running() {
            sleep(poll_interval).await;
            continue;
        }

        saw_running = true;

        if let Some(address) = server
            .public_ip
            .as_ref()
            .and_then(|ip| IpAddr::from_str(ip).ok())
        {
            return Ok(address);
        }

        sleep(poll_interval).await;
    }

    if saw_running {
        return Err(ScalewayControllerError::MissingPublicIp {
            instance_id: instance_id.to_owned(),
        });
    }

    Err(ScalewayControllerError::Timeout {
        action: String::from("wait_for_public_ip"),
        instance_id: instance_id.to_owned(),
    })
}

/// Polls `fetch` until the server leaves `starting`/`stopping`.
///
/// Returns `None` once the server is no longer listed.
pub(in crate::scaleway) async fn poll_until_settled<Fetch, Fut>(
    instance_id: &str,
    poll_interval: Duration,
    wait_timeout: Duration,
    mut fetch: Fetch,
) -> Result<Option<InstanceSnapshot>, ScalewayControllerError>
where
    Fetch: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<InstanceSnapshot>, ScalewayControllerError>>,
{
    let deadline = Instant::now() + wait_timeout;
    while Instant::now() <= deadline {
        match fetch().await? {
            Some(server) if server.state.is_transitional() => {
                debug!(
                    instance = instance_id,
                    state = server.state.as_str(),
                    "waiting for stable state"
                );
                sleep(poll_interval).await;
            }
            settled => return Ok(settled),
        }
    }

    Err(ScalewayControllerError::Timeout {
        action: String::from("wait_for_stable_state"),
        instance_id: instance_id.to_owned(),
    })
}

/// Next action needed to release a settled server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(in crate::scaleway) enum ReleaseStep {
    /// `terminate` removes the server with its volumes and IPs.
    Terminate,
    /// Delete the stopped server, then each of its volumes.
    Delete {
        /// Volumes left behind by deleting the server.
        volume_ids: Vec<String>,
    },
    /// Power off first; the server is re-examined once stopped.
    PowerOff,
    /// No action can release the server from this state.
    Blocked,
}

impl ReleaseStep {
    pub(in crate::scaleway) fn for_snapshot(snapshot: &InstanceSnapshot) -> Self {
        if snapshot.allows("terminate") {
            Self::Terminate
        } else if snapshot.state.is_stopped() {
            Self::Delete {
                volume_ids: snapshot.volume_ids.clone(),
            }
        } else if snapshot.allows("poweroff") {
            Self::PowerOff
        } else {
            Self::Blocked
        }
    }
}

impl ScalewayController {
    pub(in crate::scaleway) async fn fetch_instance(
        &self,
        zone: &Zone,
        id: &InstanceId,
    ) -> Result<Option<InstanceSnapshot>, ScalewayControllerError> {
        let mut servers = self
            .api
            .list_instances(zone.as_str())
            .servers(id.as_str())
            .per_page(1)
            .run_async()
            .await?;

        Ok(servers.pop().map(InstanceSnapshot::from))
    }

    pub(in crate::scaleway) async fn wait_for_public_ip(
        &self,
        zone: &Zone,
        id: &InstanceId,
    ) -> Result<IpAddr, ScalewayControllerError> {
        poll_for_public_ip(id.as_str(), self.poll_interval, self.wait_timeout, move || {
            self.fetch_instance(zone, id)
        })
        .await
    }

    async fn wait_until_settled(
        &self,
        zone: &Zone,
        id: &InstanceId,
    ) -> Result<Option<InstanceSnapshot>, ScalewayControllerError> {
        poll_until_settled(id.as_str(), self.poll_interval, self.wait_timeout, move || {
            self.fetch_instance(zone, id)
        })
        .await
    }

    pub(in crate::scaleway) async fn wait_until_gone(
        &self,
        zone: &Zone,
        id: &InstanceId,
    ) -> Result<(), ScalewayControllerError> {
        let deadline = Instant::now() + self.wait_timeout;
        while Instant::now() <= deadline {
            if self.fetch_instance(zone, id).await?.is_none() {
                return Ok(());
            }
            sleep(self.poll_interval).await;
        }

        Err(ScalewayControllerError::ResidualResource {
            instance_id: id.as_str().to_owned(),
        })
    }

    async fn delete_volumes(
        &self,
        zone: &Zone,
        id: &InstanceId,
        volume_ids: &[String],
    ) -> Result<(), ScalewayControllerError> {
        let mut failures = Vec::new();
        for volume_id in volume_ids {
            match self.api.delete_volume_async(zone.as_str(), volume_id).await {
                Ok(()) => debug!(instance = id.as_str(), volume = %volume_id, "deleted volume"),
                Err(err) => failures.push(format!("volume {volume_id}: {err}")),
            }
        }
        if failures.is_empty() {
            return Ok(());
        }
        Err(ScalewayControllerError::Provider {
            message: format!(
                "server {} deleted but its volumes remain: {}",
                id.as_str(),
                failures.join("; ")
            ),
        })
    }

    /// Waits out `starting`/`stopping`, then terminates the server or, when
    /// it is stopped, deletes it followed by its volumes. A server that can
    /// only be powered off is stopped first.
    pub(in crate::scaleway) async fn release_server(
        &self,
        zone: &Zone,
        id: &InstanceId,
    ) -> Result<(), ScalewayControllerError> {
        let mut powered_off = false;
        loop {
            let Some(snapshot) = self.wait_until_settled(zone, id).await? else {
                debug!(instance = id.as_str(), "server already gone");
                return Ok(());
            };

            match ReleaseStep::for_snapshot(&snapshot) {
                ReleaseStep::Terminate => {
                    self.api
                        .perform_instance_action_async(zone.as_str(), id.as_str(), "terminate")
                        .await?;
                    return self.wait_until_gone(zone, id).await;
                }
                ReleaseStep::Delete { volume_ids } => {
                    self.api
                        .delete_instance_async(zone.as_str(), id.as_str())
                        .await?;
                    self.wait_until_gone(zone, id).await?;
                    return self.delete_volumes(zone, id, &volume_ids).await;
                }
                ReleaseStep::PowerOff if !powered_off => {
                    info!(
                        instance = id.as_str(),
                        state = snapshot.state.as_str(),
                        "powering off before release"
                    );
                    self.api
                        .perform_instance_action_async(zone.as_str(), id.as_str(), "poweroff")
                        .await?;
                    powered_off = true;
                }
                ReleaseStep::PowerOff | ReleaseStep::Blocked => {
                    return Err(ScalewayControllerError::Provider {
                        message: format!(
                            "server {} in state {} cannot be released",
                            id.as_str(),
                            snapshot.state.as_str()
                        ),
                    });
                }
            }
        }
    }
}
