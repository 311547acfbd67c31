//! Server lifecycle helpers for the Scaleway controller.

use std::sync::LazyLock;
use std::time::Duration;

mod create;
mod image;
mod wait;

use crate::scaleway::types::{Action, InstanceId, InstanceState};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
pub(in crate::scaleway) const SCALEWAY_INSTANCE_API_BASE: &str =
    "https://api.scaleway.com/instance/v1";

pub(in crate::scaleway) static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct InstanceSnapshot {
    pub(crate) id: InstanceId,
    pub(crate) state: InstanceState,
    pub(crate) allowed_actions: Vec<Action>,
    pub(crate) public_ip: Option<String>,
    pub(crate) volume_ids: Vec<String>,
}

impl InstanceSnapshot {
    pub(crate) fn allows(&self, action: &str) -> bool {
        self.allowed_actions
            .iter()
            .any(|allowed| allowed.as_str() == action)
    }
}

impl From<scaleway_rs::ScalewayInstance> for InstanceSnapshot {
    fn from(server: scaleway_rs::ScalewayInstance) -> Self {
        let mut volume_ids: Vec<String> = server
            .volumes
            .volumes
            .into_values()
            .map(|volume| volume.id)
            .collect();
        volume_ids.sort();
        Self {
            id: server.id.into(),
            state: server.state.into(),
            allowed_actions: server
                .allowed_actions
                .into_iter()
                .map(Action::from)
                .collect(),
            public_ip: server.public_ip.map(|ip| ip.address),
            volume_ids,
        }
    }
}

#[cfg(test)]
mod tests;
