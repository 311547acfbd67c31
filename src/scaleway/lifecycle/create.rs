//! Server creation helpers for the Scaleway controller.
//!
//! Servers are created with `stopped: true` so cloud-init user-data can be
//! uploaded before the first boot consumes it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::resources::InstanceSpec;
use crate::scaleway::types::Zone;

use super::super::{ScalewayController, ScalewayControllerError};
use super::{HTTP_CLIENT, InstanceSnapshot, SCALEWAY_INSTANCE_API_BASE};

#[derive(Serialize)]
struct CreateServerRequest {
    name: String,
    commercial_type: String,
    image: String,
    project: String,
    routed_ip_enabled: bool,
    dynamic_ip_required: bool,
    tags: Vec<String>,
    stopped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    organization: Option<String>,
}

#[derive(Deserialize)]
struct CreateServerResponse {
    server: scaleway_rs::ScalewayInstance,
}

impl ScalewayController {
    pub(in crate::scaleway) fn is_instance_type_error(
        api_err: &scaleway_rs::ScalewayApiError,
        spec: &InstanceSpec,
    ) -> bool {
        matches!(api_err.resource.as_deref(), Some("commercial_type"))
            || api_err
                .resource_id
                .as_deref()
                .is_some_and(|id| id == spec.instance_type)
            || (api_err.etype == "invalid_arguments"
                && api_err
                    .message
                    .to_ascii_lowercase()
                    .contains("commercial_type"))
    }

    pub(in crate::scaleway) fn instance_tags(&self) -> Vec<String> {
        vec![
            String::from("imageproof"),
            String::from("ephemeral"),
            format!("imageproof-run={}", self.run_id),
        ]
    }

    pub(in crate::scaleway) async fn power_on_if_needed(
        &self,
        zone: &Zone,
        snapshot: &InstanceSnapshot,
    ) -> Result<(), ScalewayControllerError> {
        if snapshot.state.is_running() {
            return Ok(());
        }

        if snapshot.allows("poweron") {
            self.api
                .perform_instance_action_async(zone.as_str(), snapshot.id.as_str(), "poweron")
                .await?;
            return Ok(());
        }

        Err(ScalewayControllerError::PowerOnNotAllowed {
            instance_id: snapshot.id.as_str().to_owned(),
            state: snapshot.state.as_str().to_owned(),
        })
    }

    /// Creates a Scaleway server in a stopped state.
    ///
    /// # Errors
    ///
    /// Returns [`ScalewayControllerError`] when the API request fails or the
    /// provider rejects the requested commercial type.
    pub(in crate::scaleway) async fn create_instance_stopped(
        &self,
        spec: &InstanceSpec,
        image_id: &str,
    ) -> Result<InstanceSnapshot, ScalewayControllerError> {
        let url = format!("{SCALEWAY_INSTANCE_API_BASE}/zones/{}/servers", spec.zone);
        let payload = CreateServerRequest {
            name: format!("imageproof-{}", Uuid::new_v4().simple()),
            commercial_type: spec.instance_type.clone(),
            image: image_id.to_owned(),
            project: self.credentials.project_id.clone(),
            routed_ip_enabled: true,
            dynamic_ip_required: true,
            tags: self.instance_tags(),
            stopped: true,
            organization: self.credentials.organization_id.clone(),
        };

        let response = HTTP_CLIENT
            .post(&url)
            .header("X-Auth-Token", &self.credentials.secret_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if status.is_success() {
            let parsed: CreateServerResponse =
                serde_json::from_slice(&body).map_err(|err| ScalewayControllerError::Provider {
                    message: err.to_string(),
                })?;
            return Ok(InstanceSnapshot::from(parsed.server));
        }

        if let Ok(api_err) = serde_json::from_slice::<scaleway_rs::ScalewayApiError>(&body)
            && Self::is_instance_type_error(&api_err, spec)
        {
            return Err(ScalewayControllerError::InstanceTypeUnavailable {
                instance_type: spec.instance_type.clone(),
                zone: spec.zone.clone(),
            });
        }

        Err(ScalewayControllerError::Provider {
            message: format!("HTTP {status}: {}", String::from_utf8_lossy(&body)),
        })
    }
}
