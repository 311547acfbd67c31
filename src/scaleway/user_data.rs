//! Cloud-init user-data upload for new servers.
//!
//! Scaleway exposes instance user-data as a per-server key/value store. When
//! the key is set to `cloud-init`, the value is consumed by cloud-init on the
//! instance's first boot, so it must be written while the server is stopped.

use super::lifecycle::{HTTP_CLIENT, SCALEWAY_INSTANCE_API_BASE};
use super::types::{InstanceId, Zone};
use super::{ScalewayController, ScalewayControllerError};

/// Reserved user-data key that Scaleway recognises for cloud-init payloads.
pub(crate) const CLOUD_INIT_USER_DATA_KEY: &str = "cloud-init";

pub(crate) fn user_data_url(zone: &str, server_id: &str, key: &str) -> String {
    format!("{SCALEWAY_INSTANCE_API_BASE}/zones/{zone}/servers/{server_id}/user_data/{key}")
}

impl ScalewayController {
    pub(in crate::scaleway) async fn upload_user_data(
        &self,
        zone: &Zone,
        id: &InstanceId,
    ) -> Result<(), ScalewayControllerError> {
        let url = user_data_url(zone.as_str(), id.as_str(), CLOUD_INIT_USER_DATA_KEY);
        let failure = |message: String| ScalewayControllerError::UserData {
            instance_id: id.as_str().to_owned(),
            message,
        };

        let response = HTTP_CLIENT
            .patch(&url)
            .header("X-Auth-Token", &self.credentials.secret_key)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(self.user_data.clone())
            .send()
            .await
            .map_err(|err| failure(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(failure(format!("HTTP {status}: {body}")))
    }
}
