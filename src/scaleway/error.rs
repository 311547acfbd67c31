//! Error types for the Scaleway controller.

use scaleway_rs::ScalewayError as SdkError;
use thiserror::Error;

/// Errors raised by the Scaleway controller.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScalewayControllerError {
    /// Raised when the requested image label cannot be resolved.
    #[error("image '{label}' (arch {arch}) not found in zone {zone}")]
    ImageNotFound {
        /// Image label from the resource description.
        label: String,
        /// Requested architecture.
        arch: String,
        /// Zone used for the lookup.
        zone: String,
    },
    /// Raised when the server type is not available in the selected zone.
    #[error("instance type '{instance_type}' not available in zone {zone}")]
    InstanceTypeUnavailable {
        /// Requested commercial type.
        instance_type: String,
        /// Target zone.
        zone: String,
    },
    /// Raised when an asynchronous operation exceeds the timeout.
    #[error("timeout waiting for {action} on instance {instance_id}")]
    Timeout {
        /// Action being waited on.
        action: String,
        /// Provider instance identifier.
        instance_id: String,
    },
    /// Raised when a running instance never exposes a public IP.
    #[error("instance {instance_id} missing public IPv4 address")]
    MissingPublicIp {
        /// Provider instance identifier.
        instance_id: String,
    },
    /// Raised when teardown leaves a server visible in the API.
    #[error("instance {instance_id} still present after teardown")]
    ResidualResource {
        /// Provider instance identifier.
        instance_id: String,
    },
    /// Raised when an instance cannot be powered on.
    #[error("instance {instance_id} in state {state} cannot be powered on")]
    PowerOnNotAllowed {
        /// Provider instance identifier.
        instance_id: String,
        /// Current state reported by the provider.
        state: String,
    },
    /// Raised when cloud-init user-data cannot be attached to a server.
    #[error("failed to upload cloud-init user-data to instance {instance_id}: {message}")]
    UserData {
        /// Provider instance identifier.
        instance_id: String,
        /// Provider or transport error message.
        message: String,
    },
    /// Raised when one or more instances could not be released.
    #[error("failed to release {count} instance(s): {details}")]
    Teardown {
        /// Number of instances still present.
        count: usize,
        /// Per-instance failure messages joined with `; `.
        details: String,
    },
    /// Wrapper for provider level failures.
    #[error("provider error: {message}")]
    Provider {
        /// Message returned by the provider SDK or HTTP layer.
        message: String,
    },
}

impl From<SdkError> for ScalewayControllerError {
    fn from(value: SdkError) -> Self {
        Self::Provider {
            message: value.to_string(),
        }
    }
}

impl From<reqwest::Error> for ScalewayControllerError {
    fn from(value: reqwest::Error) -> Self {
        Self::Provider {
            message: value.to_string(),
        }
    }
}
