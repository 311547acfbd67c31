//! Resource descriptions and the infrastructure configurator.
//!
//! A resource description is a JSON document listing the instances to
//! provision. The configurator resolves the single cloud provider it
//! targets, validates every entry into an immutable [`ResourcePlan`], and
//! finally binds the plan to an infrastructure controller.

use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use camino::Utf8Path;
use serde::Deserialize;
use tracing::info;

use crate::cloud_init::authorised_key_user_data;
use crate::config::ScalewayConfig;
use crate::files;
use crate::infra::{InfraController, ProvisionedController, StaticController, StaticHost};
use crate::scaleway::ScalewayController;
use crate::ssh::SshKeyPair;

mod error;

pub use error::ConfigurationError;

/// Zone used when a Scaleway entry omits one.
pub const DEFAULT_ZONE: &str = "fr-par-1";
/// Commercial type used when a Scaleway entry omits one.
pub const DEFAULT_INSTANCE_TYPE: &str = "DEV1-S";
/// Architecture used when a Scaleway entry omits one.
pub const DEFAULT_ARCHITECTURE: &str = "x86_64";
/// SSH port used when a static entry omits one.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Cloud providers a plan can target.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum CloudProvider {
    /// Scaleway Instances.
    Scaleway,
    /// Pre-existing hosts reachable over SSH; nothing is provisioned.
    Static,
}

impl CloudProvider {
    /// Identifier used in resource descriptions.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scaleway => "scaleway",
            Self::Static => "static",
        }
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for CloudProvider {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "scaleway" | "scw" => Ok(Self::Scaleway),
            "static" => Ok(Self::Static),
            _ => Err(ConfigurationError::UnsupportedProvider {
                provider: value.trim().to_owned(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ResourceDescription {
    provider: Option<String>,
    #[serde(default)]
    instances: Vec<ResourceEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ResourceEntry {
    provider: Option<String>,
    name: Option<String>,
    image: Option<String>,
    instance_type: Option<String>,
    zone: Option<String>,
    architecture: Option<String>,
    count: Option<u32>,
    address: Option<IpAddr>,
    port: Option<u16>,
}

/// One validated entry of a [`ResourcePlan`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ResourceSpec {
    /// Instances to create on a cloud provider.
    Instance(InstanceSpec),
    /// A host that already exists.
    Host(StaticHost),
}

/// Request for one or more identical cloud instances.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceSpec {
    /// Human readable image label resolved by the provider.
    pub image: String,
    /// Commercial type or flavour.
    pub instance_type: String,
    /// Availability zone.
    pub zone: String,
    /// CPU architecture of the image variant.
    pub architecture: String,
    /// Number of instances to create.
    pub count: u32,
}

/// Immutable provisioning plan resolved from a resource description.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResourcePlan {
    provider: CloudProvider,
    resources: Vec<ResourceSpec>,
}

impl ResourcePlan {
    /// Builds a plan, checking every entry matches the provider.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidResource`] when an entry belongs
    /// to a different provider or reuses a host name already in the plan.
    pub fn new(
        provider: CloudProvider,
        resources: Vec<ResourceSpec>,
    ) -> Result<Self, ConfigurationError> {
        let mut names = BTreeSet::new();
        for (index, spec) in resources.iter().enumerate() {
            if let ResourceSpec::Host(host) = spec
                && !names.insert(host.name.as_str())
            {
                return Err(ConfigurationError::InvalidResource {
                    index,
                    message: format!("host name '{}' is already used", host.name),
                });
            }
            let matches = matches!(
                (provider, spec),
                (CloudProvider::Scaleway, ResourceSpec::Instance(_))
                    | (CloudProvider::Static, ResourceSpec::Host(_))
            );
            if !matches {
                return Err(ConfigurationError::InvalidResource {
                    index,
                    message: format!("entry does not describe a {provider} resource"),
                });
            }
        }
        Ok(Self {
            provider,
            resources,
        })
    }

    /// Provider every resource in the plan targets.
    #[must_use]
    pub const fn provider(&self) -> CloudProvider {
        self.provider
    }

    /// Requested resources in description order.
    #[must_use]
    pub fn resources(&self) -> &[ResourceSpec] {
        &self.resources
    }

    /// Total number of instances the plan will yield.
    #[must_use]
    pub fn instance_count(&self) -> u64 {
        self.resources
            .iter()
            .map(|spec| match spec {
                ResourceSpec::Instance(instance) => u64::from(instance.count),
                ResourceSpec::Host(_) => 1,
            })
            .sum()
    }

    fn instance_specs(&self) -> Vec<InstanceSpec> {
        self.resources
            .iter()
            .filter_map(|spec| match spec {
                ResourceSpec::Instance(instance) => Some(instance.clone()),
                ResourceSpec::Host(_) => None,
            })
            .collect()
    }

    fn hosts(&self) -> Vec<StaticHost> {
        self.resources
            .iter()
            .filter_map(|spec| match spec {
                ResourceSpec::Host(host) => Some(host.clone()),
                ResourceSpec::Instance(_) => None,
            })
            .collect()
    }
}

/// Capability that turns a resource description into a bound controller.
pub trait InfraConfigurator {
    /// Controller produced once the plan has been materialised.
    type Controller: InfraController;

    /// Determines the single provider targeted by the description.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] when the description is unreadable,
    /// names no provider, names several, or names an unsupported one.
    fn cloud_provider_from_resources(
        &self,
        resources_file: &Utf8Path,
    ) -> Result<CloudProvider, ConfigurationError>;

    /// Builds the full plan for the resolved provider.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] when an entry is incomplete.
    fn configure_from_resources(
        &self,
        resources_file: &Utf8Path,
        provider: CloudProvider,
    ) -> Result<ResourcePlan, ConfigurationError>;

    /// Emits the resolved plan for auditability.
    fn print_configuration(&self, plan: &ResourcePlan);

    /// Materialises the plan into a controller ready for deployment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] when provider settings are missing or
    /// the public key cannot be read.
    fn initialize_resources(
        &self,
        plan: ResourcePlan,
        key_pair: &SshKeyPair,
    ) -> Result<Self::Controller, ConfigurationError>;
}

/// Configurator backed by JSON resource descriptions on disk.
#[derive(Clone, Debug)]
pub struct ResourceConfigurator {
    scaleway: ScalewayConfig,
    ssh_user: String,
}

impl ResourceConfigurator {
    /// Creates a configurator that authorises keys for `ssh_user`.
    #[must_use]
    pub fn new(scaleway: ScalewayConfig, ssh_user: impl Into<String>) -> Self {
        Self {
            scaleway,
            ssh_user: ssh_user.into(),
        }
    }

    fn load(resources_file: &Utf8Path) -> Result<ResourceDescription, ConfigurationError> {
        let contents =
            files::read_utf8(resources_file).map_err(|err| ConfigurationError::Read {
                path: resources_file.to_path_buf(),
                message: err.to_string(),
            })?;
        serde_json::from_str(&contents).map_err(|err| ConfigurationError::Parse {
            path: resources_file.to_path_buf(),
            message: err.to_string(),
        })
    }
}

impl InfraConfigurator for ResourceConfigurator {
    type Controller = ProvisionedController;

    fn cloud_provider_from_resources(
        &self,
        resources_file: &Utf8Path,
    ) -> Result<CloudProvider, ConfigurationError> {
        let description = Self::load(resources_file)?;
        resolve_provider(resources_file, &description)
    }

    fn configure_from_resources(
        &self,
        resources_file: &Utf8Path,
        provider: CloudProvider,
    ) -> Result<ResourcePlan, ConfigurationError> {
        let description = Self::load(resources_file)?;
        if description.instances.is_empty() {
            return Err(ConfigurationError::NoResources {
                path: resources_file.to_path_buf(),
            });
        }

        let resources = description
            .instances
            .iter()
            .enumerate()
            .map(|(index, entry)| build_spec(provider, index, entry))
            .collect::<Result<Vec<_>, _>>()?;
        ResourcePlan::new(provider, resources)
    }

    fn print_configuration(&self, plan: &ResourcePlan) {
        info!(
            provider = %plan.provider(),
            instances = plan.instance_count(),
            "resolved resource plan"
        );
        for (index, spec) in plan.resources().iter().enumerate() {
            match spec {
                ResourceSpec::Instance(instance) => info!(
                    index,
                    image = %instance.image,
                    instance_type = %instance.instance_type,
                    zone = %instance.zone,
                    architecture = %instance.architecture,
                    count = instance.count,
                    "planned instance"
                ),
                ResourceSpec::Host(host) => info!(
                    index,
                    name = %host.name,
                    address = %host.address,
                    port = host.port,
                    "planned static host"
                ),
            }
        }
    }

    fn initialize_resources(
        &self,
        plan: ResourcePlan,
        key_pair: &SshKeyPair,
    ) -> Result<Self::Controller, ConfigurationError> {
        match plan.provider() {
            CloudProvider::Scaleway => {
                let credentials = self.scaleway.credentials()?;
                let public_key = files::read_utf8(&key_pair.public_key).map_err(|err| {
                    ConfigurationError::PublicKey {
                        path: key_pair.public_key.clone(),
                        message: err.to_string(),
                    }
                })?;
                let user_data = authorised_key_user_data(&self.ssh_user, public_key.trim());
                Ok(ProvisionedController::Scaleway(ScalewayController::new(
                    credentials,
                    plan.instance_specs(),
                    user_data,
                )))
            }
            CloudProvider::Static => Ok(ProvisionedController::Static(StaticController::new(
                plan.hosts(),
            ))),
        }
    }
}

fn resolve_provider(
    resources_file: &Utf8Path,
    description: &ResourceDescription,
) -> Result<CloudProvider, ConfigurationError> {
    let mut providers = BTreeSet::new();
    for raw in description
        .provider
        .iter()
        .chain(description.instances.iter().filter_map(|entry| entry.provider.as_ref()))
    {
        providers.insert(raw.parse::<CloudProvider>()?);
    }

    let mut resolved = providers.iter().copied();
    match (resolved.next(), resolved.next()) {
        (Some(provider), None) => Ok(provider),
        (None, _) => Err(ConfigurationError::MissingProvider {
            path: resources_file.to_path_buf(),
        }),
        (Some(_), Some(_)) => Err(ConfigurationError::AmbiguousProvider {
            providers: providers
                .iter()
                .map(|provider| provider.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|raw| raw.trim())
        .filter(|trimmed| !trimmed.is_empty())
        .map(str::to_owned)
}

fn build_spec(
    provider: CloudProvider,
    index: usize,
    entry: &ResourceEntry,
) -> Result<ResourceSpec, ConfigurationError> {
    let invalid = |message: &str| ConfigurationError::InvalidResource {
        index,
        message: message.to_owned(),
    };

    if let Some(raw) = entry.provider.as_deref()
        && raw.parse::<CloudProvider>()? != provider
    {
        return Err(invalid("entry targets a different provider than the plan"));
    }

    match provider {
        CloudProvider::Scaleway => {
            if entry.address.is_some() || entry.port.is_some() {
                return Err(invalid("address and port only apply to static hosts"));
            }
            let image = non_blank(entry.image.as_ref()).ok_or_else(|| invalid("missing image"))?;
            let count = entry.count.unwrap_or(1);
            if count == 0 {
                return Err(invalid("count must be at least 1"));
            }
            Ok(ResourceSpec::Instance(InstanceSpec {
                image,
                instance_type: non_blank(entry.instance_type.as_ref())
                    .unwrap_or_else(|| DEFAULT_INSTANCE_TYPE.to_owned()),
                zone: non_blank(entry.zone.as_ref()).unwrap_or_else(|| DEFAULT_ZONE.to_owned()),
                architecture: non_blank(entry.architecture.as_ref())
                    .unwrap_or_else(|| DEFAULT_ARCHITECTURE.to_owned()),
                count,
            }))
        }
        CloudProvider::Static => {
            let address = entry.address.ok_or_else(|| invalid("missing address"))?;
            if entry.count.is_some_and(|count| count != 1) {
                return Err(invalid("static hosts cannot be multiplied with count"));
            }
            let name = non_blank(entry.name.as_ref())
                .unwrap_or_else(|| format!("host-{index}"));
            if name.chars().any(char::is_whitespace) {
                return Err(invalid("name must not contain whitespace"));
            }
            Ok(ResourceSpec::Host(StaticHost {
                name,
                address,
                port: entry.port.unwrap_or(DEFAULT_SSH_PORT),
            }))
        }
    }
}
