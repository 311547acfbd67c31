//! Newtypes for Scaleway lifecycle values to avoid stringly-typed code.

use std::ops::Deref;

macro_rules! newtype {
    ($name:ident) => {
        #[derive(Clone, Debug, Eq, PartialEq)]
        pub(crate) struct $name(String);

        impl $name {
            pub(crate) const fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &Self::Target {
                self.as_str()
            }
        }
    };
}

newtype!(InstanceId);
newtype!(Zone);
newtype!(InstanceState);
newtype!(Action);

impl InstanceState {
    pub(crate) fn is_running(&self) -> bool {
        self.as_str() == "running"
    }

    /// `starting` and `stopping` accept no lifecycle actions until they end.
    pub(crate) fn is_transitional(&self) -> bool {
        matches!(self.as_str(), "starting" | "stopping")
    }

    /// Powered off with volumes detached from the hypervisor.
    pub(crate) fn is_stopped(&self) -> bool {
        self.as_str() == "stopped"
    }
}

/// Server created during this run, tracked until it is released.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct ServerRecord {
    pub(crate) id: InstanceId,
    pub(crate) zone: Zone,
    pub(crate) image: String,
    pub(crate) instance_type: String,
    pub(crate) public_ip: Option<std::net::IpAddr>,
}
