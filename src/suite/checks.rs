//! Built-in remote checks.
//!
//! Each check is a POSIX shell snippet run through `sh -c` on the instance;
//! exit status 0 means the image passes that check. The list is ordered and
//! the first entry doubles as the reachability probe.

/// One named remote check.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RemoteCheck {
    /// Case name recorded in the results.
    pub name: &'static str,
    /// Shell snippet executed on the instance.
    pub script: &'static str,
}

/// Checks every instance runs, in order.
pub const BUILT_IN_CHECKS: &[RemoteCheck] = &[
    RemoteCheck {
        name: "ssh_reachable",
        script: "true",
    },
    RemoteCheck {
        name: "os_release_present",
        script: "test -s /etc/os-release && . /etc/os-release && echo \"$PRETTY_NAME\"",
    },
    RemoteCheck {
        name: "cloud_init_finished",
        script: "test -f /var/lib/cloud/instance/boot-finished",
    },
    RemoteCheck {
        name: "cloud_init_status_done",
        script: "command -v cloud-init >/dev/null 2>&1 || exit 0; \
                 status=$(cloud-init status --wait 2>/dev/null); \
                 echo \"$status\"; echo \"$status\" | grep -q 'status: done'",
    },
    RemoteCheck {
        name: "root_filesystem_writable",
        script: "probe=$(mktemp /var/tmp/imageproof.XXXXXX) && rm -f \"$probe\"",
    },
    RemoteCheck {
        name: "no_failed_systemd_units",
        script: "command -v systemctl >/dev/null 2>&1 || exit 0; \
                 failed=$(systemctl list-units --state=failed --no-legend --plain 2>/dev/null); \
                 test -z \"$failed\" || { echo \"$failed\"; exit 1; }",
    },
    RemoteCheck {
        name: "sshd_password_auth_disabled",
        script: "cfg=$(sshd -T 2>/dev/null || sudo -n sshd -T 2>/dev/null); \
                 echo \"$cfg\" | grep -qi '^passwordauthentication no'",
    },
    RemoteCheck {
        name: "package_manager_present",
        script: "command -v apt-get || command -v dnf || command -v yum || \
                 command -v zypper || command -v apk || command -v pacman",
    },
];
