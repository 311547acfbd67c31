//! Cloud-init user-data rendering.
//!
//! New cloud instances receive a `#cloud-config` document that authorises
//! the per-run public key for the configured SSH user. Root gets the key
//! directly; any other user is created with passwordless sudo so checks
//! that need elevated privileges can still run.

/// Renders a `#cloud-config` document authorising `public_key` for `user`.
#[must_use]
pub fn authorised_key_user_data(user: &str, public_key: &str) -> String {
    let key = yaml_quote(public_key.trim());
    let name = yaml_quote(user.trim());
    if user.trim() == "root" {
        return format!(
            "#cloud-config\n\
             disable_root: false\n\
             users:\n  \
               - name: {name}\n    \
                 ssh_authorized_keys:\n      \
                   - {key}\n"
        );
    }

    format!(
        "#cloud-config\n\
         users:\n  \
           - default\n  \
           - name: {name}\n    \
             shell: /bin/sh\n    \
             sudo: \"ALL=(ALL) NOPASSWD:ALL\"\n    \
             ssh_authorized_keys:\n      \
               - {key}\n"
    )
}

fn yaml_quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIExample imageproof";

    #[test]
    fn root_user_data_enables_root_login_with_key() {
        let rendered = authorised_key_user_data("root", KEY);
        assert!(rendered.starts_with("#cloud-config\n"));
        assert!(rendered.contains("disable_root: false"));
        assert!(rendered.contains("- name: \"root\""));
        assert!(rendered.contains(&format!("- \"{KEY}\"")));
        assert!(!rendered.contains("NOPASSWD"));
    }

    #[test]
    fn non_root_user_is_created_with_sudo() {
        let rendered = authorised_key_user_data("ubuntu", KEY);
        assert!(rendered.contains("- default"));
        assert!(rendered.contains("- name: \"ubuntu\""));
        assert!(rendered.contains("NOPASSWD:ALL"));
        assert!(!rendered.contains("disable_root"));
    }

    #[rstest]
    #[case("plain", "\"plain\"")]
    #[case("with \"quotes\"", "\"with \\\"quotes\\\"\"")]
    #[case("back\\slash", "\"back\\\\slash\"")]
    fn yaml_quote_escapes_special_characters(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(yaml_quote(input), expected);
    }
}
