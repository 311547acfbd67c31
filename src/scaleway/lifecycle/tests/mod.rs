//! Unit tests for Scaleway lifecycle helpers.

use std::collections::HashMap;
use std::time::Duration;

use scaleway_rs::{ScalewayApi, ScalewayImage};
use tokio::sync::Mutex;

use super::InstanceSnapshot;
use crate::config::ScalewayCredentials;
use crate::resources::InstanceSpec;
use crate::scaleway::types::{Action, InstanceId, InstanceState, Zone};
use crate::scaleway::{ScalewayController, ScalewayControllerError};

pub(super) fn snapshot(
    id: impl Into<InstanceId>,
    state: impl Into<InstanceState>,
    allowed: impl IntoIterator<Item = impl Into<Action>>,
    public_ip: Option<&str>,
) -> InstanceSnapshot {
    InstanceSnapshot {
        id: id.into(),
        state: state.into(),
        allowed_actions: allowed.into_iter().map(Into::into).collect(),
        public_ip: public_ip.map(str::to_owned),
        volume_ids: Vec::new(),
    }
}

/// Builds a catalogue entry; `created` doubles as the sort key.
fn catalogue_image(id: &str, arch: &str, state: &str, created: &str) -> ScalewayImage {
    ScalewayImage {
        id: id.to_owned(),
        name: String::new(),
        arch: arch.to_owned(),
        creation_date: created.to_owned(),
        modification_date: String::new(),
        from_server: None,
        organization: String::new(),
        public: true,
        state: state.to_owned(),
        project: String::new(),
        tags: vec![],
        zone: String::new(),
        root_volume: scaleway_rs::ScalewayImageRootVolume {
            id: String::new(),
            name: String::new(),
            size: 0,
            volume_type: String::new(),
        },
        default_bootscript: None,
        extra_volumes: scaleway_rs::ScalewayImageExtraVolumes {
            volumes: HashMap::new(),
        },
    }
}

fn base_spec() -> InstanceSpec {
    InstanceSpec {
        image: String::from("ubuntu_noble"),
        instance_type: String::from("DEV1-S"),
        zone: String::from("fr-par-1"),
        architecture: String::from("x86_64"),
        count: 1,
    }
}

fn controller_fixture() -> ScalewayController {
    ScalewayController {
        api: ScalewayApi::new("dummy"),
        credentials: ScalewayCredentials {
            secret_key: String::from("dummy"),
            project_id: String::from("proj"),
            organization_id: None,
        },
        specs: vec![base_spec()],
        user_data: String::from("#cloud-config\n"),
        run_id: String::from("run"),
        poll_interval: Duration::from_millis(1),
        wait_timeout: Duration::from_millis(5),
        servers: Mutex::new(Vec::new()),
    }
}

#[tokio::test]
async fn power_on_if_needed_returns_ok_for_running() {
    let snap = snapshot("id", "running", [Action::from("poweron")], Some("192.0.2.1"));
    let zone = Zone::from("fr-par-1");
    let result = controller_fixture().power_on_if_needed(&zone, &snap).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn power_on_if_needed_errors_when_not_allowed() {
    let snap = snapshot("id", "stopped", Vec::<Action>::new(), None);
    let zone = Zone::from("fr-par-1");
    let result = controller_fixture().power_on_if_needed(&zone, &snap).await;
    assert!(matches!(
        result,
        Err(ScalewayControllerError::PowerOnNotAllowed { .. })
    ));
}

#[test]
fn instance_tags_carry_run_identifier() {
    let tags = controller_fixture().instance_tags();
    assert!(tags.contains(&String::from("imageproof")));
    assert!(tags.contains(&String::from("imageproof-run=run")));
}

#[tokio::test]
async fn instances_skip_servers_without_address() {
    let controller = controller_fixture();
    controller.servers.lock().await.extend([
        crate::scaleway::types::ServerRecord {
            id: InstanceId::from("pending"),
            zone: Zone::from("fr-par-1"),
            image: String::from("ubuntu_noble"),
            instance_type: String::from("DEV1-S"),
            public_ip: None,
        },
        crate::scaleway::types::ServerRecord {
            id: InstanceId::from("ready"),
            zone: Zone::from("fr-par-1"),
            image: String::from("ubuntu_noble"),
            instance_type: String::from("DEV1-S"),
            public_ip: "192.0.2.7".parse().ok(),
        },
    ]);

    let listed = crate::infra::InfraController::instances(&controller)
        .await
        .expect("listing never fails");
    assert_eq!(listed.len(), 1);
    let ready = listed.first().expect("one instance");
    assert_eq!(ready.id, "ready");
    assert_eq!(ready.zone.as_deref(), Some("fr-par-1"));
    assert_eq!(
        ready.metadata.get("image").map(String::as_str),
        Some("ubuntu_noble")
    );
}

#[tokio::test]
async fn destroy_with_no_servers_is_a_no_op() {
    let controller = controller_fixture();
    crate::infra::InfraController::destroy_infra(&controller)
        .await
        .expect("nothing to release");
}

mod wait;
