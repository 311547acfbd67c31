//! Tests for the readiness and release wait loops.

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Mutex;
use std::time::Duration;

use rstest::rstest;

use crate::scaleway::ScalewayControllerError;
use crate::scaleway::lifecycle::InstanceSnapshot;
use crate::scaleway::lifecycle::wait::{ReleaseStep, poll_for_public_ip, poll_until_settled};
use crate::scaleway::types::Action;

async fn poll(
    snapshots: Vec<Option<InstanceSnapshot>>,
) -> Result<IpAddr, ScalewayControllerError> {
    let queue = Mutex::new(VecDeque::from(snapshots));
    poll_for_public_ip(
        "id",
        Duration::from_millis(1),
        Duration::from_millis(20),
        || {
            let next = queue
                .lock()
                .expect("queue lock")
                .pop_front()
                .unwrap_or(None);
            async move { Ok(next) }
        },
    )
    .await
}

async fn settle(
    snapshots: Vec<Option<InstanceSnapshot>>,
) -> Result<Option<InstanceSnapshot>, ScalewayControllerError> {
    let queue = Mutex::new(VecDeque::from(snapshots));
    poll_until_settled(
        "id",
        Duration::from_millis(1),
        Duration::from_millis(20),
        || {
            let next = queue
                .lock()
                .expect("queue lock")
                .pop_front()
                .unwrap_or_else(|| {
                    Some(crate::scaleway::lifecycle::tests::snapshot("id", "starting", Vec::<Action>::new(), None))
                });
            async move { Ok(next) }
        },
    )
    .await
}

fn with_volumes(mut snapshot: InstanceSnapshot, volume_ids: &[&str]) -> InstanceSnapshot {
    snapshot.volume_ids = volume_ids.iter().map(|id| (*id).to_owned()).collect();
    snapshot
}

#[tokio::test]
async fn returns_address_once_running() {
    let result = poll(vec![
        None,
        Some(crate::scaleway::lifecycle::tests::snapshot("id", "starting", Vec::<Action>::new(), None)),
        Some(crate::scaleway::lifecycle::tests::snapshot(
            "id",
            "running",
            Vec::<Action>::new(),
            Some("192.0.2.4"),
        )),
    ])
    .await
    .expect("address should resolve");

    assert_eq!(result, IpAddr::V4(Ipv4Addr::new(192, 0, 2, 4)));
}

#[tokio::test]
async fn running_without_address_reports_missing_ip() {
    let result = poll(vec![
        Some(crate::scaleway::lifecycle::tests::snapshot("id", "running", Vec::<Action>::new(), None)),
        Some(crate::scaleway::lifecycle::tests::snapshot("id", "running", Vec::<Action>::new(), None)),
    ])
    .await;
    assert!(
        matches!(result, Err(ScalewayControllerError::MissingPublicIp { .. })),
        "unexpected outcome: {result:?}"
    );
}

#[tokio::test]
async fn never_running_times_out() {
    let result = poll(vec![Some(crate::scaleway::lifecycle::tests::snapshot(
        "id",
        "stopped",
        Vec::<Action>::new(),
        None,
    ))])
    .await;
    assert!(
        matches!(result, Err(ScalewayControllerError::Timeout { .. })),
        "unexpected outcome: {result:?}"
    );
}

#[tokio::test]
async fn fetch_errors_abort_the_wait() {
    let result = poll_for_public_ip(
        "id",
        Duration::from_millis(1),
        Duration::from_millis(20),
        || async {
            Err(ScalewayControllerError::Provider {
                message: String::from("unauthorised"),
            })
        },
    )
    .await;
    assert!(matches!(
        result,
        Err(ScalewayControllerError::Provider { .. })
    ));
}

#[tokio::test]
async fn starting_server_is_awaited_before_release() {
    let settled = settle(vec![
        Some(crate::scaleway::lifecycle::tests::snapshot("id", "starting", ["poweroff"], None)),
        Some(crate::scaleway::lifecycle::tests::snapshot("id", "starting", ["poweroff"], None)),
        Some(crate::scaleway::lifecycle::tests::snapshot(
            "id",
            "running",
            ["poweroff", "terminate", "reboot"],
            Some("192.0.2.4"),
        )),
    ])
    .await
    .expect("server settles")
    .expect("server still listed");

    assert!(settled.state.is_running());
    assert_eq!(ReleaseStep::for_snapshot(&settled), ReleaseStep::Terminate);
}

#[tokio::test]
async fn stopping_server_settles_into_volume_deletion() {
    let settled = settle(vec![
        Some(crate::scaleway::lifecycle::tests::snapshot("id", "stopping", Vec::<Action>::new(), None)),
        Some(with_volumes(
            crate::scaleway::lifecycle::tests::snapshot("id", "stopped", ["poweron", "backup"], None),
            &["vol-root", "vol-scratch"],
        )),
    ])
    .await
    .expect("server settles")
    .expect("server still listed");

    assert_eq!(
        ReleaseStep::for_snapshot(&settled),
        ReleaseStep::Delete {
            volume_ids: vec![String::from("vol-root"), String::from("vol-scratch")],
        }
    );
}

#[tokio::test]
async fn vanished_server_needs_no_release() {
    let settled = settle(vec![
        Some(crate::scaleway::lifecycle::tests::snapshot("id", "stopping", Vec::<Action>::new(), None)),
        None,
    ])
    .await
    .expect("lookup succeeds");
    assert_eq!(settled, None);
}

#[tokio::test]
async fn server_stuck_in_transition_times_out() {
    let result = settle(Vec::new()).await;
    assert!(
        matches!(
            result,
            Err(ScalewayControllerError::Timeout { ref action, .. })
                if action == "wait_for_stable_state"
        ),
        "unexpected outcome: {result:?}"
    );
}

#[rstest]
#[case::running(
    crate::scaleway::lifecycle::tests::snapshot("id", "running", ["poweroff", "terminate"], None),
    ReleaseStep::Terminate
)]
#[case::stopped_in_place(
    crate::scaleway::lifecycle::tests::snapshot("id", "stopped in place", ["poweron", "poweroff"], None),
    ReleaseStep::PowerOff
)]
#[case::locked(crate::scaleway::lifecycle::tests::snapshot("id", "locked", Vec::<Action>::new(), None), ReleaseStep::Blocked)]
fn release_step_follows_allowed_actions(
    #[case] snapshot: InstanceSnapshot,
    #[case] expected: ReleaseStep,
) {
    assert_eq!(ReleaseStep::for_snapshot(&snapshot), expected);
}
