//! Unit tests for SSH suite execution.

use std::net::{IpAddr, Ipv4Addr};

use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::test_support::ScriptedRunner;

struct Fixture {
    _tmp: TempDir,
    sink: ResultSink,
    runner: ScriptedRunner,
    instance: InstanceDescriptor,
    ssh_config: Utf8PathBuf,
}

#[fixture]
fn fixture() -> Fixture {
    let tmp = TempDir::new().expect("tempdir");
    let dir = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8 tempdir");
    Fixture {
        sink: ResultSink::new(dir.join("results.json")).expect("json sink"),
        runner: ScriptedRunner::new(),
        instance: InstanceDescriptor::new("alpha", IpAddr::V4(Ipv4Addr::LOCALHOST), 22),
        ssh_config: dir.join("ssh_config"),
        _tmp: tmp,
    }
}

impl Fixture {
    fn suite(&self, debug: bool) -> SshSuiteRunner<ScriptedRunner> {
        SshSuiteLauncher::with_runner(self.runner.clone(), "ssh", debug)
            .runner_for(&self.instance, &self.ssh_config)
    }

    fn push_passes(&self, count: usize) {
        for _ in 0..count {
            self.runner.push_success();
        }
    }

    fn cases(&self) -> Vec<CaseResult> {
        self.sink
            .snapshot()
            .get("alpha")
            .map(|entry| entry.cases.clone())
            .unwrap_or_default()
    }
}

#[rstest]
fn every_check_runs_over_ssh_with_the_generated_config(fixture: Fixture) {
    fixture.push_passes(BUILT_IN_CHECKS.len());

    fixture.suite(false).run_tests(&fixture.sink).expect("suite passes");

    let invocations = fixture.runner.invocations();
    assert_eq!(invocations.len(), BUILT_IN_CHECKS.len());
    assert_eq!(
        invocations.first().map(|call| call.command_string()),
        Some(format!("ssh -F {} alpha sh -c true", fixture.ssh_config))
    );
    let cases = fixture.cases();
    assert_eq!(
        cases.iter().map(|case| case.name.as_str()).collect::<Vec<_>>(),
        BUILT_IN_CHECKS
            .iter()
            .map(|check| check.name)
            .collect::<Vec<_>>()
    );
    assert!(cases.iter().all(|case| case.outcome == CaseOutcome::Passed));
    assert!(cases.iter().all(|case| case.stdout.is_none()));
}

#[rstest]
fn unreachable_instances_stop_after_the_probe(fixture: Fixture) {
    fixture
        .runner
        .push_output(Some(255), "", "ssh: connect to host 127.0.0.1 port 22: Connection refused\n");

    let err = fixture
        .suite(false)
        .run_tests(&fixture.sink)
        .expect_err("probe fails");

    assert!(matches!(err, RemoteExecutionError::Unreachable { .. }));
    assert_eq!(fixture.runner.invocations().len(), 1);
    let cases = fixture.cases();
    assert_eq!(cases.len(), 1);
    let probe = cases.first().expect("probe case");
    assert_eq!(probe.name, "ssh_reachable");
    assert_eq!(
        probe.outcome,
        CaseOutcome::Errored {
            message: String::from(
                "ssh connection failed (exit status 255): \
                 ssh: connect to host 127.0.0.1 port 22: Connection refused"
            ),
        }
    );
}

#[rstest]
fn failed_checks_are_recorded_and_the_suite_continues(fixture: Fixture) {
    fixture.runner.push_success();
    fixture.runner.push_success();
    fixture
        .runner
        .push_output(Some(1), "", "test: /var/lib/cloud/instance/boot-finished: missing\n");
    fixture.push_passes(BUILT_IN_CHECKS.len() - 3);

    fixture.suite(false).run_tests(&fixture.sink).expect("suite completes");

    assert_eq!(fixture.runner.invocations().len(), BUILT_IN_CHECKS.len());
    let failed: Vec<_> = fixture
        .cases()
        .into_iter()
        .filter(|case| case.outcome != CaseOutcome::Passed)
        .collect();
    assert_eq!(failed.len(), 1);
    let case = failed.first().expect("one failure");
    assert_eq!(case.name, "cloud_init_finished");
    assert_eq!(
        case.outcome,
        CaseOutcome::Failed {
            message: String::from(
                "exit status 1: test: /var/lib/cloud/instance/boot-finished: missing"
            ),
        }
    );
}

#[rstest]
fn spawn_failures_are_recorded_before_returning(fixture: Fixture) {
    let err = fixture
        .suite(false)
        .run_tests(&fixture.sink)
        .expect_err("no scripted response");

    assert!(matches!(err, RemoteExecutionError::Spawn { .. }));
    let cases = fixture.cases();
    assert_eq!(cases.len(), 1);
    assert!(matches!(
        cases.first().map(|case| &case.outcome),
        Some(CaseOutcome::Errored { .. })
    ));
}

#[rstest]
fn debug_mode_keeps_remote_output(fixture: Fixture) {
    fixture.runner.push_success();
    fixture
        .runner
        .push_output(Some(0), "Ubuntu 24.04 LTS\n", "");
    fixture.push_passes(BUILT_IN_CHECKS.len() - 2);

    fixture.suite(true).run_tests(&fixture.sink).expect("suite passes");

    let cases = fixture.cases();
    let os_release = cases.get(1).expect("second case");
    assert_eq!(os_release.stdout.as_deref(), Some("Ubuntu 24.04 LTS\n"));
    assert_eq!(os_release.stderr.as_deref(), Some(""));
}

#[rstest]
#[case(Some(0), "", "", CaseOutcome::Passed)]
#[case(
    Some(2),
    "partial\nlast stdout\n",
    "",
    CaseOutcome::Failed { message: String::from("exit status 2: last stdout") }
)]
#[case(
    Some(3),
    "",
    "",
    CaseOutcome::Failed { message: String::from("exit status 3") }
)]
#[case(
    None,
    "",
    "killed\n\n",
    CaseOutcome::Errored { message: String::from("terminated without an exit status: killed") }
)]
fn exit_status_maps_to_outcome(
    #[case] code: Option<i32>,
    #[case] stdout: &str,
    #[case] stderr: &str,
    #[case] expected: CaseOutcome,
) {
    let output = CommandOutput {
        code,
        stdout: stdout.to_owned(),
        stderr: stderr.to_owned(),
    };
    assert_eq!(classify(&output), expected);
}
