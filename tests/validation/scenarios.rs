//! BDD scenarios for the validation run lifecycle.

use rstest_bdd_macros::scenario;

use super::test_helpers::{ValidationContext, validation_context};

#[scenario(
    path = "tests/features/validation.feature",
    name = "Validate two instances and clean up"
)]
fn scenario_validate_and_clean_up(validation_context: ValidationContext) {
    let _ = validation_context;
}

#[scenario(
    path = "tests/features/validation.feature",
    name = "Release partially provisioned instances when creation fails"
)]
fn scenario_partial_provisioning(validation_context: ValidationContext) {
    let _ = validation_context;
}

#[scenario(
    path = "tests/features/validation.feature",
    name = "Record unreachable instances without stopping the batch"
)]
fn scenario_unreachable_instance(validation_context: ValidationContext) {
    let _ = validation_context;
}

#[scenario(
    path = "tests/features/validation.feature",
    name = "Note teardown failures on the original error"
)]
fn scenario_teardown_note(validation_context: ValidationContext) {
    let _ = validation_context;
}

#[scenario(
    path = "tests/features/validation.feature",
    name = "Stop before provisioning when key generation fails"
)]
fn scenario_keygen_failure(validation_context: ValidationContext) {
    let _ = validation_context;
}
