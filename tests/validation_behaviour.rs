//! Behavioural scenarios for the validation run lifecycle.

mod validation;
