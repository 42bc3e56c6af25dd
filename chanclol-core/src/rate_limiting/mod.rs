mod admission;
mod rule;

pub use admission::{AdmissionController, AdmissionState, AdmissionStateGuard, Priority};
pub use rule::{assert_valid_quota, Decision, QuotaRule};
