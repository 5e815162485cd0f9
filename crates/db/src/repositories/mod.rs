pub mod assignments;
pub mod attendance;
pub mod batches;
pub mod events;
pub mod ledger;
pub mod rooms;
pub mod sessions;

/// Status list as bound to a `text[]` parameter.
pub(crate) fn status_labels(statuses: &[liveclass_core::models::SessionStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}
