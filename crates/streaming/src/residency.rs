use foundation::ResourceId;
use serde::Serialize;

use crate::request::LoadTicket;

/// Where a single source location stands from the reconciler's point of view.
///
/// A location with no residency is neither loaded nor loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Residency {
    /// A load was issued and has not completed yet.
    Loading(LoadTicket),
    /// The control reported success and the ledger holds the resource id.
    Resident(ResourceId),
}
