use serde::Serialize;

/// Identifies one issued load in a deterministic, stable way.
///
/// Tickets are handed out in increasing order and never reused, so a late
/// completion can always be matched to the load that produced it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LoadTicket(pub u64);

impl std::fmt::Display for LoadTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "load#{}", self.0)
    }
}
