/// Identifies one reconciliation pass.
///
/// Passes are numbered from 0 and only ever advance; events and metrics are
/// stamped with the pass that produced them so a log can be replayed in order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Pass {
    pub index: u64,
}

impl Pass {
    pub fn new(index: u64) -> Self {
        Self { index }
    }

    pub fn next(self) -> Self {
        Self::new(self.index + 1)
    }
}
