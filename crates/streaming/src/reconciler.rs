use std::collections::BTreeMap;

use foundation::{ResourceId, SourceLocation};
use runtime::Pass;

use crate::control::LoadError;
use crate::ledger::Ledger;
use crate::request::LoadTicket;
use crate::residency::Residency;
use crate::selection::SelectionSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unload {
    pub location: SourceLocation,
    pub resource_id: ResourceId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Load {
    pub ticket: LoadTicket,
    pub location: SourceLocation,
}

/// Operations one pass wants executed against the control.
///
/// Unloads must be issued before loads. The ledger already reflects the
/// unloads by the time the plan is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub pass: Pass,
    pub unloads: Vec<Unload>,
    pub loads: Vec<Load>,
}

impl Plan {
    fn empty(pass: Pass) -> Self {
        Self {
            pass,
            unloads: Vec::new(),
            loads: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.unloads.is_empty() && self.loads.is_empty()
    }
}

/// Outcome of feeding a finished load back into the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Location is still desired; the ledger now records it.
    Inserted {
        location: SourceLocation,
        resource_id: ResourceId,
    },
    /// Location was deselected while loading. The caller must unload
    /// `resource_id` right away; the ledger never saw it.
    Stale {
        location: SourceLocation,
        resource_id: ResourceId,
    },
    /// Nothing recorded; the location is eligible for the next pass again.
    Failed {
        location: SourceLocation,
        error: LoadError,
    },
    /// The ticket was not in flight. Any resource that came back with it
    /// must be unloaded.
    Unknown {
        ticket: LoadTicket,
        resource_id: Option<ResourceId>,
    },
}

/// Converges the ledger (actual state) towards a selection (desired state).
///
/// This is sans-IO: [`Reconciler::reconcile`] computes the minimal plan and
/// applies its bookkeeping, while the caller talks to the control and reports
/// finished loads through [`Reconciler::complete_load`].
#[derive(Debug, Default)]
pub struct Reconciler {
    ready: bool,
    ledger: Ledger,
    in_flight: BTreeMap<LoadTicket, SourceLocation>,
    next_ticket: u64,
    pass: Pass,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Records that the control can accept loads. Returns `false` if it already could.
    pub fn mark_ready(&mut self) -> bool {
        !std::mem::replace(&mut self.ready, true)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Last pass that ran (pass 0 means none yet).
    pub fn pass(&self) -> Pass {
        self.pass
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_loading(&self, location: &SourceLocation) -> bool {
        self.in_flight.values().any(|l| l == location)
    }

    pub fn residency(&self, location: &SourceLocation) -> Option<Residency> {
        if let Some(id) = self.ledger.get(location) {
            return Some(Residency::Resident(id.clone()));
        }
        self.in_flight
            .iter()
            .find(|(_, l)| *l == location)
            .map(|(t, _)| Residency::Loading(*t))
    }

    /// True when the ledger matches `desired` and nothing is loading.
    pub fn is_converged(&self, desired: &SelectionSet) -> bool {
        self.in_flight.is_empty()
            && self.ledger.len() == desired.len()
            && desired.iter().all(|l| self.ledger.contains(l))
    }

    /// Runs one pass against `desired`.
    ///
    /// Deselected locations leave the ledger immediately. Selected locations
    /// that are neither resident nor already loading get exactly one load.
    /// Before [`Reconciler::mark_ready`] every pass is a no-op.
    pub fn reconcile(&mut self, desired: &SelectionSet) -> Plan {
        if !self.ready {
            return Plan::empty(self.pass);
        }
        self.pass = self.pass.next();
        let mut plan = Plan::empty(self.pass);

        let to_remove: Vec<SourceLocation> = self
            .ledger
            .locations()
            .filter(|l| !desired.contains(l))
            .cloned()
            .collect();
        for location in to_remove {
            if let Some(resource_id) = self.ledger.remove(&location) {
                plan.unloads.push(Unload {
                    location,
                    resource_id,
                });
            }
        }

        for location in desired.iter() {
            if self.ledger.contains(location) || self.is_loading(location) {
                continue;
            }
            let ticket = LoadTicket(self.next_ticket);
            self.next_ticket += 1;
            self.in_flight.insert(ticket, location.clone());
            plan.loads.push(Load {
                ticket,
                location: location.clone(),
            });
        }

        plan
    }

    /// Feeds back the result of the load issued under `ticket`.
    ///
    /// `desired` is the selection at completion time, which may differ from
    /// the one the load was planned against.
    pub fn complete_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<ResourceId, LoadError>,
        desired: &SelectionSet,
    ) -> Completion {
        let Some(location) = self.in_flight.remove(&ticket) else {
            return Completion::Unknown {
                ticket,
                resource_id: result.ok(),
            };
        };

        match result {
            Err(error) => Completion::Failed { location, error },
            Ok(resource_id) => {
                if desired.contains(&location) && !self.ledger.contains(&location) {
                    self.ledger.insert(location.clone(), resource_id.clone());
                    Completion::Inserted {
                        location,
                        resource_id,
                    }
                } else {
                    Completion::Stale {
                        location,
                        resource_id,
                    }
                }
            }
        }
    }
}
