//! Chooses the pod an operation acts on.

use tracing::debug;

use crate::backend::{ConnectionDescriptor, InstanceRecord, NotReachableError};
use crate::console::Console;

/// Picks one pod out of the running candidates, prompting when there is a
/// choice to make.
#[derive(Debug)]
pub struct TargetResolver<'a, C: Console> {
    console: &'a C,
}

impl<'a, C: Console> TargetResolver<'a, C> {
    /// Creates a resolver that prompts through `console`.
    #[must_use]
    pub const fn new(console: &'a C) -> Self {
        Self { console }
    }

    /// Resolves `candidates` to a single connection.
    ///
    /// No candidates yields `None`. A single candidate is selected without
    /// prompting. Otherwise the operator picks from a 1-indexed list; invalid
    /// or empty input selects the first candidate.
    ///
    /// # Errors
    ///
    /// Returns [`NotReachableError`] when the chosen pod has no usable
    /// control-port mapping.
    pub fn resolve(
        &self,
        candidates: &[InstanceRecord],
    ) -> Result<Option<ConnectionDescriptor>, NotReachableError> {
        let chosen = match candidates {
            [] => return Ok(None),
            [only] => only,
            [first, ..] => self.choose(first, candidates),
        };
        debug!(instance_id = %chosen.id, "target resolved");
        ConnectionDescriptor::from_record(chosen).map(Some)
    }

    fn choose<'r>(
        &self,
        first: &'r InstanceRecord,
        candidates: &'r [InstanceRecord],
    ) -> &'r InstanceRecord {
        self.console.show("Running pods:");
        for (index, record) in candidates.iter().enumerate() {
            self.console.show(&format!(
                "  [{}] {}  {}  ({})",
                index + 1,
                record.id,
                record.name,
                record.machine.gpu_name
            ));
        }

        let answer = self.console.ask("Select pod [1]: ").unwrap_or_default();
        let picked = answer
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|number| number.checked_sub(1))
            .and_then(|index| candidates.get(index));
        picked.unwrap_or_else(|| {
            self.console
                .show(&format!("No valid selection; using [1] {}", first.id));
            first
        })
    }
}
