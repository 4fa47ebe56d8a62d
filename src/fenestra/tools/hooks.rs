//! Host side of consolidation: decides whether a lifecycle event may run the
//! engine on a document, keeps concurrent passes on one instance apart, and
//! swaps the child table when the engine reports merged lines.

use std::fmt;

use tracing::{debug, info, instrument};

use crate::fenestra::tools::config::CallSiteTable;
use crate::fenestra::tools::consolidate::{Consolidation, consolidate};
use crate::fenestra::tools::error::Result;
use crate::fenestra::tools::guard::GuardRegistry;
use crate::fenestra::tools::model::{Document, Line};

/// Document lifecycle events that trigger consolidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The form was loaded or refreshed.
    Load,
    /// The document is being validated before save.
    Validate,
    /// Rows were appended by a bulk import.
    AfterBulkImport,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleEvent::Load => write!(f, "load"),
            LifecycleEvent::Validate => write!(f, "validate"),
            LifecycleEvent::AfterBulkImport => write!(f, "after_bulk_import"),
        }
    }
}

/// Which documents may be consolidated at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConsolidationPolicy {
    /// Only documents still in draft.
    #[default]
    DraftOnly,
    /// Every document regardless of state.
    Always,
}

impl ConsolidationPolicy {
    pub fn allows(&self, document: &Document) -> bool {
        match self {
            ConsolidationPolicy::DraftOnly => document.is_draft(),
            ConsolidationPolicy::Always => true,
        }
    }
}

/// Why a lifecycle event left the document alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The policy rejected the document's state.
    Finalized,
    /// Another pass on the same instance is still running.
    InProgress,
}

/// Result of firing a lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    Skipped(SkipReason),
    /// The child table had no duplicates.
    Unchanged,
    /// The child table was replaced and the document refreshed.
    Replaced { before: usize, after: usize },
}

/// Lifecycle hook wiring the call-site table, the guard registry and the
/// policy together.
#[derive(Debug, Clone, Default)]
pub struct ConsolidationHook {
    table: CallSiteTable,
    registry: GuardRegistry,
    policy: ConsolidationPolicy,
}

impl ConsolidationHook {
    pub fn new(table: CallSiteTable, policy: ConsolidationPolicy) -> Self {
        Self {
            table,
            registry: GuardRegistry::new(),
            policy,
        }
    }

    /// Shares `registry` with other hooks acting on the same documents.
    pub fn with_registry(mut self, registry: GuardRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &GuardRegistry {
        &self.registry
    }

    pub fn table(&self) -> &CallSiteTable {
        &self.table
    }

    /// Fires `event` on `document` without a refresh step.
    pub fn fire(&self, document: &mut Document, event: LifecycleEvent) -> Result<HookOutcome> {
        self.fire_with_refresh(document, event, |_| Ok(()))
    }

    /// Fires `event` on `document`. When the child table is replaced,
    /// `refresh` runs while the instance is still marked busy, so events it
    /// triggers on the same document are skipped.
    #[instrument(
        level = "debug",
        skip_all,
        fields(doctype = %document.doctype, instance = %document.instance(), %event)
    )]
    pub fn fire_with_refresh<F>(
        &self,
        document: &mut Document,
        event: LifecycleEvent,
        refresh: F,
    ) -> Result<HookOutcome>
    where
        F: FnOnce(&mut Document) -> Result<()>,
    {
        if !self.policy.allows(document) {
            debug!(docstatus = ?document.docstatus, "document is finalized");
            return Ok(HookOutcome::Skipped(SkipReason::Finalized));
        }

        let Some(_token) = self.registry.try_acquire(document.instance()) else {
            debug!("consolidation already running for this instance");
            return Ok(HookOutcome::Skipped(SkipReason::InProgress));
        };

        let call_site = self.table.require(&document.doctype)?;
        let snapshot: Vec<Line> = document
            .child_table(&call_site.child_table)?
            .iter()
            .filter(|line| !line.is_empty())
            .cloned()
            .collect();

        match consolidate(&snapshot, &call_site.config) {
            Consolidation::Unchanged => Ok(HookOutcome::Unchanged),
            Consolidation::Consolidated(lines) => {
                let before = snapshot.len();
                let after = lines.len();
                document.replace_child_table(&call_site.child_table, lines);
                info!(
                    table = %call_site.child_table,
                    before,
                    after,
                    "merged duplicate lines"
                );
                refresh(document)?;
                Ok(HookOutcome::Replaced { before, after })
            }
        }
    }
}
