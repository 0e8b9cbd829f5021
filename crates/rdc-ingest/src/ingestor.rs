//! # Ingest One Document
//!
//! [`Ingestor::ingest`] takes a parsed submission from validation to commit:
//!
//! 1. Validate the identifying header; submissions without an MRN or birth
//!    date are rejected before matching.
//! 2. Lock every identifier the submission carries.
//! 3. Resolve the identity inside a fresh transaction.
//! 4. An unresolved identity quarantines the document: it is attached to the
//!    investigation and only the investigation is committed.
//! 5. A new patient is searched for in other feeds, minted and registered.
//! 6. A matched patient's registration is refreshed.
//! 7. The patient tree is merged, staged and committed.
//!
//! Any error drops the transaction, which discards every staged write.

use std::collections::BTreeMap;

use rdc_core::{InvestigationId, PatientInfo, PersonId, PersonIdentity, Pid, Timestamp};
use rdc_identity::{IdentityResolver, Resolution};
use rdc_investigate::{Investigation, Investigations};
use rdc_merge::{Deltas, IncomingDocument, MergeWarning, Merger, RecordStatus};
use rdc_store::{IdentityRepository, Transaction, TransactionalStore};

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::locks::IdentityLocks;

const DOCUMENTS_TOTAL: &str = "rdc_ingest_documents_total";
const RECORDS_TOTAL: &str = "rdc_merge_records_total";

/// What happened to an ingested document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The document was merged into the patient's records.
    Merged {
        /// Feed-scoped patient id.
        pid: Pid,
        /// Cross-feed person id.
        person_id: PersonId,
        /// Whether the pid was minted by this ingest.
        new_patient: bool,
        /// Per-record changes.
        deltas: Deltas,
        /// Data problems the merge tolerated.
        warnings: Vec<MergeWarning>,
        /// A non-blocking cross-feed investigation opened for the new pid.
        flagged: Option<Investigation>,
    },
    /// Identity could not be resolved; the document is held by an
    /// investigation and nothing was merged.
    Quarantined {
        /// The investigation holding the document.
        investigation: Investigation,
    },
}

impl IngestOutcome {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Merged { .. } => "merged",
            Self::Quarantined { .. } => "quarantined",
        }
    }

    /// The pid the document was merged into.
    pub fn pid(&self) -> Option<&Pid> {
        match self {
            Self::Merged { pid, .. } => Some(pid),
            Self::Quarantined { .. } => None,
        }
    }

    /// The quarantining investigation.
    pub fn investigation(&self) -> Option<&Investigation> {
        match self {
            Self::Merged { .. } => None,
            Self::Quarantined { investigation } => Some(investigation),
        }
    }
}

/// The orchestrator.
#[derive(Debug)]
pub struct Ingestor<S: TransactionalStore> {
    store: S,
    resolver: IdentityResolver,
    investigations: Investigations,
    merger: Merger,
    locks: IdentityLocks,
}

impl<S: TransactionalStore> Ingestor<S> {
    /// Build an orchestrator over `store`.
    pub fn new(store: S, config: &IngestConfig) -> Result<Self, IngestError> {
        let investigations = Investigations::new(config.investigation_config());
        Ok(Self {
            resolver: IdentityResolver::new(config.identity_config(), investigations.clone()),
            merger: Merger::new(config.catalogue()?, config.reference_zone()?),
            investigations,
            store,
            locks: IdentityLocks::new(),
        })
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The identity engine.
    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    /// The investigation service.
    pub fn investigations(&self) -> &Investigations {
        &self.investigations
    }

    /// The merge engine.
    pub fn merger(&self) -> &Merger {
        &self.merger
    }

    /// Ingest one document.
    pub fn ingest(
        &self,
        document: &IncomingDocument,
        filename: Option<&str>,
    ) -> Result<IngestOutcome, IngestError> {
        self.run(document, filename, None)
    }

    /// Re-ingest the document held by an investigation.
    ///
    /// The investigation is resolved in the same transaction as the
    /// re-ingest: if the re-ingest fails, it stays open.
    pub fn reprocess(&self, id: &InvestigationId) -> Result<IngestOutcome, IngestError> {
        let (document, filename) = {
            let tx = self.store.begin();
            let investigation = self.investigations.require(&tx, id)?;
            let raw = self
                .investigations
                .document_for(&tx, id)?
                .ok_or(IngestError::NoDocument(*id))?;
            tx.rollback();
            let document: IncomingDocument = serde_json::from_value(raw)?;
            (document, investigation.attachment.and_then(|a| a.filename))
        };
        tracing::info!(investigation = %id, "reprocessing quarantined document");
        self.run(&document, filename.as_deref(), Some(id))
    }

    fn run(
        &self,
        document: &IncomingDocument,
        filename: Option<&str>,
        reprocessing: Option<&InvestigationId>,
    ) -> Result<IngestOutcome, IngestError> {
        let result = PatientInfo::from_header(&document.header)
            .map_err(|e| IngestError::Rejected(e.to_string()))
            .and_then(|info| {
                let keys = IdentityLocks::keys_for(&info);
                self.locks.with_locks(&keys, || {
                    self.run_locked(&info, document, filename, reprocessing)
                })
            });

        match &result {
            Ok(outcome) => record_outcome(outcome, filename),
            Err(e) => {
                metrics::counter!(DOCUMENTS_TOTAL, "outcome" => e.label()).increment(1);
                tracing::warn!(filename = filename.unwrap_or("-"), error = %e, "ingest failed");
            }
        }
        result
    }

    fn run_locked(
        &self,
        info: &PatientInfo,
        document: &IncomingDocument,
        filename: Option<&str>,
        reprocessing: Option<&InvestigationId>,
    ) -> Result<IngestOutcome, IngestError> {
        let mut tx = self.store.begin();
        match self.process(&mut tx, info, document, filename, reprocessing) {
            Ok(outcome) => {
                let summary = tx.commit()?;
                tracing::debug!(
                    records_written = summary.records_written,
                    records_deleted = summary.records_deleted,
                    "ingest committed"
                );
                Ok(outcome)
            }
            Err(e) => {
                tx.rollback();
                Err(e)
            }
        }
    }

    fn process(
        &self,
        tx: &mut S::Tx,
        info: &PatientInfo,
        document: &IncomingDocument,
        filename: Option<&str>,
        reprocessing: Option<&InvestigationId>,
    ) -> Result<IngestOutcome, IngestError> {
        if let Some(id) = reprocessing {
            self.investigations.resolve(tx, id, Some("reprocessed"))?;
        }
        let raw = serde_json::to_value(document)?;

        let (pid, person_id, new_patient, flagged) = match self.resolver.resolve(tx, info)? {
            Resolution::Issue(mut investigation) => {
                self.investigations.attach(
                    tx,
                    &mut investigation,
                    &raw,
                    filename,
                    attachment_metadata(info),
                )?;
                return Ok(IngestOutcome::Quarantined { investigation });
            }
            Resolution::NewPatient => {
                let across = self.resolver.resolve_across_store(tx, info)?;
                let pid = tx.mint_pid()?;
                let person_id = match across.person_id {
                    Some(person_id) => person_id,
                    None => tx.mint_person_id()?,
                };
                self.resolver.register(tx, info, pid.clone(), person_id.clone())?;
                let flagged = match across.investigation {
                    Some(mut investigation) => {
                        let identity = PersonIdentity::new(pid.clone(), person_id.clone());
                        self.investigations.link_later(tx, &mut investigation, &[identity])?;
                        self.investigations.attach(
                            tx,
                            &mut investigation,
                            &raw,
                            filename,
                            attachment_metadata(info),
                        )?;
                        Some(investigation)
                    }
                    None => None,
                };
                (pid, person_id, true, flagged)
            }
            Resolution::Matched { pid, person_id } => {
                self.resolver.refresh(tx, &pid, info)?;
                (pid, person_id, false, None)
            }
        };

        let plan = self
            .merger
            .merge(&*tx, &pid, &document.patient, Timestamp::now())?;
        let staged = plan.stage(tx)?;
        tracing::debug!(
            pid = %pid,
            written = staged.written,
            deleted = staged.deleted,
            "merge staged"
        );

        Ok(IngestOutcome::Merged {
            pid,
            person_id,
            new_patient,
            deltas: plan.deltas(),
            warnings: plan.warnings().to_vec(),
            flagged,
        })
    }
}

/// Submission metadata recorded with an attached document.
fn attachment_metadata(info: &PatientInfo) -> BTreeMap<String, serde_json::Value> {
    let mut metadata = BTreeMap::new();
    metadata.insert("facility".into(), info.feed.facility.clone().into());
    metadata.insert("extract".into(), info.feed.extract.clone().into());
    if let Some(channel) = &info.channel {
        metadata.insert("channel".into(), channel.clone().into());
    }
    if let Some(version) = &info.schema_version {
        metadata.insert("schema_version".into(), version.clone().into());
    }
    metadata.insert("received_at".into(), Timestamp::now().to_iso8601().into());
    metadata
}

fn record_outcome(outcome: &IngestOutcome, filename: Option<&str>) {
    metrics::counter!(DOCUMENTS_TOTAL, "outcome" => outcome.label()).increment(1);
    match outcome {
        IngestOutcome::Merged {
            pid,
            person_id,
            new_patient,
            deltas,
            warnings,
            ..
        } => {
            for status in [
                RecordStatus::New,
                RecordStatus::Modified,
                RecordStatus::Unchanged,
                RecordStatus::Deleted,
            ] {
                let count = deltas.of(status).len() as u64;
                metrics::counter!(RECORDS_TOTAL, "status" => status.as_str()).increment(count);
            }
            tracing::info!(
                filename = filename.unwrap_or("-"),
                pid = %pid,
                person_id = %person_id,
                new_patient,
                deltas = %deltas.counts(),
                warnings = warnings.len(),
                "document merged"
            );
        }
        IngestOutcome::Quarantined { investigation } => {
            tracing::info!(
                filename = filename.unwrap_or("-"),
                investigation = %investigation.id,
                issue_type = %investigation.issue_type,
                "document quarantined"
            );
        }
    }
}
