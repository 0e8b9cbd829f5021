//! # Identity Resolver
//!
//! Decides, for one validated submission, which persisted patient it belongs
//! to. The answer is a [`Resolution`]: a matched identity, a new patient, or
//! an investigation. A pid together with an investigation cannot be
//! expressed.
//!
//! ## Decision procedure
//!
//! MRN and NI lookups are both scoped to the submitting feed.
//!
//! 1. No MRN match and no NI match: a new patient.
//! 2. No MRN match but NI matches: the NIs point at patients the MRN does
//!    not, so the submission is ambiguous.
//! 3. More than one MRN match: ambiguous.
//! 4. The single MRN candidate's birth date must agree with the submission.
//!    Anonymized organizations are checked to the year and skip step 5.
//! 5. At least one NI match is required, and the NI matches must name the
//!    candidate and nothing else, unless a match override exists for it.
//! 6. An unresolved blocking investigation on the candidate turns the match
//!    into a fresh investigation naming the blockers.
//!
//! Investigations opened by steps 2 to 5 block later submissions for the
//! identities they link.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate};
use rdc_core::{
    FeedScope, Identifier, MatchCandidate, PatientInfo, PersonId, PersonIdentity, Pid,
};
use rdc_investigate::{Investigation, Investigations, IssueType};
use rdc_store::{IdentifierKind, IdentityRepository, IssueRepository};
use serde_json::json;

use crate::config::IdentityConfig;
use crate::error::IdentityError;

/// Outcome of resolving one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The submission belongs to an existing patient.
    Matched {
        /// Feed-scoped patient id.
        pid: Pid,
        /// Cross-feed person id.
        person_id: PersonId,
    },
    /// No persisted patient matches; a new pid is to be minted.
    NewPatient,
    /// The match is unsafe; the submission is quarantined under this
    /// investigation.
    Issue(Investigation),
}

impl Resolution {
    /// The matched identity, if any.
    pub fn identity(&self) -> Option<PersonIdentity> {
        match self {
            Self::Matched { pid, person_id } => {
                Some(PersonIdentity::new(pid.clone(), person_id.clone()))
            }
            _ => None,
        }
    }

    /// The investigation, if any.
    pub fn investigation(&self) -> Option<&Investigation> {
        match self {
            Self::Issue(investigation) => Some(investigation),
            _ => None,
        }
    }
}

/// Identity resolution over a repository handle.
#[derive(Debug, Clone, Default)]
pub struct IdentityResolver {
    pub(crate) config: IdentityConfig,
    pub(crate) investigations: Investigations,
}

impl IdentityResolver {
    /// Create a resolver.
    pub fn new(config: IdentityConfig, investigations: Investigations) -> Self {
        Self {
            config,
            investigations,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    /// Patients of `feed` registered under `mrn`.
    pub fn match_by_mrn<R>(
        &self,
        repo: &R,
        feed: &FeedScope,
        mrn: &Identifier,
    ) -> Result<Vec<MatchCandidate>, IdentityError>
    where
        R: IdentityRepository + ?Sized,
    {
        Ok(repo.candidates_by_identifier(
            Some(feed),
            IdentifierKind::Mrn,
            std::slice::from_ref(mrn),
        )?)
    }

    /// Patients of `feed` carrying any of `nis`.
    pub fn match_by_ni<R>(
        &self,
        repo: &R,
        feed: &FeedScope,
        nis: &[Identifier],
    ) -> Result<Vec<MatchCandidate>, IdentityError>
    where
        R: IdentityRepository + ?Sized,
    {
        Ok(repo.candidates_by_identifier(Some(feed), IdentifierKind::National, nis)?)
    }

    /// Resolve a submission to a patient.
    ///
    /// Investigations opened here are staged in `repo`; they persist only if
    /// the caller commits.
    pub fn resolve<R>(&self, repo: &mut R, info: &PatientInfo) -> Result<Resolution, IdentityError>
    where
        R: IdentityRepository + IssueRepository + ?Sized,
    {
        let mrn_matches = self.match_by_mrn(&*repo, &info.feed, &info.mrn)?;
        let ni_matches = self.match_by_ni(&*repo, &info.feed, &info.nis)?;
        tracing::debug!(
            feed = %info.feed,
            mrn = %info.mrn.value,
            mrn_matches = mrn_matches.len(),
            ni_matches = ni_matches.len(),
            "identity candidates"
        );

        let candidate = match mrn_matches.as_slice() {
            [] if ni_matches.is_empty() => return Ok(Resolution::NewPatient),
            [] => {
                let message = format!(
                    "MRN {} is unknown in feed {} but its national identifiers match {} patient(s)",
                    info.mrn.value,
                    info.feed,
                    ni_matches.len()
                );
                return self.issue(repo, IssueType::AmbiguousNi, &ni_matches, true, message, info);
            }
            [only] => only.clone(),
            _ => {
                let message = format!(
                    "MRN {} matches {} patients in feed {}",
                    info.mrn.value,
                    mrn_matches.len(),
                    info.feed
                );
                return self.issue(repo, IssueType::AmbiguousMrn, &mrn_matches, true, message, info);
            }
        };

        let registration = repo
            .registration(&candidate.pid)?
            .ok_or_else(|| IdentityError::UnknownPid(candidate.pid.clone()))?;
        let anonymised = self.config.is_anonymised(&info.mrn.organization);

        if !birth_dates_agree(registration.birth_date, info.birth_date, anonymised) {
            let message = format!(
                "birth date {} does not match {} recorded for pid {}",
                info.birth_date, registration.birth_date, candidate.pid
            );
            return self.issue(
                repo,
                IssueType::DemographicMismatch,
                std::slice::from_ref(&candidate),
                true,
                message,
                info,
            );
        }

        if !anonymised {
            if ni_matches.is_empty() {
                let message = format!(
                    "no national identifier corroborates pid {} for MRN {}",
                    candidate.pid, info.mrn.value
                );
                return self.issue(
                    repo,
                    IssueType::NiNotCorroborated,
                    std::slice::from_ref(&candidate),
                    true,
                    message,
                    info,
                );
            }
            let ni_pids: BTreeSet<&Pid> = ni_matches.iter().map(|c| &c.pid).collect();
            let agrees = ni_pids.len() == 1 && ni_pids.contains(&candidate.pid);
            if !agrees && repo.match_override(&candidate.pid)?.is_none() {
                let mut linked: BTreeSet<MatchCandidate> = mrn_matches.iter().cloned().collect();
                linked.extend(ni_matches.iter().cloned());
                let linked: Vec<MatchCandidate> = linked.into_iter().collect();
                let message = format!(
                    "MRN {} identifies pid {} but national identifiers identify {}",
                    info.mrn.value,
                    candidate.pid,
                    join_pids(ni_pids.into_iter())
                );
                return self.issue(repo, IssueType::MrnNiMismatch, &linked, true, message, info);
            }
        }

        self.gate(repo, candidate, info)
    }

    /// Step 6: hold the match back while a blocking investigation is open.
    fn gate<R>(
        &self,
        repo: &mut R,
        candidate: MatchCandidate,
        info: &PatientInfo,
    ) -> Result<Resolution, IdentityError>
    where
        R: IdentityRepository + IssueRepository + ?Sized,
    {
        let blockers = self.investigations.open_blocking_for(&*repo, &candidate.pid)?;
        if blockers.is_empty() {
            tracing::debug!(pid = %candidate.pid, person_id = %candidate.person_id, "identity matched");
            return Ok(Resolution::Matched {
                pid: candidate.pid,
                person_id: candidate.person_id,
            });
        }

        let ids: Vec<String> = blockers.iter().map(|b| b.id.to_string()).collect();
        let mut context = submission_context(info);
        context.insert("blocking_investigations".to_string(), json!(ids));
        let message = format!(
            "pid {} is held by {} open investigation(s): {}",
            candidate.pid,
            ids.len(),
            ids.join(", ")
        );
        let investigation = self.investigations.open_with_context(
            repo,
            IssueType::BlockedByOpenInvestigation,
            std::slice::from_ref(&candidate),
            false,
            message,
            context,
        )?;
        Ok(Resolution::Issue(investigation))
    }

    fn issue<R>(
        &self,
        repo: &mut R,
        issue_type: IssueType,
        identities: &[MatchCandidate],
        blocking: bool,
        message: String,
        info: &PatientInfo,
    ) -> Result<Resolution, IdentityError>
    where
        R: IssueRepository + ?Sized,
    {
        let investigation = self.investigations.open_with_context(
            repo,
            issue_type,
            identities,
            blocking,
            message,
            submission_context(info),
        )?;
        Ok(Resolution::Issue(investigation))
    }
}

/// Birth dates agree exactly, or to the year for anonymized submissions.
pub(crate) fn birth_dates_agree(persisted: NaiveDate, incoming: NaiveDate, year_only: bool) -> bool {
    if year_only {
        persisted.year() == incoming.year()
    } else {
        persisted == incoming
    }
}

/// Identifying metadata recorded on every investigation the resolver opens.
pub(crate) fn submission_context(info: &PatientInfo) -> BTreeMap<String, serde_json::Value> {
    let mut context = BTreeMap::new();
    context.insert("facility".to_string(), json!(info.feed.facility));
    context.insert("extract".to_string(), json!(info.feed.extract));
    context.insert("mrn".to_string(), json!(info.mrn.to_string()));
    context.insert(
        "national_identifiers".to_string(),
        json!(info.nis.iter().map(Identifier::to_string).collect::<Vec<_>>()),
    );
    context.insert("birth_date".to_string(), json!(info.birth_date.to_string()));
    context
}

fn join_pids<'a>(pids: impl Iterator<Item = &'a Pid>) -> String {
    pids.map(Pid::as_str).collect::<Vec<_>>().join(", ")
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use rdc_core::Timestamp;
    use rdc_store::{MemoryRepository, PatientRegistration, Transaction};

    proptest! {
        /// Whatever the registry holds, a resolution never carries both an
        /// identity and an investigation, and an investigation always links
        /// at least one identity.
        #[test]
        fn resolution_is_tri_state(
            regs in proptest::collection::vec((0u8..3, 0u8..3, 0i64..3), 0..6),
            mrn in 0u8..3,
            ni in proptest::option::of(0u8..3),
            day in 0i64..3,
        ) {
            let base = NaiveDate::from_ymd_opt(1980, 1, 1).unwrap();
            let repo = MemoryRepository::new();
            let mut tx = repo.begin();
            for (i, (m, n, d)) in regs.iter().enumerate() {
                tx.put_registration(PatientRegistration {
                    pid: Pid::new(format!("P{i}")),
                    person_id: PersonId::new(format!("U{i}")),
                    feed: FeedScope::new("F", "E"),
                    birth_date: base + chrono::Duration::days(*d),
                    mrn: Identifier::new(m.to_string(), "LOCAL"),
                    nis: vec![Identifier::new(n.to_string(), "NHS")],
                    registered_at: Timestamp::now(),
                }).unwrap();
            }
            tx.commit().unwrap();

            let info = PatientInfo {
                feed: FeedScope::new("F", "E"),
                channel: None,
                schema_version: None,
                birth_date: base + chrono::Duration::days(day),
                mrn: Identifier::new(mrn.to_string(), "LOCAL"),
                nis: ni.map(|n| vec![Identifier::new(n.to_string(), "NHS")]).unwrap_or_default(),
            };
            let mut tx = repo.begin();
            let resolution = IdentityResolver::default().resolve(&mut tx, &info).unwrap();
            match &resolution {
                Resolution::Matched { .. } => prop_assert!(resolution.investigation().is_none()),
                Resolution::NewPatient => prop_assert!(resolution.identity().is_none()),
                Resolution::Issue(inv) => {
                    prop_assert!(resolution.identity().is_none());
                    prop_assert!(!inv.identities.is_empty());
                }
            }
        }
    }
}
