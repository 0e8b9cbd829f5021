//! # Cross-Feed Resolution
//!
//! A submission that resolved to a new patient may still belong to a person
//! already known from other feeds. The person is searched by national
//! identifier across the whole store, and by MRN only when the MRN comes
//! from a nationally stable numbering scheme.
//!
//! Findings here never block: at worst the new pid gets a fresh person id and
//! a non-blocking investigation records why it was not united.

use std::collections::{BTreeMap, BTreeSet};

use rdc_core::{MatchCandidate, PatientInfo, PersonId};
use rdc_investigate::{Investigation, IssueType};
use rdc_store::{IdentifierKind, IdentityRepository, IssueRepository};

use crate::error::IdentityError;
use crate::resolver::{birth_dates_agree, submission_context, IdentityResolver};

/// Outcome of searching other feeds for the person behind a new pid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrossFeedResolution {
    /// The person the new pid joins, if exactly one was found and agrees.
    pub person_id: Option<PersonId>,
    /// A non-blocking investigation explaining why no person was joined.
    pub investigation: Option<Investigation>,
}

impl IdentityResolver {
    /// Find the person a new pid belongs to in other feeds.
    pub fn resolve_across_store<R>(
        &self,
        repo: &mut R,
        info: &PatientInfo,
    ) -> Result<CrossFeedResolution, IdentityError>
    where
        R: IdentityRepository + IssueRepository + ?Sized,
    {
        let mut hits: BTreeSet<MatchCandidate> = repo
            .candidates_by_identifier(None, IdentifierKind::National, &info.nis)?
            .into_iter()
            .collect();

        if self.config.is_nationally_stable(&info.mrn.organization) {
            for candidate in repo.candidates_by_identifier(
                None,
                IdentifierKind::Mrn,
                std::slice::from_ref(&info.mrn),
            )? {
                let same_scheme = repo
                    .registration(&candidate.pid)?
                    .is_some_and(|reg| reg.mrn.organization == info.mrn.organization);
                if same_scheme {
                    hits.insert(candidate);
                }
            }
        }

        let persons: BTreeSet<PersonId> = hits.iter().map(|c| c.person_id.clone()).collect();
        let hits: Vec<MatchCandidate> = hits.into_iter().collect();
        tracing::debug!(feed = %info.feed, persons = persons.len(), "cross-feed candidates");

        let mut persons = persons.into_iter();
        let person_id = match (persons.next(), persons.next()) {
            (None, _) => return Ok(CrossFeedResolution::default()),
            (Some(person_id), None) => person_id,
            (Some(_), Some(_)) => {
                let message = format!(
                    "identifiers of MRN {} match {} pids belonging to more than one person",
                    info.mrn.value,
                    hits.len()
                );
                return self.cross_feed_issue(repo, IssueType::CrossFeedAmbiguous, &hits, message, info);
            }
        };

        let anonymised = self.config.is_anonymised(&info.mrn.organization);
        let registrations = repo.registrations_for_person(&person_id)?;
        let disagreeing: Vec<MatchCandidate> = registrations
            .iter()
            .filter(|reg| !birth_dates_agree(reg.birth_date, info.birth_date, anonymised))
            .map(|reg| reg.identity())
            .collect();
        if !disagreeing.is_empty() {
            let linked: Vec<MatchCandidate> = registrations.iter().map(|r| r.identity()).collect();
            let message = format!(
                "birth date {} disagrees with {} of {} pids of person {}",
                info.birth_date,
                disagreeing.len(),
                registrations.len(),
                person_id
            );
            return self.cross_feed_issue(
                repo,
                IssueType::CrossFeedDemographicMismatch,
                &linked,
                message,
                info,
            );
        }

        tracing::debug!(person_id = %person_id, "joined person from other feeds");
        Ok(CrossFeedResolution {
            person_id: Some(person_id),
            investigation: None,
        })
    }

    fn cross_feed_issue<R>(
        &self,
        repo: &mut R,
        issue_type: IssueType,
        identities: &[MatchCandidate],
        message: String,
        info: &PatientInfo,
    ) -> Result<CrossFeedResolution, IdentityError>
    where
        R: IssueRepository + ?Sized,
    {
        let context: BTreeMap<_, _> = submission_context(info);
        let investigation = self.investigations.open_with_context(
            repo, issue_type, identities, false, message, context,
        )?;
        Ok(CrossFeedResolution {
            person_id: None,
            investigation: Some(investigation),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdentityConfig;
    use chrono::NaiveDate;
    use rdc_core::{FeedScope, Identifier, Pid, Timestamp};
    use rdc_investigate::Investigations;
    use rdc_store::{MemoryRepository, PatientRegistration, Transaction};

    fn dob() -> NaiveDate {
        NaiveDate::from_ymd_opt(1955, 11, 30).unwrap()
    }

    fn register(repo: &MemoryRepository, pid: &str, person: &str, facility: &str, mrn: Identifier, ni: &str) {
        let mut tx = repo.begin();
        tx.put_registration(PatientRegistration {
            pid: Pid::new(pid),
            person_id: PersonId::new(person),
            feed: FeedScope::new(facility, "PV"),
            birth_date: dob(),
            mrn,
            nis: vec![Identifier::new(ni, "NHS")],
            registered_at: Timestamp::now(),
        })
        .unwrap();
        tx.commit().unwrap();
    }

    fn incoming(mrn: Identifier, ni: &str) -> PatientInfo {
        PatientInfo {
            feed: FeedScope::new("RNEW", "PV"),
            channel: None,
            schema_version: None,
            birth_date: dob(),
            mrn,
            nis: vec![Identifier::new(ni, "NHS")],
        }
    }

    #[test]
    fn no_hits_is_empty() {
        let repo = MemoryRepository::new();
        let mut tx = repo.begin();
        let found = IdentityResolver::default()
            .resolve_across_store(&mut tx, &incoming(Identifier::new("1", "LOCAL"), "111"))
            .unwrap();
        assert_eq!(found, CrossFeedResolution::default());
    }

    #[test]
    fn single_person_by_ni_is_joined() {
        let repo = MemoryRepository::new();
        register(&repo, "A", "U1", "RXX", Identifier::new("9", "LOCAL"), "111");
        let mut tx = repo.begin();
        let found = IdentityResolver::default()
            .resolve_across_store(&mut tx, &incoming(Identifier::new("1", "LOCAL"), "111"))
            .unwrap();
        assert_eq!(found.person_id, Some(PersonId::new("U1")));
        assert!(found.investigation.is_none());
    }

    #[test]
    fn birth_date_disagreement_is_non_blocking_issue() {
        let repo = MemoryRepository::new();
        register(&repo, "A", "U1", "RXX", Identifier::new("9", "LOCAL"), "111");
        let mut tx = repo.begin();
        let mut info = incoming(Identifier::new("1", "LOCAL"), "111");
        info.birth_date = dob().pred_opt().unwrap();
        let found = IdentityResolver::default()
            .resolve_across_store(&mut tx, &info)
            .unwrap();
        assert_eq!(found.person_id, None);
        let investigation = found.investigation.unwrap();
        assert_eq!(investigation.issue_type, IssueType::CrossFeedDemographicMismatch);
        assert!(!investigation.blocking);
    }

    #[test]
    fn several_persons_is_ambiguous() {
        let repo = MemoryRepository::new();
        register(&repo, "A", "U1", "RXX", Identifier::new("9", "LOCAL"), "111");
        register(&repo, "B", "U2", "RYY", Identifier::new("8", "LOCAL"), "111");
        let mut tx = repo.begin();
        let found = IdentityResolver::default()
            .resolve_across_store(&mut tx, &incoming(Identifier::new("1", "LOCAL"), "111"))
            .unwrap();
        let investigation = found.investigation.unwrap();
        assert_eq!(investigation.issue_type, IssueType::CrossFeedAmbiguous);
        assert_eq!(investigation.identities.len(), 2);
    }

    #[test]
    fn mrn_searched_only_for_nationally_stable_schemes() {
        let repo = MemoryRepository::new();
        register(&repo, "A", "U1", "RXX", Identifier::new("4857773456", "CHI"), "111");
        let info = incoming(Identifier::new("4857773456", "CHI"), "222");

        let mut tx = repo.begin();
        let found = IdentityResolver::default()
            .resolve_across_store(&mut tx, &info)
            .unwrap();
        assert_eq!(found.person_id, None);

        let resolver = IdentityResolver::new(
            IdentityConfig {
                nationally_stable_identifier_types: vec!["CHI".into()],
                ..Default::default()
            },
            Investigations::default(),
        );
        let found = resolver.resolve_across_store(&mut tx, &info).unwrap();
        assert_eq!(found.person_id, Some(PersonId::new("U1")));
    }
}
