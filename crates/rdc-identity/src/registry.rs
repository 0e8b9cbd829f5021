//! # Patient Registry
//!
//! Writes to the identity registry: registering a freshly minted pid,
//! refreshing a matched pid from its latest submission, and the person
//! administration operations that re-unite or separate feeds.
//!
//! Every operation stages into the caller's transaction.

use rdc_core::{Identifier, PatientInfo, PersonId, Pid, Timestamp};
use rdc_store::{IdentityRepository, MatchOverride, PatientRegistration};

use crate::error::IdentityError;
use crate::resolver::IdentityResolver;

impl IdentityResolver {
    /// Register a new pid for a submission.
    pub fn register<R>(
        &self,
        repo: &mut R,
        info: &PatientInfo,
        pid: Pid,
        person_id: PersonId,
    ) -> Result<PatientRegistration, IdentityError>
    where
        R: IdentityRepository + ?Sized,
    {
        let registration = PatientRegistration {
            pid,
            person_id,
            feed: info.feed.clone(),
            birth_date: info.birth_date,
            mrn: info.mrn.clone(),
            nis: info.nis.clone(),
            registered_at: Timestamp::now(),
        };
        repo.put_registration(registration.clone())?;
        tracing::info!(
            pid = %registration.pid,
            person_id = %registration.person_id,
            feed = %registration.feed,
            "patient registered"
        );
        Ok(registration)
    }

    /// Refresh a matched pid from its latest submission: the birth date is
    /// replaced and newly seen national identifiers are added.
    pub fn refresh<R>(
        &self,
        repo: &mut R,
        pid: &Pid,
        info: &PatientInfo,
    ) -> Result<PatientRegistration, IdentityError>
    where
        R: IdentityRepository + ?Sized,
    {
        let mut registration = repo
            .registration(pid)?
            .ok_or_else(|| IdentityError::UnknownPid(pid.clone()))?;
        let changed =
            registration.birth_date != info.birth_date || adds_identifiers(&registration, &info.nis);
        if changed {
            registration.birth_date = info.birth_date;
            for ni in &info.nis {
                if !registration.nis.contains(ni) {
                    registration.nis.push(ni.clone());
                }
            }
            repo.put_registration(registration.clone())?;
            tracing::debug!(pid = %pid, "registration refreshed");
        }
        Ok(registration)
    }

    /// Reassign every pid of person `from` to person `into`. Returns the
    /// moved pids.
    pub fn merge_persons<R>(
        &self,
        repo: &mut R,
        from: &PersonId,
        into: &PersonId,
    ) -> Result<Vec<Pid>, IdentityError>
    where
        R: IdentityRepository + ?Sized,
    {
        if repo.registrations_for_person(into)?.is_empty() {
            return Err(IdentityError::UnknownPerson(into.clone()));
        }
        let registrations = repo.registrations_for_person(from)?;
        if registrations.is_empty() {
            return Err(IdentityError::UnknownPerson(from.clone()));
        }
        if from == into {
            return Ok(Vec::new());
        }
        let mut moved = Vec::with_capacity(registrations.len());
        for mut registration in registrations {
            registration.person_id = into.clone();
            moved.push(registration.pid.clone());
            repo.put_registration(registration)?;
        }
        tracing::info!(from = %from, into = %into, pids = moved.len(), "persons merged");
        Ok(moved)
    }

    /// Detach a pid from its person under a freshly minted person id.
    pub fn split_person<R>(&self, repo: &mut R, pid: &Pid) -> Result<PersonId, IdentityError>
    where
        R: IdentityRepository + ?Sized,
    {
        let mut registration = repo
            .registration(pid)?
            .ok_or_else(|| IdentityError::UnknownPid(pid.clone()))?;
        let previous = registration.person_id.clone();
        let person_id = repo.mint_person_id()?;
        registration.person_id = person_id.clone();
        repo.put_registration(registration)?;
        tracing::info!(pid = %pid, from = %previous, into = %person_id, "person split");
        Ok(person_id)
    }

    /// Permit the NI matches of `pid` to disagree with its MRN match.
    pub fn record_override<R>(
        &self,
        repo: &mut R,
        pid: &Pid,
        reason: &str,
    ) -> Result<MatchOverride, IdentityError>
    where
        R: IdentityRepository + ?Sized,
    {
        if repo.registration(pid)?.is_none() {
            return Err(IdentityError::UnknownPid(pid.clone()));
        }
        let entry = MatchOverride {
            pid: pid.clone(),
            reason: reason.to_string(),
            recorded_at: Timestamp::now(),
        };
        repo.put_match_override(entry.clone())?;
        tracing::info!(pid = %pid, reason, "match override recorded");
        Ok(entry)
    }
}

/// Whether `nis` adds anything to what `registration` already carries.
pub fn adds_identifiers(registration: &PatientRegistration, nis: &[Identifier]) -> bool {
    nis.iter().any(|ni| !registration.nis.contains(ni))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rdc_core::FeedScope;
    use rdc_store::{MemoryRepository, Transaction};

    fn info(facility: &str, mrn: &str, nis: &[&str]) -> PatientInfo {
        PatientInfo {
            feed: FeedScope::new(facility, "PV"),
            channel: None,
            schema_version: None,
            birth_date: NaiveDate::from_ymd_opt(1990, 2, 28).unwrap(),
            mrn: Identifier::new(mrn, "LOCAL"),
            nis: nis.iter().map(|n| Identifier::new(*n, "NHS")).collect(),
        }
    }

    #[test]
    fn refresh_unions_identifiers() {
        let repo = MemoryRepository::new();
        let resolver = IdentityResolver::default();
        let mut tx = repo.begin();
        let pid = tx.mint_pid().unwrap();
        let person = tx.mint_person_id().unwrap();
        let reg = resolver
            .register(&mut tx, &info("RXX", "1", &["111"]), pid.clone(), person)
            .unwrap();
        assert!(adds_identifiers(&reg, &[Identifier::new("222", "NHS")]));
        let reg = resolver
            .refresh(&mut tx, &pid, &info("RXX", "1", &["222", "111"]))
            .unwrap();
        assert_eq!(reg.nis.len(), 2);
        assert!(!adds_identifiers(&reg, &[Identifier::new("222", "NHS")]));
    }

    #[test]
    fn merge_then_split() {
        let repo = MemoryRepository::new();
        let resolver = IdentityResolver::default();
        let mut tx = repo.begin();
        let a = tx.mint_pid().unwrap();
        let b = tx.mint_pid().unwrap();
        let u1 = tx.mint_person_id().unwrap();
        let u2 = tx.mint_person_id().unwrap();
        resolver.register(&mut tx, &info("RXX", "1", &[]), a.clone(), u1.clone()).unwrap();
        resolver.register(&mut tx, &info("RYY", "2", &[]), b.clone(), u2.clone()).unwrap();
        tx.commit().unwrap();

        let mut tx = repo.begin();
        let moved = resolver.merge_persons(&mut tx, &u2, &u1).unwrap();
        assert_eq!(moved, vec![b.clone()]);
        assert_eq!(tx.registrations_for_person(&u1).unwrap().len(), 2);

        let fresh = resolver.split_person(&mut tx, &b).unwrap();
        assert_ne!(fresh, u1);
        assert_eq!(tx.registration(&b).unwrap().unwrap().person_id, fresh);
        tx.commit().unwrap();
        assert_eq!(repo.snapshot().registration_count(), 2);
    }

    #[test]
    fn unknown_persons_and_pids_are_errors() {
        let repo = MemoryRepository::new();
        let resolver = IdentityResolver::default();
        let mut tx = repo.begin();
        assert!(matches!(
            resolver.merge_persons(&mut tx, &PersonId::new("X"), &PersonId::new("Y")),
            Err(IdentityError::UnknownPerson(_))
        ));
        assert!(matches!(
            resolver.split_person(&mut tx, &Pid::new("nope")),
            Err(IdentityError::UnknownPid(_))
        ));
        assert!(resolver.record_override(&mut tx, &Pid::new("nope"), "r").is_err());
    }
}
