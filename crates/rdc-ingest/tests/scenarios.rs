//! End-to-end identity scenarios through the orchestrator.

mod common;

use common::{dob, ingestor, lab_order, merged, Submission};
use rdc_core::{NaturalKey, Pid};
use rdc_ingest::{IngestError, IngestOutcome};
use rdc_investigate::IssueType;
use rdc_merge::{Collection, RecordRef, RecordStatus};
use rdc_store::Transaction;

#[test]
fn scenario_a_unseen_mrn_creates_patient() {
    let ingestor = ingestor();
    let outcome = ingestor.ingest(&Submission::new("123").build(), Some("a.xml")).unwrap();

    match &outcome {
        IngestOutcome::Merged {
            pid,
            person_id,
            new_patient,
            deltas,
            flagged,
            ..
        } => {
            assert_eq!(pid.as_str(), "1000000001");
            assert_eq!(person_id.as_str(), "1");
            assert!(new_patient);
            assert!(flagged.is_none());
            // patient + one name
            assert_eq!(deltas.new.len(), 2);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(ingestor.store().snapshot().registration_count(), 1);
}

#[test]
fn scenario_b_birth_date_off_by_one_day_is_quarantined() {
    let ingestor = ingestor();
    ingestor.ingest(&Submission::new("123").build(), None).unwrap();

    let later = Submission::new("123").born(dob().succ_opt().unwrap());
    let outcome = ingestor.ingest(&later.build(), Some("b.xml")).unwrap();
    let investigation = outcome.investigation().expect("quarantined");
    assert_eq!(investigation.issue_type, IssueType::DemographicMismatch);
    assert!(investigation.blocking);
    assert!(investigation.links(&Pid::new("1000000001")));

    let attachment = investigation.attachment.as_ref().expect("document attached");
    assert_eq!(attachment.filename.as_deref(), Some("b.xml"));

    // Nothing merged: the stored birth date is still the original.
    let state = ingestor.store().snapshot();
    assert_eq!(state.registration_count(), 1);
    assert_eq!(state.document_count(), 1);
}

#[test]
fn scenario_c_corroborated_match_reuses_pid() {
    let ingestor = ingestor();
    let first = ingestor
        .ingest(&Submission::new("123").ni("9434765919").build(), None)
        .unwrap();
    let second = ingestor
        .ingest(&Submission::new("123").ni("9434765919").build(), None)
        .unwrap();

    assert_eq!(merged(&first), merged(&second));
    match second {
        IngestOutcome::Merged { new_patient, deltas, .. } => {
            assert!(!new_patient);
            assert!(deltas.is_noop());
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn scenario_d_mrn_and_ni_disagree() {
    let ingestor = ingestor();
    let a = ingestor
        .ingest(&Submission::new("123").ni("1111111111").build(), None)
        .unwrap();
    let b = ingestor
        .ingest(&Submission::new("456").ni("2222222222").build(), None)
        .unwrap();
    let (pid_a, _) = merged(&a);
    let (pid_b, _) = merged(&b);

    let outcome = ingestor
        .ingest(&Submission::new("123").ni("2222222222").build(), None)
        .unwrap();
    let investigation = outcome.investigation().expect("quarantined");
    assert_eq!(investigation.issue_type, IssueType::MrnNiMismatch);
    assert_eq!(investigation.identities.len(), 2);
    assert!(investigation.links(pid_a));
    assert!(investigation.links(pid_b));
}

#[test]
fn scenario_e_order_merged_twice_is_unchanged() {
    let ingestor = ingestor();
    let doc = Submission::new("123")
        .ni("9434765919")
        .collection("lab_orders", Collection::of(vec![lab_order("P1", "121")]))
        .build();

    let first = ingestor.ingest(&doc, None).unwrap();
    let second = ingestor.ingest(&doc, None).unwrap();
    let (pid, _) = merged(&first);
    let order = RecordRef::new("lab_order", NaturalKey::from_stored(format!("{pid}:P1")));

    let IngestOutcome::Merged { deltas: first, .. } = &first else {
        panic!("expected a merge");
    };
    assert!(first.of(RecordStatus::New).contains(&order));

    let IngestOutcome::Merged { deltas: second, .. } = &second else {
        panic!("expected a merge");
    };
    assert!(second.of(RecordStatus::Unchanged).contains(&order));
    let order_family = second
        .unchanged
        .iter()
        .filter(|r| r.key.as_str().starts_with(order.key.as_str()))
        .count();
    // the order and both result items
    assert_eq!(order_family, 3);
    assert!(second.is_noop());
}

#[test]
fn mrn_only_resubmission_cannot_be_corroborated() {
    let ingestor = ingestor();
    let first = ingestor.ingest(&Submission::new("123").build(), None).unwrap();
    let (pid, _) = merged(&first);
    let pid = pid.clone();

    let second = ingestor.ingest(&Submission::new("123").build(), None).unwrap();
    let investigation = second.investigation().expect("quarantined");
    assert_eq!(investigation.issue_type, IssueType::NiNotCorroborated);
    assert!(investigation.blocking);
    assert!(investigation.links(&pid));
    assert_eq!(second.pid(), None);
    assert_eq!(ingestor.store().snapshot().registration_count(), 1);
}

#[test]
fn submission_without_mrn_is_rejected() {
    let ingestor = ingestor();
    let mut doc = Submission::new("123").build();
    doc.header.mrn = None;
    let err = ingestor.ingest(&doc, None).unwrap_err();
    assert!(matches!(err, IngestError::Rejected(_)));
    assert_eq!(ingestor.store().snapshot().registration_count(), 0);
}

#[test]
fn ambiguous_ni_is_quarantined_without_pid() {
    let ingestor = ingestor();
    ingestor
        .ingest(&Submission::new("123").ni("9434765919").build(), None)
        .unwrap();
    let outcome = ingestor
        .ingest(&Submission::new("999").ni("9434765919").build(), None)
        .unwrap();
    assert_eq!(
        outcome.investigation().map(|i| i.issue_type),
        Some(IssueType::AmbiguousNi)
    );
    assert_eq!(outcome.pid(), None);
    assert_eq!(ingestor.store().snapshot().registration_count(), 1);
}

#[test]
fn open_blocker_holds_later_submissions_until_resolved() {
    let ingestor = ingestor();
    let submission = Submission::new("123").ni("9434765919");
    ingestor.ingest(&submission.build(), None).unwrap();
    let mismatch = ingestor
        .ingest(&submission.clone().born(dob().pred_opt().unwrap()).build(), None)
        .unwrap();
    let blocker = mismatch.investigation().unwrap().id;

    let held = ingestor.ingest(&submission.build(), None).unwrap();
    let held = held.investigation().expect("held by the blocker").clone();
    assert_eq!(held.issue_type, IssueType::BlockedByOpenInvestigation);
    assert!(!held.blocking);
    assert_eq!(
        held.context.get("blocking_investigations"),
        Some(&serde_json::json!([blocker.to_string()]))
    );

    let mut tx = ingestor.store().begin();
    ingestor
        .investigations()
        .resolve(&mut tx, &blocker, Some("birth date confirmed"))
        .unwrap();
    tx.commit().unwrap();

    let outcome = ingestor.reprocess(&held.id).unwrap();
    assert_eq!(outcome.pid(), Some(&Pid::new("1000000001")));

    let tx = ingestor.store().begin();
    let reprocessed = ingestor.investigations().require(&tx, &held.id).unwrap();
    assert!(reprocessed.resolved);
    assert_eq!(reprocessed.resolution_note.as_deref(), Some("reprocessed"));
}

#[test]
fn override_then_reprocess_accepts_disagreeing_ni() {
    let ingestor = ingestor();
    let a = ingestor
        .ingest(&Submission::new("123").ni("1111111111").build(), None)
        .unwrap();
    ingestor
        .ingest(&Submission::new("456").ni("2222222222").build(), None)
        .unwrap();
    let (pid_a, person_a) = merged(&a);
    let (pid_a, person_a) = (pid_a.clone(), person_a.clone());

    let quarantined = ingestor
        .ingest(&Submission::new("123").ni("2222222222").build(), Some("d.xml"))
        .unwrap();
    let id = quarantined.investigation().unwrap().id;

    let mut tx = ingestor.store().begin();
    ingestor
        .resolver()
        .record_override(&mut tx, &pid_a, "shared NHS number confirmed by trust")
        .unwrap();
    tx.commit().unwrap();

    let outcome = ingestor.reprocess(&id).unwrap();
    let (pid, person) = merged(&outcome);
    assert_eq!((pid, person), (&pid_a, &person_a));
}

#[test]
fn reprocessing_unfixed_document_quarantines_again() {
    let ingestor = ingestor();
    ingestor.ingest(&Submission::new("123").build(), None).unwrap();
    let first = ingestor
        .ingest(&Submission::new("123").born(dob().succ_opt().unwrap()).build(), None)
        .unwrap();
    let first_id = first.investigation().unwrap().id;

    let again = ingestor.reprocess(&first_id).unwrap();
    let second = again.investigation().expect("still mismatched");
    assert_eq!(second.issue_type, IssueType::DemographicMismatch);
    assert_ne!(second.id, first_id);

    let tx = ingestor.store().begin();
    let open = ingestor.investigations().list_open(&tx).unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, second.id);
}

#[test]
fn reprocess_requires_attached_document() {
    let ingestor = ingestor();
    let a = ingestor.ingest(&Submission::new("123").build(), None).unwrap();
    let (pid, person) = merged(&a);

    let mut tx = ingestor.store().begin();
    let investigation = ingestor
        .investigations()
        .open(
            &mut tx,
            IssueType::DemographicMismatch,
            &[rdc_core::PersonIdentity::new(pid.clone(), person.clone())],
            false,
            "",
        )
        .unwrap();
    tx.commit().unwrap();

    let err = ingestor.reprocess(&investigation.id).unwrap_err();
    assert!(matches!(err, IngestError::NoDocument(id) if id == investigation.id));
}
