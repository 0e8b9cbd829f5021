//! Shared fixtures for orchestrator tests.

#![allow(dead_code)]

use chrono::{DateTime, FixedOffset, NaiveDate};
use rdc_core::{Identifier, SubmissionHeader};
use rdc_ingest::{IngestConfig, IngestOutcome, Ingestor};
use rdc_merge::{Collection, IncomingDocument, Leaf, Node};
use rdc_store::MemoryRepository;

pub fn ingestor() -> Ingestor<MemoryRepository> {
    Ingestor::new(MemoryRepository::new(), &IngestConfig::default()).unwrap()
}

pub fn ingestor_with(config: &IngestConfig) -> Ingestor<MemoryRepository> {
    Ingestor::new(MemoryRepository::new(), config).unwrap()
}

pub fn dob() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 5, 4).unwrap()
}

pub fn at(s: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(s).unwrap()
}

/// Builder for a submission.
#[derive(Clone)]
pub struct Submission {
    pub header: SubmissionHeader,
    pub patient: Node,
}

impl Submission {
    pub fn new(mrn: &str) -> Self {
        Self {
            header: SubmissionHeader {
                sending_facility: "RXX".into(),
                sending_extract: "PV".into(),
                channel: Some("mllp".into()),
                sent_at: Some(at("2024-06-01T12:00:00+00:00")),
                schema_version: Some("3.1".into()),
                birth_date: Some(dob()),
                mrn: Some(Identifier::new(mrn, "LOCALHOSP")),
                national_identifiers: Vec::new(),
            },
            patient: Node::new()
                .with("birth_date", Leaf::Date(dob()))
                .with("gender", Leaf::text("F"))
                .with_collection(
                    "names",
                    Collection::of(vec![Node::new()
                        .with("family", Leaf::text("Smith"))
                        .with("given", Leaf::text("Ann"))]),
                ),
        }
    }

    pub fn feed(mut self, facility: &str, extract: &str) -> Self {
        self.header.sending_facility = facility.into();
        self.header.sending_extract = extract.into();
        self
    }

    pub fn ni(mut self, value: &str) -> Self {
        self.header
            .national_identifiers
            .push(Identifier::new(value, "NHS"));
        self
    }

    pub fn born(mut self, date: NaiveDate) -> Self {
        self.header.birth_date = Some(date);
        self.patient = self.patient.with("birth_date", Leaf::Date(date));
        self
    }

    pub fn sent(mut self, when: &str) -> Self {
        self.header.sent_at = Some(at(when));
        self
    }

    pub fn collection(mut self, name: &str, collection: Collection) -> Self {
        self.patient = self.patient.with_collection(name, collection);
        self
    }

    pub fn build(&self) -> IncomingDocument {
        IncomingDocument {
            header: self.header.clone(),
            patient: self.patient.clone(),
        }
    }
}

pub fn lab_order(placer: &str, hb: &str) -> Node {
    Node::new()
        .with("placer_id", Leaf::text(placer))
        .with("ordered_at", Leaf::DateTime(at("2024-03-01T09:00:00+00:00")))
        .with_collection(
            "result_items",
            Collection::of(vec![
                Node::new()
                    .with("service_id", Leaf::coded("HB", "LOCAL", "Haemoglobin"))
                    .with("value", Leaf::text(hb)),
                Node::new()
                    .with("service_id", Leaf::coded("CRE", "LOCAL", "Creatinine"))
                    .with("pre_post", Leaf::text("PRE"))
                    .with("value", Leaf::text("540")),
            ]),
        )
}

pub fn observation(time: &str, value: &str) -> Node {
    Node::new()
        .with("observed_at", Leaf::DateTime(at(time)))
        .with("observation", Leaf::coded("BPS", "LOCAL", "Systolic BP"))
        .with("value", Leaf::decimal(value))
}

pub fn merged(outcome: &IngestOutcome) -> (&rdc_core::Pid, &rdc_core::PersonId) {
    match outcome {
        IngestOutcome::Merged { pid, person_id, .. } => (pid, person_id),
        IngestOutcome::Quarantined { investigation } => {
            panic!("expected a merge, got investigation {investigation}")
        }
    }
}
