//! # Clinical Catalogue
//!
//! Descriptors for the patient-record submissions this stack ingests.
//!
//! | Collection | Kind | Key | Deletion |
//! |---|---|---|---|
//! | `names` | `name` | `{pid}:{seq}` | full |
//! | `addresses` | `address` | `{pid}:{seq}` | full |
//! | `contact_details` | `contact_detail` | `{pid}:{seq}` | full |
//! | `family_doctor` | `family_doctor` | `{pid}` | full |
//! | `observations` | `observation` | `{pid}:{seq}` | windowed on `observed_at` |
//! | `lab_orders` | `lab_order` | `{pid}:{placerId}` | windowed on `ordered_at` |
//! | `lab_orders/*/result_items` | `result_item` | `{order}:{prePost}:{service}:{seq}` | full |
//! | `medications` | `medication` | `{pid}:{seq}` | full |
//! | `diagnoses` | `diagnosis` | `{pid}:{seq}` | full |
//! | `procedures` | `procedure` | `{pid}:{seq}` | full |
//! | `encounters` | `encounter` | `{pid}:{seq}` | full |
//! | `surveys` | `survey` | `{pid}:{seq}` | never |
//! | `surveys/*/questions` | `survey_question` | `{survey}:{seq}` | full |
//! | `surveys/*/scores` | `survey_score` | `{survey}:{seq}` | full |
//!
//! Observations and lab orders arrive as rolling extracts covering a stated
//! period; surveys are sent once and never restated.

use crate::descriptor::{Cardinality, Catalogue, DeletionPolicy, EntityDescriptor, KeyRule};
use crate::error::MergeError;

pub const PATIENT: &str = "patient";
pub const NAME: &str = "name";
pub const ADDRESS: &str = "address";
pub const CONTACT_DETAIL: &str = "contact_detail";
pub const FAMILY_DOCTOR: &str = "family_doctor";
pub const OBSERVATION: &str = "observation";
pub const LAB_ORDER: &str = "lab_order";
pub const RESULT_ITEM: &str = "result_item";
pub const MEDICATION: &str = "medication";
pub const DIAGNOSIS: &str = "diagnosis";
pub const PROCEDURE: &str = "procedure";
pub const ENCOUNTER: &str = "encounter";
pub const SURVEY: &str = "survey";
pub const SURVEY_QUESTION: &str = "survey_question";
pub const SURVEY_SCORE: &str = "survey_score";

fn windowed(column: &str) -> DeletionPolicy {
    DeletionPolicy::Windowed {
        timestamp_column: column.to_string(),
    }
}

/// The built-in clinical catalogue.
pub fn clinical_catalogue() -> Result<Catalogue, MergeError> {
    use Cardinality::{Many, Singleton};
    use DeletionPolicy::{Full, Never};

    let patient = EntityDescriptor::new(PATIENT, KeyRule::Root)
        .mandatory("birth_date", "birth_date")
        .field("death_date", "death_date")
        .field("gender", "gender")
        .field("blood_group", "blood_group")
        .field("country_of_birth", "country_of_birth")
        .coded("ethnic_group", "ethnic_group")
        .coded("occupation", "occupation")
        .coded("primary_language", "primary_language")
        .child("names", NAME, Many, Full)
        .child("addresses", ADDRESS, Many, Full)
        .child("contact_details", CONTACT_DETAIL, Many, Full)
        .child("family_doctor", FAMILY_DOCTOR, Singleton, Full)
        .child("observations", OBSERVATION, Many, windowed("observed_at"))
        .child("lab_orders", LAB_ORDER, Many, windowed("ordered_at"))
        .child("medications", MEDICATION, Many, Full)
        .child("diagnoses", DIAGNOSIS, Many, Full)
        .child("procedures", PROCEDURE, Many, Full)
        .child("encounters", ENCOUNTER, Many, Full)
        .child("surveys", SURVEY, Many, Never);

    let name = EntityDescriptor::new(NAME, KeyRule::Sequence)
        .field("use", "name_use")
        .field("prefix", "prefix")
        .mandatory("family", "family")
        .field("given", "given")
        .field("other_given_names", "other_given_names")
        .field("suffix", "suffix");

    let address = EntityDescriptor::new(ADDRESS, KeyRule::Sequence)
        .field("use", "address_use")
        .field("from_time", "from_time")
        .field("to_time", "to_time")
        .field("street", "street")
        .field("town", "town")
        .field("county", "county")
        .field("postcode", "postcode")
        .coded("country", "country");

    let contact_detail = EntityDescriptor::new(CONTACT_DETAIL, KeyRule::Sequence)
        .field("use", "contact_use")
        .mandatory("value", "value")
        .field("comments", "comments");

    let family_doctor = EntityDescriptor::new(FAMILY_DOCTOR, KeyRule::Parent)
        .field("name", "name")
        .field("gp_id", "gp_id")
        .field("gp_practice_id", "gp_practice_id")
        .field("address", "address")
        .field("email", "email")
        .field("phone", "phone");

    let observation = EntityDescriptor::new(OBSERVATION, KeyRule::Sequence)
        .mandatory("observed_at", "observed_at")
        .coded("observation", "observation")
        .field("value", "observation_value")
        .field("units", "observation_units")
        .field("pre_post", "pre_post")
        .field("comments", "comments")
        .coded("clinician", "clinician")
        .coded("entered_at", "entered_at");

    let lab_order = EntityDescriptor::new(
        LAB_ORDER,
        KeyRule::BusinessId {
            field: "placer_id".into(),
        },
    )
    .mandatory("placer_id", "placer_id")
    .field("filler_id", "filler_id")
    .field("ordered_at", "ordered_at")
    .field("specimen_collected_at", "specimen_collected_at")
    .field("specimen_received_at", "specimen_received_at")
    .field("specimen_source", "specimen_source")
    .field("status", "status")
    .field("priority", "priority")
    .coded("receiving_location", "receiving_location")
    .coded("ordered_by", "ordered_by")
    .child("result_items", RESULT_ITEM, Many, Full);

    let result_item = EntityDescriptor::new(
        RESULT_ITEM,
        KeyRule::OrderItem {
            pre_post: "pre_post".into(),
            service: "service_id".into(),
        },
    )
    .coded("service_id", "service_id")
    .field("sub_id", "sub_id")
    .field("pre_post", "pre_post")
    .field("value", "result_value")
    .field("value_type", "result_value_type")
    .field("units", "result_units")
    .field("reference_range", "reference_range")
    .field("interpretation", "interpretation_codes")
    .field("status", "status")
    .field("observed_at", "observed_at")
    .field("comments", "comments");

    let medication = EntityDescriptor::new(MEDICATION, KeyRule::Sequence)
        .field("from_time", "from_time")
        .field("to_time", "to_time")
        .coded("drug", "drug")
        .field("dose_quantity", "dose_quantity")
        .coded("dose_uom", "dose_uom")
        .field("frequency", "frequency")
        .coded("route", "route")
        .field("comments", "comments")
        .coded("prescribed_by", "prescribed_by");

    let diagnosis = EntityDescriptor::new(DIAGNOSIS, KeyRule::Sequence)
        .coded("diagnosis", "diagnosis")
        .field("diagnosis_type", "diagnosis_type")
        .field("identified_at", "identified_at")
        .field("onset_at", "onset_at")
        .field("verification_status", "verification_status")
        .field("comments", "comments")
        .coded("diagnosed_by", "diagnosed_by");

    let procedure = EntityDescriptor::new(PROCEDURE, KeyRule::Sequence)
        .coded("procedure_type", "procedure_type")
        .field("performed_at", "performed_at")
        .coded("clinician", "clinician")
        .coded("entered_at", "entered_at")
        .field("comments", "comments");

    let encounter = EntityDescriptor::new(ENCOUNTER, KeyRule::Sequence)
        .field("encounter_number", "encounter_number")
        .field("encounter_type", "encounter_type")
        .field("from_time", "from_time")
        .field("to_time", "to_time")
        .coded("admission_source", "admission_source")
        .coded("admit_reason", "admit_reason")
        .coded("discharge_reason", "discharge_reason")
        .coded("health_care_facility", "health_care_facility");

    let survey = EntityDescriptor::new(SURVEY, KeyRule::Sequence)
        .coded("survey_type", "survey_type")
        .field("survey_time", "survey_time")
        .field("entered_by", "entered_by")
        .coded("entered_at", "entered_at")
        .field("type_of_treatment", "type_of_treatment")
        .child("questions", SURVEY_QUESTION, Many, Full)
        .child("scores", SURVEY_SCORE, Many, Full);

    let survey_question = EntityDescriptor::new(SURVEY_QUESTION, KeyRule::Sequence)
        .coded("question_type", "question_type")
        .field("response", "response")
        .field("quality", "quality");

    let survey_score = EntityDescriptor::new(SURVEY_SCORE, KeyRule::Sequence)
        .mandatory("value", "score_value")
        .coded("score_type", "score_type");

    Catalogue::new(
        PATIENT,
        vec![
            patient,
            name,
            address,
            contact_detail,
            family_doctor,
            observation,
            lab_order,
            result_item,
            medication,
            diagnosis,
            procedure,
            encounter,
            survey,
            survey_question,
            survey_score,
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_and_covers_every_policy() {
        let catalogue = clinical_catalogue().unwrap();
        assert_eq!(catalogue.kinds().count(), 15);
        let root = catalogue.root().unwrap();
        let policies: Vec<&DeletionPolicy> = root.children.iter().map(|c| &c.deletion).collect();
        assert!(policies.contains(&&DeletionPolicy::Full));
        assert!(policies.contains(&&DeletionPolicy::Never));
        assert!(policies.contains(&&windowed("observed_at")));
        assert_eq!(catalogue.get(FAMILY_DOCTOR).unwrap().key, KeyRule::Parent);
    }
}
