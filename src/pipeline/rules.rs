use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::config::RuleTargets;
use crate::constants::{
    AUX_TABLES_REST, AUX_TABLES_SEASON, CAPACITY_FIELDS, CHAIRS_REST, CHAIRS_SEASON,
    CLOSE_FRI_SAT_REST, CLOSE_FRI_SAT_SEASON, CLOSE_MON_THU_REST, CLOSE_MON_THU_SEASON, DISTRICT,
    INSPECT, LOCATION_SIDEWALK, LOCATION_STATUS, LOCATION_TYPE, NEIGHBORHOOD, REVIEW,
    STATUS_CLOSED, STATUS_CODE, STATUS_OPEN, STREET, TABLES_SEASON, TERRACES_COLLECTION,
    TERRACE_STATUS, ZONE_A_COLLECTION, ZONE_B_COLLECTION,
};
use crate::domain::Review;
use crate::error::Result;
use crate::storage::{DocumentStore, Filter, Mutation, Predicate};

/// Outcome of one pass over the full rule set.
#[derive(Debug, Clone)]
pub struct TransformReport {
    pub rules_run: usize,
    pub rules_failed: usize,
    pub documents_touched: u64,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Applies the fixed ordered rule set to the terrace collection. Every rule
/// is an independent bulk update; order across rules is significant, order
/// across documents within a rule is not.
///
/// The whole set is safe to re-run except for the capacity increment in
/// rule 3, which adds again on every pass: run once per snapshot.
pub struct RuleEngine {
    store: Arc<dyn DocumentStore>,
    targets: RuleTargets,
}

impl RuleEngine {
    pub fn new(store: Arc<dyn DocumentStore>, targets: RuleTargets) -> Self {
        Self { store, targets }
    }

    /// Runs all rules in order. A failed rule is logged and reported; the
    /// remaining rules still run, there is no cross-rule rollback.
    #[instrument(skip(self))]
    pub async fn run(&self) -> TransformReport {
        let started_at = Utc::now();

        let outcomes = [
            (
                "close_designated_neighborhood",
                self.close_designated_neighborhood().await,
            ),
            (
                "flag_sidewalk_inspections",
                self.flag_sidewalk_inspections().await,
            ),
            (
                "normalize_capacity_and_boost_inspected",
                self.normalize_capacity_and_boost_inspected().await,
            ),
            ("derive_status_codes", self.derive_status_codes().await),
            (
                "cap_weekday_closing_times",
                self.cap_weekday_closing_times().await,
            ),
            (
                "shift_weekend_closing_times",
                self.shift_weekend_closing_times().await,
            ),
            ("flag_target_street", self.flag_target_street().await),
            ("annotate_open_terraces", self.annotate_open_terraces().await),
            ("extract_zones", self.extract_zones().await),
        ];

        let mut report = TransformReport {
            rules_run: outcomes.len(),
            rules_failed: 0,
            documents_touched: 0,
            errors: Vec::new(),
            started_at,
            finished_at: started_at,
        };

        for (name, outcome) in outcomes {
            match outcome {
                Ok(touched) => {
                    info!("Rule {} touched {} documents", name, touched);
                    report.documents_touched += touched;
                }
                Err(e) => {
                    error!("Rule {} failed: {}", name, e);
                    report.rules_failed += 1;
                    report.errors.push(format!("{}: {}", name, e));
                }
            }
        }

        report.finished_at = Utc::now();
        report
    }

    /// Rule 1: every venue in the designated neighborhood closes.
    async fn close_designated_neighborhood(&self) -> Result<u64> {
        let filter = Filter::all(vec![
            Predicate::Eq(DISTRICT.to_string(), json!(self.targets.closure_district)),
            Predicate::Eq(
                NEIGHBORHOOD.to_string(),
                json!(self.targets.closure_neighborhood),
            ),
        ]);
        self.store
            .update_many(
                TERRACES_COLLECTION,
                &filter,
                &[
                    Mutation::Set(LOCATION_STATUS.to_string(), json!(STATUS_CLOSED)),
                    Mutation::Set(TERRACE_STATUS.to_string(), json!(STATUS_CLOSED)),
                ],
            )
            .await
    }

    /// Rule 2: sidewalk terraces with more than 10 tables need inspection,
    /// the rest of the sidewalk terraces do not. Terraces elsewhere keep the
    /// flag undefined.
    async fn flag_sidewalk_inspections(&self) -> Result<u64> {
        let required = self
            .store
            .update_many(
                TERRACES_COLLECTION,
                &Filter::all(vec![
                    Predicate::Eq(LOCATION_TYPE.to_string(), json!(LOCATION_SIDEWALK)),
                    Predicate::Gt(TABLES_SEASON.to_string(), json!(10)),
                ]),
                &[Mutation::Set(INSPECT.to_string(), json!(true))],
            )
            .await?;

        let not_required = self
            .store
            .update_many(
                TERRACES_COLLECTION,
                &Filter::all(vec![
                    Predicate::Eq(LOCATION_TYPE.to_string(), json!(LOCATION_SIDEWALK)),
                    Predicate::Lte(TABLES_SEASON.to_string(), json!(10)),
                ]),
                &[Mutation::Set(INSPECT.to_string(), json!(false))],
            )
            .await?;

        Ok(required + not_required)
    }

    /// Rule 3: coerce every non-numeric capacity value to 0 across the whole
    /// collection, then add 2 auxiliary tables and 8 chairs (both seasons)
    /// to the terraces flagged for inspection. Normalization of all four
    /// fields must complete before the increment so a string value becomes
    /// 0 + 2, not a skipped record.
    ///
    /// The increment step is not idempotent; see the engine contract.
    async fn normalize_capacity_and_boost_inspected(&self) -> Result<u64> {
        let mut touched = 0u64;
        for field in CAPACITY_FIELDS {
            touched += self
                .store
                .update_many(
                    TERRACES_COLLECTION,
                    &Filter::all(vec![Predicate::NonNumeric(field.to_string())]),
                    &[Mutation::Set(field.to_string(), json!(0))],
                )
                .await?;
        }

        touched += self
            .store
            .update_many(
                TERRACES_COLLECTION,
                &Filter::field_eq(INSPECT, json!(true)),
                &[
                    Mutation::Inc(AUX_TABLES_SEASON.to_string(), 2),
                    Mutation::Inc(AUX_TABLES_REST.to_string(), 2),
                    Mutation::Inc(CHAIRS_SEASON.to_string(), 8),
                    Mutation::Inc(CHAIRS_REST.to_string(), 8),
                ],
            )
            .await?;

        Ok(touched)
    }

    /// Rule 4: status code for terraces not flagged for inspection, banded
    /// by in-season chair count. 10 and 20 belong to band 2.
    async fn derive_status_codes(&self) -> Result<u64> {
        let bands = [
            (
                vec![Predicate::Lt(CHAIRS_SEASON.to_string(), json!(10))],
                1,
            ),
            (
                vec![
                    Predicate::Gte(CHAIRS_SEASON.to_string(), json!(10)),
                    Predicate::Lte(CHAIRS_SEASON.to_string(), json!(20)),
                ],
                2,
            ),
            (
                vec![Predicate::Gt(CHAIRS_SEASON.to_string(), json!(20))],
                3,
            ),
        ];

        let mut touched = 0u64;
        for (mut predicates, code) in bands {
            predicates.insert(0, Predicate::Eq(INSPECT.to_string(), json!(false)));
            touched += self
                .store
                .update_many(
                    TERRACES_COLLECTION,
                    &Filter::all(predicates),
                    &[Mutation::Set(STATUS_CODE.to_string(), json!(code))],
                )
                .await?;
        }
        Ok(touched)
    }

    /// Rule 5: Monday-Thursday closing times cap at midnight. The compare is
    /// lexicographic over the fixed-width HH:MM:SS strings.
    async fn cap_weekday_closing_times(&self) -> Result<u64> {
        let mut touched = 0u64;
        for field in [CLOSE_MON_THU_SEASON, CLOSE_MON_THU_REST] {
            touched += self
                .store
                .update_many(
                    TERRACES_COLLECTION,
                    &Filter::all(vec![Predicate::Gt(field.to_string(), json!("00:00:00"))]),
                    &[Mutation::Set(field.to_string(), json!("00:00:00"))],
                )
                .await?;
        }
        Ok(touched)
    }

    /// Rule 6: Friday-Saturday closings of exactly "2:30:00" move to
    /// "2:00:00". The match is the literal non-zero-padded string from the
    /// source data; "02:30:00" is deliberately left alone (see DESIGN.md).
    async fn shift_weekend_closing_times(&self) -> Result<u64> {
        let mut touched = 0u64;
        for field in [CLOSE_FRI_SAT_SEASON, CLOSE_FRI_SAT_REST] {
            touched += self
                .store
                .update_many(
                    TERRACES_COLLECTION,
                    &Filter::field_eq(field, json!("2:30:00")),
                    &[Mutation::Set(field.to_string(), json!("2:00:00"))],
                )
                .await?;
        }
        Ok(touched)
    }

    /// Rule 7: every venue on the target street is flagged for inspection,
    /// overriding whatever rule 2 decided.
    async fn flag_target_street(&self) -> Result<u64> {
        self.store
            .update_many(
                TERRACES_COLLECTION,
                &Filter::all(vec![Predicate::MatchesCi(
                    STREET.to_string(),
                    self.targets.inspection_street.clone(),
                )]),
                &[Mutation::Set(INSPECT.to_string(), json!(true))],
            )
            .await
    }

    /// Rule 8: open terraces get the standard review annotation.
    async fn annotate_open_terraces(&self) -> Result<u64> {
        self.store
            .update_many(
                TERRACES_COLLECTION,
                &Filter::field_eq(TERRACE_STATUS, json!(STATUS_OPEN)),
                &[Mutation::Set(REVIEW.to_string(), Review::standard().to_value())],
            )
            .await
    }

    /// Rule 9: materialize the two zone collections as full overwrites of
    /// the filtered source records.
    async fn extract_zones(&self) -> Result<u64> {
        let zone_a = self
            .store
            .find(
                TERRACES_COLLECTION,
                &Filter::field_eq(DISTRICT, json!(self.targets.zone_a_district)),
                None,
            )
            .await?;
        let mut touched = self
            .store
            .replace_collection(ZONE_A_COLLECTION, zone_a)
            .await?;

        let zone_b = self
            .store
            .find(
                TERRACES_COLLECTION,
                &Filter::all(vec![
                    Predicate::Eq(DISTRICT.to_string(), json!(self.targets.zone_b_district)),
                    Predicate::Eq(
                        NEIGHBORHOOD.to_string(),
                        json!(self.targets.zone_b_neighborhood),
                    ),
                ]),
                None,
            )
            .await?;
        touched += self
            .store
            .replace_collection(ZONE_B_COLLECTION, zone_b)
            .await?;

        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Document;
    use crate::storage::InMemoryDocumentStore;
    use serde_json::Value;

    fn doc(pairs: &[(&str, Value)]) -> Document {
        let mut d = Document::new();
        for (k, v) in pairs {
            d.insert(k.to_string(), v.clone());
        }
        d
    }

    fn engine(store: Arc<InMemoryDocumentStore>) -> RuleEngine {
        RuleEngine::new(store, RuleTargets::default())
    }

    async fn seed(store: &InMemoryDocumentStore, docs: Vec<Document>) {
        store.insert_many(TERRACES_COLLECTION, docs).await.unwrap();
    }

    async fn all_docs(store: &InMemoryDocumentStore) -> Vec<Document> {
        store
            .find(TERRACES_COLLECTION, &Filter::empty(), None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn capacity_fields_collapse_to_zero_for_every_non_numeric_shape() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(
            &store,
            vec![doc(&[
                ("aux_tables_season", json!("abc")),
                ("aux_tables_rest", json!({})),
                ("chairs_season", Value::Null),
                // chairs_rest absent
            ])],
        )
        .await;

        engine(store.clone()).run().await;

        let docs = all_docs(&store).await;
        assert_eq!(docs[0]["aux_tables_season"], json!(0));
        assert_eq!(docs[0]["aux_tables_rest"], json!(0));
        assert_eq!(docs[0]["chairs_season"], json!(0));
        assert_eq!(docs[0]["chairs_rest"], json!(0));
    }

    #[tokio::test]
    async fn sidewalk_boundary_is_exclusive_at_ten_tables() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(
            &store,
            vec![
                doc(&[("location_type", json!("Sidewalk")), ("tables_season", json!(11))]),
                doc(&[("location_type", json!("Sidewalk")), ("tables_season", json!(10))]),
                doc(&[("location_type", json!("Roadway")), ("tables_season", json!(40))]),
            ],
        )
        .await;

        engine(store.clone()).run().await;

        let docs = all_docs(&store).await;
        assert_eq!(docs[0]["inspect"], json!(true));
        assert_eq!(docs[1]["inspect"], json!(false));
        // Not on a sidewalk: the flag stays undefined
        assert!(!docs[2].contains_key("inspect"));
    }

    #[tokio::test]
    async fn increments_apply_to_the_normalized_value() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(
            &store,
            vec![doc(&[
                ("location_type", json!("Sidewalk")),
                ("tables_season", json!(12)),
                // String value must become 0 before +8, not be skipped
                ("chairs_season", json!("abc")),
                ("chairs_rest", json!(4)),
                ("aux_tables_season", json!(1)),
                // aux_tables_rest absent
            ])],
        )
        .await;

        engine(store.clone()).run().await;

        let docs = all_docs(&store).await;
        assert_eq!(docs[0]["chairs_season"], json!(8));
        assert_eq!(docs[0]["chairs_rest"], json!(12));
        assert_eq!(docs[0]["aux_tables_season"], json!(3));
        assert_eq!(docs[0]["aux_tables_rest"], json!(2));
    }

    #[tokio::test]
    async fn status_code_bands_include_both_boundaries_in_two() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let sidewalk_doc = |chairs: i64| {
            doc(&[
                ("location_type", json!("Sidewalk")),
                ("tables_season", json!(2)),
                ("chairs_season", json!(chairs)),
            ])
        };
        seed(
            &store,
            vec![
                sidewalk_doc(9),
                sidewalk_doc(10),
                sidewalk_doc(20),
                sidewalk_doc(21),
            ],
        )
        .await;

        engine(store.clone()).run().await;

        let docs = all_docs(&store).await;
        assert_eq!(docs[0]["status_code"], json!(1));
        assert_eq!(docs[1]["status_code"], json!(2));
        assert_eq!(docs[2]["status_code"], json!(2));
        assert_eq!(docs[3]["status_code"], json!(3));
    }

    #[tokio::test]
    async fn unknown_inspect_gets_no_status_code() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(
            &store,
            vec![doc(&[
                ("location_type", json!("Roadway")),
                ("chairs_season", json!(5)),
            ])],
        )
        .await;

        engine(store.clone()).run().await;

        let docs = all_docs(&store).await;
        assert!(!docs[0].contains_key("status_code"));
    }

    #[tokio::test]
    async fn weekday_closings_cap_at_midnight() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(
            &store,
            vec![doc(&[
                ("close_mon_thu_season", json!("00:30:00")),
                ("close_mon_thu_rest", json!("00:00:00")),
            ])],
        )
        .await;

        engine(store.clone()).run().await;

        let docs = all_docs(&store).await;
        assert_eq!(docs[0]["close_mon_thu_season"], json!("00:00:00"));
        assert_eq!(docs[0]["close_mon_thu_rest"], json!("00:00:00"));
    }

    #[tokio::test]
    async fn weekend_shift_matches_only_the_literal_unpadded_time() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(
            &store,
            vec![
                doc(&[("close_fri_sat_season", json!("2:30:00"))]),
                // Zero-padded spelling is intentionally untouched: the rule
                // preserves the source behavior rather than an inferred intent
                doc(&[("close_fri_sat_season", json!("02:30:00"))]),
                doc(&[("close_fri_sat_rest", json!("2:30:00"))]),
            ],
        )
        .await;

        engine(store.clone()).run().await;

        let docs = all_docs(&store).await;
        assert_eq!(docs[0]["close_fri_sat_season"], json!("2:00:00"));
        assert_eq!(docs[1]["close_fri_sat_season"], json!("02:30:00"));
        assert_eq!(docs[2]["close_fri_sat_rest"], json!("2:00:00"));
    }

    #[tokio::test]
    async fn street_flag_overrides_the_sidewalk_result() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(
            &store,
            vec![doc(&[
                ("location_type", json!("Sidewalk")),
                ("tables_season", json!(4)),
                ("street", json!("Calle de Alcala")),
            ])],
        )
        .await;

        engine(store.clone()).run().await;

        let docs = all_docs(&store).await;
        assert_eq!(docs[0]["inspect"], json!(true));
    }

    #[tokio::test]
    async fn open_terraces_receive_the_standard_review() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(
            &store,
            vec![
                doc(&[("terrace_status", json!("Open"))]),
                doc(&[("terrace_status", json!("Closed"))]),
            ],
        )
        .await;

        engine(store.clone()).run().await;

        let docs = all_docs(&store).await;
        let review = &docs[0]["review"];
        assert_eq!(review["next_inspection"], json!(10));
        assert_eq!(review["score"], json!(80));
        assert!(review["comment"].is_string());
        assert!(!docs[1].contains_key("review"));
    }

    #[tokio::test]
    async fn closure_rule_needs_both_district_and_neighborhood() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(
            &store,
            vec![
                doc(&[
                    ("district", json!("SALAMANCA")),
                    ("neighborhood", json!("GUINDALERA")),
                    ("terrace_status", json!("Open")),
                ]),
                doc(&[
                    ("district", json!("CENTRO")),
                    ("neighborhood", json!("GUINDALERA")),
                    ("terrace_status", json!("Open")),
                ]),
            ],
        )
        .await;

        engine(store.clone()).run().await;

        let docs = all_docs(&store).await;
        assert_eq!(docs[0]["location_status"], json!("Closed"));
        assert_eq!(docs[0]["terrace_status"], json!("Closed"));
        assert_eq!(docs[1]["terrace_status"], json!("Open"));
    }

    #[tokio::test]
    async fn zone_collections_are_full_overwrites() {
        let store = Arc::new(InMemoryDocumentStore::new());
        // Stale contents must not survive the extraction
        store
            .insert_many(ZONE_A_COLLECTION, vec![doc(&[("stale", json!(true))])])
            .await
            .unwrap();
        seed(
            &store,
            vec![
                doc(&[("district", json!("VILLAVERDE"))]),
                doc(&[
                    ("district", json!("SALAMANCA")),
                    ("neighborhood", json!("CASTELLANA")),
                ]),
                doc(&[
                    ("district", json!("SALAMANCA")),
                    ("neighborhood", json!("GOYA")),
                ]),
            ],
        )
        .await;

        engine(store.clone()).run().await;

        let zone_a = store
            .find(ZONE_A_COLLECTION, &Filter::empty(), None)
            .await
            .unwrap();
        assert_eq!(zone_a.len(), 1);
        assert_eq!(zone_a[0]["district"], json!("VILLAVERDE"));
        assert!(!zone_a[0].contains_key("stale"));

        let zone_b = store
            .find(ZONE_B_COLLECTION, &Filter::empty(), None)
            .await
            .unwrap();
        assert_eq!(zone_b.len(), 1);
        assert_eq!(zone_b[0]["neighborhood"], json!("CASTELLANA"));
    }

    #[tokio::test]
    async fn second_run_only_moves_the_capacity_increments() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(
            &store,
            vec![
                doc(&[
                    ("location_type", json!("Sidewalk")),
                    ("tables_season", json!(15)),
                    ("chairs_season", json!(4)),
                    ("terrace_status", json!("Open")),
                    ("close_fri_sat_season", json!("2:30:00")),
                ]),
                doc(&[
                    ("location_type", json!("Sidewalk")),
                    ("tables_season", json!(3)),
                    ("chairs_season", json!(12)),
                ]),
            ],
        )
        .await;

        let engine = engine(store.clone());
        engine.run().await;
        let after_first = all_docs(&store).await;

        engine.run().await;
        let after_second = all_docs(&store).await;

        // The inspected terrace gains exactly one more round of increments
        assert_eq!(
            after_first[0]["chairs_season"].as_i64().unwrap() + 8,
            after_second[0]["chairs_season"].as_i64().unwrap()
        );
        assert_eq!(
            after_first[0]["aux_tables_rest"].as_i64().unwrap() + 2,
            after_second[0]["aux_tables_rest"].as_i64().unwrap()
        );

        // Everything else is a fixpoint: the uninspected document is
        // byte-identical, and the inspected one only differs in capacity
        assert_eq!(after_first[1], after_second[1]);
        let mut first = after_first[0].clone();
        let mut second = after_second[0].clone();
        for field in CAPACITY_FIELDS {
            first.remove(field);
            second.remove(field);
        }
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn report_counts_rules_and_touched_documents() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(
            &store,
            vec![doc(&[
                ("location_type", json!("Sidewalk")),
                ("tables_season", json!(15)),
            ])],
        )
        .await;

        let report = engine(store).run().await;
        assert_eq!(report.rules_run, 9);
        assert_eq!(report.rules_failed, 0);
        assert!(report.errors.is_empty());
        assert!(report.documents_touched > 0);
        assert!(report.finished_at >= report.started_at);
    }
}
