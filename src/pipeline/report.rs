use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write as _;
use tracing::instrument;

use crate::config::ReportConfig;
use crate::constants::{DISTRICT, NEIGHBORHOOD, TERRACES_COLLECTION};
use crate::error::Result;
use crate::storage::{DocumentStore, Filter};

/// How many neighborhoods each ranked district lists in detail.
const NEIGHBORHOODS_PER_DISTRICT: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct NeighborhoodCount {
    pub neighborhood: String,
    pub terraces: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DistrictBreakdown {
    pub district: String,
    pub neighborhood_count: usize,
    pub top_neighborhoods: Vec<NeighborhoodCount>,
}

/// Descriptive statistics over the terrace collection. Pure read; nothing
/// here mutates the store.
#[derive(Debug, Clone, Serialize)]
pub struct NeighborhoodStats {
    pub total_distinct: usize,
    pub sample_size: usize,
    pub sample_distinct: usize,
    pub districts: Vec<DistrictBreakdown>,
    pub generated_at: DateTime<Utc>,
}

/// Computes distinct-neighborhood counts (full collection and a bounded
/// sample, to surface sampling bias) plus the per-district grouping ranked
/// by distinct neighborhoods.
#[instrument(skip(store, config))]
pub async fn neighborhood_stats(
    store: &dyn DocumentStore,
    config: &ReportConfig,
) -> Result<NeighborhoodStats> {
    let total_distinct = store
        .distinct(TERRACES_COLLECTION, NEIGHBORHOOD)
        .await?
        .len();

    let sample = store
        .find(TERRACES_COLLECTION, &Filter::empty(), Some(config.sample_size))
        .await?;
    let mut sample_hoods: Vec<&Value> = Vec::new();
    for doc in &sample {
        if let Some(hood) = doc.get(NEIGHBORHOOD) {
            if !hood.is_null() && !sample_hoods.contains(&hood) {
                sample_hoods.push(hood);
            }
        }
    }

    let groups = store
        .group_count(TERRACES_COLLECTION, &[DISTRICT, NEIGHBORHOOD])
        .await?;

    let mut districts: Vec<DistrictBreakdown> = Vec::new();
    for (key, count) in groups {
        let (district, neighborhood) = match (&key[0], &key[1]) {
            (Value::String(d), Value::String(n)) => (d.clone(), n.clone()),
            // Records without both location names stay out of the ranking
            _ => continue,
        };

        let entry = NeighborhoodCount {
            neighborhood,
            terraces: count,
        };
        match districts.iter_mut().find(|b| b.district == district) {
            Some(breakdown) => breakdown.top_neighborhoods.push(entry),
            None => districts.push(DistrictBreakdown {
                district,
                neighborhood_count: 0,
                top_neighborhoods: vec![entry],
            }),
        }
    }

    for breakdown in &mut districts {
        breakdown.neighborhood_count = breakdown.top_neighborhoods.len();
        breakdown
            .top_neighborhoods
            .sort_by(|a, b| b.terraces.cmp(&a.terraces));
        breakdown.top_neighborhoods.truncate(NEIGHBORHOODS_PER_DISTRICT);
    }
    districts.sort_by(|a, b| b.neighborhood_count.cmp(&a.neighborhood_count));
    districts.truncate(config.top_districts);

    Ok(NeighborhoodStats {
        total_distinct,
        sample_size: sample.len(),
        sample_distinct: sample_hoods.len(),
        districts,
        generated_at: Utc::now(),
    })
}

impl NeighborhoodStats {
    /// Renders the report as the console text block the CLI prints.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Distinct neighborhoods: {}", self.total_distinct);
        let _ = writeln!(
            out,
            "Distinct neighborhoods in first {} records: {}",
            self.sample_size, self.sample_distinct
        );
        if self.sample_distinct < self.total_distinct {
            let _ = writeln!(
                out,
                "(sample underrepresents the collection by {} neighborhoods)",
                self.total_distinct - self.sample_distinct
            );
        }
        let _ = writeln!(out, "Top districts by distinct neighborhoods:");
        for breakdown in &self.districts {
            let _ = writeln!(
                out,
                "  {}: {} neighborhoods",
                breakdown.district, breakdown.neighborhood_count
            );
            for hood in &breakdown.top_neighborhoods {
                let _ = writeln!(out, "    - {}: {} terraces", hood.neighborhood, hood.terraces);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Document;
    use crate::storage::InMemoryDocumentStore;
    use serde_json::json;

    fn record(district: &str, neighborhood: &str) -> Document {
        let mut d = Document::new();
        d.insert(DISTRICT.to_string(), json!(district));
        d.insert(NEIGHBORHOOD.to_string(), json!(neighborhood));
        d
    }

    #[tokio::test]
    async fn bounded_sample_exposes_sampling_bias() {
        let store = InMemoryDocumentStore::new();
        let mut docs: Vec<Document> = (0..50).map(|_| record("CENTRO", "SOL")).collect();
        docs.extend((0..10).map(|_| record("CENTRO", "JUSTICIA")));
        store
            .insert_many(TERRACES_COLLECTION, docs)
            .await
            .unwrap();

        let stats = neighborhood_stats(&store, &ReportConfig::default())
            .await
            .unwrap();

        assert_eq!(stats.total_distinct, 2);
        assert_eq!(stats.sample_size, 50);
        assert_eq!(stats.sample_distinct, 1);
    }

    #[tokio::test]
    async fn districts_rank_by_distinct_neighborhoods() {
        let store = InMemoryDocumentStore::new();
        let mut docs = vec![
            record("CENTRO", "SOL"),
            record("CENTRO", "SOL"),
            record("CENTRO", "JUSTICIA"),
            record("CENTRO", "CORTES"),
            record("RETIRO", "IBIZA"),
            record("RETIRO", "JERONIMOS"),
            record("ARGANZUELA", "LEGAZPI"),
        ];
        // A record with no location names stays out of the ranking
        docs.push(Document::new());
        store.insert_many(TERRACES_COLLECTION, docs).await.unwrap();

        let stats = neighborhood_stats(&store, &ReportConfig::default())
            .await
            .unwrap();

        assert_eq!(stats.districts.len(), 3);
        assert_eq!(stats.districts[0].district, "CENTRO");
        assert_eq!(stats.districts[0].neighborhood_count, 3);
        assert_eq!(stats.districts[1].district, "RETIRO");

        // Within a district, neighborhoods order by terrace count
        assert_eq!(stats.districts[0].top_neighborhoods[0].neighborhood, "SOL");
        assert_eq!(stats.districts[0].top_neighborhoods[0].terraces, 2);
    }

    #[tokio::test]
    async fn top_n_truncates_the_ranking() {
        let store = InMemoryDocumentStore::new();
        let docs: Vec<Document> = (0..8)
            .map(|i| record(&format!("DISTRICT_{i}"), "HOOD"))
            .collect();
        store.insert_many(TERRACES_COLLECTION, docs).await.unwrap();

        let config = ReportConfig {
            sample_size: 50,
            top_districts: 5,
        };
        let stats = neighborhood_stats(&store, &config).await.unwrap();
        assert_eq!(stats.districts.len(), 5);
    }

    #[tokio::test]
    async fn render_includes_the_headline_numbers() {
        let store = InMemoryDocumentStore::new();
        store
            .insert_many(TERRACES_COLLECTION, vec![record("CENTRO", "SOL")])
            .await
            .unwrap();

        let stats = neighborhood_stats(&store, &ReportConfig::default())
            .await
            .unwrap();
        let text = stats.render();
        assert!(text.contains("Distinct neighborhoods: 1"));
        assert!(text.contains("CENTRO"));
    }
}
