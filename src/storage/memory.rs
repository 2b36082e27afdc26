use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

use super::{DocumentStore, Filter, GraphStore, Mutation};
use crate::constants::ID_FIELD;
use crate::domain::{District, Document, GraphCounts, Neighborhood, Terrace, Venue};
use crate::error::Result;

/// In-memory document store for development/testing. Collections preserve
/// insertion order so bounded samples ("first N records") are deterministic.
pub struct InMemoryDocumentStore {
    collections: Arc<Mutex<HashMap<String, Vec<Document>>>>,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<u64> {
        let mut collections = self.collections.lock().unwrap();
        let target = collections.entry(collection.to_string()).or_default();

        let mut inserted = 0u64;
        for mut doc in docs {
            if !doc.contains_key(ID_FIELD) {
                doc.insert(ID_FIELD.to_string(), Value::from(Uuid::new_v4().to_string()));
            }
            target.push(doc);
            inserted += 1;
        }

        debug!("Inserted {} documents into {}", inserted, collection);
        Ok(inserted)
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let mut collections = self.collections.lock().unwrap();
        let target = collections.entry(collection.to_string()).or_default();

        let before = target.len();
        target.retain(|doc| !filter.matches(doc));
        let deleted = (before - target.len()) as u64;

        debug!("Deleted {} documents from {}", deleted, collection);
        Ok(deleted)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        mutations: &[Mutation],
    ) -> Result<u64> {
        let mut collections = self.collections.lock().unwrap();
        let target = collections.entry(collection.to_string()).or_default();

        let mut matched = 0u64;
        for doc in target.iter_mut() {
            if filter.matches(doc) {
                for mutation in mutations {
                    mutation.apply(doc);
                }
                matched += 1;
            }
        }

        debug!("Updated {} documents in {}", matched, collection);
        Ok(matched)
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<Document>> {
        let collections = self.collections.lock().unwrap();
        let source = collections.get(collection).cloned().unwrap_or_default();

        let mut found: Vec<Document> = source.into_iter().filter(|d| filter.matches(d)).collect();
        if let Some(limit) = limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let collections = self.collections.lock().unwrap();
        let count = collections
            .get(collection)
            .map(|docs| docs.iter().filter(|d| filter.matches(d)).count())
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn distinct(&self, collection: &str, field: &str) -> Result<Vec<Value>> {
        let collections = self.collections.lock().unwrap();
        let mut values: Vec<Value> = Vec::new();
        if let Some(docs) = collections.get(collection) {
            for doc in docs {
                if let Some(value) = doc.get(field) {
                    if !value.is_null() && !values.contains(value) {
                        values.push(value.clone());
                    }
                }
            }
        }
        Ok(values)
    }

    async fn group_count(
        &self,
        collection: &str,
        fields: &[&str],
    ) -> Result<Vec<(Vec<Value>, u64)>> {
        let collections = self.collections.lock().unwrap();
        let mut keys: Vec<Vec<Value>> = Vec::new();
        let mut counts: Vec<u64> = Vec::new();

        if let Some(docs) = collections.get(collection) {
            for doc in docs {
                let key: Vec<Value> = fields
                    .iter()
                    .map(|f| doc.get(*f).cloned().unwrap_or(Value::Null))
                    .collect();
                match keys.iter().position(|k| *k == key) {
                    Some(i) => counts[i] += 1,
                    None => {
                        keys.push(key);
                        counts.push(1);
                    }
                }
            }
        }

        Ok(keys.into_iter().zip(counts).collect())
    }

    async fn replace_collection(&self, collection: &str, docs: Vec<Document>) -> Result<u64> {
        let mut collections = self.collections.lock().unwrap();
        let count = docs.len() as u64;
        collections.insert(collection.to_string(), docs);

        debug!("Replaced {} with {} documents", collection, count);
        Ok(count)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Edges are identified by their endpoints, so re-linking is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Edge {
    Contains {
        district: String,
        neighborhood: (String, String),
    },
    HasVenue {
        neighborhood: (String, String),
        venue_id: String,
    },
    HasTerrace {
        venue_id: String,
        terrace_id: String,
    },
}

/// In-memory graph store for development/testing. Nodes are keyed by their
/// natural identity, matching the merge contract of the real store.
pub struct InMemoryGraphStore {
    districts: Arc<Mutex<HashMap<String, District>>>,
    neighborhoods: Arc<Mutex<HashMap<(String, String), Neighborhood>>>,
    venues: Arc<Mutex<HashMap<String, Venue>>>,
    terraces: Arc<Mutex<HashMap<String, Terrace>>>,
    edges: Arc<Mutex<HashSet<Edge>>>,
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self {
            districts: Arc::new(Mutex::new(HashMap::new())),
            neighborhoods: Arc::new(Mutex::new(HashMap::new())),
            venues: Arc::new(Mutex::new(HashMap::new())),
            terraces: Arc::new(Mutex::new(HashMap::new())),
            edges: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.districts.lock().unwrap().clear();
        self.neighborhoods.lock().unwrap().clear();
        self.venues.lock().unwrap().clear();
        self.terraces.lock().unwrap().clear();
        self.edges.lock().unwrap().clear();
        debug!("Cleared graph store");
        Ok(())
    }

    async fn upsert_district(&self, district: &District) -> Result<()> {
        self.districts
            .lock()
            .unwrap()
            .insert(district.name.clone(), district.clone());
        Ok(())
    }

    async fn upsert_neighborhood(&self, neighborhood: &Neighborhood) -> Result<()> {
        let key = (neighborhood.name.clone(), neighborhood.district.clone());
        self.neighborhoods
            .lock()
            .unwrap()
            .insert(key, neighborhood.clone());
        Ok(())
    }

    async fn upsert_venue(&self, venue: &Venue) -> Result<()> {
        // Last write wins when a natural id collides across records
        self.venues
            .lock()
            .unwrap()
            .insert(venue.id.clone(), venue.clone());
        Ok(())
    }

    async fn upsert_terrace(&self, terrace: &Terrace) -> Result<()> {
        self.terraces
            .lock()
            .unwrap()
            .insert(terrace.id.clone(), terrace.clone());
        Ok(())
    }

    async fn link_contains(&self, neighborhood: &Neighborhood) -> Result<()> {
        self.edges.lock().unwrap().insert(Edge::Contains {
            district: neighborhood.district.clone(),
            neighborhood: (neighborhood.name.clone(), neighborhood.district.clone()),
        });
        Ok(())
    }

    async fn link_has_venue(&self, neighborhood: &Neighborhood, venue_id: &str) -> Result<()> {
        self.edges.lock().unwrap().insert(Edge::HasVenue {
            neighborhood: (neighborhood.name.clone(), neighborhood.district.clone()),
            venue_id: venue_id.to_string(),
        });
        Ok(())
    }

    async fn link_has_terrace(&self, venue_id: &str, terrace_id: &str) -> Result<()> {
        self.edges.lock().unwrap().insert(Edge::HasTerrace {
            venue_id: venue_id.to_string(),
            terrace_id: terrace_id.to_string(),
        });
        Ok(())
    }

    async fn counts(&self) -> Result<GraphCounts> {
        Ok(GraphCounts {
            districts: self.districts.lock().unwrap().len() as u64,
            neighborhoods: self.neighborhoods.lock().unwrap().len() as u64,
            venues: self.venues.lock().unwrap().len() as u64,
            terraces: self.terraces.lock().unwrap().len() as u64,
            edges: self.edges.lock().unwrap().len() as u64,
        })
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

impl InMemoryGraphStore {
    /// Number of HAS_VENUE edges leaving one neighborhood.
    pub fn venue_edges_from(&self, neighborhood: &Neighborhood) -> usize {
        let key = (neighborhood.name.clone(), neighborhood.district.clone());
        self.edges
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, Edge::HasVenue { neighborhood: n, .. } if *n == key))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Predicate;
    use serde_json::json;

    fn doc(pairs: &[(&str, Value)]) -> Document {
        let mut d = Document::new();
        for (k, v) in pairs {
            d.insert(k.to_string(), v.clone());
        }
        d
    }

    #[tokio::test]
    async fn insert_assigns_store_identifiers() {
        let store = InMemoryDocumentStore::new();
        store
            .insert_many("terraces", vec![doc(&[("district", json!("CENTRO"))])])
            .await
            .unwrap();

        let docs = store.find("terraces", &Filter::empty(), None).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].contains_key("_id"));
    }

    #[tokio::test]
    async fn update_many_reports_matched_documents() {
        let store = InMemoryDocumentStore::new();
        store
            .insert_many(
                "terraces",
                vec![
                    doc(&[("district", json!("CENTRO"))]),
                    doc(&[("district", json!("CENTRO"))]),
                    doc(&[("district", json!("RETIRO"))]),
                ],
            )
            .await
            .unwrap();

        let matched = store
            .update_many(
                "terraces",
                &Filter::field_eq("district", json!("CENTRO")),
                &[Mutation::Set("flagged".to_string(), json!(true))],
            )
            .await
            .unwrap();
        assert_eq!(matched, 2);

        let flagged = store
            .count("terraces", &Filter::field_eq("flagged", json!(true)))
            .await
            .unwrap();
        assert_eq!(flagged, 2);
    }

    #[tokio::test]
    async fn distinct_skips_null_and_preserves_first_seen_order() {
        let store = InMemoryDocumentStore::new();
        store
            .insert_many(
                "terraces",
                vec![
                    doc(&[("neighborhood", json!("SOL"))]),
                    doc(&[("neighborhood", json!("JUSTICIA"))]),
                    doc(&[("neighborhood", json!("SOL"))]),
                    doc(&[("neighborhood", Value::Null)]),
                ],
            )
            .await
            .unwrap();

        let values = store.distinct("terraces", "neighborhood").await.unwrap();
        assert_eq!(values, vec![json!("SOL"), json!("JUSTICIA")]);
    }

    #[tokio::test]
    async fn group_count_by_composite_key() {
        let store = InMemoryDocumentStore::new();
        store
            .insert_many(
                "terraces",
                vec![
                    doc(&[("district", json!("CENTRO")), ("neighborhood", json!("SOL"))]),
                    doc(&[("district", json!("CENTRO")), ("neighborhood", json!("SOL"))]),
                    doc(&[("district", json!("CENTRO")), ("neighborhood", json!("JUSTICIA"))]),
                ],
            )
            .await
            .unwrap();

        let groups = store
            .group_count("terraces", &["district", "neighborhood"])
            .await
            .unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0], (vec![json!("CENTRO"), json!("SOL")], 2));
        assert_eq!(groups[1], (vec![json!("CENTRO"), json!("JUSTICIA")], 1));
    }

    #[tokio::test]
    async fn replace_collection_overwrites_not_appends() {
        let store = InMemoryDocumentStore::new();
        store
            .insert_many("zone_a", vec![doc(&[("old", json!(true))])])
            .await
            .unwrap();

        store
            .replace_collection("zone_a", vec![doc(&[("new", json!(1))]), doc(&[("new", json!(2))])])
            .await
            .unwrap();

        let docs = store.find("zone_a", &Filter::empty(), None).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|d| !d.contains_key("old")));
    }

    #[tokio::test]
    async fn delete_many_with_predicate() {
        let store = InMemoryDocumentStore::new();
        store
            .insert_many(
                "terraces",
                vec![
                    doc(&[("chairs", json!(5))]),
                    doc(&[("chairs", json!(25))]),
                ],
            )
            .await
            .unwrap();

        let deleted = store
            .delete_many(
                "terraces",
                &Filter::all(vec![Predicate::Gt("chairs".to_string(), json!(10))]),
            )
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count("terraces", &Filter::empty()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn neighborhood_identity_is_composite() {
        let graph = InMemoryGraphStore::new();
        graph
            .upsert_neighborhood(&Neighborhood {
                name: "CASTELLANA".to_string(),
                district: "SALAMANCA".to_string(),
            })
            .await
            .unwrap();
        graph
            .upsert_neighborhood(&Neighborhood {
                name: "CASTELLANA".to_string(),
                district: "CHAMARTIN".to_string(),
            })
            .await
            .unwrap();

        let counts = graph.counts().await.unwrap();
        assert_eq!(counts.neighborhoods, 2);
    }

    #[tokio::test]
    async fn relinking_an_edge_is_a_no_op() {
        let graph = InMemoryGraphStore::new();
        let hood = Neighborhood {
            name: "SOL".to_string(),
            district: "CENTRO".to_string(),
        };
        graph.link_has_venue(&hood, "v1").await.unwrap();
        graph.link_has_venue(&hood, "v1").await.unwrap();

        assert_eq!(graph.counts().await.unwrap().edges, 1);
        assert_eq!(graph.venue_edges_from(&hood), 1);
    }

    #[tokio::test]
    async fn clear_removes_nodes_and_edges() {
        let graph = InMemoryGraphStore::new();
        graph
            .upsert_district(&District {
                name: "CENTRO".to_string(),
            })
            .await
            .unwrap();
        let hood = Neighborhood {
            name: "SOL".to_string(),
            district: "CENTRO".to_string(),
        };
        graph.upsert_neighborhood(&hood).await.unwrap();
        graph.link_contains(&hood).await.unwrap();

        graph.clear().await.unwrap();
        assert_eq!(graph.counts().await.unwrap(), GraphCounts::default());
    }
}
