use async_trait::async_trait;
use neo4rs::{query, Graph};
use tracing::debug;

use super::GraphStore;
use crate::config::GraphConfig;
use crate::domain::{District, GraphCounts, Neighborhood, Terrace, Venue};
use crate::error::{PipelineError, Result};

/// Neo4j-backed graph store. Every upsert is a MERGE on the node's natural
/// key, so re-projecting an unchanged snapshot leaves the graph identical.
pub struct Neo4jGraphStore {
    graph: Graph,
}

impl Neo4jGraphStore {
    pub async fn connect(config: &GraphConfig) -> Result<Self> {
        let graph = Graph::new(&config.uri, &config.user, &config.password)
            .await
            .map_err(|e| {
                PipelineError::Connection(format!(
                    "graph store unreachable at {}: {}",
                    config.uri, e
                ))
            })?;
        Ok(Self { graph })
    }

    async fn count_label(&self, label: &str) -> Result<u64> {
        let q = query(&format!("MATCH (n:{label}) RETURN count(n) AS total"));
        let mut stream = self.graph.execute(q).await?;
        if let Some(row) = stream.next().await? {
            return Ok(row.get::<i64>("total").unwrap_or(0) as u64);
        }
        Ok(0)
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn ping(&self) -> Result<()> {
        self.graph
            .run(query("RETURN 1"))
            .await
            .map_err(|e| PipelineError::Connection(format!("graph store ping failed: {}", e)))
    }

    async fn clear(&self) -> Result<()> {
        self.graph.run(query("MATCH (n) DETACH DELETE n")).await?;
        debug!("Cleared graph store");
        Ok(())
    }

    async fn upsert_district(&self, district: &District) -> Result<()> {
        let q = query("MERGE (d:District {name: $name})").param("name", district.name.as_str());
        self.graph.run(q).await?;
        Ok(())
    }

    async fn upsert_neighborhood(&self, neighborhood: &Neighborhood) -> Result<()> {
        let q = query("MERGE (b:Neighborhood {name: $name, district: $district})")
            .param("name", neighborhood.name.as_str())
            .param("district", neighborhood.district.as_str());
        self.graph.run(q).await?;
        Ok(())
    }

    async fn upsert_venue(&self, venue: &Venue) -> Result<()> {
        let q = query(
            "MERGE (v:Venue {id: $id})
             SET v.address = $address,
                 v.number = $number,
                 v.postal_code = $postal_code,
                 v.district = $district,
                 v.neighborhood = $neighborhood",
        )
        .param("id", venue.id.as_str())
        .param("address", venue.address.clone())
        .param("number", venue.number.clone())
        .param("postal_code", venue.postal_code.clone())
        .param("district", venue.district.as_str())
        .param("neighborhood", venue.neighborhood.as_str());
        self.graph.run(q).await?;
        Ok(())
    }

    async fn upsert_terrace(&self, terrace: &Terrace) -> Result<()> {
        let q = query(
            "MERGE (t:Terrace {id: $id})
             SET t.venue_id = $venue_id,
                 t.access_type = $access_type,
                 t.inspect = $inspect",
        )
        .param("id", terrace.id.as_str())
        .param("venue_id", terrace.venue_id.as_str())
        .param("access_type", terrace.access_type.clone())
        .param("inspect", terrace.inspect);
        self.graph.run(q).await?;
        Ok(())
    }

    async fn link_contains(&self, neighborhood: &Neighborhood) -> Result<()> {
        let q = query(
            "MATCH (d:District {name: $district})
             MATCH (b:Neighborhood {name: $name, district: $district})
             MERGE (d)-[:CONTAINS]->(b)",
        )
        .param("district", neighborhood.district.as_str())
        .param("name", neighborhood.name.as_str());
        self.graph.run(q).await?;
        Ok(())
    }

    async fn link_has_venue(&self, neighborhood: &Neighborhood, venue_id: &str) -> Result<()> {
        let q = query(
            "MATCH (b:Neighborhood {name: $name, district: $district})
             MATCH (v:Venue {id: $venue_id})
             MERGE (b)-[:HAS_VENUE]->(v)",
        )
        .param("name", neighborhood.name.as_str())
        .param("district", neighborhood.district.as_str())
        .param("venue_id", venue_id);
        self.graph.run(q).await?;
        Ok(())
    }

    async fn link_has_terrace(&self, venue_id: &str, terrace_id: &str) -> Result<()> {
        let q = query(
            "MATCH (v:Venue {id: $venue_id})
             MATCH (t:Terrace {id: $terrace_id})
             MERGE (v)-[:HAS_TERRACE]->(t)",
        )
        .param("venue_id", venue_id)
        .param("terrace_id", terrace_id);
        self.graph.run(q).await?;
        Ok(())
    }

    async fn counts(&self) -> Result<GraphCounts> {
        let districts = self.count_label("District").await?;
        let neighborhoods = self.count_label("Neighborhood").await?;
        let venues = self.count_label("Venue").await?;
        let terraces = self.count_label("Terrace").await?;

        let q = query("MATCH ()-[r]->() RETURN count(r) AS total");
        let mut stream = self.graph.execute(q).await?;
        let edges = match stream.next().await? {
            Some(row) => row.get::<i64>("total").unwrap_or(0) as u64,
            None => 0,
        };

        Ok(GraphCounts {
            districts,
            neighborhoods,
            venues,
            terraces,
            edges,
        })
    }

    async fn close(&self) -> Result<()> {
        // The driver tears its connection pool down on drop.
        Ok(())
    }
}
