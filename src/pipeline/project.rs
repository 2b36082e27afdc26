use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::constants::{
    ACCESS_TYPE, DISTRICT, ID_FIELD, LOCAL_ID, NEIGHBORHOOD, POSTAL_CODE, STREET, STREET_NUMBER,
    TERRACES_COLLECTION, TERRACE_ID,
};
use crate::domain::{
    field_string, District, Document, GraphCounts, InspectFlag, Neighborhood, Terrace, Venue,
};
use crate::error::Result;
use crate::storage::{DocumentStore, Filter, GraphStore};

/// Outcome of one projection run.
#[derive(Debug, Clone, Default)]
pub struct ProjectionReport {
    pub records_seen: u64,
    pub records_projected: u64,
    pub records_skipped: u64,
    pub failures: Vec<String>,
    pub counts: GraphCounts,
}

/// The four identity fields a record must carry to enter the graph. A record
/// missing any of them is skipped whole; partial node creation would break
/// the merge-by-key contract.
struct RecordIdentity {
    district: String,
    neighborhood: String,
    venue_id: String,
    terrace_id: String,
}

impl RecordIdentity {
    fn of(doc: &Document) -> Option<Self> {
        Some(Self {
            district: field_string(doc, DISTRICT)?,
            neighborhood: field_string(doc, NEIGHBORHOOD)?,
            venue_id: field_string(doc, LOCAL_ID).or_else(|| field_string(doc, ID_FIELD))?,
            terrace_id: field_string(doc, TERRACE_ID).or_else(|| field_string(doc, ID_FIELD))?,
        })
    }
}

/// Projects the terrace collection into the district → neighborhood → venue
/// → terrace graph. The target graph is cleared up front, so a run is a full
/// rebuild of the current snapshot and re-running it is idempotent.
pub struct GraphProjector {
    documents: Arc<dyn DocumentStore>,
    graph: Arc<dyn GraphStore>,
}

impl GraphProjector {
    pub fn new(documents: Arc<dyn DocumentStore>, graph: Arc<dyn GraphStore>) -> Self {
        Self { documents, graph }
    }

    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<ProjectionReport> {
        // No stale nodes may survive a re-run with a changed snapshot
        self.graph.clear().await?;

        let records = self
            .documents
            .find(TERRACES_COLLECTION, &Filter::empty(), None)
            .await?;

        let mut report = ProjectionReport {
            records_seen: records.len() as u64,
            ..Default::default()
        };

        for record in &records {
            let identity = match RecordIdentity::of(record) {
                Some(identity) => identity,
                None => {
                    warn!("Skipping record without full graph identity");
                    report.records_skipped += 1;
                    continue;
                }
            };

            match self.project_record(record, &identity).await {
                Ok(()) => report.records_projected += 1,
                Err(e) => {
                    error!("Failed to project venue {}: {}", identity.venue_id, e);
                    report.records_skipped += 1;
                    report
                        .failures
                        .push(format!("venue {}: {}", identity.venue_id, e));
                }
            }
        }

        report.counts = self.graph.counts().await?;
        info!(
            "Projected {}/{} records: {} districts, {} neighborhoods, {} venues, {} terraces, {} edges",
            report.records_projected,
            report.records_seen,
            report.counts.districts,
            report.counts.neighborhoods,
            report.counts.venues,
            report.counts.terraces,
            report.counts.edges
        );
        Ok(report)
    }

    async fn project_record(&self, record: &Document, identity: &RecordIdentity) -> Result<()> {
        let district = District {
            name: identity.district.clone(),
        };
        let neighborhood = Neighborhood {
            name: identity.neighborhood.clone(),
            district: identity.district.clone(),
        };
        // Missing attribute fields project as nulls, never fail the record
        let venue = Venue {
            id: identity.venue_id.clone(),
            address: field_string(record, STREET),
            number: field_string(record, STREET_NUMBER),
            postal_code: field_string(record, POSTAL_CODE),
            district: identity.district.clone(),
            neighborhood: identity.neighborhood.clone(),
        };
        let terrace = Terrace {
            id: identity.terrace_id.clone(),
            venue_id: identity.venue_id.clone(),
            access_type: field_string(record, ACCESS_TYPE),
            inspect: InspectFlag::from_document(record).as_option(),
        };

        // Nodes first: an edge may only reference nodes that already exist
        self.graph.upsert_district(&district).await?;
        self.graph.upsert_neighborhood(&neighborhood).await?;
        self.graph.upsert_venue(&venue).await?;
        self.graph.upsert_terrace(&terrace).await?;

        self.graph.link_contains(&neighborhood).await?;
        self.graph
            .link_has_venue(&neighborhood, &identity.venue_id)
            .await?;
        self.graph
            .link_has_terrace(&identity.venue_id, &identity.terrace_id)
            .await?;
        Ok(())
    }
}
