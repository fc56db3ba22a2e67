use crate::authz::{require, Actor, Operation, ResourceContext};
use crate::error::FundError;
use crate::storage::{collections, DocumentStore, Filter};
use crate::types::{
    FinancialRollup, FinancialsRequest, Investment, NewStructureRequest, Structure,
    StructureFilter, StructureView, UpdateStructureRequest,
};
use chrono::Utc;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Structure hierarchy store and financial aggregator.
///
/// Aggregates (investor/investment counts) are recomputed from the
/// investment collection on every read; the stored structure document never
/// carries them. The two reads are separate round-trips, so counts are
/// eventual rather than snapshot-consistent.
pub struct StructureService {
    store: Arc<dyn DocumentStore>,
}

impl StructureService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn create_structure(
        &self,
        actor: &Actor,
        request: NewStructureRequest,
    ) -> Result<StructureView, FundError> {
        require(actor, Operation::CreateStructure, &ResourceContext::none())?;

        if request.name.trim().is_empty() {
            return Err(FundError::missing_field("name"));
        }
        if request.base_currency.trim().is_empty() {
            return Err(FundError::missing_field("baseCurrency"));
        }

        let hierarchy_level = match request.parent_id.as_deref() {
            Some(parent_id) => {
                let parent = self.fetch(parent_id).await?.ok_or_else(|| {
                    FundError::InvalidHierarchy(format!(
                        "parent structure '{parent_id}' not found"
                    ))
                })?;
                parent.hierarchy_level + 1
            }
            None => 0,
        };

        let now = Utc::now();
        let structure = Structure {
            id: Uuid::new_v4().to_string(),
            name: request.name,
            structure_type: request.structure_type,
            parent_id: request.parent_id,
            hierarchy_level,
            created_by: actor.id.clone(),
            base_currency: request.base_currency,
            financials: FinancialRollup {
                management_fee_bps: request.management_fee_bps,
                carried_interest_bps: request.carried_interest_bps,
                ..Default::default()
            },
            created_at: now,
            updated_at: now,
        };

        let record = serde_json::to_value(&structure)
            .map_err(|e| FundError::Storage(format!("structure encode failed: {e}")))?;
        self.store
            .insert(collections::STRUCTURES, &structure.id, record)
            .await?;

        Ok(StructureView::decorate(structure, 0, 0))
    }

    pub async fn read_structure(
        &self,
        actor: &Actor,
        id: &str,
    ) -> Result<StructureView, FundError> {
        require(actor, Operation::ViewStructure, &ResourceContext::none())?;

        let structure = self
            .fetch(id)
            .await?
            .ok_or_else(|| FundError::not_found("structure", id))?;
        Ok(self.decorate(structure).await)
    }

    pub async fn list_structures(
        &self,
        actor: &Actor,
        filter: StructureFilter,
    ) -> Result<Vec<StructureView>, FundError> {
        require(actor, Operation::ViewStructure, &ResourceContext::none())?;

        let mut conditions = Filter::new();
        if let Some(created_by) = filter.created_by {
            conditions = conditions.eq("created_by", created_by);
        }
        if let Some(structure_type) = filter.structure_type {
            conditions = conditions.eq(
                "structure_type",
                serde_json::to_value(structure_type)
                    .map_err(|e| FundError::Storage(format!("filter encode failed: {e}")))?,
            );
        }
        if let Some(parent_id) = filter.parent_id {
            conditions = conditions.eq("parent_id", parent_id);
        }

        let rows = self
            .store
            .query(collections::STRUCTURES, &conditions)
            .await?;
        let mut views = Vec::with_capacity(rows.len());
        for row in rows {
            views.push(self.decorate(decode_structure(row)?).await);
        }
        Ok(views)
    }

    /// Direct children only; no recursive descent.
    pub async fn find_children(
        &self,
        actor: &Actor,
        parent_id: &str,
    ) -> Result<Vec<StructureView>, FundError> {
        require(actor, Operation::ViewStructure, &ResourceContext::none())?;

        let mut views = Vec::new();
        for child in self.fetch_children(parent_id).await? {
            views.push(self.decorate(child).await);
        }
        Ok(views)
    }

    /// Nodes with no parent, restricted to one creator.
    pub async fn find_roots(
        &self,
        actor: &Actor,
        creator_id: &str,
    ) -> Result<Vec<StructureView>, FundError> {
        require(actor, Operation::ViewStructure, &ResourceContext::none())?;

        let filter = Filter::new()
            .eq("created_by", creator_id)
            .eq("parent_id", serde_json::Value::Null);
        let rows = self.store.query(collections::STRUCTURES, &filter).await?;
        let mut views = Vec::with_capacity(rows.len());
        for row in rows {
            views.push(self.decorate(decode_structure(row)?).await);
        }
        Ok(views)
    }

    pub async fn update_structure(
        &self,
        actor: &Actor,
        id: &str,
        request: UpdateStructureRequest,
    ) -> Result<StructureView, FundError> {
        let existing = self
            .fetch(id)
            .await?
            .ok_or_else(|| FundError::not_found("structure", id))?;
        require(
            actor,
            Operation::UpdateStructure,
            &ResourceContext::owned_by(existing.created_by.clone()),
        )?;

        let mut patch = serde_json::Map::new();
        if let Some(name) = request.name {
            if name.trim().is_empty() {
                return Err(FundError::missing_field("name"));
            }
            patch.insert("name".to_string(), json!(name));
        }
        if let Some(base_currency) = request.base_currency {
            if base_currency.trim().is_empty() {
                return Err(FundError::missing_field("baseCurrency"));
            }
            patch.insert("base_currency".to_string(), json!(base_currency));
        }

        let mut new_level = None;
        if let Some(parent_change) = request.parent_id {
            let level = match parent_change.as_deref() {
                None => 0,
                Some(parent_id) => {
                    if parent_id == id {
                        return Err(FundError::InvalidHierarchy(format!(
                            "structure '{id}' cannot be its own parent"
                        )));
                    }
                    let parent = self.fetch(parent_id).await?.ok_or_else(|| {
                        FundError::InvalidHierarchy(format!(
                            "parent structure '{parent_id}' not found"
                        ))
                    })?;
                    if self.reaches(&parent, id).await? {
                        return Err(FundError::InvalidHierarchy(format!(
                            "structure '{parent_id}' is a descendant of '{id}'"
                        )));
                    }
                    parent.hierarchy_level + 1
                }
            };
            patch.insert("parent_id".to_string(), json!(parent_change));
            patch.insert("hierarchy_level".to_string(), json!(level));
            if level != existing.hierarchy_level {
                new_level = Some(level);
            }
        }

        patch.insert("updated_at".to_string(), json!(Utc::now()));
        let updated = self
            .store
            .update(collections::STRUCTURES, id, serde_json::Value::Object(patch))
            .await?;
        let structure = decode_structure(updated)?;

        if let Some(level) = new_level {
            self.relevel_descendants(id, level).await?;
        }

        Ok(self.decorate(structure).await)
    }

    /// Replaces the financial rollup block in a single storage round-trip,
    /// so concurrent readers observe either the old block or the new one.
    pub async fn update_financials(
        &self,
        actor: &Actor,
        id: &str,
        request: FinancialsRequest,
    ) -> Result<StructureView, FundError> {
        let existing = self
            .fetch(id)
            .await?
            .ok_or_else(|| FundError::not_found("structure", id))?;
        require(
            actor,
            Operation::UpdateStructure,
            &ResourceContext::owned_by(existing.created_by),
        )?;

        let financials: FinancialRollup = request.into();
        let patch = json!({
            "financials": financials,
            "updated_at": Utc::now(),
        });
        let updated = self.store.update(collections::STRUCTURES, id, patch).await?;
        Ok(self.decorate(decode_structure(updated)?).await)
    }

    /// Removes the node only. Children are left in place with a dangling
    /// parent reference; this non-cascading delete is deliberate, to
    /// preserve audit history.
    pub async fn delete_structure(&self, actor: &Actor, id: &str) -> Result<(), FundError> {
        let existing = self
            .fetch(id)
            .await?
            .ok_or_else(|| FundError::not_found("structure", id))?;
        require(
            actor,
            Operation::DeleteStructure,
            &ResourceContext::owned_by(existing.created_by),
        )?;

        self.store.delete(collections::STRUCTURES, id).await
    }

    /// Distinct investor count and investment count for one structure,
    /// recomputed from the investment collection. A storage failure
    /// degrades both counts to zero rather than failing the read.
    pub async fn investment_stats(&self, structure_id: &str) -> (u64, u64) {
        let filter = Filter::new().eq("structure_id", structure_id);
        let rows = match self.store.query(collections::INVESTMENTS, &filter).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(structure_id, error = %err, "investment count degraded to zero");
                return (0, 0);
            }
        };

        let investments: Vec<Investment> = rows
            .into_iter()
            .filter_map(|row| serde_json::from_value(row).ok())
            .collect();
        let investors = investments
            .iter()
            .map(|investment| investment.investor_id.as_str())
            .collect::<BTreeSet<_>>()
            .len() as u64;
        (investors, investments.len() as u64)
    }

    async fn decorate(&self, structure: Structure) -> StructureView {
        let (investors, investments) = self.investment_stats(&structure.id).await;
        StructureView::decorate(structure, investors, investments)
    }

    async fn fetch(&self, id: &str) -> Result<Option<Structure>, FundError> {
        self.store
            .get_by_id(collections::STRUCTURES, id)
            .await?
            .map(decode_structure)
            .transpose()
    }

    async fn fetch_children(&self, parent_id: &str) -> Result<Vec<Structure>, FundError> {
        let filter = Filter::new().eq("parent_id", parent_id);
        self.store
            .query(collections::STRUCTURES, &filter)
            .await?
            .into_iter()
            .map(decode_structure)
            .collect()
    }

    /// True when walking ancestor links upward from `from` reaches
    /// `target_id`. The walk stops at roots and at dangling parent
    /// references; a visited set guards against pre-existing loops.
    async fn reaches(&self, from: &Structure, target_id: &str) -> Result<bool, FundError> {
        let mut visited = BTreeSet::new();
        let mut cursor = Some(from.clone());
        while let Some(node) = cursor {
            if node.id == target_id {
                return Ok(true);
            }
            if !visited.insert(node.id.clone()) {
                return Ok(false);
            }
            cursor = match node.parent_id.as_deref() {
                Some(parent_id) => self.fetch(parent_id).await?,
                None => None,
            };
        }
        Ok(false)
    }

    /// Re-derives hierarchy levels for the subtree under `root_id` after a
    /// reparent, one direct-children query per node.
    async fn relevel_descendants(&self, root_id: &str, root_level: u32) -> Result<(), FundError> {
        let mut frontier = vec![(root_id.to_string(), root_level)];
        while let Some((parent_id, parent_level)) = frontier.pop() {
            for child in self.fetch_children(&parent_id).await? {
                let level = parent_level + 1;
                if child.hierarchy_level != level {
                    let patch = json!({ "hierarchy_level": level, "updated_at": Utc::now() });
                    self.store
                        .update(collections::STRUCTURES, &child.id, patch)
                        .await?;
                }
                frontier.push((child.id, level));
            }
        }
        Ok(())
    }
}

fn decode_structure(value: serde_json::Value) -> Result<Structure, FundError> {
    serde_json::from_value(value)
        .map_err(|e| FundError::Storage(format!("structure decode failed: {e}")))
}
