use crate::authz::{require, Actor, Operation, ResourceContext};
use crate::error::FundError;
use crate::storage::{collections, DocumentStore, Filter};
use crate::types::{Investment, InvestmentView, NewInvestmentRequest};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Investment records. The hierarchy aggregator reads these; nothing else
/// in this layer interprets them.
pub struct InvestmentService {
    store: Arc<dyn DocumentStore>,
}

impl InvestmentService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn record(
        &self,
        actor: &Actor,
        request: NewInvestmentRequest,
    ) -> Result<InvestmentView, FundError> {
        require(actor, Operation::CreateInvestment, &ResourceContext::none())?;

        if request.amount_minor <= 0 {
            return Err(FundError::Validation(
                "amountMinor must be positive".to_string(),
            ));
        }
        if request.currency.trim().is_empty() {
            return Err(FundError::missing_field("currency"));
        }

        let structure = self
            .store
            .get_by_id(collections::STRUCTURES, &request.structure_id)
            .await?;
        if structure.is_none() {
            return Err(FundError::Validation(format!(
                "structure '{}' does not exist",
                request.structure_id
            )));
        }

        let investor = self
            .store
            .get_by_id(collections::USERS, &request.investor_id)
            .await?;
        if investor.is_none() {
            return Err(FundError::Validation(format!(
                "investor '{}' does not exist",
                request.investor_id
            )));
        }

        let investment = Investment {
            id: Uuid::new_v4().to_string(),
            structure_id: request.structure_id,
            investor_id: request.investor_id,
            amount_minor: request.amount_minor,
            currency: request.currency,
            committed_at: Utc::now(),
        };
        let record = serde_json::to_value(&investment)
            .map_err(|e| FundError::Storage(format!("investment encode failed: {e}")))?;
        self.store
            .insert(collections::INVESTMENTS, &investment.id, record)
            .await?;

        Ok(investment.into())
    }

    pub async fn list_for_structure(
        &self,
        actor: &Actor,
        structure_id: &str,
    ) -> Result<Vec<InvestmentView>, FundError> {
        require(actor, Operation::ViewStructure, &ResourceContext::none())?;

        let filter = Filter::new().eq("structure_id", structure_id);
        let rows = self.store.query(collections::INVESTMENTS, &filter).await?;
        rows.into_iter()
            .map(|row| {
                serde_json::from_value::<Investment>(row)
                    .map(InvestmentView::from)
                    .map_err(|e| FundError::Storage(format!("investment decode failed: {e}")))
            })
            .collect()
    }

    pub async fn remove(&self, actor: &Actor, investment_id: &str) -> Result<(), FundError> {
        require(actor, Operation::DeleteInvestment, &ResourceContext::none())?;

        let existing = self
            .store
            .get_by_id(collections::INVESTMENTS, investment_id)
            .await?;
        if existing.is_none() {
            return Err(FundError::not_found("investment", investment_id));
        }
        self.store.delete(collections::INVESTMENTS, investment_id).await
    }
}
