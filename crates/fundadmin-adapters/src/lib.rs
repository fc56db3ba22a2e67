//! Store adapters and deterministic fixtures for the fund-administration
//! platform.

#![deny(unsafe_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use fundadmin_core::error::FundError;
use fundadmin_core::storage::{collections, DocumentStore, Filter};
use fundadmin_core::types::{
    ContractKind, DeploymentStatus, FinancialRollup, Investment, SmartContract, Structure,
    StructureType, TokenMetadata, User,
};
use fundadmin_core::Role;
use serde_json::Value;

/// Deterministic failing store useful for chaos testing degraded reads.
#[derive(Debug, Clone)]
pub struct AlwaysFailStore {
    reason: String,
}

impl AlwaysFailStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn failure(&self) -> FundError {
        FundError::Storage(self.reason.clone())
    }
}

#[async_trait]
impl DocumentStore for AlwaysFailStore {
    async fn get_by_id(&self, _collection: &str, _id: &str) -> Result<Option<Value>, FundError> {
        Err(self.failure())
    }

    async fn query(&self, _collection: &str, _filter: &Filter) -> Result<Vec<Value>, FundError> {
        Err(self.failure())
    }

    async fn insert(&self, _collection: &str, _id: &str, _record: Value) -> Result<(), FundError> {
        Err(self.failure())
    }

    async fn update(&self, _collection: &str, _id: &str, _patch: Value) -> Result<Value, FundError> {
        Err(self.failure())
    }

    async fn delete(&self, _collection: &str, _id: &str) -> Result<(), FundError> {
        Err(self.failure())
    }
}

fn fixed_time(ts: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now)
}

/// Seeds a deterministic demo dataset: a root operator, an admin who runs a
/// fund with one SPV child, two LPs with three investments between them,
/// and one ERC3643 deployment record still in flight.
pub async fn seed_demo_data(store: &dyn DocumentStore) -> Result<(), FundError> {
    let created = fixed_time(1_736_100_000);

    let users = [
        User {
            id: "user-root".to_string(),
            email: "root@fund.example".to_string(),
            display_name: "Platform Root".to_string(),
            role: Role::Root,
            active: true,
            created_at: created,
            updated_at: created,
        },
        User {
            id: "user-admin".to_string(),
            email: "gp@fund.example".to_string(),
            display_name: "General Partner".to_string(),
            role: Role::Admin,
            active: true,
            created_at: created,
            updated_at: created,
        },
        User {
            id: "user-lp-1".to_string(),
            email: "lp1@fund.example".to_string(),
            display_name: "Limited Partner One".to_string(),
            role: Role::Investor,
            active: true,
            created_at: created,
            updated_at: created,
        },
        User {
            id: "user-lp-2".to_string(),
            email: "lp2@fund.example".to_string(),
            display_name: "Limited Partner Two".to_string(),
            role: Role::Investor,
            active: true,
            created_at: created,
            updated_at: created,
        },
    ];
    for user in &users {
        insert(store, collections::USERS, &user.id, user).await?;
    }

    let fund = Structure {
        id: "structure-fund-1".to_string(),
        name: "Meridian Growth Fund".to_string(),
        structure_type: StructureType::Fund,
        parent_id: None,
        hierarchy_level: 0,
        created_by: "user-admin".to_string(),
        base_currency: "USD".to_string(),
        financials: FinancialRollup {
            total_called_minor: 120_000_000,
            total_distributed_minor: 15_000_000,
            total_invested_minor: 90_000_000,
            management_fee_bps: 200,
            carried_interest_bps: 2000,
        },
        created_at: created,
        updated_at: created,
    };
    insert(store, collections::STRUCTURES, &fund.id, &fund).await?;

    let spv = Structure {
        id: "structure-spv-1".to_string(),
        name: "Meridian SPV I".to_string(),
        structure_type: StructureType::Spv,
        parent_id: Some(fund.id.clone()),
        hierarchy_level: 1,
        created_by: "user-admin".to_string(),
        base_currency: "USD".to_string(),
        financials: FinancialRollup::default(),
        created_at: created,
        updated_at: created,
    };
    insert(store, collections::STRUCTURES, &spv.id, &spv).await?;

    let investments = [
        Investment {
            id: "investment-1".to_string(),
            structure_id: fund.id.clone(),
            investor_id: "user-lp-1".to_string(),
            amount_minor: 50_000_000,
            currency: "USD".to_string(),
            committed_at: fixed_time(1_736_200_000),
        },
        Investment {
            id: "investment-2".to_string(),
            structure_id: fund.id.clone(),
            investor_id: "user-lp-1".to_string(),
            amount_minor: 25_000_000,
            currency: "USD".to_string(),
            committed_at: fixed_time(1_736_300_000),
        },
        Investment {
            id: "investment-3".to_string(),
            structure_id: fund.id.clone(),
            investor_id: "user-lp-2".to_string(),
            amount_minor: 45_000_000,
            currency: "USD".to_string(),
            committed_at: fixed_time(1_736_400_000),
        },
    ];
    for investment in &investments {
        insert(store, collections::INVESTMENTS, &investment.id, investment).await?;
    }

    let contract = SmartContract {
        id: "contract-1".to_string(),
        structure_id: fund.id,
        kind: ContractKind::Erc3643,
        token: TokenMetadata {
            token_name: "Meridian Fund Token".to_string(),
            token_symbol: "MGF".to_string(),
            max_supply: 10_000_000,
            token_value_minor: 10_000,
        },
        network: "polygon".to_string(),
        status: DeploymentStatus::Pending,
        deployed_by: "user-admin".to_string(),
        contract_address: None,
        transaction_hash: None,
        block_number: None,
        deployed_at: None,
        error_message: None,
        failed_at: None,
        created_at: created,
        updated_at: created,
    };
    insert(store, collections::CONTRACTS, &contract.id, &contract).await?;

    Ok(())
}

async fn insert<T: serde::Serialize>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
    record: &T,
) -> Result<(), FundError> {
    let value = serde_json::to_value(record)
        .map_err(|e| FundError::Storage(format!("fixture encode failed: {e}")))?;
    store.insert(collection, id, value).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use fundadmin_core::authz::Actor;
    use fundadmin_core::hierarchy::StructureService;
    use fundadmin_core::storage::MemoryDocumentStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn failing_store_degrades_aggregate_counts_to_zero() {
        let service = StructureService::new(Arc::new(AlwaysFailStore::new("connection refused")));
        let (investors, investments) = service.investment_stats("structure-x").await;
        assert_eq!(investors, 0);
        assert_eq!(investments, 0);
    }

    #[tokio::test]
    async fn demo_dataset_satisfies_the_aggregate_invariant() {
        let store = Arc::new(MemoryDocumentStore::new());
        seed_demo_data(store.as_ref()).await.unwrap();

        let service = StructureService::new(store);
        let admin = Actor::new("user-admin", Role::Admin);
        let fund = service
            .read_structure(&admin, "structure-fund-1")
            .await
            .unwrap();

        assert_eq!(fund.current_investors, 2);
        assert_eq!(fund.current_investments, 3);
        assert!(fund.current_investors <= fund.current_investments);

        let children = service
            .find_children(&admin, "structure-fund-1")
            .await
            .unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].hierarchy_level, 1);
    }
}
