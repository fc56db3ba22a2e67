use crate::authz::{require, Actor, Operation, ResourceContext};
use crate::error::FundError;
use crate::storage::{collections, DocumentStore, Filter};
use crate::types::{
    ContractMetadataRequest, ContractStatusRequest, ContractView, DeployedDetails,
    DeploymentStatus, NewContractRequest, SmartContract, TokenMetadata,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

impl SmartContract {
    fn ensure_live(&self) -> Result<(), FundError> {
        if self.status.is_terminal() {
            return Err(FundError::InvalidTransition(format!(
                "contract '{}' is already {}",
                self.id,
                self.status.name()
            )));
        }
        Ok(())
    }

    /// Re-announcing `deploying` is allowed any number of times; only the
    /// terminal states refuse it.
    pub fn mark_deploying(&mut self, now: DateTime<Utc>) -> Result<(), FundError> {
        self.ensure_live()?;
        self.status = DeploymentStatus::Deploying;
        self.updated_at = now;
        Ok(())
    }

    /// Enters the `Deployed` terminal state. Requires the full on-chain
    /// confirmation and clears any prior failure fields.
    pub fn mark_deployed(
        &mut self,
        details: DeployedDetails,
        now: DateTime<Utc>,
    ) -> Result<(), FundError> {
        self.ensure_live()?;
        if details.contract_address.trim().is_empty() {
            return Err(FundError::missing_field("contractAddress"));
        }
        if details.transaction_hash.trim().is_empty() {
            return Err(FundError::missing_field("transactionHash"));
        }

        self.status = DeploymentStatus::Deployed;
        self.contract_address = Some(details.contract_address);
        self.transaction_hash = Some(details.transaction_hash);
        self.block_number = Some(details.block_number);
        self.deployed_at = Some(now);
        self.error_message = None;
        self.failed_at = None;
        self.updated_at = now;
        Ok(())
    }

    /// Enters the `Failed` terminal state with the message preserved
    /// verbatim; clears any prior success fields.
    pub fn mark_failed(
        &mut self,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), FundError> {
        self.ensure_live()?;
        let message = message.into();
        if message.trim().is_empty() {
            return Err(FundError::missing_field("errorMessage"));
        }

        self.status = DeploymentStatus::Failed;
        self.error_message = Some(message);
        self.failed_at = Some(now);
        self.contract_address = None;
        self.transaction_hash = None;
        self.block_number = None;
        self.deployed_at = None;
        self.updated_at = now;
        Ok(())
    }
}

/// Smart-contract deployment records and their lifecycle.
///
/// Each record is independent; the only cross-record constraint is identity
/// uniqueness, enforced by the store. Status writes are per-record
/// last-write-wins.
pub struct ContractService {
    store: Arc<dyn DocumentStore>,
}

impl ContractService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn create_contract(
        &self,
        actor: &Actor,
        request: NewContractRequest,
    ) -> Result<ContractView, FundError> {
        require(actor, Operation::CreateContract, &ResourceContext::none())?;

        if request.token_name.trim().is_empty() {
            return Err(FundError::missing_field("tokenName"));
        }
        if request.token_symbol.trim().is_empty() {
            return Err(FundError::missing_field("tokenSymbol"));
        }
        if request.network.trim().is_empty() {
            return Err(FundError::missing_field("network"));
        }
        if request.max_supply == 0 {
            return Err(FundError::Validation("maxSupply must be positive".to_string()));
        }

        let status = request.initial_status.unwrap_or(DeploymentStatus::Pending);
        if status.is_terminal() {
            return Err(FundError::Validation(format!(
                "cannot create a contract directly in terminal status '{}'",
                status.name()
            )));
        }

        let structure_exists = self
            .store
            .get_by_id(collections::STRUCTURES, &request.structure_id)
            .await?
            .is_some();
        if !structure_exists {
            return Err(FundError::Validation(format!(
                "structure '{}' does not exist",
                request.structure_id
            )));
        }

        let now = Utc::now();
        let contract = SmartContract {
            id: Uuid::new_v4().to_string(),
            structure_id: request.structure_id,
            kind: request.kind,
            token: TokenMetadata {
                token_name: request.token_name,
                token_symbol: request.token_symbol,
                max_supply: request.max_supply,
                token_value_minor: request.token_value_minor,
            },
            network: request.network,
            status,
            deployed_by: actor.id.clone(),
            contract_address: None,
            transaction_hash: None,
            block_number: None,
            deployed_at: None,
            error_message: None,
            failed_at: None,
            created_at: now,
            updated_at: now,
        };

        let record = serde_json::to_value(&contract)
            .map_err(|e| FundError::Storage(format!("contract encode failed: {e}")))?;
        self.store
            .insert(collections::CONTRACTS, &contract.id, record)
            .await?;

        Ok(contract.into())
    }

    pub async fn get_contract(&self, actor: &Actor, id: &str) -> Result<ContractView, FundError> {
        require(actor, Operation::ViewContract, &ResourceContext::none())?;

        let contract = self
            .fetch(id)
            .await?
            .ok_or_else(|| FundError::not_found("contract", id))?;
        Ok(contract.into())
    }

    pub async fn list_for_structure(
        &self,
        actor: &Actor,
        structure_id: &str,
    ) -> Result<Vec<ContractView>, FundError> {
        require(actor, Operation::ViewContract, &ResourceContext::none())?;

        let filter = Filter::new().eq("structure_id", structure_id);
        let rows = self.store.query(collections::CONTRACTS, &filter).await?;
        rows.into_iter()
            .map(|row| decode_contract(row).map(ContractView::from))
            .collect()
    }

    /// Metadata updates are legal in every state and never touch the
    /// deployment status.
    pub async fn update_metadata(
        &self,
        actor: &Actor,
        id: &str,
        request: ContractMetadataRequest,
    ) -> Result<ContractView, FundError> {
        require(actor, Operation::UpdateContract, &ResourceContext::none())?;

        let mut contract = self
            .fetch(id)
            .await?
            .ok_or_else(|| FundError::not_found("contract", id))?;

        if let Some(token_name) = request.token_name {
            if token_name.trim().is_empty() {
                return Err(FundError::missing_field("tokenName"));
            }
            contract.token.token_name = token_name;
        }
        if let Some(token_symbol) = request.token_symbol {
            if token_symbol.trim().is_empty() {
                return Err(FundError::missing_field("tokenSymbol"));
            }
            contract.token.token_symbol = token_symbol;
        }
        if let Some(max_supply) = request.max_supply {
            if max_supply == 0 {
                return Err(FundError::Validation("maxSupply must be positive".to_string()));
            }
            contract.token.max_supply = max_supply;
        }
        if let Some(token_value_minor) = request.token_value_minor {
            contract.token.token_value_minor = token_value_minor;
        }
        if let Some(network) = request.network {
            if network.trim().is_empty() {
                return Err(FundError::missing_field("network"));
            }
            contract.network = network;
        }

        let patch = json!({
            "token": contract.token,
            "network": contract.network,
            "updated_at": Utc::now(),
        });
        let updated = self.store.update(collections::CONTRACTS, id, patch).await?;
        Ok(decode_contract(updated)?.into())
    }

    /// Applies one status transition. The authorization operation depends on
    /// the target state; the transition rules live on the record itself.
    pub async fn transition(
        &self,
        actor: &Actor,
        id: &str,
        request: ContractStatusRequest,
    ) -> Result<ContractView, FundError> {
        let mut contract = self
            .fetch(id)
            .await?
            .ok_or_else(|| FundError::not_found("contract", id))?;

        let now = Utc::now();
        match request.status {
            DeploymentStatus::Pending => {
                return Err(FundError::Validation(
                    "cannot transition a contract back to pending".to_string(),
                ));
            }
            DeploymentStatus::Deploying => {
                require(actor, Operation::DeployContract, &ResourceContext::none())?;
                contract.mark_deploying(now)?;
            }
            DeploymentStatus::Deployed => {
                require(actor, Operation::UpdateContractStatus, &ResourceContext::none())?;
                let details = DeployedDetails {
                    contract_address: request
                        .contract_address
                        .ok_or_else(|| FundError::missing_field("contractAddress"))?,
                    transaction_hash: request
                        .transaction_hash
                        .ok_or_else(|| FundError::missing_field("transactionHash"))?,
                    block_number: request
                        .block_number
                        .ok_or_else(|| FundError::missing_field("blockNumber"))?,
                };
                contract.mark_deployed(details, now)?;
            }
            DeploymentStatus::Failed => {
                require(actor, Operation::UpdateContractStatus, &ResourceContext::none())?;
                let message = request
                    .error_message
                    .ok_or_else(|| FundError::missing_field("errorMessage"))?;
                contract.mark_failed(message, now)?;
            }
        }

        let patch = json!({
            "status": contract.status,
            "contract_address": contract.contract_address,
            "transaction_hash": contract.transaction_hash,
            "block_number": contract.block_number,
            "deployed_at": contract.deployed_at,
            "error_message": contract.error_message,
            "failed_at": contract.failed_at,
            "updated_at": contract.updated_at,
        });
        let updated = self.store.update(collections::CONTRACTS, id, patch).await?;
        Ok(decode_contract(updated)?.into())
    }

    pub async fn delete_contract(&self, actor: &Actor, id: &str) -> Result<(), FundError> {
        require(actor, Operation::DeleteContract, &ResourceContext::none())?;

        if self.fetch(id).await?.is_none() {
            return Err(FundError::not_found("contract", id));
        }
        self.store.delete(collections::CONTRACTS, id).await
    }

    async fn fetch(&self, id: &str) -> Result<Option<SmartContract>, FundError> {
        self.store
            .get_by_id(collections::CONTRACTS, id)
            .await?
            .map(decode_contract)
            .transpose()
    }
}

fn decode_contract(value: serde_json::Value) -> Result<SmartContract, FundError> {
    serde_json::from_value(value)
        .map_err(|e| FundError::Storage(format!("contract decode failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::Role;
    use crate::storage::MemoryDocumentStore;
    use crate::types::{ContractKind, FinancialRollup, Structure, StructureType};

    fn admin() -> Actor {
        Actor::new("user-admin", Role::Admin)
    }

    async fn service_with_structure() -> (ContractService, String) {
        let store = Arc::new(MemoryDocumentStore::new());
        let structure = Structure {
            id: "s-fund".to_string(),
            name: "Test Fund".to_string(),
            structure_type: StructureType::Fund,
            parent_id: None,
            hierarchy_level: 0,
            created_by: "user-admin".to_string(),
            base_currency: "USD".to_string(),
            financials: FinancialRollup::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store
            .insert(
                collections::STRUCTURES,
                &structure.id,
                serde_json::to_value(&structure).unwrap(),
            )
            .await
            .unwrap();
        (ContractService::new(store), structure.id)
    }

    fn erc3643_request(structure_id: &str) -> NewContractRequest {
        NewContractRequest {
            structure_id: structure_id.to_string(),
            kind: ContractKind::Erc3643,
            token_name: "Fund Token".to_string(),
            token_symbol: "FND".to_string(),
            max_supply: 1_000_000,
            token_value_minor: 10_000,
            network: "polygon".to_string(),
            initial_status: None,
        }
    }

    fn deployed_request(address: &str) -> ContractStatusRequest {
        ContractStatusRequest {
            status: DeploymentStatus::Deployed,
            contract_address: Some(address.to_string()),
            transaction_hash: Some("0xf00d".to_string()),
            block_number: Some(18_204_511),
            error_message: None,
        }
    }

    fn deploying_request() -> ContractStatusRequest {
        ContractStatusRequest {
            status: DeploymentStatus::Deploying,
            contract_address: None,
            transaction_hash: None,
            block_number: None,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn creation_defaults_to_pending_with_no_outcome_fields() {
        let (service, structure_id) = service_with_structure().await;
        let contract = service
            .create_contract(&admin(), erc3643_request(&structure_id))
            .await
            .unwrap();

        assert_eq!(contract.status, DeploymentStatus::Pending);
        assert!(contract.contract_address.is_none());
        assert!(contract.transaction_hash.is_none());
        assert!(contract.block_number.is_none());
        assert!(contract.error_message.is_none());
    }

    #[tokio::test]
    async fn callers_may_create_directly_into_deploying() {
        let (service, structure_id) = service_with_structure().await;
        let mut request = erc3643_request(&structure_id);
        request.initial_status = Some(DeploymentStatus::Deploying);

        let contract = service.create_contract(&admin(), request).await.unwrap();
        assert_eq!(contract.status, DeploymentStatus::Deploying);
    }

    #[tokio::test]
    async fn terminal_initial_status_is_rejected() {
        let (service, structure_id) = service_with_structure().await;
        let mut request = erc3643_request(&structure_id);
        request.initial_status = Some(DeploymentStatus::Deployed);

        let err = service.create_contract(&admin(), request).await.unwrap_err();
        assert!(matches!(err, FundError::Validation(_)));
    }

    #[tokio::test]
    async fn pending_deploying_deployed_walkthrough() {
        let (service, structure_id) = service_with_structure().await;
        let contract = service
            .create_contract(&admin(), erc3643_request(&structure_id))
            .await
            .unwrap();

        let contract = service
            .transition(&admin(), &contract.id, deploying_request())
            .await
            .unwrap();
        assert_eq!(contract.status, DeploymentStatus::Deploying);

        let contract = service
            .transition(&admin(), &contract.id, deployed_request("0xABCD"))
            .await
            .unwrap();
        assert_eq!(contract.status, DeploymentStatus::Deployed);
        assert_eq!(contract.contract_address.as_deref(), Some("0xABCD"));
        assert!(contract.deployed_at.is_some());
        assert!(contract.error_message.is_none());
        assert!(contract.failed_at.is_none());
    }

    #[tokio::test]
    async fn re_announcing_deploying_is_idempotent() {
        let (service, structure_id) = service_with_structure().await;
        let contract = service
            .create_contract(&admin(), erc3643_request(&structure_id))
            .await
            .unwrap();

        for _ in 0..3 {
            let updated = service
                .transition(&admin(), &contract.id, deploying_request())
                .await
                .unwrap();
            assert_eq!(updated.status, DeploymentStatus::Deploying);
        }
    }

    #[tokio::test]
    async fn failure_preserves_the_message_verbatim_and_clears_success_fields() {
        let (service, structure_id) = service_with_structure().await;
        let contract = service
            .create_contract(&admin(), erc3643_request(&structure_id))
            .await
            .unwrap();

        let failed = service
            .transition(
                &admin(),
                &contract.id,
                ContractStatusRequest {
                    status: DeploymentStatus::Failed,
                    contract_address: None,
                    transaction_hash: None,
                    block_number: None,
                    error_message: Some("Gas estimation failed".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(failed.status, DeploymentStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("Gas estimation failed"));
        assert!(failed.failed_at.is_some());
        assert!(failed.contract_address.is_none());
        assert!(failed.transaction_hash.is_none());
        assert!(failed.block_number.is_none());
    }

    #[tokio::test]
    async fn terminal_states_reject_further_transitions() {
        let (service, structure_id) = service_with_structure().await;
        let contract = service
            .create_contract(&admin(), erc3643_request(&structure_id))
            .await
            .unwrap();
        service
            .transition(&admin(), &contract.id, deployed_request("0xABCD"))
            .await
            .unwrap();

        let err = service
            .transition(&admin(), &contract.id, deploying_request())
            .await
            .unwrap_err();
        assert!(matches!(err, FundError::InvalidTransition(_)));

        let err = service
            .transition(
                &admin(),
                &contract.id,
                ContractStatusRequest {
                    status: DeploymentStatus::Failed,
                    contract_address: None,
                    transaction_hash: None,
                    block_number: None,
                    error_message: Some("late failure".to_string()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FundError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn deployed_requires_the_full_onchain_confirmation() {
        let (service, structure_id) = service_with_structure().await;
        let contract = service
            .create_contract(&admin(), erc3643_request(&structure_id))
            .await
            .unwrap();

        let mut request = deployed_request("0xABCD");
        request.block_number = None;
        let err = service
            .transition(&admin(), &contract.id, request)
            .await
            .unwrap_err();
        assert!(matches!(err, FundError::Validation(_)));

        let unchanged = service.get_contract(&admin(), &contract.id).await.unwrap();
        assert_eq!(unchanged.status, DeploymentStatus::Pending);
    }

    #[tokio::test]
    async fn metadata_updates_never_touch_the_status() {
        let (service, structure_id) = service_with_structure().await;
        let contract = service
            .create_contract(&admin(), erc3643_request(&structure_id))
            .await
            .unwrap();
        service
            .transition(&admin(), &contract.id, deployed_request("0xABCD"))
            .await
            .unwrap();

        let renamed = service
            .update_metadata(
                &admin(),
                &contract.id,
                ContractMetadataRequest {
                    token_name: Some("Fund Token II".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(renamed.token_name, "Fund Token II");
        assert_eq!(renamed.status, DeploymentStatus::Deployed);
        assert_eq!(renamed.contract_address.as_deref(), Some("0xABCD"));
    }

    #[tokio::test]
    async fn unknown_structure_reference_is_rejected() {
        let (service, _) = service_with_structure().await;
        let err = service
            .create_contract(&admin(), erc3643_request("s-missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, FundError::Validation(_)));
    }

    #[tokio::test]
    async fn status_transitions_require_admin_rank() {
        let (service, structure_id) = service_with_structure().await;
        let contract = service
            .create_contract(&admin(), erc3643_request(&structure_id))
            .await
            .unwrap();

        let investor = Actor::new("user-inv", Role::Investor);
        let err = service
            .transition(&investor, &contract.id, deploying_request())
            .await
            .unwrap_err();
        assert!(matches!(err, FundError::AuthorizationDenied(_)));
    }
}
