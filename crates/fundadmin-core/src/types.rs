use crate::roles::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Platform user account.
///
/// Root accounts are provisioned out of band and can never be deactivated,
/// demoted, or deleted through this layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: impl Into<String>, display_name: impl Into<String>, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.into(),
            display_name: display_name.into(),
            role,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Closed set of legal structure types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StructureType {
    Fund,
    SaLlc,
    Spv,
    Trust,
    Gmbh,
}

/// Financial rollup block, replaced atomically as one unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FinancialRollup {
    pub total_called_minor: i64,
    pub total_distributed_minor: i64,
    pub total_invested_minor: i64,
    pub management_fee_bps: u32,
    pub carried_interest_bps: u32,
}

/// A node in the structure forest.
///
/// `parent_id` is a relation and lookup key, never an ownership edge:
/// deleting a parent leaves children in place with the dangling reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Structure {
    pub id: String,
    pub name: String,
    pub structure_type: StructureType,
    pub parent_id: Option<String>,
    pub hierarchy_level: u32,
    pub created_by: String,
    pub base_currency: String,
    pub financials: FinancialRollup,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Investment record tying one investor to one structure. Consumed here
/// only by the read-time aggregate computation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Investment {
    pub id: String,
    pub structure_id: String,
    pub investor_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub committed_at: DateTime<Utc>,
}

/// Token contract kind. ERC3643 and ERC20 are first-class; the set stays
/// open for future standards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum ContractKind {
    Erc3643,
    Erc20,
    Other(String),
}

impl From<String> for ContractKind {
    fn from(value: String) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "ERC3643" => Self::Erc3643,
            "ERC20" => Self::Erc20,
            _ => Self::Other(value),
        }
    }
}

impl From<ContractKind> for String {
    fn from(kind: ContractKind) -> Self {
        match kind {
            ContractKind::Erc3643 => "ERC3643".to_string(),
            ContractKind::Erc20 => "ERC20".to_string(),
            ContractKind::Other(other) => other,
        }
    }
}

/// Deployment lifecycle states. `Deployed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Pending,
    Deploying,
    Deployed,
    Failed,
}

impl DeploymentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Deployed | Self::Failed)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Deploying => "deploying",
            Self::Deployed => "deployed",
            Self::Failed => "failed",
        }
    }
}

/// Token metadata carried by every contract record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenMetadata {
    pub token_name: String,
    pub token_symbol: String,
    pub max_supply: u64,
    pub token_value_minor: i64,
}

/// On-chain confirmation required to enter `Deployed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeployedDetails {
    pub contract_address: String,
    pub transaction_hash: String,
    pub block_number: u64,
}

/// One tokenization deployment record tied to a structure by reference.
///
/// Invariant: success fields are populated exactly when status is
/// `Deployed`, failure fields exactly when status is `Failed`, and neither
/// while the record is still in flight.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SmartContract {
    pub id: String,
    pub structure_id: String,
    pub kind: ContractKind,
    pub token: TokenMetadata,
    pub network: String,
    pub status: DeploymentStatus,
    pub deployed_by: String,
    pub contract_address: Option<String>,
    pub transaction_hash: Option<String>,
    pub block_number: Option<u64>,
    pub deployed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub failed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- API shapes -----------------------------------------------------------
//
// The external API speaks camelCase while storage documents keep the record
// field names above. This section is the single place the bidirectional
// mapping occurs; handlers and storage never rename fields themselves.

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserRequest {
    pub email: String,
    pub display_name: String,
    pub role: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub email: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusRequest {
    pub active: Option<bool>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            display_name: user.display_name,
            role: user.role,
            active: user.active,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStructureRequest {
    pub name: String,
    pub structure_type: StructureType,
    pub base_currency: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub management_fee_bps: u32,
    #[serde(default)]
    pub carried_interest_bps: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStructureRequest {
    pub name: Option<String>,
    pub base_currency: Option<String>,
    /// Missing = keep the current parent; `null` = detach to a root node;
    /// a value = reparent under that structure.
    #[serde(default, with = "double_option")]
    pub parent_id: Option<Option<String>>,
}

/// Full replacement of the financial rollup block.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialsRequest {
    pub total_called_minor: i64,
    pub total_distributed_minor: i64,
    pub total_invested_minor: i64,
    pub management_fee_bps: u32,
    pub carried_interest_bps: u32,
}

impl From<FinancialsRequest> for FinancialRollup {
    fn from(request: FinancialsRequest) -> Self {
        Self {
            total_called_minor: request.total_called_minor,
            total_distributed_minor: request.total_distributed_minor,
            total_invested_minor: request.total_invested_minor,
            management_fee_bps: request.management_fee_bps,
            carried_interest_bps: request.carried_interest_bps,
        }
    }
}

/// Conjunctive listing filter; absent fields match everything.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureFilter {
    pub created_by: Option<String>,
    pub structure_type: Option<StructureType>,
    pub parent_id: Option<String>,
}

/// Structure decorated with aggregates recomputed at read time.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StructureView {
    pub id: String,
    pub name: String,
    pub structure_type: StructureType,
    pub parent_id: Option<String>,
    pub hierarchy_level: u32,
    pub created_by: String,
    pub base_currency: String,
    pub total_called_minor: i64,
    pub total_distributed_minor: i64,
    pub total_invested_minor: i64,
    pub management_fee_bps: u32,
    pub carried_interest_bps: u32,
    pub current_investors: u64,
    pub current_investments: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StructureView {
    pub fn decorate(structure: Structure, current_investors: u64, current_investments: u64) -> Self {
        Self {
            id: structure.id,
            name: structure.name,
            structure_type: structure.structure_type,
            parent_id: structure.parent_id,
            hierarchy_level: structure.hierarchy_level,
            created_by: structure.created_by,
            base_currency: structure.base_currency,
            total_called_minor: structure.financials.total_called_minor,
            total_distributed_minor: structure.financials.total_distributed_minor,
            total_invested_minor: structure.financials.total_invested_minor,
            management_fee_bps: structure.financials.management_fee_bps,
            carried_interest_bps: structure.financials.carried_interest_bps,
            current_investors,
            current_investments,
            created_at: structure.created_at,
            updated_at: structure.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInvestmentRequest {
    pub structure_id: String,
    pub investor_id: String,
    pub amount_minor: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InvestmentView {
    pub id: String,
    pub structure_id: String,
    pub investor_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub committed_at: DateTime<Utc>,
}

impl From<Investment> for InvestmentView {
    fn from(investment: Investment) -> Self {
        Self {
            id: investment.id,
            structure_id: investment.structure_id,
            investor_id: investment.investor_id,
            amount_minor: investment.amount_minor,
            currency: investment.currency,
            committed_at: investment.committed_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContractRequest {
    pub structure_id: String,
    pub kind: ContractKind,
    pub token_name: String,
    pub token_symbol: String,
    pub max_supply: u64,
    pub token_value_minor: i64,
    pub network: String,
    #[serde(default)]
    pub initial_status: Option<DeploymentStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractMetadataRequest {
    pub token_name: Option<String>,
    pub token_symbol: Option<String>,
    pub max_supply: Option<u64>,
    pub token_value_minor: Option<i64>,
    pub network: Option<String>,
}

/// Status transition request. Success/failure fields are required by the
/// target state and rejected otherwise.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractStatusRequest {
    pub status: DeploymentStatus,
    pub contract_address: Option<String>,
    pub transaction_hash: Option<String>,
    pub block_number: Option<u64>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContractView {
    pub id: String,
    pub structure_id: String,
    pub kind: ContractKind,
    pub token_name: String,
    pub token_symbol: String,
    pub max_supply: u64,
    pub token_value_minor: i64,
    pub network: String,
    pub status: DeploymentStatus,
    pub deployed_by: String,
    pub contract_address: Option<String>,
    pub transaction_hash: Option<String>,
    pub block_number: Option<u64>,
    pub deployed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub failed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SmartContract> for ContractView {
    fn from(contract: SmartContract) -> Self {
        Self {
            id: contract.id,
            structure_id: contract.structure_id,
            kind: contract.kind,
            token_name: contract.token.token_name,
            token_symbol: contract.token.token_symbol,
            max_supply: contract.token.max_supply,
            token_value_minor: contract.token.token_value_minor,
            network: contract.network,
            status: contract.status,
            deployed_by: contract.deployed_by,
            contract_address: contract.contract_address,
            transaction_hash: contract.transaction_hash,
            block_number: contract.block_number,
            deployed_at: contract.deployed_at,
            error_message: contract.error_message,
            failed_at: contract.failed_at,
            created_at: contract.created_at,
            updated_at: contract.updated_at,
        }
    }
}

mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_kind_is_an_open_set() {
        assert_eq!(ContractKind::from("erc20".to_string()), ContractKind::Erc20);
        assert_eq!(
            ContractKind::from("ERC3643".to_string()),
            ContractKind::Erc3643
        );
        assert_eq!(
            ContractKind::from("ERC1400".to_string()),
            ContractKind::Other("ERC1400".to_string())
        );
        assert_eq!(String::from(ContractKind::Erc3643), "ERC3643");
    }

    #[test]
    fn terminal_states_are_deployed_and_failed() {
        assert!(DeploymentStatus::Deployed.is_terminal());
        assert!(DeploymentStatus::Failed.is_terminal());
        assert!(!DeploymentStatus::Pending.is_terminal());
        assert!(!DeploymentStatus::Deploying.is_terminal());
    }

    #[test]
    fn api_shape_is_camel_case_and_storage_shape_is_not() {
        let structure = Structure {
            id: "s-1".to_string(),
            name: "Test Fund".to_string(),
            structure_type: StructureType::Fund,
            parent_id: None,
            hierarchy_level: 0,
            created_by: "user-123".to_string(),
            base_currency: "USD".to_string(),
            financials: FinancialRollup::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let stored = serde_json::to_value(&structure).unwrap();
        assert!(stored.get("base_currency").is_some());
        assert!(stored.get("baseCurrency").is_none());

        let view = serde_json::to_value(StructureView::decorate(structure, 0, 0)).unwrap();
        assert!(view.get("baseCurrency").is_some());
        assert!(view.get("base_currency").is_none());
        assert_eq!(view.get("currentInvestors").unwrap(), 0);
    }

    #[test]
    fn reparent_request_distinguishes_missing_from_null() {
        let keep: UpdateStructureRequest = serde_json::from_str(r#"{"name":"Renamed"}"#).unwrap();
        assert_eq!(keep.parent_id, None);

        let detach: UpdateStructureRequest = serde_json::from_str(r#"{"parentId":null}"#).unwrap();
        assert_eq!(detach.parent_id, Some(None));

        let attach: UpdateStructureRequest =
            serde_json::from_str(r#"{"parentId":"s-parent"}"#).unwrap();
        assert_eq!(attach.parent_id, Some(Some("s-parent".to_string())));
    }
}
