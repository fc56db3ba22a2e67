//! Fund-administration domain engine.
//!
//! This crate owns the non-trivial rules of the platform: the role model and
//! authorization evaluator gating every mutation, the structure hierarchy
//! with read-time financial/investor aggregates, and the smart-contract
//! deployment lifecycle. Storage, auth-session resolution, and HTTP routing
//! are external collaborators behind seams defined here.

#![deny(unsafe_code)]

pub mod authz;
pub mod contracts;
pub mod error;
pub mod hierarchy;
pub mod investments;
pub mod roles;
pub mod storage;
pub mod types;
pub mod users;

pub use authz::{authorize, require, AccessDecision, Actor, Operation, ResourceContext};
pub use contracts::ContractService;
pub use error::FundError;
pub use hierarchy::StructureService;
pub use investments::InvestmentService;
pub use roles::{Role, ROLES};
pub use storage::{
    collections, DocumentStore, Filter, MemoryDocumentStore, PostgresDocumentStore, StoreConfig,
};
pub use types::{
    ContractKind, ContractMetadataRequest, ContractStatusRequest, ContractView, DeployedDetails,
    DeploymentStatus, FinancialRollup, FinancialsRequest, Investment, InvestmentView,
    NewContractRequest, NewInvestmentRequest, NewStructureRequest, RegisterUserRequest,
    SmartContract, Structure, StructureFilter, StructureType, StructureView, TokenMetadata,
    UpdateProfileRequest, UpdateStructureRequest, User, UserStatusRequest, UserView,
};
pub use users::{UserDeletionOutcome, UserService};
