use crate::error::FundError;
use crate::roles::Role;
use serde::{Deserialize, Serialize};

/// Resolved caller identity supplied by the auth/session collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

/// Closed set of gated domain operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ViewOwnProfile,
    UpdateOwnProfile,
    ViewAnyProfile,
    ListUsers,
    UpdateUserStatus,
    DeleteUser,
    CreateStructure,
    ViewStructure,
    UpdateStructure,
    DeleteStructure,
    CreateInvestment,
    DeleteInvestment,
    CreateContract,
    ViewContract,
    UpdateContract,
    DeployContract,
    UpdateContractStatus,
    DeleteContract,
}

/// Ownership/role context of the targeted resource, when the operation has
/// a target. Absent fields simply skip the corresponding rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceContext {
    pub owner: Option<String>,
    pub target_role: Option<Role>,
}

impl ResourceContext {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn owned_by(owner: impl Into<String>) -> Self {
        Self {
            owner: Some(owner.into()),
            target_role: None,
        }
    }

    pub fn user_target(owner: impl Into<String>, role: Role) -> Self {
        Self {
            owner: Some(owner.into()),
            target_role: Some(role),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "decision", content = "reason")]
pub enum AccessDecision {
    Allow,
    Deny(String),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    fn deny(reason: &str) -> Self {
        Self::Deny(reason.to_string())
    }
}

/// Per-operation access requirement. One of the scopes below applies to
/// every operation; the match in `requirement` is exhaustive so the
/// evaluator is total over the declared operation set.
enum Requirement {
    /// Only root-ranked actors.
    RootOnly,
    /// The resource owner; `view_any_floor` optionally grants the
    /// operation class to equal-or-more-privileged roles.
    Owner { view_any_floor: Option<Role> },
    /// Any actor at or above the role floor.
    MinRole(Role),
}

fn requirement(operation: Operation) -> Requirement {
    match operation {
        Operation::ViewOwnProfile => Requirement::Owner {
            view_any_floor: Some(Role::Staff),
        },
        Operation::UpdateOwnProfile => Requirement::Owner {
            view_any_floor: None,
        },
        Operation::ViewAnyProfile => Requirement::MinRole(Role::Staff),
        Operation::ListUsers | Operation::UpdateUserStatus | Operation::DeleteUser => {
            Requirement::RootOnly
        }
        Operation::CreateStructure => Requirement::MinRole(Role::Admin),
        Operation::ViewStructure | Operation::ViewContract => Requirement::MinRole(Role::Investor),
        Operation::UpdateStructure | Operation::DeleteStructure => Requirement::Owner {
            view_any_floor: None,
        },
        Operation::CreateInvestment
        | Operation::DeleteInvestment
        | Operation::CreateContract
        | Operation::UpdateContract
        | Operation::DeployContract
        | Operation::UpdateContractStatus
        | Operation::DeleteContract => Requirement::MinRole(Role::Admin),
    }
}

/// True for operations that mutate a user account's standing. These are the
/// operations the root-target invariant protects.
fn modifies_account(operation: Operation) -> bool {
    matches!(
        operation,
        Operation::UpdateUserStatus | Operation::DeleteUser
    )
}

/// Single authorization choke point. Pure and synchronous; must be consulted
/// before any state-mutating round-trip is issued. Rules are evaluated in
/// order and the first match wins.
pub fn authorize(actor: &Actor, operation: Operation, resource: &ResourceContext) -> AccessDecision {
    // Structural invariant: a root account cannot be deactivated, demoted,
    // or deleted by anyone, root actors included.
    if modifies_account(operation) && resource.target_role == Some(Role::Root) {
        return AccessDecision::deny("cannot modify root account");
    }

    if actor.role.is_root() {
        return AccessDecision::Allow;
    }

    match requirement(operation) {
        Requirement::RootOnly => AccessDecision::deny("root access required"),
        Requirement::Owner { view_any_floor } => {
            if resource.owner.as_deref() == Some(actor.id.as_str()) {
                return AccessDecision::Allow;
            }
            match view_any_floor {
                Some(floor) if actor.role.is_at_least(floor) => AccessDecision::Allow,
                _ => AccessDecision::deny("not resource owner"),
            }
        }
        Requirement::MinRole(floor) => {
            if actor.role.is_at_least(floor) {
                AccessDecision::Allow
            } else {
                AccessDecision::deny("insufficient privilege")
            }
        }
    }
}

/// Evaluator wrapper used by the domain services: converts a denial into the
/// typed error the route layer maps to 403.
pub fn require(
    actor: &Actor,
    operation: Operation,
    resource: &ResourceContext,
) -> Result<(), FundError> {
    match authorize(actor, operation, resource) {
        AccessDecision::Allow => Ok(()),
        AccessDecision::Deny(reason) => Err(FundError::AuthorizationDenied(reason)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_OPERATIONS: &[Operation] = &[
        Operation::ViewOwnProfile,
        Operation::UpdateOwnProfile,
        Operation::ViewAnyProfile,
        Operation::ListUsers,
        Operation::UpdateUserStatus,
        Operation::DeleteUser,
        Operation::CreateStructure,
        Operation::ViewStructure,
        Operation::UpdateStructure,
        Operation::DeleteStructure,
        Operation::CreateInvestment,
        Operation::DeleteInvestment,
        Operation::CreateContract,
        Operation::ViewContract,
        Operation::UpdateContract,
        Operation::DeployContract,
        Operation::UpdateContractStatus,
        Operation::DeleteContract,
    ];

    fn root() -> Actor {
        Actor::new("user-root", Role::Root)
    }

    #[test]
    fn root_is_allowed_every_operation_except_root_target_modification() {
        for operation in ALL_OPERATIONS {
            let decision = authorize(&root(), *operation, &ResourceContext::none());
            assert!(decision.is_allowed(), "root denied {operation:?}");
        }
    }

    #[test]
    fn nobody_can_modify_a_root_account() {
        let target = ResourceContext::user_target("user-other-root", Role::Root);
        for actor in [
            root(),
            Actor::new("user-admin", Role::Admin),
            Actor::new("user-inv", Role::Investor),
        ] {
            for operation in [Operation::UpdateUserStatus, Operation::DeleteUser] {
                assert_eq!(
                    authorize(&actor, operation, &target),
                    AccessDecision::Deny("cannot modify root account".to_string()),
                );
            }
        }
    }

    #[test]
    fn root_only_operations_deny_everyone_else() {
        let admin = Actor::new("user-admin", Role::Admin);
        let target = ResourceContext::user_target("user-x", Role::Investor);
        for operation in [
            Operation::ListUsers,
            Operation::UpdateUserStatus,
            Operation::DeleteUser,
        ] {
            assert_eq!(
                authorize(&admin, operation, &target),
                AccessDecision::Deny("root access required".to_string()),
            );
        }
    }

    #[test]
    fn owner_scoped_operations_match_on_identity() {
        let investor = Actor::new("user-inv", Role::Investor);
        let own = ResourceContext::owned_by("user-inv");
        let foreign = ResourceContext::owned_by("user-other");

        assert!(authorize(&investor, Operation::ViewOwnProfile, &own).is_allowed());
        assert!(authorize(&investor, Operation::UpdateOwnProfile, &own).is_allowed());
        assert_eq!(
            authorize(&investor, Operation::UpdateOwnProfile, &foreign),
            AccessDecision::Deny("not resource owner".to_string()),
        );
    }

    #[test]
    fn staff_alias_group_gets_view_any_capability() {
        let foreign = ResourceContext::owned_by("user-other");
        for role in [Role::Staff, Role::Support, Role::Admin] {
            let actor = Actor::new("user-staffish", role);
            assert!(authorize(&actor, Operation::ViewOwnProfile, &foreign).is_allowed());
        }

        let guest = Actor::new("user-guest", Role::Guest);
        assert!(!authorize(&guest, Operation::ViewOwnProfile, &foreign).is_allowed());
    }

    #[test]
    fn role_floor_gates_structure_and_contract_mutations() {
        let investor = Actor::new("user-inv", Role::Investor);
        assert_eq!(
            authorize(&investor, Operation::CreateStructure, &ResourceContext::none()),
            AccessDecision::Deny("insufficient privilege".to_string()),
        );
        assert!(authorize(&investor, Operation::ViewStructure, &ResourceContext::none())
            .is_allowed());

        let admin = Actor::new("user-admin", Role::Admin);
        assert!(authorize(&admin, Operation::CreateStructure, &ResourceContext::none())
            .is_allowed());
        assert!(authorize(&admin, Operation::DeployContract, &ResourceContext::none())
            .is_allowed());
    }

    #[test]
    fn evaluator_is_total_and_deterministic() {
        let contexts = [
            ResourceContext::none(),
            ResourceContext::owned_by("user-a"),
            ResourceContext::user_target("user-a", Role::Root),
            ResourceContext::user_target("user-a", Role::Investor),
        ];
        for operation in ALL_OPERATIONS {
            for context in &contexts {
                for role in [Role::Root, Role::Admin, Role::Support, Role::Guest] {
                    let actor = Actor::new("user-a", role);
                    let first = authorize(&actor, *operation, context);
                    let second = authorize(&actor, *operation, context);
                    assert_eq!(first, second);
                }
            }
        }
    }

    #[test]
    fn require_surfaces_denial_as_typed_error() {
        let guest = Actor::new("user-guest", Role::Guest);
        let err = require(&guest, Operation::ListUsers, &ResourceContext::none()).unwrap_err();
        assert!(matches!(err, FundError::AuthorizationDenied(_)));
    }
}
