//! Roles and the capability used by every transition guard
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    DepartmentHead,
    Director,
    WarehouseKeeper,
    Administrator,
}

/// Identity of whoever acts on a slip, a bech32 `user_` address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, minicbor::Encode, minicbor::Decode)]
pub struct ActorId(#[n(0)] String);

/// Answers role questions for the engine. Passed in explicitly so guards
/// never consult a global registry.
pub trait RoleAuthority {
    fn actor_has_role(&self, actor: &ActorId, role: Role) -> bool;

    fn actor_is_administrator(&self, actor: &ActorId) -> bool {
        self.actor_has_role(actor, Role::Administrator)
    }

    /// Addresses of every holder of `role` that has an email on file.
    fn emails_with_role(&self, role: Role) -> Vec<String>;

    /// Address on file for `actor`, if any.
    fn email_of(&self, actor: &ActorId) -> Option<String>;

    /// Holds `role` directly or through the administrator override.
    fn satisfies(&self, actor: &ActorId, role: Role) -> bool {
        self.actor_is_administrator(actor) || self.actor_has_role(actor, role)
    }
}

impl<A: RoleAuthority + ?Sized> RoleAuthority for Arc<A> {
    fn actor_has_role(&self, actor: &ActorId, role: Role) -> bool {
        (**self).actor_has_role(actor, role)
    }
    fn actor_is_administrator(&self, actor: &ActorId) -> bool {
        (**self).actor_is_administrator(actor)
    }
    fn emails_with_role(&self, role: Role) -> Vec<String> {
        (**self).emails_with_role(role)
    }
    fn email_of(&self, actor: &ActorId) -> Option<String> {
        (**self).email_of(actor)
    }
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::DepartmentHead => "department_head",
            Role::Director => "director",
            Role::WarehouseKeeper => "warehouse_keeper",
            Role::Administrator => "administrator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ActorId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ActorId {
    fn from(value: &str) -> Self {
        ActorId(value.to_string())
    }
}

impl From<String> for ActorId {
    fn from(value: String) -> Self {
        ActorId(value)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
