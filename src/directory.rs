//! In-memory accounts and employee records
use super::roles::{ActorId, Role, RoleAuthority};
use super::slip::Requester;
use super::utils;
use std::collections::{BTreeSet, HashMap};

const SEARCH_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: ActorId,
    pub username: String,
    pub email: String,
    pub roles: BTreeSet<Role>,
}

/// Application accounts and their role memberships.
#[derive(Debug, Default)]
pub struct Directory {
    accounts: HashMap<ActorId, Account>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a fresh `user_` address for the account.
    pub fn register(&mut self, username: &str, email: &str, roles: &[Role]) -> anyhow::Result<ActorId> {
        let id = ActorId::from(utils::mint_address(utils::ACCOUNT_PREFIX)?);
        self.accounts.insert(
            id.clone(),
            Account {
                id: id.clone(),
                username: username.to_string(),
                email: email.to_string(),
                roles: roles.iter().copied().collect(),
            },
        );
        Ok(id)
    }

    pub fn grant(&mut self, actor: &ActorId, role: Role) -> bool {
        match self.accounts.get_mut(actor) {
            Some(account) => account.roles.insert(role),
            None => false,
        }
    }

    pub fn revoke(&mut self, actor: &ActorId, role: Role) -> bool {
        match self.accounts.get_mut(actor) {
            Some(account) => account.roles.remove(&role),
            None => false,
        }
    }

    pub fn account(&self, actor: &ActorId) -> Option<&Account> {
        self.accounts.get(actor)
    }
}

impl RoleAuthority for Directory {
    fn actor_has_role(&self, actor: &ActorId, role: Role) -> bool {
        self.accounts
            .get(actor)
            .is_some_and(|a| a.roles.contains(&role))
    }

    fn emails_with_role(&self, role: Role) -> Vec<String> {
        let mut emails: Vec<String> = self
            .accounts
            .values()
            .filter(|a| a.roles.contains(&role) && !a.email.trim().is_empty())
            .map(|a| a.email.clone())
            .collect();
        emails.sort();
        emails.dedup();
        emails
    }

    fn email_of(&self, actor: &ActorId) -> Option<String> {
        self.accounts
            .get(actor)
            .map(|a| a.email.trim())
            .filter(|e| !e.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Employee {
    pub code: String,
    pub name: String,
    pub email: String,
    pub title: String,
    pub department: String,
}

/// Staff register used to fill in a slip's requester header.
#[derive(Debug, Default)]
pub struct EmployeeDirectory {
    by_code: HashMap<String, Employee>,
}

impl EmployeeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Codes are unique, a second insert replaces the first.
    pub fn insert(&mut self, employee: Employee) -> Option<Employee> {
        self.by_code.insert(employee.code.clone(), employee)
    }

    pub fn find_by_code(&self, code: &str) -> Option<&Employee> {
        self.by_code.get(code.trim())
    }

    /// Case-insensitive substring match on code or name, ordered by code.
    pub fn search(&self, query: &str) -> Vec<&Employee> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return vec![];
        }
        let mut hits: Vec<&Employee> = self
            .by_code
            .values()
            .filter(|e| {
                e.code.to_lowercase().contains(&needle) || e.name.to_lowercase().contains(&needle)
            })
            .collect();
        hits.sort_by(|a, b| a.code.cmp(&b.code));
        hits.truncate(SEARCH_LIMIT);
        hits
    }
}

impl From<&Employee> for Requester {
    fn from(value: &Employee) -> Self {
        Requester {
            employee_code: value.code.clone(),
            name: value.name.clone(),
            email: value.email.clone(),
            title: value.title.clone(),
            department: value.department.clone(),
        }
    }
}
