//! External collaborators the engine consumes: the user directory (identity and
//! permissions) and the team registry.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use uuid::Uuid;

use flowdesk_core::AppError;

/// Capabilities the engine asks the directory about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Modify or delete any workflow regardless of creator/assignee
    ModifyAnyWorkflow,
    /// See restricted templates of other users
    ViewAllTemplates,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[async_trait::async_trait]
pub trait DirectoryService: Send + Sync {
    async fn resolve_user(&self, user_id: Uuid) -> Result<Option<UserProfile>, AppError>;

    async fn has_permission(&self, user_id: Uuid, permission: Permission)
        -> Result<bool, AppError>;
}

#[async_trait::async_trait]
pub trait TeamRegistry: Send + Sync {
    async fn team_exists(&self, team_id: Uuid) -> Result<bool, AppError>;

    async fn is_team_member(&self, user_id: Uuid, team_id: Uuid) -> Result<bool, AppError>;
}

#[derive(Debug, Clone, Deserialize)]
struct TeamEntry {
    id: Uuid,
    #[serde(default)]
    members: Vec<Uuid>,
}

/// On-disk shape accepted by [`StaticDirectory::from_json_file`]
#[derive(Debug, Clone, Default, Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    users: Vec<UserProfile>,
    #[serde(default)]
    teams: Vec<TeamEntry>,
    /// Role name to granted permissions; merged over the default table
    #[serde(default)]
    roles: HashMap<String, Vec<Permission>>,
}

/// In-memory directory and team registry
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    users: HashMap<Uuid, UserProfile>,
    role_permissions: HashMap<String, HashSet<Permission>>,
    teams: HashMap<Uuid, HashSet<Uuid>>,
}

impl StaticDirectory {
    /// Empty directory with the stock role table (`admin`, `manager`, `supervisor`).
    pub fn new() -> Self {
        let mut directory = Self::default();
        directory
            .grant("admin", Permission::ModifyAnyWorkflow)
            .grant("admin", Permission::ViewAllTemplates)
            .grant("manager", Permission::ModifyAnyWorkflow)
            .grant("manager", Permission::ViewAllTemplates)
            .grant("supervisor", Permission::ViewAllTemplates);
        directory
    }

    pub fn from_json_file(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        let file: DirectoryFile = serde_json::from_str(&raw)?;

        let mut directory = Self::new();
        for (role, permissions) in file.roles {
            for permission in permissions {
                directory.grant(&role, permission);
            }
        }
        for user in file.users {
            directory.users.insert(user.id, user);
        }
        for team in file.teams {
            directory
                .teams
                .entry(team.id)
                .or_default()
                .extend(team.members);
        }
        tracing::info!(
            users = directory.users.len(),
            teams = directory.teams.len(),
            path = %path.display(),
            "Loaded static directory"
        );
        Ok(directory)
    }

    pub fn grant(&mut self, role: &str, permission: Permission) -> &mut Self {
        self.role_permissions
            .entry(role.to_lowercase())
            .or_default()
            .insert(permission);
        self
    }

    pub fn add_user(&mut self, id: Uuid, name: &str, roles: &[&str]) -> &mut Self {
        self.users.insert(
            id,
            UserProfile {
                id,
                name: name.to_string(),
                roles: roles.iter().map(|r| r.to_string()).collect(),
            },
        );
        self
    }

    pub fn add_team(&mut self, team_id: Uuid, members: &[Uuid]) -> &mut Self {
        self.teams
            .entry(team_id)
            .or_default()
            .extend(members.iter().copied());
        self
    }

    fn user_has(&self, user_id: Uuid, permission: Permission) -> bool {
        let Some(user) = self.users.get(&user_id) else {
            return false;
        };
        user.roles.iter().any(|role| {
            self.role_permissions
                .get(&role.to_lowercase())
                .is_some_and(|granted| granted.contains(&permission))
        })
    }
}

#[async_trait::async_trait]
impl DirectoryService for StaticDirectory {
    async fn resolve_user(&self, user_id: Uuid) -> Result<Option<UserProfile>, AppError> {
        Ok(self.users.get(&user_id).cloned())
    }

    async fn has_permission(
        &self,
        user_id: Uuid,
        permission: Permission,
    ) -> Result<bool, AppError> {
        Ok(self.user_has(user_id, permission))
    }
}

#[async_trait::async_trait]
impl TeamRegistry for StaticDirectory {
    async fn team_exists(&self, team_id: Uuid) -> Result<bool, AppError> {
        Ok(self.teams.contains_key(&team_id))
    }

    async fn is_team_member(&self, user_id: Uuid, team_id: Uuid) -> Result<bool, AppError> {
        Ok(self
            .teams
            .get(&team_id)
            .is_some_and(|members| members.contains(&user_id)))
    }
}
