//! Everything a planner component needs, passed in explicitly.

use std::{collections::HashSet, sync::Arc};

use domain::models::rota::Permission;

use super::{
    config::{ConfigError, PlannerConfig},
    notification::Notifier,
    rota_api::{HttpRotaApi, RotaApi, RotaApiError},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet(HashSet<Permission>);

impl PermissionSet {
    pub fn new(permissions: impl IntoIterator<Item = Permission>) -> Self {
        Self(permissions.into_iter().collect())
    }

    pub fn all() -> Self {
        Self::new([Permission::RotaPublish, Permission::RotaLock])
    }

    pub fn has(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] RotaApiError),
}

#[derive(Clone)]
pub struct PlannerContext {
    pub api: Arc<dyn RotaApi>,
    pub notifier: Arc<dyn Notifier>,
    pub permissions: PermissionSet,
    pub config: Arc<PlannerConfig>,
}

impl PlannerContext {
    pub fn new(
        api: Arc<dyn RotaApi>,
        notifier: Arc<dyn Notifier>,
        permissions: PermissionSet,
        config: Arc<PlannerConfig>,
    ) -> Self {
        Self {
            api,
            notifier,
            permissions,
            config,
        }
    }

    /// Wire the HTTP client described by `config`
    pub fn from_config(
        config: PlannerConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ContextError> {
        config.utc_offset()?;
        let api = HttpRotaApi::new(&config)?;
        let permissions = PermissionSet::new(config.permissions.iter().copied());
        Ok(Self::new(
            Arc::new(api),
            notifier,
            permissions,
            Arc::new(config),
        ))
    }
}
