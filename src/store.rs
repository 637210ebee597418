// File: ./src/store.rs
//! Reminder policy store: in-memory policy backed by `reminders.json`.
//!
//! Loading never fails. Missing or malformed data yields the default policy.
//! Updates are merged in memory first and then written as a whole object; when the
//! write fails the in-memory policy stays authoritative and the next update retries.
use crate::context::SharedContext;
use crate::error::{EngineError, EngineResult};
use crate::model::policy::{ReminderPolicy, ReminderPolicyPatch};
use crate::storage::LocalStorage;

#[derive(Debug)]
pub struct PolicyStore {
    ctx: SharedContext,
    policy: ReminderPolicy,
    /// Set when the last write failed; cleared by the next successful one.
    persist_pending: bool,
}

impl PolicyStore {
    /// Builds the store and loads the persisted policy.
    pub fn open(ctx: SharedContext) -> Self {
        let policy = Self::load_from(&ctx);
        Self {
            ctx,
            policy,
            persist_pending: false,
        }
    }

    fn load_from(ctx: &SharedContext) -> ReminderPolicy {
        let path = match ctx.get_policy_path() {
            Ok(p) => p,
            Err(e) => {
                log::warn!("Policy path unavailable, using defaults: {}", e);
                return ReminderPolicy::default();
            }
        };

        match LocalStorage::load_json::<ReminderPolicy>(&path) {
            Ok(Some(policy)) => policy.sanitized(),
            Ok(None) => ReminderPolicy::default(),
            Err(e) => {
                log::warn!("Ignoring unreadable reminder policy: {:#}", e);
                ReminderPolicy::default()
            }
        }
    }

    /// Re-reads the persisted policy, replacing the in-memory copy.
    pub fn load(&mut self) -> ReminderPolicy {
        self.policy = Self::load_from(&self.ctx);
        self.persist_pending = false;
        self.policy.clone()
    }

    pub fn policy(&self) -> &ReminderPolicy {
        &self.policy
    }

    pub fn persist_pending(&self) -> bool {
        self.persist_pending
    }

    /// Shallow-merges `patch` into the current policy and persists the full result.
    ///
    /// Only validation errors are returned. Persistence failures are logged and
    /// leave the merged policy in effect for this session.
    pub fn update(&mut self, patch: &ReminderPolicyPatch) -> EngineResult<ReminderPolicy> {
        let next = self.policy.merged(patch)?;
        self.policy = next;

        if let Err(e) = self.persist() {
            log::warn!("{}", e);
            self.persist_pending = true;
        } else {
            self.persist_pending = false;
        }

        Ok(self.policy.clone())
    }

    fn persist(&self) -> EngineResult<()> {
        let path = self
            .ctx
            .get_policy_path()
            .map_err(|e| EngineError::PersistenceFailure(e.to_string()))?;
        LocalStorage::save_json(&path, &self.policy)
            .map_err(|e| EngineError::PersistenceFailure(format!("{:#}", e)))
    }
}
