//! Per-scope budget policies.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::scope::BudgetScope;
use super::store::PolicyStore;
use super::BudgetResult;

/// What happens when a scope crosses its soft limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SoftLimitAction {
    /// Substitute cheaper call parameters (model, token cap, RAG off).
    #[default]
    Degrade,
}

/// Budget configuration for one scope. At most one policy exists per scope.
///
/// Mutated only through [`PolicyResolver::update`], which replaces all fields
/// atomically; the policy is never patched field-by-field from multiple
/// callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetPolicy {
    pub scope: BudgetScope,
    /// Hard monthly spend ceiling. Absent means unlimited.
    pub month_limit: Option<Decimal>,
    /// Soft monthly spend threshold triggering `soft_action`.
    pub soft_limit: Option<Decimal>,
    pub soft_action: SoftLimitAction,
    /// Raw provider→replacement-model mapping, decoded lazily via
    /// [`BudgetPolicy::degrade_model_map`].
    pub degrade_models: Option<String>,
    pub max_output_tokens: u32,
    pub disable_rag: bool,
    pub enabled: bool,
}

impl BudgetPolicy {
    pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 512;

    /// Safe defaults: no limits, degrade on soft-exceed, 512 output tokens,
    /// RAG left on, enforcement enabled.
    pub fn default_for(scope: BudgetScope) -> Self {
        Self {
            scope,
            month_limit: None,
            soft_limit: None,
            soft_action: SoftLimitAction::default(),
            degrade_models: None,
            max_output_tokens: Self::DEFAULT_MAX_OUTPUT_TOKENS,
            disable_rag: false,
            enabled: true,
        }
    }

    /// Decode the stored degrade mapping.
    ///
    /// A malformed or absent mapping degrades to an empty map rather than
    /// raising; the failure is logged once at the decode site.
    pub fn degrade_model_map(&self) -> DegradeModelMap {
        let Some(raw) = self.degrade_models.as_deref() else {
            return DegradeModelMap::default();
        };
        match DegradeModelMap::decode(raw) {
            Ok(map) => map,
            Err(err) => {
                tracing::warn!(
                    scope = %self.scope,
                    error = %err,
                    "malformed degrade model map, treating as empty"
                );
                DegradeModelMap::default()
            }
        }
    }
}

/// Typed provider→replacement-model mapping.
///
/// The stored form is a versioned JSON envelope; a legacy bare
/// `{"provider": "model"}` object is still accepted on decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradeModelMap {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub models: HashMap<String, String>,
}

impl Default for DegradeModelMap {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            models: HashMap::new(),
        }
    }
}

impl DegradeModelMap {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn with_model(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.models.insert(provider.into(), model.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        use serde::de::Error;

        let value: serde_json::Value = serde_json::from_str(raw)?;
        let serde_json::Value::Object(obj) = value else {
            return Err(serde_json::Error::custom(
                "degrade model map must be a JSON object",
            ));
        };
        if obj.contains_key("models") {
            serde_json::from_value(serde_json::Value::Object(obj))
        } else {
            let models: HashMap<String, String> =
                serde_json::from_value(serde_json::Value::Object(obj))?;
            Ok(Self { version: 0, models })
        }
    }

    pub fn encode(&self) -> BudgetResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Replacement model for a provider key.
    ///
    /// The key is trimmed first; a blank key yields no match, not an error.
    pub fn model_for(&self, provider_key: &str) -> Option<&str> {
        let key = provider_key.trim();
        if key.is_empty() {
            return None;
        }
        self.models.get(key).map(String::as_str)
    }
}

/// Full-replacement update for a policy.
///
/// `None` means "reset to default", not "leave unchanged".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyUpdate {
    pub month_limit: Option<Decimal>,
    pub soft_limit: Option<Decimal>,
    pub soft_action: Option<SoftLimitAction>,
    pub degrade_models: Option<String>,
    pub max_output_tokens: Option<u32>,
    pub disable_rag: Option<bool>,
    pub enabled: Option<bool>,
}

/// Policy lookup and lifecycle over a [`PolicyStore`].
#[derive(Clone)]
pub struct PolicyResolver {
    store: Arc<dyn PolicyStore>,
}

impl PolicyResolver {
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self { store }
    }

    /// The stored policy, or `None`. Absence means "no limits, not enforced";
    /// consumers must never treat it as an implicit block.
    pub async fn find_policy(&self, scope: &BudgetScope) -> BudgetResult<Option<BudgetPolicy>> {
        self.store.find(scope).await
    }

    /// Create and persist the safe-default policy for a scope.
    pub async fn create_default(&self, scope: &BudgetScope) -> BudgetResult<BudgetPolicy> {
        let policy = BudgetPolicy::default_for(scope.clone());
        self.store.upsert(&policy).await?;
        Ok(policy)
    }

    /// Replace every field of the scope's policy at once.
    pub async fn update(
        &self,
        scope: &BudgetScope,
        update: PolicyUpdate,
    ) -> BudgetResult<BudgetPolicy> {
        let policy = BudgetPolicy {
            scope: scope.clone(),
            month_limit: update.month_limit,
            soft_limit: update.soft_limit,
            soft_action: update.soft_action.unwrap_or_default(),
            degrade_models: update.degrade_models,
            max_output_tokens: update
                .max_output_tokens
                .unwrap_or(BudgetPolicy::DEFAULT_MAX_OUTPUT_TOKENS),
            disable_rag: update.disable_rag.unwrap_or(false),
            enabled: update.enabled.unwrap_or(true),
        };
        self.store.upsert(&policy).await?;
        Ok(policy)
    }
}
