//! Admission decisions against budget policies and current-month usage.
//!
//! Both entry points are read-only with respect to policy and usage: the
//! usage increment happens separately, after a call completes. A decision is
//! therefore advisory at the instant it is made — a bounded number of
//! concurrently in-flight requests near a limit boundary can transiently
//! exceed the limit before their usage is recorded. That race is accepted and
//! bounded by the in-flight count; closing it with storage transactions or a
//! global lock would cost latency on every call for no operational benefit.

use std::sync::Arc;

use rust_decimal::Decimal;

use super::policy::PolicyResolver;
use super::scope::{BudgetScope, ScopeKind, YearMonth};
use super::store::{PolicyStore, UsageStore};
use super::BudgetResult;

/// Why a request was refused outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    ProviderBudgetExceeded,
    WorkspaceBudgetExceeded,
    OrganizationBudgetExceeded,
}

impl BlockReason {
    pub fn budget_exceeded(kind: ScopeKind) -> Self {
        match kind {
            ScopeKind::ProviderCredential => BlockReason::ProviderBudgetExceeded,
            ScopeKind::Workspace => BlockReason::WorkspaceBudgetExceeded,
            ScopeKind::Organization => BlockReason::OrganizationBudgetExceeded,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            BlockReason::ProviderBudgetExceeded => "PROVIDER_BUDGET_EXCEEDED",
            BlockReason::WorkspaceBudgetExceeded => "WORKSPACE_BUDGET_EXCEEDED",
            BlockReason::OrganizationBudgetExceeded => "ORGANIZATION_BUDGET_EXCEEDED",
        }
    }
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Outcome of an admission check.
///
/// Every variant carries the evaluated scope and a reason so the decision can
/// be audit-logged even when it is an allow.
#[derive(Debug, Clone, PartialEq)]
pub enum BudgetDecision {
    Allow {
        scope: BudgetScope,
        reason: &'static str,
    },
    Degrade {
        scope: BudgetScope,
        reason: &'static str,
        model_override: Option<String>,
        max_output_tokens: u32,
        disable_rag: bool,
    },
    Block {
        scope: BudgetScope,
        reason: BlockReason,
    },
}

impl BudgetDecision {
    pub fn scope(&self) -> &BudgetScope {
        match self {
            BudgetDecision::Allow { scope, .. }
            | BudgetDecision::Degrade { scope, .. }
            | BudgetDecision::Block { scope, .. } => scope,
        }
    }

    pub fn reason_code(&self) -> &'static str {
        match self {
            BudgetDecision::Allow { reason, .. } | BudgetDecision::Degrade { reason, .. } => reason,
            BudgetDecision::Block { reason, .. } => reason.code(),
        }
    }

    /// Whether the call may proceed at all (possibly with degraded params).
    pub fn allows_call(&self) -> bool {
        !matches!(self, BudgetDecision::Block { .. })
    }
}

/// Combines policy and usage reads into admission decisions.
#[derive(Clone)]
pub struct BudgetGuard {
    policies: PolicyResolver,
    usage: Arc<dyn UsageStore>,
}

impl BudgetGuard {
    pub fn new(policies: Arc<dyn PolicyStore>, usage: Arc<dyn UsageStore>) -> Self {
        Self {
            policies: PolicyResolver::new(policies),
            usage,
        }
    }

    pub fn policies(&self) -> &PolicyResolver {
        &self.policies
    }

    /// Hard-limit check for a provider credential.
    ///
    /// No policy or no hard limit means allow — absence of configuration is
    /// never an implicit block. The comparison is inclusive: a scope that has
    /// spent exactly its limit is blocked.
    pub async fn evaluate_provider_credential(
        &self,
        credential_id: &str,
    ) -> BudgetResult<BudgetDecision> {
        let scope = BudgetScope::provider_credential(credential_id);
        let Some(policy) = self.policies.find_policy(&scope).await? else {
            return Ok(BudgetDecision::Allow {
                scope,
                reason: "no policy configured",
            });
        };
        if !policy.enabled {
            return Ok(BudgetDecision::Allow {
                scope,
                reason: "policy disabled",
            });
        }
        let Some(limit) = policy.month_limit else {
            return Ok(BudgetDecision::Allow {
                scope,
                reason: "no hard limit",
            });
        };

        let spent = self.current_month_spend(&scope).await?;
        if spent >= limit {
            let decision = BudgetDecision::Block {
                scope,
                reason: BlockReason::budget_exceeded(ScopeKind::ProviderCredential),
            };
            tracing::warn!(
                scope = %decision.scope(),
                %spent,
                %limit,
                "provider credential over hard budget limit"
            );
            return Ok(decision);
        }

        Ok(BudgetDecision::Allow {
            scope,
            reason: "spend under hard limit",
        })
    }

    /// Soft-limit check for a workspace.
    ///
    /// Past the soft limit the call still proceeds, but with the policy's
    /// degraded parameters. The degrade map is decoded only on this path; the
    /// common allow path never pays for it. Callers run the hard
    /// provider-credential check first, so a block is never silently
    /// overridden by a degrade.
    pub async fn evaluate_workspace_degrade(
        &self,
        workspace_id: &str,
        provider_key: &str,
    ) -> BudgetResult<BudgetDecision> {
        let scope = BudgetScope::workspace(workspace_id);
        let Some(policy) = self.policies.find_policy(&scope).await? else {
            return Ok(BudgetDecision::Allow {
                scope,
                reason: "no policy configured",
            });
        };
        if !policy.enabled {
            return Ok(BudgetDecision::Allow {
                scope,
                reason: "policy disabled",
            });
        }
        let Some(soft_limit) = policy.soft_limit else {
            return Ok(BudgetDecision::Allow {
                scope,
                reason: "no soft limit",
            });
        };

        let spent = self.current_month_spend(&scope).await?;
        if spent < soft_limit {
            return Ok(BudgetDecision::Allow {
                scope,
                reason: "spend under soft limit",
            });
        }

        let model_override = policy
            .degrade_model_map()
            .model_for(provider_key)
            .map(str::to_string);
        let decision = BudgetDecision::Degrade {
            scope,
            reason: "soft limit reached",
            model_override,
            max_output_tokens: policy.max_output_tokens,
            disable_rag: policy.disable_rag,
        };
        tracing::info!(
            scope = %decision.scope(),
            %spent,
            %soft_limit,
            "workspace over soft budget limit, degrading call parameters"
        );
        Ok(decision)
    }

    async fn current_month_spend(&self, scope: &BudgetScope) -> BudgetResult<Decimal> {
        let month = YearMonth::current_utc();
        Ok(self
            .usage
            .find_usage(scope, month)
            .await?
            .map(|u| u.cost)
            .unwrap_or(Decimal::ZERO))
    }
}
