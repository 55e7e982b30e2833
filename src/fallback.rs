//! Ordered provider tiers with independent per-slot fallback.
//!
//! A review needs two verdicts, one per [`Stance`]. Tiers are tried in order
//! until one can serve at least one slot; both stances of a tier run
//! concurrently. Afterwards each slot that failed is retried once against the
//! next available target for *its* stance in later tiers. The other slot is
//! never redone, so a failure in one reviewer cannot invalidate the other.

use async_trait::async_trait;
use futures::future::join;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use screenwise_common::{Criteria, FailureKind, Reference, ReviewerResult, Stance};

use crate::config::ScreenwiseConfig;
use crate::errors::ConfigError;
use crate::gateway::{CompletionProvider, HttpProvider, ModelGateway};
use crate::prompt::build_prompt;

/// Run `attempt` on each candidate in order and return the first `Some`.
///
/// The index of the candidate that produced the value is returned with it.
pub async fn attempt_or_next<'a, T, R, F, Fut>(
    candidates: &'a [T],
    mut attempt: F,
) -> Option<(usize, R)>
where
    F: FnMut(&'a T) -> Fut,
    Fut: Future<Output = Option<R>>,
{
    for (index, candidate) in candidates.iter().enumerate() {
        if let Some(value) = attempt(candidate).await {
            return Some((index, value));
        }
    }
    None
}

/// One model on one provider.
#[derive(Clone)]
pub struct ModelTarget {
    gateway: ModelGateway,
    model: String,
}

impl ModelTarget {
    pub fn new(gateway: ModelGateway, model: &str) -> Self {
        Self {
            gateway,
            model: model.to_string(),
        }
    }

    pub fn provider(&self) -> &str {
        self.gateway.provider_name()
    }

    pub fn label(&self) -> String {
        self.gateway.label(&self.model)
    }

    pub async fn call(&self, prompt: &str) -> Result<ReviewerResult, ConfigError> {
        self.gateway.call(prompt, &self.model).await
    }
}

/// A pair of targets, one per stance.
#[derive(Clone)]
pub struct ReviewTier {
    pub name: String,
    pub conservative: ModelTarget,
    pub comprehensive: ModelTarget,
}

impl ReviewTier {
    pub fn new(name: &str, conservative: ModelTarget, comprehensive: ModelTarget) -> Self {
        Self {
            name: name.to_string(),
            conservative,
            comprehensive,
        }
    }

    pub fn target(&self, stance: Stance) -> &ModelTarget {
        match stance {
            Stance::Conservative => &self.conservative,
            Stance::Comprehensive => &self.comprehensive,
        }
    }
}

/// Both reviewer slots for one reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewPair {
    pub conservative: ReviewerResult,
    pub comprehensive: ReviewerResult,
    /// Tier that served the initial attempt, if any tier could.
    pub tier: Option<String>,
}

/// Anything that can produce a [`ReviewPair`] for a reference.
#[async_trait]
pub trait DualReviewer: Send + Sync {
    /// Check the reviewer can run at all. Called once before a run starts.
    fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }

    async fn review(
        &self,
        reference: &Reference,
        criteria: &Criteria,
    ) -> anyhow::Result<ReviewPair>;
}

/// A slot's result together with the provider that produced it.
struct Slot {
    result: ReviewerResult,
    provider: String,
}

pub struct FallbackChain {
    tiers: Vec<ReviewTier>,
}

impl FallbackChain {
    pub fn new(tiers: Vec<ReviewTier>) -> Self {
        Self { tiers }
    }

    /// Build gateways and tiers from configuration.
    pub fn from_config(config: &ScreenwiseConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let retry = config.retry.policy();
        let timeout = Duration::from_secs(config.retry.request_timeout_secs);

        let gateways: HashMap<&str, ModelGateway> = config
            .providers
            .iter()
            .map(|p| {
                let provider: Arc<dyn CompletionProvider> = Arc::new(
                    HttpProvider::new(&p.name, p.kind, &p.base_url, &p.api_key_env)
                        .with_timeout(timeout),
                );
                (p.name.as_str(), ModelGateway::new(provider, retry))
            })
            .collect();

        let target = |tier: &str, provider: &str, model: &str| -> Result<ModelTarget, ConfigError> {
            let gateway = gateways
                .get(provider)
                .ok_or_else(|| ConfigError::UnknownProvider {
                    tier: tier.to_string(),
                    provider: provider.to_string(),
                })?;
            Ok(ModelTarget::new(gateway.clone(), model))
        };

        let tiers = config
            .tiers
            .iter()
            .map(|t| {
                Ok(ReviewTier::new(
                    &t.name,
                    target(&t.name, &t.conservative.provider, &t.conservative.model)?,
                    target(&t.name, &t.comprehensive.provider, &t.comprehensive.model)?,
                ))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self::new(tiers))
    }

    pub fn tiers(&self) -> &[ReviewTier] {
        &self.tiers
    }

    /// Initial attempt: first tier where at least one stance is callable.
    async fn select_tier(&self, prompts: &[String; 2]) -> Option<(usize, [Option<Slot>; 2])> {
        attempt_or_next(&self.tiers, |tier| async move {
            let (conservative, comprehensive) = join(
                tier.conservative.call(&prompts[0]),
                tier.comprehensive.call(&prompts[1]),
            )
            .await;

            if let (Err(c), Err(p)) = (&conservative, &comprehensive) {
                warn!(
                    tier = %tier.name,
                    conservative_error = %c,
                    comprehensive_error = %p,
                    "Tier unavailable, moving to next tier"
                );
                return None;
            }

            let slot = |outcome: Result<ReviewerResult, ConfigError>, target: &ModelTarget| {
                match outcome {
                    Ok(result) => Some(Slot {
                        result,
                        provider: target.provider().to_string(),
                    }),
                    Err(e) => {
                        warn!(
                            tier = %tier.name,
                            provider = target.provider(),
                            error = %e,
                            "Slot unavailable in tier"
                        );
                        None
                    }
                }
            };
            Some([
                slot(conservative, &tier.conservative),
                slot(comprehensive, &tier.comprehensive),
            ])
        })
        .await
    }

    /// Keep a good slot; otherwise retry it once on the next available target.
    async fn settle_slot(
        &self,
        stance: Stance,
        slot: Option<Slot>,
        later_from: usize,
        prompt: &str,
    ) -> ReviewerResult {
        let (failed_label, skip_provider, reason) = match slot {
            Some(slot) if !slot.result.is_error_sentinel() => return slot.result,
            Some(slot) => {
                let skip = slot.result.is_rate_limited().then_some(slot.provider);
                (slot.result.reviewer, skip, slot.result.reasoning)
            }
            None => (
                format!("{} reviewer", stance),
                None,
                "no tier could serve this slot".to_string(),
            ),
        };

        let later = self.tiers.get(later_from..).unwrap_or_default();
        let skip = skip_provider.as_deref();
        let retry = attempt_or_next(later, |tier| {
            let target = tier.target(stance);
            async move {
                if skip == Some(target.provider()) {
                    debug!(provider = target.provider(), %stance, "Skipping rate-limited provider");
                    return None;
                }
                match target.call(prompt).await {
                    Ok(result) => Some(result),
                    Err(e) => {
                        warn!(
                            tier = %tier.name,
                            provider = target.provider(),
                            error = %e,
                            "Fallback target unavailable"
                        );
                        None
                    }
                }
            }
        })
        .await;

        match retry {
            Some((index, result)) => {
                info!(
                    %stance,
                    failed = %failed_label,
                    tier = %later[index].name,
                    reviewer = %result.reviewer,
                    "Reviewer slot retried on fallback target"
                );
                result.as_fallback()
            }
            None => {
                warn!(%stance, failed = %failed_label, "All providers exhausted for slot");
                ReviewerResult::error_sentinel(
                    &failed_label,
                    &format!("All providers exhausted. Last failure: {}", reason),
                    FailureKind::Exhausted,
                )
            }
        }
    }
}

#[async_trait]
impl DualReviewer for FallbackChain {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.tiers.is_empty() {
            return Err(ConfigError::Invalid("no review tiers configured".into()));
        }
        Ok(())
    }

    async fn review(
        &self,
        reference: &Reference,
        criteria: &Criteria,
    ) -> anyhow::Result<ReviewPair> {
        let prompts = [
            build_prompt(reference, criteria, Stance::Conservative),
            build_prompt(reference, criteria, Stance::Comprehensive),
        ];

        let (later_from, tier, [conservative, comprehensive]) =
            match self.select_tier(&prompts).await {
                Some((index, slots)) => (index + 1, Some(self.tiers[index].name.clone()), slots),
                None => (self.tiers.len(), None, [None, None]),
            };

        let (conservative, comprehensive) = join(
            self.settle_slot(Stance::Conservative, conservative, later_from, &prompts[0]),
            self.settle_slot(Stance::Comprehensive, comprehensive, later_from, &prompts[1]),
        )
        .await;

        Ok(ReviewPair {
            conservative,
            comprehensive,
            tier,
        })
    }
}
