//! Enhancement middleware: per-client rule lookup -> cache probe -> inference
//! call -> fallback chain -> cache store (§4.6). Never surfaces an error to the
//! caller; every failure mode degrades to passthrough.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::TwoTierCache;
use crate::config::RuleSet;
use crate::inference::InferenceClient;

/// Declared context window per model, used only for the token-estimate check.
/// Approximate heuristic (§9 Open Questions, token estimation): `chars/4`.
fn context_tokens_for(model: &str) -> u32 {
    static TABLE: &[(&str, u32)] = &[("m", 8_192), ("small", 4_096), ("large", 32_768)];
    TABLE.iter().find(|(name, _)| *name == model).map(|(_, limit)| *limit).unwrap_or(4_096)
}

fn estimate_tokens(text: &str) -> u32 {
    text.chars().count().div_ceil(4) as u32
}

pub struct EnhanceResult {
    pub original: String,
    pub enhanced: String,
    pub model: String,
    pub cached: bool,
}

pub struct EnhancementMiddleware {
    rules: RuleSet,
    cache: Arc<TwoTierCache>,
    inference: Arc<InferenceClient>,
    call_deadline: Duration,
}

impl EnhancementMiddleware {
    pub fn new(
        rules: RuleSet,
        cache: Arc<TwoTierCache>,
        inference: Arc<InferenceClient>,
        call_deadline: Duration,
    ) -> Self {
        Self { rules, cache, inference, call_deadline }
    }

    pub async fn enhance(&self, prompt: &str, client_name: Option<&str>) -> EnhanceResult {
        let rule = self.rules.rule_for(client_name);

        if !rule.enabled {
            return EnhanceResult {
                original: prompt.to_string(),
                enhanced: prompt.to_string(),
                model: rule.model.clone(),
                cached: false,
            };
        }

        if let Some(cached) = self.cache.get(prompt).await {
            return EnhanceResult { original: prompt.to_string(), enhanced: cached, model: rule.model.clone(), cached: true };
        }

        let estimated_tokens = estimate_tokens(prompt);
        let mut candidates = Vec::with_capacity(self.rules.fallback_chain.len() + 1);
        candidates.push(Some(rule.model.clone()));
        candidates.extend(self.rules.fallback_chain.iter().cloned());

        for candidate in candidates {
            let Some(model) = candidate else {
                // `None` sentinel: give up and return the original prompt unchanged.
                break;
            };

            if estimated_tokens > context_tokens_for(&model) {
                continue;
            }

            match self.inference.generate(&model, &rule.system_prompt, prompt, self.call_deadline).await {
                Ok(enhanced) => {
                    self.cache.put(prompt.to_string(), enhanced.clone()).await;
                    return EnhanceResult { original: prompt.to_string(), enhanced, model, cached: false };
                }
                Err(e) => {
                    tracing::warn!(error = %e, model, "enhancement: inference call failed, trying next candidate");
                }
            }
        }

        EnhanceResult {
            original: prompt.to_string(),
            enhanced: prompt.to_string(),
            model: rule.model.clone(),
            cached: false,
        }
    }
}
