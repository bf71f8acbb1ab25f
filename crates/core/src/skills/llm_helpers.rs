//! # LLM Helpers
//!
//! Shared call path for every skill: budget reservation, retries, and
//! structured-output decoding live here once instead of in each skill.

use super::generation::{GenerationRequest, OutputSchema, TextGenerationService};
use crate::error::{GenerationError, PipelineError};
use crate::pipeline::budget::UsageMeter;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Budgeted, retrying front for the text-generation service
#[derive(Clone)]
pub struct SkillRunner {
    service: Arc<dyn TextGenerationService>,
    meter: Arc<UsageMeter>,
    max_attempts: u32,
}

impl SkillRunner {
    pub fn new(service: Arc<dyn TextGenerationService>, meter: Arc<UsageMeter>, max_attempts: u32) -> Self {
        Self {
            service,
            meter,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn meter(&self) -> &UsageMeter {
        &self.meter
    }

    /// Free-text generation
    pub async fn text(
        &self,
        skill: &'static str,
        system: &'static str,
        prompt: String,
    ) -> Result<String, PipelineError> {
        let request = GenerationRequest {
            skill,
            system,
            prompt,
            schema: None,
        };
        self.call(&request, |text| {
            let text = text.trim();
            if text.is_empty() {
                Err(GenerationError::Malformed("empty output".into()))
            } else {
                Ok(text.to_string())
            }
        })
        .await
    }

    /// Generation constrained to the JSON schema of `T`
    pub async fn structured<T>(
        &self,
        skill: &'static str,
        system: &'static str,
        prompt: String,
    ) -> Result<T, PipelineError>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let schema = serde_json::to_value(schemars::schema_for!(T))
            .map_err(|e| PipelineError::Generation {
                skill,
                attempts: 0,
                source: GenerationError::Malformed(e.to_string()),
            })?;
        let request = GenerationRequest {
            skill,
            system,
            prompt,
            schema: Some(OutputSchema {
                name: skill,
                schema,
            }),
        };
        self.call(&request, |text| {
            serde_json::from_str::<T>(strip_fences(text))
                .map_err(|e| GenerationError::Malformed(e.to_string()))
        })
        .await
    }

    async fn call<T>(
        &self,
        request: &GenerationRequest,
        parse: impl Fn(&str) -> Result<T, GenerationError>,
    ) -> Result<T, PipelineError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.meter.reserve_call()?;

            let outcome = match self.service.generate(request).await {
                Ok(generation) => {
                    self.meter.charge(generation.usage)?;
                    parse(&generation.text)
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(source) if attempt >= self.max_attempts => {
                    return Err(PipelineError::Generation {
                        skill: request.skill,
                        attempts: attempt,
                        source,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        skill = request.skill,
                        attempt,
                        "generation failed, retrying: {}",
                        e
                    );
                }
            }
        }
    }
}

/// Models like to wrap JSON in markdown fences
fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BudgetExceeded;
    use crate::pipeline::budget::BudgetLimits;
    use crate::state::ProductClass;
    use crate::testing::ScriptedGenerator;

    fn runner(script: ScriptedGenerator, max_calls: u32) -> (SkillRunner, Arc<ScriptedGenerator>) {
        let script = Arc::new(script);
        let meter = Arc::new(UsageMeter::new(BudgetLimits {
            max_calls,
            max_tokens: 10_000,
        }));
        (SkillRunner::new(script.clone(), meter, 3), script)
    }

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[tokio::test]
    async fn test_retries_malformed_output() {
        let script = ScriptedGenerator::new()
            .reply("classify", "not json")
            .reply("classify", r#"{"category":"electronics","type":"earbuds"}"#);
        let (runner, script) = runner(script, 10);

        let class: ProductClass = runner.structured("classify", "sys", "earbuds".into()).await.unwrap();
        assert_eq!(class.kind, "earbuds");
        assert_eq!(script.calls_for("classify"), 2);
        assert_eq!(runner.meter().calls(), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let script = ScriptedGenerator::new()
            .fail("rephrase", GenerationError::Transport("reset".into()))
            .fail("rephrase", GenerationError::Transport("reset".into()))
            .fail("rephrase", GenerationError::Transport("reset".into()));
        let (runner, _) = runner(script, 10);

        let err = runner.text("rephrase", "sys", "q".into()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Generation { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_budget_is_not_retried() {
        let script = ScriptedGenerator::new().fail("rephrase", GenerationError::Transport("reset".into()));
        let (runner, script) = runner(script, 1);

        let err = runner.text("rephrase", "sys", "q".into()).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::BudgetExceeded(BudgetExceeded { max_calls: 1, .. })
        ));
        assert_eq!(script.calls_for("rephrase"), 1);
    }
}
