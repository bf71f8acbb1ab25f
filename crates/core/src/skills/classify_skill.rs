//! # Classify Skill
//!
//! Derives the ProductClass (closed category + free-text type) from the
//! working query.

use super::llm_helpers::SkillRunner;
use super::prompts;
use crate::error::PipelineError;
use crate::state::ProductClass;

pub const SKILL: &str = "classify";

pub struct ClassifySkill;

impl ClassifySkill {
    pub async fn run(query: &str, runner: &SkillRunner) -> Result<ProductClass, PipelineError> {
        let prompt = format!("Shopper request: {}", query);
        let mut class: ProductClass = runner.structured(SKILL, prompts::CLASSIFY, prompt).await?;
        class.kind = class.kind.trim().to_lowercase();
        Ok(class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::budget::{BudgetLimits, UsageMeter};
    use crate::state::Category;
    use crate::testing::ScriptedGenerator;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_classify_normalizes_type() {
        let script = Arc::new(
            ScriptedGenerator::new().reply(SKILL, r#"{"category":"electronics","type":" Earbuds "}"#),
        );
        let runner = SkillRunner::new(script.clone(), Arc::new(UsageMeter::new(BudgetLimits::default())), 3);

        let class = ClassifySkill::run("wireless earbuds", &runner).await.unwrap();
        assert_eq!(class, ProductClass::new(Category::Electronics, "earbuds"));
        assert!(script.prompts_for(SKILL)[0].contains("wireless earbuds"));
    }
}
