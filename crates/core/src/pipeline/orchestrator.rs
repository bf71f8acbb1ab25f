//! # Pipeline Orchestrator
//!
//! Runs one shopping request through the fixed stage sequence:
//!
//! ```text
//! classify ─▶ clarify_query (0..n) ─▶ rephrase ─▶ select_site
//!    ┌───────────────────────── search session ─────────────────────────┐
//!    │ discover_filters ─▶ trim_filters ─▶ clarify_filters ─▶ retrieve  │
//!    └──────────────────────────────────────────────────────────────────┘
//!                                                         ─▶ finalize
//! ```
//!
//! Each run gets its own budget meter and prompt scope. On failure the
//! scope is purged before the error is returned, and the search session
//! is closed on every path out of the session block.

use super::budget::UsageMeter;
use super::config::{FilterPromptMode, PipelineConfig, TimeoutPolicy};
use super::correlator::{PromptCorrelator, PromptScope};
use super::stages::{Pipeline, PipelineStage};
use crate::catalog::{ProductSearchService, SearchSession};
use crate::channel::{MessageSink, OutboundMessage};
use crate::error::PipelineError;
use crate::filters::{FilterEngine, Resolution};
use crate::skills::{ClarifySkill, ClassifySkill, RephraseSkill, SkillRunner, TextGenerationService};
use crate::state::{recommend, SharedContext, ShopResult, UserFilter};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct PipelineOrchestrator {
    config: PipelineConfig,
    generator: Arc<dyn TextGenerationService>,
    catalog: Arc<dyn ProductSearchService>,
    correlator: Arc<PromptCorrelator>,
}

impl PipelineOrchestrator {
    pub fn new(
        config: PipelineConfig,
        generator: Arc<dyn TextGenerationService>,
        catalog: Arc<dyn ProductSearchService>,
        correlator: Arc<PromptCorrelator>,
    ) -> Self {
        Self {
            config,
            generator,
            catalog,
            correlator,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn correlator(&self) -> &Arc<PromptCorrelator> {
        &self.correlator
    }

    /// Run one request to a result. Nothing is sent on the channel apart
    /// from questions; see [`Self::run_and_report`].
    #[tracing::instrument(skip(self, query), fields(query = %preview(query)))]
    pub async fn run(&self, query: &str) -> Result<ShopResult, PipelineError> {
        if query.trim().is_empty() {
            return Err(PipelineError::EmptyQuery);
        }

        let mut run = Run {
            config: &self.config,
            catalog: Arc::clone(&self.catalog),
            runner: SkillRunner::new(
                Arc::clone(&self.generator),
                Arc::new(UsageMeter::new(self.config.budget)),
                self.config.max_attempts,
            ),
            prompts: self.correlator.scope(),
            ctx: SharedContext::new(query),
            pipeline: Pipeline::new(self.config.max_query_clarifications),
            clarified: false,
        };

        let outcome = run.execute().await;
        if let Err(e) = &outcome {
            run.pipeline.fail();
            let purged = run.prompts.purge();
            error!(
                kind = e.kind(),
                purged,
                calls = run.runner.meter().calls(),
                "run aborted: {}",
                e
            );
        }
        outcome
    }

    /// Run and report the outcome on the channel: `result` then `ack` on
    /// success, a single `error` otherwise.
    pub async fn run_and_report(&self, query: &str) -> Result<ShopResult, PipelineError> {
        let sink = self.correlator.sink();
        let outcome = self.run(query).await;
        let delivered = match &outcome {
            Ok(result) => deliver_result(sink.as_ref(), result.clone()).await,
            Err(e) => {
                sink.send(OutboundMessage::Error {
                    message: e.to_string(),
                })
                .await
            }
        };
        if delivered.is_err() {
            warn!("channel closed before the outcome was delivered");
        }
        outcome
    }
}

async fn deliver_result(sink: &dyn MessageSink, result: ShopResult) -> Result<(), crate::error::ChannelError> {
    sink.send(OutboundMessage::result(result)).await?;
    sink.send(OutboundMessage::Ack {
        message: "Search complete".to_string(),
    })
    .await
}

fn preview(query: &str) -> String {
    let query = query.trim();
    match query.char_indices().nth(60) {
        Some((cut, _)) => format!("{}...", &query[..cut]),
        None => query.to_string(),
    }
}

/// State of one in-flight run
struct Run<'a> {
    config: &'a PipelineConfig,
    catalog: Arc<dyn ProductSearchService>,
    runner: SkillRunner,
    prompts: PromptScope,
    ctx: SharedContext,
    pipeline: Pipeline,
    /// Whether any clarification was appended to the query
    clarified: bool,
}

impl Run<'_> {
    fn step(&mut self, stage: PipelineStage, effect: impl AsRef<str>) {
        let line = self.ctx.record(stage.as_str(), effect);
        info!("{}", line);
    }

    async fn execute(&mut self) -> Result<ShopResult, PipelineError> {
        let class = ClassifySkill::run(&self.ctx.query, &self.runner).await?;
        self.step(PipelineStage::Classify, class.to_string());
        self.ctx.specs.pro_class = class;
        self.pipeline.advance();

        while self.pipeline.stage == PipelineStage::ClarifyQuery {
            self.clarify_query().await?;
        }

        self.rephrase().await?;
        self.pipeline.advance();

        let site = self.config.site_for(self.ctx.specs.pro_class.category).to_string();
        self.step(PipelineStage::SelectSite, &site);
        self.ctx.specs.site = site;
        self.pipeline.advance();

        // discover, trim, clarify-filters and retrieve
        self.search_phase().await?;

        let result = self.finalize();
        self.pipeline.advance();
        Ok(result)
    }

    /// Ask the user and apply the timeout policy to a missing answer
    async fn ask(&self, stage: PipelineStage, question: &str) -> Result<Option<String>, PipelineError> {
        let id = uuid::Uuid::new_v4().to_string();
        let answer = self
            .prompts
            .ask(question, Some(id.clone()), self.config.prompt_timeout())
            .await?;
        match (answer, self.config.timeout_policy) {
            (Some(answer), _) => Ok(Some(answer)),
            (None, TimeoutPolicy::Abort) => Err(PipelineError::PromptTimeout {
                stage: stage.as_str(),
                question_id: id,
            }),
            (None, TimeoutPolicy::Continue) => {
                warn!(stage = stage.as_str(), question_id = %id, "continuing without an answer");
                Ok(None)
            }
        }
    }

    async fn clarify_query(&mut self) -> Result<(), PipelineError> {
        let stage = PipelineStage::ClarifyQuery;
        let output = ClarifySkill::run(&self.ctx.specs.pro_class, &self.ctx.query, &self.runner).await?;
        let Some(question) = output.question() else {
            self.step(stage, "query is specific enough");
            self.pipeline.advance();
            return Ok(());
        };

        let answer = self.ask(stage, question).await?;
        match answer.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
            Some(answer) => {
                self.ctx.clarify(answer);
                self.clarified = true;
                let query = self.ctx.query.clone();
                self.step(stage, query);
                self.pipeline.clarified();
            }
            None => {
                self.step(stage, "no details added");
                self.pipeline.advance();
            }
        }
        Ok(())
    }

    async fn rephrase(&mut self) -> Result<(), PipelineError> {
        if !RephraseSkill::is_needed(&self.ctx.query, self.clarified) {
            return Ok(());
        }
        let before = self.ctx.query.clone();
        let query = RephraseSkill::run(&before, &self.runner).await?;
        self.step(PipelineStage::Rephrase, format!("{} => {}", before, query));
        self.ctx.set_query(query);
        Ok(())
    }

    /// discover, trim, clarify-filters and retrieve share one session
    async fn search_phase(&mut self) -> Result<(), PipelineError> {
        let session = SearchSession::open(Arc::clone(&self.catalog)).await?;
        let outcome = self.search_stages(&session).await;
        if let Err(e) = session.close().await {
            warn!("failed to close search session: {}", e);
        }
        outcome
    }

    async fn search_stages(&mut self, session: &SearchSession) -> Result<(), PipelineError> {
        let site_filters = session
            .discover_filters(&self.ctx.specs.site, &self.ctx.query)
            .await?;
        self.step(PipelineStage::DiscoverFilters, format!("{} filters", site_filters.len()));
        self.ctx.specs.site_filters = Some(site_filters);
        self.pipeline.advance();

        self.trim_filters().await?;
        self.pipeline.advance();

        self.clarify_filters().await?;
        self.pipeline.advance();

        self.retrieve(session).await?;
        self.pipeline.advance();
        Ok(())
    }

    async fn trim_filters(&mut self) -> Result<(), PipelineError> {
        let site_filters = self.ctx.specs.site_filters.clone().unwrap_or_default();
        if site_filters.is_empty() {
            return Ok(());
        }
        let trimmed = FilterEngine::trim(&site_filters, &self.ctx, &self.runner).await?;
        self.step(
            PipelineStage::TrimFilters,
            format!("{} -> {}", site_filters.len(), trimmed.len()),
        );
        self.ctx.specs.filtered_site_filters = Some(trimmed);
        Ok(())
    }

    async fn clarify_filters(&mut self) -> Result<(), PipelineError> {
        let stage = PipelineStage::ClarifyFilters;
        let filters = match &self.ctx.specs.filtered_site_filters {
            Some(trimmed) if !trimmed.is_empty() => trimmed.clone(),
            _ => self.ctx.specs.site_filters.clone().unwrap_or_default(),
        };
        if filters.is_empty() {
            return Ok(());
        }

        let answers = match self.config.filter_prompt_mode {
            FilterPromptMode::Sequential => {
                let mut answers = Vec::with_capacity(filters.len());
                for filter in &filters {
                    answers.push(self.ask(stage, &filter_question(filter)).await?);
                }
                answers
            }
            FilterPromptMode::Concurrent => {
                let questions: Vec<String> = filters.iter().map(filter_question).collect();
                let this = &*self;
                join_all(questions.iter().map(|q| this.ask(stage, q)))
                    .await
                    .into_iter()
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        let (mut skipped, mut dropped) = (0, 0);
        let mut applied = Vec::new();
        for (filter, answer) in filters.iter().zip(answers) {
            match FilterEngine::resolve(filter, answer.as_deref(), &self.runner).await? {
                Resolution::Apply(resolved) => applied.push(resolved),
                Resolution::Skip => skipped += 1,
                Resolution::Drop => dropped += 1,
            }
        }

        self.step(
            stage,
            format!("{} applied, {} skipped, {} unmatched", applied.len(), skipped, dropped),
        );
        self.ctx.specs.user_filters = Some(applied);
        Ok(())
    }

    async fn retrieve(&mut self, session: &SearchSession) -> Result<(), PipelineError> {
        let site = self.ctx.specs.site.clone();
        let query = self.ctx.query.clone();
        let top_k = self.config.top_k;
        let filters = self
            .ctx
            .specs
            .user_filters
            .as_deref()
            .filter(|f| !f.is_empty());

        let products = session.search(&site, &query, filters, top_k).await?;
        let effect = if products.is_empty() {
            warn!(filtered = filters.is_some(), "search returned nothing, retrying unfiltered");
            let fallback = session.search(&site, &query, None, top_k).await?;
            let effect = format!("0 products, unfiltered retry -> {}", fallback.len());
            self.ctx.candidates = Some(fallback);
            effect
        } else {
            let effect = format!("{} products", products.len());
            self.ctx.candidates = Some(products);
            effect
        };
        self.step(PipelineStage::RetrieveCandidates, effect);
        Ok(())
    }

    fn finalize(&mut self) -> ShopResult {
        let candidates = self.ctx.candidates.clone().unwrap_or_default();
        let recommended = recommend(&candidates).cloned();
        let message = match &recommended {
            None => "No products found".to_string(),
            Some(top) => format!(
                "Found {} products for \"{}\". Top pick: {} (Rs. {})",
                candidates.len(),
                self.ctx.query,
                top.name,
                top.price
            ),
        };
        let effect = match &recommended {
            Some(top) => format!("{} candidates, recommended {}", candidates.len(), top.name),
            None => "no candidates".to_string(),
        };
        self.step(PipelineStage::Finalize, effect);
        info!(
            calls = self.runner.meter().calls(),
            tokens = self.runner.meter().tokens(),
            "run finished"
        );

        ShopResult {
            recommended,
            message: Some(message),
            ..ShopResult::default()
        }
        .overlay(&self.ctx)
    }
}

fn filter_question(filter: &UserFilter) -> String {
    format!("Describe how {} should be used (leave blank to skip)", filter)
}
