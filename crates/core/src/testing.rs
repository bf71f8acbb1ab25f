//! Test doubles for the external collaborators.

use crate::catalog::{ProductSearchService, SessionHandle};
use crate::channel::OutboundMessage;
use crate::error::{GenerationError, SearchError};
use crate::pipeline::correlator::PromptCorrelator;
use crate::skills::generation::{Generation, GenerationRequest, TextGenerationService, Usage};
use crate::state::{Product, SiteFilterSet, UserFilter};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Text generation with canned replies queued per skill
pub struct ScriptedGenerator {
    replies: Mutex<HashMap<&'static str, VecDeque<Result<String, GenerationError>>>>,
    log: Mutex<Vec<(&'static str, String)>>,
    usage: Usage,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
            usage: Usage {
                input_tokens: 100,
                output_tokens: 20,
            },
        }
    }

    pub fn reply(self, skill: &'static str, text: &str) -> Self {
        self.push(skill, Ok(text.to_string()))
    }

    pub fn fail(self, skill: &'static str, err: GenerationError) -> Self {
        self.push(skill, Err(err))
    }

    /// Usage reported for every call
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    fn push(self, skill: &'static str, reply: Result<String, GenerationError>) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(skill)
            .or_default()
            .push_back(reply);
        self
    }

    pub fn calls_for(&self, skill: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|(s, _)| *s == skill).count()
    }

    pub fn total_calls(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    pub fn prompts_for(&self, skill: &str) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == skill)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl TextGenerationService for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, GenerationError> {
        self.log
            .lock()
            .unwrap()
            .push((request.skill, request.prompt.clone()));
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(request.skill)
            .and_then(|queue| queue.pop_front());
        match reply {
            Some(Ok(text)) => Ok(Generation {
                text,
                usage: self.usage,
            }),
            Some(Err(e)) => Err(e),
            None => Err(GenerationError::Malformed(format!(
                "no scripted reply for {}",
                request.skill
            ))),
        }
    }
}

/// One recorded `search` call
#[derive(Debug, Clone)]
pub struct SearchCall {
    pub site: String,
    pub query: String,
    pub filters: Option<Vec<UserFilter>>,
    pub top_k: usize,
}

/// Product search over fixed filters and a queue of result pages
pub struct MemoryCatalog {
    filters: SiteFilterSet,
    results: Mutex<VecDeque<Vec<Product>>>,
    search_error: Option<SearchError>,
    searches: Mutex<Vec<SearchCall>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            results: Mutex::new(VecDeque::new()),
            search_error: None,
            searches: Mutex::new(Vec::new()),
            opened: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
        }
    }

    pub fn with_filters(mut self, filters: SiteFilterSet) -> Self {
        self.filters = filters;
        self
    }

    /// Queue the result of the next `search`; an exhausted queue yields `[]`
    pub fn with_results(self, products: Vec<Product>) -> Self {
        self.results.lock().unwrap().push_back(products);
        self
    }

    pub fn failing_search(mut self, err: SearchError) -> Self {
        self.search_error = Some(err);
        self
    }

    pub fn searches(&self) -> Vec<SearchCall> {
        self.searches.lock().unwrap().clone()
    }

    pub fn opened_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn open_sessions(&self) -> usize {
        self.opened_count() - self.closed_count()
    }
}

#[async_trait]
impl ProductSearchService for MemoryCatalog {
    async fn open_session(&self) -> Result<SessionHandle, SearchError> {
        let n = self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(SessionHandle::new(format!("mem-{}", n + 1)))
    }

    async fn discover_filters(
        &self,
        _session: &SessionHandle,
        _site: &str,
        _query: &str,
    ) -> Result<SiteFilterSet, SearchError> {
        Ok(self.filters.clone())
    }

    async fn search(
        &self,
        _session: &SessionHandle,
        site: &str,
        query: &str,
        filters: Option<&[UserFilter]>,
        top_k: usize,
    ) -> Result<Vec<Product>, SearchError> {
        self.searches.lock().unwrap().push(SearchCall {
            site: site.to_string(),
            query: query.to_string(),
            filters: filters.map(|f| f.to_vec()),
            top_k,
        });
        if let Some(err) = &self.search_error {
            return Err(err.clone());
        }
        let mut page = self.results.lock().unwrap().pop_front().unwrap_or_default();
        page.truncate(top_k);
        Ok(page)
    }

    async fn close_session(&self, _session: SessionHandle) -> Result<(), SearchError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Plays the user: answers questions from a script and records every
/// outbound message. `None` in the script leaves that question unanswered.
pub struct AnswerBot {
    messages: Arc<Mutex<Vec<OutboundMessage>>>,
    task: JoinHandle<()>,
}

impl AnswerBot {
    pub fn spawn(
        mut rx: mpsc::UnboundedReceiver<OutboundMessage>,
        correlator: Arc<PromptCorrelator>,
        answers: Vec<Option<&str>>,
    ) -> Self {
        let mut answers: VecDeque<Option<String>> =
            answers.into_iter().map(|a| a.map(str::to_string)).collect();
        let messages = Arc::new(Mutex::new(Vec::new()));
        let log = messages.clone();
        let task = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let OutboundMessage::Question { id, .. } = &message {
                    if let Some(Some(answer)) = answers.pop_front() {
                        correlator.resolve(id, &answer);
                    }
                }
                log.lock().unwrap().push(message);
            }
        });
        Self { messages, task }
    }

    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.messages().iter().map(OutboundMessage::kind).collect()
    }

    pub fn questions(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                OutboundMessage::Question { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Let the bot drain messages already sent
    pub async fn settle(&self) {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }
}

impl Drop for AnswerBot {
    fn drop(&mut self) {
        self.task.abort();
    }
}
