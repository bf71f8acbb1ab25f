//! # Run Context
//!
//! Per-run mutable state threaded through every pipeline stage, and the
//! final result that overlays the context's audit trail.

use super::catalog::{Product, ProductClass, UserFilter};
use serde::{Deserialize, Serialize};

/// Details required for searching the product on a site.
///
/// Built incrementally across stages and never reset mid-run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchSpecs {
    pub pro_class: ProductClass,
    pub query: String,
    pub site: String,
    pub site_filters: Option<Vec<UserFilter>>,
    pub filtered_site_filters: Option<Vec<UserFilter>>,
    pub user_filters: Option<Vec<UserFilter>>,
}

/// Shared state for one run
#[derive(Debug, Clone)]
pub struct SharedContext {
    original_query: String,
    /// Working query; grows with clarifications, replaced by rephrase
    pub query: String,
    pub specs: SearchSpecs,
    pub candidates: Option<Vec<Product>>,
    steps: u32,
    flow: Vec<String>,
}

impl SharedContext {
    pub fn new(query: &str) -> Self {
        let query = query.trim().to_string();
        Self {
            original_query: query.clone(),
            specs: SearchSpecs {
                query: query.clone(),
                ..SearchSpecs::default()
            },
            query,
            candidates: None,
            steps: 0,
            flow: Vec::new(),
        }
    }

    /// The query exactly as the user submitted it
    pub fn original_query(&self) -> &str {
        &self.original_query
    }

    /// Append a clarification answer to the working query
    pub fn clarify(&mut self, answer: &str) {
        let answer = answer.trim();
        if answer.is_empty() {
            return;
        }
        self.query.push(' ');
        self.query.push_str(answer);
        self.specs.query = self.query.clone();
    }

    pub fn set_query(&mut self, query: String) {
        self.specs.query = query.clone();
        self.query = query;
    }

    /// Record one executed stage. Returns the flow-log line.
    pub fn record(&mut self, stage: &str, effect: impl AsRef<str>) -> &str {
        self.steps += 1;
        self.flow
            .push(format!("Step {}: {} -> {}", self.steps, stage, effect.as_ref()));
        self.flow.last().map(String::as_str).unwrap_or_default()
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn flow(&self) -> &[String] {
        &self.flow
    }
}

/// Final result of a shopping run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShopResult {
    pub products: Vec<Product>,
    pub recommended: Option<Product>,
    pub message: Option<String>,
    pub flow: Vec<String>,
    pub steps: u32,
}

impl ShopResult {
    /// Overwrite products, flow and steps from the run context.
    ///
    /// The context's audit trail wins over anything proposed earlier.
    pub fn overlay(mut self, ctx: &SharedContext) -> Self {
        self.products = ctx.candidates.clone().unwrap_or_default();
        self.flow = ctx.flow.clone();
        self.steps = ctx.steps;
        if let Some(recommended) = &self.recommended {
            if !self.products.contains(recommended) {
                self.recommended = None;
            }
        }
        self
    }
}

/// Pick at most one recommended product.
///
/// Highest `ratings * ln(1 + num_ratings)` wins; ties and unrated lists
/// fall back to the earliest candidate.
pub fn recommend(products: &[Product]) -> Option<&Product> {
    let score = |p: &Product| {
        p.review
            .as_ref()
            .map(|r| r.ratings as f64 * ((r.num_ratings.max(0) as f64) + 1.0).ln())
            .unwrap_or(0.0)
    };
    let mut best: Option<(&Product, f64)> = None;
    for product in products {
        let s = score(product);
        match best {
            Some((_, top)) if s <= top => {}
            _ => best = Some((product, s)),
        }
    }
    best.map(|(p, _)| p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::catalog::ProductReview;

    #[test]
    fn test_record_keeps_flow_and_steps_in_step() {
        let mut ctx = SharedContext::new("  wireless earbuds ");
        assert_eq!(ctx.original_query(), "wireless earbuds");

        ctx.record("classify", "electronics/earbuds");
        ctx.record("select_site", "https://www.flipkart.com");

        assert_eq!(ctx.steps(), 2);
        assert_eq!(ctx.flow().len(), 2);
        assert_eq!(ctx.flow()[1], "Step 2: select_site -> https://www.flipkart.com");
    }

    #[test]
    fn test_clarify_grows_working_query_only() {
        let mut ctx = SharedContext::new("wireless earbuds");
        ctx.clarify("noise cancelling");
        ctx.clarify("   ");
        assert_eq!(ctx.query, "wireless earbuds noise cancelling");
        assert_eq!(ctx.specs.query, ctx.query);
        assert_eq!(ctx.original_query(), "wireless earbuds");
    }

    #[test]
    fn test_overlay_is_authoritative() {
        let mut ctx = SharedContext::new("kettle");
        ctx.record("retrieve_candidates", "1");
        ctx.candidates = Some(vec![Product::new("Kettle A", 999, "https://x/a")]);

        let proposed = ShopResult {
            products: vec![],
            recommended: Some(Product::new("Ghost", 1, "https://x/ghost")),
            message: None,
            flow: vec!["bogus".into()],
            steps: 42,
        };
        let result = proposed.overlay(&ctx);

        assert_eq!(result.products.len(), 1);
        assert_eq!(result.steps, 1);
        assert_eq!(result.flow, ctx.flow());
        assert!(result.recommended.is_none());
    }

    #[test]
    fn test_recommend_prefers_well_rated() {
        let products = vec![
            Product::new("A", 100, "a").with_review(ProductReview::new(4.9, 3, 1)),
            Product::new("B", 100, "b").with_review(ProductReview::new(4.5, 5000, 300)),
            Product::new("C", 100, "c"),
        ];
        assert_eq!(recommend(&products).unwrap().name, "B");
        assert_eq!(recommend(&products[2..]).unwrap().name, "C");
        assert!(recommend(&[]).is_none());
    }
}
