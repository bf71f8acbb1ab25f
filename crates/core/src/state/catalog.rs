//! # Catalog Types
//!
//! Product classification, site filters and candidate products as exchanged
//! with the text-generation and product-search services.

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Closed set of product categories
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Electronics,
    Fashion,
    Books,
    HomeAppliances,
    #[default]
    Others,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Electronics => "electronics",
            Self::Fashion => "fashion",
            Self::Books => "books",
            Self::HomeAppliances => "home_appliances",
            Self::Others => "others",
        }
    }
}

/// Category/type of the product desired by the user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProductClass {
    /// The category of the product
    #[serde(default)]
    pub category: Category,
    /// The type of product within the category
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl ProductClass {
    pub fn new(category: Category, kind: impl Into<String>) -> Self {
        Self {
            category,
            kind: kind.into(),
        }
    }
}

impl fmt::Display for ProductClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category.as_str(), self.kind)
    }
}

/// How a site filter is operated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Range,
    Multiselect,
    Singleselect,
    Boolean,
}

/// A filter exposed by a site, or the user's resolved choice for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UserFilter {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FilterKind,
    #[serde(default)]
    pub selection: Option<Vec<String>>,
    #[serde(default)]
    pub range: Option<(Option<f64>, Option<f64>)>,
}

impl UserFilter {
    pub fn multiselect(name: impl Into<String>, options: &[&str]) -> Self {
        Self {
            name: name.into(),
            kind: FilterKind::Multiselect,
            selection: Some(options.iter().map(|o| o.to_string()).collect()),
            range: None,
        }
    }

    pub fn range(name: impl Into<String>, low: Option<f64>, high: Option<f64>) -> Self {
        Self {
            name: name.into(),
            kind: FilterKind::Range,
            selection: None,
            range: Some((low, high)),
        }
    }

    /// Declared options, empty for range filters
    pub fn options(&self) -> &[String] {
        self.selection.as_deref().unwrap_or(&[])
    }

    /// Number of distinct choices this filter offers.
    ///
    /// A range with two distinct bounds and a boolean without explicit
    /// options both count as two.
    pub fn option_count(&self) -> usize {
        match self.kind {
            FilterKind::Range => match self.range {
                Some((Some(low), Some(high))) if low < high => 2,
                Some((Some(_), None)) | Some((None, Some(_))) => 2,
                _ => 0,
            },
            FilterKind::Boolean if self.selection.is_none() => 2,
            _ => self.options().len(),
        }
    }

    /// Copy of this filter carrying only the given selection
    pub fn with_selection(&self, selected: Vec<String>) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind,
            selection: Some(selected),
            range: None,
        }
    }

    pub fn with_range(&self, low: Option<f64>, high: Option<f64>) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind,
            selection: None,
            range: Some((low, high)),
        }
    }
}

impl fmt::Display for UserFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.selection, &self.range) {
            (Some(options), _) => write!(f, "{} ({:?}): {}", self.name, self.kind, options.join(" | ")),
            (None, Some((low, high))) => write!(
                f,
                "{} ({:?}): {} - {}",
                self.name,
                self.kind,
                low.map(|v| v.to_string()).unwrap_or_else(|| "*".into()),
                high.map(|v| v.to_string()).unwrap_or_else(|| "*".into())
            ),
            (None, None) => write!(f, "{} ({:?})", self.name, self.kind),
        }
    }
}

/// Ordered filters a site exposes for the current query
pub type SiteFilterSet = Vec<UserFilter>;

/// Product review and perception from other users
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductReview {
    #[serde(default, deserialize_with = "de_rating")]
    pub ratings: f32,
    #[serde(default = "missing_count", deserialize_with = "de_count")]
    pub num_ratings: i64,
    #[serde(default = "missing_count", deserialize_with = "de_count")]
    pub num_reviews: i64,
}

impl Default for ProductReview {
    fn default() -> Self {
        Self {
            ratings: 0.0,
            num_ratings: -1,
            num_reviews: -1,
        }
    }
}

impl ProductReview {
    pub fn new(ratings: f32, num_ratings: i64, num_reviews: i64) -> Self {
        Self {
            ratings: clamp_rating(ratings),
            num_ratings: if num_ratings < 0 { -1 } else { num_ratings },
            num_reviews: if num_reviews < 0 { -1 } else { num_reviews },
        }
    }
}

/// A candidate product returned by the product-search service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub pro_class: Option<ProductClass>,
    #[serde(deserialize_with = "de_price")]
    pub price: i64,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub review: Option<ProductReview>,
    #[serde(default)]
    pub details: Vec<String>,
    #[serde(default)]
    pub delivery_date: Option<String>,
}

impl Product {
    pub fn new(name: impl Into<String>, price: i64, url: impl Into<String>) -> Self {
        Self {
            id: None,
            pro_class: None,
            price,
            name: name.into(),
            url: url.into(),
            image: None,
            review: None,
            details: Vec::new(),
            delivery_date: None,
        }
    }

    pub fn with_review(mut self, review: ProductReview) -> Self {
        self.review = Some(review);
        self
    }
}

fn clamp_rating(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 5.0)
    }
}

fn missing_count() -> i64 {
    -1
}

fn digits_only(raw: &str) -> String {
    static NON_DIGIT: OnceLock<Regex> = OnceLock::new();
    let re = NON_DIGIT.get_or_init(|| Regex::new(r"[^\d]").expect("static regex"));
    re.replace_all(raw, "").into_owned()
}

/// Scraped numbers arrive as numbers, numeric strings, or nothing at all
#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Int(i64),
    Float(f64),
    Text(String),
}

fn de_price<'de, D: Deserializer<'de>>(de: D) -> Result<i64, D::Error> {
    match Loose::deserialize(de)? {
        Loose::Int(v) => Ok(v),
        Loose::Float(v) => Ok(v.round() as i64),
        Loose::Text(s) => digits_only(&s)
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("unparseable price: {s:?}"))),
    }
}

fn de_rating<'de, D: Deserializer<'de>>(de: D) -> Result<f32, D::Error> {
    let value = match Option::<Loose>::deserialize(de)? {
        None => 0.0,
        Some(Loose::Int(v)) => v as f32,
        Some(Loose::Float(v)) => v as f32,
        Some(Loose::Text(s)) => s.trim().parse().unwrap_or(0.0),
    };
    Ok(clamp_rating(value))
}

fn de_count<'de, D: Deserializer<'de>>(de: D) -> Result<i64, D::Error> {
    let value = match Option::<Loose>::deserialize(de)? {
        None => -1,
        Some(Loose::Int(v)) => v,
        Some(Loose::Float(v)) => v as i64,
        Some(Loose::Text(s)) => digits_only(&s).parse().unwrap_or(-1),
    };
    Ok(if value <= 0 { -1 } else { value })
}
