pub mod catalog;
pub mod context;
pub mod db;
pub mod history;

pub use db::ShopDb;

pub use catalog::{Category, FilterKind, Product, ProductClass, ProductReview, SiteFilterSet, UserFilter};
pub use context::{recommend, SearchSpecs, SharedContext, ShopResult};
pub use history::{RunHistory, RunRecord, RunStatus};
