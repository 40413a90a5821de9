//! Built-in capabilities.

pub mod markers;
pub mod query_resource;
pub mod search_arxiv;
pub mod search_web;

pub use markers::{DelegateToSmartAgentTool, ProceedToPlanTool};
pub use query_resource::QueryResourceTool;
pub use search_arxiv::SearchArxivTool;
pub use search_web::{BraveSearchWorker, SearchRequest, SearchWebTool};
