//! # Financial Chat Annotator
//!
//! Text annotation for a chat assistant that sits next to financial reports.
//!
//! ## Core Concepts
//!
//! - **Directives**: leading lines of user input such as `-v`, `-x` or a ticker (`JPM`)
//!   that configure the session before the rest of the message reaches the model
//! - **Focal Firm**: the firm whose report is open; its metrics drive linkification
//! - **Linkification**: rewriting metric mentions (e.g. "Net Income") into clickable
//!   references paired with a hidden graph container
//! - **Metrics Cache**: per-firm metric listings, refetched after a five minute TTL
//!
//! ## Example
//!
//! ```rust,ignore
//! use financial_chat_annotator::*;
//! use std::sync::Arc;
//!
//! let tickers = InMemoryTickerStore::from_pairs(load_ticker_pairs(csv_file)?);
//! let metrics = InMemoryMetricsStore::new()
//!     .with_metrics("852218", ["Net Income", "Net Income Growth", "Total Assets"]);
//!
//! let pipeline = ChatPipeline::new(
//!     Arc::new(tickers),
//!     Arc::new(metrics),
//!     Arc::new(my_model),
//!     AnnotatorConfig::from_env()?,
//! );
//!
//! let mut session = pipeline.new_session();
//! let ctx = RequestContext::new("req-1");
//! let reply = pipeline
//!     .handle_turn(&mut session, "-v\nJPM\nHow did net income trend?", &ctx)
//!     .await?;
//! ```

pub mod cache;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod linkify;
pub mod schema;
pub mod session;
pub mod store;

pub use cache::{MetricSetCacheEntry, MetricsCache, DEFAULT_METRICS_TTL};
pub use commands::{is_ticker_symbol, CommandProcessor};
pub use config::AnnotatorConfig;
pub use context::{
    EventCollector, PipelineEvent, PipelineObserver, PipelineRecord, RequestContext,
    TranscriptObserver,
};
pub use error::{AnnotatorError, Result};
pub use linkify::{encode_uri_component, Linkifier};
pub use schema::*;
pub use session::{ChatModel, ChatPipeline, ChatReply, ChatSession};
pub use store::{
    load_ticker_pairs, load_ticker_pairs_from_path, InMemoryMetricsStore, InMemoryTickerStore,
    MetricsStore, TickerStore,
};
