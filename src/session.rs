use crate::cache::MetricsCache;
use crate::commands::CommandProcessor;
use crate::config::AnnotatorConfig;
use crate::context::{PipelineEvent, RequestContext, TranscriptObserver};
use crate::error::{AnnotatorError, Result};
use crate::linkify::Linkifier;
use crate::schema::{ChatMessage, FocalFirm, SessionFlags};
use crate::store::{MetricsStore, TickerStore};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn reply(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// State carried across requests for one user. Owned by the request layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub focal_firm: Option<FocalFirm>,
    pub flags: SessionFlags,
    history: Vec<ChatMessage>,
    history_limit: usize,
}

impl ChatSession {
    pub fn new(history_limit: usize) -> Self {
        Self {
            focal_firm: None,
            flags: SessionFlags::default(),
            history: Vec::new(),
            history_limit: history_limit.max(1),
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.history.push(message);
    }

    /// Drop the oldest messages beyond the history limit. Called once an exchange is
    /// complete, so the model may briefly see one message over the limit.
    pub fn trim_history(&mut self) {
        if self.history.len() > self.history_limit {
            let excess = self.history.len() - self.history_limit;
            self.history.drain(..excess);
        }
    }

    pub fn set_focal_firm(&mut self, firm: FocalFirm) {
        self.focal_firm = Some(firm);
    }

    pub fn clear_focal_firm(&mut self) {
        self.focal_firm = None;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub status_message: String,
    /// Linkified model reply; `None` when the input held only directives.
    pub reply: Option<String>,
    /// Rendered log lines for this turn, filled only in debug mode.
    pub debug_log: Vec<String>,
}

pub struct ChatPipeline {
    commands: CommandProcessor,
    linkifier: Linkifier,
    model: Arc<dyn ChatModel>,
    config: AnnotatorConfig,
}

impl ChatPipeline {
    pub fn new(
        tickers: Arc<dyn TickerStore>,
        metrics: Arc<dyn MetricsStore>,
        model: Arc<dyn ChatModel>,
        config: AnnotatorConfig,
    ) -> Self {
        let cache = Arc::new(MetricsCache::with_ttl(metrics, config.metrics_cache_ttl()));
        Self::with_cache(tickers, cache, model, config)
    }

    /// Share one metrics cache between several pipelines.
    pub fn with_cache(
        tickers: Arc<dyn TickerStore>,
        cache: Arc<MetricsCache>,
        model: Arc<dyn ChatModel>,
        config: AnnotatorConfig,
    ) -> Self {
        Self {
            commands: CommandProcessor::new(tickers),
            linkifier: Linkifier::new(cache),
            model,
            config,
        }
    }

    pub fn new_session(&self) -> ChatSession {
        ChatSession::new(self.config.chat_history_limit)
    }

    pub fn linkifier(&self) -> &Linkifier {
        &self.linkifier
    }

    /// One chat turn: directives, then the model, then linkification of the reply.
    pub async fn handle_turn(
        &self,
        session: &mut ChatSession,
        raw_input: &str,
        ctx: &RequestContext,
    ) -> Result<ChatReply> {
        let transcript = Arc::new(TranscriptObserver::new());
        let ctx = ctx.clone().with_observer(transcript.clone());

        let outcome = self
            .commands
            .process(raw_input, &mut session.flags, &ctx)
            .await?;

        if let Some(firm) = outcome.last_resolved_firm() {
            ctx.info(PipelineEvent::FocalFirmSet {
                ticker: firm.ticker.clone(),
                firm_id: firm.firm_id.clone(),
            });
            session.set_focal_firm(firm);
        }

        if outcome.residual_text.is_empty() && outcome.status_message.trim().is_empty() {
            return Err(AnnotatorError::EmptyInput);
        }

        let reply = if outcome.residual_text.is_empty() {
            None
        } else {
            session.push(ChatMessage::user(outcome.residual_text.clone()));
            debug!(
                "[{}] Sending {} message(s) to the model",
                ctx.request_id(),
                session.history().len()
            );

            let answer = self
                .model
                .reply(session.history())
                .await
                .map_err(|e| match e {
                    AnnotatorError::Model(_) => e,
                    other => AnnotatorError::Model(other.to_string()),
                })?;
            session.push(ChatMessage::assistant(answer.clone()));
            session.trim_history();

            Some(
                self.linkifier
                    .linkify(&answer, session.focal_firm.as_ref(), &ctx)
                    .await,
            )
        };

        let debug_log = if session.flags.debug {
            transcript.lines()
        } else {
            Vec::new()
        };

        Ok(ChatReply {
            status_message: outcome.status_message,
            reply,
            debug_log,
        })
    }

    /// Make a report the session's focal firm and give the model its content.
    pub fn attach_report(
        &self,
        session: &mut ChatSession,
        ticker: &str,
        firm_id: &str,
        content: &str,
        ctx: &RequestContext,
    ) -> Result<()> {
        if ticker.trim().is_empty() {
            return Err(AnnotatorError::MissingField("ticker"));
        }
        if firm_id.trim().is_empty() {
            return Err(AnnotatorError::MissingField("firm_id"));
        }

        session.set_focal_firm(FocalFirm::new(ticker, firm_id));
        ctx.info(PipelineEvent::FocalFirmSet {
            ticker: ticker.to_string(),
            firm_id: firm_id.to_string(),
        });

        session.push(ChatMessage::system(format!(
            "User requested to view the {} (RSSD ID: {}) financial report. Here is the report content:\n\n{}",
            ticker, firm_id, content
        )));
        session.trim_history();

        Ok(())
    }

    pub async fn linkify_report(
        &self,
        session: &ChatSession,
        html: &str,
        ctx: &RequestContext,
    ) -> String {
        self.linkifier
            .linkify(html, session.focal_firm.as_ref(), ctx)
            .await
    }
}
