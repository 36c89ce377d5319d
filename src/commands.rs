//! Session directives at the head of user input.
//!
//! Leading lines are consumed while they are directives:
//!
//! - `-v` turns on verbose mode
//! - `-x` turns on debug mode, which implies verbose
//! - an all-uppercase/digit token such as `JPM` is looked up as a ticker
//!
//! The first line that is none of these ends the scan for good. It and everything after
//! it is the message forwarded to the model.

use crate::context::{PipelineEvent, RequestContext};
use crate::error::{AnnotatorError, Result};
use crate::schema::{CommandOutcome, SessionFlags, TickerResolution};
use crate::store::TickerStore;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Directive<'a> {
    Verbose,
    Debug,
    Ticker(&'a str),
}

fn parse_directive(line: &str) -> Option<Directive<'_>> {
    match line {
        "-v" => Some(Directive::Verbose),
        "-x" => Some(Directive::Debug),
        _ if is_ticker_symbol(line) => Some(Directive::Ticker(line)),
        _ => None,
    }
}

pub fn is_ticker_symbol(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

pub struct CommandProcessor {
    tickers: Arc<dyn TickerStore>,
}

impl CommandProcessor {
    pub fn new(tickers: Arc<dyn TickerStore>) -> Self {
        Self { tickers }
    }

    /// Consume leading directives from `raw_input`, setting `flags` as they are seen.
    ///
    /// A failed ticker lookup aborts the pass. Flags set by earlier lines stay set.
    pub async fn process(
        &self,
        raw_input: &str,
        flags: &mut SessionFlags,
        ctx: &RequestContext,
    ) -> Result<CommandOutcome> {
        let lines: Vec<&str> = raw_input.split('\n').collect();
        let mut notes: Vec<String> = Vec::new();
        let mut resolutions = Vec::new();
        let mut consumed = 0;

        for line in &lines {
            let Some(directive) = parse_directive(line.trim()) else {
                break;
            };

            match directive {
                Directive::Verbose => {
                    flags.verbose = true;
                    let event = PipelineEvent::VerboseEnabled;
                    notes.push(event.to_string());
                    ctx.info(event);
                }
                Directive::Debug => {
                    flags.debug = true;
                    flags.verbose = true;
                    let event = PipelineEvent::DebugEnabled;
                    notes.push(event.to_string());
                    ctx.info(event);
                }
                Directive::Ticker(ticker) => {
                    ctx.info(PipelineEvent::TickerDetected {
                        ticker: ticker.to_string(),
                    });
                    let firm_id = self.resolve(ticker).await?;
                    let event = match &firm_id {
                        Some(firm_id) => PipelineEvent::TickerResolved {
                            ticker: ticker.to_string(),
                            firm_id: firm_id.clone(),
                        },
                        None => PipelineEvent::TickerUnresolved {
                            ticker: ticker.to_string(),
                        },
                    };
                    notes.push(event.to_string());
                    ctx.info(event);
                    resolutions.push(TickerResolution {
                        ticker: ticker.to_string(),
                        firm_id,
                    });
                }
            }

            consumed += 1;
        }

        ctx.debug(PipelineEvent::CommandsComplete {
            consumed_lines: consumed,
        });

        Ok(CommandOutcome {
            residual_text: lines[consumed..].join("\n").trim().to_string(),
            status_message: notes.join("\n"),
            resolutions,
        })
    }

    async fn resolve(&self, ticker: &str) -> Result<Option<String>> {
        self.tickers.resolve(ticker).await.map_err(|e| match e {
            AnnotatorError::TickerLookup { .. } => e,
            other => AnnotatorError::TickerLookup {
                ticker: ticker.to_string(),
                reason: other.to_string(),
            },
        })
    }
}
