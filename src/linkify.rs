//! Metric linkification.
//!
//! Rewrites mentions of a firm's known metrics into a clickable reference followed by a
//! hidden container the rendering surface fills in with a graph:
//!
//! ```text
//! <a href="#" class="metric-link" data-ticker=".." data-rssd-id=".." data-metric=".."
//!    data-graph-id="ID" onclick="createGraph(..)">Net Income</a>
//! <div id="ID" class="metric-graph-container" style="display: none;"></div>
//! ```
//!
//! Longer names are linked first, and a candidate inside an existing `<a>` element or
//! inside a tag's attributes is left alone, so running the pass on its own output is a
//! no-op.

use crate::cache::MetricsCache;
use crate::context::{PipelineEvent, RequestContext};
use crate::schema::{has_focal_firm, FocalFirm, MetricName};
use chrono::Utc;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::Rng;
use regex::{Regex, RegexBuilder};
use std::sync::Arc;

pub const LINK_CLASS: &str = "metric-link";
pub const CONTAINER_CLASS: &str = "metric-graph-container";
pub const ATTR_TICKER: &str = "data-ticker";
pub const ATTR_FIRM_ID: &str = "data-rssd-id";
pub const ATTR_METRIC: &str = "data-metric";
pub const ATTR_GRAPH_ID: &str = "data-graph-id";

/// Characters `encodeURIComponent` leaves untouched.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

const ID_SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 9;

pub struct Linkifier {
    cache: Arc<MetricsCache>,
}

impl Linkifier {
    pub fn new(cache: Arc<MetricsCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &MetricsCache {
        &self.cache
    }

    /// Link every known metric of `firm` mentioned in `text`.
    ///
    /// Returns `text` unchanged when there is no usable firm, the firm has no metrics, or
    /// the metric lookup fails.
    pub async fn linkify(
        &self,
        text: &str,
        firm: Option<&FocalFirm>,
        ctx: &RequestContext,
    ) -> String {
        let firm = match firm {
            Some(firm) if has_focal_firm(Some(firm)) => firm,
            _ => {
                ctx.debug(PipelineEvent::LinkifySkipped {
                    reason: "no focal firm".to_string(),
                });
                return text.to_string();
            }
        };
        if text.is_empty() {
            ctx.debug(PipelineEvent::LinkifySkipped {
                reason: "empty text".to_string(),
            });
            return String::new();
        }

        ctx.info(PipelineEvent::LinkifyStarted {
            ticker: firm.ticker.clone(),
            firm_id: firm.firm_id.clone(),
            text_len: text.len(),
        });

        let metrics = match self.cache.get_metrics(&firm.firm_id).await {
            Ok(metrics) => metrics,
            Err(e) => {
                ctx.warn(PipelineEvent::MetricsLookupFailed {
                    firm_id: firm.firm_id.clone(),
                    reason: e.to_string(),
                });
                return text.to_string();
            }
        };
        ctx.debug(PipelineEvent::MetricsLoaded {
            firm_id: firm.firm_id.clone(),
            count: metrics.len(),
        });

        if metrics.is_empty() {
            ctx.info(PipelineEvent::LinkifySkipped {
                reason: format!("no metrics for firm {}", firm.firm_id),
            });
            return text.to_string();
        }

        let (linked, replacements) = link_metrics(text, firm, &metrics, ctx);

        ctx.info(PipelineEvent::LinkifyComplete {
            replacements,
            output_len: linked.len(),
        });

        linked
    }
}

/// Longest names first; equal lengths keep store order.
pub fn order_by_length(metrics: &[MetricName]) -> Vec<&str> {
    let mut ordered: Vec<&str> = metrics
        .iter()
        .map(String::as_str)
        .filter(|name| !name.trim().is_empty())
        .collect();
    ordered.sort_by_key(|name| std::cmp::Reverse(name.chars().count()));
    ordered
}

/// Run the substitution passes over `text`, returning the new text and the number of
/// references created.
pub fn link_metrics(
    text: &str,
    firm: &FocalFirm,
    metrics: &[MetricName],
    ctx: &RequestContext,
) -> (String, usize) {
    let mut current = text.to_string();
    let mut replacements = 0;

    for metric in order_by_length(metrics) {
        let Some(pattern) = metric_pattern(metric) else {
            log::warn!("Skipping metric {:?}: could not build a match for it", metric);
            continue;
        };

        let (next, count) = link_one_metric(&current, metric, &pattern, firm, ctx);
        if count > 0 {
            log::debug!("Metric \"{}\" found and replaced {} time(s)", metric, count);
            current = next;
            replacements += count;
        }
    }

    (current, replacements)
}

fn metric_pattern(metric: &str) -> Option<Regex> {
    RegexBuilder::new(&regex::escape(metric))
        .case_insensitive(true)
        .build()
        .ok()
}

fn link_one_metric(
    text: &str,
    metric: &str,
    pattern: &Regex,
    firm: &FocalFirm,
    ctx: &RequestContext,
) -> (String, usize) {
    let tags = scan_tags(text);
    let mut markup = MarkupCursor::new(&tags);
    let mut output = String::with_capacity(text.len());
    let mut copied_to = 0;
    let mut search_from = 0;
    let mut count = 0;

    while let Some(found) = pattern.find_at(text, search_from) {
        let (start, end) = (found.start(), found.end());

        let bounded = is_word_boundary(text, start) && is_word_boundary(text, end);
        if markup.excludes(start) || !bounded {
            search_from = next_char_boundary(text, start);
            continue;
        }

        let graph_id = generate_graph_id(firm);
        output.push_str(&text[copied_to..start]);
        output.push_str(&render_link(firm, found.as_str(), &graph_id));
        ctx.debug(PipelineEvent::MetricLinked {
            metric: metric.to_string(),
            matched: found.as_str().to_string(),
            graph_id,
        });

        copied_to = end;
        search_from = end;
        count += 1;
    }

    output.push_str(&text[copied_to..]);
    (output, count)
}

fn next_char_boundary(text: &str, index: usize) -> usize {
    index
        + text[index..]
            .chars()
            .next()
            .map_or(1, char::len_utf8)
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// ASCII `\b`: word-ness of the characters on either side of `index` differs.
fn is_word_boundary(text: &str, index: usize) -> bool {
    let before = text[..index].chars().next_back().is_some_and(is_word_char);
    let after = text[index..].chars().next().is_some_and(is_word_char);
    before != after
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnchorEdge {
    Open,
    Close,
    Other,
}

/// A complete tag, `start` at its `<` and `end` just past its `>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TagSpan {
    start: usize,
    end: usize,
    edge: AnchorEdge,
}

/// Locate every tag in `text`. A `<` only opens a tag when a letter, `/` or `!` follows
/// it and a closing `>` turns up before the next `<`; anything else is plain text.
fn scan_tags(text: &str) -> Vec<TagSpan> {
    let bytes = text.as_bytes();
    let mut tags = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'<' || !starts_tag(&bytes[i + 1..]) {
            i += 1;
            continue;
        }

        match tag_end(bytes, i + 1) {
            Ok(end) => {
                tags.push(TagSpan {
                    start: i,
                    end,
                    edge: anchor_edge(&bytes[i + 1..end]),
                });
                i = end;
            }
            Err(resume) => i = resume,
        }
    }

    tags
}

fn starts_tag(rest: &[u8]) -> bool {
    rest.first()
        .is_some_and(|&c| c.is_ascii_alphabetic() || c == b'/' || c == b'!')
}

/// Scan a tag body from `from`. Quoted attribute values (`name="..."`) may hold `<` and
/// `>`. `Err` carries where the search for the next tag resumes.
fn tag_end(bytes: &[u8], from: usize) -> Result<usize, usize> {
    let mut quote: Option<u8> = None;
    let mut after_equals = false;
    let mut first_open: Option<usize> = None;

    for (i, &b) in bytes.iter().enumerate().skip(from) {
        if b == b'<' && first_open.is_none() {
            first_open = Some(i);
        }

        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            continue;
        }

        match b {
            b'"' | b'\'' if after_equals => quote = Some(b),
            b'>' => return Ok(i + 1),
            b'<' => return Err(i),
            b'=' => {
                after_equals = true;
                continue;
            }
            _ => {}
        }
        if !b.is_ascii_whitespace() {
            after_equals = false;
        }
    }

    Err(first_open.unwrap_or(bytes.len()))
}

fn anchor_edge(body: &[u8]) -> AnchorEdge {
    if is_tag_named(body, b"a") {
        AnchorEdge::Open
    } else if body.first() == Some(&b'/') && is_tag_named(&body[1..], b"a") {
        AnchorEdge::Close
    } else {
        AnchorEdge::Other
    }
}

fn is_tag_named(rest: &[u8], name: &[u8]) -> bool {
    rest.len() > name.len()
        && rest[..name.len()].eq_ignore_ascii_case(name)
        && matches!(rest[name.len()], b'>' | b'/' | b' ' | b'\t' | b'\n' | b'\r')
}

/// Walks the tags of one pass alongside its candidates, which arrive in increasing
/// offset order, keeping a running count of `<a>` opened and closed.
struct MarkupCursor<'a> {
    tags: &'a [TagSpan],
    next: usize,
    opened: usize,
    closed: usize,
}

impl<'a> MarkupCursor<'a> {
    fn new(tags: &'a [TagSpan]) -> Self {
        Self {
            tags,
            next: 0,
            opened: 0,
            closed: 0,
        }
    }

    /// True when `offset` falls inside a tag or inside an unclosed `<a>` element.
    fn excludes(&mut self, offset: usize) -> bool {
        while let Some(tag) = self.tags.get(self.next) {
            if tag.end > offset {
                break;
            }
            match tag.edge {
                AnchorEdge::Open => self.opened += 1,
                AnchorEdge::Close => self.closed += 1,
                AnchorEdge::Other => {}
            }
            self.next += 1;
        }

        let inside_tag = self
            .tags
            .get(self.next)
            .is_some_and(|tag| tag.start < offset);
        inside_tag || self.opened > self.closed
    }
}

pub fn encode_uri_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// `graph-<ticker>-<firm id>-<epoch millis>-<9 base36 chars>`
pub fn generate_graph_id(firm: &FocalFirm) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| ID_SUFFIX_ALPHABET[rng.gen_range(0..ID_SUFFIX_ALPHABET.len())] as char)
        .collect();

    format!(
        "graph-{}-{}-{}-{}",
        firm.ticker,
        firm.firm_id,
        Utc::now().timestamp_millis(),
        suffix
    )
}

pub fn render_link(firm: &FocalFirm, matched: &str, graph_id: &str) -> String {
    let ticker = escape_attribute(&firm.ticker);
    let firm_id = escape_attribute(&firm.firm_id);
    let graph_id = escape_attribute(graph_id);

    format!(
        "<a href=\"#\" class=\"{link_class}\" {attr_ticker}=\"{ticker}\" {attr_firm}=\"{firm_id}\" \
         {attr_metric}=\"{metric}\" {attr_graph}=\"{graph_id}\" \
         onclick=\"createGraph(document.getElementById('{graph_id}'), '{ticker}', '{firm_id}', '{label}')\">{matched}</a>\
         <div id=\"{graph_id}\" class=\"{container_class}\" style=\"display: none;\"></div>",
        link_class = LINK_CLASS,
        attr_ticker = ATTR_TICKER,
        attr_firm = ATTR_FIRM_ID,
        attr_metric = ATTR_METRIC,
        attr_graph = ATTR_GRAPH_ID,
        metric = encode_uri_component(matched),
        label = escape_attribute(matched),
        container_class = CONTAINER_CLASS,
    )
}
