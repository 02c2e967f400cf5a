//! Translation of agent run events into UI status lines.
//!
//! A run moves through a small set of phases. Each phase opens a status line
//! (`StatusStart`) and closes it (`StatusComplete`, annotated with how long it
//! was open) when the next phase begins:
//!
//! ```text
//! Start ──tool started──▶ ToolCall ──tool completed──▶ Planning ──content──▶ Content
//!   │                        ▲                           │
//!   └───────content──────────┼───────────────────────────┘
//!                            └──────tool started─────────┘
//! ```
//!
//! The "Generating response..." line opened on entering `Content` is never
//! closed: consumers drop status lines once content starts arriving. At end
//! of stream any still-open `Planning` or `ToolCall` line is closed.

use std::collections::{HashMap, VecDeque};

use futures::{stream, Stream, StreamExt};
use tokio::time::Instant;

use crate::error::Error;
use crate::event::{RunEvent, ToolInvocation};

const GENERATING: &str = "Generating response...";
const ANALYZING: &str = "Analyzing results...";
const MAX_QUERY_PREVIEW: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    StatusStart,
    StatusComplete,
    Content,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub kind: StatusKind,
    pub text: String,
}

impl StatusUpdate {
    pub fn start(text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::StatusStart,
            text: text.into(),
        }
    }

    pub fn complete(text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::StatusComplete,
            text: text.into(),
        }
    }

    pub fn content(text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Content,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    /// Thinking between tool calls ("Analyzing results...").
    Planning,
    ToolCall,
    Content,
}

/// Human-readable labels for tools that have no dedicated formatter.
#[derive(Debug, Clone)]
pub struct ToolDisplayNames {
    names: HashMap<String, String>,
}

impl Default for ToolDisplayNames {
    fn default() -> Self {
        Self::new()
            .with_name("fetch_url_contents", "Reading a page")
            .with_name("search_web", "Searching the web")
            .with_name("fetch_urls", "Reading product pages")
            .with_name("search_web_multi", "Searching the web")
    }
}

impl ToolDisplayNames {
    /// An empty table; every tool uses the default formatting rule.
    pub fn new() -> Self {
        Self {
            names: HashMap::new(),
        }
    }

    pub fn with_name(mut self, tool: impl Into<String>, label: impl Into<String>) -> Self {
        self.names.insert(tool.into(), label.into());
        self
    }

    /// Label for a tool name, without the trailing ellipsis.
    pub fn label(&self, tool: &str) -> String {
        self.names
            .get(tool)
            .cloned()
            .unwrap_or_else(|| title_case(tool))
    }

    /// Status line text for a tool invocation.
    pub fn describe(&self, invocation: &ToolInvocation) -> String {
        match invocation {
            ToolInvocation::SearchMany { queries } => match queries.split_first() {
                Some((first, rest)) => {
                    let first: String = first.chars().take(MAX_QUERY_PREVIEW).collect();
                    if rest.is_empty() {
                        format!("Searching for '{}'...", first)
                    } else {
                        format!("Searching for '{}' and {} more...", first, rest.len())
                    }
                }
                None => format!("{}...", self.label(invocation.name())),
            },
            ToolInvocation::FetchMany { urls } => match urls.len() {
                0 => format!("{}...", self.label(invocation.name())),
                1 => "Reading 1 product page...".to_string(),
                n => format!("Reading {} product pages...", n),
            },
            ToolInvocation::Other { name, .. } => format!("{}...", self.label(name)),
        }
    }
}

/// `fetch_store_hours` -> `Fetch Store Hours`
fn title_case(name: &str) -> String {
    name.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

struct OpenStatus {
    label: String,
    started: Instant,
}

/// State machine behind [`translate`].
pub struct StatusTranslator {
    phase: Phase,
    open: Option<OpenStatus>,
    display: ToolDisplayNames,
}

impl Default for StatusTranslator {
    fn default() -> Self {
        Self::new(ToolDisplayNames::default())
    }
}

impl StatusTranslator {
    pub fn new(display: ToolDisplayNames) -> Self {
        Self {
            phase: Phase::Start,
            open: None,
            display,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Advance on one event, returning the updates it produces in order.
    ///
    /// A tool completion while "Analyzing results" is already open emits
    /// nothing; the line keeps its original start time.
    pub fn on_event(&mut self, event: RunEvent) -> Vec<StatusUpdate> {
        let mut out = Vec::new();

        match event {
            RunEvent::Content(text) => {
                if text.is_empty() {
                    return out;
                }
                if self.phase != Phase::Content {
                    self.close(&mut out);
                    out.push(StatusUpdate::start(GENERATING));
                    self.phase = Phase::Content;
                }
                out.push(StatusUpdate::content(text));
            }
            RunEvent::ToolCallStarted(invocation) => {
                self.close(&mut out);
                let label = self.display.describe(&invocation);
                self.open(label, &mut out);
                self.phase = Phase::ToolCall;
            }
            RunEvent::ToolCallCompleted { .. } => {
                if self.phase != Phase::Planning {
                    self.close(&mut out);
                    self.open(ANALYZING.to_string(), &mut out);
                    self.phase = Phase::Planning;
                }
            }
        }

        out
    }

    /// Close whatever is still open at end of stream.
    pub fn finish(&mut self) -> Vec<StatusUpdate> {
        let mut out = Vec::new();
        self.close(&mut out);
        out
    }

    fn open(&mut self, label: String, out: &mut Vec<StatusUpdate>) {
        out.push(StatusUpdate::start(label.clone()));
        self.open = Some(OpenStatus {
            label,
            started: Instant::now(),
        });
    }

    fn close(&mut self, out: &mut Vec<StatusUpdate>) {
        if let Some(status) = self.open.take() {
            let secs = status.started.elapsed().as_secs_f64();
            out.push(StatusUpdate::complete(format!(
                "{} ({:.1}s)",
                status.label.trim_end_matches("..."),
                secs
            )));
        }
    }
}

struct TranslateState<S> {
    events: S,
    translator: StatusTranslator,
    pending: VecDeque<Result<StatusUpdate, Error>>,
    done: bool,
}

/// Lazily translate a run event stream into status and content updates.
///
/// Consumes `events` exactly once. An upstream error closes open status
/// lines, is passed through, and ends the stream.
pub fn translate<S>(
    events: S,
    translator: StatusTranslator,
) -> impl Stream<Item = Result<StatusUpdate, Error>>
where
    S: Stream<Item = Result<RunEvent, Error>> + Unpin,
{
    let state = TranslateState {
        events,
        translator,
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }

            match state.events.next().await {
                Some(Ok(event)) => {
                    let updates = state.translator.on_event(event);
                    state.pending.extend(updates.into_iter().map(Ok));
                }
                Some(Err(e)) => {
                    let updates = state.translator.finish();
                    state.pending.extend(updates.into_iter().map(Ok));
                    state.pending.push_back(Err(e));
                    state.done = true;
                }
                None => {
                    let updates = state.translator.finish();
                    state.pending.extend(updates.into_iter().map(Ok));
                    state.done = true;
                }
            }
        }
    })
}

/// Running view of a translated stream: status lines plus the response so far.
#[derive(Debug, Default)]
pub struct StatusLog {
    lines: Vec<String>,
    response: String,
    line_open: bool,
}

impl StatusLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, update: &StatusUpdate) {
        match update.kind {
            StatusKind::StatusStart => {
                self.lines.push(update.text.clone());
                self.line_open = true;
            }
            StatusKind::StatusComplete => {
                match self.lines.last_mut() {
                    Some(last) if self.line_open => *last = update.text.clone(),
                    _ => self.lines.push(update.text.clone()),
                }
                self.line_open = false;
            }
            StatusKind::Content => {
                self.lines.clear();
                self.line_open = false;
                self.response.push_str(&update.text);
            }
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn response(&self) -> &str {
        &self.response
    }

    pub fn into_response(self) -> String {
        self.response
    }
}
