//! Stateful query session with interactive commands.
//!
//! A session owns its defaults. Concurrent users each get their own
//! session; the underlying knowledge base is shared read-only.

use std::fmt;

use tracing::debug;

use lore_core::config::SearchConfig;
use lore_core::error::{LoreError, Result};
use lore_core::types::{QueryMode, QueryModeKind};

use crate::knowledge_base::KnowledgeBase;
use crate::outcome::QueryOutcome;

pub const HELP: &str = "Commands:
  :type <semantic|keyword|hybrid>  Change query mode (alias :mode)
  :k <number>                      Change number of results
  :alpha <0..1>                    Change hybrid semantic weight
  :content <on|off>                Toggle content display
  :related <on|off>                Toggle related documents
  :help                            Show this help
  :quit                            Exit";

/// A parsed `:command` line.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    SetMode(QueryModeKind),
    SetK(usize),
    SetAlpha(f64),
    ShowContent(bool),
    ExpandRelations(bool),
    Help,
    Quit,
}

impl SessionCommand {
    /// Parse one input line.
    ///
    /// Returns `Ok(None)` for lines that are not commands, i.e. queries.
    /// Unknown commands and bad arguments are errors.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if !line.starts_with(':') {
            return Ok(None);
        }
        let mut parts = line.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or_default();
        let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());

        let command = match (name, arg) {
            (":quit" | ":q" | ":exit", _) => SessionCommand::Quit,
            (":help" | ":h", _) => SessionCommand::Help,
            (":type" | ":mode", Some(mode)) => SessionCommand::SetMode(mode.parse()?),
            (":k", Some(k)) => SessionCommand::SetK(k.parse().map_err(|_| {
                LoreError::InvalidArgument(format!("k must be a positive integer, got {}", k))
            })?),
            (":alpha", Some(alpha)) => SessionCommand::SetAlpha(alpha.parse().map_err(|_| {
                LoreError::InvalidArgument(format!("alpha must be a number, got {}", alpha))
            })?),
            (":content", Some(flag)) => SessionCommand::ShowContent(parse_flag(flag)?),
            (":related", Some(flag)) => SessionCommand::ExpandRelations(parse_flag(flag)?),
            (":type" | ":mode" | ":k" | ":alpha" | ":content" | ":related", None) => {
                return Err(LoreError::InvalidArgument(format!("{} needs an argument", name)));
            }
            _ => {
                return Err(LoreError::InvalidArgument(format!("unknown command: {}", name)));
            }
        };
        Ok(Some(command))
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "yes" => Ok(true),
        "off" | "false" | "no" => Ok(false),
        _ => Err(LoreError::InvalidArgument(format!("expected on or off, got {}", value))),
    }
}

/// What the caller should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Message(String),
    Quit,
}

/// Query defaults plus the knowledge base they apply to.
#[derive(Debug, Clone)]
pub struct QuerySession {
    kb: KnowledgeBase,
    mode: QueryModeKind,
    k: usize,
    alpha: f64,
    show_content: bool,
    expand_relations: bool,
    preview_chars: usize,
}

impl QuerySession {
    pub fn new(kb: KnowledgeBase, config: &SearchConfig) -> Result<Self> {
        let mut session = Self {
            kb,
            mode: config.default_mode,
            k: 1,
            alpha: 0.5,
            show_content: config.show_content,
            expand_relations: config.expand_relations,
            preview_chars: config.content_preview_chars,
        };
        session.set_k(config.default_k)?;
        session.set_alpha(config.alpha)?;
        Ok(session)
    }

    pub fn set_mode(&mut self, mode: QueryModeKind) {
        self.mode = mode;
    }

    pub fn set_k(&mut self, k: usize) -> Result<()> {
        if k == 0 {
            return Err(LoreError::InvalidArgument("k must be at least 1".to_string()));
        }
        self.k = k;
        Ok(())
    }

    pub fn set_alpha(&mut self, alpha: f64) -> Result<()> {
        QueryMode::hybrid(alpha)?;
        self.alpha = alpha;
        Ok(())
    }

    pub fn set_show_content(&mut self, show: bool) {
        self.show_content = show;
    }

    pub fn set_expand_relations(&mut self, expand: bool) {
        self.expand_relations = expand;
    }

    /// The fully-specified mode queries currently run in.
    pub fn mode(&self) -> QueryMode {
        match self.mode {
            QueryModeKind::Semantic => QueryMode::Semantic,
            QueryModeKind::Keyword => QueryMode::Keyword,
            QueryModeKind::Hybrid => QueryMode::Hybrid { alpha: self.alpha },
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn show_content(&self) -> bool {
        self.show_content
    }

    pub fn expand_relations(&self) -> bool {
        self.expand_relations
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.kb
    }

    /// Run `text` with the session defaults.
    pub async fn run_query(&self, text: &str) -> Result<QueryOutcome> {
        let mut outcome = self.kb.retriever().run(text, self.mode(), self.k).await?;
        if self.expand_relations {
            for result in &mut outcome.results {
                result.related = self.kb.related(&result.doc_id);
            }
        }
        debug!(
            mode = %self.mode,
            k = self.k,
            results = outcome.results.len(),
            degraded = outcome.degraded,
            "Session query"
        );
        Ok(outcome)
    }

    /// Render an outcome with the session's display settings.
    pub fn render(&self, outcome: &QueryOutcome) -> String {
        outcome.render(self.show_content, self.preview_chars)
    }

    pub fn apply(&mut self, command: SessionCommand) -> Result<CommandOutcome> {
        let message = match command {
            SessionCommand::Quit => return Ok(CommandOutcome::Quit),
            SessionCommand::Help => HELP.to_string(),
            SessionCommand::SetMode(mode) => {
                self.set_mode(mode);
                format!("Query type set to: {}", mode)
            }
            SessionCommand::SetK(k) => {
                self.set_k(k)?;
                format!("Top-k set to: {}", k)
            }
            SessionCommand::SetAlpha(alpha) => {
                self.set_alpha(alpha)?;
                format!("Alpha set to: {}", alpha)
            }
            SessionCommand::ShowContent(show) => {
                self.set_show_content(show);
                format!("Content display: {}", on_off(show))
            }
            SessionCommand::ExpandRelations(expand) => {
                self.set_expand_relations(expand);
                format!("Related documents: {}", on_off(expand))
            }
        };
        Ok(CommandOutcome::Message(message))
    }
}

impl fmt::Display for QuerySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mode={} k={}", self.mode, self.k)?;
        if self.mode == QueryModeKind::Hybrid {
            write!(f, " alpha={}", self.alpha)?;
        }
        write!(
            f,
            " content={} related={}",
            on_off(self.show_content),
            on_off(self.expand_relations)
        )
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}
