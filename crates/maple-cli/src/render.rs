//! Terminal rendering of translated agent runs.
//!
//! Status lines go to one writer (stderr) and the response to another
//! (stdout), so `maple -p ... > answer.md` captures only the answer.

use std::io::{self, Write};

use anyhow::Result;
use crossterm::cursor::MoveToColumn;
use crossterm::queue;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};
use futures::StreamExt;

use maple_core::{translate, Message, ShoppingAgent, StatusKind, StatusLog, StatusTranslator, StatusUpdate};

pub struct TerminalRenderer<O: Write, E: Write> {
    out: O,
    status: E,
    /// Redraw status lines in place; otherwise only completions are printed.
    interactive: bool,
    show_status: bool,
    line_open: bool,
    in_content: bool,
    log: StatusLog,
}

impl TerminalRenderer<io::Stdout, io::Stderr> {
    pub fn stdio(show_status: bool) -> Self {
        let interactive = atty::is(atty::Stream::Stderr);
        Self::new(io::stdout(), io::stderr(), interactive, show_status)
    }
}

impl<O: Write, E: Write> TerminalRenderer<O, E> {
    pub fn new(out: O, status: E, interactive: bool, show_status: bool) -> Self {
        Self {
            out,
            status,
            interactive,
            show_status,
            line_open: false,
            in_content: false,
            log: StatusLog::new(),
        }
    }

    /// Show a placeholder line until the first update arrives.
    pub fn begin(&mut self, thinking: &str) -> io::Result<()> {
        if self.interactive && self.show_status {
            self.open_line(thinking, Color::DarkGrey)?;
        }
        Ok(())
    }

    pub fn apply(&mut self, update: &StatusUpdate) -> io::Result<()> {
        self.log.apply(update);

        match update.kind {
            StatusKind::StatusStart => {
                if self.show_status && self.interactive {
                    self.clear_line()?;
                    self.open_line(&update.text, Color::Cyan)?;
                }
            }
            StatusKind::StatusComplete => {
                if self.show_status {
                    self.clear_line()?;
                    queue!(
                        self.status,
                        SetForegroundColor(Color::DarkGrey),
                        Print("✓ "),
                        Print(&update.text),
                        Print("\n"),
                        ResetColor
                    )?;
                    self.status.flush()?;
                }
            }
            StatusKind::Content => {
                self.clear_line()?;
                self.in_content = true;
                self.out.write_all(update.text.as_bytes())?;
                self.out.flush()?;
            }
        }
        Ok(())
    }

    /// Clear any open status line and end the response.
    pub fn finish(&mut self) -> io::Result<()> {
        self.clear_line()?;
        if self.in_content {
            writeln!(self.out)?;
            self.out.flush()?;
        }
        Ok(())
    }

    pub fn print_error(&mut self, message: &str) -> io::Result<()> {
        queue!(
            self.status,
            SetForegroundColor(Color::Red),
            Print(format!("Error: {}\n", message)),
            ResetColor
        )?;
        self.status.flush()
    }

    pub fn response(&self) -> &str {
        self.log.response()
    }

    pub fn into_response(self) -> String {
        self.log.into_response()
    }

    fn open_line(&mut self, text: &str, color: Color) -> io::Result<()> {
        queue!(self.status, SetForegroundColor(color), Print(text), ResetColor)?;
        self.status.flush()?;
        self.line_open = true;
        Ok(())
    }

    fn clear_line(&mut self) -> io::Result<()> {
        if self.line_open {
            queue!(self.status, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
            self.status.flush()?;
            self.line_open = false;
        }
        Ok(())
    }
}

/// Run one prompt through the agent and render it; returns the full response.
pub async fn run_turn<O: Write, E: Write>(
    agent: &ShoppingAgent,
    history: Vec<Message>,
    prompt: &str,
    thinking: &str,
    renderer: &mut TerminalRenderer<O, E>,
) -> Result<String> {
    let events = agent.run(history, prompt);
    let updates = translate(events, StatusTranslator::default());
    futures::pin_mut!(updates);

    renderer.begin(thinking)?;

    while let Some(update) = updates.next().await {
        match update {
            Ok(update) => renderer.apply(&update)?,
            Err(e) => {
                renderer.finish()?;
                return Err(e.into());
            }
        }
    }

    renderer.finish()?;
    Ok(renderer.response().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use maple_core::testing::MockProvider;
    use maple_core::{AgentConfig, Tool, ToolDefinition, ToolOutput, ToolRegistry};
    use serde_json::json;
    use std::sync::Arc;

    struct StubFetch;

    #[async_trait::async_trait]
    impl Tool for StubFetch {
        fn name(&self) -> &str {
            "fetch_urls"
        }

        fn description(&self) -> &str {
            "stub"
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new(self.name(), self.description())
        }

        async fn execute(&self, _arguments: serde_json::Value) -> maple_core::Result<ToolOutput> {
            Ok(ToolOutput::success("{}"))
        }
    }

    fn text(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).to_string()
    }

    #[test]
    fn test_content_goes_to_stdout_only() {
        let mut renderer = TerminalRenderer::new(Vec::new(), Vec::new(), false, true);
        renderer.apply(&StatusUpdate::start("Reading 2 product pages...")).unwrap();
        renderer.apply(&StatusUpdate::complete("Reading 2 product pages (0.4s)")).unwrap();
        renderer.apply(&StatusUpdate::content("Try Roots.")).unwrap();
        renderer.finish().unwrap();

        let TerminalRenderer { out, status, .. } = renderer;
        assert_eq!(text(&out), "Try Roots.\n");
        assert!(text(&status).contains("✓ Reading 2 product pages (0.4s)"));
        // Non-interactive output never prints open status lines.
        assert!(!text(&status).contains("pages..."));
    }

    #[test]
    fn test_hidden_status() {
        let mut renderer = TerminalRenderer::new(Vec::new(), Vec::new(), true, false);
        renderer.begin("Thinking...").unwrap();
        renderer.apply(&StatusUpdate::start("Searching the web...")).unwrap();
        renderer.apply(&StatusUpdate::complete("Searching the web (1.0s)")).unwrap();
        renderer.apply(&StatusUpdate::content("hi")).unwrap();

        assert_eq!(renderer.response(), "hi");
        let TerminalRenderer { status, .. } = renderer;
        assert!(status.is_empty());
    }

    #[tokio::test]
    async fn test_run_turn_renders_response() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_tool_call("c1", "fetch_urls", json!({"urls": ["a", "b"]}));
        provider.queue_stream_text(&["Buy ", "a toque."]);

        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(StubFetch));
        let agent = ShoppingAgent::new(provider, Arc::new(tools), AgentConfig::new("test"));

        let mut renderer = TerminalRenderer::new(Vec::new(), Vec::new(), false, true);
        let response = run_turn(&agent, Vec::new(), "hats?", "Thinking...", &mut renderer)
            .await
            .unwrap();

        assert_eq!(response, "Buy a toque.");
        let TerminalRenderer { status, .. } = renderer;
        let status = text(&status);
        assert!(status.contains("✓ Reading 2 product pages ("));
        assert!(status.contains("✓ Analyzing results ("));
    }

    #[tokio::test]
    async fn test_run_turn_surfaces_errors() {
        let provider = Arc::new(MockProvider::new());
        let agent = ShoppingAgent::new(provider, Arc::new(ToolRegistry::new()), AgentConfig::new("test"));

        let mut renderer = TerminalRenderer::new(Vec::new(), Vec::new(), false, true);
        assert!(run_turn(&agent, Vec::new(), "hi", "Thinking...", &mut renderer)
            .await
            .is_err());
    }
}
