//! Interactive chat mode with readline support.

use std::collections::VecDeque;
use std::path::PathBuf;

use anyhow::Result;
use crossterm::style::{Color, ResetColor, SetForegroundColor};
use crossterm::ExecutableCommand;
use rustyline::error::ReadlineError;
use rustyline::history::FileHistory;
use rustyline::{Config, Editor};

use maple_core::{Message, ShoppingAgent};

use crate::prompt::{placeholder, thinking_message};
use crate::render::{run_turn, TerminalRenderer};

/// The last few question/answer pairs of the conversation.
pub struct ChatSession {
    turns: VecDeque<(String, String)>,
    max_turns: usize,
}

impl ChatSession {
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(max_turns),
            max_turns,
        }
    }

    /// Remember a completed exchange, forgetting the oldest beyond the limit.
    pub fn record(&mut self, prompt: &str, response: &str) {
        if self.max_turns == 0 {
            return;
        }
        if self.turns.len() == self.max_turns {
            self.turns.pop_front();
        }
        self.turns.push_back((prompt.to_string(), response.to_string()));
    }

    pub fn history(&self) -> Vec<Message> {
        self.turns
            .iter()
            .flat_map(|(prompt, response)| {
                [Message::user(prompt.as_str()), Message::assistant(response.as_str())]
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }
}

/// Chat commands
#[derive(Debug, PartialEq)]
enum ChatCommand {
    Quit,
    Clear,
    History,
    Help,
    Tools,
    ToggleToolCalls,
    Unknown(String),
    None(String), // Regular message
}

fn parse_command(input: &str) -> ChatCommand {
    let trimmed = input.trim();

    if !trimmed.starts_with('/') {
        return ChatCommand::None(trimmed.to_string());
    }

    let cmd = trimmed
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_lowercase();

    match cmd.as_str() {
        "/quit" | "/exit" | "/q" => ChatCommand::Quit,
        "/clear" | "/c" => ChatCommand::Clear,
        "/history" | "/h" => ChatCommand::History,
        "/help" | "/?" => ChatCommand::Help,
        "/tools" | "/t" => ChatCommand::Tools,
        "/status" | "/s" => ChatCommand::ToggleToolCalls,
        _ => ChatCommand::Unknown(cmd),
    }
}

fn print_help() {
    println!(
        r#"
Chat Commands:
  /help, /?      Show this help message
  /quit, /exit   Exit chat mode
  /clear, /c     Forget the conversation so far
  /history, /h   Show how many exchanges are remembered
  /tools, /t     List available tools
  /status, /s    Show or hide tool activity

Tips:
  - Press Ctrl+C to cancel the current line
  - Press Ctrl+D to exit
  - Up/Down arrows navigate history
"#
    );
}

fn print_hint(text: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    stdout.execute(SetForegroundColor(Color::DarkGrey))?;
    println!("{}", text);
    stdout.execute(ResetColor)?;
    Ok(())
}

/// Run interactive chat mode
pub async fn run_chat(agent: &ShoppingAgent, history_turns: usize, show_tool_calls: bool) -> Result<()> {
    let config = Config::builder()
        .history_ignore_space(true)
        .history_ignore_dups(true)?
        .build();

    let history_path = get_history_path();
    let mut rl: Editor<(), FileHistory> = Editor::with_config(config)?;

    if let Some(path) = &history_path {
        let _ = rl.load_history(path);
    }

    let mut session = ChatSession::new(history_turns);
    let mut show_tool_calls = show_tool_calls;

    println!("Maple 🍁 Type /help for commands, /quit to exit.");
    print_hint(&format!("Try: \"{}\"\n", placeholder()))?;

    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                let _ = rl.add_history_entry(&line);

                match parse_command(&line) {
                    ChatCommand::Quit => {
                        println!("Goodbye!");
                        break;
                    }
                    ChatCommand::Clear => {
                        session.clear();
                        println!("Conversation cleared.\n");
                    }
                    ChatCommand::History => {
                        println!(
                            "Remembering {} of the last {} exchanges.\n",
                            session.turn_count(),
                            history_turns
                        );
                    }
                    ChatCommand::Help => print_help(),
                    ChatCommand::Tools => {
                        println!("\nAvailable tools:");
                        for def in agent.tools().definitions() {
                            println!("  {}", def.name);
                        }
                        println!();
                    }
                    ChatCommand::ToggleToolCalls => {
                        show_tool_calls = !show_tool_calls;
                        let state = if show_tool_calls { "shown" } else { "hidden" };
                        println!("Tool activity {}.\n", state);
                    }
                    ChatCommand::Unknown(cmd) => {
                        eprintln!("Unknown command: {}. Type /help for available commands.", cmd);
                    }
                    ChatCommand::None(text) => {
                        if text.is_empty() {
                            continue;
                        }

                        let mut renderer = TerminalRenderer::stdio(show_tool_calls);
                        match run_turn(agent, session.history(), &text, thinking_message(), &mut renderer)
                            .await
                        {
                            Ok(response) => {
                                session.record(&text, &response);
                                println!();
                            }
                            Err(e) => {
                                tracing::debug!(error = %e, "Chat turn failed");
                                renderer.print_error(&e.to_string())?;
                                println!();
                            }
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(e) => {
                eprintln!("Error reading input: {}", e);
                break;
            }
        }
    }

    if let Some(path) = &history_path {
        let _ = rl.save_history(path);
    }

    Ok(())
}

fn get_history_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("maple").join("chat_history"))
}
