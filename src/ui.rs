use crate::error::ParleyError;
use crate::markdown::MarkdownRenderer;
use crate::store::{ConversationSummary, StoredMessage};
use colored::Colorize;
use crossterm::cursor::MoveTo;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};
use std::io::{self, stdout, Write};

/// Message severity levels for consistent UI feedback
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MessageSeverity {
    /// Recoverable issues, rejected input
    Warning,
    /// Failed operations (network, auth, dispatch)
    Error,
    Info,
    Success,
}

impl MessageSeverity {
    pub fn prefix(&self) -> colored::ColoredString {
        match self {
            Self::Warning => "Warning:".bright_yellow().bold(),
            Self::Error => "Error:".bright_red().bold(),
            Self::Info => "Info:".bright_cyan().bold(),
            Self::Success => "Success:".bright_green().bold(),
        }
    }
}

/// RAII guard that ensures raw mode is disabled when dropped.
struct RawModeGuard;

impl RawModeGuard {
    fn new() -> io::Result<Self> {
        crossterm::terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::terminal::disable_raw_mode();
    }
}

/// Effect of one key press on a masked input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MaskedKey {
    Typed,
    Erased,
    Ignored,
    Submit,
    Cancel,
}

fn apply_masked_key(secret: &mut String, key: &KeyEvent) -> MaskedKey {
    if key.kind != KeyEventKind::Press {
        return MaskedKey::Ignored;
    }
    match key.code {
        KeyCode::Enter => MaskedKey::Submit,
        KeyCode::Char('c') | KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            MaskedKey::Cancel
        }
        KeyCode::Char(c) => {
            secret.push(c);
            MaskedKey::Typed
        }
        KeyCode::Backspace => match secret.pop() {
            Some(_) => MaskedKey::Erased,
            None => MaskedKey::Ignored,
        },
        _ => MaskedKey::Ignored,
    }
}

/// UI utilities for the landing page and the chat view
pub struct UI {
    markdown: MarkdownRenderer,
}

impl UI {
    pub fn new() -> Self {
        Self {
            markdown: MarkdownRenderer::new(),
        }
    }

    pub fn print_message(severity: MessageSeverity, message: &str) {
        eprintln!("{} {}", severity.prefix(), message);
    }

    pub fn print_warning(message: &str) {
        Self::print_message(MessageSeverity::Warning, message);
    }

    pub fn print_info(message: &str) {
        Self::print_message(MessageSeverity::Info, message);
    }

    pub fn print_success(message: &str) {
        Self::print_message(MessageSeverity::Success, message);
    }

    pub fn print_error_with_hint(error: &ParleyError) {
        eprintln!("{} {}", MessageSeverity::Error.prefix(), error);
        if let Some(hint) = error.hint() {
            eprintln!("  {} {}", "Hint:".bright_cyan(), hint);
        }
    }

    /// Show a failure as a transient notice. Failures that are only logged
    /// never reach the screen.
    pub fn print_toast(error: &ParleyError) {
        if error.is_user_visible() {
            Self::print_error_with_hint(error);
        }
    }

    pub fn print_landing() {
        println!();
        println!("{}", "Parley".bright_cyan().bold());
        println!("{}", "Sign in or create an account to start chatting.".dimmed());
        println!();
    }

    pub fn print_welcome(email: Option<&str>) {
        println!();
        match email {
            Some(email) => println!(
                "{} {}",
                "Signed in as".bright_green(),
                email.bright_white().bold()
            ),
            None => println!("{}", "Signed in".bright_green()),
        }
        println!("{}", "Type a message to chat. /help lists commands.".dimmed());
        println!();
    }

    pub fn print_help() {
        println!();
        for (command, description) in crate::commands::COMMANDS {
            println!("  {:<12} {}", command.bright_cyan(), description.dimmed());
        }
        println!();
    }

    pub fn print_goodbye() {
        println!("{}", "Goodbye!".bright_cyan());
    }

    pub fn print_prompt(pending: bool) {
        let symbol = if pending { "…>" } else { "λ>" };
        print!("{} ", symbol.bright_green().bold());
        let _ = io::stdout().flush();
    }

    /// Read a line from the terminal without echoing it, printing `*` per
    /// character. Returns `None` on Ctrl-C or Ctrl-D. Blocks; run it off the
    /// async runtime.
    pub fn read_masked(label: &str) -> io::Result<Option<String>> {
        let mut out = stdout();
        write!(out, "{}", label)?;
        out.flush()?;

        let mut secret = String::new();
        let submitted = {
            let _guard = RawModeGuard::new()?;
            loop {
                let Event::Key(key) = event::read()? else {
                    continue;
                };
                match apply_masked_key(&mut secret, &key) {
                    MaskedKey::Typed => write!(out, "*")?,
                    MaskedKey::Erased => write!(out, "\x08 \x08")?,
                    MaskedKey::Ignored => continue,
                    MaskedKey::Submit => break true,
                    MaskedKey::Cancel => break false,
                }
                out.flush()?;
            }
        };

        write!(out, "\r\n")?;
        out.flush()?;
        Ok(submitted.then_some(secret))
    }

    pub fn print_pending() {
        println!("{}", "Awaiting response...".truecolor(0xFF, 0x99, 0x33));
    }

    pub fn print_loading() {
        println!("{}", "Loading conversation...".dimmed());
    }

    pub fn render_message(&self, row: &StoredMessage) {
        if row.message.is_human() {
            println!("{} {}", "You:".bright_green().bold(), row.message.content);
        } else {
            println!("{}", "Agent:".bright_blue().bold());
            println!("{}", self.markdown.render(&row.message.content));
        }
        println!();
    }

    /// Redraw the whole conversation, used when the list is replaced wholesale.
    pub fn render_all(&self, session_id: &str, messages: &[StoredMessage]) {
        if let Err(e) = clear_screen() {
            tracing::debug!(error = %e, "Could not clear the terminal");
        }
        Self::print_session_header(session_id);
        if messages.is_empty() {
            println!("{}", "No messages yet.".dimmed());
            println!();
        }
        for row in messages {
            self.render_message(row);
        }
    }

    pub fn print_session_header(session_id: &str) {
        println!("{}", "═".repeat(60).bright_cyan());
        println!(
            "{} {}",
            "Conversation".bright_cyan().bold(),
            session_id.dimmed()
        );
        println!("{}", "═".repeat(60).bright_cyan());
        println!();
    }

    pub fn print_conversations(conversations: &[ConversationSummary], current: &str) {
        println!();
        if conversations.is_empty() {
            println!("{}", "No previous conversations.".yellow());
            println!();
            return;
        }

        println!("{}", "Conversations:".bright_cyan().bold());
        for (i, summary) in conversations.iter().enumerate() {
            let marker = if summary.session_id == current {
                "*".bright_green().bold()
            } else {
                " ".normal()
            };
            println!(
                "{} {:>3}. {}",
                marker,
                (i + 1).to_string().bright_white(),
                summary.title
            );
        }
        println!("{}", "Open one with /open <n>.".dimmed());
        println!();
    }
}

impl Default for UI {
    fn default() -> Self {
        Self::new()
    }
}

fn clear_screen() -> io::Result<()> {
    let mut out = stdout();
    execute!(out, Clear(ClearType::All), MoveTo(0, 0))?;
    out.flush()?;
    Ok(())
}
