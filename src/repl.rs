use crate::auth::{AuthSession, AuthState};
use crate::commands::Command;
use crate::error::{ParleyError, Result};
use crate::routes::{self, Route};
use crate::session::{ChatController, StateChange};
use crate::store::ConversationSummary;
use crate::ui::UI;
use crossterm::cursor::MoveToColumn;
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};
use std::io::{self, IsTerminal, Write};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::{mpsc, watch};

/// What the chat view does after handling one line
enum Flow {
    Continue,
    /// Leave the chat view for another route, or exit with `None`
    Leave(Option<Route>),
}

pub struct Repl {
    auth: AuthState,
    auth_rx: watch::Receiver<Option<AuthSession>>,
    controller: ChatController,
    changes: mpsc::UnboundedReceiver<StateChange>,
    ui: UI,
    input: Lines<BufReader<Stdin>>,
    route: Route,
    /// Result of the last `/list`, indexed by `/open`
    listed: Vec<ConversationSummary>,
    started: bool,
    prompt_shown: bool,
}

impl Repl {
    pub fn new(auth: AuthState, mut controller: ChatController) -> Self {
        let auth_rx = auth.subscribe();
        let changes = controller.observe();
        Self {
            auth,
            auth_rx,
            controller,
            changes,
            ui: UI::new(),
            input: BufReader::new(tokio::io::stdin()).lines(),
            route: Route::Chat,
            listed: Vec::new(),
            started: false,
            prompt_shown: false,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        loop {
            let requested = self.route;
            self.route = match routes::resolve(requested, self.auth.is_authenticated()) {
                Ok(route) => route,
                Err(e) => {
                    tracing::debug!(from = %requested, reason = %e, "Redirecting to landing");
                    Route::Landing
                }
            };
            tracing::debug!(route = %self.route, "Navigating");

            let next = match self.route {
                Route::Landing => self.landing().await?,
                Route::Chat => self.chat().await?,
            };

            match next {
                Some(route) => self.route = route,
                None => break,
            }
        }

        Ok(())
    }

    pub async fn shutdown(self) {
        self.controller.shutdown().await;
        self.auth.shutdown();
        UI::print_goodbye();
    }

    async fn prompt(&mut self, label: &str) -> Result<Option<String>> {
        print!("{}", label);
        io::stdout().flush()?;
        Ok(self.input.next_line().await?)
    }

    /// Masked on a terminal; piped input is read as a plain line.
    async fn read_password(&mut self) -> Result<Option<String>> {
        if !io::stdin().is_terminal() {
            return self.prompt("Password: ").await;
        }
        let password = tokio::task::spawn_blocking(|| UI::read_masked("Password: "))
            .await
            .map_err(io::Error::other)??;
        Ok(password)
    }

    async fn landing(&mut self) -> Result<Option<Route>> {
        UI::print_landing();

        loop {
            let Some(choice) = self
                .prompt("Sign [i]n, sign [u]p or [q]uit: ")
                .await?
            else {
                return Ok(None);
            };

            let sign_up = match choice.trim().to_lowercase().as_str() {
                "" | "i" | "in" | "sign in" => false,
                "u" | "up" | "sign up" => true,
                "q" | "quit" | "/quit" => return Ok(None),
                other => {
                    UI::print_warning(&format!("Unknown choice: {}", other));
                    continue;
                }
            };

            let Some(email) = self.prompt("Email: ").await? else {
                return Ok(None);
            };
            let Some(password) = self.read_password().await? else {
                return Ok(None);
            };
            let email = email.trim();
            if email.is_empty() || password.is_empty() {
                UI::print_warning("Email and password are required");
                continue;
            }

            if sign_up {
                match self.auth.sign_up(email, &password).await {
                    Ok(true) => return Ok(Some(Route::Chat)),
                    Ok(false) => {
                        UI::print_success("Account created. Confirm your email, then sign in.")
                    }
                    Err(e) => UI::print_toast(&e),
                }
            } else {
                match self.auth.sign_in(email, &password).await {
                    Ok(()) => return Ok(Some(Route::Chat)),
                    Err(e) => UI::print_toast(&e),
                }
            }
        }
    }

    async fn chat(&mut self) -> Result<Option<Route>> {
        match self.auth.ensure_fresh().await {
            Ok(()) => {}
            Err(ParleyError::AuthRequired) => return Ok(Some(Route::Landing)),
            Err(e) => UI::print_toast(&e),
        }
        // The session we just entered with is not a sign-out.
        self.auth_rx.borrow_and_update();

        let email = self.auth.current().and_then(|s| s.user.email);
        UI::print_welcome(email.as_deref());

        let opened = if self.started {
            self.controller.start_new_session().await
        } else {
            self.started = true;
            self.controller.start().await
        };
        if let Err(e) = opened {
            UI::print_toast(&e);
        }

        loop {
            self.render_changes();
            if !self.prompt_shown {
                UI::print_prompt(self.controller.state().is_pending());
                self.prompt_shown = true;
            }

            tokio::select! {
                line = self.input.next_line() => {
                    self.prompt_shown = false;
                    let Some(line) = line? else {
                        return Ok(None);
                    };
                    if let Flow::Leave(route) = self.handle_line(&line).await? {
                        self.render_changes();
                        return Ok(route);
                    }
                }
                event = self.controller.next_event() => {
                    if let Some(notice) = self.controller.handle_event(event) {
                        self.clear_prompt();
                        UI::print_toast(&notice);
                    }
                }
                changed = self.auth_rx.changed() => {
                    let signed_out = changed.is_err() || self.auth_rx.borrow_and_update().is_none();
                    if signed_out {
                        self.clear_prompt();
                        self.controller.stop().await;
                        UI::print_info("Signed out");
                        return Ok(Some(Route::Landing));
                    }
                }
            }
        }
    }

    async fn handle_line(&mut self, line: &str) -> Result<Flow> {
        let text = line.trim();
        if text.is_empty() {
            return Ok(Flow::Continue);
        }

        if let Some(command) = Command::parse(text) {
            return self.execute(command).await;
        }

        if self.controller.state().is_pending() {
            UI::print_warning("Still waiting for the previous reply");
            return Ok(Flow::Continue);
        }

        if let Some(flow) = self.refresh_or_leave().await {
            return Ok(flow);
        }

        if let Some(request_id) = self.controller.send(text) {
            tracing::debug!(
                request_id = %request_id,
                session_id = %self.controller.session_id(),
                "Message dispatched"
            );
        }
        Ok(Flow::Continue)
    }

    async fn execute(&mut self, command: Command) -> Result<Flow> {
        match command {
            Command::New => {
                if let Err(e) = self.controller.start_new_session().await {
                    UI::print_toast(&e);
                }
            }
            Command::List => {
                if let Some(flow) = self.refresh_or_leave().await {
                    return Ok(flow);
                }
                self.listed = match self.controller.history().list_conversations().await {
                    Ok(list) => list,
                    Err(e) => {
                        tracing::error!(error = %e, "Error fetching conversations");
                        Vec::new()
                    }
                };
                UI::print_conversations(&self.listed, self.controller.session_id());
            }
            Command::Open(n) => {
                let Some(summary) = self.listed.get(n - 1) else {
                    UI::print_warning("No such conversation. Run /list first");
                    return Ok(Flow::Continue);
                };
                let session_id = summary.session_id.clone();
                if let Some(flow) = self.refresh_or_leave().await {
                    return Ok(flow);
                }
                match self.controller.select_session(&session_id).await {
                    Ok(true) => {}
                    Ok(false) => UI::print_info("That conversation is already open"),
                    Err(e) => UI::print_toast(&e),
                }
            }
            Command::SignOut => match self.auth.sign_out().await {
                Ok(()) => {
                    self.controller.stop().await;
                    UI::print_info("Signed out");
                    return Ok(Flow::Leave(Some(Route::Landing)));
                }
                Err(e) => UI::print_toast(&e),
            },
            Command::Help => UI::print_help(),
            Command::Quit => return Ok(Flow::Leave(None)),
            Command::Invalid(usage) => UI::print_warning(&usage),
        }
        Ok(Flow::Continue)
    }

    /// Make sure the access token is usable. Returns the flow to take when
    /// the session is gone.
    async fn refresh_or_leave(&mut self) -> Option<Flow> {
        match self.auth.ensure_fresh().await {
            Ok(()) => None,
            Err(ParleyError::AuthRequired) => {
                self.controller.stop().await;
                UI::print_toast(&ParleyError::AuthRequired);
                Some(Flow::Leave(Some(Route::Landing)))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not refresh session");
                None
            }
        }
    }

    /// Print queued state changes. A batch holding a full replacement is
    /// drawn from the current state once.
    fn render_changes(&mut self) {
        let mut batch = Vec::new();
        while let Ok(change) = self.changes.try_recv() {
            batch.push(change);
        }
        if batch.is_empty() {
            return;
        }
        self.clear_prompt();

        let redraw = batch
            .iter()
            .any(|c| matches!(c, StateChange::Replaced | StateChange::Reset { .. }));
        if redraw {
            let state = self.controller.state();
            self.ui.render_all(state.session_id(), state.messages());
        }

        for change in batch {
            match change {
                StateChange::Appended(row) if !redraw => self.ui.render_message(&row),
                StateChange::Switched { session_id } => {
                    UI::print_info(&format!("Opening conversation {}", session_id))
                }
                StateChange::Loading(true) if !redraw => UI::print_loading(),
                StateChange::Pending(true) => UI::print_pending(),
                _ => {}
            }
        }
    }

    fn clear_prompt(&mut self) {
        if self.prompt_shown {
            let mut out = io::stdout();
            let _ = execute!(out, Clear(ClearType::CurrentLine), MoveToColumn(0));
            self.prompt_shown = false;
        }
    }
}
