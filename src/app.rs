//! Main application state and input loop.

use anyhow::{Context, Result};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

use crate::config::Config;
use crate::error::ApiError;
use crate::models::{Message, Session, Thread, User};
use crate::services::{
    ApiClient, DispatchOutcome, Notice, QueryDispatcher, ReqwestTransport, SharedThreads, TokenStore,
};

/// A line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Log in with an identity-provider token.
    Login(String),
    Logout,
    WhoAmI,
    /// List server sessions.
    Sessions,
    /// Create a server session and switch to it.
    New,
    /// Renew the access token from the session cookie.
    Refresh,
    /// Switch to a session and load its history.
    Open(String),
    /// List local threads.
    Threads,
    Help,
    Quit,
    /// Send a message on the active thread.
    Send(String),
    Unknown(String),
}

impl Command {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Some(Command::Send(line.to_string()));
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        let command = match (name, arg) {
            ("login", token) if !token.is_empty() => Command::Login(token.to_string()),
            ("logout", _) => Command::Logout,
            ("whoami", _) => Command::WhoAmI,
            ("sessions", _) => Command::Sessions,
            ("new", _) => Command::New,
            ("refresh", _) => Command::Refresh,
            ("open", id) if !id.is_empty() => Command::Open(id.to_string()),
            ("threads", _) => Command::Threads,
            ("help", _) => Command::Help,
            ("quit", _) | ("exit", _) => Command::Quit,
            _ => Command::Unknown(line.to_string()),
        };
        Some(command)
    }
}

const HELP: &str = "\
/login <id-token>  log in
/logout            log out and forget local threads
/whoami            show the signed-in user
/sessions          list saved conversations
/new               start a saved conversation
/refresh           renew the access token
/open <id>         open a saved conversation
/threads           list conversations in this client
/quit              exit
anything else is sent to the current conversation";

/// Application state.
pub struct App {
    api: Arc<ApiClient>,
    threads: SharedThreads,
    dispatcher: QueryDispatcher,
    notices: UnboundedReceiver<Notice>,
    active_thread: String,
    user: Option<User>,
    should_quit: bool,
}

impl App {
    /// Create a new application instance.
    pub fn new(config: Config) -> Result<Self> {
        let tokens = Arc::new(TokenStore::open(&config.token_db_path()));
        let transport = ReqwestTransport::new(&config.api.base_url, config.api.timeout())
            .context("failed to build HTTP client")?;
        let api = Arc::new(ApiClient::new(Arc::new(transport), tokens));

        let threads = SharedThreads::new();
        let active_thread = threads.lock().new_local_thread().id.clone();
        let (tx, notices) = unbounded_channel();
        let dispatcher = QueryDispatcher::new(api.clone(), threads.clone(), tx, config.chat.preview_chars);

        Ok(Self {
            api,
            threads,
            dispatcher,
            notices,
            active_thread,
            user: None,
            should_quit: false,
        })
    }

    /// Run the application until the user quits or input ends.
    pub async fn run(&mut self, initial_session: Option<String>) -> Result<()> {
        self.load_initial_data(initial_session).await;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            self.flush_notices();
            prompt()?;

            let Some(line) = lines.next_line().await.context("failed to read input")? else {
                break;
            };
            if let Some(command) = Command::parse(&line) {
                self.handle(command).await;
            }

            if self.should_quit {
                break;
            }
        }

        Ok(())
    }

    /// Fetch the user and, when signed in, the session list and any
    /// requested session's history.
    async fn load_initial_data(&mut self, initial_session: Option<String>) {
        if !self.api.has_credential() {
            self.dispatcher.disable_sending();
            println!("Not logged in. Use /login <id-token>.");
            return;
        }

        match self.api.user_info().await {
            Ok(user) => {
                println!("Signed in as {}", user.email);
                self.user = Some(user);
            }
            Err(e) => {
                self.dispatcher.disable_sending();
                println!("Not logged in ({}). Use /login <id-token>.", e);
                return;
            }
        }

        match initial_session {
            Some(session_id) => {
                self.threads.lock().ensure_thread(&session_id);
                self.active_thread = session_id.clone();
                let (sessions, history) = tokio::join!(
                    self.api.list_sessions(),
                    self.api.session_history(&session_id)
                );
                self.dispatcher.observe(&history);
                self.apply_sessions(sessions);
                match history {
                    Ok(records) => {
                        self.threads.lock().hydrate_from_history(&session_id, &records);
                        self.print_active_thread();
                    }
                    Err(e) => eprintln!("Failed to load conversation {}: {}", session_id, e),
                }
            }
            None => {
                let sessions = self.api.list_sessions().await;
                self.apply_sessions(sessions);
            }
        }
    }

    fn apply_sessions(&mut self, sessions: Result<Vec<Session>, ApiError>) {
        self.dispatcher.observe(&sessions);
        match sessions {
            Ok(sessions) => {
                println!("{} saved conversations", sessions.len());
                self.threads.lock().record_sessions(sessions);
            }
            Err(e) => eprintln!("Failed to load conversations: {}", e),
        }
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Login(token) => self.login(&token).await,
            Command::Logout => self.logout(),
            Command::WhoAmI => match self.observed(self.api.user_info().await) {
                Ok(user) => {
                    match &user.profile_url {
                        Some(url) => println!("{} ({})", user.email, url),
                        None => println!("{}", user.email),
                    }
                    self.user = Some(user);
                }
                Err(e) => eprintln!("{}", e),
            },
            Command::Sessions => {
                let sessions = self.api.list_sessions().await;
                self.apply_sessions(sessions);
                self.print_sessions();
            }
            Command::New => self.new_session().await,
            Command::Refresh => match self.api.refresh().await {
                Ok(_) => {
                    self.dispatcher.enable_sending();
                    println!("Access token renewed");
                }
                Err(e) => {
                    self.dispatcher.disable_sending();
                    eprintln!("Could not renew access token: {}", e);
                }
            },
            Command::Open(id) => self.open(&id).await,
            Command::Threads => self.print_threads(),
            Command::Help => println!("{}", HELP),
            Command::Quit => self.should_quit = true,
            Command::Send(text) => self.send(&text).await,
            Command::Unknown(line) => eprintln!("Unknown command: {} (try /help)", line),
        }
    }

    async fn login(&mut self, id_token: &str) {
        match self.api.login(id_token).await {
            Ok(outcome) => {
                tracing::debug!("Received access token ({} bytes)", outcome.credential.len());
                self.dispatcher.enable_sending();
                self.user = match outcome.user {
                    Some(user) => Some(user),
                    None => self.observed(self.api.user_info().await).ok(),
                };
                if let Some(user) = &self.user {
                    println!("Signed in as {}", user.email);
                }
                let sessions = self.api.list_sessions().await;
                self.apply_sessions(sessions);
            }
            Err(e) => eprintln!("Login failed: {}", e),
        }
    }

    fn logout(&mut self) {
        self.api.logout();
        self.dispatcher.disable_sending();
        self.user = None;
        let mut threads = self.threads.lock();
        threads.clear();
        self.active_thread = threads.new_local_thread().id.clone();
        println!("Logged out");
    }

    async fn new_session(&mut self) {
        if self.user.is_none() {
            eprintln!("You need to Login first");
            return;
        }
        match self.observed(self.api.create_session().await) {
            Ok(session) => {
                let id = session.id.clone();
                let mut threads = self.threads.lock();
                threads.record_created_session(session);
                threads.ensure_thread(&id);
                println!("Started conversation {}", id);
                self.active_thread = id;
            }
            Err(e) => eprintln!("{}", e),
        }
    }

    async fn open(&mut self, session_id: &str) {
        self.threads.lock().ensure_thread(session_id);
        self.active_thread = session_id.to_string();

        match self.observed(self.api.session_history(session_id).await) {
            Ok(records) => {
                self.threads.lock().hydrate_from_history(session_id, &records);
            }
            Err(e) => eprintln!("Failed to load conversation: {}", e),
        }
        self.print_active_thread();
    }

    async fn send(&mut self, text: &str) {
        let pending = match self.dispatcher.start(text, &self.active_thread) {
            Ok(pending) => pending,
            Err(outcome) => {
                tracing::debug!("Nothing sent: {:?}", outcome);
                return;
            }
        };
        self.print_thread_message(&pending.thread_id, &pending.placeholder_id);

        let outcome = self.dispatcher.complete(pending).await;
        tracing::debug!("Query finished as {:?}", outcome.state());
        match outcome {
            DispatchOutcome::Fulfilled { thread_id, message_id } => {
                self.active_thread = thread_id;
                self.print_thread_message(&self.active_thread, &message_id);
            }
            DispatchOutcome::Failed {
                thread_id,
                message_id,
                error,
            } => {
                tracing::debug!("Placeholder {} failed: {}", message_id, error);
                self.active_thread = thread_id;
                self.print_thread_message(&self.active_thread, &message_id);
            }
            DispatchOutcome::Blocked | DispatchOutcome::Skipped => {}
        }
    }

    /// Pass an authorized call's result through, disabling sends if the
    /// session turned out to be gone.
    fn observed<T>(&self, result: Result<T, ApiError>) -> Result<T, ApiError> {
        self.dispatcher.observe(&result);
        result
    }

    fn print_thread_message(&self, thread_id: &str, message_id: &str) {
        let threads = self.threads.lock();
        if let Some(message) = threads.get(thread_id).and_then(|t| t.message(message_id)) {
            print_message(message);
        }
    }

    fn flush_notices(&mut self) {
        while let Ok(notice) = self.notices.try_recv() {
            match notice {
                Notice::Info(msg) => println!("[info] {}", msg),
                Notice::Error(msg) => eprintln!("[error] {}", msg),
            }
        }
    }

    fn print_sessions(&self) {
        let threads = self.threads.lock();
        for session in threads.sessions() {
            let marker = if session.id == self.active_thread { "*" } else { " " };
            println!("{} {:<12} {}", marker, session.id, session.created_display());
        }
    }

    fn print_threads(&self) {
        let threads = self.threads.lock();
        for thread in threads.threads() {
            let marker = if thread.id == self.active_thread { "*" } else { " " };
            let state = if thread.pending { " (unsaved)" } else { "" };
            println!(
                "{} {}{}  [{}] {}",
                marker,
                thread.id,
                state,
                thread.last_updated.format("%H:%M"),
                thread.preview
            );
        }
    }

    fn print_active_thread(&self) {
        let threads = self.threads.lock();
        if let Some(thread) = threads.get(&self.active_thread) {
            print_thread(thread);
        }
    }
}

fn print_thread(thread: &Thread) {
    println!("── {} ──", thread.title);
    for message in &thread.messages {
        print_message(message);
    }
}

fn print_message(message: &Message) {
    println!(
        "{} {:>9}: {}",
        message.timestamp.format("%H:%M"),
        message.role.as_str(),
        message.content
    );
}

fn prompt() -> Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "> ")?;
    stdout.flush()?;
    Ok(())
}
