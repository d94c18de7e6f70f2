/// Enum representing all available chat commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    New,
    List,
    /// 1-based index into the last listed conversations
    Open(usize),
    SignOut,
    Help,
    Quit,
    /// Slash command that did not parse; holds the usage to show
    Invalid(String),
}

impl Command {
    /// Parse a chat line. Returns `None` for plain messages.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if !line.starts_with('/') {
            return None;
        }

        let mut parts = line.split_whitespace();
        let name = parts.next().unwrap_or_default().to_lowercase();
        let arg = parts.next();

        let command = match name.as_str() {
            "/new" | "/clear" => Command::New,
            "/list" | "/ls" => Command::List,
            "/open" => match arg.and_then(|n| n.parse::<usize>().ok()) {
                Some(n) if n > 0 => Command::Open(n),
                _ => Command::Invalid("Usage: /open <number from /list>".to_string()),
            },
            "/signout" | "/logout" => Command::SignOut,
            "/help" | "/?" => Command::Help,
            "/quit" | "/exit" | "/q" => Command::Quit,
            other => Command::Invalid(format!("Unknown command: {}. Type /help", other)),
        };
        Some(command)
    }
}

/// Command names with their descriptions, for `/help`
pub static COMMANDS: &[(&str, &str)] = &[
    ("/new", "Start a new conversation"),
    ("/list", "List previous conversations"),
    ("/open <n>", "Open conversation n from the list"),
    ("/signout", "Sign out and return to the landing page"),
    ("/help", "Show this help"),
    ("/quit", "Exit"),
];
