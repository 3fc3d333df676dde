//! Bot command routing.

/// A command this bot answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    /// `/run <script>`. `script` may be empty.
    Run { script: String },
}

/// Commands shown in the client's command menu.
pub const COMMAND_MENU: [(&str, &str); 2] = [
    ("start", "Show the welcome message"),
    ("run", "Run a Rhai script"),
];

/// Parse `text` as a command for this bot.
///
/// `/run@name` is accepted only when `name` matches `bot_username`. The
/// script is everything after the whitespace following the command word,
/// kept verbatim apart from the leading whitespace.
#[must_use]
pub fn parse_command(text: &str, bot_username: Option<&str>) -> Option<Command> {
    let body = text.strip_prefix('/')?;
    let (word, rest) = match body.find(char::is_whitespace) {
        Some(idx) => (&body[..idx], &body[idx..]),
        None => (body, ""),
    };

    let (name, target) = match word.split_once('@') {
        Some((name, target)) => (name, Some(target)),
        None => (word, None),
    };
    if let (Some(target), Some(username)) = (target, bot_username)
        && !target.eq_ignore_ascii_case(username)
    {
        return None;
    }

    match name.to_ascii_lowercase().as_str() {
        "start" => Some(Command::Start),
        "run" => Some(Command::Run {
            script: rest.trim_start().to_string(),
        }),
        _ => None,
    }
}
