//! Chat command table and parsing
//!
//! The command set is fixed at compile time. `/help` is rendered from the
//! same table the dispatcher looks names up in.

/// A recognised chat command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Join,
    Leave,
    Users,
    Room,
    Rooms,
    Nick,
    Whoami,
    Help,
    Quit,
}

/// One entry of the command table
#[derive(Debug)]
pub struct CommandSpec {
    pub name: &'static str,
    pub command: Command,
    pub usage: &'static str,
    pub summary: &'static str,
}

pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "help",
        command: Command::Help,
        usage: "/help",
        summary: "list available commands",
    },
    CommandSpec {
        name: "join",
        command: Command::Join,
        usage: "/join <room>",
        summary: "switch to a room, creating it if needed",
    },
    CommandSpec {
        name: "leave",
        command: Command::Leave,
        usage: "/leave",
        summary: "leave the current room",
    },
    CommandSpec {
        name: "nick",
        command: Command::Nick,
        usage: "/nick",
        summary: "show your username",
    },
    CommandSpec {
        name: "quit",
        command: Command::Quit,
        usage: "/quit",
        summary: "leave the room and disconnect",
    },
    CommandSpec {
        name: "room",
        command: Command::Room,
        usage: "/room",
        summary: "show which room you are in",
    },
    CommandSpec {
        name: "rooms",
        command: Command::Rooms,
        usage: "/rooms",
        summary: "list rooms with people in them",
    },
    CommandSpec {
        name: "users",
        command: Command::Users,
        usage: "/users",
        summary: "list members of the current room",
    },
    CommandSpec {
        name: "whoami",
        command: Command::Whoami,
        usage: "/whoami",
        summary: "show your username",
    },
];

impl Command {
    /// Look up a command by its already-normalised name
    pub fn lookup(name: &str) -> Option<Command> {
        COMMANDS
            .iter()
            .find(|spec| spec.name == name)
            .map(|spec| spec.command)
    }
}

/// Split a `/command args` line into a lower-cased command name and the
/// trimmed remainder. Returns None for lines that are not commands.
pub fn parse(line: &str) -> Option<(String, &str)> {
    let line = line.trim();
    if !line.starts_with('/') {
        return None;
    }
    let (head, args) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let name = head.trim_start_matches('/').to_lowercase();
    Some((name, args.trim()))
}

/// The `/help` listing
pub fn help_text() -> String {
    let mut lines = vec!["Available commands:".to_string()];
    lines.extend(
        COMMANDS
            .iter()
            .map(|spec| format!(" * {} - {}", spec.usage, spec.summary)),
    );
    lines.join("\n")
}
