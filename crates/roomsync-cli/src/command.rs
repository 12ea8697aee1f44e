//! Input line parsing.

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send the line as a message.
    Say(String),
    /// Show one more page of older messages.
    More,
    /// Re-fetch the room history.
    Refresh,
    /// Print the current page and status.
    Show,
    /// Leave the room.
    Leave,
    /// Leave and join another room.
    Join(String),
    /// Log out and exit.
    Logout,
    /// Exit.
    Quit,
    /// Print the command list.
    Help,
    /// Unrecognized slash command.
    Unknown(String),
}

impl Command {
    /// Parse a line. Blank lines parse to `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return None;
        }

        let Some(rest) = line.trim_start().strip_prefix('/') else {
            return Some(Self::Say(line.to_string()));
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        let command = match name {
            "more" => Self::More,
            "refresh" => Self::Refresh,
            "show" => Self::Show,
            "leave" => Self::Leave,
            "join" if !arg.is_empty() => Self::Join(arg.to_string()),
            "logout" => Self::Logout,
            "quit" | "exit" => Self::Quit,
            "help" => Self::Help,
            // "//text" sends "/text"
            _ if rest.starts_with('/') => Self::Say(rest.to_string()),
            _ => Self::Unknown(name.to_string()),
        };
        Some(command)
    }
}

/// Help text listing every command.
pub const HELP: &str = "\
commands:
  /more            show older messages
  /refresh         re-fetch the room
  /show            print the current page
  /join <room>     switch rooms
  /leave           leave the room
  /logout          log out and exit
  /quit            exit
  //text           send a message starting with '/'";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_sent_verbatim() {
        assert_eq!(Command::parse("  hello there \n"), Some(Command::Say("  hello there ".into())));
    }

    #[test]
    fn blank_lines_are_ignored() {
        assert_eq!(Command::parse("   \r\n"), None);
    }

    #[test]
    fn slash_commands() {
        assert_eq!(Command::parse("/more"), Some(Command::More));
        assert_eq!(Command::parse("/join  random "), Some(Command::Join("random".into())));
        assert_eq!(Command::parse("/join"), Some(Command::Unknown("join".into())));
        assert_eq!(Command::parse("/exit"), Some(Command::Quit));
        assert_eq!(Command::parse("/dance"), Some(Command::Unknown("dance".into())));
    }

    #[test]
    fn double_slash_escapes() {
        assert_eq!(Command::parse("//shrug"), Some(Command::Say("/shrug".into())));
    }
}
