/// One line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Anything not starting with `:` replaces the search box.
    Input(String),
    Page(u32),
    Next,
    Prev,
    Photo(String),
    Stats,
    Clear,
    Help,
    Quit,
    Unknown(String),
}

pub fn parse(line: &str) -> Command {
    let Some(command) = line.trim_start().strip_prefix(':') else {
        return Command::Input(line.to_string());
    };

    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.next();
    match (name, arg) {
        ("page", Some(page)) => page
            .parse()
            .map(Command::Page)
            .unwrap_or_else(|_| Command::Unknown(line.trim().to_string())),
        ("next", None) => Command::Next,
        ("prev", None) => Command::Prev,
        ("photo", Some(id)) => Command::Photo(id.to_string()),
        ("stats", None) => Command::Stats,
        ("clear", None) => Command::Clear,
        ("help", None) => Command::Help,
        ("quit" | "q", None) => Command::Quit,
        _ => Command::Unknown(line.trim().to_string()),
    }
}

pub const HELP: &str = "\
Type to search (at least 3 characters), or:
  :page N     jump to page N
  :next       next page
  :prev       previous page
  :photo ID   show one photo
  :stats      persisted cache statistics
  :clear      clear the cache
  :quit       exit";
