use core::fmt::{self, Display, Formatter};

/// One command line split into verb and arguments.
///
/// The untouched line is kept as well; AUTH payloads are base64 and have to
/// be passed on exactly as sent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
    /// Uppercased first word.
    pub verb: String,
    /// Everything after the first space, as sent.
    pub args: String,
    pub orig: String,
}

impl Command {
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let (verb, args) = line.split_once(' ').unwrap_or((line, ""));

        Self {
            verb: verb.to_ascii_uppercase(),
            args: args.to_string(),
            orig: line.to_string(),
        }
    }
}

impl Display for Command {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            fmt.write_str(&self.verb)
        } else {
            write!(fmt, "{} {}", self.verb, self.args)
        }
    }
}
