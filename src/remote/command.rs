//! Structured construction of remote shell command lines.
//!
//! Every operand that is not a trusted literal goes through [`quote`], so
//! paths, URLs and patterns with spaces or metacharacters reach the remote
//! shell as single words.

use std::fmt;

use shell_escape::unix::escape;

/// Quotes `value` as a single POSIX shell word.
///
/// # Examples
///
/// ```
/// # use podpilot::remote::quote;
/// assert_eq!(quote("plain"), "plain");
/// assert_eq!(quote("two words"), "'two words'");
/// assert_eq!(quote("it's"), "'it'\\''s'");
/// ```
#[must_use]
pub fn quote(value: &str) -> String {
    escape(value.into()).into_owned()
}

/// A remote shell command line built from quoted operands.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ShellCommand {
    line: String,
}

impl ShellCommand {
    /// Starts a command with `program` as its first word.
    #[must_use]
    pub fn new(program: &str) -> Self {
        Self {
            line: quote(program),
        }
    }

    /// Wraps a trusted, pre-composed fragment without quoting it.
    ///
    /// Only literals owned by this crate belong here; operator input must go
    /// through [`ShellCommand::arg`].
    #[must_use]
    pub fn raw(fragment: &str) -> Self {
        Self {
            line: fragment.to_owned(),
        }
    }

    /// Appends a quoted operand.
    #[must_use]
    pub fn arg(mut self, value: impl AsRef<str>) -> Self {
        self.line.push(' ');
        self.line.push_str(&quote(value.as_ref()));
        self
    }

    /// Appends several quoted operands.
    #[must_use]
    pub fn args<I, A>(self, values: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<str>,
    {
        values.into_iter().fold(self, Self::arg)
    }

    /// Appends a literal option such as `-c` or `--progress=bar:force`.
    #[must_use]
    pub fn flag(mut self, flag: &str) -> Self {
        self.line.push(' ');
        self.line.push_str(flag);
        self
    }

    /// Runs `next` only when this command succeeds.
    #[must_use]
    pub fn and_then(self, next: Self) -> Self {
        self.join(" && ", &next)
    }

    /// Runs `next` only when this command fails.
    #[must_use]
    pub fn or_else(self, next: Self) -> Self {
        self.join(" || ", &next)
    }

    /// Runs `next` after this command whatever its outcome.
    #[must_use]
    pub fn then(self, next: Self) -> Self {
        self.join("; ", &next)
    }

    /// Pipes this command's stdout into `next`.
    #[must_use]
    pub fn pipe(self, next: Self) -> Self {
        self.join(" | ", &next)
    }

    /// Reads stdin from `path`.
    #[must_use]
    pub fn stdin_from(self, path: &str) -> Self {
        self.flag("<").arg(path)
    }

    /// Sends stdout and stderr to `path`, truncating it.
    #[must_use]
    pub fn redirect_all_to(self, path: &str) -> Self {
        self.flag(">").arg(path).flag("2>&1")
    }

    /// Discards stderr.
    #[must_use]
    pub fn quiet_errors(self) -> Self {
        self.flag("2>/dev/null")
    }

    /// Detaches the command from the invoking shell.
    #[must_use]
    pub fn background(self) -> Self {
        self.flag("&")
    }

    /// Returns the rendered command line.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.line
    }

    fn join(mut self, operator: &str, next: &Self) -> Self {
        self.line.push_str(operator);
        self.line.push_str(&next.line);
        self
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}
