//! Operator terminal seam used for prompts and progress lines.

use std::io::{self, BufRead, Write};

/// Line-oriented access to the operator's terminal.
pub trait Console {
    /// Prints one line for the operator.
    fn show(&self, line: &str);

    /// Prints `prompt` and reads one trimmed line. Returns `None` once input
    /// is exhausted.
    fn ask(&self, prompt: &str) -> Option<String>;
}

/// Console backed by the process's stdin and stdout.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdConsole;

impl Console for StdConsole {
    fn show(&self, line: &str) {
        writeln!(io::stdout(), "{line}").ok();
    }

    fn ask(&self, prompt: &str) -> Option<String> {
        let mut stdout = io::stdout().lock();
        write!(stdout, "{prompt}").ok();
        stdout.flush().ok();

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(answer.trim().to_owned()),
        }
    }
}
