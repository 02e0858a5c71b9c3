//! Helpers for path expansion and log-safe invocation strings.

use std::ffi::OsString;

/// Placeholder logged instead of the identity file path.
pub const IDENTITY_PLACEHOLDER: &str = "<identity>";

/// Placeholder logged instead of a registered secret.
pub const SECRET_MASK: &str = "***";

/// Expands a leading `~/` prefix to the user's home directory.
///
/// When `HOME` is unset the input is returned unchanged.
///
/// # Examples
///
/// ```
/// # use podpilot::remote::expand_tilde;
/// let home = std::env::var("HOME").expect("HOME should be set");
/// assert_eq!(expand_tilde("~/.ssh/id_ed25519"), format!("{home}/.ssh/id_ed25519"));
/// assert_eq!(expand_tilde("/absolute/path"), "/absolute/path");
/// ```
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

/// Replaces every occurrence of each non-empty secret with [`SECRET_MASK`].
#[must_use]
pub fn mask_secrets(text: &str, secrets: &[String]) -> String {
    secrets
        .iter()
        .filter(|secret| !secret.is_empty())
        .fold(text.to_owned(), |masked, secret| {
            masked.replace(secret.as_str(), SECRET_MASK)
        })
}

/// Renders an invocation for logging with the identity path and secrets
/// hidden.
#[must_use]
pub fn describe_invocation(program: &str, args: &[OsString], secrets: &[String]) -> String {
    let mut parts = Vec::with_capacity(args.len() + 1);
    parts.push(program.to_owned());
    let mut hide_next = false;
    for arg in args {
        if hide_next {
            parts.push(IDENTITY_PLACEHOLDER.to_owned());
            hide_next = false;
            continue;
        }
        let text = arg.to_string_lossy();
        hide_next = text == "-i";
        parts.push(text.into_owned());
    }
    mask_secrets(&parts.join(" "), secrets)
}
