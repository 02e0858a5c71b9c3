//! Sorts model download URLs into destination folders and builds the remote
//! fetch command for each.
//!
//! A category wins when its name is a whole path segment of the URL; failing
//! that, when it appears anywhere in the URL. In both passes longer names are
//! tried first, so `clip_vision` beats `clip`. Anything left over is offered
//! to the operator.

use tracing::debug;

use crate::catalog::RemoteLayout;
use crate::console::Console;
use crate::remote::ShellCommand;

/// A URL paired with its destination folder.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClassifiedUrl {
    /// Download URL as given by the operator.
    pub url: String,
    /// Destination folder name under the models directory.
    pub category: String,
}

/// Result of [`Classifier::classify`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Classification {
    /// URLs matched automatically, in input order.
    pub auto: Vec<ClassifiedUrl>,
    /// URLs that need an operator decision, in input order.
    pub manual: Vec<String>,
}

/// Classifies URLs against a fixed, ordered set of category folders.
#[derive(Clone, Debug)]
pub struct Classifier {
    categories: Vec<String>,
    by_length: Vec<String>,
}

impl Classifier {
    /// Creates a classifier over `categories`, kept in the given order for
    /// display.
    #[must_use]
    pub fn new<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ordered: Vec<String> = categories
            .into_iter()
            .map(|category| category.into().to_lowercase())
            .collect();
        let mut by_length = ordered.clone();
        by_length.sort_by(|left, right| right.len().cmp(&left.len()));
        Self {
            categories: ordered,
            by_length,
        }
    }

    /// Returns the categories in display order.
    #[must_use]
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Returns the category for `url`, if any matches.
    #[must_use]
    pub fn category_for(&self, url: &str) -> Option<&str> {
        let lowered = url.to_lowercase();
        let segments: Vec<&str> = lowered.split('/').collect();
        self.by_length
            .iter()
            .find(|category| segments.contains(&category.as_str()))
            .or_else(|| {
                self.by_length
                    .iter()
                    .find(|category| lowered.contains(category.as_str()))
            })
            .map(String::as_str)
    }

    /// Splits `urls` into automatic matches and URLs needing review.
    #[must_use]
    pub fn classify<I, S>(&self, urls: I) -> Classification
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut result = Classification::default();
        for url in urls {
            let text = url.as_ref();
            let Some(category) = self.category_for(text) else {
                result.manual.push(text.to_owned());
                continue;
            };
            debug!(url = text, category, "classified");
            result.auto.push(ClassifiedUrl {
                url: text.to_owned(),
                category: category.to_owned(),
            });
        }
        result
    }

    /// Asks the operator to place each URL in `manual`.
    ///
    /// Each prompt lists the categories 1-indexed plus `[0] Skip`. A
    /// non-number or `0` skips the URL; a number past the end selects the
    /// last category.
    pub fn review_manual<C: Console>(&self, console: &C, manual: &[String]) -> Vec<ClassifiedUrl> {
        let mut placed = Vec::new();
        for url in manual {
            console.show(&format!("Unrecognised: {}", file_name(url).unwrap_or(url)));
            for (index, category) in self.categories.iter().enumerate() {
                console.show(&format!("  [{}] {category}", index + 1));
            }
            console.show("  [0] Skip");

            let answer = console.ask("Category [0]: ").unwrap_or_default();
            let Some(category) = self.pick(&answer) else {
                console.show("Skipped.");
                continue;
            };
            placed.push(ClassifiedUrl {
                url: url.clone(),
                category: category.to_owned(),
            });
        }
        placed
    }

    fn pick(&self, answer: &str) -> Option<&str> {
        let number = answer.trim().parse::<usize>().ok()?;
        let index = number.checked_sub(1)?;
        self.categories
            .get(index)
            .or_else(|| self.categories.last())
            .map(String::as_str)
    }
}

/// Extracts URLs from free-form operator input separated by whitespace or
/// commas.
#[must_use]
pub fn extract_urls(raw: &str) -> Vec<String> {
    raw.split(|ch: char| ch.is_whitespace() || ch == ',')
        .filter(|token| token.starts_with("http"))
        .map(str::to_owned)
        .collect()
}

/// Returns the last path segment of `url` without query or fragment.
#[must_use]
pub fn file_name(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().filter(|name| !name.is_empty())
}

/// Builds the resumable download command for `url` into `category`.
#[must_use]
pub fn download_command(layout: &RemoteLayout, category: &str, url: &str) -> ShellCommand {
    let destination = layout.model_dir(category);
    ShellCommand::new("mkdir")
        .flag("-p")
        .arg(&destination)
        .and_then(ShellCommand::new("cd").arg(&destination))
        .and_then(
            ShellCommand::new("wget")
                .flag("-c")
                .flag("--show-progress")
                .flag("--progress=bar:force:noscroll")
                .flag("--content-disposition")
                .arg(url),
        )
}

#[cfg(test)]
mod tests;
