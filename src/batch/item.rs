//! Work items for a batch job.

use serde::{Deserialize, Serialize};

/// One unit of work: a single outbound fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    /// Caller-chosen identifier, used to group responses
    pub id: String,
    /// URL to fetch
    pub url: String,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }

    /// Parse one line of an input list.
    ///
    /// Lines are either `url` or `id url`. Blank lines and `#` comments
    /// yield `None`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        match line.split_once(char::is_whitespace) {
            Some((id, url)) => Some(Self::new(id, url.trim())),
            None => Some(Self::new(line, line)),
        }
    }

    /// Parse a whole input list.
    pub fn parse_list(input: &str) -> Vec<Self> {
        input.lines().filter_map(Self::parse_line).collect()
    }
}

impl std::fmt::Display for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.id == self.url {
            write!(f, "{}", self.url)
        } else {
            write!(f, "{}={}", self.id, self.url)
        }
    }
}
