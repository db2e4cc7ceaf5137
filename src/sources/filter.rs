use regex::Regex;

use crate::error::ConfigError;

#[derive(Debug, Clone)]
enum Matcher {
    Exact(String),
    Pattern(Regex),
}

/// Allow-list of device or interface names. Entries match exactly, or as a
/// regular expression when prefixed with `~`. An empty list allows every name.
#[derive(Debug, Clone, Default)]
pub struct NameFilter {
    matchers: Vec<Matcher>,
}

impl NameFilter {
    pub fn new<I, S>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut matchers = Vec::new();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            match entry.strip_prefix('~') {
                Some(pattern) => {
                    let regex = Regex::new(pattern).map_err(|source| ConfigError::Pattern {
                        pattern: pattern.to_string(),
                        source,
                    })?;
                    matchers.push(Matcher::Pattern(regex));
                }
                None => matchers.push(Matcher::Exact(entry.to_string())),
            }
        }
        Ok(NameFilter { matchers })
    }

    pub fn allows(&self, name: &str) -> bool {
        self.matchers.is_empty()
            || self.matchers.iter().any(|matcher| match matcher {
                Matcher::Exact(exact) => exact == name,
                Matcher::Pattern(regex) => regex.is_match(name),
            })
    }
}
