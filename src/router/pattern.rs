//! Path pattern compilation.
//!
//! | Pattern piece | Matches |
//! |---|---|
//! | literal text | itself, exactly |
//! | `:name` | one non-empty run of non-`/` characters, captured as `name` |
//! | `*` | anything, including `/` and nothing at all |
//!
//! A parameter name runs from the `:` up to the next `/`. A `:` with no name
//! after it is literal.

use regex::Regex;

/// A compiled route pattern.
#[derive(Debug)]
pub(crate) struct Pattern {
    regex: Regex,
    /// Positionally aligned with the regex capture groups.
    param_names: Vec<String>,
}

impl Pattern {
    pub(crate) fn compile(path: &str) -> Result<Self, regex::Error> {
        let mut source = String::with_capacity(path.len() + 8);
        let mut param_names = Vec::new();
        source.push('^');

        let mut rest = path;
        while let Some(c) = rest.chars().next() {
            match c {
                ':' => {
                    let name_len = rest[1..].find('/').unwrap_or(rest.len() - 1);
                    if name_len == 0 {
                        source.push_str(&regex::escape(":"));
                        rest = &rest[1..];
                        continue;
                    }
                    param_names.push(rest[1..=name_len].to_owned());
                    source.push_str("([^/]+)");
                    rest = &rest[1 + name_len..];
                }
                '*' => {
                    source.push_str(".*");
                    rest = &rest[1..];
                }
                _ => {
                    let literal_len = rest.find([':', '*']).unwrap_or(rest.len());
                    source.push_str(&regex::escape(&rest[..literal_len]));
                    rest = &rest[literal_len..];
                }
            }
        }

        source.push('$');
        Ok(Self { regex: Regex::new(&source)?, param_names })
    }

    pub(crate) fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// Matches `path`, returning `(name, value)` pairs in declaration order.
    pub(crate) fn captures(&self, path: &str) -> Option<Vec<(String, String)>> {
        let caps = self.regex.captures(path)?;
        let params = self.param_names.iter()
            .zip(caps.iter().skip(1))
            .map(|(name, value)| {
                let value = value.map_or("", |m| m.as_str());
                (name.clone(), value.to_owned())
            })
            .collect();
        Some(params)
    }
}
