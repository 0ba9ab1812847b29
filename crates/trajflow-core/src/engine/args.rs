//! Tokenized instructions.
//!
//! An [`ArgList`] is a whitespace-split instruction whose tokens are marked as they are
//! consumed. Handlers pull keyed arguments first, then positional ones, and finally warn
//! about whatever is left unmarked.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArgError {
    #[error("'{key}' requires a value")]
    MissingValue { key: String },
    #[error("Invalid number '{value}' for '{key}'")]
    InvalidNumber { key: String, value: String },
}

const MASK_START: &[char] = &[':', '@', '*', '!', '('];

#[derive(Debug, Clone, Default)]
pub struct ArgList {
    args: Vec<String>,
    marked: Vec<bool>,
}

impl ArgList {
    pub fn new(line: &str) -> Self {
        let args: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        let marked = vec![false; args.len()];
        Self { args, marked }
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// The first token, marked or not.
    pub fn command(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    /// True when the first token is `name`; marks it on a match.
    pub fn command_is(&mut self, name: &str) -> bool {
        if self.command() == Some(name) {
            self.marked[0] = true;
            true
        } else {
            false
        }
    }

    pub fn mark_command(&mut self) {
        if let Some(m) = self.marked.first_mut() {
            *m = true;
        }
    }

    fn unmarked_indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.args.len()).filter(|&i| !self.marked[i])
    }

    fn take(&mut self, index: usize) -> String {
        self.marked[index] = true;
        self.args[index].clone()
    }

    /// The next unmarked token.
    pub fn next_string(&mut self) -> Option<String> {
        let index = self.unmarked_indices().next()?;
        Some(self.take(index))
    }

    /// The next unmarked token that parses as an integer, or `default`. Other tokens are
    /// left untouched.
    pub fn next_integer(&mut self, default: i64) -> i64 {
        let found = self
            .unmarked_indices()
            .find_map(|i| self.args[i].parse::<i64>().ok().map(|v| (i, v)));
        match found {
            Some((index, value)) => {
                self.marked[index] = true;
                value
            }
            None => default,
        }
    }

    /// The next unmarked token that looks like an atom mask expression.
    pub fn next_mask(&mut self) -> Option<String> {
        let index = self
            .unmarked_indices()
            .find(|&i| self.args[i].starts_with(MASK_START))?;
        Some(self.take(index))
    }

    /// Consumes `key` and returns the token after it.
    pub fn key_string(&mut self, key: &str) -> Result<Option<String>, ArgError> {
        let Some(index) = self.unmarked_indices().find(|&i| self.args[i] == key) else {
            return Ok(None);
        };
        self.marked[index] = true;
        match self.args.get(index + 1) {
            Some(_) if !self.marked[index + 1] => Ok(Some(self.take(index + 1))),
            _ => Err(ArgError::MissingValue { key: key.to_string() }),
        }
    }

    fn key_number<T: FromStr>(&mut self, key: &str, default: T) -> Result<T, ArgError> {
        match self.key_string(key)? {
            None => Ok(default),
            Some(value) => value.parse().map_err(|_| ArgError::InvalidNumber {
                key: key.to_string(),
                value,
            }),
        }
    }

    pub fn key_integer(&mut self, key: &str, default: i64) -> Result<i64, ArgError> {
        self.key_number(key, default)
    }

    pub fn key_double(&mut self, key: &str, default: f64) -> Result<f64, ArgError> {
        self.key_number(key, default)
    }

    /// True when an unmarked `key` token is present; marks it.
    pub fn has_key(&mut self, key: &str) -> bool {
        let found = self.unmarked_indices().find(|&i| self.args[i] == key);
        match found {
            Some(index) => {
                self.marked[index] = true;
                true
            }
            None => false,
        }
    }

    /// Tokens nobody consumed.
    pub fn unmarked(&self) -> Vec<&str> {
        self.unmarked_indices().map(|i| self.args[i].as_str()).collect()
    }
}

impl fmt::Display for ArgList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.args.join(" "))
    }
}
