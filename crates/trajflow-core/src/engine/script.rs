//! Input script reading.
//!
//! One instruction per line. A `\` continues the instruction on the next line and drops the
//! rest of its own line; a token starting with `#` comments out the rest of the line; runs of
//! whitespace collapse to one separator. `go` or the end of input starts the run, and `quit`
//! on interactive input abandons it.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Could not open input file '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to read input at line {line}: {source}")]
    Read {
        line: usize,
        #[source]
        source: io::Error,
    },
    #[error("Input line {line} is longer than {max} characters")]
    LineTooLong { line: usize, max: usize },
    #[error("Reading from standard input is not allowed with {size} ranks; use an input file")]
    InteractiveParallel { size: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptEvent {
    /// A complete instruction, whitespace-normalized.
    Instruction(String),
    /// Input is finished; run.
    Go,
    /// Interactive input asked to stop without running.
    Quit,
}

/// One physical line after comment and continuation handling.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ScannedLine<'a> {
    pub tokens: Vec<&'a str>,
    pub continues: bool,
}

pub(crate) fn scan_line(line: &str) -> ScannedLine<'_> {
    let mut tokens = Vec::new();
    for token in line.split_whitespace() {
        if token.starts_with('#') {
            break;
        }
        if let Some(pos) = token.find('\\') {
            if pos > 0 {
                tokens.push(&token[..pos]);
            }
            return ScannedLine {
                tokens,
                continues: true,
            };
        }
        tokens.push(token);
    }
    ScannedLine {
        tokens,
        continues: false,
    }
}

pub struct ScriptReader<R> {
    reader: R,
    interactive: bool,
    max_line_length: usize,
    line_number: usize,
    finished: bool,
}

impl ScriptReader<BufReader<File>> {
    pub fn open(path: &Path, max_line_length: usize) -> Result<Self, ScriptError> {
        let file = File::open(path).map_err(|source| ScriptError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(BufReader::new(file), max_line_length))
    }
}

impl<R: BufRead> ScriptReader<R> {
    pub fn new(reader: R, max_line_length: usize) -> Self {
        Self {
            reader,
            interactive: false,
            max_line_length,
            line_number: 0,
            finished: false,
        }
    }

    /// Treats the source as a terminal, which makes `quit` meaningful.
    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    pub fn line_number(&self) -> usize {
        self.line_number
    }

    pub fn next_event(&mut self) -> Result<ScriptEvent, ScriptError> {
        if self.finished {
            return Ok(ScriptEvent::Go);
        }
        let mut pending: Vec<String> = Vec::new();
        let mut buf = String::new();
        loop {
            buf.clear();
            let n = self
                .reader
                .read_line(&mut buf)
                .map_err(|source| ScriptError::Read {
                    line: self.line_number + 1,
                    source,
                })?;
            if n == 0 {
                return Ok(self.complete(pending));
            }
            self.line_number += 1;
            let text = buf.trim_end_matches(['\n', '\r']);
            if text.len() > self.max_line_length {
                return Err(self.too_long());
            }

            let scanned = scan_line(text);
            pending.extend(scanned.tokens.into_iter().map(str::to_string));
            let joined_len = pending.iter().map(|t| t.len() + 1).sum::<usize>();
            if joined_len > self.max_line_length + 1 {
                return Err(self.too_long());
            }
            if scanned.continues || pending.is_empty() {
                continue;
            }
            return Ok(self.complete(pending));
        }
    }

    fn complete(&mut self, tokens: Vec<String>) -> ScriptEvent {
        match tokens.first().map(String::as_str) {
            None => {
                self.finished = true;
                ScriptEvent::Go
            }
            Some("go") => {
                self.finished = true;
                ScriptEvent::Go
            }
            Some("quit") if self.interactive => {
                self.finished = true;
                ScriptEvent::Quit
            }
            Some(_) => ScriptEvent::Instruction(tokens.join(" ")),
        }
    }

    fn too_long(&self) -> ScriptError {
        ScriptError::LineTooLong {
            line: self.line_number,
            max: self.max_line_length,
        }
    }
}
