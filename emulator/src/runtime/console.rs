//! The I/O port of the computer.
//!
//! Instructions only know they need a number or a line of text. Where it comes
//! from is up to the [`Console`] implementation.

use std::io::{BufRead, Write};
use std::sync::Arc;

use thiserror::Error;

use crate::constants::Word;

#[derive(Debug, Error, Clone)]
pub enum IoError {
    #[error("end of input")]
    EndOfInput,

    #[error("invalid number {0:?}")]
    InvalidNumber(String),

    #[error("invalid character code {0:#x}")]
    InvalidCharacter(Word),

    #[error("i/o error: {0}")]
    Transport(#[source] Arc<std::io::Error>),
}

impl From<std::io::Error> for IoError {
    fn from(e: std::io::Error) -> Self {
        Self::Transport(Arc::new(e))
    }
}

pub trait Console {
    /// Read the next number from the input
    ///
    /// # Errors
    ///
    /// Fails on malformed or exhausted input.
    fn read_number(&mut self) -> Result<f64, IoError>;

    /// Read a line of text, without its line terminator
    ///
    /// # Errors
    ///
    /// Fails on exhausted input.
    fn read_line(&mut self) -> Result<String, IoError>;

    /// # Errors
    ///
    /// Fails if the output can't be written to.
    fn write_number(&mut self, value: f64) -> Result<(), IoError>;

    /// # Errors
    ///
    /// Fails if the output can't be written to.
    fn write_str(&mut self, text: &str) -> Result<(), IoError>;
}

/// A [`Console`] over a pair of byte streams.
///
/// Numbers are whitespace-separated tokens and may be spread over multiple
/// lines. A line read after a number picks up the rest of its line, if
/// anything is left on it.
#[derive(Debug)]
pub struct Terminal<R, W> {
    input: R,
    output: W,
    line: String,
    cursor: usize,
}

impl<R: BufRead, W: Write> Terminal<R, W> {
    #[must_use]
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            line: String::new(),
            cursor: 0,
        }
    }

    /// Get the output stream back
    #[must_use]
    pub fn into_output(self) -> W {
        self.output
    }

    fn rest(&self) -> &str {
        &self.line[self.cursor..]
    }

    /// Fetch the next input line. Returns `false` at the end of the input.
    fn fill(&mut self) -> Result<bool, IoError> {
        self.line.clear();
        self.cursor = 0;
        let read = self.input.read_line(&mut self.line)?;
        Ok(read > 0)
    }
}

impl<R: BufRead, W: Write> Console for Terminal<R, W> {
    fn read_number(&mut self) -> Result<f64, IoError> {
        loop {
            let rest = self.rest();
            let token = rest.trim_start();
            if token.is_empty() {
                if !self.fill()? {
                    return Err(IoError::EndOfInput);
                }
                continue;
            }

            let skipped = rest.len() - token.len();
            let len = token.find(char::is_whitespace).unwrap_or(token.len());
            let token = token[..len].to_owned();
            self.cursor += skipped + len;

            return token.parse().map_err(|_| IoError::InvalidNumber(token));
        }
    }

    fn read_line(&mut self) -> Result<String, IoError> {
        if self.rest().trim().is_empty() && !self.fill()? {
            return Err(IoError::EndOfInput);
        }

        let mut rest = self.rest();
        if self.cursor > 0 {
            // Separator left behind by a number read
            rest = rest.trim_start_matches([' ', '\t']);
        }

        let line = rest.trim_end_matches(['\n', '\r']).to_owned();
        self.cursor = self.line.len();
        Ok(line)
    }

    fn write_number(&mut self, value: f64) -> Result<(), IoError> {
        writeln!(self.output, "{value:?}")?;
        self.output.flush()?;
        Ok(())
    }

    fn write_str(&mut self, text: &str) -> Result<(), IoError> {
        self.output.write_all(text.as_bytes())?;
        self.output.flush()?;
        Ok(())
    }
}
