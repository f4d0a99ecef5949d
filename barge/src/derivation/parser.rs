//! Parser for the textual derivation format.
//!
//! The format is regular enough for a single-pass predictive parser:
//! every construct is announced by its first character. The only
//! deviation is the quoted store path, which is read as a string first
//! and then reparsed as a path.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use displaydoc::Display;

use super::{Derivation, DerivationOutput};
use crate::hash::FileHash;
use crate::nix_store::{FullStorePath, StorePath};

/// A derivation parse error.
#[derive(Debug, Display)]
pub enum ParseError {
    /// Unexpected end of input at byte {0}
    UnexpectedEof(usize),

    /// At byte {pos}: expected {expected}, got {got:?}
    Expected {
        pos: usize,
        expected: String,
        got: String,
    },

    /// Derivation has no outputs
    NoOutputs,

    /// Duplicate output name {0:?}
    DuplicateOutput(String),

    /// At byte {pos}: {text:?} is not a store path: {reason}
    BadQuotedStorePath {
        pos: usize,
        text: String,
        reason: String,
    },

    /// At byte {pos}: unsupported fixed-output hash algorithm {algorithm:?}
    UnknownHashAlgorithm { pos: usize, algorithm: String },

    /// At byte {pos}: fixed-output hash body without an algorithm
    HashWithoutAlgorithm { pos: usize },

    /// At byte {pos}: invalid fixed-output hash: {reason}
    BadOutputHash { pos: usize, reason: String },
}

impl std::error::Error for ParseError {}

pub(super) fn parse(input: &str) -> Result<Derivation, ParseError> {
    let mut p = Parser::new(input);

    p.expect_str("Derive(")?;

    let outputs = p.parse_outputs()?;
    p.expect_char(',')?;
    let input_derivations = p.parse_input_derivations()?;
    p.expect_char(',')?;
    let input_sources = p.parse_input_sources()?;
    p.expect_char(',')?;
    let system = p.parse_string()?;
    p.expect_char(',')?;
    let builder = PathBuf::from(p.parse_string()?);
    p.expect_char(',')?;
    let args = p.parse_string_list()?;
    p.expect_char(',')?;
    let env = p.parse_env()?;
    p.expect_char(')')?;
    p.expect_eof()?;

    Ok(Derivation {
        outputs,
        input_derivations,
        input_sources,
        system,
        builder,
        args,
        env,
    })
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Result<char, ParseError> {
        self.remaining()
            .chars()
            .next()
            .ok_or(ParseError::UnexpectedEof(self.pos))
    }

    fn advance(&mut self, n: usize) {
        self.pos += n;
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        let got = self.peek()?;
        if got == expected {
            self.advance(expected.len_utf8());
            Ok(())
        } else {
            Err(ParseError::Expected {
                pos: self.pos,
                expected: format!("'{}'", expected),
                got: got.to_string(),
            })
        }
    }

    fn expect_str(&mut self, expected: &str) -> Result<(), ParseError> {
        if self.remaining().starts_with(expected) {
            self.advance(expected.len());
            Ok(())
        } else {
            let got_len = expected.len().min(self.remaining().len());
            Err(ParseError::Expected {
                pos: self.pos,
                expected: format!("{:?}", expected),
                got: self.remaining()[..got_len].to_string(),
            })
        }
    }

    fn expect_eof(&mut self) -> Result<(), ParseError> {
        let rest = self.remaining().trim_end_matches(['\r', '\n']);
        if rest.is_empty() {
            Ok(())
        } else {
            Err(ParseError::Expected {
                pos: self.pos,
                expected: "end of input".to_string(),
                got: rest.chars().take(16).collect(),
            })
        }
    }

    fn parse_string(&mut self) -> Result<String, ParseError> {
        self.expect_char('"')?;
        let mut result = String::new();
        loop {
            let c = self.peek()?;
            self.advance(c.len_utf8());
            match c {
                '"' => return Ok(result),
                '\\' => {
                    let escaped = self.peek()?;
                    self.advance(escaped.len_utf8());
                    match escaped {
                        'n' => result.push('\n'),
                        'r' => result.push('\r'),
                        't' => result.push('\t'),
                        'b' => result.push('\u{8}'),
                        other => result.push(other),
                    }
                }
                other => result.push(other),
            }
        }
    }

    fn parse_list<T>(
        &mut self,
        mut parse_item: impl FnMut(&mut Self) -> Result<T, ParseError>,
    ) -> Result<Vec<T>, ParseError> {
        self.expect_char('[')?;
        let mut result = Vec::new();
        if self.peek()? == ']' {
            self.advance(1);
            return Ok(result);
        }
        loop {
            result.push(parse_item(self)?);
            match self.peek()? {
                ',' => self.advance(1),
                ']' => {
                    self.advance(1);
                    return Ok(result);
                }
                c => {
                    return Err(ParseError::Expected {
                        pos: self.pos,
                        expected: "',' or ']'".to_string(),
                        got: c.to_string(),
                    });
                }
            }
        }
    }

    fn parse_string_list(&mut self) -> Result<Vec<String>, ParseError> {
        self.parse_list(|p| p.parse_string())
    }

    /// Parses a quoted full store path, keeping only the base name.
    fn parse_quoted_store_path(&mut self) -> Result<StorePath, ParseError> {
        let pos = self.pos;
        let text = self.parse_string()?;

        FullStorePath::parse(Path::new(&text))
            .map(FullStorePath::into_path)
            .map_err(|e| ParseError::BadQuotedStorePath {
                pos,
                text,
                reason: e.to_string(),
            })
    }

    fn parse_outputs(&mut self) -> Result<BTreeMap<String, DerivationOutput>, ParseError> {
        let items = self.parse_list(|p| {
            p.expect_char('(')?;
            let name = p.parse_string()?;
            p.expect_char(',')?;
            let path = p.parse_quoted_store_path()?;
            p.expect_char(',')?;
            let algorithm_pos = p.pos;
            let algorithm = p.parse_string()?;
            p.expect_char(',')?;
            let body_pos = p.pos;
            let body = p.parse_string()?;
            p.expect_char(')')?;

            let hash = if algorithm.is_empty() {
                if !body.is_empty() {
                    return Err(ParseError::HashWithoutAlgorithm { pos: body_pos });
                }
                None
            } else if algorithm != "sha256" {
                return Err(ParseError::UnknownHashAlgorithm {
                    pos: algorithm_pos,
                    algorithm,
                });
            } else {
                let hash = FileHash::from_parts(&algorithm, &body).map_err(|e| {
                    ParseError::BadOutputHash {
                        pos: body_pos,
                        reason: e.to_string(),
                    }
                })?;
                Some(hash)
            };

            Ok((name, DerivationOutput { path, hash }))
        })?;

        if items.is_empty() {
            return Err(ParseError::NoOutputs);
        }

        let mut outputs = BTreeMap::new();
        for (name, output) in items {
            if outputs.insert(name.clone(), output).is_some() {
                return Err(ParseError::DuplicateOutput(name));
            }
        }
        Ok(outputs)
    }

    fn parse_input_derivations(
        &mut self,
    ) -> Result<BTreeMap<StorePath, Vec<String>>, ParseError> {
        let items = self.parse_list(|p| {
            p.expect_char('(')?;
            let path = p.parse_quoted_store_path()?;
            p.expect_char(',')?;
            let outputs = p.parse_string_list()?;
            p.expect_char(')')?;
            Ok((path, outputs))
        })?;

        Ok(items.into_iter().collect())
    }

    fn parse_input_sources(&mut self) -> Result<Vec<StorePath>, ParseError> {
        self.parse_list(|p| p.parse_quoted_store_path())
    }

    fn parse_env(&mut self) -> Result<BTreeMap<String, String>, ParseError> {
        let pairs = self.parse_list(|p| {
            p.expect_char('(')?;
            let key = p.parse_string()?;
            p.expect_char(',')?;
            let value = p.parse_string()?;
            p.expect_char(')')?;
            Ok((key, value))
        })?;

        Ok(pairs.into_iter().collect())
    }
}
