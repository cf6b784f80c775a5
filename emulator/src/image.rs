//! Program images, as written to disk by an assembler.
//!
//! Two formats are supported: a text listing with one word per line, and a
//! raw sequence of little-endian 64-bit words.

use miette::{Diagnostic, SourceSpan};
use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_while1},
    character::complete::{char, not_line_ending, space0},
    combinator::{eof, map_res, opt},
    sequence::preceded,
    IResult,
};
use thiserror::Error;
use tracing::debug;

use crate::constants::Word;

const WORD_BYTES: usize = std::mem::size_of::<Word>();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// One word per line, in decimal, hexadecimal (`0x`) or binary (`0b`)
    Text,

    /// Little-endian 64-bit words
    Binary,
}

#[derive(Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum ImageError {
    #[error("invalid word on line {line}")]
    #[diagnostic(
        code(tpm::image::invalid_word),
        help("words are written in decimal, or in hexadecimal with a 0x prefix, or in binary with a 0b prefix")
    )]
    InvalidWord {
        line: usize,

        #[label("not a 64-bit word")]
        span: SourceSpan,
    },

    #[error("binary image is {len} bytes long, which is not a whole number of words")]
    #[diagnostic(code(tpm::image::truncated))]
    Truncated { len: usize },

    #[error("image is not valid UTF-8")]
    #[diagnostic(code(tpm::image::encoding))]
    Encoding,
}

/// Parse a program image in the given format
///
/// # Errors
///
/// Fails if the image is malformed.
pub fn parse(bytes: &[u8], format: Format) -> Result<Vec<Word>, ImageError> {
    match format {
        Format::Text => {
            let source = std::str::from_utf8(bytes).map_err(|_| ImageError::Encoding)?;
            parse_text(source)
        }
        Format::Binary => parse_binary(bytes),
    }
}

fn digits<'a>(radix: u32) -> impl FnMut(&'a str) -> IResult<&'a str, Word> {
    map_res(
        take_while1(move |c: char| c.is_digit(radix) || c == '_'),
        move |digits: &str| Word::from_str_radix(&digits.replace('_', ""), radix),
    )
}

fn word(input: &str) -> IResult<&str, Word> {
    alt((
        preceded(tag_no_case("0x"), digits(16)),
        preceded(tag_no_case("0b"), digits(2)),
        digits(10),
    ))(input)
}

/// A line holds at most one word, optionally followed by a comment
fn line(input: &str) -> IResult<&str, Option<Word>> {
    let (input, _) = space0(input)?;
    let (input, word) = opt(word)(input)?;
    let (input, _) = space0(input)?;
    let (input, _) = opt(preceded(char('#'), not_line_ending))(input)?;
    let (input, _) = eof(input)?;
    Ok((input, word))
}

/// Parse a text listing
///
/// # Errors
///
/// Fails on the first line that is neither a word, a comment nor blank.
pub fn parse_text(source: &str) -> Result<Vec<Word>, ImageError> {
    let mut words = Vec::new();
    let mut offset = 0;

    for (index, raw) in source.split_inclusive('\n').enumerate() {
        let content = raw.trim_end_matches(['\n', '\r']);

        match line(content) {
            Ok((_, Some(word))) => words.push(word),
            Ok((_, None)) => {}
            Err(nom::Err::Error(e) | nom::Err::Failure(e)) => {
                let column = content.len() - e.input.len();
                let len = e.input.trim_end().len();
                return Err(ImageError::InvalidWord {
                    line: index + 1,
                    span: (offset + column, len).into(),
                });
            }
            Err(nom::Err::Incomplete(_)) => {
                return Err(ImageError::InvalidWord {
                    line: index + 1,
                    span: (offset, content.len()).into(),
                });
            }
        }

        offset += raw.len();
    }

    debug!(words = words.len(), "Parsed text image");
    Ok(words)
}

/// Parse a binary image
///
/// # Errors
///
/// Fails if the image length is not a multiple of 8 bytes.
pub fn parse_binary(bytes: &[u8]) -> Result<Vec<Word>, ImageError> {
    let chunks = bytes.chunks_exact(WORD_BYTES);
    if !chunks.remainder().is_empty() {
        return Err(ImageError::Truncated { len: bytes.len() });
    }

    let words: Vec<Word> = chunks
        .map(|chunk| {
            let mut buf = [0u8; WORD_BYTES];
            buf.copy_from_slice(chunk);
            Word::from_le_bytes(buf)
        })
        .collect();

    debug!(words = words.len(), "Parsed binary image");
    Ok(words)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn text_image() {
        let source = indoc! {"
            # add two numbers
            0x0100000000000000
            0x0501_0000_0000_0000   # add %r0, %r1

            0b10
              42
            0X0
        "};

        assert_eq!(
            parse_text(source).unwrap(),
            vec![0x0100_0000_0000_0000, 0x0501_0000_0000_0000, 2, 42, 0]
        );
    }

    #[test]
    fn text_image_with_crlf() {
        assert_eq!(parse_text("1\r\n2\r\n").unwrap(), vec![1, 2]);
        assert_eq!(parse_text("").unwrap(), Vec::<Word>::new());
    }

    #[test]
    fn invalid_text_image() {
        let source = indoc! {"
            0x01
            0x0G00
        "};

        // Second line, after the valid `0x0` prefix
        assert_eq!(
            parse_text(source),
            Err(ImageError::InvalidWord {
                line: 2,
                span: (8, 3).into(),
            })
        );

        assert!(matches!(
            parse_text("18446744073709551616"),
            Err(ImageError::InvalidWord { line: 1, .. })
        ));
        assert!(matches!(
            parse_text("1 2"),
            Err(ImageError::InvalidWord { line: 1, .. })
        ));
        assert!(matches!(
            parse_text("halt"),
            Err(ImageError::InvalidWord { line: 1, .. })
        ));
    }

    #[test]
    fn binary_image() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0x0501_0000_0000_0000_u64.to_le_bytes());
        bytes.extend_from_slice(&7_u64.to_le_bytes());

        assert_eq!(
            parse(&bytes, Format::Binary).unwrap(),
            vec![0x0501_0000_0000_0000, 7]
        );

        bytes.push(0);
        assert_eq!(
            parse(&bytes, Format::Binary),
            Err(ImageError::Truncated { len: 17 })
        );
    }

    #[test]
    fn error_message() {
        insta::assert_snapshot!(
            ImageError::Truncated { len: 3 },
            @"binary image is 3 bytes long, which is not a whole number of words"
        );
    }
}
