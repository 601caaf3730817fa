//! Byte ↔ text conversions.
//!
//! Received bytes render either as space-separated 8-bit binary groups or
//! as ASCII text. Outgoing data is typed by the user as whitespace-separated
//! base-2 byte values.

use crate::terminal::types::{OutputFormat, TerminalError};

/// Replacement for bytes that are not valid ASCII.
const PLACEHOLDER: char = '\u{FFFD}';

/// Render received bytes in the given format.
///
/// Never fails and never drops bytes: binary output has exactly one
/// zero-padded 8-character group per input byte, ASCII output substitutes
/// a placeholder one-for-one for bytes outside the ASCII range.
pub fn decode(data: &[u8], format: OutputFormat) -> String {
    match format {
        OutputFormat::Binary => data
            .iter()
            .map(|byte| format!("{:08b}", byte))
            .collect::<Vec<_>>()
            .join(" "),
        OutputFormat::Ascii => data
            .iter()
            .map(|&byte| if byte.is_ascii() { byte as char } else { PLACEHOLDER })
            .collect(),
    }
}

/// Result of tokenizing a send request.
///
/// Invalid tokens do not abort the request: the bytes for every valid token
/// (before and after any invalid one) are kept in token order, and the
/// invalid tokens are collected for per-token reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizedInput {
    /// Bytes for the valid tokens, in token order.
    pub bytes: Vec<u8>,
    /// The valid tokens as typed.
    pub valid_tokens: Vec<String>,
    /// Tokens that did not parse as a base-2 value in [0, 255].
    pub invalid_tokens: Vec<String>,
}

/// Split user input on whitespace and parse each token as a base-2 byte.
///
/// Zero tokens is an `EmptyInput` error; a request consisting solely of
/// invalid tokens is not (the caller reports each token individually).
pub fn encode_tokens(text: &str) -> Result<TokenizedInput, TerminalError> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() {
        return Err(TerminalError::empty_input());
    }

    let mut parsed = TokenizedInput {
        bytes: Vec::with_capacity(tokens.len()),
        valid_tokens: Vec::with_capacity(tokens.len()),
        invalid_tokens: Vec::new(),
    };
    for token in tokens {
        match u8::from_str_radix(token, 2) {
            Ok(byte) => {
                parsed.bytes.push(byte);
                parsed.valid_tokens.push(token.to_string());
            }
            Err(_) => parsed.invalid_tokens.push(token.to_string()),
        }
    }
    Ok(parsed)
}
