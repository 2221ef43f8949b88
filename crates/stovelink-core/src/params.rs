//! Command tokenizer and parameter validator.
//!
//! A command line is an 8 character code, optionally followed by a space
//! and up to [`MAX_PARAMS`] space separated numeric tokens. A few codes
//! re-encode their tail before splitting:
//!
//! - `SET TIME `: `-` and `:` become separators (`2024-01-31 12:00:00`).
//! - `SET STPF `: `.` becomes a separator (`21.40` → `21 40`).
//! - `EXT ADRD ` / `EXT ADWR `: the first token is hexadecimal.

/// Maximum number of parameters a command may carry.
pub const MAX_PARAMS: usize = 6;

/// Length of the command code.
pub const CODE_LEN: usize = 8;

/// One parsed token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub raw: String,
    pub value: u16,
    pub valid: bool,
}

/// Tokenizer failure; either variant rejects the command before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamError {
    #[error("Incorrect Parameter Value : {0}")]
    InvalidValue(String),

    #[error("Incorrect Parameter Number")]
    TooMany,
}

/// Tokenizer output for one command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCommand {
    params: Vec<Param>,
    error: Option<ParamError>,
}

impl ParsedCommand {
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn count(&self) -> usize {
        self.params.len()
    }

    /// Numeric value of parameter `index`, `0` when absent.
    pub fn value(&self, index: usize) -> u16 {
        self.params.get(index).map(|p| p.value).unwrap_or(0)
    }

    /// Parameter `index` truncated to a byte, as the device expects.
    pub fn byte(&self, index: usize) -> u8 {
        self.value(index) as u8
    }

    /// Raw token of parameter `index`, empty when absent.
    pub fn raw(&self, index: usize) -> &str {
        self.params.get(index).map(|p| p.raw.as_str()).unwrap_or("")
    }

    pub fn error(&self) -> Option<&ParamError> {
        self.error.as_ref()
    }
}

/// Split a command line into parameters.
///
/// Parameters are only looked for when the input is longer than nine
/// bytes and byte 8 is a space; otherwise the whole line is the code.
pub fn parse_command(cmd: &str) -> ParsedCommand {
    let mut parsed = ParsedCommand::default();

    if cmd.len() <= CODE_LEN + 1 || cmd.as_bytes()[CODE_LEN] != b' ' {
        return parsed;
    }

    let mut tail = cmd[CODE_LEN + 1..].trim().to_string();
    if cmd.starts_with("SET TIME ") {
        tail = tail.replace(['-', ':'], " ");
    }
    if cmd.starts_with("SET STPF ") {
        tail = tail.replace('.', " ");
    }
    let hex_first = cmd.starts_with("EXT ADRD ") || cmd.starts_with("EXT ADWR ");

    let mut rest = tail.as_str();
    while !rest.is_empty() && parsed.params.len() < MAX_PARAMS {
        let token = match rest.find(' ') {
            Some(pos) => {
                let token = &rest[..pos];
                rest = &rest[pos + 1..];
                token
            }
            None => std::mem::take(&mut rest),
        };

        let value = if parsed.params.is_empty() && hex_first {
            parse_hex(token)
        } else {
            parse_decimal(token)
        };
        let valid = is_valid_token(token, value);
        if !valid && parsed.error.is_none() {
            parsed.error = Some(ParamError::InvalidValue(token.to_string()));
        }

        parsed.params.push(Param {
            raw: token.to_string(),
            value,
            valid,
        });
    }

    if parsed.params.len() == MAX_PARAMS && !rest.is_empty() {
        parsed.error = Some(ParamError::TooMany);
    }

    parsed
}

/// Legacy zero heuristic: a token converting to `0` is only valid when it
/// consists of nothing but `'0'` characters.
///
/// This is kept bit-for-bit for wire compatibility; it is not a general
/// integer check (`"12abc"` converts to `12` and passes).
pub fn is_valid_token(token: &str, value: u16) -> bool {
    value != 0 || token.chars().all(|c| c == '0')
}

/// C `atol` semantics truncated to 16 bits.
pub fn parse_decimal(token: &str) -> u16 {
    let s = token.trim_start();
    let (negative, digits) = split_sign(s);

    let mut acc: i64 = 0;
    for b in digits.bytes().take_while(|b| b.is_ascii_digit()) {
        acc = acc.wrapping_mul(10).wrapping_add(i64::from(b - b'0'));
    }
    if negative {
        acc = acc.wrapping_neg();
    }
    acc as u16
}

/// C `strtol(.., 16)` semantics truncated to 16 bits.
pub fn parse_hex(token: &str) -> u16 {
    let s = token.trim_start();
    let (negative, rest) = split_sign(s);
    let digits = rest
        .strip_prefix("0x")
        .or_else(|| rest.strip_prefix("0X"))
        .filter(|d| d.starts_with(|c: char| c.is_ascii_hexdigit()))
        .unwrap_or(rest);

    let mut acc: i64 = 0;
    for c in digits.chars().map_while(|c| c.to_digit(16)) {
        acc = acc.wrapping_mul(16).wrapping_add(i64::from(c));
    }
    if negative {
        acc = acc.wrapping_neg();
    }
    acc as u16
}

fn split_sign(s: &str) -> (bool, &str) {
    match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    }
}
