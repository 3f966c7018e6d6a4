use crate::attributes::QuotedOrUnquoted::{Quoted, Unquoted};
use std::fmt;

/// A value from an `<attribute-list>`, remembering whether it was written
/// as a quoted-string or as a bare enumerated-string / number.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum QuotedOrUnquoted {
    Unquoted(String),
    Quoted(String),
}

impl Default for QuotedOrUnquoted {
    fn default() -> Self {
        Quoted(String::new())
    }
}

impl QuotedOrUnquoted {
    pub fn as_str(&self) -> &str {
        match self {
            Quoted(s) | Unquoted(s) => s.as_str(),
        }
    }

    pub fn into_string(self) -> String {
        match self {
            Quoted(s) | Unquoted(s) => s,
        }
    }

    /// `YES` in either form; anything else (including absence) is `false`.
    pub fn is_yes(&self) -> bool {
        self.as_str() == "YES"
    }

    pub fn parse_u64(&self) -> Option<u64> {
        self.as_str().parse().ok()
    }
}

impl From<&str> for QuotedOrUnquoted {
    fn from(s: &str) -> Self {
        if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
            return Quoted(s[1..s.len() - 1].to_string());
        }
        Unquoted(s.to_string())
    }
}

impl fmt::Display for QuotedOrUnquoted {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Unquoted(s) => write!(f, "{}", s),
            Quoted(u) => write!(f, "\"{}\"", u),
        }
    }
}

// EXT-X-KEY
//
// METHOD
// The value is an enumerated-string that specifies the encryption
// method. The methods defined are: NONE, AES-128, and SAMPLE-AES.
#[allow(non_camel_case_types)]
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub enum KeyMethod {
    #[default]
    None,
    AES_128,
    SAMPLE_AES,
    Other(String),
}

impl From<QuotedOrUnquoted> for KeyMethod {
    fn from(s: QuotedOrUnquoted) -> Self {
        match s.as_str() {
            "NONE" => KeyMethod::None,
            "AES-128" => KeyMethod::AES_128,
            "SAMPLE-AES" => KeyMethod::SAMPLE_AES,
            _ => KeyMethod::Other(s.into_string()),
        }
    }
}

impl From<&str> for KeyMethod {
    fn from(s: &str) -> Self {
        QuotedOrUnquoted::from(s).into()
    }
}

impl fmt::Display for KeyMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            KeyMethod::None => write!(f, "NONE"),
            KeyMethod::AES_128 => write!(f, "AES-128"),
            KeyMethod::SAMPLE_AES => write!(f, "SAMPLE-AES"),
            KeyMethod::Other(s) => write!(f, "{}", s),
        }
    }
}
