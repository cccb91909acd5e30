use crate::stream::LineSource;
use crate::{ParseError, Result, VectorMode};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Token separator inside a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Separator {
    /// Runs of any whitespace collapse into one separator
    #[default]
    Whitespace,
    Char(char),
}

/// How a decoder picks its [`VectorMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModePolicy {
    /// Try bracketed first, fall back to unbracketed, then keep whichever
    /// succeeded for every later call.
    #[default]
    Auto,
    Fixed(VectorMode),
}

/// Decodes one textual vector into floats.
///
/// The mode chosen by the first successful decode is locked in and never
/// re-probed, even if a later line would only parse in the other mode.
#[derive(Debug, Clone)]
pub struct VectorDecoder {
    separator: Separator,
    policy: ModePolicy,
    locked: Option<VectorMode>,
}

impl Default for VectorDecoder {
    fn default() -> Self {
        Self::new(Separator::default(), ModePolicy::default())
    }
}

impl VectorDecoder {
    pub fn new(separator: Separator, policy: ModePolicy) -> Self {
        let locked = match policy {
            ModePolicy::Auto => None,
            ModePolicy::Fixed(mode) => Some(mode),
        };
        Self {
            separator,
            policy,
            locked,
        }
    }

    /// The locked mode, if one has been decided.
    pub fn mode(&self) -> Option<VectorMode> {
        self.locked
    }

    /// Forget the locked mode. Fixed policies stay fixed.
    pub fn reset(&mut self) {
        *self = Self::new(self.separator, self.policy);
    }

    /// Decode `text`. A bracketed vector whose `]` is not on this line pulls
    /// further lines from `source` until it closes.
    pub fn decode(&mut self, text: &str, source: &mut dyn LineSource) -> Result<Vec<f64>> {
        match self.locked {
            Some(VectorMode::Bracketed) => self.decode_bracketed(text, source),
            Some(VectorMode::Unbracketed) => self.decode_unbracketed(text),
            None => {
                let values = match self.decode_bracketed(text, source) {
                    Ok(values) => {
                        self.locked = Some(VectorMode::Bracketed);
                        values
                    }
                    Err(ParseError::MissingBracket { .. }) => {
                        let values = self.decode_unbracketed(text)?;
                        self.locked = Some(VectorMode::Unbracketed);
                        values
                    }
                    Err(e) => return Err(e),
                };
                debug!("Vector mode locked to {:?}", self.locked);
                Ok(values)
            }
        }
    }

    fn decode_unbracketed(&self, text: &str) -> Result<Vec<f64>> {
        self.parse_tokens(text, text)
    }

    fn decode_bracketed(&self, text: &str, source: &mut dyn LineSource) -> Result<Vec<f64>> {
        let open = text.find('[').ok_or_else(|| ParseError::MissingBracket {
            text: text.to_string(),
        })?;
        let rest = &text[open + 1..];

        if let Some(close) = rest.find(']') {
            return self.parse_tokens(&rest[..close], text);
        }

        let mut buffer = rest.trim().to_string();
        loop {
            let line = source
                .read_line()?
                .ok_or_else(|| ParseError::UnterminatedBracket {
                    text: format!("[{}", buffer),
                })?;
            let line = line.trim();
            trace!("Continuing bracketed vector with {:?}", line);

            let (chunk, closed) = match line.find(']') {
                Some(close) => (&line[..close], true),
                None => (line, false),
            };
            if !buffer.is_empty() && !chunk.is_empty() {
                buffer.push(' ');
            }
            buffer.push_str(chunk);

            if closed {
                return self.parse_tokens(&buffer, &format!("[{}]", buffer));
            }
        }
    }

    fn parse_tokens(&self, body: &str, text: &str) -> Result<Vec<f64>> {
        let tokens: Vec<&str> = match self.separator {
            Separator::Whitespace => body.split_whitespace().collect(),
            Separator::Char(sep) => body
                .split(sep)
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect(),
        };

        if tokens.is_empty() {
            return Err(ParseError::NoNumericTokens {
                text: text.to_string(),
            });
        }

        tokens
            .into_iter()
            .map(|token| {
                token.parse::<f64>().map_err(|_| ParseError::InvalidNumber {
                    token: token.to_string(),
                    text: text.to_string(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::LineReader;
    use std::io::Cursor;

    fn empty() -> LineReader<Cursor<&'static str>> {
        LineReader::new(Cursor::new(""))
    }

    #[test]
    fn test_decode_supported_forms() {
        let expected = vec![1.0, 2.0, 3.0];

        let mut decoder = VectorDecoder::default();
        assert_eq!(decoder.decode("[1.0 2.0 3.0]", &mut empty()).unwrap(), expected);
        assert_eq!(decoder.mode(), Some(VectorMode::Bracketed));

        let mut decoder = VectorDecoder::default();
        assert_eq!(decoder.decode("1.0   2.0\t3.0", &mut empty()).unwrap(), expected);
        assert_eq!(decoder.mode(), Some(VectorMode::Unbracketed));

        let mut decoder = VectorDecoder::default();
        let mut rest = LineReader::new(Cursor::new("   2.0\n 3.0]\nnext"));
        assert_eq!(decoder.decode("[ 1.0", &mut rest).unwrap(), expected);
        assert_eq!(rest.read_line().unwrap().as_deref(), Some("next"));
    }

    #[test]
    fn test_decode_multiline_with_empty_head() {
        let mut decoder = VectorDecoder::default();
        let mut rest = LineReader::new(Cursor::new("1.0 2.0\n3.0\n]"));
        assert_eq!(decoder.decode("vec = [", &mut rest).unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_unbracketed_lock_never_reprobes() {
        let mut decoder = VectorDecoder::default();
        decoder.decode("4 5 6", &mut empty()).unwrap();

        let err = decoder.decode("[1.0 2.0 3.0]", &mut empty()).unwrap_err();
        match err {
            ParseError::InvalidNumber { token, .. } => assert_eq!(token, "[1.0"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(decoder.mode(), Some(VectorMode::Unbracketed));
    }

    #[test]
    fn test_bracketed_lock_rejects_plain_line() {
        let mut decoder = VectorDecoder::default();
        decoder.decode("[0.1 0.2 0.3]", &mut empty()).unwrap();

        assert!(matches!(
            decoder.decode("0.4 0.5 0.6", &mut empty()),
            Err(ParseError::MissingBracket { .. })
        ));

        decoder.reset();
        assert_eq!(decoder.mode(), None);
        assert_eq!(decoder.decode("0.4 0.5 0.6", &mut empty()).unwrap(), vec![0.4, 0.5, 0.6]);
    }

    #[test]
    fn test_fixed_policy_and_separator() {
        let mut decoder =
            VectorDecoder::new(Separator::Char(','), ModePolicy::Fixed(VectorMode::Unbracketed));
        assert_eq!(decoder.mode(), Some(VectorMode::Unbracketed));
        assert_eq!(decoder.decode("1.5, -2,3e2,", &mut empty()).unwrap(), vec![1.5, -2.0, 300.0]);

        decoder.reset();
        assert_eq!(decoder.mode(), Some(VectorMode::Unbracketed));
    }

    #[test]
    fn test_decode_errors() {
        let mut decoder = VectorDecoder::default();
        assert!(matches!(
            decoder.decode("   ", &mut empty()),
            Err(ParseError::NoNumericTokens { .. })
        ));
        assert_eq!(decoder.mode(), None);

        assert!(matches!(
            decoder.decode("[]", &mut empty()),
            Err(ParseError::NoNumericTokens { .. })
        ));

        assert!(matches!(
            decoder.decode("[1 2", &mut empty()),
            Err(ParseError::UnterminatedBracket { .. })
        ));
    }
}
