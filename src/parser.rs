// src/parser.rs
use crate::errors::EvalError;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    InvalidSyntax { pos: usize, msg: String },
}

impl From<ParseError> for EvalError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::InvalidSyntax { pos, msg } => EvalError::Parse(format!("{msg} at {pos}")),
        }
    }
}

/// Character scanner shared by the expression grammar.
pub struct Parser<'a> {
    s: &'a str,
    i: usize,
}

impl<'a> Parser<'a> {
    pub fn new(s: &'a str) -> Self {
        Self { s, i: 0 }
    }

    pub fn error(&self, msg: impl Into<String>) -> ParseError {
        ParseError::InvalidSyntax {
            pos: self.i,
            msg: msg.into(),
        }
    }

    pub fn is_ident_start(c: char) -> bool {
        c == '_' || c == '$' || c.is_alphabetic()
    }

    fn is_ident_char(c: char) -> bool {
        Self::is_ident_start(c) || c.is_ascii_digit()
    }

    pub fn parse_identifier(&mut self) -> Result<String, ParseError> {
        let start = self.i;
        match self.peek_char() {
            Some(c) if Self::is_ident_start(c) => self.i += c.len_utf8(),
            _ => return Err(self.error("identifier expected")),
        }
        while let Some(c) = self.peek_char() {
            if Self::is_ident_char(c) {
                self.i += c.len_utf8();
            } else {
                break;
            }
        }
        Ok(self.s[start..self.i].to_string())
    }

    /// True when the keyword `kw` starts here and is not a prefix of a longer identifier.
    pub fn peek_keyword(&self, kw: &str) -> bool {
        self.peek_str(kw)
            && !self.s[self.i + kw.len()..]
                .chars()
                .next()
                .is_some_and(Self::is_ident_char)
    }

    pub fn parse_number_literal(&mut self) -> Result<Value, ParseError> {
        let start = self.i;
        self.skip_digits();
        let mut is_float = false;
        if self.peek_char() == Some('.')
            && self.s[self.i + 1..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit())
        {
            is_float = true;
            self.i += 1;
            self.skip_digits();
        }
        if matches!(self.peek_char(), Some('e') | Some('E')) {
            let mark = self.i;
            self.i += 1;
            if matches!(self.peek_char(), Some('+') | Some('-')) {
                self.i += 1;
            }
            if self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.skip_digits();
            } else {
                self.i = mark;
            }
        }
        let s = &self.s[start..self.i];
        if s.is_empty() {
            return Err(self.error("number expected"));
        }
        if !is_float {
            if let Ok(i) = s.parse::<i64>() {
                return Ok(Value::from(i));
            }
        }
        let f: f64 = s.parse().map_err(|_| self.error("bad number"))?;
        if !f.is_finite() {
            return Err(self.error("number out of range"));
        }
        Ok(crate::operators::number(f))
    }

    fn skip_digits(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.i += 1;
            } else {
                break;
            }
        }
    }

    pub fn parse_quoted_string(&mut self) -> Result<String, ParseError> {
        let quote = self.peek_char().ok_or_else(|| self.error("string expected"))?;
        if quote != '\'' && quote != '"' {
            return Err(self.error("expected quoted string"));
        }
        self.i += 1;
        let mut out = String::new();
        while let Some(c) = self.peek_char() {
            self.i += c.len_utf8();
            if c == quote {
                return Ok(out);
            }
            if c == '\\' {
                if let Some(nc) = self.peek_char() {
                    self.i += nc.len_utf8();
                    match nc {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '\\' => out.push('\\'),
                        '"' => out.push('"'),
                        '\'' => out.push('\''),
                        _ => {
                            out.push('\\');
                            out.push(nc);
                        }
                    }
                } else {
                    break;
                }
            } else {
                out.push(c);
            }
        }
        Err(self.error("unterminated string"))
    }

    pub fn expect(&mut self, c: char) -> Result<(), ParseError> {
        if self.consume_char(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{c}'")))
        }
    }

    pub fn consume_char(&mut self, c: char) -> bool {
        if self.peek_char() == Some(c) {
            self.i += c.len_utf8();
            true
        } else {
            false
        }
    }

    pub fn consume_str(&mut self, lit: &str) -> bool {
        if self.peek_str(lit) {
            self.i += lit.len();
            true
        } else {
            false
        }
    }

    pub fn peek_char(&self) -> Option<char> {
        self.s[self.i..].chars().next()
    }

    pub fn peek_str(&self, lit: &str) -> bool {
        self.s[self.i..].starts_with(lit)
    }

    pub fn skip_ws(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.i += c.len_utf8();
            } else {
                break;
            }
        }
    }

    pub fn eof(&self) -> bool {
        self.i >= self.s.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn numbers() {
        assert_eq!(Parser::new("42").parse_number_literal().unwrap(), json!(42));
        assert_eq!(Parser::new("2.5").parse_number_literal().unwrap(), json!(2.5));
        assert_eq!(Parser::new("1e2").parse_number_literal().unwrap(), json!(100));
        let mut p = Parser::new("3.x");
        assert_eq!(p.parse_number_literal().unwrap(), json!(3));
        assert_eq!(p.peek_char(), Some('.'));
    }

    #[test]
    fn out_of_range_numbers() {
        assert!(Parser::new("1e400").parse_number_literal().is_err());
        assert!(Parser::new(&"9".repeat(400)).parse_number_literal().is_err());
        assert_eq!(Parser::new("1e308").parse_number_literal().unwrap(), json!(1e308));
    }

    #[test]
    fn strings_and_identifiers() {
        let mut p = Parser::new(r#"'it\'s' "°C""#);
        assert_eq!(p.parse_quoted_string().unwrap(), "it's");
        p.skip_ws();
        assert_eq!(p.parse_quoted_string().unwrap(), "°C");
        assert!(p.eof());
        assert_eq!(Parser::new("$temp_1 +").parse_identifier().unwrap(), "$temp_1");
        assert!(Parser::new("'open").parse_quoted_string().is_err());
    }

    #[test]
    fn keywords_need_a_boundary() {
        assert!(Parser::new("in [1]").peek_keyword("in"));
        assert!(!Parser::new("index").peek_keyword("in"));
    }
}
