//! Argument cursor used by every command parser

use std::iter::Peekable;
use std::str;
use std::time::Duration;
use std::vec;

use crate::error::{CommandError, EmbedisError, Result};
use crate::storage::ops::parse_i64;
use crate::storage::sorted_set::parse_score;

/// Walks the arguments of one command
#[derive(Debug)]
pub struct CommandParser {
    name: String,
    parts: Peekable<vec::IntoIter<Vec<u8>>>,
}

impl CommandParser {
    /// Split an argument vector into the lowercased command name and its
    /// arguments
    pub fn new(argv: &[Vec<u8>]) -> Result<Self> {
        let (name, args) = argv
            .split_first()
            .ok_or_else(|| CommandError::invalid("empty command"))?;
        Ok(CommandParser {
            name: String::from_utf8_lossy(name).to_lowercase(),
            parts: args.to_vec().into_iter().peekable(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of arguments not consumed yet
    pub fn remaining(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The wrong-arity error for this command
    pub fn arity_error(&self) -> EmbedisError {
        CommandError::WrongNumberOfArgs(self.name.clone()).into()
    }

    pub fn next_bytes(&mut self) -> Result<Vec<u8>> {
        self.parts.next().ok_or_else(|| self.arity_error())
    }

    /// Next argument as UTF-8 (lossy)
    pub fn next_string(&mut self) -> Result<String> {
        let bytes = self.next_bytes()?;
        Ok(match str::from_utf8(&bytes) {
            Ok(s) => s.to_string(),
            Err(_) => String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    pub fn next_i64(&mut self) -> Result<i64> {
        let bytes = self.next_bytes()?;
        parse_i64(&bytes).ok_or_else(|| CommandError::NotInteger.into())
    }

    /// Next argument as a non-negative integer
    pub fn next_u64(&mut self) -> Result<u64> {
        let n = self.next_i64()?;
        u64::try_from(n).map_err(|_| CommandError::invalid("value is out of range, must be positive").into())
    }

    pub fn next_usize(&mut self) -> Result<usize> {
        Ok(self.next_u64()? as usize)
    }

    /// Next argument as a float, `inf`/`-inf` accepted
    pub fn next_f64(&mut self) -> Result<f64> {
        let bytes = self.next_bytes()?;
        parse_score(&bytes).ok_or_else(|| CommandError::NotFloat.into())
    }

    /// Consume the next argument if it equals `keyword`, ignoring case
    pub fn next_if_keyword(&mut self, keyword: &str) -> bool {
        let matched = self
            .parts
            .peek()
            .is_some_and(|part| part.eq_ignore_ascii_case(keyword.as_bytes()));
        if matched {
            self.parts.next();
        }
        matched
    }

    /// Peek at the next argument, uppercased
    pub fn peek_keyword(&mut self) -> Option<String> {
        self.parts
            .peek()
            .map(|part| String::from_utf8_lossy(part).to_uppercase())
    }

    /// All remaining arguments
    pub fn rest(&mut self) -> Vec<Vec<u8>> {
        self.parts.by_ref().collect()
    }

    /// `n` arguments, failing with a syntax error if fewer remain
    pub fn take(&mut self, n: usize) -> Result<Vec<Vec<u8>>> {
        if self.remaining() < n {
            return Err(CommandError::SyntaxError.into());
        }
        Ok(self.parts.by_ref().take(n).collect())
    }

    /// Remaining arguments as pairs
    pub fn rest_pairs(&mut self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        if self.is_empty() || self.remaining() % 2 != 0 {
            return Err(self.arity_error());
        }
        let mut pairs = Vec::with_capacity(self.remaining() / 2);
        while let (Some(a), Some(b)) = (self.parts.next(), self.parts.next()) {
            pairs.push((a, b));
        }
        Ok(pairs)
    }

    /// At least one remaining argument, all of them
    pub fn rest_non_empty(&mut self) -> Result<Vec<Vec<u8>>> {
        if self.is_empty() {
            return Err(self.arity_error());
        }
        Ok(self.rest())
    }

    /// Fail with a syntax error if arguments are left over
    pub fn expect_end(&self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CommandError::SyntaxError.into())
        }
    }

    /// Fail with an arity error if arguments are left over
    pub fn expect_end_arity(&self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self.arity_error())
        }
    }

    /// Blocking timeout in seconds; 0 waits forever
    pub fn next_timeout_secs(&mut self) -> Result<Option<Duration>> {
        let bytes = self.next_bytes()?;
        let secs = parse_score(&bytes)
            .filter(|secs| secs.is_finite())
            .ok_or_else(|| CommandError::invalid("timeout is not a float or out of range"))?;
        timeout_from_secs(secs)
    }

    /// Blocking timeout in milliseconds; 0 waits forever
    pub fn next_timeout_ms(&mut self) -> Result<Option<Duration>> {
        let ms = self
            .next_bytes()
            .map(|bytes| parse_i64(&bytes))?
            .ok_or_else(|| CommandError::invalid("timeout is not an integer or out of range"))?;
        timeout_from_secs(ms as f64 / 1000.0)
    }
}

fn timeout_from_secs(secs: f64) -> Result<Option<Duration>> {
    if secs < 0.0 {
        return Err(CommandError::invalid("timeout is negative").into());
    }
    if secs == 0.0 {
        return Ok(None);
    }
    Duration::try_from_secs_f64(secs)
        .map(Some)
        .map_err(|_| CommandError::invalid("timeout is out of range").into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser(args: &[&str]) -> CommandParser {
        let argv: Vec<Vec<u8>> = args.iter().map(|a| a.as_bytes().to_vec()).collect();
        CommandParser::new(&argv).unwrap()
    }

    #[test]
    fn test_name_is_lowercased() {
        let p = parser(&["GeT", "k"]);
        assert_eq!(p.name(), "get");
        assert_eq!(p.remaining(), 1);
        assert!(CommandParser::new(&[]).is_err());
    }

    #[test]
    fn test_numbers_and_keywords() {
        let mut p = parser(&["x", "12", "-3", "1.5", "withscores", "rest", "more"]);
        assert_eq!(p.next_u64().unwrap(), 12);
        assert!(p.next_u64().is_err());
        assert_eq!(p.next_f64().unwrap(), 1.5);
        assert!(!p.next_if_keyword("LIMIT"));
        assert!(p.next_if_keyword("WITHSCORES"));
        assert!(p.expect_end().is_err());
        assert_eq!(p.rest().len(), 2);
        assert!(p.expect_end().is_ok());
        assert!(p.next_bytes().unwrap_err().to_string().contains("'x'"));
    }

    #[test]
    fn test_pairs() {
        assert_eq!(parser(&["x", "a", "1", "b", "2"]).rest_pairs().unwrap().len(), 2);
        assert!(parser(&["x", "a", "1", "b"]).rest_pairs().is_err());
        assert!(parser(&["x"]).rest_pairs().is_err());
    }

    #[test]
    fn test_timeouts() {
        assert_eq!(parser(&["x", "0"]).next_timeout_secs().unwrap(), None);
        assert_eq!(
            parser(&["x", "0.5"]).next_timeout_secs().unwrap(),
            Some(Duration::from_millis(500))
        );
        assert!(parser(&["x", "-1"]).next_timeout_secs().is_err());
        assert_eq!(
            parser(&["x", "1500"]).next_timeout_ms().unwrap(),
            Some(Duration::from_millis(1500))
        );
        assert!(parser(&["x", "soon"]).next_timeout_ms().is_err());
    }
}
