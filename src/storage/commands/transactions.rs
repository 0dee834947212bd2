//! Transaction control commands
//!
//! MULTI/EXEC/DISCARD/WATCH/UNWATCH change per-session state, so they are
//! only parsed here and carried out by [`Session`](crate::session::Session).

use super::CommandParser;
use crate::error::Result;
use crate::storage::Key;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionCommand {
    Multi,
    Exec,
    Discard,
    Watch(Vec<Key>),
    Unwatch,
}

impl TransactionCommand {
    pub fn parse(parser: &mut CommandParser) -> Result<Option<Self>> {
        let name = parser.name().to_string();
        let command = match name.as_str() {
            "multi" => TransactionCommand::Multi,
            "exec" => TransactionCommand::Exec,
            "discard" => TransactionCommand::Discard,
            "watch" => TransactionCommand::Watch(parser.rest_non_empty()?),
            "unwatch" => TransactionCommand::Unwatch,
            _ => return Ok(None),
        };
        parser.expect_end_arity()?;
        Ok(Some(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Option<TransactionCommand>> {
        let argv: Vec<Vec<u8>> = args.iter().map(|a| a.as_bytes().to_vec()).collect();
        TransactionCommand::parse(&mut CommandParser::new(&argv)?)
    }

    #[test]
    fn test_parse() {
        assert_eq!(parse(&["MULTI"]).unwrap(), Some(TransactionCommand::Multi));
        assert_eq!(
            parse(&["watch", "a", "b"]).unwrap(),
            Some(TransactionCommand::Watch(vec![b"a".to_vec(), b"b".to_vec()]))
        );
        assert!(parse(&["WATCH"]).is_err());
        assert!(parse(&["EXEC", "now"]).is_err());
        assert_eq!(parse(&["GET", "k"]).unwrap(), None);
    }
}
