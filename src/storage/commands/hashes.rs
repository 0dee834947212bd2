//! Hash command implementations

use super::{CommandParser, ExecContext};
use crate::error::Result;
use crate::protocol::RespFrame;
use crate::storage::Key;

#[derive(Debug, Clone, PartialEq)]
pub enum HashCommand {
    /// HSET replies with the number of new fields, HMSET with OK
    Set {
        key: Key,
        pairs: Vec<(Vec<u8>, Vec<u8>)>,
        legacy: bool,
    },
    SetNx {
        key: Key,
        field: Vec<u8>,
        value: Vec<u8>,
    },
    Get {
        key: Key,
        field: Vec<u8>,
    },
    MGet {
        key: Key,
        fields: Vec<Vec<u8>>,
    },
    GetAll(Key),
    Del {
        key: Key,
        fields: Vec<Vec<u8>>,
    },
    Len(Key),
    Exists {
        key: Key,
        field: Vec<u8>,
    },
    Keys(Key),
    Vals(Key),
    StrLen {
        key: Key,
        field: Vec<u8>,
    },
    IncrBy {
        key: Key,
        field: Vec<u8>,
        delta: i64,
    },
    IncrByFloat {
        key: Key,
        field: Vec<u8>,
        delta: f64,
    },
}

impl HashCommand {
    pub fn parse(parser: &mut CommandParser) -> Result<Option<Self>> {
        let name = parser.name().to_string();
        let command = match name.as_str() {
            "hset" | "hmset" => HashCommand::Set {
                key: parser.next_bytes()?,
                pairs: parser.rest_pairs()?,
                legacy: name == "hmset",
            },
            "hsetnx" => HashCommand::SetNx {
                key: parser.next_bytes()?,
                field: parser.next_bytes()?,
                value: parser.next_bytes()?,
            },
            "hget" => HashCommand::Get {
                key: parser.next_bytes()?,
                field: parser.next_bytes()?,
            },
            "hmget" => HashCommand::MGet {
                key: parser.next_bytes()?,
                fields: parser.rest_non_empty()?,
            },
            "hgetall" => HashCommand::GetAll(parser.next_bytes()?),
            "hdel" => HashCommand::Del {
                key: parser.next_bytes()?,
                fields: parser.rest_non_empty()?,
            },
            "hlen" => HashCommand::Len(parser.next_bytes()?),
            "hexists" => HashCommand::Exists {
                key: parser.next_bytes()?,
                field: parser.next_bytes()?,
            },
            "hkeys" => HashCommand::Keys(parser.next_bytes()?),
            "hvals" => HashCommand::Vals(parser.next_bytes()?),
            "hstrlen" => HashCommand::StrLen {
                key: parser.next_bytes()?,
                field: parser.next_bytes()?,
            },
            "hincrby" => HashCommand::IncrBy {
                key: parser.next_bytes()?,
                field: parser.next_bytes()?,
                delta: parser.next_i64()?,
            },
            "hincrbyfloat" => HashCommand::IncrByFloat {
                key: parser.next_bytes()?,
                field: parser.next_bytes()?,
                delta: parser.next_f64()?,
            },
            _ => return Ok(None),
        };
        parser.expect_end_arity()?;
        Ok(Some(command))
    }

    pub fn execute(&self, ctx: &mut ExecContext<'_>) -> Result<RespFrame> {
        let db = ctx.database()?;
        match self {
            HashCommand::Set { key, pairs, legacy } => {
                let created = db.hset(key, pairs.clone())?;
                Ok(if *legacy {
                    RespFrame::ok()
                } else {
                    RespFrame::Integer(created as i64)
                })
            }
            HashCommand::SetNx { key, field, value } => {
                Ok(RespFrame::boolean(db.hsetnx(key, field.clone(), value.clone())?))
            }
            HashCommand::Get { key, field } => Ok(RespFrame::optional_bulk(db.hget(key, field)?)),
            HashCommand::MGet { key, fields } => Ok(RespFrame::array(
                db.hmget(key, fields)?.into_iter().map(RespFrame::optional_bulk).collect(),
            )),
            HashCommand::GetAll(key) => Ok(RespFrame::bulk_array(
                db.hgetall(key)?.into_iter().flat_map(|(field, value)| [field, value]),
            )),
            HashCommand::Del { key, fields } => Ok(RespFrame::Integer(db.hdel(key, fields)? as i64)),
            HashCommand::Len(key) => Ok(RespFrame::Integer(db.hlen(key)? as i64)),
            HashCommand::Exists { key, field } => Ok(RespFrame::boolean(db.hexists(key, field)?)),
            HashCommand::Keys(key) => Ok(RespFrame::bulk_array(db.hkeys(key)?)),
            HashCommand::Vals(key) => Ok(RespFrame::bulk_array(db.hvals(key)?)),
            HashCommand::StrLen { key, field } => Ok(RespFrame::Integer(db.hstrlen(key, field)? as i64)),
            HashCommand::IncrBy { key, field, delta } => Ok(RespFrame::Integer(db.hincrby(key, field, *delta)?)),
            HashCommand::IncrByFloat { key, field, delta } => {
                Ok(RespFrame::double(db.hincrbyfloat(key, field, *delta)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::storage::commands::{Command, ExecMode};
    use crate::storage::engine::Engine;

    fn run(engine: &Engine, args: &[&str]) -> Result<RespFrame> {
        let argv: Vec<Vec<u8>> = args.iter().map(|a| a.as_bytes().to_vec()).collect();
        let command = Command::parse(&argv)?;
        engine.run(|keyspace| {
            command.execute(&mut ExecContext {
                keyspace,
                db: 0,
                scripts: engine.scripts(),
                mode: ExecMode::Normal,
            })
        })
    }

    #[test]
    fn test_set_and_get() {
        let engine = Engine::new(&Config::default());
        assert_eq!(run(&engine, &["HSET", "h", "a", "1", "b", "2"]).unwrap(), RespFrame::Integer(2));
        assert_eq!(run(&engine, &["HSET", "h", "a", "3", "c", "4"]).unwrap(), RespFrame::Integer(1));
        assert_eq!(run(&engine, &["HMSET", "h", "d", "5"]).unwrap(), RespFrame::ok());
        assert!(run(&engine, &["HSET", "h", "a"]).is_err());
        assert_eq!(run(&engine, &["HSETNX", "h", "a", "9"]).unwrap(), RespFrame::Integer(0));
        assert_eq!(run(&engine, &["HGET", "h", "a"]).unwrap(), RespFrame::bulk_string("3"));
        assert_eq!(
            run(&engine, &["HMGET", "h", "a", "zz"]).unwrap(),
            RespFrame::array(vec![RespFrame::bulk_string("3"), RespFrame::null_bulk()])
        );
        assert_eq!(run(&engine, &["HLEN", "h"]).unwrap(), RespFrame::Integer(4));
        assert_eq!(run(&engine, &["HSTRLEN", "h", "a"]).unwrap(), RespFrame::Integer(1));
    }

    #[test]
    fn test_getall_and_del() {
        let engine = Engine::new(&Config::default());
        run(&engine, &["HSET", "h", "b", "2", "a", "1"]).unwrap();
        assert_eq!(
            run(&engine, &["HGETALL", "h"]).unwrap(),
            RespFrame::bulk_array([&b"a"[..], &b"1"[..], &b"b"[..], &b"2"[..]])
        );
        assert_eq!(run(&engine, &["HDEL", "h", "a", "a", "zz"]).unwrap(), RespFrame::Integer(1));
        assert_eq!(run(&engine, &["HEXISTS", "h", "a"]).unwrap(), RespFrame::Integer(0));
        assert_eq!(run(&engine, &["HDEL", "h", "b"]).unwrap(), RespFrame::Integer(1));
        assert_eq!(run(&engine, &["EXISTS", "h"]).unwrap(), RespFrame::Integer(0));
        assert_eq!(run(&engine, &["HGETALL", "h"]).unwrap(), RespFrame::array(vec![]));
    }

    #[test]
    fn test_increments() {
        let engine = Engine::new(&Config::default());
        assert_eq!(run(&engine, &["HINCRBY", "h", "n", "5"]).unwrap(), RespFrame::Integer(5));
        assert_eq!(run(&engine, &["HINCRBYFLOAT", "h", "n", "1.5"]).unwrap(), RespFrame::bulk_string("6.5"));
        assert!(run(&engine, &["HINCRBY", "h", "n", "1"]).is_err());
        run(&engine, &["SET", "s", "x"]).unwrap();
        let err = run(&engine, &["HGET", "s", "f"]).unwrap_err();
        assert!(err.to_string().starts_with("WRONGTYPE"));
    }
}
