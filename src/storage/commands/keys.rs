//! Keyspace and connection commands

use tracing::info;

use super::{CommandParser, ExecContext};
use crate::error::{CommandError, Result, StorageError};
use crate::protocol::RespFrame;
use crate::storage::database::RenameOutcome;
use crate::storage::Key;

/// How the amount of an EXPIRE-family command is expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpireUnit {
    Seconds,
    Millis,
}

#[derive(Debug, Clone, PartialEq)]
pub enum KeyCommand {
    Del(Vec<Key>),
    Exists(Vec<Key>),
    Expire {
        key: Key,
        amount: i64,
        unit: ExpireUnit,
        /// EXPIREAT / PEXPIREAT
        absolute: bool,
    },
    Ttl {
        key: Key,
        unit: ExpireUnit,
    },
    Persist(Key),
    Rename {
        src: Key,
        dst: Key,
        nx: bool,
    },
    Move {
        key: Key,
        db: i64,
    },
    Type(Key),
    Keys(Vec<u8>),
    DbSize,
    FlushDb,
    FlushAll,
    RandomKey,
    Select(i64),
    Ping(Option<Vec<u8>>),
    Echo(Vec<u8>),
}

impl KeyCommand {
    pub fn parse(parser: &mut CommandParser) -> Result<Option<Self>> {
        let name = parser.name().to_string();
        let command = match name.as_str() {
            "del" | "unlink" => KeyCommand::Del(parser.rest_non_empty()?),
            "exists" => KeyCommand::Exists(parser.rest_non_empty()?),
            "expire" | "pexpire" | "expireat" | "pexpireat" => {
                let key = parser.next_bytes()?;
                let amount = parser.next_i64()?;
                KeyCommand::Expire {
                    key,
                    amount,
                    unit: if name.starts_with('p') { ExpireUnit::Millis } else { ExpireUnit::Seconds },
                    absolute: name.ends_with("at"),
                }
            }
            "ttl" | "pttl" => KeyCommand::Ttl {
                key: parser.next_bytes()?,
                unit: if name == "pttl" { ExpireUnit::Millis } else { ExpireUnit::Seconds },
            },
            "persist" => KeyCommand::Persist(parser.next_bytes()?),
            "rename" | "renamenx" => KeyCommand::Rename {
                src: parser.next_bytes()?,
                dst: parser.next_bytes()?,
                nx: name == "renamenx",
            },
            "move" => KeyCommand::Move {
                key: parser.next_bytes()?,
                db: parser.next_i64()?,
            },
            "type" => KeyCommand::Type(parser.next_bytes()?),
            "keys" => KeyCommand::Keys(parser.next_bytes()?),
            "dbsize" => KeyCommand::DbSize,
            "flushdb" | "flushall" => {
                // ASYNC and SYNC are accepted; flushing is always synchronous
                if !parser.next_if_keyword("ASYNC") {
                    parser.next_if_keyword("SYNC");
                }
                parser.expect_end()?;
                if name == "flushdb" {
                    KeyCommand::FlushDb
                } else {
                    KeyCommand::FlushAll
                }
            }
            "randomkey" => KeyCommand::RandomKey,
            "select" => KeyCommand::Select(parser.next_i64()?),
            "ping" => KeyCommand::Ping(if parser.is_empty() { None } else { Some(parser.next_bytes()?) }),
            "echo" => KeyCommand::Echo(parser.next_bytes()?),
            _ => return Ok(None),
        };
        parser.expect_end_arity()?;
        Ok(Some(command))
    }

    pub fn execute(&self, ctx: &mut ExecContext<'_>) -> Result<RespFrame> {
        match self {
            KeyCommand::Del(keys) => Ok(RespFrame::Integer(ctx.database()?.delete(keys) as i64)),
            KeyCommand::Exists(keys) => Ok(RespFrame::Integer(ctx.database()?.exists(keys) as i64)),
            KeyCommand::Expire { key, amount, unit, absolute } => {
                let ms = match unit {
                    ExpireUnit::Seconds => amount.checked_mul(1000),
                    ExpireUnit::Millis => Some(*amount),
                }
                .ok_or_else(|| CommandError::invalid("invalid expire time"))?;
                let db = ctx.database()?;
                let applied = if *absolute {
                    db.expire_at(key, ms.max(0) as u64)
                } else {
                    db.expire_in(key, ms)
                };
                Ok(RespFrame::boolean(applied))
            }
            KeyCommand::Ttl { key, unit } => {
                let db = ctx.database()?;
                Ok(RespFrame::Integer(match unit {
                    ExpireUnit::Seconds => db.ttl(key),
                    ExpireUnit::Millis => db.pttl(key),
                }))
            }
            KeyCommand::Persist(key) => Ok(RespFrame::boolean(ctx.database()?.persist(key))),
            KeyCommand::Rename { src, dst, nx } => {
                let outcome = ctx.database()?.rename(src, dst.clone(), *nx)?;
                Ok(match (outcome, nx) {
                    (RenameOutcome::Renamed, false) => RespFrame::ok(),
                    (RenameOutcome::Renamed, true) => RespFrame::Integer(1),
                    (RenameOutcome::DestinationExists, _) => RespFrame::Integer(0),
                })
            }
            KeyCommand::Move { key, db } => {
                let target = usize::try_from(*db).map_err(|_| StorageError::InvalidDatabase)?;
                let moved = ctx.keyspace.move_key(key, ctx.db, target)?;
                Ok(RespFrame::boolean(moved))
            }
            KeyCommand::Type(key) => Ok(RespFrame::simple_string(ctx.database()?.key_type(key))),
            KeyCommand::Keys(pattern) => Ok(RespFrame::bulk_array(ctx.database()?.keys(pattern))),
            KeyCommand::DbSize => Ok(RespFrame::Integer(ctx.database()?.dbsize() as i64)),
            KeyCommand::FlushDb => {
                ctx.database()?.flush();
                info!(db = ctx.db, "Database flushed");
                Ok(RespFrame::ok())
            }
            KeyCommand::FlushAll => {
                ctx.keyspace.flush_all();
                info!("All databases flushed");
                Ok(RespFrame::ok())
            }
            KeyCommand::RandomKey => Ok(RespFrame::optional_bulk(ctx.database()?.random_key())),
            KeyCommand::Select(index) => {
                let index = usize::try_from(*index)
                    .ok()
                    .filter(|index| *index < ctx.keyspace.database_count())
                    .ok_or(StorageError::InvalidDatabase)?;
                ctx.db = index;
                Ok(RespFrame::ok())
            }
            KeyCommand::Ping(None) => Ok(RespFrame::simple_string("PONG")),
            KeyCommand::Ping(Some(message)) | KeyCommand::Echo(message) => Ok(RespFrame::bulk_string(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::Config;
    use crate::storage::clock::ManualClock;
    use crate::storage::commands::{Command, ExecMode};
    use crate::storage::engine::Engine;

    struct Harness {
        engine: Engine,
        clock: ManualClock,
        db: usize,
    }

    impl Harness {
        fn new() -> Self {
            let clock = ManualClock::new(10_000);
            let engine = Engine::with_clock(&Config::default(), Arc::new(clock.clone()));
            Harness { engine, clock, db: 0 }
        }

        fn run(&mut self, args: &[&str]) -> Result<RespFrame> {
            let argv: Vec<Vec<u8>> = args.iter().map(|a| a.as_bytes().to_vec()).collect();
            let command = Command::parse(&argv)?;
            let scripts = self.engine.scripts();
            let db = &mut self.db;
            self.engine.run(|keyspace| {
                let mut ctx = ExecContext {
                    keyspace,
                    db: *db,
                    scripts,
                    mode: ExecMode::Normal,
                };
                let reply = command.execute(&mut ctx);
                *db = ctx.db;
                reply
            })
        }
    }

    #[test]
    fn test_del_and_exists() {
        let mut h = Harness::new();
        h.run(&["SET", "a", "1"]).unwrap();
        h.run(&["SET", "b", "2"]).unwrap();
        assert_eq!(h.run(&["EXISTS", "a", "a", "zz"]).unwrap(), RespFrame::Integer(2));
        assert_eq!(h.run(&["UNLINK", "a", "b", "zz"]).unwrap(), RespFrame::Integer(2));
        assert_eq!(h.run(&["EXISTS", "a"]).unwrap(), RespFrame::Integer(0));
        assert!(h.run(&["DEL"]).is_err());
    }

    #[test]
    fn test_expire_ttl_persist() {
        let mut h = Harness::new();
        assert_eq!(h.run(&["EXPIRE", "k", "10"]).unwrap(), RespFrame::Integer(0));
        h.run(&["SET", "k", "v"]).unwrap();
        assert_eq!(h.run(&["TTL", "k"]).unwrap(), RespFrame::Integer(-1));
        assert_eq!(h.run(&["EXPIRE", "k", "10"]).unwrap(), RespFrame::Integer(1));
        assert_eq!(h.run(&["PTTL", "k"]).unwrap(), RespFrame::Integer(10_000));
        h.clock.advance(4_000);
        assert_eq!(h.run(&["TTL", "k"]).unwrap(), RespFrame::Integer(6));
        assert_eq!(h.run(&["PERSIST", "k"]).unwrap(), RespFrame::Integer(1));
        assert_eq!(h.run(&["TTL", "k"]).unwrap(), RespFrame::Integer(-1));

        assert_eq!(h.run(&["PEXPIREAT", "k", "20000"]).unwrap(), RespFrame::Integer(1));
        h.clock.advance(6_000);
        assert_eq!(h.run(&["TTL", "k"]).unwrap(), RespFrame::Integer(-2));
    }

    #[test]
    fn test_non_positive_expire_deletes() {
        let mut h = Harness::new();
        h.run(&["SET", "k", "v"]).unwrap();
        assert_eq!(h.run(&["EXPIRE", "k", "-1"]).unwrap(), RespFrame::Integer(1));
        assert_eq!(h.run(&["EXISTS", "k"]).unwrap(), RespFrame::Integer(0));
        assert!(h.run(&["EXPIRE", "k", "9223372036854775807"]).is_err());
    }

    #[test]
    fn test_rename() {
        let mut h = Harness::new();
        let err = h.run(&["RENAME", "nope", "x"]).unwrap_err();
        assert_eq!(err.to_string(), "ERR no such key");

        h.run(&["SET", "a", "1"]).unwrap();
        h.run(&["SET", "b", "2"]).unwrap();
        assert_eq!(h.run(&["RENAMENX", "a", "b"]).unwrap(), RespFrame::Integer(0));
        assert_eq!(h.run(&["RENAME", "a", "c"]).unwrap(), RespFrame::ok());
        assert_eq!(h.run(&["GET", "c"]).unwrap(), RespFrame::bulk_string("1"));
        assert_eq!(h.run(&["TYPE", "c"]).unwrap(), RespFrame::simple_string("string"));
        assert_eq!(h.run(&["TYPE", "a"]).unwrap(), RespFrame::simple_string("none"));
    }

    #[test]
    fn test_select_and_move() {
        let mut h = Harness::new();
        h.run(&["SET", "k", "v"]).unwrap();
        assert_eq!(h.run(&["MOVE", "k", "1"]).unwrap(), RespFrame::Integer(1));
        assert_eq!(h.run(&["DBSIZE"]).unwrap(), RespFrame::Integer(0));
        assert_eq!(h.run(&["MOVE", "k", "2"]).unwrap(), RespFrame::Integer(0));

        assert_eq!(h.run(&["SELECT", "1"]).unwrap(), RespFrame::ok());
        assert_eq!(h.run(&["GET", "k"]).unwrap(), RespFrame::bulk_string("v"));
        assert!(h.run(&["MOVE", "k", "1"]).is_err());
        let err = h.run(&["SELECT", "16"]).unwrap_err();
        assert_eq!(err.to_string(), "ERR DB index is out of range");
        assert_eq!(h.db, 1);
    }

    #[test]
    fn test_keys_and_flush() {
        let mut h = Harness::new();
        for key in ["user:1", "user:2", "order:1"] {
            h.run(&["SET", key, "x"]).unwrap();
        }
        let reply = h.run(&["KEYS", "user:*"]).unwrap();
        assert_eq!(reply.as_array().map(|keys| keys.len()), Some(2));
        assert!(h.run(&["RANDOMKEY"]).unwrap().as_bytes().is_some());
        assert_eq!(h.run(&["FLUSHDB", "ASYNC"]).unwrap(), RespFrame::ok());
        assert_eq!(h.run(&["RANDOMKEY"]).unwrap(), RespFrame::null_bulk());
        assert!(h.run(&["FLUSHALL", "LATER"]).is_err());
    }

    #[test]
    fn test_ping_echo() {
        let mut h = Harness::new();
        assert_eq!(h.run(&["PING"]).unwrap(), RespFrame::simple_string("PONG"));
        assert_eq!(h.run(&["PING", "hi"]).unwrap(), RespFrame::bulk_string("hi"));
        assert_eq!(h.run(&["ECHO", "x"]).unwrap(), RespFrame::bulk_string("x"));
        assert!(h.run(&["ECHO", "x", "y"]).is_err());
    }
}
