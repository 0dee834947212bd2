//! List command implementations

use std::time::Duration;

use super::{nothing_served, BlockingRequest, CommandParser, ExecContext};
use crate::error::{CommandError, Result};
use crate::protocol::RespFrame;
use crate::storage::ops::ListEnd;
use crate::storage::Key;

#[derive(Debug, Clone, PartialEq)]
pub enum ListCommand {
    /// LPUSH, RPUSH, LPUSHX and RPUSHX
    Push {
        key: Key,
        elements: Vec<Vec<u8>>,
        end: ListEnd,
        only_if_exists: bool,
    },
    /// LPOP and RPOP; without a count the reply is a single element
    Pop {
        key: Key,
        end: ListEnd,
        count: Option<usize>,
    },
    Len(Key),
    Range {
        key: Key,
        start: i64,
        stop: i64,
    },
    Index {
        key: Key,
        index: i64,
    },
    Set {
        key: Key,
        index: i64,
        element: Vec<u8>,
    },
    Insert {
        key: Key,
        before: bool,
        pivot: Vec<u8>,
        element: Vec<u8>,
    },
    Rem {
        key: Key,
        count: i64,
        element: Vec<u8>,
    },
    Trim {
        key: Key,
        start: i64,
        stop: i64,
    },
    /// LMOVE and RPOPLPUSH
    Move {
        src: Key,
        dst: Key,
        from: ListEnd,
        to: ListEnd,
    },
    /// BLPOP and BRPOP
    BlockingPop {
        keys: Vec<Key>,
        end: ListEnd,
        timeout: Option<Duration>,
    },
}

impl ListCommand {
    pub fn parse(parser: &mut CommandParser) -> Result<Option<Self>> {
        let name = parser.name().to_string();
        let command = match name.as_str() {
            "lpush" | "rpush" | "lpushx" | "rpushx" => {
                let key = parser.next_bytes()?;
                ListCommand::Push {
                    key,
                    elements: parser.rest_non_empty()?,
                    end: if name.starts_with('l') { ListEnd::Left } else { ListEnd::Right },
                    only_if_exists: name.ends_with('x'),
                }
            }
            "lpop" | "rpop" => {
                let key = parser.next_bytes()?;
                let count = if parser.is_empty() { None } else { Some(parser.next_usize()?) };
                ListCommand::Pop {
                    key,
                    end: if name == "lpop" { ListEnd::Left } else { ListEnd::Right },
                    count,
                }
            }
            "llen" => ListCommand::Len(parser.next_bytes()?),
            "lrange" => ListCommand::Range {
                key: parser.next_bytes()?,
                start: parser.next_i64()?,
                stop: parser.next_i64()?,
            },
            "lindex" => ListCommand::Index {
                key: parser.next_bytes()?,
                index: parser.next_i64()?,
            },
            "lset" => ListCommand::Set {
                key: parser.next_bytes()?,
                index: parser.next_i64()?,
                element: parser.next_bytes()?,
            },
            "linsert" => {
                let key = parser.next_bytes()?;
                let before = if parser.next_if_keyword("BEFORE") {
                    true
                } else if parser.next_if_keyword("AFTER") {
                    false
                } else {
                    return Err(CommandError::SyntaxError.into());
                };
                ListCommand::Insert {
                    key,
                    before,
                    pivot: parser.next_bytes()?,
                    element: parser.next_bytes()?,
                }
            }
            "lrem" => ListCommand::Rem {
                key: parser.next_bytes()?,
                count: parser.next_i64()?,
                element: parser.next_bytes()?,
            },
            "ltrim" => ListCommand::Trim {
                key: parser.next_bytes()?,
                start: parser.next_i64()?,
                stop: parser.next_i64()?,
            },
            "lmove" => ListCommand::Move {
                src: parser.next_bytes()?,
                dst: parser.next_bytes()?,
                from: ListEnd::parse(&parser.next_bytes()?)?,
                to: ListEnd::parse(&parser.next_bytes()?)?,
            },
            "rpoplpush" => ListCommand::Move {
                src: parser.next_bytes()?,
                dst: parser.next_bytes()?,
                from: ListEnd::Right,
                to: ListEnd::Left,
            },
            "blpop" | "brpop" => {
                if parser.remaining() < 2 {
                    return Err(parser.arity_error());
                }
                let keys = parser.take(parser.remaining() - 1)?;
                ListCommand::BlockingPop {
                    keys,
                    end: if name == "blpop" { ListEnd::Left } else { ListEnd::Right },
                    timeout: parser.next_timeout_secs()?,
                }
            }
            _ => return Ok(None),
        };
        parser.expect_end_arity()?;
        Ok(Some(command))
    }

    pub fn execute(&self, ctx: &mut ExecContext<'_>) -> Result<RespFrame> {
        let db = ctx.database()?;
        match self {
            ListCommand::Push { key, elements, end, only_if_exists } => {
                let len = db.push(key, elements.clone(), *end, *only_if_exists)?;
                Ok(RespFrame::Integer(len as i64))
            }
            ListCommand::Pop { key, end, count } => {
                let popped = db.pop(key, count.unwrap_or(1), *end)?;
                Ok(match (popped, count) {
                    (Some(items), Some(_)) => RespFrame::bulk_array(items),
                    (None, Some(_)) => RespFrame::null_array(),
                    (Some(items), None) => RespFrame::optional_bulk(items.into_iter().next()),
                    (None, None) => RespFrame::null_bulk(),
                })
            }
            ListCommand::Len(key) => Ok(RespFrame::Integer(db.llen(key)? as i64)),
            ListCommand::Range { key, start, stop } => Ok(RespFrame::bulk_array(db.lrange(key, *start, *stop)?)),
            ListCommand::Index { key, index } => Ok(RespFrame::optional_bulk(db.lindex(key, *index)?)),
            ListCommand::Set { key, index, element } => {
                db.lset(key, *index, element.clone())?;
                Ok(RespFrame::ok())
            }
            ListCommand::Insert { key, before, pivot, element } => {
                Ok(RespFrame::Integer(db.linsert(key, *before, pivot, element.clone())?))
            }
            ListCommand::Rem { key, count, element } => Ok(RespFrame::Integer(db.lrem(key, *count, element)? as i64)),
            ListCommand::Trim { key, start, stop } => {
                db.ltrim(key, *start, *stop)?;
                Ok(RespFrame::ok())
            }
            ListCommand::Move { src, dst, from, to } => Ok(RespFrame::optional_bulk(db.lmove(src, dst, *from, *to)?)),
            ListCommand::BlockingPop { .. } => self.try_serve(ctx).map(nothing_served),
        }
    }

    pub fn blocking_request(&self) -> Option<BlockingRequest> {
        match self {
            ListCommand::BlockingPop { keys, timeout, .. } => Some(BlockingRequest {
                keys: keys.clone(),
                timeout: *timeout,
            }),
            _ => None,
        }
    }

    /// Pop from the first non-empty key, replying `[key, element]`
    pub fn try_serve(&self, ctx: &mut ExecContext<'_>) -> Result<Option<RespFrame>> {
        let ListCommand::BlockingPop { keys, end, .. } = self else {
            return self.execute(ctx).map(Some);
        };
        let db = ctx.database()?;
        for key in keys {
            if let Some(element) = db.pop(key, 1, *end)?.and_then(|items| items.into_iter().next()) {
                return Ok(Some(RespFrame::bulk_array([key.clone(), element])));
            }
        }
        Ok(None)
    }
}
