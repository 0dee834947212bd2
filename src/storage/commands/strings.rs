//! String command implementations

use super::{CommandParser, ExecContext};
use crate::error::{CommandError, Result};
use crate::protocol::RespFrame;
use crate::storage::ops::{Expiry, SetCondition, SetOptions};
use crate::storage::Key;

#[derive(Debug, Clone, PartialEq)]
pub enum StringCommand {
    Get(Key),
    /// SET, SETEX and PSETEX
    Set {
        key: Key,
        value: Vec<u8>,
        options: SetOptions,
    },
    SetNx {
        key: Key,
        value: Vec<u8>,
    },
    GetSet {
        key: Key,
        value: Vec<u8>,
    },
    MGet(Vec<Key>),
    MSet(Vec<(Key, Vec<u8>)>),
    MSetNx(Vec<(Key, Vec<u8>)>),
    /// INCR, DECR, INCRBY and DECRBY
    IncrBy {
        key: Key,
        delta: i64,
    },
    IncrByFloat {
        key: Key,
        delta: f64,
    },
    Append {
        key: Key,
        value: Vec<u8>,
    },
    StrLen(Key),
    GetRange {
        key: Key,
        start: i64,
        end: i64,
    },
    SetRange {
        key: Key,
        offset: usize,
        value: Vec<u8>,
    },
}

impl StringCommand {
    pub fn parse(parser: &mut CommandParser) -> Result<Option<Self>> {
        let name = parser.name().to_string();
        let command = match name.as_str() {
            "get" => StringCommand::Get(parser.next_bytes()?),
            "set" => {
                let key = parser.next_bytes()?;
                let value = parser.next_bytes()?;
                let options = parse_set_options(parser)?;
                StringCommand::Set { key, value, options }
            }
            "setex" | "psetex" => {
                let key = parser.next_bytes()?;
                let amount = parser.next_i64()?;
                let value = parser.next_bytes()?;
                if amount <= 0 {
                    return Err(CommandError::invalid(format!("invalid expire time in '{name}' command")).into());
                }
                let expiry = if name == "setex" {
                    Expiry::Ex(amount as u64)
                } else {
                    Expiry::Px(amount as u64)
                };
                StringCommand::Set {
                    key,
                    value,
                    options: SetOptions {
                        expiry: Some(expiry),
                        ..SetOptions::default()
                    },
                }
            }
            "setnx" => StringCommand::SetNx {
                key: parser.next_bytes()?,
                value: parser.next_bytes()?,
            },
            "getset" => StringCommand::GetSet {
                key: parser.next_bytes()?,
                value: parser.next_bytes()?,
            },
            "mget" => StringCommand::MGet(parser.rest_non_empty()?),
            "mset" => StringCommand::MSet(parser.rest_pairs()?),
            "msetnx" => StringCommand::MSetNx(parser.rest_pairs()?),
            "incr" | "decr" => {
                let key = parser.next_bytes()?;
                StringCommand::IncrBy {
                    key,
                    delta: if name == "incr" { 1 } else { -1 },
                }
            }
            "incrby" => StringCommand::IncrBy {
                key: parser.next_bytes()?,
                delta: parser.next_i64()?,
            },
            "decrby" => {
                let key = parser.next_bytes()?;
                let delta = parser.next_i64()?.checked_neg().ok_or(CommandError::IntegerOverflow)?;
                StringCommand::IncrBy { key, delta }
            }
            "incrbyfloat" => StringCommand::IncrByFloat {
                key: parser.next_bytes()?,
                delta: parser.next_f64()?,
            },
            "append" => StringCommand::Append {
                key: parser.next_bytes()?,
                value: parser.next_bytes()?,
            },
            "strlen" => StringCommand::StrLen(parser.next_bytes()?),
            "getrange" | "substr" => StringCommand::GetRange {
                key: parser.next_bytes()?,
                start: parser.next_i64()?,
                end: parser.next_i64()?,
            },
            "setrange" => {
                let key = parser.next_bytes()?;
                let offset = usize::try_from(parser.next_i64()?)
                    .map_err(|_| CommandError::invalid("offset is out of range"))?;
                StringCommand::SetRange {
                    key,
                    offset,
                    value: parser.next_bytes()?,
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
            StringCommand::Get(key) => Ok(RespFrame::optional_bulk(db.get_string(key)?)),
            StringCommand::Set { key, value, options } => {
                let outcome = db.set_string(key.clone(), value.clone(), options)?;
                Ok(if options.get {
                    RespFrame::optional_bulk(outcome.previous)
                } else if outcome.written {
                    RespFrame::ok()
                } else {
                    RespFrame::null_bulk()
                })
            }
            StringCommand::SetNx { key, value } => {
                let options = SetOptions {
                    condition: Some(SetCondition::Nx),
                    ..SetOptions::default()
                };
                let outcome = db.set_string(key.clone(), value.clone(), &options)?;
                Ok(RespFrame::boolean(outcome.written))
            }
            StringCommand::GetSet { key, value } => {
                Ok(RespFrame::optional_bulk(db.get_set(key.clone(), value.clone())?))
            }
            StringCommand::MGet(keys) => Ok(RespFrame::array(
                db.mget(keys).into_iter().map(RespFrame::optional_bulk).collect(),
            )),
            StringCommand::MSet(pairs) => {
                db.mset(pairs.clone());
                Ok(RespFrame::ok())
            }
            StringCommand::MSetNx(pairs) => Ok(RespFrame::boolean(db.msetnx(pairs.clone()))),
            StringCommand::IncrBy { key, delta } => Ok(RespFrame::Integer(db.incr_by(key, *delta)?)),
            StringCommand::IncrByFloat { key, delta } => Ok(RespFrame::double(db.incr_by_float(key, *delta)?)),
            StringCommand::Append { key, value } => Ok(RespFrame::Integer(db.append(key, value)? as i64)),
            StringCommand::StrLen(key) => Ok(RespFrame::Integer(db.strlen(key)? as i64)),
            StringCommand::GetRange { key, start, end } => {
                Ok(RespFrame::bulk_string(db.get_range(key, *start, *end)?))
            }
            StringCommand::SetRange { key, offset, value } => {
                Ok(RespFrame::Integer(db.set_range(key, *offset, value)? as i64))
            }
        }
    }
}

/// Trailing options of SET, in any order
fn parse_set_options(parser: &mut CommandParser) -> Result<SetOptions> {
    let mut options = SetOptions::default();
    while let Some(keyword) = parser.peek_keyword() {
        parser.next_bytes()?;
        match keyword.as_str() {
            "NX" | "XX" => {
                if options.condition.is_some() {
                    return Err(CommandError::SyntaxError.into());
                }
                options.condition = Some(if keyword == "NX" { SetCondition::Nx } else { SetCondition::Xx });
            }
            "GET" => options.get = true,
            "KEEPTTL" => set_expiry(&mut options, Expiry::KeepTtl)?,
            "EX" | "PX" | "EXAT" | "PXAT" => {
                let amount = parser.next_i64().map_err(|_| CommandError::SyntaxError)?;
                if amount <= 0 {
                    return Err(CommandError::invalid("invalid expire time in 'set' command").into());
                }
                let amount = amount as u64;
                let expiry = match keyword.as_str() {
                    "EX" => Expiry::Ex(amount),
                    "PX" => Expiry::Px(amount),
                    "EXAT" => Expiry::ExAt(amount),
                    _ => Expiry::PxAt(amount),
                };
                set_expiry(&mut options, expiry)?;
            }
            _ => return Err(CommandError::SyntaxError.into()),
        }
    }
    Ok(options)
}

fn set_expiry(options: &mut SetOptions, expiry: Expiry) -> Result<()> {
    if options.expiry.is_some() {
        return Err(CommandError::SyntaxError.into());
    }
    options.expiry = Some(expiry);
    Ok(())
}
