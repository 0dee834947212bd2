//! Set command implementations

use super::{CommandParser, ExecContext};
use crate::error::Result;
use crate::protocol::RespFrame;
use crate::storage::ops::SetAlgebra;
use crate::storage::Key;

#[derive(Debug, Clone, PartialEq)]
pub enum SetCommand {
    Add {
        key: Key,
        members: Vec<Vec<u8>>,
    },
    Rem {
        key: Key,
        members: Vec<Vec<u8>>,
    },
    Members(Key),
    IsMember {
        key: Key,
        member: Vec<u8>,
    },
    Card(Key),
    Move {
        src: Key,
        dst: Key,
        member: Vec<u8>,
    },
    /// SINTER, SUNION and SDIFF
    Algebra {
        op: SetAlgebra,
        keys: Vec<Key>,
    },
    /// SINTERSTORE, SUNIONSTORE and SDIFFSTORE
    AlgebraStore {
        op: SetAlgebra,
        dst: Key,
        keys: Vec<Key>,
    },
    Pop {
        key: Key,
        count: Option<usize>,
    },
    RandMember {
        key: Key,
        count: Option<i64>,
    },
}

impl SetCommand {
    pub fn parse(parser: &mut CommandParser) -> Result<Option<Self>> {
        let name = parser.name().to_string();
        let command = match name.as_str() {
            "sadd" => SetCommand::Add {
                key: parser.next_bytes()?,
                members: parser.rest_non_empty()?,
            },
            "srem" => SetCommand::Rem {
                key: parser.next_bytes()?,
                members: parser.rest_non_empty()?,
            },
            "smembers" => SetCommand::Members(parser.next_bytes()?),
            "sismember" => SetCommand::IsMember {
                key: parser.next_bytes()?,
                member: parser.next_bytes()?,
            },
            "scard" => SetCommand::Card(parser.next_bytes()?),
            "smove" => SetCommand::Move {
                src: parser.next_bytes()?,
                dst: parser.next_bytes()?,
                member: parser.next_bytes()?,
            },
            "sinter" | "sunion" | "sdiff" => SetCommand::Algebra {
                op: algebra(&name),
                keys: parser.rest_non_empty()?,
            },
            "sinterstore" | "sunionstore" | "sdiffstore" => SetCommand::AlgebraStore {
                op: algebra(&name),
                dst: parser.next_bytes()?,
                keys: parser.rest_non_empty()?,
            },
            "spop" => {
                let key = parser.next_bytes()?;
                let count = if parser.is_empty() { None } else { Some(parser.next_usize()?) };
                SetCommand::Pop { key, count }
            }
            "srandmember" => {
                let key = parser.next_bytes()?;
                let count = if parser.is_empty() { None } else { Some(parser.next_i64()?) };
                SetCommand::RandMember { key, count }
            }
            _ => return Ok(None),
        };
        parser.expect_end_arity()?;
        Ok(Some(command))
    }

    pub fn execute(&self, ctx: &mut ExecContext<'_>) -> Result<RespFrame> {
        let db = ctx.database()?;
        match self {
            SetCommand::Add { key, members } => Ok(RespFrame::Integer(db.sadd(key, members.clone())? as i64)),
            SetCommand::Rem { key, members } => Ok(RespFrame::Integer(db.srem(key, members)? as i64)),
            SetCommand::Members(key) => Ok(RespFrame::bulk_array(db.smembers(key)?)),
            SetCommand::IsMember { key, member } => Ok(RespFrame::boolean(db.sismember(key, member)?)),
            SetCommand::Card(key) => Ok(RespFrame::Integer(db.scard(key)? as i64)),
            SetCommand::Move { src, dst, member } => Ok(RespFrame::boolean(db.smove(src, dst, member)?)),
            SetCommand::Algebra { op, keys } => {
                let mut members: Vec<Vec<u8>> = db.set_algebra(*op, keys)?.into_iter().collect();
                members.sort();
                Ok(RespFrame::bulk_array(members))
            }
            SetCommand::AlgebraStore { op, dst, keys } => {
                Ok(RespFrame::Integer(db.set_algebra_store(*op, dst.clone(), keys)? as i64))
            }
            SetCommand::Pop { key, count: None } => {
                Ok(RespFrame::optional_bulk(db.spop(key, 1)?.into_iter().next()))
            }
            SetCommand::Pop { key, count: Some(count) } => Ok(RespFrame::bulk_array(db.spop(key, *count)?)),
            SetCommand::RandMember { key, count: None } => {
                Ok(RespFrame::optional_bulk(db.srandmember(key, 1)?.into_iter().next()))
            }
            SetCommand::RandMember { key, count: Some(count) } => {
                Ok(RespFrame::bulk_array(db.srandmember(key, *count)?))
            }
        }
    }
}

fn algebra(name: &str) -> SetAlgebra {
    if name.starts_with("sinter") {
        SetAlgebra::Inter
    } else if name.starts_with("sunion") {
        SetAlgebra::Union
    } else {
        SetAlgebra::Diff
    }
}
