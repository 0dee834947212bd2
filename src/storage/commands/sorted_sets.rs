//! Sorted set command implementations

use std::time::Duration;

use super::{nothing_served, scored_reply, BlockingRequest, CommandParser, ExecContext};
use crate::error::{CommandError, Result};
use crate::protocol::RespFrame;
use crate::storage::ops::{
    Aggregate, RangeLimit, StoreOptions, ZAddComparison, ZAddCondition, ZAddOptions, ZAddOutcome, ZSetAlgebra,
};
use crate::storage::sorted_set::{parse_score, LexRange, ScoreRange};
use crate::storage::Key;

/// Which index a range query walks
#[derive(Debug, Clone, PartialEq)]
pub enum RangeBy {
    Rank { start: i64, stop: i64 },
    Score(ScoreRange),
    Lex(LexRange),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SortedSetCommand {
    Add {
        key: Key,
        options: ZAddOptions,
        pairs: Vec<(f64, Vec<u8>)>,
    },
    IncrBy {
        key: Key,
        delta: f64,
        member: Vec<u8>,
    },
    Rem {
        key: Key,
        members: Vec<Vec<u8>>,
    },
    Score {
        key: Key,
        member: Vec<u8>,
    },
    Card(Key),
    Count {
        key: Key,
        range: ScoreRange,
    },
    LexCount {
        key: Key,
        range: LexRange,
    },
    Rank {
        key: Key,
        member: Vec<u8>,
        reverse: bool,
    },
    /// ZRANGE, ZREVRANGE and the BYSCORE / BYLEX forms
    Range {
        key: Key,
        by: RangeBy,
        reverse: bool,
        with_scores: bool,
        limit: Option<RangeLimit>,
    },
    /// ZPOPMIN and ZPOPMAX
    Pop {
        key: Key,
        count: usize,
        max: bool,
    },
    /// ZREMRANGEBYRANK, ZREMRANGEBYSCORE and ZREMRANGEBYLEX
    RemRange {
        key: Key,
        by: RangeBy,
    },
    /// ZUNIONSTORE and ZINTERSTORE
    Store {
        op: ZSetAlgebra,
        dst: Key,
        keys: Vec<Key>,
        options: StoreOptions,
    },
    /// BZPOPMIN and BZPOPMAX
    BlockingPop {
        keys: Vec<Key>,
        max: bool,
        timeout: Option<Duration>,
    },
}

impl SortedSetCommand {
    pub fn parse(parser: &mut CommandParser) -> Result<Option<Self>> {
        let name = parser.name().to_string();
        let command = match name.as_str() {
            "zadd" => {
                let key = parser.next_bytes()?;
                let options = parse_zadd_options(parser)?;
                if parser.is_empty() || parser.remaining() % 2 != 0 {
                    return Err(CommandError::SyntaxError.into());
                }
                if options.incr && parser.remaining() > 2 {
                    return Err(CommandError::invalid("INCR option supports a single increment-element pair").into());
                }
                let mut pairs = Vec::with_capacity(parser.remaining() / 2);
                while !parser.is_empty() {
                    let score = parser.next_f64()?;
                    pairs.push((score, parser.next_bytes()?));
                }
                SortedSetCommand::Add { key, options, pairs }
            }
            "zincrby" => SortedSetCommand::IncrBy {
                key: parser.next_bytes()?,
                delta: parser.next_f64()?,
                member: parser.next_bytes()?,
            },
            "zrem" => SortedSetCommand::Rem {
                key: parser.next_bytes()?,
                members: parser.rest_non_empty()?,
            },
            "zscore" => SortedSetCommand::Score {
                key: parser.next_bytes()?,
                member: parser.next_bytes()?,
            },
            "zcard" => SortedSetCommand::Card(parser.next_bytes()?),
            "zcount" => {
                let key = parser.next_bytes()?;
                let (min, max) = (parser.next_bytes()?, parser.next_bytes()?);
                SortedSetCommand::Count {
                    key,
                    range: ScoreRange::parse(&min, &max)?,
                }
            }
            "zlexcount" => {
                let key = parser.next_bytes()?;
                let (min, max) = (parser.next_bytes()?, parser.next_bytes()?);
                SortedSetCommand::LexCount {
                    key,
                    range: LexRange::parse(&min, &max)?,
                }
            }
            "zrank" | "zrevrank" => SortedSetCommand::Rank {
                key: parser.next_bytes()?,
                member: parser.next_bytes()?,
                reverse: name == "zrevrank",
            },
            "zrange" | "zrevrange" => {
                let key = parser.next_bytes()?;
                let start = parser.next_i64()?;
                let stop = parser.next_i64()?;
                let with_scores = parser.next_if_keyword("WITHSCORES");
                parser.expect_end()?;
                SortedSetCommand::Range {
                    key,
                    by: RangeBy::Rank { start, stop },
                    reverse: name == "zrevrange",
                    with_scores,
                    limit: None,
                }
            }
            "zrangebyscore" | "zrevrangebyscore" | "zrangebylex" | "zrevrangebylex" => {
                let reverse = name.starts_with("zrev");
                let key = parser.next_bytes()?;
                let first = parser.next_bytes()?;
                let second = parser.next_bytes()?;
                // The reverse forms take the upper bound first
                let (min, max) = if reverse { (second, first) } else { (first, second) };
                let by_lex = name.ends_with("lex");
                let by = if by_lex {
                    RangeBy::Lex(LexRange::parse(&min, &max)?)
                } else {
                    RangeBy::Score(ScoreRange::parse(&min, &max)?)
                };
                let (with_scores, limit) = parse_range_options(parser, !by_lex)?;
                SortedSetCommand::Range {
                    key,
                    by,
                    reverse,
                    with_scores,
                    limit,
                }
            }
            "zpopmin" | "zpopmax" => {
                let key = parser.next_bytes()?;
                let count = if parser.is_empty() { 1 } else { parser.next_usize()? };
                SortedSetCommand::Pop {
                    key,
                    count,
                    max: name == "zpopmax",
                }
            }
            "zremrangebyrank" => SortedSetCommand::RemRange {
                key: parser.next_bytes()?,
                by: RangeBy::Rank {
                    start: parser.next_i64()?,
                    stop: parser.next_i64()?,
                },
            },
            "zremrangebyscore" | "zremrangebylex" => {
                let key = parser.next_bytes()?;
                let (min, max) = (parser.next_bytes()?, parser.next_bytes()?);
                let by = if name == "zremrangebylex" {
                    RangeBy::Lex(LexRange::parse(&min, &max)?)
                } else {
                    RangeBy::Score(ScoreRange::parse(&min, &max)?)
                };
                SortedSetCommand::RemRange { key, by }
            }
            "zunionstore" | "zinterstore" => {
                let dst = parser.next_bytes()?;
                let numkeys = parser.next_i64()?;
                if numkeys < 1 {
                    return Err(CommandError::invalid(format!("at least 1 input key is needed for '{name}' command")).into());
                }
                let keys = parser.take(numkeys as usize)?;
                let options = parse_store_options(parser, keys.len())?;
                SortedSetCommand::Store {
                    op: if name == "zunionstore" { ZSetAlgebra::Union } else { ZSetAlgebra::Inter },
                    dst,
                    keys,
                    options,
                }
            }
            "bzpopmin" | "bzpopmax" => {
                if parser.remaining() < 2 {
                    return Err(parser.arity_error());
                }
                let keys = parser.take(parser.remaining() - 1)?;
                SortedSetCommand::BlockingPop {
                    keys,
                    max: name == "bzpopmax",
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
            SortedSetCommand::Add { key, options, pairs } => Ok(match db.zadd(key, options, pairs.clone())? {
                ZAddOutcome::Count(n) => RespFrame::Integer(n as i64),
                ZAddOutcome::Score(Some(score)) => RespFrame::double(score),
                ZAddOutcome::Score(None) => RespFrame::null_bulk(),
            }),
            SortedSetCommand::IncrBy { key, delta, member } => {
                Ok(RespFrame::double(db.zincrby(key, *delta, member.clone())?))
            }
            SortedSetCommand::Rem { key, members } => Ok(RespFrame::Integer(db.zrem(key, members)? as i64)),
            SortedSetCommand::Score { key, member } => Ok(match db.zscore(key, member)? {
                Some(score) => RespFrame::double(score),
                None => RespFrame::null_bulk(),
            }),
            SortedSetCommand::Card(key) => Ok(RespFrame::Integer(db.zcard(key)? as i64)),
            SortedSetCommand::Count { key, range } => Ok(RespFrame::Integer(db.zcount(key, range)? as i64)),
            SortedSetCommand::LexCount { key, range } => Ok(RespFrame::Integer(db.zlexcount(key, range)? as i64)),
            SortedSetCommand::Rank { key, member, reverse } => Ok(match db.zrank(key, member, *reverse)? {
                Some(rank) => RespFrame::Integer(rank as i64),
                None => RespFrame::null_bulk(),
            }),
            SortedSetCommand::Range {
                key,
                by,
                reverse,
                with_scores,
                limit,
            } => {
                let items = match by {
                    RangeBy::Rank { start, stop } => db.zrange(key, *start, *stop, *reverse)?,
                    RangeBy::Score(range) => db.zrange_by_score(key, range, *reverse, *limit)?,
                    RangeBy::Lex(range) => db.zrange_by_lex(key, range, *reverse, *limit)?,
                };
                Ok(scored_reply(items, *with_scores))
            }
            SortedSetCommand::Pop { key, count, max } => Ok(scored_reply(db.zpop(key, *count, *max)?, true)),
            SortedSetCommand::RemRange { key, by } => {
                let removed = match by {
                    RangeBy::Rank { start, stop } => db.zremrange_by_rank(key, *start, *stop)?,
                    RangeBy::Score(range) => db.zremrange_by_score(key, range)?,
                    RangeBy::Lex(range) => db.zremrange_by_lex(key, range)?,
                };
                Ok(RespFrame::Integer(removed as i64))
            }
            SortedSetCommand::Store { op, dst, keys, options } => {
                Ok(RespFrame::Integer(db.zstore(*op, dst.clone(), keys, options)? as i64))
            }
            SortedSetCommand::BlockingPop { .. } => self.try_serve(ctx).map(nothing_served),
        }
    }

    pub fn blocking_request(&self) -> Option<BlockingRequest> {
        match self {
            SortedSetCommand::BlockingPop { keys, timeout, .. } => Some(BlockingRequest {
                keys: keys.clone(),
                timeout: *timeout,
            }),
            _ => None,
        }
    }

    /// Pop from the first non-empty key, replying `[key, member, score]`
    pub fn try_serve(&self, ctx: &mut ExecContext<'_>) -> Result<Option<RespFrame>> {
        let SortedSetCommand::BlockingPop { keys, max, .. } = self else {
            return self.execute(ctx).map(Some);
        };
        let db = ctx.database()?;
        for key in keys {
            if let Some((member, score)) = db.zpop(key, 1, *max)?.into_iter().next() {
                return Ok(Some(RespFrame::array(vec![
                    RespFrame::bulk_string(key),
                    RespFrame::bulk_string(member),
                    RespFrame::double(score),
                ])));
            }
        }
        Ok(None)
    }
}

fn parse_zadd_options(parser: &mut CommandParser) -> Result<ZAddOptions> {
    let mut options = ZAddOptions::default();
    let (mut nx, mut xx) = (false, false);
    loop {
        if parser.next_if_keyword("NX") {
            options.condition = Some(ZAddCondition::Nx);
            nx = true;
        } else if parser.next_if_keyword("XX") {
            options.condition = Some(ZAddCondition::Xx);
            xx = true;
        } else if parser.next_if_keyword("GT") {
            options.comparison = Some(ZAddComparison::Gt);
        } else if parser.next_if_keyword("LT") {
            options.comparison = Some(ZAddComparison::Lt);
        } else if parser.next_if_keyword("CH") {
            options.ch = true;
        } else if parser.next_if_keyword("INCR") {
            options.incr = true;
        } else {
            break;
        }
    }
    if nx && xx {
        return Err(CommandError::invalid("XX and NX options at the same time are not compatible").into());
    }
    if nx && options.comparison.is_some() {
        return Err(CommandError::invalid("GT, LT, and/or NX options at the same time are not compatible").into());
    }
    Ok(options)
}

/// WITHSCORES and LIMIT of the BYSCORE / BYLEX range forms
fn parse_range_options(parser: &mut CommandParser, allow_scores: bool) -> Result<(bool, Option<RangeLimit>)> {
    let mut with_scores = false;
    let mut limit = None;
    while !parser.is_empty() {
        if allow_scores && parser.next_if_keyword("WITHSCORES") {
            with_scores = true;
        } else if parser.next_if_keyword("LIMIT") {
            let offset = parser.next_i64().map_err(|_| CommandError::SyntaxError)?;
            let count = parser.next_i64().map_err(|_| CommandError::SyntaxError)?;
            limit = Some(RangeLimit { offset, count });
        } else {
            return Err(CommandError::SyntaxError.into());
        }
    }
    Ok((with_scores, limit))
}

/// WEIGHTS and AGGREGATE of ZUNIONSTORE / ZINTERSTORE
fn parse_store_options(parser: &mut CommandParser, numkeys: usize) -> Result<StoreOptions> {
    let mut options = StoreOptions::default();
    while !parser.is_empty() {
        if parser.next_if_keyword("WEIGHTS") {
            options.weights = parser
                .take(numkeys)?
                .iter()
                .map(|weight| parse_score(weight).ok_or_else(|| CommandError::invalid("weight value is not a float")))
                .collect::<std::result::Result<_, _>>()?;
        } else if parser.next_if_keyword("AGGREGATE") {
            options.aggregate = Aggregate::parse(&parser.next_bytes().map_err(|_| CommandError::SyntaxError)?)?;
        } else {
            return Err(CommandError::SyntaxError.into());
        }
    }
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::ErrorKind;
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

    fn bulks(items: &[&str]) -> RespFrame {
        RespFrame::bulk_array(items.iter().map(|s| s.as_bytes()))
    }

    #[test]
    fn test_zadd_counts_new_members_once() {
        let engine = Engine::new(&Config::default());
        assert_eq!(run(&engine, &["ZADD", "z", "1", "a", "2", "b"]).unwrap(), RespFrame::Integer(2));
        assert_eq!(run(&engine, &["ZADD", "z", "5", "a"]).unwrap(), RespFrame::Integer(0));
        assert_eq!(run(&engine, &["ZADD", "z", "CH", "6", "a", "3", "c"]).unwrap(), RespFrame::Integer(2));
        assert_eq!(run(&engine, &["ZCARD", "z"]).unwrap(), RespFrame::Integer(3));
        assert_eq!(run(&engine, &["ZADD", "z", "INCR", "4", "b"]).unwrap(), RespFrame::bulk_string("6"));
        assert_eq!(run(&engine, &["ZADD", "z", "NX", "INCR", "1", "b"]).unwrap(), RespFrame::null_bulk());
        assert!(run(&engine, &["ZADD", "z", "INCR", "1", "a", "2", "b"]).is_err());
        assert!(run(&engine, &["ZADD", "z", "1"]).is_err());
        assert!(run(&engine, &["ZADD", "z", "NX", "XX", "1", "a"]).is_err());
        assert!(run(&engine, &["ZADD", "z", "NX", "GT", "1", "a"]).is_err());
        assert!(run(&engine, &["ZADD", "z", "x", "a"]).is_err());
    }

    #[test]
    fn test_score_ties_order_by_member() {
        let engine = Engine::new(&Config::default());
        run(&engine, &["ZADD", "z", "1", "b", "1", "a", "0", "c"]).unwrap();
        assert_eq!(run(&engine, &["ZRANGEBYSCORE", "z", "-inf", "+inf"]).unwrap(), bulks(&["c", "a", "b"]));
        assert_eq!(run(&engine, &["ZREVRANGE", "z", "0", "-1"]).unwrap(), bulks(&["b", "a", "c"]));
        assert_eq!(
            run(&engine, &["ZRANGE", "z", "0", "0", "WITHSCORES"]).unwrap(),
            bulks(&["c", "0"])
        );
        assert_eq!(run(&engine, &["ZRANK", "z", "b"]).unwrap(), RespFrame::Integer(2));
        assert_eq!(run(&engine, &["ZREVRANK", "z", "b"]).unwrap(), RespFrame::Integer(0));
        assert_eq!(run(&engine, &["ZRANK", "z", "zz"]).unwrap(), RespFrame::null_bulk());
    }

    #[test]
    fn test_score_ranges() {
        let engine = Engine::new(&Config::default());
        run(&engine, &["ZADD", "z", "1", "a", "2", "b", "3", "c", "4", "d"]).unwrap();
        assert_eq!(run(&engine, &["ZRANGEBYSCORE", "z", "(1", "3"]).unwrap(), bulks(&["b", "c"]));
        assert_eq!(
            run(&engine, &["ZREVRANGEBYSCORE", "z", "+inf", "2", "LIMIT", "1", "2"]).unwrap(),
            bulks(&["c", "b"])
        );
        assert_eq!(
            run(&engine, &["ZRANGEBYSCORE", "z", "4", "4", "WITHSCORES"]).unwrap(),
            bulks(&["d", "4"])
        );
        assert_eq!(run(&engine, &["ZCOUNT", "z", "2", "(4"]).unwrap(), RespFrame::Integer(2));
        assert!(run(&engine, &["ZRANGEBYSCORE", "z", "x", "4"]).is_err());
        assert!(run(&engine, &["ZRANGEBYSCORE", "z", "1", "4", "LIMIT", "1"]).is_err());
    }

    #[test]
    fn test_lex_ranges() {
        let engine = Engine::new(&Config::default());
        run(&engine, &["ZADD", "z", "0", "a", "0", "b", "0", "c", "0", "d"]).unwrap();
        assert_eq!(run(&engine, &["ZRANGEBYLEX", "z", "[b", "(d"]).unwrap(), bulks(&["b", "c"]));
        assert_eq!(run(&engine, &["ZREVRANGEBYLEX", "z", "+", "-", "LIMIT", "0", "1"]).unwrap(), bulks(&["d"]));
        assert_eq!(run(&engine, &["ZLEXCOUNT", "z", "-", "+"]).unwrap(), RespFrame::Integer(4));
        let err = run(&engine, &["ZRANGEBYLEX", "z", "b", "d"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(run(&engine, &["ZRANGEBYLEX", "z", "-", "+", "WITHSCORES"]).is_err());
        assert_eq!(run(&engine, &["ZREMRANGEBYLEX", "z", "[a", "[b"]).unwrap(), RespFrame::Integer(2));
    }

    #[test]
    fn test_remrange_by_rank_rejects_inverted_range() {
        let engine = Engine::new(&Config::default());
        run(&engine, &["ZADD", "z", "1", "a", "2", "b", "3", "c"]).unwrap();
        let err = run(&engine, &["ZREMRANGEBYRANK", "z", "3", "0"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(run(&engine, &["ZREMRANGEBYRANK", "z", "0", "0"]).unwrap(), RespFrame::Integer(1));
        assert_eq!(run(&engine, &["ZREMRANGEBYSCORE", "z", "-inf", "2"]).unwrap(), RespFrame::Integer(1));
    }

    #[test]
    fn test_pop() {
        let engine = Engine::new(&Config::default());
        assert_eq!(run(&engine, &["ZPOPMIN", "z"]).unwrap(), RespFrame::array(vec![]));
        run(&engine, &["ZADD", "z", "1", "a", "2", "b", "3", "c"]).unwrap();
        assert_eq!(run(&engine, &["ZPOPMAX", "z", "2"]).unwrap(), bulks(&["c", "3", "b", "2"]));
        assert_eq!(run(&engine, &["ZPOPMIN", "z"]).unwrap(), bulks(&["a", "1"]));
        assert_eq!(run(&engine, &["EXISTS", "z"]).unwrap(), RespFrame::Integer(0));
        assert_eq!(run(&engine, &["BZPOPMIN", "z", "0"]).unwrap(), RespFrame::null_array());
    }

    #[test]
    fn test_store() {
        let engine = Engine::new(&Config::default());
        run(&engine, &["ZADD", "a", "1", "x", "2", "y"]).unwrap();
        run(&engine, &["ZADD", "b", "10", "y", "20", "z"]).unwrap();
        run(&engine, &["SADD", "s", "y"]).unwrap();

        assert_eq!(run(&engine, &["ZUNIONSTORE", "u", "2", "a", "b"]).unwrap(), RespFrame::Integer(3));
        assert_eq!(run(&engine, &["ZSCORE", "u", "y"]).unwrap(), RespFrame::bulk_string("12"));
        assert_eq!(
            run(&engine, &["ZINTERSTORE", "i", "3", "a", "b", "s", "WEIGHTS", "2", "1", "1", "AGGREGATE", "MAX"])
                .unwrap(),
            RespFrame::Integer(1)
        );
        assert_eq!(run(&engine, &["ZSCORE", "i", "y"]).unwrap(), RespFrame::bulk_string("10"));

        let err = run(&engine, &["ZUNIONSTORE", "u", "2", "a", "b", "AGGREGATE", "AVG"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
        assert!(run(&engine, &["ZUNIONSTORE", "u", "2", "a", "b", "WEIGHTS", "1"]).is_err());
        assert!(run(&engine, &["ZUNIONSTORE", "u", "0", "a"]).is_err());
        assert!(run(&engine, &["ZUNIONSTORE", "u", "3", "a"]).is_err());
    }
}
