//! Stream and consumer group command implementations

use std::time::Duration;

use super::{entries_reply, entry_reply, help_reply, nothing_served, BlockingRequest, CommandParser, ExecContext};
use crate::error::{CommandError, Result};
use crate::protocol::RespFrame;
use crate::storage::consumer_groups::{ClaimOptions, GroupReadStart, PendingQuery};
use crate::storage::database::Database;
use crate::storage::ops::GroupStartId;
use crate::storage::stream::{Fields, IdSpec, RangeBound, StreamEntry, StreamId, TrimStrategy};
use crate::storage::Key;

const XGROUP_HELP: &[&str] = &[
    "XGROUP <subcommand> [<arg> [value] [opt] ...]. Subcommands are:",
    "CREATE <key> <groupname> <id|$> [MKSTREAM]",
    "    Create a new consumer group. Options are:",
    "    * MKSTREAM",
    "      Create the empty stream if it does not exist.",
    "CREATECONSUMER <key> <groupname> <consumer>",
    "    Create a new consumer in the specified group.",
    "DELCONSUMER <key> <groupname> <consumer>",
    "    Remove the specified consumer.",
    "DESTROY <key> <groupname>",
    "    Remove the specified group.",
    "SETID <key> <groupname> <id|$>",
    "    Set the current group ID.",
    "HELP",
    "    Print this help.",
];

const XINFO_HELP: &[&str] = &[
    "XINFO <subcommand> [<arg> [value] [opt] ...]. Subcommands are:",
    "CONSUMERS <key> <groupname>",
    "    Show consumers of <groupname>.",
    "GROUPS <key>",
    "    Show the stream consumer groups.",
    "STREAM <key>",
    "    Show information about the stream.",
    "HELP",
    "    Print this help.",
];

/// Where XREAD starts reading a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFrom {
    /// `$`: only entries added after the command started
    Last,
    After(StreamId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupCommand {
    Create {
        key: Key,
        group: String,
        start: GroupStartId,
        mkstream: bool,
    },
    SetId {
        key: Key,
        group: String,
        start: GroupStartId,
    },
    Destroy {
        key: Key,
        group: String,
    },
    CreateConsumer {
        key: Key,
        group: String,
        consumer: String,
    },
    DelConsumer {
        key: Key,
        group: String,
        consumer: String,
    },
    Help,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InfoCommand {
    Stream(Key),
    Groups(Key),
    Consumers { key: Key, group: String },
    Help,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamCommand {
    Add {
        key: Key,
        id: IdSpec,
        fields: Fields,
        no_mkstream: bool,
        trim: Option<TrimStrategy>,
    },
    Trim {
        key: Key,
        strategy: TrimStrategy,
    },
    Len(Key),
    Del {
        key: Key,
        ids: Vec<StreamId>,
    },
    /// XRANGE and XREVRANGE
    Range {
        key: Key,
        start: RangeBound,
        end: RangeBound,
        count: Option<usize>,
        reverse: bool,
    },
    SetId {
        key: Key,
        id: StreamId,
    },
    Read {
        count: Option<usize>,
        /// `Some` when BLOCK was given; the inner `None` waits forever
        block: Option<Option<Duration>>,
        streams: Vec<(Key, ReadFrom)>,
    },
    ReadGroup {
        group: String,
        consumer: String,
        count: Option<usize>,
        block: Option<Option<Duration>>,
        no_ack: bool,
        streams: Vec<(Key, GroupReadStart)>,
    },
    Group(GroupCommand),
    Ack {
        key: Key,
        group: String,
        ids: Vec<StreamId>,
    },
    Claim {
        key: Key,
        group: String,
        consumer: String,
        min_idle_ms: u64,
        ids: Vec<StreamId>,
        options: ClaimOptions,
    },
    Pending {
        key: Key,
        group: String,
        /// The detailed form; the summary when absent
        query: Option<PendingQuery>,
    },
    Info(InfoCommand),
}

impl StreamCommand {
    pub fn parse(parser: &mut CommandParser) -> Result<Option<Self>> {
        let name = parser.name().to_string();
        let command = match name.as_str() {
            "xadd" => parse_xadd(parser)?,
            "xtrim" => {
                let key = parser.next_bytes()?;
                let strategy = parse_trim(parser)?.ok_or(CommandError::SyntaxError)?;
                StreamCommand::Trim { key, strategy }
            }
            "xlen" => StreamCommand::Len(parser.next_bytes()?),
            "xdel" => {
                let key = parser.next_bytes()?;
                let ids = parse_ids(&parser.rest_non_empty()?)?;
                StreamCommand::Del { key, ids }
            }
            "xrange" | "xrevrange" => {
                let reverse = name == "xrevrange";
                let key = parser.next_bytes()?;
                let first = parser.next_bytes()?;
                let second = parser.next_bytes()?;
                let (start, end) = if reverse { (second, first) } else { (first, second) };
                let count = if parser.next_if_keyword("COUNT") {
                    Some(parser.next_i64()?.max(0) as usize)
                } else {
                    None
                };
                parser.expect_end()?;
                StreamCommand::Range {
                    key,
                    start: RangeBound::parse_start(&start)?,
                    end: RangeBound::parse_end(&end)?,
                    count,
                    reverse,
                }
            }
            "xsetid" => StreamCommand::SetId {
                key: parser.next_bytes()?,
                id: StreamId::parse(&parser.next_bytes()?)?,
            },
            "xread" => parse_xread(parser)?,
            "xreadgroup" => parse_xreadgroup(parser)?,
            "xgroup" => StreamCommand::Group(parse_xgroup(parser)?),
            "xack" => {
                let key = parser.next_bytes()?;
                let group = parser.next_string()?;
                let ids = parse_ids(&parser.rest_non_empty()?)?;
                StreamCommand::Ack { key, group, ids }
            }
            "xclaim" => parse_xclaim(parser)?,
            "xpending" => parse_xpending(parser)?,
            "xinfo" => StreamCommand::Info(parse_xinfo(parser)?),
            _ => return Ok(None),
        };
        parser.expect_end_arity()?;
        Ok(Some(command))
    }

    pub fn execute(&self, ctx: &mut ExecContext<'_>) -> Result<RespFrame> {
        if matches!(self, StreamCommand::Read { .. } | StreamCommand::ReadGroup { .. }) {
            return self.try_serve(ctx).map(nothing_served);
        }

        let db = ctx.database()?;
        match self {
            StreamCommand::Add {
                key,
                id,
                fields,
                no_mkstream,
                trim,
            } => Ok(match db.xadd(key, *id, fields.clone(), *no_mkstream, *trim)? {
                Some(id) => RespFrame::bulk_string(id.to_string()),
                None => RespFrame::null_bulk(),
            }),
            StreamCommand::Trim { key, strategy } => Ok(RespFrame::Integer(db.xtrim(key, *strategy)? as i64)),
            StreamCommand::Len(key) => Ok(RespFrame::Integer(db.xlen(key)? as i64)),
            StreamCommand::Del { key, ids } => Ok(RespFrame::Integer(db.xdel(key, ids)? as i64)),
            StreamCommand::Range {
                key,
                start,
                end,
                count,
                reverse,
            } => Ok(entries_reply(db.xrange(key, *start, *end, *count, *reverse)?)),
            StreamCommand::SetId { key, id } => {
                db.xsetid(key, *id)?;
                Ok(RespFrame::ok())
            }
            StreamCommand::Group(command) => execute_group(db, command),
            StreamCommand::Ack { key, group, ids } => Ok(RespFrame::Integer(db.xack(key, group, ids)? as i64)),
            StreamCommand::Claim {
                key,
                group,
                consumer,
                min_idle_ms,
                ids,
                options,
            } => {
                let claimed = db.xclaim(key, group, consumer, *min_idle_ms, ids, options)?;
                Ok(if options.just_id {
                    RespFrame::bulk_array(claimed.into_iter().map(|entry| entry.id.to_string()))
                } else {
                    entries_reply(claimed)
                })
            }
            StreamCommand::Pending { key, group, query } => execute_pending(db, key, group, query.as_ref()),
            StreamCommand::Info(command) => execute_info(db, command),
            StreamCommand::Read { .. } | StreamCommand::ReadGroup { .. } => Ok(RespFrame::null_array()),
        }
    }

    /// XREAD and XREADGROUP block only when BLOCK was given; XREADGROUP
    /// additionally needs every ID to be `>`
    pub fn blocking_request(&self) -> Option<BlockingRequest> {
        match self {
            StreamCommand::Read {
                block: Some(timeout),
                streams,
                ..
            } => Some(BlockingRequest {
                keys: streams.iter().map(|(key, _)| key.clone()).collect(),
                timeout: *timeout,
            }),
            StreamCommand::ReadGroup {
                block: Some(timeout),
                streams,
                ..
            } if streams.iter().all(|(_, start)| *start == GroupReadStart::NewEntries) => Some(BlockingRequest {
                keys: streams.iter().map(|(key, _)| key.clone()).collect(),
                timeout: *timeout,
            }),
            _ => None,
        }
    }

    /// Resolve `$` to the stream's current last ID so that entries added
    /// while blocked are returned
    pub fn prepare_blocking(&mut self, db: &mut Database) -> Result<()> {
        if let StreamCommand::Read { streams, .. } = self {
            for (key, from) in streams.iter_mut() {
                if *from == ReadFrom::Last {
                    *from = ReadFrom::After(db.xlast_id(key)?);
                }
            }
        }
        Ok(())
    }

    /// One read attempt, `None` when no stream had anything to return
    pub fn try_serve(&self, ctx: &mut ExecContext<'_>) -> Result<Option<RespFrame>> {
        match self {
            StreamCommand::Read { count, streams, .. } => {
                let db = ctx.database()?;
                let mut replies = Vec::new();
                for (key, from) in streams {
                    let after = match from {
                        ReadFrom::Last => db.xlast_id(key)?,
                        ReadFrom::After(id) => *id,
                    };
                    let entries = db.xread(key, after, *count)?;
                    if !entries.is_empty() {
                        replies.push(stream_reply(key, entries, false));
                    }
                }
                Ok((!replies.is_empty()).then(|| RespFrame::array(replies)))
            }
            StreamCommand::ReadGroup {
                group,
                consumer,
                count,
                no_ack,
                streams,
                ..
            } => {
                let db = ctx.database()?;
                let mut replies = Vec::new();
                for (key, start) in streams {
                    let entries = db.xreadgroup(key, group, consumer, *start, *count, *no_ack)?;
                    match start {
                        GroupReadStart::NewEntries if entries.is_empty() => {}
                        GroupReadStart::NewEntries => replies.push(stream_reply(key, entries, false)),
                        GroupReadStart::History(_) => replies.push(stream_reply(key, entries, true)),
                    }
                }
                Ok((!replies.is_empty()).then(|| RespFrame::array(replies)))
            }
            other => other.execute(ctx).map(Some),
        }
    }
}

fn stream_reply(key: &[u8], entries: Vec<StreamEntry>, null_when_deleted: bool) -> RespFrame {
    RespFrame::array(vec![
        RespFrame::bulk_string(key),
        RespFrame::array(entries.into_iter().map(|e| entry_reply(e, null_when_deleted)).collect()),
    ])
}

fn parse_ids(args: &[Vec<u8>]) -> Result<Vec<StreamId>> {
    args.iter().map(|id| StreamId::parse(id).map_err(Into::into)).collect()
}

/// `MAXLEN|MINID [=|~] threshold [LIMIT count]`, if present
fn parse_trim(parser: &mut CommandParser) -> Result<Option<TrimStrategy>> {
    let by_len = if parser.next_if_keyword("MAXLEN") {
        true
    } else if parser.next_if_keyword("MINID") {
        false
    } else {
        return Ok(None);
    };
    let approximate = if parser.next_if_keyword("~") {
        true
    } else {
        parser.next_if_keyword("=");
        false
    };
    let threshold = parser.next_bytes()?;
    let strategy = if by_len {
        let threshold = crate::storage::ops::parse_i64(&threshold).ok_or(CommandError::NotInteger)?;
        let threshold =
            usize::try_from(threshold).map_err(|_| CommandError::invalid("The MAXLEN argument must be >= 0."))?;
        TrimStrategy::MaxLen { threshold, approximate }
    } else {
        TrimStrategy::MinId {
            threshold: StreamId::parse(&threshold)?,
            approximate,
        }
    };
    if parser.next_if_keyword("LIMIT") {
        if !approximate {
            return Err(CommandError::invalid("syntax error, LIMIT cannot be used without the special ~ option").into());
        }
        // Approximate trimming already works in whole nodes
        parser.next_u64()?;
    }
    Ok(Some(strategy))
}

fn parse_xadd(parser: &mut CommandParser) -> Result<StreamCommand> {
    let key = parser.next_bytes()?;
    let mut no_mkstream = false;
    let mut trim = None;
    loop {
        if parser.next_if_keyword("NOMKSTREAM") {
            no_mkstream = true;
        } else if let Some(strategy) = parse_trim(parser)? {
            trim = Some(strategy);
        } else {
            break;
        }
    }
    let id = IdSpec::parse(&parser.next_bytes()?)?;
    let fields = parser.rest_pairs()?;
    Ok(StreamCommand::Add {
        key,
        id,
        fields,
        no_mkstream,
        trim,
    })
}

/// The `STREAMS key... id...` tail shared by XREAD and XREADGROUP
fn parse_streams(parser: &mut CommandParser, command: &str) -> Result<(Vec<Key>, Vec<Vec<u8>>)> {
    if !parser.next_if_keyword("STREAMS") {
        return Err(CommandError::SyntaxError.into());
    }
    let rest = parser.rest();
    if rest.is_empty() || rest.len() % 2 != 0 {
        return Err(CommandError::invalid(format!(
            "Unbalanced '{command}' list of streams: for each stream key an ID or '$' must be specified."
        ))
        .into());
    }
    let half = rest.len() / 2;
    let mut keys = rest;
    let ids = keys.split_off(half);
    Ok((keys, ids))
}

/// COUNT; zero means no limit
fn parse_count(parser: &mut CommandParser) -> Result<Option<usize>> {
    let count = parser.next_i64()?;
    Ok((count > 0).then_some(count as usize))
}

fn parse_xread(parser: &mut CommandParser) -> Result<StreamCommand> {
    let mut count = None;
    let mut block = None;
    loop {
        if parser.next_if_keyword("COUNT") {
            count = parse_count(parser)?;
        } else if parser.next_if_keyword("BLOCK") {
            block = Some(parser.next_timeout_ms()?);
        } else {
            break;
        }
    }
    let (keys, ids) = parse_streams(parser, "xread")?;
    let streams = keys
        .into_iter()
        .zip(ids)
        .map(|(key, id)| -> Result<(Key, ReadFrom)> {
            let from = if id == b"$" {
                ReadFrom::Last
            } else {
                ReadFrom::After(StreamId::parse(&id)?)
            };
            Ok((key, from))
        })
        .collect::<Result<_>>()?;
    Ok(StreamCommand::Read { count, block, streams })
}

fn parse_xreadgroup(parser: &mut CommandParser) -> Result<StreamCommand> {
    if !parser.next_if_keyword("GROUP") {
        return Err(CommandError::SyntaxError.into());
    }
    let group = parser.next_string()?;
    let consumer = parser.next_string()?;
    let mut count = None;
    let mut block = None;
    let mut no_ack = false;
    loop {
        if parser.next_if_keyword("COUNT") {
            count = parse_count(parser)?;
        } else if parser.next_if_keyword("BLOCK") {
            block = Some(parser.next_timeout_ms()?);
        } else if parser.next_if_keyword("NOACK") {
            no_ack = true;
        } else {
            break;
        }
    }
    let (keys, ids) = parse_streams(parser, "xreadgroup")?;
    let streams = keys
        .into_iter()
        .zip(ids)
        .map(|(key, id)| -> Result<(Key, GroupReadStart)> {
            let start = if id == b">" {
                GroupReadStart::NewEntries
            } else {
                GroupReadStart::History(StreamId::parse(&id)?)
            };
            Ok((key, start))
        })
        .collect::<Result<_>>()?;
    Ok(StreamCommand::ReadGroup {
        group,
        consumer,
        count,
        block,
        no_ack,
        streams,
    })
}

fn parse_xgroup(parser: &mut CommandParser) -> Result<GroupCommand> {
    let subcommand = parser.next_string()?.to_uppercase();
    Ok(match subcommand.as_str() {
        "CREATE" => {
            let key = parser.next_bytes()?;
            let group = parser.next_string()?;
            let start = GroupStartId::parse(&parser.next_bytes()?)?;
            let mkstream = parser.next_if_keyword("MKSTREAM");
            if parser.next_if_keyword("ENTRIESREAD") {
                parser.next_i64()?;
            }
            parser.expect_end()?;
            GroupCommand::Create {
                key,
                group,
                start,
                mkstream,
            }
        }
        "SETID" => GroupCommand::SetId {
            key: parser.next_bytes()?,
            group: parser.next_string()?,
            start: GroupStartId::parse(&parser.next_bytes()?)?,
        },
        "DESTROY" => GroupCommand::Destroy {
            key: parser.next_bytes()?,
            group: parser.next_string()?,
        },
        "CREATECONSUMER" => GroupCommand::CreateConsumer {
            key: parser.next_bytes()?,
            group: parser.next_string()?,
            consumer: parser.next_string()?,
        },
        "DELCONSUMER" => GroupCommand::DelConsumer {
            key: parser.next_bytes()?,
            group: parser.next_string()?,
            consumer: parser.next_string()?,
        },
        "HELP" => GroupCommand::Help,
        _ => {
            return Err(CommandError::UnknownSubcommand {
                command: "XGROUP".to_string(),
                subcommand,
            }
            .into())
        }
    })
}

fn parse_xclaim(parser: &mut CommandParser) -> Result<StreamCommand> {
    let key = parser.next_bytes()?;
    let group = parser.next_string()?;
    let consumer = parser.next_string()?;
    let min_idle_ms = parser.next_i64()?.max(0) as u64;

    let mut ids = Vec::new();
    while let Some(token) = parser.peek_keyword() {
        if matches!(token.as_str(), "IDLE" | "TIME" | "RETRYCOUNT" | "FORCE" | "JUSTID" | "LASTID") {
            break;
        }
        ids.push(StreamId::parse(&parser.next_bytes()?)?);
    }
    if ids.is_empty() {
        return Err(parser.arity_error());
    }

    let mut options = ClaimOptions::default();
    while let Some(token) = parser.peek_keyword() {
        parser.next_bytes()?;
        match token.as_str() {
            "IDLE" => options.idle_ms = Some(parser.next_i64()?.max(0) as u64),
            "TIME" => options.time_ms = Some(parser.next_i64()?.max(0) as u64),
            "RETRYCOUNT" => options.retry_count = Some(parser.next_u64()?),
            "FORCE" => options.force = true,
            "JUSTID" => options.just_id = true,
            "LASTID" => {
                StreamId::parse(&parser.next_bytes()?)?;
            }
            _ => return Err(CommandError::SyntaxError.into()),
        }
    }

    Ok(StreamCommand::Claim {
        key,
        group,
        consumer,
        min_idle_ms,
        ids,
        options,
    })
}

fn parse_xpending(parser: &mut CommandParser) -> Result<StreamCommand> {
    let key = parser.next_bytes()?;
    let group = parser.next_string()?;
    if parser.is_empty() {
        return Ok(StreamCommand::Pending { key, group, query: None });
    }

    let min_idle_ms = if parser.next_if_keyword("IDLE") {
        Some(parser.next_i64()?.max(0) as u64)
    } else {
        None
    };
    let start = parser.next_bytes()?;
    let end = parser.next_bytes()?;
    let count = parser.next_i64()?.max(0) as usize;
    let consumer = if parser.is_empty() { None } else { Some(parser.next_string()?) };
    parser.expect_end()?;

    Ok(StreamCommand::Pending {
        key,
        group,
        query: Some(PendingQuery {
            min_idle_ms,
            start: pending_bound(&start, 0)?,
            end: pending_bound(&end, u64::MAX)?,
            count,
            consumer,
        }),
    })
}

/// `-` and `+` leave the range open on that side
fn pending_bound(token: &[u8], default_seq: u64) -> Result<Option<StreamId>> {
    match token {
        b"-" | b"+" => Ok(None),
        _ => Ok(Some(StreamId::parse_with_default_seq(token, default_seq)?)),
    }
}

fn parse_xinfo(parser: &mut CommandParser) -> Result<InfoCommand> {
    let subcommand = parser.next_string()?.to_uppercase();
    Ok(match subcommand.as_str() {
        "STREAM" => InfoCommand::Stream(parser.next_bytes()?),
        "GROUPS" => InfoCommand::Groups(parser.next_bytes()?),
        "CONSUMERS" => InfoCommand::Consumers {
            key: parser.next_bytes()?,
            group: parser.next_string()?,
        },
        "HELP" => InfoCommand::Help,
        _ => {
            return Err(CommandError::UnknownSubcommand {
                command: "XINFO".to_string(),
                subcommand,
            }
            .into())
        }
    })
}

fn execute_group(db: &mut Database, command: &GroupCommand) -> Result<RespFrame> {
    match command {
        GroupCommand::Create {
            key,
            group,
            start,
            mkstream,
        } => {
            db.xgroup_create(key, group, *start, *mkstream)?;
            Ok(RespFrame::ok())
        }
        GroupCommand::SetId { key, group, start } => {
            db.xgroup_setid(key, group, *start)?;
            Ok(RespFrame::ok())
        }
        GroupCommand::Destroy { key, group } => Ok(RespFrame::boolean(db.xgroup_destroy(key, group)?)),
        GroupCommand::CreateConsumer { key, group, consumer } => {
            Ok(RespFrame::boolean(db.xgroup_create_consumer(key, group, consumer)?))
        }
        GroupCommand::DelConsumer { key, group, consumer } => {
            Ok(RespFrame::Integer(db.xgroup_del_consumer(key, group, consumer)? as i64))
        }
        GroupCommand::Help => Ok(help_reply(XGROUP_HELP)),
    }
}

fn execute_pending(db: &mut Database, key: &[u8], group: &str, query: Option<&PendingQuery>) -> Result<RespFrame> {
    let Some(query) = query else {
        let summary = db.xpending_summary(key, group)?;
        let consumers = if summary.consumers.is_empty() {
            RespFrame::null_array()
        } else {
            RespFrame::array(
                summary
                    .consumers
                    .into_iter()
                    .map(|(name, count)| RespFrame::bulk_array([name, count.to_string()]))
                    .collect(),
            )
        };
        let id_or_null = |id: Option<StreamId>| RespFrame::optional_bulk(id.map(|id| id.to_string().into_bytes()));
        return Ok(RespFrame::array(vec![
            RespFrame::Integer(summary.count as i64),
            id_or_null(summary.min_id),
            id_or_null(summary.max_id),
            consumers,
        ]));
    };

    let entries = db.xpending_range(key, group, query)?;
    Ok(RespFrame::array(
        entries
            .into_iter()
            .map(|entry| {
                RespFrame::array(vec![
                    RespFrame::bulk_string(entry.id.to_string()),
                    RespFrame::bulk_string(entry.consumer),
                    RespFrame::Integer(entry.idle_ms as i64),
                    RespFrame::Integer(entry.delivery_count as i64),
                ])
            })
            .collect(),
    ))
}

fn execute_info(db: &mut Database, command: &InfoCommand) -> Result<RespFrame> {
    let field = |name: &str| RespFrame::bulk_string(name);
    let id = |id: StreamId| RespFrame::bulk_string(id.to_string());
    let optional_entry = |entry: Option<StreamEntry>| entry.map_or_else(RespFrame::null_bulk, |e| entry_reply(e, false));

    match command {
        InfoCommand::Stream(key) => {
            let info = db.xinfo_stream(key)?;
            Ok(RespFrame::array(vec![
                field("length"),
                RespFrame::Integer(info.length as i64),
                field("radix-tree-keys"),
                RespFrame::Integer(info.radix_tree_keys as i64),
                field("radix-tree-nodes"),
                RespFrame::Integer(info.radix_tree_nodes as i64),
                field("last-generated-id"),
                id(info.last_generated_id),
                field("max-deleted-entry-id"),
                id(info.max_deleted_entry_id),
                field("entries-added"),
                RespFrame::Integer(info.entries_added as i64),
                field("groups"),
                RespFrame::Integer(info.groups as i64),
                field("first-entry"),
                optional_entry(info.first_entry),
                field("last-entry"),
                optional_entry(info.last_entry),
            ]))
        }
        InfoCommand::Groups(key) => Ok(RespFrame::array(
            db.xinfo_groups(key)?
                .into_iter()
                .map(|group| {
                    RespFrame::array(vec![
                        field("name"),
                        RespFrame::bulk_string(group.name),
                        field("consumers"),
                        RespFrame::Integer(group.consumers as i64),
                        field("pending"),
                        RespFrame::Integer(group.pending as i64),
                        field("last-delivered-id"),
                        id(group.last_delivered_id),
                    ])
                })
                .collect(),
        )),
        InfoCommand::Consumers { key, group } => Ok(RespFrame::array(
            db.xinfo_consumers(key, group)?
                .into_iter()
                .map(|consumer| {
                    RespFrame::array(vec![
                        field("name"),
                        RespFrame::bulk_string(consumer.name),
                        field("pending"),
                        RespFrame::Integer(consumer.pending as i64),
                        field("idle"),
                        RespFrame::Integer(consumer.idle_ms as i64),
                    ])
                })
                .collect(),
        )),
        InfoCommand::Help => Ok(help_reply(XINFO_HELP)),
    }
}
