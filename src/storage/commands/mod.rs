//! Command implementations
//!
//! Every command is parsed from an argument vector into a typed value once,
//! then executed against the keyspace. Parsing is separate from execution so
//! transactions can validate and queue commands, and scripts can call back
//! into the same code path.

pub mod hashes;
pub mod keys;
pub mod lists;
pub mod parser;
pub mod scripting;
pub mod sets;
pub mod sorted_sets;
pub mod streams;
pub mod strings;
pub mod transactions;

pub use hashes::HashCommand;
pub use keys::KeyCommand;
pub use lists::ListCommand;
pub use parser::CommandParser;
pub use scripting::{ScriptSubcommand, ScriptingCommand};
pub use sets::SetCommand;
pub use sorted_sets::SortedSetCommand;
pub use streams::StreamCommand;
pub use strings::StringCommand;
pub use transactions::TransactionCommand;

use std::time::Duration;

use crate::error::{CommandError, Result};
use crate::protocol::RespFrame;
use crate::storage::database::Database;
use crate::storage::engine::Keyspace;
use crate::storage::ops::ScoredMember;
use crate::storage::scripting::ScriptRegistry;
use crate::storage::stream::StreamEntry;
use crate::storage::{DatabaseIndex, Key};

/// Where a command is being executed from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Directly from a session
    Normal,
    /// Inside EXEC
    Transaction,
    /// From `redis.call` inside a script
    Script,
}

/// State a command executes against. The keyspace lock is held for the
/// whole lifetime of the context.
pub struct ExecContext<'a> {
    pub keyspace: &'a mut Keyspace,
    /// Selected database; SELECT updates it
    pub db: DatabaseIndex,
    pub scripts: &'a ScriptRegistry,
    pub mode: ExecMode,
}

impl ExecContext<'_> {
    /// The selected database
    pub fn database(&mut self) -> Result<&mut Database> {
        self.keyspace.db(self.db)
    }
}

/// Keys and timeout a blocking command parks on
#[derive(Debug, Clone, PartialEq)]
pub struct BlockingRequest {
    pub keys: Vec<Key>,
    /// `None` waits forever
    pub timeout: Option<Duration>,
}

/// A parsed command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Key(KeyCommand),
    String(StringCommand),
    List(ListCommand),
    Set(SetCommand),
    SortedSet(SortedSetCommand),
    Hash(HashCommand),
    Stream(StreamCommand),
    Scripting(ScriptingCommand),
    Transaction(TransactionCommand),
}

impl Command {
    /// Parse an argument vector; the first element is the command name
    pub fn parse(argv: &[Vec<u8>]) -> Result<Self> {
        let mut parser = CommandParser::new(argv)?;

        if let Some(command) = KeyCommand::parse(&mut parser)? {
            return Ok(Command::Key(command));
        }
        if let Some(command) = StringCommand::parse(&mut parser)? {
            return Ok(Command::String(command));
        }
        if let Some(command) = ListCommand::parse(&mut parser)? {
            return Ok(Command::List(command));
        }
        if let Some(command) = SetCommand::parse(&mut parser)? {
            return Ok(Command::Set(command));
        }
        if let Some(command) = SortedSetCommand::parse(&mut parser)? {
            return Ok(Command::SortedSet(command));
        }
        if let Some(command) = HashCommand::parse(&mut parser)? {
            return Ok(Command::Hash(command));
        }
        if let Some(command) = StreamCommand::parse(&mut parser)? {
            return Ok(Command::Stream(command));
        }
        if let Some(command) = ScriptingCommand::parse(&mut parser)? {
            return Ok(Command::Scripting(command));
        }
        if let Some(command) = TransactionCommand::parse(&mut parser)? {
            return Ok(Command::Transaction(command));
        }

        Err(CommandError::UnknownCommand(parser.name().to_string()).into())
    }

    /// Execute the command. Blocking commands make a single attempt and
    /// reply with a null array when nothing is available.
    pub fn execute(&self, ctx: &mut ExecContext<'_>) -> Result<RespFrame> {
        match self {
            Command::Key(command) => command.execute(ctx),
            Command::String(command) => command.execute(ctx),
            Command::List(command) => command.execute(ctx),
            Command::Set(command) => command.execute(ctx),
            Command::SortedSet(command) => command.execute(ctx),
            Command::Hash(command) => command.execute(ctx),
            Command::Stream(command) => command.execute(ctx),
            Command::Scripting(command) => command.execute(ctx),
            Command::Transaction(_) => Err(CommandError::InvalidState(
                "transaction control commands run on a session".to_string(),
            )
            .into()),
        }
    }

    /// Keys and timeout to park on when the command may block
    pub fn blocking_request(&self) -> Option<BlockingRequest> {
        match self {
            Command::List(command) => command.blocking_request(),
            Command::SortedSet(command) => command.blocking_request(),
            Command::Stream(command) => command.blocking_request(),
            _ => None,
        }
    }

    /// Pin anything relative to the moment the command starts blocking,
    /// such as XREAD's `$`
    pub fn prepare_blocking(&mut self, keyspace: &mut Keyspace, db: DatabaseIndex) -> Result<()> {
        match self {
            Command::Stream(command) => command.prepare_blocking(keyspace.db(db)?),
            _ => Ok(()),
        }
    }

    /// One attempt of a blocking command; `None` when there is nothing to
    /// serve yet
    pub fn try_serve(&self, ctx: &mut ExecContext<'_>) -> Result<Option<RespFrame>> {
        match self {
            Command::List(command) => command.try_serve(ctx),
            Command::SortedSet(command) => command.try_serve(ctx),
            Command::Stream(command) => command.try_serve(ctx),
            other => other.execute(ctx).map(Some),
        }
    }
}

/// Members, optionally interleaved with their scores
pub(crate) fn scored_reply(items: Vec<ScoredMember>, with_scores: bool) -> RespFrame {
    let mut frames = Vec::with_capacity(if with_scores { items.len() * 2 } else { items.len() });
    for (member, score) in items {
        frames.push(RespFrame::bulk_string(member));
        if with_scores {
            frames.push(RespFrame::double(score));
        }
    }
    RespFrame::array(frames)
}

/// `[id, [field, value, ...]]`. Entries deleted while pending have no
/// fields and reply with a null field list when `null_when_deleted` is set.
pub(crate) fn entry_reply(entry: StreamEntry, null_when_deleted: bool) -> RespFrame {
    let fields = if entry.fields.is_empty() && null_when_deleted {
        RespFrame::null_array()
    } else {
        RespFrame::bulk_array(entry.fields.into_iter().flat_map(|(f, v)| [f, v]))
    };
    RespFrame::array(vec![RespFrame::bulk_string(entry.id.to_string()), fields])
}

pub(crate) fn entries_reply(entries: Vec<StreamEntry>) -> RespFrame {
    RespFrame::array(entries.into_iter().map(|entry| entry_reply(entry, false)).collect())
}

/// Reply of a HELP subcommand
pub(crate) fn help_reply(lines: &[&str]) -> RespFrame {
    RespFrame::array(lines.iter().map(|line| RespFrame::simple_string(*line)).collect())
}

/// Reply of a blocking command that found nothing to serve
pub(crate) fn nothing_served(reply: Option<RespFrame>) -> RespFrame {
    reply.unwrap_or_else(RespFrame::null_array)
}
