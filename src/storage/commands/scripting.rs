//! EVAL, EVALSHA and SCRIPT

use std::sync::Arc;

use tracing::debug;

use super::{help_reply, Command, CommandParser, ExecContext, ExecMode};
use crate::error::{CommandError, Result, ScriptError};
use crate::protocol::RespFrame;
use crate::storage::engine::Keyspace;
use crate::storage::scripting::{ScriptHost, ScriptRegistry};
use crate::storage::{DatabaseIndex, Key};

const SCRIPT_HELP: &[&str] = &[
    "SCRIPT <subcommand> [<arg> [value] [opt] ...]. Subcommands are:",
    "EXISTS <sha1> [<sha1> ...]",
    "    Return information about the existence of the scripts in the script cache.",
    "FLUSH [ASYNC|SYNC]",
    "    Flush the Lua scripts cache.",
    "KILL",
    "    Kill the currently executing Lua script.",
    "LOAD <script>",
    "    Load a script into the scripts cache without executing it.",
    "HELP",
    "    Print this help.",
];

/// Commands a script may not call
const FORBIDDEN_IN_SCRIPT: &[&str] = &[
    "eval", "evalsha", "script", "select", "multi", "exec", "discard", "watch", "unwatch",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    Body(Vec<u8>),
    Sha(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSubcommand {
    Load(Vec<u8>),
    Exists(Vec<String>),
    Flush,
    Kill,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptingCommand {
    Eval {
        script: ScriptSource,
        keys: Vec<Key>,
        args: Vec<Vec<u8>>,
    },
    Script(ScriptSubcommand),
}

impl ScriptingCommand {
    pub fn parse(parser: &mut CommandParser) -> Result<Option<Self>> {
        let name = parser.name().to_string();
        let command = match name.as_str() {
            "eval" => parse_eval(parser, ScriptSource::Body)?,
            "evalsha" => parse_eval(parser, |sha| {
                ScriptSource::Sha(String::from_utf8_lossy(&sha).to_lowercase())
            })?,
            "script" => ScriptingCommand::Script(parse_script(parser)?),
            _ => return Ok(None),
        };
        Ok(Some(command))
    }

    pub fn execute(&self, ctx: &mut ExecContext<'_>) -> Result<RespFrame> {
        match self {
            ScriptingCommand::Eval { script, keys, args } => {
                if ctx.mode == ExecMode::Script {
                    return Err(ScriptError::NotAllowed("eval".to_string()).into());
                }
                let body = resolve(ctx.scripts, script)?;
                run_script(ctx, &body, keys, args)
            }
            ScriptingCommand::Script(subcommand) => subcommand.execute(ctx.scripts),
        }
    }
}

impl ScriptSubcommand {
    /// SCRIPT subcommands touch only the registry and run without the
    /// keyspace lock
    pub fn execute(&self, scripts: &ScriptRegistry) -> Result<RespFrame> {
        match self {
            ScriptSubcommand::Load(body) => Ok(RespFrame::bulk_string(scripts.load(body))),
            ScriptSubcommand::Exists(shas) => Ok(RespFrame::array(
                shas.iter()
                    .map(|sha| RespFrame::boolean(scripts.cache().exists(sha)))
                    .collect(),
            )),
            ScriptSubcommand::Flush => {
                scripts.flush();
                Ok(RespFrame::ok())
            }
            ScriptSubcommand::Kill => {
                scripts.kill()?;
                Ok(RespFrame::ok())
            }
            ScriptSubcommand::Help => Ok(help_reply(SCRIPT_HELP)),
        }
    }
}

fn parse_eval(parser: &mut CommandParser, source: impl FnOnce(Vec<u8>) -> ScriptSource) -> Result<ScriptingCommand> {
    let script = source(parser.next_bytes()?);
    let numkeys = parser.next_i64()?;
    if numkeys < 0 {
        return Err(CommandError::invalid("Number of keys can't be negative").into());
    }
    if numkeys as usize > parser.remaining() {
        return Err(CommandError::invalid("Number of keys can't be greater than number of args").into());
    }
    let keys = parser.take(numkeys as usize)?;
    let args = parser.rest();
    Ok(ScriptingCommand::Eval { script, keys, args })
}

fn parse_script(parser: &mut CommandParser) -> Result<ScriptSubcommand> {
    let subcommand = parser.next_string()?.to_uppercase();
    let parsed = match subcommand.as_str() {
        "LOAD" => ScriptSubcommand::Load(parser.next_bytes()?),
        "EXISTS" => ScriptSubcommand::Exists(
            parser
                .rest_non_empty()?
                .iter()
                .map(|sha| String::from_utf8_lossy(sha).to_lowercase())
                .collect(),
        ),
        "FLUSH" => {
            if !parser.next_if_keyword("ASYNC") {
                parser.next_if_keyword("SYNC");
            }
            ScriptSubcommand::Flush
        }
        "KILL" => ScriptSubcommand::Kill,
        "HELP" => ScriptSubcommand::Help,
        _ => {
            return Err(CommandError::UnknownSubcommand {
                command: "SCRIPT".to_string(),
                subcommand,
            }
            .into())
        }
    };
    parser.expect_end_arity()?;
    Ok(parsed)
}

/// EVAL caches the body it runs; EVALSHA needs it cached already
fn resolve(scripts: &ScriptRegistry, script: &ScriptSource) -> Result<Arc<[u8]>> {
    match script {
        ScriptSource::Body(body) => {
            scripts.load(body);
            Ok(Arc::from(body.as_slice()))
        }
        ScriptSource::Sha(sha) => scripts.cache().get(sha).ok_or_else(|| CommandError::NoScript.into()),
    }
}

/// Run a script atomically against the selected database. Every write is
/// journaled and undone if the script fails.
fn run_script(ctx: &mut ExecContext<'_>, body: &[u8], keys: &[Key], args: &[Vec<u8>]) -> Result<RespFrame> {
    let scripts = ctx.scripts;
    ctx.keyspace.begin_journal();
    let result = {
        let mut host = CommandHost {
            keyspace: &mut *ctx.keyspace,
            db: ctx.db,
            scripts,
        };
        scripts.run(body, keys, args, &mut host)
    };
    match &result {
        Ok(_) => ctx.keyspace.commit_journal(),
        Err(err) => {
            debug!(error = %err, "Script failed, rolling back");
            ctx.keyspace.rollback_journal();
        }
    }
    result
}

/// Serves `redis.call` from inside a running script
struct CommandHost<'a> {
    keyspace: &'a mut Keyspace,
    db: DatabaseIndex,
    scripts: &'a ScriptRegistry,
}

impl ScriptHost for CommandHost<'_> {
    fn call(&mut self, argv: Vec<Vec<u8>>) -> Result<RespFrame> {
        let command = Command::parse(&argv)?;
        let name = String::from_utf8_lossy(&argv[0]).to_lowercase();
        if FORBIDDEN_IN_SCRIPT.contains(&name.as_str()) {
            return Err(ScriptError::NotAllowed(name).into());
        }

        let reply = command.execute(&mut ExecContext {
            keyspace: &mut *self.keyspace,
            db: self.db,
            scripts: self.scripts,
            mode: ExecMode::Script,
        });
        if self.keyspace.journal_has_writes() {
            self.scripts.note_write();
        }
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::ErrorKind;
    use crate::storage::engine::Engine;
    use crate::storage::script_cache::sha1_hex;

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
    fn test_eval_calls_commands() {
        let engine = Engine::new(&Config::default());
        let reply = run(
            &engine,
            &["EVAL", "redis.call('SET', KEYS[1], ARGV[1]); return redis.call('GET', KEYS[1])", "1", "k", "v"],
        )
        .unwrap();
        assert_eq!(reply, RespFrame::bulk_string("v"));
        assert_eq!(run(&engine, &["GET", "k"]).unwrap(), RespFrame::bulk_string("v"));
    }

    #[test]
    fn test_numkeys_validation() {
        let engine = Engine::new(&Config::default());
        let err = run(&engine, &["EVAL", "return 1", "-1"]).unwrap_err();
        assert_eq!(err.to_string(), "ERR Number of keys can't be negative");
        let err = run(&engine, &["EVAL", "return 1", "2", "k"]).unwrap_err();
        assert_eq!(err.to_string(), "ERR Number of keys can't be greater than number of args");
        assert!(run(&engine, &["EVAL", "return 1", "x"]).is_err());
    }

    #[test]
    fn test_eval_caches_body_for_evalsha() {
        let engine = Engine::new(&Config::default());
        let body = "return ARGV[1]";
        let sha = sha1_hex(body.as_bytes());

        let err = run(&engine, &["EVALSHA", &sha, "0", "x"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        run(&engine, &["EVAL", body, "0", "x"]).unwrap();
        assert_eq!(run(&engine, &["EVALSHA", &sha.to_uppercase(), "0", "y"]).unwrap(), RespFrame::bulk_string("y"));
    }

    #[test]
    fn test_script_subcommands() {
        let engine = Engine::new(&Config::default());
        let sha = run(&engine, &["SCRIPT", "LOAD", "return 1"]).unwrap();
        let sha = String::from_utf8(sha.as_bytes().unwrap().to_vec()).unwrap();
        assert_eq!(sha, sha1_hex(b"return 1"));
        assert!(run(&engine, &["SCRIPT", "LOAD", "return 1", "return 2"]).is_err());

        assert_eq!(
            run(&engine, &["SCRIPT", "EXISTS", &sha, "0000"]).unwrap(),
            RespFrame::array(vec![RespFrame::Integer(1), RespFrame::Integer(0)])
        );
        assert_eq!(run(&engine, &["SCRIPT", "FLUSH"]).unwrap(), RespFrame::ok());
        assert_eq!(
            run(&engine, &["SCRIPT", "EXISTS", &sha]).unwrap(),
            RespFrame::array(vec![RespFrame::Integer(0)])
        );

        let err = run(&engine, &["SCRIPT", "KILL"]).unwrap_err();
        assert!(err.to_string().starts_with("NOTBUSY"));
        let err = run(&engine, &["SCRIPT", "NOPE"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    }

    #[test]
    fn test_failed_script_rolls_back() {
        let engine = Engine::new(&Config::default());
        run(&engine, &["SET", "a", "1"]).unwrap();
        let err = run(
            &engine,
            &["EVAL", "redis.call('SET', 'a', '2'); redis.call('DEL', 'b'); error('boom')", "0"],
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Script);
        assert_eq!(run(&engine, &["GET", "a"]).unwrap(), RespFrame::bulk_string("1"));
    }

    #[test]
    fn test_forbidden_commands() {
        let engine = Engine::new(&Config::default());
        let err = run(&engine, &["EVAL", "return redis.call('SELECT', '1')", "0"]).unwrap_err();
        assert!(err.to_string().contains("not allowed from script"));
        let reply = run(&engine, &["EVAL", "return redis.pcall('EVAL', 'return 1', '0')", "0"]).unwrap();
        assert!(reply.is_error());
    }

    #[test]
    fn test_blocking_command_in_script_does_not_block() {
        let engine = Engine::new(&Config::default());
        let reply = run(&engine, &["EVAL", "return redis.call('BLPOP', 'q', '0')", "0"]).unwrap();
        assert_eq!(reply, RespFrame::null_bulk());
    }
}
