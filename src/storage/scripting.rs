//! Script evaluation
//!
//! The engine talks to scripts through two seams: a [`ScriptEvaluator`]
//! runs a script body, and the [`ScriptHost`] it is handed executes the
//! commands the script issues through `redis.call`/`redis.pcall`. The
//! default evaluator embeds Lua 5.4.
//!
//! Lua values map to replies the way Redis maps them:
//!
//! * number → integer (truncated), string → bulk string
//! * `false`/`nil` → null bulk, `true` → integer 1
//! * table with an `ok` field → status, with an `err` field → error
//! * other tables → array, stopping at the first `nil`

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mlua::{HookTriggers, Lua, MultiValue, Table, Value as LuaValue, VmState};
use tracing::{debug, info};

use crate::error::{EmbedisError, Result, ScriptError};
use crate::protocol::RespFrame;
use crate::storage::script_cache::{sha1_hex, ScriptCache};

/// Executes commands on behalf of a running script
pub trait ScriptHost {
    /// Run one command; an `Err` is what `redis.call` raises
    fn call(&mut self, argv: Vec<Vec<u8>>) -> Result<RespFrame>;
}

/// Flag raised by SCRIPT KILL and polled by the running script
#[derive(Debug, Clone, Default)]
pub struct KillFlag(Arc<AtomicBool>);

impl KillFlag {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// One script invocation
#[derive(Debug)]
pub struct ScriptCall<'a> {
    pub body: &'a [u8],
    pub keys: &'a [Vec<u8>],
    pub args: &'a [Vec<u8>],
    pub kill: &'a KillFlag,
}

/// A pluggable script runtime
pub trait ScriptEvaluator: Send + Sync {
    /// Run a script to completion
    fn eval(&self, call: ScriptCall<'_>, host: &mut dyn ScriptHost) -> Result<RespFrame>;
}

/// Error carried through the Lua VM when `redis.call` fails or the script
/// is killed
#[derive(Debug)]
enum Abort {
    Reply(String),
    Killed,
}

impl fmt::Display for Abort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Abort::Reply(line) => write!(f, "{}", line),
            Abort::Killed => write!(f, "Script killed by user with SCRIPT KILL..."),
        }
    }
}

impl std::error::Error for Abort {}

/// Lua 5.4 evaluator. Every script runs in a fresh, sandboxed state.
#[derive(Debug, Default, Clone, Copy)]
pub struct LuaEvaluator;

/// Globals removed from the sandbox
const BLOCKED_GLOBALS: [&str; 8] = [
    "os", "io", "debug", "package", "require", "dofile", "loadfile", "load",
];

/// Instructions between two polls of the kill flag
const KILL_CHECK_INTERVAL: u32 = 1000;

impl LuaEvaluator {
    pub fn new() -> Self {
        LuaEvaluator
    }

    fn create_sandbox(&self, kill: &KillFlag) -> mlua::Result<Lua> {
        let lua = Lua::new();
        let globals = lua.globals();
        for name in BLOCKED_GLOBALS {
            globals.raw_set(name, LuaValue::Nil)?;
        }

        let kill = kill.clone();
        lua.set_hook(
            HookTriggers::new().every_nth_instruction(KILL_CHECK_INTERVAL),
            move |_, _| {
                if kill.is_set() {
                    Err(mlua::Error::external(Abort::Killed))
                } else {
                    Ok(VmState::Continue)
                }
            },
        );
        Ok(lua)
    }

    fn set_keys_and_args(lua: &Lua, keys: &[Vec<u8>], args: &[Vec<u8>]) -> mlua::Result<()> {
        let globals = lua.globals();
        for (name, items) in [("KEYS", keys), ("ARGV", args)] {
            let table = lua.create_table_with_capacity(items.len(), 0)?;
            for (i, item) in items.iter().enumerate() {
                table.raw_set(i + 1, lua.create_string(item)?)?;
            }
            globals.raw_set(name, table)?;
        }
        Ok(())
    }

    /// The `redis` table minus `call`/`pcall`, which need the host
    fn create_redis_table(lua: &Lua) -> mlua::Result<Table> {
        let redis = lua.create_table()?;
        redis.raw_set(
            "status_reply",
            lua.create_function(|lua, status: mlua::String| reply_table(lua, "ok", &status.as_bytes()))?,
        )?;
        redis.raw_set(
            "error_reply",
            lua.create_function(|lua, message: mlua::String| reply_table(lua, "err", &message.as_bytes()))?,
        )?;
        redis.raw_set(
            "sha1hex",
            lua.create_function(|_, body: mlua::String| Ok(sha1_hex(&body.as_bytes())))?,
        )?;
        Ok(redis)
    }
}

impl ScriptEvaluator for LuaEvaluator {
    fn eval(&self, call: ScriptCall<'_>, host: &mut dyn ScriptHost) -> Result<RespFrame> {
        let lua = self.create_sandbox(call.kill).map_err(script_failure)?;
        Self::set_keys_and_args(&lua, call.keys, call.args).map_err(script_failure)?;
        let redis = Self::create_redis_table(&lua).map_err(script_failure)?;
        lua.globals().raw_set("redis", redis.clone()).map_err(script_failure)?;

        let host = RefCell::new(host);
        let kill = call.kill;
        let run = |lua: &Lua, args: MultiValue, protected: bool| -> mlua::Result<LuaValue> {
            if kill.is_set() {
                return Err(mlua::Error::external(Abort::Killed));
            }
            let argv = command_args(args)?;
            let outcome = host.borrow_mut().call(argv);
            match outcome {
                Ok(reply) => reply_to_lua(lua, &reply),
                Err(EmbedisError::Script(ScriptError::Killed)) => Err(mlua::Error::external(Abort::Killed)),
                Err(err) if protected => reply_table(lua, "err", err.to_string().as_bytes()).map(LuaValue::Table),
                Err(err) => Err(mlua::Error::external(Abort::Reply(err.to_string()))),
            }
        };
        let run = &run;
        let result = lua.scope(|scope| {
            redis.raw_set(
                "call",
                scope.create_function(move |lua, args: MultiValue| run(lua, args, false))?,
            )?;
            redis.raw_set(
                "pcall",
                scope.create_function(move |lua, args: MultiValue| run(lua, args, true))?,
            )?;
            lua.load(call.body).set_name("@user_script").eval::<LuaValue>()
        });

        match result {
            Ok(value) => Ok(lua_to_reply(&value)),
            Err(err) => {
                let err = script_failure(err);
                debug!(error = %err, "Script failed");
                Err(err)
            }
        }
    }
}

/// Arguments of `redis.call`: strings and numbers only
fn command_args(args: MultiValue) -> mlua::Result<Vec<Vec<u8>>> {
    if args.is_empty() {
        return Err(mlua::Error::external(Abort::Reply(
            "ERR Please specify at least one argument for this redis lib call".to_string(),
        )));
    }
    args.into_iter()
        .map(|arg| match arg {
            LuaValue::String(s) => Ok(s.as_bytes().to_vec()),
            LuaValue::Integer(n) => Ok(n.to_string().into_bytes()),
            LuaValue::Number(n) => Ok(crate::protocol::resp::format_double(n).into_bytes()),
            _ => Err(mlua::Error::external(Abort::Reply(
                "ERR Lua redis lib command arguments must be strings or integers".to_string(),
            ))),
        })
        .collect()
}

/// `{ok = ...}` / `{err = ...}`
fn reply_table(lua: &Lua, field: &str, text: &[u8]) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    table.raw_set(field, lua.create_string(text)?)?;
    Ok(table)
}

/// Convert a command reply into the Lua value `redis.call` returns
fn reply_to_lua(lua: &Lua, reply: &RespFrame) -> mlua::Result<LuaValue> {
    Ok(match reply {
        RespFrame::Integer(n) => LuaValue::Integer(*n),
        RespFrame::BulkString(Some(bytes)) => LuaValue::String(lua.create_string(bytes)?),
        RespFrame::BulkString(None) | RespFrame::Array(None) => LuaValue::Boolean(false),
        RespFrame::SimpleString(status) => LuaValue::Table(reply_table(lua, "ok", status)?),
        RespFrame::Error(message) => LuaValue::Table(reply_table(lua, "err", message)?),
        RespFrame::Array(Some(items)) => {
            let table = lua.create_table_with_capacity(items.len(), 0)?;
            for (i, item) in items.iter().enumerate() {
                table.raw_set(i + 1, reply_to_lua(lua, item)?)?;
            }
            LuaValue::Table(table)
        }
    })
}

/// Convert a script's return value into a reply
fn lua_to_reply(value: &LuaValue) -> RespFrame {
    match value {
        LuaValue::Boolean(true) => RespFrame::Integer(1),
        LuaValue::Integer(n) => RespFrame::Integer(*n),
        LuaValue::Number(n) => RespFrame::Integer(n.trunc() as i64),
        LuaValue::String(s) => RespFrame::bulk_string(s.as_bytes().to_vec()),
        LuaValue::Table(table) => table_to_reply(table),
        _ => RespFrame::null_bulk(),
    }
}

fn table_to_reply(table: &Table) -> RespFrame {
    if let Ok(LuaValue::String(message)) = table.raw_get::<LuaValue>("err") {
        return RespFrame::error(message.as_bytes().to_vec());
    }
    if let Ok(LuaValue::String(status)) = table.raw_get::<LuaValue>("ok") {
        return RespFrame::simple_string(status.as_bytes().to_vec());
    }
    let mut items = Vec::new();
    for i in 1.. {
        match table.raw_get::<LuaValue>(i) {
            Ok(LuaValue::Nil) | Err(_) => break,
            Ok(value) => items.push(lua_to_reply(&value)),
        }
    }
    RespFrame::array(items)
}

/// Map a Lua failure to the error EVAL replies with
fn script_failure(err: mlua::Error) -> EmbedisError {
    match err {
        mlua::Error::CallbackError { cause, .. } => script_failure((*cause).clone()),
        mlua::Error::ExternalError(ref inner) => match inner.downcast_ref::<Abort>() {
            Some(Abort::Killed) => ScriptError::Killed.into(),
            Some(Abort::Reply(line)) => ScriptError::Raised(line.clone()).into(),
            None => ScriptError::Runtime(err.to_string()).into(),
        },
        mlua::Error::SyntaxError { message, .. } => ScriptError::Compile(message).into(),
        mlua::Error::RuntimeError(message) => ScriptError::Runtime(message).into(),
        other => ScriptError::Runtime(other.to_string()).into(),
    }
}

/// Script cache, evaluator and kill bookkeeping shared by all sessions
pub struct ScriptRegistry {
    cache: ScriptCache,
    evaluator: Option<Arc<dyn ScriptEvaluator>>,
    busy: AtomicBool,
    wrote: AtomicBool,
    kill: KillFlag,
}

impl fmt::Debug for ScriptRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptRegistry")
            .field("scripts", &self.cache.len())
            .field("enabled", &self.evaluator.is_some())
            .field("busy", &self.busy.load(Ordering::SeqCst))
            .finish()
    }
}

impl ScriptRegistry {
    /// A registry running scripts through `evaluator`; `None` disables scripting
    pub fn new(evaluator: Option<Arc<dyn ScriptEvaluator>>) -> Self {
        ScriptRegistry {
            cache: ScriptCache::new(),
            evaluator,
            busy: AtomicBool::new(false),
            wrote: AtomicBool::new(false),
            kill: KillFlag::default(),
        }
    }

    pub fn cache(&self) -> &ScriptCache {
        &self.cache
    }

    /// SCRIPT LOAD
    pub fn load(&self, body: &[u8]) -> String {
        let sha = self.cache.load(body);
        debug!(sha = %sha, "Script loaded");
        sha
    }

    /// SCRIPT FLUSH
    pub fn flush(&self) {
        let count = self.cache.flush();
        info!(scripts = count, "Script cache flushed");
    }

    /// SCRIPT KILL
    pub fn kill(&self) -> Result<()> {
        if !self.busy.load(Ordering::SeqCst) {
            return Err(ScriptError::NotBusy.into());
        }
        if self.wrote.load(Ordering::SeqCst) {
            return Err(ScriptError::Unkillable.into());
        }
        info!("Killing running script");
        self.kill.set();
        Ok(())
    }

    /// Whether a script is running right now
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Record that the running script modified the dataset
    pub(crate) fn note_write(&self) {
        self.wrote.store(true, Ordering::SeqCst);
    }

    /// Run a script body. The caller holds the keyspace lock and owns rollback.
    pub(crate) fn run(
        &self,
        body: &[u8],
        keys: &[Vec<u8>],
        args: &[Vec<u8>],
        host: &mut dyn ScriptHost,
    ) -> Result<RespFrame> {
        let evaluator = self
            .evaluator
            .as_ref()
            .ok_or_else(|| crate::error::CommandError::InvalidState("scripting is disabled".to_string()))?;

        self.kill.clear();
        self.wrote.store(false, Ordering::SeqCst);
        self.busy.store(true, Ordering::SeqCst);
        let result = evaluator.eval(
            ScriptCall {
                body,
                keys,
                args,
                kill: &self.kill,
            },
            host,
        );
        self.busy.store(false, Ordering::SeqCst);
        self.kill.clear();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, StorageError};

    /// Host answering every call with a canned reply, or WRONGTYPE when
    /// there is none, and recording argv
    struct RecordingHost {
        calls: Vec<Vec<Vec<u8>>>,
        reply: Option<RespFrame>,
    }

    impl ScriptHost for RecordingHost {
        fn call(&mut self, argv: Vec<Vec<u8>>) -> Result<RespFrame> {
            self.calls.push(argv);
            self.reply
                .clone()
                .ok_or_else(|| StorageError::WrongType.into())
        }
    }

    fn host(reply: Option<RespFrame>) -> RecordingHost {
        RecordingHost { calls: Vec::new(), reply }
    }

    fn eval(body: &str, keys: &[&str], args: &[&str], host: &mut RecordingHost) -> Result<RespFrame> {
        let keys: Vec<Vec<u8>> = keys.iter().map(|k| k.as_bytes().to_vec()).collect();
        let args: Vec<Vec<u8>> = args.iter().map(|a| a.as_bytes().to_vec()).collect();
        let kill = KillFlag::default();
        LuaEvaluator::new().eval(
            ScriptCall {
                body: body.as_bytes(),
                keys: &keys,
                args: &args,
                kill: &kill,
            },
            host,
        )
    }

    #[test]
    fn test_value_conversions() {
        let mut h = host(Some(RespFrame::ok()));
        assert_eq!(eval("return 3.99", &[], &[], &mut h).unwrap(), RespFrame::Integer(3));
        assert_eq!(eval("return 'x'", &[], &[], &mut h).unwrap(), RespFrame::bulk_string("x"));
        assert_eq!(eval("return false", &[], &[], &mut h).unwrap(), RespFrame::null_bulk());
        assert_eq!(eval("return true", &[], &[], &mut h).unwrap(), RespFrame::Integer(1));
        assert_eq!(
            eval("return {1, 'a', nil, 'b'}", &[], &[], &mut h).unwrap(),
            RespFrame::array(vec![RespFrame::Integer(1), RespFrame::bulk_string("a")])
        );
        assert_eq!(
            eval("return redis.status_reply('FINE')", &[], &[], &mut h).unwrap(),
            RespFrame::simple_string("FINE")
        );
        assert_eq!(
            eval("return redis.error_reply('ERR nope')", &[], &[], &mut h).unwrap(),
            RespFrame::error("ERR nope")
        );
    }

    #[test]
    fn test_keys_and_argv() {
        let mut h = host(Some(RespFrame::ok()));
        let reply = eval("return {KEYS[1], ARGV[2], #KEYS}", &["k"], &["a", "b"], &mut h).unwrap();
        assert_eq!(
            reply,
            RespFrame::array(vec![
                RespFrame::bulk_string("k"),
                RespFrame::bulk_string("b"),
                RespFrame::Integer(1),
            ])
        );
    }

    #[test]
    fn test_redis_call_reaches_host() {
        let mut h = host(Some(RespFrame::bulk_string("v")));
        let reply = eval("return redis.call('GET', KEYS[1], 5)", &["k"], &[], &mut h).unwrap();
        assert_eq!(reply, RespFrame::bulk_string("v"));
        assert_eq!(h.calls, vec![vec![b"GET".to_vec(), b"k".to_vec(), b"5".to_vec()]]);
    }

    #[test]
    fn test_call_raises_and_pcall_returns_error() {
        let mut h = host(None);
        let err = eval("return redis.call('INCR', 'k')", &[], &[], &mut h).unwrap_err();
        assert!(err.to_string().starts_with("WRONGTYPE"));

        let reply = eval("local r = redis.pcall('INCR', 'k'); return r", &[], &[], &mut h).unwrap();
        assert!(reply.is_error());
    }

    #[test]
    fn test_compile_error() {
        let mut h = host(Some(RespFrame::ok()));
        let err = eval("return +", &[], &[], &mut h).unwrap_err();
        assert!(err.to_string().starts_with("ERR Error compiling script"));
        assert_eq!(err.kind(), ErrorKind::Script);
    }

    #[test]
    fn test_sandbox() {
        let mut h = host(Some(RespFrame::ok()));
        assert_eq!(eval("return os", &[], &[], &mut h).unwrap(), RespFrame::null_bulk());
        assert!(eval("return io.open('x')", &[], &[], &mut h).is_err());
        assert_eq!(
            eval("return redis.sha1hex('return 1')", &[], &[], &mut h).unwrap(),
            RespFrame::bulk_string("e0e1f9fabfc9d4800c877a703b823ac0578ff8db")
        );
    }

    #[test]
    fn test_kill_flag_stops_script() {
        let mut h = host(Some(RespFrame::ok()));
        let kill = KillFlag::default();
        kill.set();
        let err = LuaEvaluator::new()
            .eval(
                ScriptCall {
                    body: b"while true do end",
                    keys: &[],
                    args: &[],
                    kill: &kill,
                },
                &mut h,
            )
            .unwrap_err();
        assert!(matches!(err, EmbedisError::Script(ScriptError::Killed)));
    }

    #[test]
    fn test_registry_kill_states() {
        let registry = ScriptRegistry::new(Some(Arc::new(LuaEvaluator::new())));
        assert!(matches!(registry.kill(), Err(EmbedisError::Script(ScriptError::NotBusy))));

        let disabled = ScriptRegistry::new(None);
        let mut h = host(Some(RespFrame::ok()));
        assert_eq!(
            disabled.run(b"return 1", &[], &[], &mut h).unwrap_err().kind(),
            ErrorKind::State
        );
    }
}
