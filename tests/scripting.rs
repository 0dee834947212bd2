//! EVAL/EVALSHA/SCRIPT through sessions

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use embedis::{Config, Engine, ErrorKind, RespFrame, Session};

fn engine() -> Arc<Engine> {
    Arc::new(Engine::new(&Config::default()))
}

#[test]
fn test_script_load_returns_sha1() {
    let mut s = Session::new(engine());
    let reply = s.execute(&["SCRIPT", "LOAD", "return 'hello'"]).unwrap();
    assert_eq!(reply, RespFrame::bulk_string("1b936e3fe509bcbc9cd0664897bbe8fd0cac101b"));
}

#[test]
fn test_evalsha_matches_eval() {
    let mut s = Session::new(engine());
    let body = "return {KEYS[1], ARGV[1], redis.call('INCRBY', KEYS[1], ARGV[1])}";
    let eval = s.execute(&["EVAL", body, "1", "counter", "5"]).unwrap();

    let sha = s.execute(&["SCRIPT", "LOAD", body]).unwrap();
    let sha = String::from_utf8(sha.as_bytes().unwrap().to_vec()).unwrap();
    s.execute(&["SET", "counter", "0"]).unwrap();
    let evalsha = s.execute(&["EVALSHA", &sha, "1", "counter", "5"]).unwrap();
    assert_eq!(eval, evalsha);
}

#[test]
fn test_script_errors() {
    let mut s = Session::new(engine());
    let err = s.execute(&["EVAL", "return +", "0"]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Script);
    assert!(err.to_string().starts_with("ERR Error compiling script"));

    s.execute(&["SET", "k", "v"]).unwrap();
    let err = s.execute(&["EVAL", "return redis.call('LPUSH', 'k', 'x')", "0"]).unwrap_err();
    assert!(err.to_string().starts_with("WRONGTYPE"));

    let reply = s.execute(&["EVAL", "return redis.pcall('LPUSH', 'k', 'x')", "0"]).unwrap();
    assert!(reply.is_error());
}

#[test]
fn test_script_inside_transaction() {
    let mut s = Session::new(engine());
    s.execute(&["MULTI"]).unwrap();
    s.execute(&["EVAL", "return redis.call('SET', KEYS[1], 'x')", "1", "k"]).unwrap();
    s.execute(&["GET", "k"]).unwrap();
    assert_eq!(
        s.execute(&["EXEC"]).unwrap(),
        RespFrame::array(vec![RespFrame::ok(), RespFrame::bulk_string("x")])
    );
}

#[test]
fn test_script_kill() {
    let engine = engine();
    let runner = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || Session::new(engine).execute(&["EVAL", "while true do end", "0"]))
    };

    let mut admin = Session::new(Arc::clone(&engine));
    let deadline = Instant::now() + Duration::from_secs(5);
    while !engine.scripts().is_busy() {
        assert!(Instant::now() < deadline, "script never started");
        thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(admin.execute(&["SCRIPT", "KILL"]).unwrap(), RespFrame::ok());

    let err = runner.join().unwrap().unwrap_err();
    assert!(err.to_string().contains("Script killed by user"));
    let err = admin.execute(&["SCRIPT", "KILL"]).unwrap_err();
    assert!(err.to_string().starts_with("NOTBUSY"));
}

#[test]
fn test_scripting_disabled() {
    let mut config = Config::default();
    config.scripting.enabled = false;
    let mut s = Session::new(Arc::new(Engine::new(&config)));
    assert!(s.execute(&["EVAL", "return 1", "0"]).is_err());
    assert!(s.execute(&["SCRIPT", "LOAD", "return 1"]).is_ok());
}
