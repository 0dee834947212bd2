//! End-to-end behaviour of the data types through a session

use std::sync::Arc;

use embedis::storage::ManualClock;
use embedis::{Config, Engine, ErrorKind, RespFrame, Session};

fn session() -> Session {
    let config = Config {
        seed: Some(42),
        ..Config::default()
    };
    Session::new(Arc::new(Engine::new(&config)))
}

fn bulks(items: &[&str]) -> RespFrame {
    RespFrame::bulk_array(items.iter().map(|s| s.as_bytes()))
}

#[test]
fn test_zadd_counts_only_new_members() {
    let mut s = session();
    assert_eq!(s.execute(&["ZADD", "z", "1", "a", "2", "b", "3", "c"]).unwrap(), RespFrame::Integer(3));
    assert_eq!(s.execute(&["ZADD", "z", "5", "a", "2", "b", "4", "d"]).unwrap(), RespFrame::Integer(1));
    assert_eq!(s.execute(&["ZCARD", "z"]).unwrap(), RespFrame::Integer(4));
}

#[test]
fn test_push_order() {
    let mut s = session();
    s.execute(&["RPUSH", "r", "a", "b", "c"]).unwrap();
    s.execute(&["LPUSH", "l", "a", "b", "c"]).unwrap();
    assert_eq!(s.execute(&["LRANGE", "r", "0", "-1"]).unwrap(), bulks(&["a", "b", "c"]));
    assert_eq!(s.execute(&["LRANGE", "l", "0", "-1"]).unwrap(), bulks(&["c", "b", "a"]));
    assert_eq!(s.execute(&["LRANGE", "r", "-100", "100"]).unwrap(), bulks(&["a", "b", "c"]));
    assert_eq!(s.execute(&["LRANGE", "r", "2", "1"]).unwrap(), RespFrame::array(vec![]));
}

#[test]
fn test_score_ties_order_lexicographically() {
    let mut s = session();
    s.execute(&["ZADD", "z", "1", "b", "1", "a", "0", "c", "2", "d"]).unwrap();
    assert_eq!(
        s.execute(&["ZRANGEBYSCORE", "z", "-inf", "+inf"]).unwrap(),
        bulks(&["c", "a", "b", "d"])
    );
    assert_eq!(s.execute(&["ZRANGEBYSCORE", "z", "(0", "1"]).unwrap(), bulks(&["a", "b"]));
    assert_eq!(
        s.execute(&["ZREVRANGEBYSCORE", "z", "+inf", "-inf", "LIMIT", "0", "2"]).unwrap(),
        bulks(&["d", "b"])
    );
}

#[test]
fn test_lex_ranges() {
    let mut s = session();
    s.execute(&["ZADD", "z", "0", "a", "0", "b", "0", "c", "0", "d"]).unwrap();
    assert_eq!(s.execute(&["ZRANGEBYLEX", "z", "[b", "(d"]).unwrap(), bulks(&["b", "c"]));
    assert_eq!(s.execute(&["ZRANGEBYLEX", "z", "-", "+"]).unwrap(), bulks(&["a", "b", "c", "d"]));
    assert_eq!(s.execute(&["ZLEXCOUNT", "z", "(a", "+"]).unwrap(), RespFrame::Integer(3));
    assert!(s.execute(&["ZRANGEBYLEX", "z", "b", "d"]).is_err());
}

#[test]
fn test_emptied_collections_are_removed() {
    let mut s = session();
    s.execute(&["SADD", "s", "m"]).unwrap();
    s.execute(&["SREM", "s", "m"]).unwrap();
    s.execute(&["ZADD", "z", "1", "m"]).unwrap();
    s.execute(&["ZREM", "z", "m"]).unwrap();
    s.execute(&["RPUSH", "l", "x"]).unwrap();
    s.execute(&["LPOP", "l"]).unwrap();
    s.execute(&["HSET", "h", "f", "v"]).unwrap();
    s.execute(&["HDEL", "h", "f"]).unwrap();
    assert_eq!(s.execute(&["EXISTS", "s", "z", "l", "h"]).unwrap(), RespFrame::Integer(0));
}

#[test]
fn test_set_add_twice() {
    let mut s = session();
    assert_eq!(s.execute(&["SADD", "A", "x"]).unwrap(), RespFrame::Integer(1));
    assert_eq!(s.execute(&["SADD", "A", "x"]).unwrap(), RespFrame::Integer(0));
    assert_eq!(s.execute(&["SCARD", "A"]).unwrap(), RespFrame::Integer(1));
}

#[test]
fn test_remrangebyrank_with_bad_bounds() {
    let mut s = session();
    s.execute(&["ZADD", "z", "1", "a", "2", "b"]).unwrap();
    let err = s.execute(&["ZREMRANGEBYRANK", "z", "2", "0"]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(s.execute(&["ZCARD", "z"]).unwrap(), RespFrame::Integer(2));
}

#[test]
fn test_wrong_type() {
    let mut s = session();
    s.execute(&["SET", "k", "v"]).unwrap();
    for argv in [
        &["LPUSH", "k", "x"][..],
        &["SADD", "k", "x"][..],
        &["ZADD", "k", "1", "x"][..],
        &["HSET", "k", "f", "v"][..],
        &["XADD", "k", "*", "f", "v"][..],
    ] {
        let err = s.execute(argv).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch, "{:?}", argv);
    }
    assert_eq!(s.execute(&["TYPE", "k"]).unwrap(), RespFrame::simple_string("string"));
}

#[test]
fn test_expiry_with_manual_clock() {
    let clock = ManualClock::new(10_000);
    let engine = Engine::with_clock(&Config::default(), Arc::new(clock.clone()));
    let mut s = Session::new(Arc::new(engine));

    s.execute(&["SET", "k", "v", "PX", "1500"]).unwrap();
    assert_eq!(s.execute(&["PTTL", "k"]).unwrap(), RespFrame::Integer(1500));
    clock.advance(1000);
    assert_eq!(s.execute(&["TTL", "k"]).unwrap(), RespFrame::Integer(1));
    clock.advance(500);
    assert_eq!(s.execute(&["GET", "k"]).unwrap(), RespFrame::null_bulk());
    assert_eq!(s.execute(&["TTL", "k"]).unwrap(), RespFrame::Integer(-2));
}

#[test]
fn test_stream_ids_increase() {
    let clock = ManualClock::new(7);
    let engine = Engine::with_clock(&Config::default(), Arc::new(clock));
    let mut s = Session::new(Arc::new(engine));

    let mut last = String::new();
    for _ in 0..5 {
        let reply = s.execute(&["XADD", "s", "*", "f", "v"]).unwrap();
        let id = String::from_utf8(reply.as_bytes().unwrap().to_vec()).unwrap();
        assert!(id.starts_with("7-"));
        if !last.is_empty() {
            let prev: u64 = last[2..].parse().unwrap();
            let next: u64 = id[2..].parse().unwrap();
            assert!(next > prev);
        }
        last = id;
    }
}

#[test]
fn test_exact_xtrim() {
    let mut s = session();
    for i in 1..=20 {
        s.execute(&["XADD", "s", &format!("{i}-1"), "f", "v"]).unwrap();
    }
    assert_eq!(s.execute(&["XTRIM", "s", "MAXLEN", "5"]).unwrap(), RespFrame::Integer(15));
    assert_eq!(s.execute(&["XLEN", "s"]).unwrap(), RespFrame::Integer(5));
}

#[test]
fn test_databases_are_isolated() {
    let mut s = session();
    s.execute(&["SET", "k", "0"]).unwrap();
    s.execute(&["SELECT", "1"]).unwrap();
    assert_eq!(s.execute(&["GET", "k"]).unwrap(), RespFrame::null_bulk());
    s.execute(&["SET", "k", "1"]).unwrap();
    s.execute(&["SELECT", "0"]).unwrap();
    assert_eq!(s.execute(&["MOVE", "k", "1"]).unwrap(), RespFrame::Integer(0));
    assert_eq!(s.execute(&["FLUSHALL"]).unwrap(), RespFrame::ok());
    assert_eq!(s.execute(&["DBSIZE"]).unwrap(), RespFrame::Integer(0));
}
