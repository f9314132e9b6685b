//! Key commands (DEL, EXISTS, TYPE, RENAME, RENAMENX, KEYS, RANDOMKEY)

use super::{to_cmd_line, Command};
use crate::database::Db;
use crate::protocol::RespValue;
use bytes::Bytes;

/// DEL command - Delete one or more keys
///
/// Syntax: DEL key [key ...]
pub struct DelCommand;

impl Command for DelCommand {
    fn execute(&self, db: &Db, args: &[Bytes]) -> RespValue {
        let deleted = db.removes(args);
        if deleted > 0 {
            db.add_aof(to_cmd_line("del", args));
        }
        RespValue::integer(deleted as i64)
    }

    fn name(&self) -> &'static str {
        "DEL"
    }

    fn arity(&self) -> i32 {
        -1
    }

    fn is_write(&self) -> bool {
        true
    }
}

/// EXISTS command - Count how many of the given keys exist
///
/// Syntax: EXISTS key [key ...]
pub struct ExistsCommand;

impl Command for ExistsCommand {
    fn execute(&self, db: &Db, args: &[Bytes]) -> RespValue {
        let count = args
            .iter()
            .filter(|key| db.get_entity(key).is_some())
            .count();
        RespValue::integer(count as i64)
    }

    fn name(&self) -> &'static str {
        "EXISTS"
    }

    fn arity(&self) -> i32 {
        -1
    }
}

/// TYPE command - Type of the value stored at key
///
/// Syntax: TYPE key
pub struct TypeCommand;

impl Command for TypeCommand {
    fn execute(&self, db: &Db, args: &[Bytes]) -> RespValue {
        match db.get_entity(&args[0]) {
            Some(entity) => RespValue::simple_string(entity.type_name()),
            None => RespValue::simple_string("none"),
        }
    }

    fn name(&self) -> &'static str {
        "TYPE"
    }

    fn arity(&self) -> i32 {
        1
    }
}

/// RENAME command - Rename a key, overwriting the destination
///
/// Syntax: RENAME key newkey
pub struct RenameCommand;

impl Command for RenameCommand {
    fn execute(&self, db: &Db, args: &[Bytes]) -> RespValue {
        let (src, dest) = (&args[0], &args[1]);
        let entity = match db.get_entity(src) {
            Some(entity) => entity,
            None => return RespValue::error("ERR no such key"),
        };

        db.put_entity(dest.clone(), (*entity).clone());
        if src != dest {
            db.remove(src);
        }
        db.add_aof(to_cmd_line("rename", args));
        RespValue::ok()
    }

    fn name(&self) -> &'static str {
        "RENAME"
    }

    fn arity(&self) -> i32 {
        2
    }

    fn is_write(&self) -> bool {
        true
    }

    fn is_read_modify_write(&self) -> bool {
        true
    }
}

/// RENAMENX command - Rename a key only if the destination does not exist
///
/// Syntax: RENAMENX key newkey
pub struct RenameNxCommand;

impl Command for RenameNxCommand {
    fn execute(&self, db: &Db, args: &[Bytes]) -> RespValue {
        let (src, dest) = (&args[0], &args[1]);
        let entity = match db.get_entity(src) {
            Some(entity) => entity,
            None => return RespValue::error("ERR no such key"),
        };

        if db.put_if_absent(dest.clone(), (*entity).clone()) == 0 {
            return RespValue::integer(0);
        }
        db.remove(src);
        db.add_aof(to_cmd_line("renamenx", args));
        RespValue::integer(1)
    }

    fn name(&self) -> &'static str {
        "RENAMENX"
    }

    fn arity(&self) -> i32 {
        2
    }

    fn is_write(&self) -> bool {
        true
    }

    fn is_read_modify_write(&self) -> bool {
        true
    }
}

/// KEYS command - List keys matching a glob pattern
///
/// Syntax: KEYS pattern
pub struct KeysCommand;

impl Command for KeysCommand {
    fn execute(&self, db: &Db, args: &[Bytes]) -> RespValue {
        let pattern = &args[0];
        let mut matched = Vec::new();
        db.for_each(&mut |key, _| {
            if glob_match(pattern, key) {
                matched.push(key.clone());
            }
            true
        });
        RespValue::multi_bulk(matched)
    }

    fn name(&self) -> &'static str {
        "KEYS"
    }

    fn arity(&self) -> i32 {
        1
    }
}

/// RANDOMKEY command - Return a random key
///
/// Syntax: RANDOMKEY
pub struct RandomKeyCommand;

impl Command for RandomKeyCommand {
    fn execute(&self, db: &Db, _args: &[Bytes]) -> RespValue {
        match db.random_keys(1).into_iter().next() {
            Some(key) => RespValue::bulk_string(key),
            None => RespValue::null(),
        }
    }

    fn name(&self) -> &'static str {
        "RANDOMKEY"
    }

    fn arity(&self) -> i32 {
        0
    }
}

/// Redis-style glob: `*`, `?`, `[abc]`, `[^a-z]` and `\` escapes
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    // Position to resume from after the last `*`
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        let step = if p < pattern.len() {
            match pattern[p] {
                b'*' => {
                    star = Some((p, t));
                    p += 1;
                    continue;
                }
                b'?' => Some(p + 1),
                b'[' => match_class(pattern, p, text[t]),
                b'\\' if p + 1 < pattern.len() => (pattern[p + 1] == text[t]).then_some(p + 2),
                c => (c == text[t]).then_some(p + 1),
            }
        } else {
            None
        };

        match step {
            Some(next) => {
                p = next;
                t += 1;
            }
            None => match star {
                Some((star_p, star_t)) => {
                    p = star_p + 1;
                    t = star_t + 1;
                    star = Some((star_p, star_t + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}

/// Match one byte against the class opening at `pattern[start]`, returning
/// the index just past the closing bracket on success
fn match_class(pattern: &[u8], start: usize, c: u8) -> Option<usize> {
    let mut i = start + 1;
    let negate = pattern.get(i) == Some(&b'^');
    if negate {
        i += 1;
    }

    let mut matched = false;
    while i < pattern.len() && pattern[i] != b']' {
        if pattern[i] == b'\\' && i + 1 < pattern.len() {
            matched |= pattern[i + 1] == c;
            i += 2;
        } else if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' {
            let (lo, hi) = (pattern[i].min(pattern[i + 2]), pattern[i].max(pattern[i + 2]));
            matched |= (lo..=hi).contains(&c);
            i += 3;
        } else {
            matched |= pattern[i] == c;
            i += 1;
        }
    }

    // Unterminated class
    if i >= pattern.len() {
        return None;
    }
    (matched != negate).then_some(i + 1)
}
