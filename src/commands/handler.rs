//! Command Handler
//!
//! Turns parsed RESP requests into [`Store`] calls and store results back
//! into RESP replies.
//!
//! ## Commands
//!
//! - `PING [message]`
//! - `SET key value`
//! - `SETEX key seconds value` / `PSETEX key milliseconds value`
//! - `EXPIRE key seconds` / `PEXPIRE key milliseconds`
//! - `GET key`
//! - `TTL key` / `PTTL key`
//! - `VALUES`
//! - `DEL key`
//! - `DBSIZE`
//! - `SAVE`
//! - `QUIT`
//!
//! ## Error replies
//!
//! Every failure is answered with an error reply whose first word tells
//! the kind:
//!
//! | Prefix     | Cause                                             |
//! |------------|---------------------------------------------------|
//! | `ERR`      | unknown command, wrong number of arguments        |
//! | `INVALID`  | empty key, bad TTL, non-UTF-8 text                |
//! | `NOTFOUND` | the key does not exist                            |
//! | `PERSIST`  | `SAVE` could not write the snapshot               |

use crate::protocol::RespValue;
use crate::storage::{Store, StoreError};
use bytes::Bytes;
use chrono::TimeDelta;
use std::sync::Arc;
use tracing::trace;

/// Unit of a TTL argument.
#[derive(Debug, Clone, Copy)]
enum TtlUnit {
    Seconds,
    Millis,
}

/// Executes commands against a shared [`Store`].
///
/// Cloning is cheap; every connection gets its own clone.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    store: Arc<Store>,
}

impl CommandHandler {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Executes a command and returns the reply to send back.
    ///
    /// `command` should be an array whose first element is the command name.
    /// Everything except `SAVE` completes without awaiting; `SAVE` waits for
    /// its snapshot on the blocking pool.
    pub async fn execute(&self, command: RespValue) -> RespValue {
        let args = match command {
            RespValue::Array(args) => args,
            _ => return RespValue::error("ERR invalid command format"),
        };

        let Some(name) = args.first().and_then(RespValue::as_str) else {
            return RespValue::error("ERR invalid command name");
        };
        let name = name.to_ascii_uppercase();
        trace!(command = %name, args = args.len() - 1, "Executing command");

        let result = match name.as_str() {
            "SAVE" => self.cmd_save(&args[1..]).await,
            _ => self.dispatch(&name, &args[1..]),
        };
        result.unwrap_or_else(|error_reply| error_reply)
    }

    /// Routes a command to its implementation. Errors are already replies.
    fn dispatch(&self, cmd: &str, args: &[RespValue]) -> Result<RespValue, RespValue> {
        match cmd {
            "PING" => self.cmd_ping(args),
            "SET" => self.cmd_set(args),
            "SETEX" => self.cmd_setex(args, TtlUnit::Seconds),
            "PSETEX" => self.cmd_setex(args, TtlUnit::Millis),
            "EXPIRE" => self.cmd_expire(args, TtlUnit::Seconds),
            "PEXPIRE" => self.cmd_expire(args, TtlUnit::Millis),
            "GET" => self.cmd_get(args),
            "TTL" => self.cmd_ttl(args, TtlUnit::Seconds),
            "PTTL" => self.cmd_ttl(args, TtlUnit::Millis),
            "VALUES" => self.cmd_values(args),
            "DEL" => self.cmd_del(args),
            "DBSIZE" => self.cmd_dbsize(args),
            "QUIT" => Ok(RespValue::ok()),
            _ => Err(RespValue::error(format!("ERR unknown command '{}'", cmd))),
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// PING [message]
    fn cmd_ping(&self, args: &[RespValue]) -> Result<RespValue, RespValue> {
        match args {
            [] => Ok(RespValue::simple_string("PONG")),
            [message] => Ok(message.clone()),
            _ => Err(arity_error("PING")),
        }
    }

    /// SET key value
    fn cmd_set(&self, args: &[RespValue]) -> Result<RespValue, RespValue> {
        let [key, value] = args else {
            return Err(arity_error("SET"));
        };

        self.store
            .put(text_arg(key, "key")?, text_arg(value, "value")?)
            .map_err(store_error)?;
        Ok(RespValue::ok())
    }

    /// SETEX key seconds value / PSETEX key milliseconds value
    fn cmd_setex(&self, args: &[RespValue], unit: TtlUnit) -> Result<RespValue, RespValue> {
        let [key, ttl, value] = args else {
            return Err(arity_error(match unit {
                TtlUnit::Seconds => "SETEX",
                TtlUnit::Millis => "PSETEX",
            }));
        };

        let key = key_arg(key)?;
        let ttl = ttl_arg(ttl, unit)?;
        self.store
            .put_with_ttl(key, text_arg(value, "value")?, ttl)
            .map_err(store_error)?;
        Ok(RespValue::ok())
    }

    /// EXPIRE key seconds / PEXPIRE key milliseconds
    fn cmd_expire(&self, args: &[RespValue], unit: TtlUnit) -> Result<RespValue, RespValue> {
        let [key, ttl] = args else {
            return Err(arity_error(match unit {
                TtlUnit::Seconds => "EXPIRE",
                TtlUnit::Millis => "PEXPIRE",
            }));
        };

        let key = key_arg(key)?;
        self.store
            .set_ttl(&key, ttl_arg(ttl, unit)?)
            .map_err(store_error)?;
        Ok(RespValue::ok())
    }

    /// GET key
    fn cmd_get(&self, args: &[RespValue]) -> Result<RespValue, RespValue> {
        let [key] = args else {
            return Err(arity_error("GET"));
        };

        let value = self.store.get(&key_arg(key)?).map_err(store_error)?;
        Ok(RespValue::bulk_string(Bytes::from(value)))
    }

    /// TTL key / PTTL key
    ///
    /// Replies with the remaining time, floored and never below zero, or
    /// `-1` when the key has no TTL.
    fn cmd_ttl(&self, args: &[RespValue], unit: TtlUnit) -> Result<RespValue, RespValue> {
        let [key] = args else {
            return Err(arity_error(match unit {
                TtlUnit::Seconds => "TTL",
                TtlUnit::Millis => "PTTL",
            }));
        };

        let entry = self.store.get_entry(&key_arg(key)?).map_err(store_error)?;
        let reply = match entry.remaining_ttl() {
            None => -1,
            Some(remaining) => match unit {
                TtlUnit::Seconds => remaining.num_seconds().max(0),
                TtlUnit::Millis => remaining.num_milliseconds().max(0),
            },
        };
        Ok(RespValue::integer(reply))
    }

    /// VALUES
    fn cmd_values(&self, args: &[RespValue]) -> Result<RespValue, RespValue> {
        if !args.is_empty() {
            return Err(arity_error("VALUES"));
        }

        let values = self
            .store
            .values()
            .into_iter()
            .map(|v| RespValue::bulk_string(Bytes::from(v)))
            .collect();
        Ok(RespValue::array(values))
    }

    /// DEL key
    fn cmd_del(&self, args: &[RespValue]) -> Result<RespValue, RespValue> {
        let [key] = args else {
            return Err(arity_error("DEL"));
        };

        self.store.delete(&key_arg(key)?).map_err(store_error)?;
        Ok(RespValue::ok())
    }

    /// DBSIZE
    fn cmd_dbsize(&self, args: &[RespValue]) -> Result<RespValue, RespValue> {
        if !args.is_empty() {
            return Err(arity_error("DBSIZE"));
        }
        Ok(RespValue::integer(
            i64::try_from(self.store.len()).unwrap_or(i64::MAX),
        ))
    }

    /// SAVE
    ///
    /// The snapshot fsyncs, so it runs off the async worker threads.
    async fn cmd_save(&self, args: &[RespValue]) -> Result<RespValue, RespValue> {
        if !args.is_empty() {
            return Err(arity_error("SAVE"));
        }

        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || store.save()).await {
            Ok(result) => result.map_err(store_error)?,
            Err(e) => {
                return Err(RespValue::error(format!(
                    "PERSIST snapshot task failed: {}",
                    e
                )))
            }
        }
        Ok(RespValue::ok())
    }
}

// ============================================================================
// Argument helpers
// ============================================================================

fn arity_error(cmd: &str) -> RespValue {
    RespValue::error(format!(
        "ERR wrong number of arguments for '{}' command",
        cmd
    ))
}

/// Maps a store error to its error reply.
fn store_error(err: StoreError) -> RespValue {
    match &err {
        StoreError::NotFound(_) => RespValue::error(format!("NOTFOUND {}", err)),
        StoreError::InvalidArgument(msg) => RespValue::error(format!("INVALID {}", msg)),
        StoreError::Persistence { .. } => RespValue::error(format!("PERSIST {}", err)),
    }
}

fn text_arg(value: &RespValue, what: &str) -> Result<String, RespValue> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| RespValue::error(format!("INVALID {} is not valid UTF-8 text", what)))
}

fn key_arg(value: &RespValue) -> Result<String, RespValue> {
    let key = text_arg(value, "key")?;
    if key.is_empty() {
        return Err(RespValue::error("INVALID key must not be empty"));
    }
    Ok(key)
}

/// Decodes a TTL argument. Zero and negative values are allowed.
fn ttl_arg(value: &RespValue, unit: TtlUnit) -> Result<TimeDelta, RespValue> {
    let amount: i64 = match value {
        RespValue::Integer(n) => *n,
        other => other
            .as_str()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| RespValue::error("INVALID ttl is not an integer"))?,
    };

    let ttl = match unit {
        TtlUnit::Seconds => TimeDelta::try_seconds(amount),
        TtlUnit::Millis => TimeDelta::try_milliseconds(amount),
    };
    ttl.ok_or_else(|| RespValue::error("INVALID ttl is out of range"))
}

/// Returns the upper-cased command name of a request, if it has one.
pub fn command_name(command: &RespValue) -> Option<String> {
    match command {
        RespValue::Array(args) => args
            .first()
            .and_then(RespValue::as_str)
            .map(str::to_ascii_uppercase),
        _ => None,
    }
}
