//! Command handler for dotctl

use std::time::Duration;

use clap::Subcommand;
use dotcache::{DotCache, Result, Store};
use serde_json::Value;

/// Printed for a miss
const NIL: &str = "(nil)";

/// Cache commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Read a value
    Get { key: String },

    /// Read a value and delete it
    Pull { key: String },

    /// Store a value
    Put {
        key: String,
        value: String,
        /// Expiry in seconds (no expiry when omitted)
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Store a value only if none exists
    Add {
        key: String,
        value: String,
        /// Expiry in seconds (no expiry when omitted)
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Store a value with no expiry
    Forever { key: String, value: String },

    /// Delete keys and everything registered beneath them
    Forget {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Read several values
    Many {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// List registered keys, optionally under a prefix
    Keys { prefix: Option<String> },

    /// Delete every registered key
    Clear,
}

pub struct CommandHandler<S: Store + ?Sized> {
    cache: DotCache<S>,
}

impl<S: Store + ?Sized> CommandHandler<S> {
    pub fn new(cache: DotCache<S>) -> Self {
        Self { cache }
    }

    pub fn handle(&self, cmd: Command) -> Result<String> {
        match cmd {
            Command::Get { key } => Ok(render(self.cache.get(&key)?)),
            Command::Pull { key } => Ok(render(self.cache.pull(&key)?)),
            Command::Put { key, value, ttl } => {
                self.cache.put(&key, &parse_value(&value), ttl_of(ttl))?;
                Ok("OK".to_string())
            }
            Command::Add { key, value, ttl } => {
                let added = self.cache.add(&key, &parse_value(&value), ttl_of(ttl))?;
                Ok(if added { "OK" } else { "(not stored)" }.to_string())
            }
            Command::Forever { key, value } => {
                self.cache.forever(&key, &parse_value(&value))?;
                Ok("OK".to_string())
            }
            Command::Forget { keys } => {
                let mut forgotten = 0;
                for key in &keys {
                    if self.cache.forget(key)? {
                        forgotten += 1;
                    }
                }
                Ok(format!("(integer) {}", forgotten))
            }
            Command::Many { keys } => {
                let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
                let lines: Vec<String> = self
                    .cache
                    .many::<Value>(&keys)?
                    .into_iter()
                    .map(|(key, value)| format!("{}: {}", key, render(value)))
                    .collect();
                Ok(lines.join("\n"))
            }
            Command::Keys { prefix } => {
                let keys = self.cache.keys(prefix.as_deref());
                if keys.is_empty() {
                    Ok("(empty)".to_string())
                } else {
                    Ok(keys.join("\n"))
                }
            }
            Command::Clear => {
                self.cache.clear()?;
                Ok("OK".to_string())
            }
        }
    }
}

/// JSON if it parses as JSON, otherwise a plain string
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn ttl_of(seconds: Option<u64>) -> Option<Duration> {
    seconds.map(Duration::from_secs)
}

fn render(value: Option<Value>) -> String {
    match value {
        None => NIL.to_string(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    }
}
