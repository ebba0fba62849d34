//! Service clients: named methods, constants and broadcasts on top of c2c
//! messages.
//!
//! A host registers namespaces in a [`Registry`] and serves them with a
//! [`ServiceHost`]. Other clients reach it through the functions in
//! [`remote`]. Every exchange is an ordinary c2c message whose payload is a
//! dictionary:
//!
//! ```text
//! { "sc": "call", "path": ["Arithmetic", "sum"], "args": [3, 4] }
//! ```

mod host;
mod namespace;
pub mod remote;

pub use host::ServiceHost;
pub use namespace::{
    ArgSpec, MethodContext, MethodHandler, NamespaceHandle, Registry, RegistryError,
    validate_args,
};

use std::fmt;

use c2c_core::Value;

const KEY_COMMAND: &str = "sc";
const KEY_PATH: &str = "path";
const KEY_ARGS: &str = "args";

/// Service client operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScCommand {
    /// Describe a namespace, method or broadcast.
    Introspect,
    /// Invoke a method.
    Call,
    /// Receive every emission of a broadcast.
    Subscribe,
}

impl ScCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Introspect => "introspect",
            Self::Call => "call",
            Self::Subscribe => "subscribe",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "introspect" => Some(Self::Introspect),
            "call" => Some(Self::Call),
            "subscribe" => Some(Self::Subscribe),
            _ => None,
        }
    }
}

impl fmt::Display for ScCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded service client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScRequest {
    pub command: ScCommand,
    pub path: Vec<String>,
    pub args: Vec<Value>,
}

impl ScRequest {
    pub fn new<I, S>(command: ScCommand, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command,
            path: path.into_iter().map(Into::into).collect(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Encodes the request as a message payload.
    pub fn to_value(&self) -> Value {
        let mut entries = vec![
            (KEY_COMMAND, Value::string(self.command.as_str())),
            (KEY_PATH, Value::path(self.path.iter().cloned())),
        ];
        if self.command == ScCommand::Call {
            entries.push((KEY_ARGS, Value::List(self.args.clone())));
        }
        Value::dict(entries)
    }

    /// Decodes a message payload.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let command = value
            .dict_get(KEY_COMMAND)
            .and_then(Value::as_str)
            .ok_or_else(|| "not a service client request".to_string())?;
        let command =
            ScCommand::parse(command).ok_or_else(|| format!("unknown command '{}'", command))?;

        let path = match value.dict_get(KEY_PATH) {
            Some(path) => path
                .as_path()
                .ok_or_else(|| "path must be a list of strings".to_string())?,
            None => Vec::new(),
        };

        let args = match value.dict_get(KEY_ARGS) {
            Some(args) => args
                .as_list()
                .ok_or_else(|| "args must be a list".to_string())?
                .to_vec(),
            None => Vec::new(),
        };

        Ok(Self {
            command,
            path,
            args,
        })
    }
}
