//! Command processing.
//!
//! Maps a decoded argument list to a command and runs it against the store.
//! Execution is synchronous and infallible: anything that is not a
//! recognized command becomes an `ERR` response.

use crate::protocol::Response;
use crate::storage::Store;
use bytes::Bytes;

/// A recognized command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get { key: Bytes },
    Set { key: Bytes, value: Bytes },
    Del { key: Bytes },
}

impl Command {
    /// Recognize a command from its argument list.
    ///
    /// Names are matched exactly (lowercase) and the argument count must fit
    /// the command.
    pub fn parse(args: &[Bytes]) -> Option<Command> {
        match args {
            [name, key] if &name[..] == b"get" => Some(Command::Get { key: key.clone() }),
            [name, key, value] if &name[..] == b"set" => Some(Command::Set {
                key: key.clone(),
                value: value.clone(),
            }),
            [name, key] if &name[..] == b"del" => Some(Command::Del { key: key.clone() }),
            _ => None,
        }
    }

    /// Run the command.
    pub fn execute(self, store: &mut Store) -> Response {
        match self {
            Command::Get { key } => match store.get(&key) {
                Some(value) => Response::ok(value.clone()),
                None => Response::not_found(),
            },
            Command::Set { key, value } => {
                store.set(key, value.clone());
                Response::ok(value)
            }
            Command::Del { key } => {
                // Deleting a missing key is not an error.
                store.delete(&key);
                Response::ok_empty()
            }
        }
    }
}

/// Parse and run one request.
pub fn execute(args: &[Bytes], store: &mut Store) -> Response {
    match Command::parse(args) {
        Some(command) => command.execute(store),
        None => Response::err(),
    }
}
