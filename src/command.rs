//! REPL commands for the control client.
//!
//! A [`Command`] is parsed from one line of user input and executed against an
//! [`EventDbxClient`]. Supported commands:
//!
//! - `.exit`
//! - `list [take] [cursor]`
//! - `get <type> <id>`
//! - `select <type> <id> <field>...`
//! - `events <type> <id> [take]`
//! - `create <type> <id> <event> [json]` and `append <type> <id> <event> [json]`
//! - `patch <type> <id> <event> <json-patch-array>`
//! - `archive <type> <id>` and `restore <type> <id>`
//!
//! # Example
//! ```rust
//! use eventdbx_client::Command;
//!
//! let cmd = Command::try_from("list 10").unwrap();
//! assert_eq!(cmd, Command::List { take: Some(10), cursor: None });
//! ```
use std::io;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::{
    client::{ControlClient, EventDbxClient},
    error::ClientError,
    model::JsonPatchOperation,
    options::{AppendOptions, PageOptions},
};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unrecognized command '{0}'")]
    UnrecognizedCommand(String),

    #[error("invalid '{command}' command, {reason}")]
    InvalidCommandArguments { command: String, reason: String },

    #[error("no command provided")]
    Empty,

    #[error("failed to read input: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Exit,
    List {
        take: Option<u64>,
        cursor: Option<String>,
    },
    Get {
        aggregate_type: String,
        aggregate_id: String,
    },
    Select {
        aggregate_type: String,
        aggregate_id: String,
        fields: Vec<String>,
    },
    Events {
        aggregate_type: String,
        aggregate_id: String,
        take: Option<u64>,
    },
    Create {
        aggregate_type: String,
        aggregate_id: String,
        event_type: String,
        payload: Option<Value>,
    },
    Append {
        aggregate_type: String,
        aggregate_id: String,
        event_type: String,
        payload: Option<Value>,
    },
    Patch {
        aggregate_type: String,
        aggregate_id: String,
        event_type: String,
        operations: Vec<JsonPatchOperation>,
    },
    Archive {
        aggregate_type: String,
        aggregate_id: String,
    },
    Restore {
        aggregate_type: String,
        aggregate_id: String,
    },
}

/// Splits off up to `n` whitespace separated words and returns them with the
/// untouched remainder.
fn split_words(input: &str, n: usize) -> (Vec<&str>, &str) {
    let mut words = Vec::with_capacity(n);
    let mut rest = input.trim();
    while words.len() < n {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        words.push(&rest[..end]);
        rest = &rest[end..];
    }
    (words, rest.trim())
}

fn invalid(command: &str, reason: impl Into<String>) -> CommandError {
    CommandError::InvalidCommandArguments {
        command: command.to_string(),
        reason: reason.into(),
    }
}

fn take_arg(command: &str, arg: Option<&&str>) -> Result<Option<u64>, CommandError> {
    arg.map(|take| {
        take.parse::<u64>()
            .map_err(|_| invalid(command, "take should be a non-negative integer."))
    })
    .transpose()
}

/// `<type> <id>` pair shared by most commands.
fn target<'a>(
    command: &str,
    words: &[&'a str],
    usage: &str,
) -> Result<(&'a str, &'a str), CommandError> {
    match words {
        [aggregate_type, aggregate_id, ..] => Ok((*aggregate_type, *aggregate_id)),
        _ => Err(invalid(command, format!("Example: {usage}"))),
    }
}

fn json_arg<T: serde::de::DeserializeOwned>(command: &str, text: &str) -> Result<T, CommandError> {
    serde_json::from_str(text).map_err(|e| invalid(command, format!("invalid JSON: {e}")))
}

impl TryFrom<&str> for Command {
    type Error = CommandError;

    fn try_from(input: &str) -> Result<Self, Self::Error> {
        let input = input.trim();
        let (head, rest) = split_words(input, 1);
        let Some(name) = head.first().copied() else {
            return Err(CommandError::Empty);
        };

        match name.to_lowercase().as_str() {
            ".exit" => Ok(Command::Exit),
            "list" => {
                let (words, _) = split_words(rest, 2);
                Ok(Command::List {
                    take: take_arg(name, words.first())?,
                    cursor: words.get(1).map(|c| c.to_string()),
                })
            }
            "get" => {
                let (words, _) = split_words(rest, 2);
                let (aggregate_type, aggregate_id) = target(name, &words, "get person p-1")?;
                Ok(Command::Get {
                    aggregate_type: aggregate_type.into(),
                    aggregate_id: aggregate_id.into(),
                })
            }
            "select" => {
                let words: Vec<&str> = rest.split_whitespace().collect();
                let usage = "select person p-1 name address.city";
                let (aggregate_type, aggregate_id) = target(name, &words, usage)?;
                if words.len() < 3 {
                    return Err(invalid(name, format!("requires at least one field. Example: {usage}")));
                }
                Ok(Command::Select {
                    aggregate_type: aggregate_type.into(),
                    aggregate_id: aggregate_id.into(),
                    fields: words[2..].iter().map(|f| f.to_string()).collect(),
                })
            }
            "events" => {
                let (words, _) = split_words(rest, 3);
                let (aggregate_type, aggregate_id) = target(name, &words, "events person p-1 10")?;
                Ok(Command::Events {
                    aggregate_type: aggregate_type.into(),
                    aggregate_id: aggregate_id.into(),
                    take: take_arg(name, words.get(2))?,
                })
            }
            "create" | "append" => {
                let (words, json) = split_words(rest, 3);
                let usage = format!(r#"{name} person p-1 person_registered {{"name":"Jane"}}"#);
                if words.len() < 3 {
                    return Err(invalid(name, format!("Example: {usage}")));
                }
                let payload = if json.is_empty() {
                    None
                } else {
                    Some(json_arg::<Value>(name, json)?)
                };
                let (aggregate_type, aggregate_id, event_type) =
                    (words[0].to_string(), words[1].to_string(), words[2].to_string());
                if name.eq_ignore_ascii_case("create") {
                    Ok(Command::Create {
                        aggregate_type,
                        aggregate_id,
                        event_type,
                        payload,
                    })
                } else {
                    Ok(Command::Append {
                        aggregate_type,
                        aggregate_id,
                        event_type,
                        payload,
                    })
                }
            }
            "patch" => {
                let (words, json) = split_words(rest, 3);
                let usage = r#"patch person p-1 person_renamed [{"op":"replace","path":"/name","value":"Janet"}]"#;
                if words.len() < 3 || json.is_empty() {
                    return Err(invalid(name, format!("Example: {usage}")));
                }
                Ok(Command::Patch {
                    aggregate_type: words[0].into(),
                    aggregate_id: words[1].into(),
                    event_type: words[2].into(),
                    operations: json_arg(name, json)?,
                })
            }
            "archive" | "restore" => {
                let (words, _) = split_words(rest, 2);
                let (aggregate_type, aggregate_id) =
                    target(name, &words, &format!("{name} person p-1"))?;
                let (aggregate_type, aggregate_id) = (aggregate_type.into(), aggregate_id.into());
                if name.eq_ignore_ascii_case("archive") {
                    Ok(Command::Archive {
                        aggregate_type,
                        aggregate_id,
                    })
                } else {
                    Ok(Command::Restore {
                        aggregate_type,
                        aggregate_id,
                    })
                }
            }
            _ => Err(CommandError::UnrecognizedCommand(input.to_string())),
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, ClientError> {
    serde_json::to_value(value).map_err(|e| ClientError::Protocol(e.to_string()))
}

impl Command {
    /// Runs the command, returning the JSON document to display. `.exit`
    /// yields `None`.
    pub fn execute<C: ControlClient>(
        self,
        client: &mut EventDbxClient<C>,
    ) -> Result<Option<Value>, ClientError> {
        let output = match self {
            Command::Exit => return Ok(None),
            Command::List { take, cursor } => to_value(&client.list(Some(PageOptions {
                take,
                cursor,
                ..Default::default()
            }))?)?,
            Command::Get {
                aggregate_type,
                aggregate_id,
            } => to_value(&client.get(&aggregate_type, &aggregate_id)?)?,
            Command::Select {
                aggregate_type,
                aggregate_id,
                fields,
            } => client
                .select(&aggregate_type, &aggregate_id, &fields)?
                .unwrap_or(Value::Null),
            Command::Events {
                aggregate_type,
                aggregate_id,
                take,
            } => to_value(&client.events(
                &aggregate_type,
                &aggregate_id,
                Some(PageOptions {
                    take,
                    ..Default::default()
                }),
            )?)?,
            Command::Create {
                aggregate_type,
                aggregate_id,
                event_type,
                payload,
            } => to_value(&client.create(
                &aggregate_type,
                &aggregate_id,
                &event_type,
                Some(AppendOptions {
                    payload,
                    ..Default::default()
                }),
            )?)?,
            Command::Append {
                aggregate_type,
                aggregate_id,
                event_type,
                payload,
            } => to_value(&client.append(
                &aggregate_type,
                &aggregate_id,
                &event_type,
                Some(AppendOptions {
                    payload,
                    ..Default::default()
                }),
            )?)?,
            Command::Patch {
                aggregate_type,
                aggregate_id,
                event_type,
                operations,
            } => to_value(&client.patch(
                &aggregate_type,
                &aggregate_id,
                &event_type,
                &operations,
                None,
            )?)?,
            Command::Archive {
                aggregate_type,
                aggregate_id,
            } => to_value(&client.archive(&aggregate_type, &aggregate_id, None)?)?,
            Command::Restore {
                aggregate_type,
                aggregate_id,
            } => to_value(&client.restore(&aggregate_type, &aggregate_id, None)?)?,
        };
        Ok(Some(output))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn command_from_string() {
        let inputs = vec![
            (".exit", Command::Exit),
            (
                "list",
                Command::List {
                    take: None,
                    cursor: None,
                },
            ),
            (
                "list 5 10",
                Command::List {
                    take: Some(5),
                    cursor: Some("10".into()),
                },
            ),
            (
                "events person p-1 3",
                Command::Events {
                    aggregate_type: "person".into(),
                    aggregate_id: "p-1".into(),
                    take: Some(3),
                },
            ),
            (
                "select person p-1 name address.city",
                Command::Select {
                    aggregate_type: "person".into(),
                    aggregate_id: "p-1".into(),
                    fields: vec!["name".into(), "address.city".into()],
                },
            ),
            (
                "restore person p-1",
                Command::Restore {
                    aggregate_type: "person".into(),
                    aggregate_id: "p-1".into(),
                },
            ),
        ];

        for (cmd, expected) in inputs {
            let command = Command::try_from(cmd).unwrap();
            assert_eq!(command, expected, "{cmd}");
        }
    }

    #[test]
    fn payload_keeps_inner_whitespace() {
        let command =
            Command::try_from(r#"create person p-1 person_registered {"name": "Jane Doe"}"#)
                .unwrap();
        assert_eq!(
            command,
            Command::Create {
                aggregate_type: "person".into(),
                aggregate_id: "p-1".into(),
                event_type: "person_registered".into(),
                payload: Some(json!({"name": "Jane Doe"})),
            }
        );

        let command = Command::try_from("append person p-1 touched").unwrap();
        assert!(matches!(command, Command::Append { payload: None, .. }));
    }

    #[test]
    fn patch_parses_operations() {
        let command = Command::try_from(
            r#"patch person p-1 renamed [{"op": "replace", "path": "/name", "value": "Janet"}]"#,
        )
        .unwrap();
        let Command::Patch { operations, .. } = command else {
            panic!("expected patch command");
        };
        assert_eq!(
            operations,
            vec![JsonPatchOperation::replace("/name", json!("Janet"))]
        );
    }

    #[test]
    fn invalid_arguments_are_reported() {
        assert!(matches!(
            Command::try_from("get person"),
            Err(CommandError::InvalidCommandArguments { .. })
        ));
        assert!(matches!(
            Command::try_from("list many"),
            Err(CommandError::InvalidCommandArguments { .. })
        ));
        assert!(matches!(
            Command::try_from("create person p-1 registered {oops"),
            Err(CommandError::InvalidCommandArguments { .. })
        ));
        assert!(matches!(
            Command::try_from("select person p-1"),
            Err(CommandError::InvalidCommandArguments { .. })
        ));
        assert!(matches!(Command::try_from("   "), Err(CommandError::Empty)));
        assert!(matches!(
            Command::try_from("drop everything"),
            Err(CommandError::UnrecognizedCommand(_))
        ));
    }
}
