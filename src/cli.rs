//! CLI utilities for the EventDBX control client.
use std::io::{BufRead, Write};

use crate::command::{Command, CommandError};

/// Prompts for one REPL line and parses it. End of input is treated as `.exit`.
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> Result<Command, CommandError>
where
    R: BufRead,
    W: Write,
{
    let mut line = String::default();
    write!(&mut writer, "eventdbx> ")?;
    writer.flush()?;

    if reader.read_line(&mut line)? == 0 {
        return Ok(Command::Exit);
    }
    Command::try_from(line.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_line_gets_its_own_prompt() {
        let mut input = &b"list 5\n\nevents person p-1 3\n"[..];
        let mut output = Vec::new();

        assert_eq!(
            prompt(&mut input, &mut output).unwrap(),
            Command::List {
                take: Some(5),
                cursor: None
            }
        );
        assert!(matches!(
            prompt(&mut input, &mut output),
            Err(CommandError::Empty)
        ));
        assert_eq!(
            prompt(&mut input, &mut output).unwrap(),
            Command::Events {
                aggregate_type: "person".into(),
                aggregate_id: "p-1".into(),
                take: Some(3)
            }
        );
        assert_eq!(prompt(&mut input, &mut output).unwrap(), Command::Exit);

        assert_eq!(String::from_utf8(output).unwrap(), "eventdbx> ".repeat(4));
    }

    #[test]
    fn end_of_input_exits() {
        let mut output = Vec::new();
        let command = prompt(&b""[..], &mut output).unwrap();
        assert_eq!(command, Command::Exit);
    }

    #[test]
    fn prompt_parses_commands() {
        let input = b"get person p-1\n";
        let mut output = Vec::new();

        let command = prompt(&input[..], &mut output).unwrap();
        assert_eq!(
            command,
            Command::Get {
                aggregate_type: "person".into(),
                aggregate_id: "p-1".into()
            }
        );
    }

    #[test]
    fn prompt_unrecognized_command() {
        let input = b".something_wrong\n";
        let mut output = Vec::new();

        let err = prompt(&input[..], &mut output).unwrap_err();
        assert_eq!(err.to_string(), "unrecognized command '.something_wrong'");
    }
}
