//! Tokenizer for xboard command lines.

use crate::errors::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Xboard,
    Protover(u32),
    New,
    /// Everything after the keyword, e.g. a full FEN.
    SetBoard(&'a str),
    Force,
    White,
    Black,
    Sd(u32),
    Memory(u32),
    Cores(u32),
    Go,
    UserMove(&'a str),
    Ping(&'a str),
    Undo,
    Remove,
    Quit,
    Blank,
    Unknown(&'a str),
}

pub fn parse_command(line: &str) -> Result<Command<'_>, EngineError> {
    let trimmed = line.trim();
    let (keyword, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (trimmed, ""),
    };

    let command = match keyword {
        "" => Command::Blank,
        "xboard" => Command::Xboard,
        "protover" => Command::Protover(number(keyword, rest)?),
        "new" => Command::New,
        "setboard" => {
            if rest.is_empty() {
                return Err(EngineError::MalformedPosition("setboard without a position".to_owned()));
            }
            Command::SetBoard(rest)
        }
        "force" => Command::Force,
        "white" => Command::White,
        "black" => Command::Black,
        "sd" => Command::Sd(number(keyword, rest)?),
        "memory" => Command::Memory(number(keyword, rest)?),
        "cores" => Command::Cores(number(keyword, rest)?),
        "go" => Command::Go,
        "usermove" => {
            let text = rest.split_whitespace().next().unwrap_or_default();
            if text.is_empty() {
                return Err(EngineError::MalformedMoveText("usermove without a move".to_owned()));
            }
            Command::UserMove(text)
        }
        "ping" => Command::Ping(rest),
        "undo" => Command::Undo,
        "remove" => Command::Remove,
        "quit" => Command::Quit,
        other => Command::Unknown(other),
    };
    Ok(command)
}

fn number(keyword: &str, rest: &str) -> Result<u32, EngineError> {
    let token = rest.split_whitespace().next().unwrap_or_default();
    token
        .parse::<u32>()
        .map_err(|_| EngineError::MalformedCommand(format!("{keyword} expects a number, got '{token}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_and_arguments() {
        assert_eq!(parse_command("xboard").expect("parse"), Command::Xboard);
        assert_eq!(parse_command("protover 2").expect("parse"), Command::Protover(2));
        assert_eq!(parse_command("  sd 6 \n").expect("parse"), Command::Sd(6));
        assert_eq!(parse_command("memory 256").expect("parse"), Command::Memory(256));
        assert_eq!(parse_command("cores 4").expect("parse"), Command::Cores(4));
        assert_eq!(parse_command("usermove e7e8q").expect("parse"), Command::UserMove("e7e8q"));
        assert_eq!(parse_command("ping 17").expect("parse"), Command::Ping("17"));
        assert_eq!(parse_command("").expect("parse"), Command::Blank);
        assert_eq!(parse_command("hard").expect("parse"), Command::Unknown("hard"));
    }

    #[test]
    fn setboard_keeps_the_whole_position() {
        let fen = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1";
        assert_eq!(
            parse_command(&format!("setboard {fen}")).expect("parse"),
            Command::SetBoard(fen)
        );
        assert!(matches!(
            parse_command("setboard"),
            Err(EngineError::MalformedPosition(_))
        ));
    }

    #[test]
    fn bad_numbers_are_malformed_commands() {
        for line in ["sd", "sd x", "memory -1", "cores 1.5"] {
            assert!(
                matches!(parse_command(line), Err(EngineError::MalformedCommand(_))),
                "{line}"
            );
        }
        assert!(matches!(
            parse_command("usermove"),
            Err(EngineError::MalformedMoveText(_))
        ));
    }
}
