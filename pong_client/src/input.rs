//! Console input.
//!
//! The client is headless: intents are typed on stdin, one word per line.

use pong_shared::protocol::{Direction, PlayerId, Request};

/// A parsed console line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Intent(Direction),
    Status,
    Quit,
}

/// Parses a console line. Case and surrounding whitespace are ignored.
pub fn parse_command(line: &str) -> Option<ConsoleCommand> {
    let cmd = match line.trim().to_ascii_lowercase().as_str() {
        "up" | "u" => ConsoleCommand::Intent(Direction::Up),
        "down" | "d" => ConsoleCommand::Intent(Direction::Down),
        "stop" | "here" | "s" => ConsoleCommand::Intent(Direction::Here),
        "status" => ConsoleCommand::Status,
        "quit" | "exit" => ConsoleCommand::Quit,
        _ => return None,
    };
    Some(cmd)
}

/// Turns the current intent into a `MOVE` request for a frame.
pub fn build_move(player_id: PlayerId, intent: Direction) -> Request {
    Request::movement(player_id, intent)
}
