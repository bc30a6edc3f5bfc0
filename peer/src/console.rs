//! Line-oriented console for a master process

use log::{info, warn};
use peer::{CoordinatorHandle, PeerError};
use thiserror::Error;
use tokio::io::{self, AsyncBufReadExt, BufReader};

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Gravity(f32),
    Pause(f32),
    Kick,
    Quit(u32),
    Fire(usize),
    List,
    Exit,
    /// Anything else is passed to the players by name.
    Master(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("usage: {0}")]
    Usage(&'static str),
}

fn argument<T: std::str::FromStr>(
    argument: Option<&str>,
    usage: &'static str,
) -> Result<T, ParseError> {
    argument
        .and_then(|value| value.parse().ok())
        .ok_or(ParseError::Usage(usage))
}

/// Parses one console line. Blank lines give `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<ConsoleCommand>, ParseError> {
    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();

    let command = match word {
        "gravity" => ConsoleCommand::Gravity(argument(arg, "gravity <number>")?),
        "pause" => ConsoleCommand::Pause(argument(arg, "pause <seconds>")?),
        "kick" => ConsoleCommand::Kick,
        "quit" => ConsoleCommand::Quit(argument(arg, "quit <player id>")?),
        "fire" => {
            ConsoleCommand::Fire(arg.map_or(Ok(1), |_| argument(arg, "fire [count]"))?)
        }
        "list" => ConsoleCommand::List,
        "exit" => ConsoleCommand::Exit,
        other => ConsoleCommand::Master(other.to_string()),
    };
    Ok(Some(command))
}

async fn execute(handle: &CoordinatorHandle, command: ConsoleCommand) -> Result<(), PeerError> {
    match command {
        ConsoleCommand::Gravity(gravity) => {
            let reached = handle.set_gravity(gravity).await?;
            info!("Gravity {:.2} sent to {} players", gravity, reached);
        }
        ConsoleCommand::Pause(seconds) => {
            let reached = handle.set_pause_duration(seconds).await?;
            info!("Pause {:.2}s sent to {} players", seconds, reached);
        }
        ConsoleCommand::Kick => {
            let reached = handle.kick().await?;
            info!("Kicked {} players", reached);
        }
        ConsoleCommand::Quit(id) => {
            if handle.quit(id).await? == 0 {
                warn!("No player p{} to quit", id);
            }
        }
        ConsoleCommand::Fire(count) => {
            let sent = handle.fire_ball(count).await?;
            info!("Fired {} balls", sent);
        }
        ConsoleCommand::List => {
            let peers = handle.list().await?;
            let names: Vec<String> = peers.iter().map(ToString::to_string).collect();
            info!("{} players: {}", peers.len(), names.join(" "));
        }
        ConsoleCommand::Master(name) => {
            let reached = handle.do_master_command(&name).await?;
            info!("Command {} sent to {} players", name, reached);
        }
        ConsoleCommand::Exit => {}
    }
    Ok(())
}

/// Reads commands from stdin until `exit`, end of input, or the
/// coordinator going away.
pub async fn run(handle: CoordinatorHandle) -> io::Result<()> {
    info!("Commands: gravity <f>, pause <f>, kick, quit <id>, fire [n], list, exit");
    let mut lines = BufReader::new(io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let command = match parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                warn!("{}", e);
                continue;
            }
        };
        if command == ConsoleCommand::Exit {
            break;
        }
        if let Err(e) = execute(&handle, command).await {
            warn!("{}", e);
            if matches!(e, PeerError::NotRunning) {
                break;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse("gravity 9.5"), Ok(Some(ConsoleCommand::Gravity(9.5))));
        assert_eq!(parse("  pause 0.25 "), Ok(Some(ConsoleCommand::Pause(0.25))));
        assert_eq!(parse("kick"), Ok(Some(ConsoleCommand::Kick)));
        assert_eq!(parse("quit 3"), Ok(Some(ConsoleCommand::Quit(3))));
        assert_eq!(parse("fire"), Ok(Some(ConsoleCommand::Fire(1))));
        assert_eq!(parse("fire 4"), Ok(Some(ConsoleCommand::Fire(4))));
        assert_eq!(parse("list"), Ok(Some(ConsoleCommand::List)));
        assert_eq!(parse("exit"), Ok(Some(ConsoleCommand::Exit)));
    }

    #[test]
    fn test_unknown_word_is_master_command() {
        assert_eq!(
            parse("freeze now"),
            Ok(Some(ConsoleCommand::Master("freeze".to_string())))
        );
    }

    #[test]
    fn test_blank_line() {
        assert_eq!(parse("   "), Ok(None));
    }

    #[test]
    fn test_bad_arguments() {
        assert_eq!(parse("gravity"), Err(ParseError::Usage("gravity <number>")));
        assert_eq!(parse("quit p3"), Err(ParseError::Usage("quit <player id>")));
        assert!(parse("fire many").is_err());
    }
}
