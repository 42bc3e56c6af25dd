use chanclol_common::{ChannelId, RiotId};

use crate::consts::COMMAND_PREFIX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Register(RiotId),
    Unregister(RiotId),
    Rank(RiotId),
    Channel(ChannelId),
    Status,
    Help,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("No command provided")]
    NoCommand,
    #[error("Command `{0}` not recognised")]
    UnknownCommand(String),
    #[error("Command `{0}` requires an argument")]
    MissingArgument(String),
    #[error("Input `{0}` is not a riot id")]
    NotARiotId(String),
}

/// `Ok(None)` for messages not addressed to the bot
pub fn parse(message: &str) -> Result<Option<Command>, ParseError> {
    let Some(rest) = message.trim_start().strip_prefix(COMMAND_PREFIX) else {
        return Ok(None);
    };
    // "chanclolfoo" is not addressed to us either
    if rest.chars().next().is_some_and(|c| !c.is_whitespace()) {
        return Ok(None);
    }

    let mut words = rest.split_whitespace();
    let Some(command) = words.next() else {
        return Err(ParseError::NoCommand);
    };
    let arguments = words.collect::<Vec<_>>();

    let command = match command {
        "register" => Command::Register(riot_id_argument(command, &arguments)?),
        "unregister" => Command::Unregister(riot_id_argument(command, &arguments)?),
        "rank" => Command::Rank(riot_id_argument(command, &arguments)?),
        "channel" => Command::Channel(channel_argument(command, &arguments)?),
        "status" => Command::Status,
        "help" => Command::Help,
        other => return Err(ParseError::UnknownCommand(other.to_owned())),
    };
    Ok(Some(command))
}

fn riot_id_argument(command: &str, arguments: &[&str]) -> Result<RiotId, ParseError> {
    if arguments.is_empty() {
        return Err(ParseError::MissingArgument(command.to_owned()));
    }
    let input = arguments.concat();
    match input.split_once('#') {
        Some((game_name, tag_line)) if !game_name.is_empty() && !tag_line.is_empty() => {
            Ok(RiotId::new(game_name, tag_line))
        }
        _ => Err(ParseError::NotARiotId(input)),
    }
}

/// Accepts a raw id or a `<#id>` channel mention
fn channel_argument(command: &str, arguments: &[&str]) -> Result<ChannelId, ParseError> {
    let Some(&first) = arguments.first() else {
        return Err(ParseError::MissingArgument(command.to_owned()));
    };
    let id = first
        .strip_prefix("<#")
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(first);
    Ok(ChannelId(id.to_owned()))
}
