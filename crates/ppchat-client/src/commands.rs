//! Parsing console lines into commands.
//!
//! One command per line. The first word picks the command; a line that
//! doesn't start with a command word is a chat message. A command word
//! with arguments that don't fit is a [`ParseError`], not a message.

use std::net::IpAddr;

/// Where a `connect` command should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Loopback, default port.
    Default,
    /// Loopback, this port.
    Port(u16),
    /// This address, default port.
    Address(IpAddr),
    /// This address and port.
    Endpoint(IpAddr, u16),
    /// A saved server, by name.
    Saved(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect(Target),
    Say(String),
    Disconnect,
    PrintPort,
    SetPort(u16),
    Save {
        name: String,
        address: IpAddr,
        port: u16,
    },
    ListServers,
    Exit,
    /// Any line that isn't a command.
    Message(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("invalid port: {0}")]
    InvalidPort(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

const CONNECT_USAGE: &str = "connect [<port> | <address> [<port>] | <saved server>]";
const PORT_USAGE: &str = "port [<port>]";
const SAVE_USAGE: &str = "save <name> <address> <port>";

/// Parses one console line. Blank lines parse to `None`.
pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
    let trimmed = line.trim();
    let mut words = trimmed.split_whitespace();
    let Some(keyword) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match keyword {
        "connect" => Command::Connect(parse_target(&args)?),
        "say" => Command::Say(trimmed["say".len()..].trim_start().to_string()),
        "disconnect" => no_args(&args, "disconnect", Command::Disconnect)?,
        "servers" => no_args(&args, "servers", Command::ListServers)?,
        "exit" => no_args(&args, "exit", Command::Exit)?,
        "quit" => no_args(&args, "quit", Command::Exit)?,
        "port" => match args.as_slice() {
            [] => Command::PrintPort,
            [port] => Command::SetPort(parse_port(port)?),
            _ => return Err(ParseError::Usage(PORT_USAGE)),
        },
        "save" => match args.as_slice() {
            [name, address, port] => Command::Save {
                name: (*name).to_string(),
                address: parse_address(address)?,
                port: parse_port(port)?,
            },
            _ => return Err(ParseError::Usage(SAVE_USAGE)),
        },
        _ => Command::Message(line.to_string()),
    };
    Ok(Some(command))
}

fn parse_target(args: &[&str]) -> Result<Target, ParseError> {
    match args {
        [] => Ok(Target::Default),
        [one] => {
            if one.parse::<u16>().is_ok() {
                Ok(Target::Port(parse_port(one)?))
            } else if let Ok(address) = one.parse::<IpAddr>() {
                Ok(Target::Address(address))
            } else {
                Ok(Target::Saved((*one).to_string()))
            }
        }
        [address, port] => Ok(Target::Endpoint(parse_address(address)?, parse_port(port)?)),
        _ => Err(ParseError::Usage(CONNECT_USAGE)),
    }
}

fn no_args(args: &[&str], usage: &'static str, command: Command) -> Result<Command, ParseError> {
    if args.is_empty() {
        Ok(command)
    } else {
        Err(ParseError::Usage(usage))
    }
}

fn parse_port(text: &str) -> Result<u16, ParseError> {
    match text.parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ParseError::InvalidPort(text.to_string())),
    }
}

fn parse_address(text: &str) -> Result<IpAddr, ParseError> {
    text.parse()
        .map_err(|_| ParseError::InvalidAddress(text.to_string()))
}
