//! Parsing of the prompt commands.

use thiserror::Error;

use crate::domain::PlaceId;

/// One line typed at the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Nominate a place.
    Add(PlaceId),
    /// Withdraw a nominated place.
    Remove(PlaceId),
    /// Toggle the vote on a candidate.
    Vote(PlaceId),
    /// Toggle the favorite state of a place.
    Favorite(PlaceId),
    /// Fetch the details of a place.
    Info(PlaceId),
    List,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command '{0}' (type 'help')")]
    Unknown(String),

    #[error("'{0}' needs a place id")]
    MissingPlaceId(&'static str),

    #[error("'{0}' is not a place id")]
    InvalidPlaceId(String),
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(Command::Help);
        };
        let name = name.to_ascii_lowercase();
        let command = match name.as_str() {
            "add" => Command::Add(place_id(words.next(), "add")?),
            "remove" | "rm" => Command::Remove(place_id(words.next(), "remove")?),
            "vote" => Command::Vote(place_id(words.next(), "vote")?),
            "fav" | "favorite" => Command::Favorite(place_id(words.next(), "fav")?),
            "info" => Command::Info(place_id(words.next(), "info")?),
            "list" | "ls" => Command::List,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            _ => return Err(CommandError::Unknown(name)),
        };
        Ok(command)
    }
}

fn place_id(word: Option<&str>, command: &'static str) -> Result<PlaceId, CommandError> {
    let word = word.ok_or(CommandError::MissingPlaceId(command))?;
    word.parse::<i64>()
        .map(PlaceId::new)
        .map_err(|_| CommandError::InvalidPlaceId(word.to_string()))
}
