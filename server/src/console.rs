//! Operator console command parsing.

use shared::{EnemyKind, ItemKind, Rarity};
use std::str::FromStr;
use thiserror::Error;

pub const MAX_SPAWN_COUNT: u32 = 100;

pub const USAGE: &str = "\
Commands:
  spawn <type> [count] [rarity]   spawn enemies at random edge points
  spawnitem <type> [count]        drop items at random points
  help                            show this message
Enemy types: ladybug, bee, centipede, spider, soldier_ant, worker_ant, baby_ant
Item types:  tetrahedron, cube, leaf
Rarities:    common, uncommon, rare, epic, legendary";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("unknown enemy type '{0}'")]
    UnknownEnemyType(String),
    #[error("unknown item type '{0}'")]
    UnknownItemType(String),
    #[error("unknown rarity '{0}'")]
    UnknownRarity(String),
    #[error("count must be between 1 and {max}, got '{value}'")]
    InvalidCount { value: String, max: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// `rarity` of `None` rolls per enemy like a wave spawn.
    Spawn {
        kind: EnemyKind,
        count: u32,
        rarity: Option<Rarity>,
    },
    SpawnItem { kind: ItemKind, count: u32 },
    Help,
}

fn parse_count(arg: Option<&str>) -> Result<u32, CommandError> {
    let Some(arg) = arg else {
        return Ok(1);
    };
    match arg.parse::<u32>() {
        Ok(n) if (1..=MAX_SPAWN_COUNT).contains(&n) => Ok(n),
        _ => Err(CommandError::InvalidCount {
            value: arg.to_string(),
            max: MAX_SPAWN_COUNT,
        }),
    }
}

impl FromStr for ConsoleCommand {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let command = words.next().ok_or(CommandError::Empty)?;

        match command.to_ascii_lowercase().as_str() {
            "spawn" => {
                let name = words.next().unwrap_or_default();
                let kind = EnemyKind::from_str(name)
                    .ok()
                    // Segments only exist as part of a centipede.
                    .filter(|k| *k != EnemyKind::CentipedeSegment)
                    .ok_or_else(|| CommandError::UnknownEnemyType(name.to_string()))?;
                let count = parse_count(words.next())?;
                let rarity = words
                    .next()
                    .map(|r| {
                        Rarity::from_str(r).map_err(|_| CommandError::UnknownRarity(r.to_string()))
                    })
                    .transpose()?;
                Ok(ConsoleCommand::Spawn {
                    kind,
                    count,
                    rarity,
                })
            }
            "spawnitem" => {
                let name = words.next().unwrap_or_default();
                let kind = ItemKind::from_str(name)
                    .map_err(|_| CommandError::UnknownItemType(name.to_string()))?;
                let count = parse_count(words.next())?;
                Ok(ConsoleCommand::SpawnItem { kind, count })
            }
            "help" => Ok(ConsoleCommand::Help),
            other => Err(CommandError::UnknownCommand(other.to_string())),
        }
    }
}
