//! Thin operator command surface.
//!
//! ```text
//! dynworld create <id> [<generator-json> [<type-json>]]
//! dynworld load   <id> [<generator-json> [<type-json>]]
//! dynworld unload <id>
//! dynworld delete <id>
//! ```
//!
//! `dyn` is accepted as an alias of `dynworld`. Omitted JSON arguments fall
//! back to a flat generator and the surface type.

use serde_json::Value;

use crate::codec::{self, GeneratorConfig, InstanceType};
use crate::error::CommandError;
use crate::server::Server;
use crate::types::Identifier;

pub const ROOTS: [&str; 2] = ["dynworld", "dyn"];

const CREATE_USAGE: &str = "dynworld create <id> [<generator-json> [<type-json>]]";
const LOAD_USAGE: &str = "dynworld load <id> [<generator-json> [<type-json>]]";
const UNLOAD_USAGE: &str = "dynworld unload <id>";
const DELETE_USAGE: &str = "dynworld delete <id>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSource {
    pub permission_level: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Create {
        identifier: Identifier,
        generator: GeneratorConfig,
        instance_type: InstanceType,
    },
    Load {
        identifier: Identifier,
        generator: GeneratorConfig,
        instance_type: InstanceType,
    },
    Unload(Identifier),
    Delete(Identifier),
}

/// Parse one command line. Returns `Unknown` for lines that do not start
/// with one of [`ROOTS`].
pub fn parse(line: &str) -> Result<Command, CommandError> {
    let line = line.trim().trim_start_matches('/');
    let (root, rest) = split_word(line);
    if !ROOTS.contains(&root) {
        return Err(CommandError::Unknown(root.to_string()));
    }
    let (verb, rest) = split_word(rest);
    let (id_arg, rest) = split_word(rest);

    let usage = match verb {
        "create" => CREATE_USAGE,
        "load" => LOAD_USAGE,
        "unload" => UNLOAD_USAGE,
        "delete" => DELETE_USAGE,
        other => return Err(CommandError::Unknown(format!("{root} {other}"))),
    };
    if id_arg.is_empty() {
        return Err(CommandError::Usage(usage));
    }
    let identifier =
        Identifier::parse(id_arg).map_err(|e| CommandError::BadArgument(e.to_string()))?;

    match verb {
        "create" | "load" => {
            let (generator, instance_type) = parse_metadata(rest, usage)?;
            Ok(if verb == "create" {
                Command::Create {
                    identifier,
                    generator,
                    instance_type,
                }
            } else {
                Command::Load {
                    identifier,
                    generator,
                    instance_type,
                }
            })
        }
        _ if !rest.trim().is_empty() => Err(CommandError::Usage(usage)),
        "unload" => Ok(Command::Unload(identifier)),
        _ => Ok(Command::Delete(identifier)),
    }
}

fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(at) => (&s[..at], &s[at..]),
        None => (s, ""),
    }
}

fn parse_metadata(
    rest: &str,
    usage: &'static str,
) -> Result<(GeneratorConfig, InstanceType), CommandError> {
    let values = serde_json::Deserializer::from_str(rest)
        .into_iter::<Value>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CommandError::BadArgument(e.to_string()))?;
    let mut values = values.into_iter();
    let generator = match values.next() {
        Some(value) => codec::decode::<GeneratorConfig>(value).map_err(|e| CommandError::BadArgument(e.to_string()))?,
        None => GeneratorConfig::flat(),
    };
    let instance_type = match values.next() {
        Some(value) => codec::decode::<InstanceType>(value).map_err(|e| CommandError::BadArgument(e.to_string()))?,
        None => InstanceType::surface(),
    };
    if values.next().is_some() {
        return Err(CommandError::Usage(usage));
    }
    Ok((generator, instance_type))
}

/// Parse and run `line` on behalf of `source`. Returns `1` on success.
pub fn execute(server: &mut Server, source: &CommandSource, line: &str) -> Result<i32, CommandError> {
    let command = parse(line)?;
    let config = server.config();
    if !config.enable_commands {
        return Err(CommandError::Disabled);
    }
    if source.permission_level < config.command_permission_level {
        return Err(CommandError::PermissionDenied {
            required: config.command_permission_level,
        });
    }

    let mut lifecycle = server.lifecycle();
    let (action, identifier) = match command {
        Command::Create {
            identifier,
            generator,
            instance_type,
        } => {
            if !lifecycle.can_create(&identifier) {
                return Err(CommandError::CannotCreate(identifier));
            }
            lifecycle.create(identifier.clone(), generator, instance_type, true)?;
            ("create", identifier)
        }
        Command::Load {
            identifier,
            generator,
            instance_type,
        } => {
            if !lifecycle.can_load(&identifier) {
                return Err(CommandError::CannotCreate(identifier));
            }
            lifecycle.load(identifier.clone(), generator, instance_type)?;
            ("load", identifier)
        }
        Command::Unload(identifier) => {
            if !lifecycle.can_delete(&identifier) {
                return Err(CommandError::CannotDelete(identifier));
            }
            lifecycle.unload_default(identifier.clone())?;
            ("unload", identifier)
        }
        Command::Delete(identifier) => {
            if !lifecycle.can_delete(&identifier) {
                return Err(CommandError::CannotDelete(identifier));
            }
            lifecycle.delete_default(identifier.clone())?;
            ("delete", identifier)
        }
    };
    tracing::info!(
        target: "commands",
        action = action,
        identifier = identifier.to_string().as_str(),
        permission_level = source.permission_level as u64,
    );
    Ok(1)
}
