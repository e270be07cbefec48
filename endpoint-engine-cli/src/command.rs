//! Line-oriented command parsing.

use endpoint_manager_rs::audio::{DeviceBackend, EndpointManager};
use endpoint_manager_rs::AudioError;
use std::str::FromStr;
use thiserror::Error;

/// Usage summary printed for unknown commands.
pub const USAGE: &str = "setvolume <value>, setvolumeid <deviceId> <value>, upvolume, downvolume, \
upvolumeid <deviceId>, downvolumeid <deviceId>, setstep <value>, setmute, setmuteid <deviceId>, \
setunmute, setunmuteid <deviceId>, togglemute, togglemuteid <deviceId>, list, quit";

/// One input line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetVolume(f32),
    SetVolumeById { device_id: String, value: f32 },
    UpVolume,
    DownVolume,
    UpVolumeById(String),
    DownVolumeById(String),
    SetStepVolume(f32),
    SetMute,
    SetMuteById(String),
    SetUnMute,
    SetUnMuteById(String),
    ToggleMute,
    ToggleMuteById(String),
    List,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("Command input cannot be empty")]
    Empty,

    #[error("Unknown command '{0}'. Available commands: {}", USAGE)]
    UnknownCommand(String),

    #[error("{command}: expected {expected}")]
    WrongArguments {
        command: &'static str,
        expected: &'static str,
    },

    #[error("{command}: invalid number '{value}'")]
    InvalidNumber { command: &'static str, value: String },
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = input.split_whitespace().collect();
        let Some((name, args)) = parts.split_first() else {
            return Err(ParseError::Empty);
        };

        let command = match name.to_ascii_lowercase().as_str() {
            "setvolume" => {
                let [value] = args else {
                    return Err(wrong("setvolume", "<value>"));
                };
                Command::SetVolume(number("setvolume", value)?)
            }
            "setvolumeid" => {
                let [device_id, value] = args else {
                    return Err(wrong("setvolumeid", "<deviceId> <value>"));
                };
                Command::SetVolumeById {
                    device_id: device_id.to_string(),
                    value: number("setvolumeid", value)?,
                }
            }
            "setstepvolume" | "setstep" => {
                let [value] = args else {
                    return Err(wrong("setstep", "<value>"));
                };
                Command::SetStepVolume(number("setstep", value)?)
            }
            "upvolume" => no_args("upvolume", args, Command::UpVolume)?,
            "downvolume" => no_args("downvolume", args, Command::DownVolume)?,
            "setmute" => no_args("setmute", args, Command::SetMute)?,
            "setunmute" => no_args("setunmute", args, Command::SetUnMute)?,
            "togglemute" => no_args("togglemute", args, Command::ToggleMute)?,
            "list" => no_args("list", args, Command::List)?,
            "quit" | "exit" => no_args("quit", args, Command::Quit)?,
            "upvolumeid" => Command::UpVolumeById(device_id("upvolumeid", args)?),
            "downvolumeid" => Command::DownVolumeById(device_id("downvolumeid", args)?),
            "setmuteid" => Command::SetMuteById(device_id("setmuteid", args)?),
            "setunmuteid" => Command::SetUnMuteById(device_id("setunmuteid", args)?),
            "togglemuteid" => Command::ToggleMuteById(device_id("togglemuteid", args)?),
            _ => return Err(ParseError::UnknownCommand(name.to_string())),
        };
        Ok(command)
    }
}

impl Command {
    /// Run a device command against `manager`. `List` and `Quit` are handled
    /// by the input loop and do nothing here.
    pub fn apply<B: DeviceBackend>(&self, manager: &EndpointManager<B>) -> Result<(), AudioError> {
        match self {
            Command::SetVolume(value) => manager.set_volume(*value),
            Command::SetVolumeById { device_id, value } => {
                manager.set_volume_by_id(device_id, *value)
            }
            Command::UpVolume => manager.increment_volume(),
            Command::DownVolume => manager.decrement_volume(),
            Command::UpVolumeById(id) => manager.increment_volume_by_id(id),
            Command::DownVolumeById(id) => manager.decrement_volume_by_id(id),
            Command::SetStepVolume(step) => manager.set_step_volume(*step),
            Command::SetMute => manager.set_mute(),
            Command::SetMuteById(id) => manager.set_mute_by_id(id),
            Command::SetUnMute => manager.set_un_mute(),
            Command::SetUnMuteById(id) => manager.set_un_mute_by_id(id),
            Command::ToggleMute => manager.toggle_muted(),
            Command::ToggleMuteById(id) => manager.toggle_muted_by_id(id),
            Command::List | Command::Quit => Ok(()),
        }
    }
}

fn wrong(command: &'static str, expected: &'static str) -> ParseError {
    ParseError::WrongArguments { command, expected }
}

fn number(command: &'static str, value: &str) -> Result<f32, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidNumber {
        command,
        value: value.to_string(),
    })
}

fn no_args(command: &'static str, args: &[&str], parsed: Command) -> Result<Command, ParseError> {
    if args.is_empty() {
        Ok(parsed)
    } else {
        Err(wrong(command, "no arguments"))
    }
}

fn device_id(command: &'static str, args: &[&str]) -> Result<String, ParseError> {
    match args {
        [id] => Ok(id.to_string()),
        _ => Err(wrong(command, "<deviceId>")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use endpoint_manager_rs::audio::{create_event_channel, Direction, MemoryBackend, WriteRecord};
    use endpoint_manager_rs::ManagerConfig;

    #[test]
    fn test_parse_commands() {
        assert_eq!("setvolume 50".parse::<Command>(), Ok(Command::SetVolume(50.0)));
        assert_eq!("SetVolume 12.5".parse::<Command>(), Ok(Command::SetVolume(12.5)));
        assert_eq!(
            "setvolumeid {0.0.0.00000000}.{abc} 30".parse::<Command>(),
            Ok(Command::SetVolumeById {
                device_id: "{0.0.0.00000000}.{abc}".to_string(),
                value: 30.0
            })
        );
        assert_eq!("  upvolume  ".parse::<Command>(), Ok(Command::UpVolume));
        assert_eq!("setstep 5".parse::<Command>(), Ok(Command::SetStepVolume(5.0)));
        assert_eq!("setstepvolume 5".parse::<Command>(), Ok(Command::SetStepVolume(5.0)));
        assert_eq!(
            "togglemuteid dev".parse::<Command>(),
            Ok(Command::ToggleMuteById("dev".to_string()))
        );
        assert_eq!("quit".parse::<Command>(), Ok(Command::Quit));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<Command>(), Err(ParseError::Empty));
        assert!(matches!(
            "louder".parse::<Command>(),
            Err(ParseError::UnknownCommand(_))
        ));
        assert!(matches!(
            "setvolume loud".parse::<Command>(),
            Err(ParseError::InvalidNumber { .. })
        ));
        assert!(matches!(
            "setvolume".parse::<Command>(),
            Err(ParseError::WrongArguments { .. })
        ));
        assert!(matches!(
            "setmuteid".parse::<Command>(),
            Err(ParseError::WrongArguments { .. })
        ));
        assert!(matches!(
            "upvolume now".parse::<Command>(),
            Err(ParseError::WrongArguments { .. })
        ));
    }

    #[test]
    fn test_apply_writes_through_manager() {
        let backend = MemoryBackend::new();
        backend.add_device("A", "Speakers", Direction::Render);
        let (tx, _rx) = create_event_channel();
        let manager = EndpointManager::new(backend, ManagerConfig::default(), tx).unwrap();
        manager.initialize_devices().unwrap();

        "setvolumeid A 30".parse::<Command>().unwrap().apply(&manager).unwrap();
        "setmuteid A".parse::<Command>().unwrap().apply(&manager).unwrap();

        assert_eq!(
            manager.backend().writes(),
            vec![
                WriteRecord::Volume {
                    device_id: "A".to_string(),
                    percent: 30.0
                },
                WriteRecord::Mute {
                    device_id: "A".to_string(),
                    muted: true
                },
            ]
        );
        assert!(matches!(
            Command::SetVolumeById {
                device_id: "B".to_string(),
                value: 10.0
            }
            .apply(&manager),
            Err(AudioError::DeviceNotFound { .. })
        ));
    }
}
