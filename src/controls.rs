use macroquad::prelude::*;

use crate::{filter::FilterMode, station::Command};

#[derive(Clone)]
pub struct KeyBinding {
    pub label: &'static str,
    pub keycode: KeyCode,
    pub command: Command,
}

/// Maps key presses to station commands.
pub struct KeyboardControls {
    bindings: Vec<KeyBinding>,
}

impl KeyboardControls {
    pub fn new() -> Self {
        let bindings = vec![
            KeyBinding {
                label: "1",
                keycode: KeyCode::Key1,
                command: Command::SelectFilter(FilterMode::Origin),
            },
            KeyBinding {
                label: "2",
                keycode: KeyCode::Key2,
                command: Command::SelectFilter(FilterMode::Grayscale),
            },
            KeyBinding {
                label: "3",
                keycode: KeyCode::Key3,
                command: Command::SelectFilter(FilterMode::Negative),
            },
            KeyBinding {
                label: "R",
                keycode: KeyCode::R,
                command: Command::StartRecording,
            },
            KeyBinding {
                label: "S",
                keycode: KeyCode::S,
                command: Command::StopRecording,
            },
            KeyBinding {
                label: "P",
                keycode: KeyCode::P,
                command: Command::PlayAll,
            },
            KeyBinding {
                label: "BKSP",
                keycode: KeyCode::Backspace,
                command: Command::RemoveLast,
            },
            KeyBinding {
                label: "DEL",
                keycode: KeyCode::Delete,
                command: Command::ClearAll,
            },
        ];

        Self { bindings }
    }

    /// Commands for keys pressed since the last frame, in binding order.
    pub fn poll(&self) -> Vec<Command> {
        self.bindings
            .iter()
            .filter(|binding| is_key_pressed(binding.keycode))
            .map(|binding| binding.command)
            .collect()
    }

    #[cfg(test)]
    pub fn bindings(&self) -> &[KeyBinding] {
        &self.bindings
    }

    pub fn help_line(&self) -> String {
        self.bindings
            .iter()
            .map(|binding| format!("{} {}", binding.label, command_label(binding.command)))
            .collect::<Vec<_>>()
            .join("  ")
    }
}

pub fn command_label(command: Command) -> &'static str {
    match command {
        Command::SelectFilter(mode) => mode.label(),
        Command::StartRecording => "REC",
        Command::StopRecording => "STOP",
        Command::PlayAll => "PLAY",
        Command::RemoveLast => "UNDO",
        Command::ClearAll => "CLEAR",
    }
}
