use serde::{Deserialize, Serialize};
use std::fmt;

use iced::Theme;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeChoice {
    #[default]
    Dark,
    Light,
}

impl ThemeChoice {
    pub const ALL: [ThemeChoice; 2] = [ThemeChoice::Dark, ThemeChoice::Light];

    pub fn theme(self) -> Theme {
        match self {
            ThemeChoice::Dark => Theme::TokyoNight,
            ThemeChoice::Light => Theme::Light,
        }
    }

    pub fn is_dark(self) -> bool {
        matches!(self, ThemeChoice::Dark)
    }
}

impl fmt::Display for ThemeChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThemeChoice::Dark => write!(f, "Dark"),
            ThemeChoice::Light => write!(f, "Light"),
        }
    }
}
