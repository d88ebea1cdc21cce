use std::str::FromStr;

use ratatui::style::Color;
use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumIter, EnumString};

#[derive(
    Debug, Clone, Copy, Default, Serialize, PartialEq, Eq, Hash, Display, EnumIter, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum ThemeName {
    #[default]
    Dark,
    Light,
    HighContrast,
}

impl ThemeName {
    pub fn palette(self) -> ThemePalette {
        match self {
            ThemeName::Dark => ThemePalette {
                accent: Color::Cyan,
                muted: Color::Gray,
                pinned: Color::Yellow,
                selection_bg: Color::Blue,
                selection_fg: Color::Black,
                danger: Color::Red,
            },
            ThemeName::Light => ThemePalette {
                accent: Color::Blue,
                muted: Color::DarkGray,
                pinned: Color::Magenta,
                selection_bg: Color::LightBlue,
                selection_fg: Color::Black,
                danger: Color::Red,
            },
            ThemeName::HighContrast => ThemePalette {
                accent: Color::White,
                muted: Color::White,
                pinned: Color::LightYellow,
                selection_bg: Color::White,
                selection_fg: Color::Black,
                danger: Color::LightRed,
            },
        }
    }
}

/// Unknown names fall back to the default theme instead of failing the whole config.
impl<'de> Deserialize<'de> for ThemeName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(ThemeName::from_str(raw.trim()).unwrap_or_else(|_| {
            tracing::warn!(theme = %raw, "unknown theme in config, falling back to dark");
            ThemeName::default()
        }))
    }
}

/// Colours the terminal UI draws with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThemePalette {
    pub accent: Color,
    pub muted: Color,
    pub pinned: Color,
    pub selection_bg: Color,
    pub selection_fg: Color,
    pub danger: Color,
}

#[cfg(test)]
mod tests {
    use super::*;

    use strum::IntoEnumIterator;

    #[derive(Debug, Deserialize)]
    struct Holder {
        theme: ThemeName,
    }

    #[test]
    fn every_theme_reads_back_from_its_display_name() -> anyhow::Result<()> {
        for theme in ThemeName::iter() {
            let holder: Holder = toml::from_str(&format!("theme = \"{theme}\""))?;
            assert_eq!(holder.theme, theme);
        }
        Ok(())
    }

    #[test]
    fn unknown_theme_falls_back_to_dark() -> anyhow::Result<()> {
        let holder: Holder = toml::from_str("theme = \"solarized\"")?;
        assert_eq!(holder.theme, ThemeName::Dark);
        let holder: Holder = toml::from_str("theme = \"Light\"")?;
        assert_eq!(holder.theme, ThemeName::Light);
        Ok(())
    }

    #[test]
    fn theme_names_display_in_config_spelling() {
        assert_eq!(ThemeName::HighContrast.to_string(), "high-contrast");
        assert_ne!(ThemeName::Dark.palette(), ThemeName::Light.palette());
    }
}
