pub mod core {
    pub mod annotate;
    pub mod docx;
    pub mod package;
    pub mod pptx;
    pub mod snapshot;
    pub mod walker;
}

pub mod utils {
    pub mod processor;
}

pub mod config;
pub mod provider;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// RGB foreground color of a run, as written in the document XML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    /// 批注建议统一使用的红色
    pub const RED: RgbColor = RgbColor { r: 255, g: 0, b: 0 };

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        Some(RgbColor { r, g, b })
    }

    pub fn to_hex(self) -> String {
        format!("{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Style attributes of a single run. Tri-state flags distinguish an explicit
/// on/off from an inherited (unset) value; `None` fields are never written
/// back, so inherited formatting stays inherited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStyle {
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub underline: Option<bool>,
    pub font: Option<String>,
    /// Raw size value: half-points for Word runs, hundredths of a point for
    /// presentation runs. Copied through unconverted.
    pub size: Option<u32>,
    pub color: Option<RgbColor>,
    /// Named highlight value (`yellow`, `green`, ...). Word only.
    pub highlight: Option<String>,
    /// Character style reference (`w:rStyle`). Word only.
    pub style_ref: Option<String>,
}

impl RunStyle {
    /// The same style with the foreground color forced to red, used for the
    /// parenthesized replacement span.
    pub fn with_red_color(&self) -> RunStyle {
        let mut style = self.clone();
        style.color = Some(RgbColor::RED);
        style
    }
}

/// The smallest styled text fragment within a text unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub text: String,
    pub style: RunStyle,
}

/// One provider-returned correction: a substring expected to occur in the
/// unit text, and the corrected replacement. Neither is validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub original: String,
    pub replacement: String,
}

/// A piece of rebuilt output: text plus the style to apply. `None` means the
/// position fell outside the format snapshot and library defaults apply.
#[derive(Debug, Clone, PartialEq)]
pub struct StyledFragment {
    pub text: String,
    pub style: Option<RunStyle>,
}

/// Where a text unit sits in the document, for progress wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    BodyParagraph,
    TableCellParagraph,
    /// Slide shape text frame; `slide` is 1-based.
    ShapeText { slide: usize, slide_total: usize },
}

/// A paragraph, table-cell paragraph, or slide-shape text frame treated as
/// one atomic span of text for annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct TextUnit {
    /// Adapter-internal identifier, stable for the lifetime of one walk.
    pub id: usize,
    pub kind: UnitKind,
    /// Concatenated plain text of the unit's runs (slide shapes join their
    /// paragraphs with `\n`).
    pub text: String,
    pub runs: Vec<Run>,
}

/// Events sent from the processing thread back to the requesting context.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Progress { percent: u8, message: String },
    Done { output: PathBuf },
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_color_round_trip() {
        let color = RgbColor::from_hex("3A7F00").unwrap();
        assert_eq!(color, RgbColor { r: 0x3A, g: 0x7F, b: 0x00 });
        assert_eq!(color.to_hex(), "3A7F00");
    }

    #[test]
    fn hex_color_rejects_auto_and_short_values() {
        assert_eq!(RgbColor::from_hex("auto"), None);
        assert_eq!(RgbColor::from_hex("FFF"), None);
    }

    #[test]
    fn red_override_keeps_other_attributes() {
        let style = RunStyle {
            bold: Some(true),
            font: Some("宋体".to_string()),
            size: Some(28),
            color: Some(RgbColor { r: 0, g: 0, b: 255 }),
            highlight: Some("yellow".to_string()),
            ..RunStyle::default()
        };
        let red = style.with_red_color();
        assert_eq!(red.color, Some(RgbColor::RED));
        assert_eq!(red.bold, Some(true));
        assert_eq!(red.font.as_deref(), Some("宋体"));
        assert_eq!(red.size, Some(28));
        assert_eq!(red.highlight.as_deref(), Some("yellow"));
    }
}
