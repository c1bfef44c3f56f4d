//! Cell formatting carried from a template to its output
//!
//! Styles live in a workbook-level table. Cells refer to an entry by
//! [`StyleId`], so duplicated rows share the template row's formats.

use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, FormatUnderline};

/// Handle to a [`CellStyle`] registered with a workbook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StyleId(pub(crate) usize);

impl StyleId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Number format of a cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NumberFormat {
    /// One of Excel's built-in formats, by index (9 is "0%")
    Builtin(u8),
    /// Format code such as `#,##0.00 "EUR"`
    Custom(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FontStyle {
    pub name: Option<String>,
    pub size: Option<f64>,
    pub bold: bool,
    pub italic: bool,
    pub strikethrough: bool,
    pub underline: FormatUnderline,
    /// 0xRRGGBB
    pub color: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BorderSide {
    pub line: FormatBorder,
    /// 0xRRGGBB
    pub color: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Borders {
    pub left: BorderSide,
    pub right: BorderSide,
    pub top: BorderSide,
    pub bottom: BorderSide,
}

/// Formatting of one cell
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellStyle {
    pub num_format: Option<NumberFormat>,
    pub font: FontStyle,
    /// Solid fill colour, 0xRRGGBB
    pub fill: Option<u32>,
    pub borders: Borders,
    pub horizontal: FormatAlign,
    pub vertical: FormatAlign,
    pub wrap_text: bool,
}

impl CellStyle {
    /// Same style with `code` as number format unless one is already set
    pub fn with_default_num_format(&self, code: &str) -> CellStyle {
        let mut style = self.clone();
        if style.num_format.is_none() {
            style.num_format = Some(NumberFormat::Custom(code.to_string()));
        }
        style
    }

    /// Writer format for this style
    pub fn to_format(&self) -> Format {
        let mut format = Format::new();

        match &self.num_format {
            None | Some(NumberFormat::Builtin(0)) => {}
            Some(NumberFormat::Builtin(index)) => format = format.set_num_format_index(*index),
            Some(NumberFormat::Custom(code)) => format = format.set_num_format(code),
        }

        let font = &self.font;
        if let Some(name) = &font.name {
            format = format.set_font_name(name);
        }
        if let Some(size) = font.size {
            format = format.set_font_size(size);
        }
        if font.bold {
            format = format.set_bold();
        }
        if font.italic {
            format = format.set_italic();
        }
        if font.strikethrough {
            format = format.set_font_strikethrough();
        }
        if font.underline != FormatUnderline::None {
            format = format.set_underline(font.underline);
        }
        if let Some(rgb) = font.color {
            format = format.set_font_color(Color::RGB(rgb));
        }

        if let Some(rgb) = self.fill {
            format = format.set_background_color(Color::RGB(rgb));
        }

        let borders = &self.borders;
        if borders.left.line != FormatBorder::None {
            format = format.set_border_left(borders.left.line);
            if let Some(rgb) = borders.left.color {
                format = format.set_border_left_color(Color::RGB(rgb));
            }
        }
        if borders.right.line != FormatBorder::None {
            format = format.set_border_right(borders.right.line);
            if let Some(rgb) = borders.right.color {
                format = format.set_border_right_color(Color::RGB(rgb));
            }
        }
        if borders.top.line != FormatBorder::None {
            format = format.set_border_top(borders.top.line);
            if let Some(rgb) = borders.top.color {
                format = format.set_border_top_color(Color::RGB(rgb));
            }
        }
        if borders.bottom.line != FormatBorder::None {
            format = format.set_border_bottom(borders.bottom.line);
            if let Some(rgb) = borders.bottom.color {
                format = format.set_border_bottom_color(Color::RGB(rgb));
            }
        }

        if self.horizontal != FormatAlign::General {
            format = format.set_align(self.horizontal);
        }
        if self.vertical != FormatAlign::General {
            format = format.set_align(self.vertical);
        }
        if self.wrap_text {
            format = format.set_text_wrap();
        }

        format
    }
}
