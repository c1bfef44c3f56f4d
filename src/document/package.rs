//! OOXML parts the value reader does not expose
//!
//! calamine gives us cell values, formulas and merged regions. Everything a
//! template carries beyond that comes from the package itself:
//! - `xl/styles.xml` → one [`CellStyle`] per `cellXfs` entry
//! - worksheet parts → column widths, custom row heights, cell style indices
//! - drawing parts → pictures with their cell anchors

use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read};

use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use rust_xlsxwriter::{FormatAlign, FormatBorder, FormatUnderline};
use zip::result::ZipError;
use zip::ZipArchive;

use super::address;
use super::style::{BorderSide, Borders, CellStyle, FontStyle, NumberFormat};
use super::AnchorPoint;
use crate::error::{SheetfillError, SheetfillResult};

const REL_OFFICE_DOCUMENT: &str = "/officeDocument";
const REL_STYLES: &str = "/styles";
const REL_DRAWING: &str = "/drawing";
const REL_IMAGE: &str = "/image";

/// Highest column number of a worksheet
const MAX_COLUMN: u32 = 16_384;

/// EMUs per pixel at 96 dpi
const EMU_PER_PIXEL: u64 = 9_525;

const DEFAULT_COLUMN_WIDTH_PX: u64 = 64;
const DEFAULT_ROW_HEIGHT_PX: u64 = 20;

/// Formatting and drawings of a whole package
#[derive(Debug, Default)]
pub(crate) struct PackageParts {
    /// Indexed by `cellXfs` position, the number cells carry in `s="…"`
    pub styles: Vec<CellStyle>,
    pub sheets: HashMap<String, SheetParts>,
}

#[derive(Debug, Default)]
pub(crate) struct SheetParts {
    /// 1-based column → width in character units
    pub column_widths: BTreeMap<u32, f64>,
    /// 1-based row → height in points
    pub row_heights: BTreeMap<u32, f64>,
    /// (row, col, style index), 1-based
    pub cell_styles: Vec<(u32, u32, usize)>,
    pub pictures: Vec<Picture>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Picture {
    pub bytes: Vec<u8>,
    pub top_left: AnchorPoint,
    pub bottom_right: AnchorPoint,
}

/// Read styles, sheet layout and pictures from .xlsx bytes
pub(crate) fn read_package(bytes: &[u8]) -> SheetfillResult<PackageParts> {
    let mut package = Package::open(bytes)?;

    let workbook_part = package
        .relationships("")?
        .into_iter()
        .find(|rel| rel.kind.ends_with(REL_OFFICE_DOCUMENT))
        .map(|rel| rel.target)
        .unwrap_or_else(|| "xl/workbook.xml".to_string());
    let workbook_rels = package.relationships(&workbook_part)?;

    let mut parts = PackageParts::default();

    if let Some(rel) = workbook_rels.iter().find(|r| r.kind.ends_with(REL_STYLES)) {
        if let Some(xml) = package.text_part(&rel.target)? {
            parts.styles = parse_styles(&xml, &rel.target)?;
        }
    }

    let Some(workbook_xml) = package.text_part(&workbook_part)? else {
        return Ok(parts);
    };
    for (name, rel_id) in parse_sheet_list(&workbook_xml, &workbook_part)? {
        let Some(rel) = workbook_rels.iter().find(|r| r.id == rel_id) else {
            continue;
        };
        let Some(xml) = package.text_part(&rel.target)? else {
            continue;
        };
        let (mut sheet, drawing_id) = parse_sheet(&xml, &rel.target)?;
        if let Some(drawing_id) = drawing_id {
            sheet.pictures = package.pictures(&rel.target, &drawing_id)?;
        }
        parts.sheets.insert(name, sheet);
    }

    Ok(parts)
}

//==============================================================================
// Package access
//==============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Relationship {
    id: String,
    kind: String,
    /// Part name resolved against the source part
    target: String,
}

struct Package<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
}

impl<'a> Package<'a> {
    fn open(bytes: &'a [u8]) -> SheetfillResult<Self> {
        let archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| SheetfillError::Read(format!("Failed to open workbook: {}", e)))?;
        Ok(Self { archive })
    }

    fn part(&mut self, name: &str) -> SheetfillResult<Option<Vec<u8>>> {
        let mut file = match self.archive.by_name(name) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => {
                return Err(SheetfillError::Read(format!(
                    "Failed to open {}: {}",
                    name, e
                )))
            }
        };
        let mut content = Vec::new();
        file.read_to_end(&mut content)?;
        Ok(Some(content))
    }

    fn text_part(&mut self, name: &str) -> SheetfillResult<Option<String>> {
        self.part(name)?
            .map(|bytes| {
                String::from_utf8(bytes)
                    .map_err(|e| SheetfillError::Read(format!("{} is not UTF-8: {}", name, e)))
            })
            .transpose()
    }

    /// Relationships of `source`; "" is the package root
    fn relationships(&mut self, source: &str) -> SheetfillResult<Vec<Relationship>> {
        let rels_name = rels_for_part(source);
        match self.text_part(&rels_name)? {
            Some(xml) => parse_relationships(&xml, &rels_name, source),
            None => Ok(Vec::new()),
        }
    }

    /// Pictures of the drawing `drawing_id` refers to from `sheet_part`
    fn pictures(&mut self, sheet_part: &str, drawing_id: &str) -> SheetfillResult<Vec<Picture>> {
        let sheet_rels = self.relationships(sheet_part)?;
        let Some(drawing) = sheet_rels
            .into_iter()
            .find(|r| r.id == drawing_id && r.kind.ends_with(REL_DRAWING))
        else {
            return Ok(Vec::new());
        };
        let Some(xml) = self.text_part(&drawing.target)? else {
            return Ok(Vec::new());
        };
        let drawing_rels = self.relationships(&drawing.target)?;

        let mut pictures = Vec::new();
        for anchor in parse_drawing(&xml, &drawing.target)? {
            let Some(media) = drawing_rels
                .iter()
                .find(|r| r.id == anchor.embed && r.kind.ends_with(REL_IMAGE))
            else {
                continue;
            };
            if let Some(bytes) = self.part(&media.target)? {
                pictures.push(Picture {
                    bytes,
                    top_left: anchor.top_left,
                    bottom_right: anchor.bottom_right,
                });
            }
        }
        Ok(pictures)
    }
}

fn rels_for_part(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file_name)) => format!("{}/_rels/{}.rels", dir, file_name),
        None if part.is_empty() => "_rels/.rels".to_string(),
        None => format!("_rels/{}.rels", part),
    }
}

fn resolve_target(source: &str, target: &str) -> String {
    let target = target.split('#').next().unwrap_or(target);
    let joined = match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => {
            let base_dir = source.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
            format!("{}/{}", base_dir, target)
        }
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

//==============================================================================
// XML helpers
//==============================================================================

fn xml_error(part: &str, e: impl std::fmt::Display) -> SheetfillError {
    SheetfillError::Read(format!("Malformed {}: {}", part, e))
}

/// Attributes of one element keyed by local name
struct Attrs(Vec<(Vec<u8>, String)>);

impl Attrs {
    fn read(e: &BytesStart<'_>, decoder: Decoder, part: &str) -> SheetfillResult<Self> {
        let mut attrs = Vec::new();
        for attr in e.attributes().with_checks(false) {
            let attr = attr.map_err(|err| xml_error(part, err))?;
            let value = attr
                .decode_and_unescape_value(decoder)
                .map_err(|err| xml_error(part, err))?;
            attrs.push((attr.key.local_name().as_ref().to_vec(), value.into_owned()));
        }
        Ok(Self(attrs))
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key.as_slice() == name.as_bytes())
            .map(|(_, value)| value.as_str())
    }

    fn number<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|v| v.trim().parse().ok())
    }

    fn flag(&self, name: &str) -> bool {
        matches!(self.get(name), Some("1") | Some("true"))
    }

    /// `<b/>`-style toggle: present means on unless `val` says otherwise
    fn toggle(&self) -> bool {
        !matches!(self.get("val"), Some("0") | Some("false"))
    }

    /// `rgb="FFRRGGBB"` as 0xRRGGBB
    fn rgb(&self) -> Option<u32> {
        let rgb = self.get("rgb")?;
        let hex = rgb.get(rgb.len().checked_sub(6)?..)?;
        u32::from_str_radix(hex, 16).ok()
    }
}

fn parse_relationships(
    xml: &str,
    part: &str,
    source: &str,
) -> SheetfillResult<Vec<Relationship>> {
    let mut reader = Reader::from_str(xml);
    let decoder = reader.decoder();
    let mut rels = Vec::new();

    loop {
        match reader.read_event().map_err(|e| xml_error(part, e))? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let attrs = Attrs::read(&e, decoder, part)?;
                if attrs.get("TargetMode") == Some("External") {
                    continue;
                }
                if let (Some(id), Some(target)) = (attrs.get("Id"), attrs.get("Target")) {
                    rels.push(Relationship {
                        id: id.to_string(),
                        kind: attrs.get("Type").unwrap_or_default().to_string(),
                        target: resolve_target(source, target),
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(rels)
}

/// (sheet name, relationship id) in workbook order
fn parse_sheet_list(xml: &str, part: &str) -> SheetfillResult<Vec<(String, String)>> {
    let mut reader = Reader::from_str(xml);
    let decoder = reader.decoder();
    let mut sheets = Vec::new();

    loop {
        match reader.read_event().map_err(|e| xml_error(part, e))? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let attrs = Attrs::read(&e, decoder, part)?;
                if let (Some(name), Some(id)) = (attrs.get("name"), attrs.get("id")) {
                    sheets.push((name.to_string(), id.to_string()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(sheets)
}

//==============================================================================
// Styles
//==============================================================================

#[derive(Clone, Copy, PartialEq)]
enum StyleSection {
    None,
    NumFmts,
    Fonts,
    Fills,
    Borders,
    CellXfs,
    Other,
}

#[derive(Default)]
struct XfRecord {
    num_fmt_id: u32,
    font_id: usize,
    fill_id: usize,
    border_id: usize,
    horizontal: FormatAlign,
    vertical: FormatAlign,
    wrap_text: bool,
}

#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
    Top,
    Bottom,
}

fn parse_styles(xml: &str, part: &str) -> SheetfillResult<Vec<CellStyle>> {
    let mut reader = Reader::from_str(xml);
    let decoder = reader.decoder();

    let mut section = StyleSection::None;
    let mut num_fmts: HashMap<u32, String> = HashMap::new();
    let mut fonts: Vec<FontStyle> = Vec::new();
    let mut fills: Vec<Option<u32>> = Vec::new();
    let mut borders: Vec<Borders> = Vec::new();
    let mut xfs: Vec<XfRecord> = Vec::new();

    let mut font = FontStyle::default();
    let mut fill_solid = false;
    let mut fill_color = None;
    let mut border = Borders::default();
    let mut side: Option<Side> = None;
    let mut xf = XfRecord::default();

    loop {
        let event = reader.read_event().map_err(|e| xml_error(part, e))?;
        let (e, empty) = match event {
            Event::Start(e) => (e, false),
            Event::Empty(e) => (e, true),
            Event::End(e) => {
                match (section, e.local_name().as_ref()) {
                    (
                        _,
                        b"numFmts" | b"fonts" | b"fills" | b"borders" | b"cellXfs"
                        | b"cellStyleXfs" | b"dxfs" | b"cellStyles" | b"colors" | b"extLst",
                    ) => {
                        section = StyleSection::None;
                    }
                    (StyleSection::Fonts, b"font") => fonts.push(std::mem::take(&mut font)),
                    (StyleSection::Fills, b"fill") => {
                        fills.push(if fill_solid { fill_color } else { None });
                    }
                    (StyleSection::Borders, b"left" | b"right" | b"top" | b"bottom" | b"start" | b"end") => {
                        side = None;
                    }
                    (StyleSection::Borders, b"border") => borders.push(std::mem::take(&mut border)),
                    (StyleSection::CellXfs, b"xf") => xfs.push(std::mem::take(&mut xf)),
                    _ => {}
                }
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };

        let name = e.local_name();
        match (section, name.as_ref()) {
            (_, b"numFmts") => section = StyleSection::NumFmts,
            (_, b"fonts") => section = StyleSection::Fonts,
            (_, b"fills") => section = StyleSection::Fills,
            (_, b"borders") => section = StyleSection::Borders,
            (_, b"cellXfs") => section = StyleSection::CellXfs,
            (_, b"cellStyleXfs" | b"dxfs" | b"cellStyles" | b"colors" | b"extLst") => {
                if !empty {
                    section = StyleSection::Other;
                }
            }

            (StyleSection::NumFmts, b"numFmt") => {
                let attrs = Attrs::read(&e, decoder, part)?;
                if let (Some(id), Some(code)) =
                    (attrs.number::<u32>("numFmtId"), attrs.get("formatCode"))
                {
                    num_fmts.insert(id, code.to_string());
                }
            }

            (StyleSection::Fonts, b"font") => {
                font = FontStyle::default();
                if empty {
                    fonts.push(FontStyle::default());
                }
            }
            (StyleSection::Fonts, tag) => {
                let attrs = Attrs::read(&e, decoder, part)?;
                match tag {
                    b"b" => font.bold = attrs.toggle(),
                    b"i" => font.italic = attrs.toggle(),
                    b"strike" => font.strikethrough = attrs.toggle(),
                    b"u" => font.underline = underline(attrs.get("val")),
                    b"sz" => font.size = attrs.number("val"),
                    b"name" => font.name = attrs.get("val").map(str::to_string),
                    b"color" => font.color = attrs.rgb(),
                    _ => {}
                }
            }

            (StyleSection::Fills, b"fill") => {
                fill_solid = false;
                fill_color = None;
                if empty {
                    fills.push(None);
                }
            }
            (StyleSection::Fills, b"patternFill") => {
                let attrs = Attrs::read(&e, decoder, part)?;
                fill_solid = attrs.get("patternType") == Some("solid");
            }
            (StyleSection::Fills, b"fgColor") => {
                fill_color = Attrs::read(&e, decoder, part)?.rgb();
            }

            (StyleSection::Borders, b"border") => {
                border = Borders::default();
                if empty {
                    borders.push(Borders::default());
                }
            }
            (StyleSection::Borders, b"left" | b"right" | b"top" | b"bottom" | b"start" | b"end") => {
                let current = match name.as_ref() {
                    b"left" | b"start" => Side::Left,
                    b"right" | b"end" => Side::Right,
                    b"top" => Side::Top,
                    _ => Side::Bottom,
                };
                let attrs = Attrs::read(&e, decoder, part)?;
                border_side(&mut border, current).line = border_line(attrs.get("style"));
                side = if empty { None } else { Some(current) };
            }
            (StyleSection::Borders, b"color") => {
                if let Some(current) = side {
                    border_side(&mut border, current).color =
                        Attrs::read(&e, decoder, part)?.rgb();
                }
            }

            (StyleSection::CellXfs, b"xf") => {
                let attrs = Attrs::read(&e, decoder, part)?;
                xf = XfRecord {
                    num_fmt_id: attrs.number("numFmtId").unwrap_or(0),
                    font_id: attrs.number("fontId").unwrap_or(0),
                    fill_id: attrs.number("fillId").unwrap_or(0),
                    border_id: attrs.number("borderId").unwrap_or(0),
                    ..Default::default()
                };
                if empty {
                    xfs.push(std::mem::take(&mut xf));
                }
            }
            (StyleSection::CellXfs, b"alignment") => {
                let attrs = Attrs::read(&e, decoder, part)?;
                xf.horizontal = horizontal_align(attrs.get("horizontal"));
                xf.vertical = vertical_align(attrs.get("vertical"));
                xf.wrap_text = attrs.flag("wrapText");
            }

            _ => {}
        }
    }

    Ok(xfs
        .into_iter()
        .map(|xf| CellStyle {
            num_format: number_format(xf.num_fmt_id, &num_fmts),
            font: fonts.get(xf.font_id).cloned().unwrap_or_default(),
            fill: fills.get(xf.fill_id).copied().flatten(),
            borders: borders.get(xf.border_id).copied().unwrap_or_default(),
            horizontal: xf.horizontal,
            vertical: xf.vertical,
            wrap_text: xf.wrap_text,
        })
        .collect())
}

fn number_format(id: u32, custom: &HashMap<u32, String>) -> Option<NumberFormat> {
    if id == 0 {
        return None;
    }
    if let Some(code) = custom.get(&id) {
        return Some(NumberFormat::Custom(code.clone()));
    }
    u8::try_from(id).ok().map(NumberFormat::Builtin)
}

fn border_side(borders: &mut Borders, side: Side) -> &mut BorderSide {
    match side {
        Side::Left => &mut borders.left,
        Side::Right => &mut borders.right,
        Side::Top => &mut borders.top,
        Side::Bottom => &mut borders.bottom,
    }
}

fn border_line(style: Option<&str>) -> FormatBorder {
    match style {
        Some("thin") => FormatBorder::Thin,
        Some("medium") => FormatBorder::Medium,
        Some("dashed") => FormatBorder::Dashed,
        Some("dotted") => FormatBorder::Dotted,
        Some("thick") => FormatBorder::Thick,
        Some("double") => FormatBorder::Double,
        Some("hair") => FormatBorder::Hair,
        Some("mediumDashed") => FormatBorder::MediumDashed,
        Some("dashDot") => FormatBorder::DashDot,
        Some("mediumDashDot") => FormatBorder::MediumDashDot,
        Some("dashDotDot") => FormatBorder::DashDotDot,
        Some("mediumDashDotDot") => FormatBorder::MediumDashDotDot,
        Some("slantDashDot") => FormatBorder::SlantDashDot,
        _ => FormatBorder::None,
    }
}

fn underline(val: Option<&str>) -> FormatUnderline {
    match val {
        None | Some("single") => FormatUnderline::Single,
        Some("double") => FormatUnderline::Double,
        Some("singleAccounting") => FormatUnderline::SingleAccounting,
        Some("doubleAccounting") => FormatUnderline::DoubleAccounting,
        _ => FormatUnderline::None,
    }
}

fn horizontal_align(val: Option<&str>) -> FormatAlign {
    match val {
        Some("left") => FormatAlign::Left,
        Some("center") => FormatAlign::Center,
        Some("right") => FormatAlign::Right,
        Some("fill") => FormatAlign::Fill,
        Some("justify") => FormatAlign::Justify,
        Some("centerContinuous") => FormatAlign::CenterAcross,
        Some("distributed") => FormatAlign::Distributed,
        _ => FormatAlign::General,
    }
}

fn vertical_align(val: Option<&str>) -> FormatAlign {
    match val {
        Some("top") => FormatAlign::Top,
        Some("center") => FormatAlign::VerticalCenter,
        Some("justify") => FormatAlign::VerticalJustify,
        Some("distributed") => FormatAlign::VerticalDistributed,
        _ => FormatAlign::General,
    }
}

//==============================================================================
// Worksheets
//==============================================================================

/// Layout and cell style indices of a worksheet part, plus the relationship
/// id of its drawing
fn parse_sheet(xml: &str, part: &str) -> SheetfillResult<(SheetParts, Option<String>)> {
    let mut reader = Reader::from_str(xml);
    let decoder = reader.decoder();
    let mut sheet = SheetParts::default();
    let mut drawing = None;

    loop {
        match reader.read_event().map_err(|e| xml_error(part, e))? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"col" => {
                    let attrs = Attrs::read(&e, decoder, part)?;
                    if !attrs.flag("customWidth") {
                        continue;
                    }
                    let (Some(min), Some(max), Some(width)) = (
                        attrs.number::<u32>("min"),
                        attrs.number::<u32>("max"),
                        attrs.number::<f64>("width"),
                    ) else {
                        continue;
                    };
                    let width = character_width(width);
                    for col in min.max(1)..=max.min(MAX_COLUMN) {
                        sheet.column_widths.insert(col, width);
                    }
                }
                b"row" => {
                    let attrs = Attrs::read(&e, decoder, part)?;
                    if attrs.flag("customHeight") {
                        if let (Some(row), Some(height)) =
                            (attrs.number::<u32>("r"), attrs.number::<f64>("ht"))
                        {
                            sheet.row_heights.insert(row, height);
                        }
                    }
                }
                b"c" => {
                    let attrs = Attrs::read(&e, decoder, part)?;
                    if let (Some(reference), Some(style)) =
                        (attrs.get("r"), attrs.number::<usize>("s"))
                    {
                        let (row, col) = address::parse_cell(reference)?;
                        sheet.cell_styles.push((row, col, style));
                    }
                }
                b"drawing" => {
                    drawing = Attrs::read(&e, decoder, part)?.get("id").map(str::to_string);
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok((sheet, drawing))
}

/// Stored `<col width>` back to the character width it was set with
fn character_width(stored: f64) -> f64 {
    let pixels = (stored * 7.0).round();
    if pixels < 12.0 {
        pixels / 12.0
    } else {
        (pixels - 5.0) / 7.0
    }
}

//==============================================================================
// Drawings
//==============================================================================

#[derive(Debug, Clone, PartialEq)]
struct DrawingAnchor {
    embed: String,
    top_left: AnchorPoint,
    bottom_right: AnchorPoint,
}

#[derive(Default, Clone, Copy)]
struct Marker {
    row: u32,
    col: u32,
    row_off: u64,
    col_off: u64,
}

#[derive(Clone, Copy)]
enum MarkerField {
    Row,
    Col,
    RowOff,
    ColOff,
}

fn parse_drawing(xml: &str, part: &str) -> SheetfillResult<Vec<DrawingAnchor>> {
    let mut reader = Reader::from_str(xml);
    let decoder = reader.decoder();
    let mut anchors = Vec::new();

    let mut in_anchor = false;
    let mut from = Marker::default();
    let mut to: Option<Marker> = None;
    let mut extent: Option<(u64, u64)> = None;
    let mut embed: Option<String> = None;
    let mut in_to = false;
    let mut field: Option<MarkerField> = None;

    loop {
        match reader.read_event().map_err(|e| xml_error(part, e))? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"twoCellAnchor" | b"oneCellAnchor" => {
                    in_anchor = true;
                    from = Marker::default();
                    to = None;
                    extent = None;
                    embed = None;
                }
                b"from" => in_to = false,
                b"to" => {
                    in_to = true;
                    to = Some(Marker::default());
                }
                b"row" => field = Some(MarkerField::Row),
                b"col" => field = Some(MarkerField::Col),
                b"rowOff" => field = Some(MarkerField::RowOff),
                b"colOff" => field = Some(MarkerField::ColOff),
                b"ext" if in_anchor && extent.is_none() => {
                    let attrs = Attrs::read(&e, decoder, part)?;
                    if let (Some(cx), Some(cy)) =
                        (attrs.number::<u64>("cx"), attrs.number::<u64>("cy"))
                    {
                        extent = Some((cx, cy));
                    }
                }
                b"blip" if in_anchor => {
                    embed = Attrs::read(&e, decoder, part)?.get("embed").map(str::to_string);
                }
                _ => {}
            },
            Event::Text(text) => {
                let Some(current) = field else {
                    continue;
                };
                let text = text.decode().map_err(|e| xml_error(part, e))?;
                let Ok(value) = text.trim().parse::<u64>() else {
                    continue;
                };
                let marker = match (in_to, to.as_mut()) {
                    (true, Some(marker)) => marker,
                    _ => &mut from,
                };
                match current {
                    MarkerField::Row => marker.row = value as u32,
                    MarkerField::Col => marker.col = value as u32,
                    MarkerField::RowOff => marker.row_off = value,
                    MarkerField::ColOff => marker.col_off = value,
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"row" | b"col" | b"rowOff" | b"colOff" => field = None,
                b"twoCellAnchor" | b"oneCellAnchor" => {
                    in_anchor = false;
                    if let Some(embed) = embed.take() {
                        let top_left = AnchorPoint {
                            row: from.row,
                            col: from.col,
                        };
                        let bottom_right = anchor_end(top_left, to, extent);
                        anchors.push(DrawingAnchor {
                            embed,
                            top_left,
                            bottom_right,
                        });
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(anchors)
}

/// Exclusive bottom-right corner of a picture, at least one cell past its
/// top-left corner
fn anchor_end(top_left: AnchorPoint, to: Option<Marker>, extent: Option<(u64, u64)>) -> AnchorPoint {
    let (row, col) = match (to, extent) {
        (Some(to), _) => (
            to.row + u32::from(to.row_off > 0),
            to.col + u32::from(to.col_off > 0),
        ),
        (None, Some((cx, cy))) => {
            let cols = (cx / EMU_PER_PIXEL).div_ceil(DEFAULT_COLUMN_WIDTH_PX);
            let rows = (cy / EMU_PER_PIXEL).div_ceil(DEFAULT_ROW_HEIGHT_PX);
            (
                top_left.row + rows as u32,
                top_left.col + cols as u32,
            )
        }
        (None, None) => (top_left.row + 1, top_left.col + 1),
    };
    AnchorPoint {
        row: row.max(top_left.row + 1),
        col: col.max(top_left.col + 1),
    }
}
