use std::collections::HashMap;
use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use quick_xml::escape::escape;
use roxmltree::{Document, Node};

use crate::core::package;
use crate::core::walker::DocumentAdapter;
use crate::{RgbColor, Run, RunStyle, StyledFragment, TextUnit, UnitKind};

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const DOCUMENT_PART: &str = "word/document.xml";

/// Word document adapter: enumerates body and table-cell paragraphs out of
/// `word/document.xml`, collects rebuilt paragraphs as byte-range
/// replacements, and repacks the archive on save.
pub struct DocxAdapter {
    path: PathBuf,
    package: Vec<u8>,
    document_xml: String,
    units: Vec<StoredUnit>,
    replacements: Vec<(Range<usize>, String)>,
}

struct StoredUnit {
    /// Byte range of the whole `w:p` element inside `document.xml`.
    range: Range<usize>,
    /// Original `w:pPr` element, kept verbatim on rebuild.
    ppr_xml: Option<String>,
    unit: TextUnit,
}

impl DocxAdapter {
    pub fn open(path: &Path) -> Result<Self> {
        let package = package::read_package(path)?;
        let document_xml = package::read_part(&package, DOCUMENT_PART)?;
        let units = parse_units(&document_xml)?;
        debug!("解析 {}: {} 个段落单元", path.display(), units.len());
        Ok(DocxAdapter {
            path: path.to_path_buf(),
            package,
            document_xml,
            units,
            replacements: Vec::new(),
        })
    }
}

impl DocumentAdapter for DocxAdapter {
    fn path(&self) -> &Path {
        &self.path
    }

    fn units(&self) -> Result<Vec<TextUnit>> {
        Ok(self.units.iter().map(|stored| stored.unit.clone()).collect())
    }

    fn rebuild_unit(&mut self, unit_id: usize, fragments: &[StyledFragment]) -> Result<()> {
        let stored = self.units.get(unit_id).context("未知的文本单元")?;
        let xml = paragraph_xml(stored.ppr_xml.as_deref(), fragments);
        self.replacements.push((stored.range.clone(), xml));
        Ok(())
    }

    fn save(&mut self, output: &Path) -> Result<()> {
        let document_xml =
            package::splice(&self.document_xml, std::mem::take(&mut self.replacements));
        let mut parts = HashMap::new();
        parts.insert(DOCUMENT_PART.to_string(), document_xml);
        package::rewrite_package(&self.package, output, &parts)
    }
}

/// Enumerate units in the fixed walk order: direct body paragraphs first,
/// then each body-level table row by row, cell by cell, each cell's
/// paragraphs in order. Nested tables are not recursed.
fn parse_units(xml: &str) -> Result<Vec<StoredUnit>> {
    let doc = Document::parse(xml)?;
    let body = doc
        .root_element()
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "body")
        .context("document.xml 缺少 w:body")?;

    let mut stored = Vec::new();
    for p_node in body.children().filter(|n| n.is_element() && n.tag_name().name() == "p") {
        store_paragraph(&mut stored, xml, p_node, UnitKind::BodyParagraph);
    }

    for tbl in body.children().filter(|n| n.is_element() && n.tag_name().name() == "tbl") {
        for tr in tbl.children().filter(|n| n.is_element() && n.tag_name().name() == "tr") {
            for tc in tr.children().filter(|n| n.is_element() && n.tag_name().name() == "tc") {
                for p_node in tc.children().filter(|n| n.is_element() && n.tag_name().name() == "p")
                {
                    store_paragraph(&mut stored, xml, p_node, UnitKind::TableCellParagraph);
                }
            }
        }
    }

    Ok(stored)
}

fn store_paragraph(stored: &mut Vec<StoredUnit>, xml: &str, p_node: Node, kind: UnitKind) {
    let ppr_xml = p_node
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "pPr")
        .map(|n| xml[n.range()].to_string());

    let runs: Vec<Run> = p_node
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "r")
        .map(parse_run)
        .collect();
    let text: String = runs.iter().map(|run| run.text.as_str()).collect();

    let id = stored.len();
    stored.push(StoredUnit {
        range: p_node.range(),
        ppr_xml,
        unit: TextUnit { id, kind, text, runs },
    });
}

fn parse_run(r_node: Node) -> Run {
    let mut text = String::new();
    for child in r_node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "t" => {
                if let Some(t) = child.text() {
                    text.push_str(t);
                }
            }
            "tab" => text.push('\t'),
            "br" | "cr" => text.push('\n'),
            _ => {}
        }
    }

    let style = r_node
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "rPr")
        .map(parse_run_props)
        .unwrap_or_default();

    Run { text, style }
}

fn parse_run_props(rpr: Node) -> RunStyle {
    let mut style = RunStyle::default();
    for child in rpr.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "b" => style.bold = Some(on_off(child)),
            "i" => style.italic = Some(on_off(child)),
            "u" => {
                style.underline =
                    Some(child.attribute((W_NS, "val")).map(|v| v != "none").unwrap_or(true))
            }
            "rFonts" => {
                style.font = child
                    .attribute((W_NS, "ascii"))
                    .or_else(|| child.attribute((W_NS, "eastAsia")))
                    .map(|s| s.to_string())
            }
            "sz" => style.size = child.attribute((W_NS, "val")).and_then(|v| v.parse().ok()),
            "color" => {
                style.color = child.attribute((W_NS, "val")).and_then(RgbColor::from_hex)
            }
            "highlight" => {
                style.highlight = child.attribute((W_NS, "val")).map(|s| s.to_string())
            }
            "rStyle" => {
                style.style_ref = child.attribute((W_NS, "val")).map(|s| s.to_string())
            }
            _ => {}
        }
    }
    style
}

/// Toggle property value: absent means on, `0`/`false`/`off`/`none` mean off.
fn on_off(node: Node) -> bool {
    !matches!(
        node.attribute((W_NS, "val")),
        Some("0") | Some("false") | Some("off") | Some("none")
    )
}

fn paragraph_xml(ppr_xml: Option<&str>, fragments: &[StyledFragment]) -> String {
    let mut xml = String::from("<w:p>");
    if let Some(ppr) = ppr_xml {
        xml.push_str(ppr);
    }
    for fragment in fragments {
        xml.push_str(&run_xml(&fragment.text, fragment.style.as_ref()));
    }
    xml.push_str("</w:p>");
    xml
}

fn run_xml(text: &str, style: Option<&RunStyle>) -> String {
    let mut xml = String::from("<w:r>");
    if let Some(style) = style {
        let props = run_props_xml(style);
        if !props.is_empty() {
            xml.push_str("<w:rPr>");
            xml.push_str(&props);
            xml.push_str("</w:rPr>");
        }
    }

    let mut buf = String::new();
    for ch in text.chars() {
        match ch {
            '\t' => {
                flush_text(&mut xml, &mut buf);
                xml.push_str("<w:tab/>");
            }
            '\n' => {
                flush_text(&mut xml, &mut buf);
                xml.push_str("<w:br/>");
            }
            _ => buf.push(ch),
        }
    }
    flush_text(&mut xml, &mut buf);

    xml.push_str("</w:r>");
    xml
}

fn flush_text(xml: &mut String, buf: &mut String) {
    if buf.is_empty() {
        return;
    }
    xml.push_str("<w:t xml:space=\"preserve\">");
    xml.push_str(&escape(buf.as_str()));
    xml.push_str("</w:t>");
    buf.clear();
}

/// Run property elements in schema order. Only attributes actually present
/// in the style are written; an explicit off keeps its `w:val="0"`.
fn run_props_xml(style: &RunStyle) -> String {
    let mut props = String::new();
    if let Some(style_ref) = &style.style_ref {
        props.push_str(&format!("<w:rStyle w:val=\"{}\"/>", escape(style_ref)));
    }
    if let Some(font) = &style.font {
        props.push_str(&format!(
            "<w:rFonts w:ascii=\"{0}\" w:hAnsi=\"{0}\" w:eastAsia=\"{0}\"/>",
            escape(font)
        ));
    }
    if let Some(bold) = style.bold {
        props.push_str(if bold { "<w:b/>" } else { "<w:b w:val=\"0\"/>" });
    }
    if let Some(italic) = style.italic {
        props.push_str(if italic { "<w:i/>" } else { "<w:i w:val=\"0\"/>" });
    }
    if let Some(color) = style.color {
        props.push_str(&format!("<w:color w:val=\"{}\"/>", color.to_hex()));
    }
    if let Some(size) = style.size {
        props.push_str(&format!("<w:sz w:val=\"{0}\"/><w:szCs w:val=\"{0}\"/>", size));
    }
    if let Some(highlight) = &style.highlight {
        props.push_str(&format!("<w:highlight w:val=\"{}\"/>", escape(highlight)));
    }
    if let Some(underline) = style.underline {
        props.push_str(if underline {
            "<w:u w:val=\"single\"/>"
        } else {
            "<w:u w:val=\"none\"/>"
        });
    }
    props
}
