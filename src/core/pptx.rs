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

const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PRESENTATION_PART: &str = "ppt/presentation.xml";
const PRESENTATION_RELS: &str = "ppt/_rels/presentation.xml.rels";

/// Presentation adapter: one unit per slide shape with a text frame, slides
/// in the order declared by `p:sldIdLst`, shapes in their native order.
pub struct PptxAdapter {
    path: PathBuf,
    package: Vec<u8>,
    slides: Vec<SlidePart>,
    units: Vec<StoredShape>,
}

struct SlidePart {
    part_name: String,
    xml: String,
    replacements: Vec<(Range<usize>, String)>,
}

struct StoredShape {
    slide_index: usize,
    /// Byte range of the whole `p:txBody` element inside the slide part.
    txbody_range: Range<usize>,
    /// `a:bodyPr` and `a:lstStyle` slices, kept verbatim on rebuild.
    preserved_xml: String,
    /// First original paragraph's alignment and indent level.
    align: Option<String>,
    level: Option<String>,
    unit: TextUnit,
}

impl PptxAdapter {
    pub fn open(path: &Path) -> Result<Self> {
        let package = package::read_package(path)?;
        let part_names = resolve_slide_parts(&package)?;
        let slide_total = part_names.len();

        let mut slides = Vec::new();
        let mut units = Vec::new();
        for (slide_index, part_name) in part_names.into_iter().enumerate() {
            let xml = package::read_part(&package, &part_name)?;
            parse_shapes(&xml, slide_index, slide_total, &mut units)?;
            slides.push(SlidePart { part_name, xml, replacements: Vec::new() });
        }
        debug!("解析 {}: {} 张幻灯片, {} 个文本形状", path.display(), slides.len(), units.len());

        Ok(PptxAdapter { path: path.to_path_buf(), package, slides, units })
    }
}

impl DocumentAdapter for PptxAdapter {
    fn path(&self) -> &Path {
        &self.path
    }

    fn units(&self) -> Result<Vec<TextUnit>> {
        Ok(self.units.iter().map(|stored| stored.unit.clone()).collect())
    }

    fn rebuild_unit(&mut self, unit_id: usize, fragments: &[StyledFragment]) -> Result<()> {
        let stored = self.units.get(unit_id).context("未知的文本单元")?;
        let xml = text_body_xml(
            &stored.preserved_xml,
            stored.align.as_deref(),
            stored.level.as_deref(),
            fragments,
        );
        self.slides[stored.slide_index]
            .replacements
            .push((stored.txbody_range.clone(), xml));
        Ok(())
    }

    fn save(&mut self, output: &Path) -> Result<()> {
        let mut parts = HashMap::new();
        for slide in &mut self.slides {
            if slide.replacements.is_empty() {
                continue;
            }
            let xml = package::splice(&slide.xml, std::mem::take(&mut slide.replacements));
            parts.insert(slide.part_name.clone(), xml);
        }
        package::rewrite_package(&self.package, output, &parts)
    }
}

/// Slide part names in presentation order: `p:sldIdLst` entries resolved
/// through the presentation relationships.
fn resolve_slide_parts(package: &[u8]) -> Result<Vec<String>> {
    let rels_xml = package::read_part(package, PRESENTATION_RELS)?;
    let rels_doc = Document::parse(&rels_xml)?;
    let mut targets = HashMap::new();
    for rel in rels_doc
        .root_element()
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "Relationship")
    {
        if let (Some(id), Some(target)) = (rel.attribute("Id"), rel.attribute("Target")) {
            targets.insert(id.to_string(), target.to_string());
        }
    }

    let presentation_xml = package::read_part(package, PRESENTATION_PART)?;
    let presentation_doc = Document::parse(&presentation_xml)?;
    let mut parts = Vec::new();
    if let Some(sld_id_lst) = presentation_doc
        .root_element()
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "sldIdLst")
    {
        for sld_id in sld_id_lst
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "sldId")
        {
            let rid = sld_id
                .attribute((R_NS, "id"))
                .context("p:sldId 缺少 r:id 属性")?;
            let target = targets
                .get(rid)
                .with_context(|| format!("演示文稿关系中缺少 {}", rid))?;
            parts.push(normalize_part_name(target));
        }
    }
    Ok(parts)
}

fn normalize_part_name(target: &str) -> String {
    let target = target.trim_start_matches('/');
    if target.starts_with("ppt/") {
        target.to_string()
    } else {
        format!("ppt/{}", target)
    }
}

/// One unit per `p:sp` carrying a `p:txBody`. Shape text is the paragraph
/// texts joined with `\n`; the run list is flat, so the style table built
/// from it does not cover the separator positions.
fn parse_shapes(
    xml: &str,
    slide_index: usize,
    slide_total: usize,
    units: &mut Vec<StoredShape>,
) -> Result<()> {
    let doc = Document::parse(xml)?;
    let sp_tree = match doc
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "spTree")
    {
        Some(node) => node,
        None => return Ok(()),
    };

    for sp in sp_tree.children().filter(|n| n.is_element() && n.tag_name().name() == "sp") {
        let tx_body = match sp
            .children()
            .find(|n| n.is_element() && n.tag_name().name() == "txBody")
        {
            Some(node) => node,
            None => continue,
        };

        let preserved_xml: String = tx_body
            .children()
            .filter(|n| {
                n.is_element()
                    && matches!(n.tag_name().name(), "bodyPr" | "lstStyle")
            })
            .map(|n| &xml[n.range()])
            .collect();

        let paragraphs: Vec<Node> = tx_body
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "p")
            .collect();

        let (align, level) = paragraphs
            .first()
            .and_then(|p| {
                p.children()
                    .find(|n| n.is_element() && n.tag_name().name() == "pPr")
            })
            .map(|ppr| {
                (
                    ppr.attribute("algn").map(|s| s.to_string()),
                    ppr.attribute("lvl").map(|s| s.to_string()),
                )
            })
            .unwrap_or((None, None));

        let mut runs = Vec::new();
        let mut paragraph_texts = Vec::new();
        for paragraph in &paragraphs {
            let mut paragraph_text = String::new();
            for r_node in paragraph
                .children()
                .filter(|n| n.is_element() && n.tag_name().name() == "r")
            {
                let run = parse_run(r_node);
                paragraph_text.push_str(&run.text);
                runs.push(run);
            }
            paragraph_texts.push(paragraph_text);
        }

        let id = units.len();
        units.push(StoredShape {
            slide_index,
            txbody_range: tx_body.range(),
            preserved_xml,
            align,
            level,
            unit: TextUnit {
                id,
                kind: UnitKind::ShapeText { slide: slide_index + 1, slide_total },
                text: paragraph_texts.join("\n"),
                runs,
            },
        });
    }
    Ok(())
}

fn parse_run(r_node: Node) -> Run {
    let text = r_node
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "t")
        .and_then(|t| t.text())
        .unwrap_or_default()
        .to_string();

    let style = r_node
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "rPr")
        .map(parse_run_props)
        .unwrap_or_default();

    Run { text, style }
}

fn parse_run_props(rpr: Node) -> RunStyle {
    let mut style = RunStyle::default();
    style.bold = rpr.attribute("b").map(truthy);
    style.italic = rpr.attribute("i").map(truthy);
    style.underline = rpr.attribute("u").map(|v| v != "none");
    style.size = rpr.attribute("sz").and_then(|v| v.parse().ok());

    for child in rpr.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "solidFill" => {
                style.color = child
                    .children()
                    .find(|n| n.is_element() && n.tag_name().name() == "srgbClr")
                    .and_then(|c| c.attribute("val"))
                    .and_then(RgbColor::from_hex)
            }
            "latin" => {
                style.font = child.attribute("typeface").map(|s| s.to_string());
            }
            "ea" => {
                if style.font.is_none() {
                    style.font = child.attribute("typeface").map(|s| s.to_string());
                }
            }
            _ => {}
        }
    }
    style
}

fn truthy(value: &str) -> bool {
    !matches!(value, "0" | "false" | "off")
}

/// Rebuild the whole text frame as a single paragraph: body properties kept,
/// the first original paragraph's alignment and level reapplied, then one
/// run per fragment.
fn text_body_xml(
    preserved_xml: &str,
    align: Option<&str>,
    level: Option<&str>,
    fragments: &[StyledFragment],
) -> String {
    let mut xml = String::from("<p:txBody>");
    xml.push_str(preserved_xml);
    xml.push_str("<a:p>");

    if align.is_some() || level.is_some() {
        xml.push_str("<a:pPr");
        if let Some(level) = level {
            xml.push_str(&format!(" lvl=\"{}\"", escape(level)));
        }
        if let Some(align) = align {
            xml.push_str(&format!(" algn=\"{}\"", escape(align)));
        }
        xml.push_str("/>");
    }

    for fragment in fragments {
        xml.push_str(&run_xml(&fragment.text, fragment.style.as_ref()));
    }

    xml.push_str("</a:p></p:txBody>");
    xml
}

fn run_xml(text: &str, style: Option<&RunStyle>) -> String {
    let mut attrs = String::new();
    let mut children = String::new();
    if let Some(style) = style {
        if let Some(bold) = style.bold {
            attrs.push_str(if bold { " b=\"1\"" } else { " b=\"0\"" });
        }
        if let Some(italic) = style.italic {
            attrs.push_str(if italic { " i=\"1\"" } else { " i=\"0\"" });
        }
        if let Some(underline) = style.underline {
            attrs.push_str(if underline { " u=\"sng\"" } else { " u=\"none\"" });
        }
        if let Some(size) = style.size {
            attrs.push_str(&format!(" sz=\"{}\"", size));
        }
        if let Some(color) = style.color {
            children.push_str(&format!(
                "<a:solidFill><a:srgbClr val=\"{}\"/></a:solidFill>",
                color.to_hex()
            ));
        }
        if let Some(font) = &style.font {
            children.push_str(&format!(
                "<a:latin typeface=\"{0}\"/><a:ea typeface=\"{0}\"/>",
                escape(font)
            ));
        }
    }

    let mut xml = String::from("<a:r>");
    if children.is_empty() {
        if !attrs.is_empty() {
            xml.push_str(&format!("<a:rPr{}/>", attrs));
        }
    } else {
        xml.push_str(&format!("<a:rPr{}>{}</a:rPr>", attrs, children));
    }
    xml.push_str("<a:t>");
    xml.push_str(&escape(text));
    xml.push_str("</a:t></a:r>");
    xml
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::walker::walk;
    use crate::provider::SuggestionSource;
    use crate::Suggestion;
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    const P_NS: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
    const A_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";

    fn slide(shapes: &str) -> String {
        format!(
            "<p:sld xmlns:p=\"{}\" xmlns:a=\"{}\"><p:cSld><p:spTree>{}</p:spTree></p:cSld></p:sld>",
            P_NS, A_NS, shapes
        )
    }

    fn shape(tx_body_children: &str) -> String {
        format!("<p:sp><p:txBody><a:bodyPr/>{}</p:txBody></p:sp>", tx_body_children)
    }

    #[test]
    fn shape_text_joins_paragraphs_with_newline() {
        let xml = slide(&shape(
            "<a:p><a:r><a:t>第一行</a:t></a:r></a:p><a:p><a:r><a:t>第二行</a:t></a:r></a:p>",
        ));
        let mut units = Vec::new();
        parse_shapes(&xml, 0, 3, &mut units).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].unit.text, "第一行\n第二行");
        assert_eq!(units[0].unit.kind, UnitKind::ShapeText { slide: 1, slide_total: 3 });
        // the run list does not cover the separator, so the style table is
        // one short of the text length
        assert_eq!(units[0].unit.runs.iter().map(|r| r.text.chars().count()).sum::<usize>(), 6);
        assert_eq!(units[0].unit.text.chars().count(), 7);
    }

    #[test]
    fn shapes_without_text_frame_are_ignored() {
        let xml = slide("<p:sp><p:spPr/></p:sp><p:pic/>");
        let mut units = Vec::new();
        parse_shapes(&xml, 0, 1, &mut units).unwrap();
        assert!(units.is_empty());
    }

    #[test]
    fn run_properties_parse_from_attributes_and_children() {
        let xml = slide(&shape(
            "<a:p><a:pPr lvl=\"1\" algn=\"ctr\"/>\
             <a:r><a:rPr b=\"1\" i=\"0\" u=\"sng\" sz=\"1800\">\
               <a:solidFill><a:srgbClr val=\"00B050\"/></a:solidFill>\
               <a:latin typeface=\"微软雅黑\"/>\
             </a:rPr><a:t>标题</a:t></a:r></a:p>",
        ));
        let mut units = Vec::new();
        parse_shapes(&xml, 0, 1, &mut units).unwrap();
        let stored = &units[0];
        assert_eq!(stored.align.as_deref(), Some("ctr"));
        assert_eq!(stored.level.as_deref(), Some("1"));
        let style = &stored.unit.runs[0].style;
        assert_eq!(style.bold, Some(true));
        assert_eq!(style.italic, Some(false));
        assert_eq!(style.underline, Some(true));
        assert_eq!(style.size, Some(1800));
        assert_eq!(style.color, Some(RgbColor { r: 0x00, g: 0xB0, b: 0x50 }));
        assert_eq!(style.font.as_deref(), Some("微软雅黑"));
    }

    #[test]
    fn rebuilt_text_body_keeps_body_properties_and_paragraph_format() {
        let fragments = vec![
            StyledFragment { text: "好".to_string(), style: None },
            StyledFragment {
                text: "(建议)".to_string(),
                style: Some(RunStyle::default().with_red_color()),
            },
        ];
        let xml = text_body_xml("<a:bodyPr/><a:lstStyle/>", Some("ctr"), Some("1"), &fragments);
        assert!(xml.starts_with("<p:txBody><a:bodyPr/><a:lstStyle/><a:p><a:pPr lvl=\"1\" algn=\"ctr\"/>"));
        assert!(xml.contains("<a:solidFill><a:srgbClr val=\"FF0000\"/></a:solidFill>"));
        assert!(xml.ends_with("</a:p></p:txBody>"));
        // unstyled fragment gets a bare run
        assert!(xml.contains("<a:r><a:t>好</a:t></a:r>"));
    }

    fn presentation_xml() -> String {
        format!(
            "<p:presentation xmlns:p=\"{}\" xmlns:r=\"{}\">\
             <p:sldIdLst><p:sldId id=\"256\" r:id=\"rId2\"/><p:sldId id=\"257\" r:id=\"rId1\"/></p:sldIdLst>\
             </p:presentation>",
            P_NS, R_NS
        )
    }

    fn presentation_rels() -> &'static str {
        "<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
         <Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide\" Target=\"slides/slide1.xml\"/>\
         <Relationship Id=\"rId2\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide\" Target=\"slides/slide2.xml\"/>\
         </Relationships>"
    }

    fn write_pptx(path: &Path, slide1: &str, slide2: &str) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = ZipWriter::new(file);
        let options = FileOptions::default();
        writer.start_file("ppt/presentation.xml", options).unwrap();
        writer.write_all(presentation_xml().as_bytes()).unwrap();
        writer.start_file("ppt/_rels/presentation.xml.rels", options).unwrap();
        writer.write_all(presentation_rels().as_bytes()).unwrap();
        writer.start_file("ppt/slides/slide1.xml", options).unwrap();
        writer.write_all(slide1.as_bytes()).unwrap();
        writer.start_file("ppt/slides/slide2.xml", options).unwrap();
        writer.write_all(slide2.as_bytes()).unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn slides_follow_the_declared_order_not_the_part_names() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("讲稿.pptx");
        // sldIdLst lists rId2 (slide2) first
        write_pptx(
            &input,
            &slide(&shape("<a:p><a:r><a:t>后</a:t></a:r></a:p>")),
            &slide(&shape("<a:p><a:r><a:t>先</a:t></a:r></a:p>")),
        );

        let adapter = PptxAdapter::open(&input).unwrap();
        let units = adapter.units().unwrap();
        let texts: Vec<&str> = units.iter().map(|u| u.text.as_str()).collect();
        assert_eq!(texts, vec!["先", "后"]);
        assert_eq!(units[0].kind, UnitKind::ShapeText { slide: 1, slide_total: 2 });
        assert_eq!(units[1].kind, UnitKind::ShapeText { slide: 2, slide_total: 2 });
    }

    struct OneSuggestion(Suggestion);

    impl SuggestionSource for OneSuggestion {
        fn suggest(&self, text: &str) -> anyhow::Result<Vec<Suggestion>> {
            if text.contains(&self.0.original) {
                Ok(vec![self.0.clone()])
            } else {
                Ok(Vec::new())
            }
        }
    }

    #[test]
    fn full_walk_rewrites_only_the_affected_slide() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("讲稿.pptx");
        write_pptx(
            &input,
            &slide(&shape("<a:p><a:r><a:rPr b=\"1\"/><a:t>abc def</a:t></a:r></a:p>")),
            &slide(&shape("<a:p><a:r><a:t>没有目标</a:t></a:r></a:p>")),
        );

        let mut adapter = PptxAdapter::open(&input).unwrap();
        let provider = OneSuggestion(Suggestion {
            original: "abc".to_string(),
            replacement: "ABC".to_string(),
        });
        let output = walk(&mut adapter, &provider, &mut |_, _| {}).unwrap();
        assert_eq!(output.file_name().unwrap().to_string_lossy(), "讲稿_修订.pptx");

        let package = std::fs::read(&output).unwrap();
        // slide1.xml held "abc def" and must carry the annotation
        let rewritten = package::read_part(&package, "ppt/slides/slide1.xml").unwrap();
        assert!(rewritten.contains("<a:t>[</a:t>"));
        assert!(rewritten.contains("<a:t>(ABC)</a:t>"));
        assert!(rewritten.contains("<a:srgbClr val=\"FF0000\"/>"));
        assert!(rewritten.contains("<a:bodyPr/>"));

        let mut units = Vec::new();
        parse_shapes(&rewritten, 0, 2, &mut units).unwrap();
        assert_eq!(units[0].unit.text, "[abc](ABC) def");
        // bold carried onto the matched span and the replacement
        let bracket_run = units[0].unit.runs.iter().find(|r| r.text == "(ABC)").unwrap();
        assert_eq!(bracket_run.style.bold, Some(true));
        assert_eq!(bracket_run.style.color, Some(RgbColor::RED));

        // slide2 had no suggestion and is copied through untouched
        let other = package::read_part(&package, "ppt/slides/slide2.xml").unwrap();
        assert_eq!(other, slide(&shape("<a:p><a:r><a:t>没有目标</a:t></a:r></a:p>")));
    }
}
