use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{debug, info};

use crate::core::annotate::annotate;
use crate::core::snapshot::snapshot;
use crate::provider::SuggestionSource;
use crate::{StyledFragment, TextUnit, UnitKind};

/// Capability set one document kind must provide: enumerate its text units,
/// rebuild one unit from styled fragments, and persist the result.
pub trait DocumentAdapter {
    fn path(&self) -> &Path;

    /// All enumerable units in fixed document order, blanks included. The
    /// list is built once per walk; its length is the progress denominator.
    fn units(&self) -> Result<Vec<TextUnit>>;

    /// Replace the unit's run sequence with the given fragments. Takes
    /// effect in the document produced by `save`.
    fn rebuild_unit(&mut self, unit_id: usize, fragments: &[StyledFragment]) -> Result<()>;

    fn save(&mut self, output: &Path) -> Result<()>;
}

/// Visit every text unit of the document, annotate the ones the provider
/// has suggestions for, report progress, and persist next to the input.
/// Returns the output path.
pub fn walk<F>(
    adapter: &mut dyn DocumentAdapter,
    provider: &dyn SuggestionSource,
    progress: &mut F,
) -> Result<PathBuf>
where
    F: FnMut(u8, &str),
{
    let units = adapter.units()?;
    let total = units.len();
    let mut processed = 0usize;
    debug!("共 {} 个文本单元", total);

    for unit in &units {
        if unit.text.trim().is_empty() {
            // 空白单元不调用建议服务，但仍计入进度
            processed += 1;
            progress(percent(processed, total), &status_line(&unit.kind, processed, total, true));
            continue;
        }

        let suggestions = provider.suggest(&unit.text)?;
        if !suggestions.is_empty() {
            debug!("单元 {} 收到 {} 条建议", unit.id, suggestions.len());
            let table = snapshot(&unit.runs);
            let fragments = annotate(&unit.text, &table, &suggestions);
            adapter.rebuild_unit(unit.id, &fragments)?;
        }

        processed += 1;
        progress(percent(processed, total), &status_line(&unit.kind, processed, total, false));
    }

    progress(100, "保存文件...");
    let output = output_path(adapter.path());
    adapter.save(&output)?;
    info!("修订文件已保存: {}", output.display());
    Ok(output)
}

fn percent(processed: usize, total: usize) -> u8 {
    (processed * 100 / total) as u8
}

fn status_line(kind: &UnitKind, processed: usize, total: usize, skipped: bool) -> String {
    match *kind {
        UnitKind::BodyParagraph | UnitKind::TableCellParagraph if skipped => {
            format!("正在处理 {}/{}", processed, total)
        }
        UnitKind::BodyParagraph => format!("处理段落 {}/{}", processed, total),
        UnitKind::TableCellParagraph => format!("处理表格单元格 {}/{}", processed, total),
        UnitKind::ShapeText { slide, .. } if skipped => {
            format!("跳过幻灯片 {} 中空文本 {}/{}", slide, processed, total)
        }
        UnitKind::ShapeText { slide, slide_total } => {
            format!("处理幻灯片 {}/{}, 形状 {}/{}", slide, slide_total, processed, total)
        }
    }
}

/// Output path rule: `D/S_修订.E` next to the input, silently overwritten
/// when it already exists.
pub fn output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{}_修订.{}", stem, ext.to_string_lossy()),
        None => format!("{}_修订", stem),
    };
    input.with_file_name(name)
}
