use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::ops::Range;
use std::path::Path;

use anyhow::{Context, Result};
use log::debug;
use memmap2::Mmap;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

/// Threshold above which the package is memory-mapped instead of read
/// through the page cache.
const MMAP_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Read a whole OOXML package into memory. Large files go through mmap.
pub fn read_package(path: &Path) -> Result<Vec<u8>> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("无法读取文件: {}", path.display()))?;

    if metadata.len() > MMAP_THRESHOLD {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(mmap.to_vec())
    } else {
        Ok(std::fs::read(path)?)
    }
}

/// Read one XML part out of the package.
pub fn read_part(package: &[u8], name: &str) -> Result<String> {
    let mut archive = ZipArchive::new(Cursor::new(package))?;
    let mut xml = String::new();
    archive
        .by_name(name)
        .with_context(|| format!("包内缺少部件: {}", name))?
        .read_to_string(&mut xml)?;
    Ok(xml)
}

/// Write the package to `output`, substituting the given parts and copying
/// every other entry verbatim. The output is always fully rewritten, even
/// when no part changed.
pub fn rewrite_package(
    package: &[u8],
    output: &Path,
    replaced_parts: &HashMap<String, String>,
) -> Result<()> {
    let mut archive = ZipArchive::new(Cursor::new(package))?;
    let out_file = File::create(output)
        .with_context(|| format!("无法创建输出文件: {}", output.display()))?;
    let mut writer = ZipWriter::new(out_file);
    let options = FileOptions::default();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();

        writer.start_file(name.as_str(), options)?;
        if let Some(xml) = replaced_parts.get(&name) {
            debug!("重写部件 {} ({} 字节)", name, xml.len());
            writer.write_all(xml.as_bytes())?;
        } else {
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf)?;
            writer.write_all(&buf)?;
        }
    }

    writer.finish()?;
    Ok(())
}

/// Apply byte-range replacements to a part's XML. Ranges come from the
/// parsed document and never overlap; applying them back-to-front keeps the
/// remaining offsets valid.
pub fn splice(xml: &str, mut replacements: Vec<(Range<usize>, String)>) -> String {
    replacements.sort_by(|a, b| b.0.start.cmp(&a.0.start));
    let mut out = xml.to_string();
    for (range, replacement) in replacements {
        out.replace_range(range, &replacement);
    }
    out
}
