use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::thread;

use anyhow::{bail, Result};
use log::{error, info};

use crate::config::ProviderConfig;
use crate::core::docx::DocxAdapter;
use crate::core::pptx::PptxAdapter;
use crate::core::walker::walk;
use crate::provider::{OpenAiProvider, SuggestionSource};
use crate::ProgressEvent;

/// Annotate one document and write the result next to the input. Blocks
/// until done; progress goes through the callback. The extension decides
/// the adapter; anything but `.docx`/`.pptx` fails before any I/O.
pub fn process_document<F>(
    path: &Path,
    provider: &dyn SuggestionSource,
    progress: &mut F,
) -> Result<PathBuf>
where
    F: FnMut(u8, &str),
{
    info!("处理文件: {}", path.display());
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "docx" => {
            let mut adapter = DocxAdapter::open(path)?;
            walk(&mut adapter, provider, progress)
        }
        "pptx" => {
            let mut adapter = PptxAdapter::open(path)?;
            walk(&mut adapter, provider, progress)
        }
        _ => {
            let dotted = if extension.is_empty() {
                String::new()
            } else {
                format!(".{}", extension)
            };
            bail!("不支持的文件格式: {}", dotted)
        }
    }
}

/// Run the whole traversal on one dedicated worker thread and report back
/// over a one-way channel. There is no cancellation: dropping the receiver
/// leaves the worker running to completion, it just stops being observed.
pub fn spawn(path: PathBuf, config: ProviderConfig) -> Result<Receiver<ProgressEvent>> {
    let provider = OpenAiProvider::new(config)?;
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let progress_tx = tx.clone();
        let mut progress = move |percent: u8, message: &str| {
            let _ = progress_tx.send(ProgressEvent::Progress {
                percent,
                message: message.to_string(),
            });
        };

        let event = match process_document(&path, &provider, &mut progress) {
            Ok(output) => ProgressEvent::Done { output },
            Err(err) => {
                error!("处理失败: {:#}", err);
                ProgressEvent::Error { message: format!("{:#}", err) }
            }
        };
        let _ = tx.send(event);
    });

    Ok(rx)
}
