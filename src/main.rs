// src/main.rs
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use revisor_rs::config::{FallbackPolicy, ProviderConfig};
use revisor_rs::utils::processor;
use revisor_rs::ProgressEvent;

#[derive(Parser, Debug)]
#[command(name = "revisor")]
#[command(version, about = "Office 文档错别字检查工具", long_about = None)]
struct Cli {
    /// 待处理的 Office 文件（.docx 或 .pptx）
    file: PathBuf,

    /// 校对服务 API 密钥，默认读取 OPENAI_API_KEY
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// 校对服务地址，默认读取 OPENAI_API_BASE
    #[arg(long, env = "OPENAI_API_BASE")]
    base_url: Option<String>,

    /// 模型名称，默认读取 OPENAI_MODEL
    #[arg(long, env = "OPENAI_MODEL")]
    model: Option<String>,

    /// 校对服务失败时直接报错，而不是降级为示例建议
    #[arg(long)]
    fail_fast: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();
    let cli = Cli::parse();

    let mut config = ProviderConfig::from_overrides(cli.api_key, cli.base_url, cli.model)?;
    if cli.fail_fast {
        config.fallback = FallbackPolicy::FailFast;
    }

    let rx = processor::spawn(cli.file, config)?;

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap()
            .progress_chars("=> "),
    );

    for event in rx {
        match event {
            ProgressEvent::Progress { percent, message } => {
                bar.set_position(percent as u64);
                bar.set_message(message);
            }
            ProgressEvent::Done { output } => {
                bar.finish_with_message("处理完成");
                println!("✅ 修订文件已生成: {}", output.display());
                return Ok(());
            }
            ProgressEvent::Error { message } => {
                bar.abandon();
                bail!("{}", message);
            }
        }
    }

    bail!("处理线程意外结束");
}
