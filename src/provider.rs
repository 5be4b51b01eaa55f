use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::config::{FallbackPolicy, ProviderConfig};
use crate::Suggestion;

/// 系统提示词，约定按行返回「原文|修改后的文本」
const SYSTEM_PROMPT: &str = "你是一位专业的校对助手。请检查以下文本中的错别字和语法错误。\
只需指出需要修改的部分并提供修改后的文本。无需解释原因。如果不需要修改，则返回空字符串。\
格式：原文|修改后的文本";

/// Source of correction suggestions for one unit's text. The walker only
/// depends on this trait, so tests substitute a fixed implementation.
pub trait SuggestionSource {
    /// Suggestions in provider order; an empty list means nothing to
    /// annotate.
    fn suggest(&self, text: &str) -> Result<Vec<Suggestion>>;
}

/// Chat-completions client against an OpenAI-compatible endpoint. Owned by
/// the caller and passed down explicitly; there is no shared global client.
pub struct OpenAiProvider {
    config: ProviderConfig,
    http: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

impl OpenAiProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("初始化 HTTP 客户端失败")?;
        Ok(OpenAiProvider { config, http })
    }

    fn request_suggestions(&self, text: &str) -> Result<Vec<Suggestion>> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage { role: "system", content: SYSTEM_PROMPT },
                ChatMessage { role: "user", content: text },
            ],
            temperature: 0.3,
            max_tokens: 2000,
        };
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let response: ChatResponse = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()?
            .error_for_status()?
            .json()?;

        let content = response
            .choices
            .into_iter()
            .next()
            .context("校对服务响应缺少 choices")?
            .message
            .content;
        Ok(parse_suggestion_lines(content.trim()))
    }
}

impl SuggestionSource for OpenAiProvider {
    fn suggest(&self, text: &str) -> Result<Vec<Suggestion>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        match self.request_suggestions(text) {
            Ok(suggestions) => Ok(suggestions),
            Err(err) => match self.config.fallback {
                FallbackPolicy::FailFast => Err(err),
                FallbackPolicy::Degrade => {
                    warn!("校对服务调用出错: {}", err);
                    warn!("使用模拟数据作为备选...");
                    Ok(fallback_suggestions(text))
                }
            },
        }
    }
}

/// Parse the line format `原文|修改后`. Only lines containing `|` count; a
/// single surrounding bracket is stripped from each side independently.
pub fn parse_suggestion_lines(content: &str) -> Vec<Suggestion> {
    let mut suggestions = Vec::new();
    for line in content.lines() {
        if !line.contains('|') {
            continue;
        }
        let mut parts = line.split('|');
        let original = strip_brackets(parts.next().unwrap_or("").trim());
        let replacement = match parts.next() {
            Some(part) => strip_brackets(part.trim()),
            None => continue,
        };
        suggestions.push(Suggestion { original, replacement });
    }
    suggestions
}

fn strip_brackets(part: &str) -> String {
    let part = part.strip_prefix('[').unwrap_or(part);
    let part = part.strip_suffix(']').unwrap_or(part);
    part.to_string()
}

/// Degraded output when the provider call fails: texts longer than 10
/// characters get one placeholder suggestion built from a fixed sample.
pub fn fallback_suggestions(text: &str) -> Vec<Suggestion> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= 10 {
        return Vec::new();
    }
    let sample: String = if chars.len() > 15 {
        chars[5..15].iter().collect()
    } else {
        chars[..5].iter().collect()
    };
    vec![Suggestion {
        original: sample.clone(),
        replacement: format!("{}(建议修改示例)", sample),
    }]
}
