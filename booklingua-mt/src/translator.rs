//! Translation service trait and reply helpers
//!
//! This module defines the `MachineTranslator` trait for provider
//! abstraction, so the pipeline can run against any chat-completions
//! endpoint or the deterministic mock without knowing which.
//!
//! # Example
//!
//! ```ignore
//! use booklingua_mt::{ChatCompletionsProvider, Exchange, MachineTranslator, ProviderConfig, Preset};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ProviderConfig::resolve(Preset::Ollama, Default::default())?;
//!     let provider = ChatCompletionsProvider::new(config)?;
//!
//!     let context = vec![Exchange::new("The old man", "Bătrânul")];
//!     let result = provider
//!         .translate("The old man smiled.", "english", "romanian", &context)
//!         .await?;
//!     println!("{}", result);
//!     Ok(())
//! }
//! ```

use crate::context::Exchange;
use crate::error::MtResult;
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("think block regex"));

/// Generic trait for translation services
///
/// All methods are async to support I/O-bound providers. Implementations
/// must be shareable across tasks.
#[async_trait]
pub trait MachineTranslator: Send + Sync {
    /// Translate one piece of text
    ///
    /// # Arguments
    ///
    /// * `text` - The text to translate
    /// * `source_lang` - Source language name (e.g. "English")
    /// * `target_lang` - Target language name (e.g. "Romanian")
    /// * `context` - Prior exchanges of the same chapter, oldest first
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The translated text
    /// * `Err(MtError)` - Transient or permanent failure
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        context: &[Exchange],
    ) -> MtResult<String>;

    /// Proofread a translated text in its own language
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The revised text
    /// * `Err(MtError)` - Transient or permanent failure
    async fn proofread(&self, text: &str, lang: &str) -> MtResult<String>;

    /// Name of the provider, for logs and reports
    fn provider_name(&self) -> &str;

    /// Model identifier recorded on every cache entry
    fn model(&self) -> &str;
}

/// Lower-cased language name used in prompt tags
///
/// # Example
///
/// ```ignore
/// assert_eq!(language_tag("Romanian"), "romanian");
/// assert_eq!(language_tag("Brazilian Portuguese"), "brazilian_portuguese");
/// ```
pub fn language_tag(lang: &str) -> String {
    lang.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Wrap text in a language tag: `<english>text</english>`
pub fn wrap_tagged(text: &str, lang: &str) -> String {
    let tag = language_tag(lang);
    format!("<{}>{}</{}>", tag, text, tag)
}

/// Extract the reply text from a model response
///
/// Reasoning blocks (`<think>...</think>`) are removed, then the content of
/// the target language tag is taken. When the model ignored the tags, the
/// whole remaining reply is used.
pub fn clean_reply(reply: &str, lang: &str) -> String {
    let without_thinking = THINK_BLOCK.replace_all(reply, "");
    let tag = language_tag(lang);
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);

    if let Some(start) = without_thinking.find(&open) {
        let inner = &without_thinking[start + open.len()..];
        let end = inner.find(&close).unwrap_or(inner.len());
        return inner[..end].trim().to_string();
    }
    without_thinking.trim().to_string()
}
