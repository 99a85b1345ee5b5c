//! Mock translator for testing
//!
//! This module provides a deterministic, network-free translator for
//! testing the pipeline without API keys. Besides the translation modes it
//! can script failures and counts every call, which is what the resume and
//! retry tests assert on.
//!
//! # Example
//!
//! ```ignore
//! use booklingua_mt::{MachineTranslator, MockTranslator, MockMode, MtError};
//!
//! #[tokio::test]
//! async fn test_translation() {
//!     let mock = MockTranslator::new(MockMode::Suffix).fail_times(1, MtError::Timeout);
//!     assert!(mock.translate("hello", "english", "romanian", &[]).await.is_err());
//!     let result = mock.translate("hello", "english", "romanian", &[]).await.unwrap();
//!     assert_eq!(result, "hello_romanian");
//!     assert_eq!(mock.calls(), 2);
//! }
//! ```

use crate::context::Exchange;
use crate::error::{MtError, MtResult};
use crate::translator::MachineTranslator;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Mock translation modes for testing different scenarios
#[derive(Debug, Clone)]
pub enum MockMode {
    /// Append the target language: "hello" → "hello_romanian"
    Suffix,

    /// Use predefined mappings for realistic translations
    /// (text, target_lang) → translation, falling back to `Suffix`
    Mappings(HashMap<(String, String), String>),

    /// Reverse the order of words
    Reorder,

    /// Fail every call with this error
    Error(MtError),

    /// No-op: return input unchanged
    NoOp,
}

/// Mock translator that simulates various translation scenarios
#[derive(Debug)]
pub struct MockTranslator {
    mode: MockMode,
    /// Optional simulated network delay (in milliseconds)
    delay_ms: u64,
    /// Errors returned by the next calls, in order, before `mode` applies
    scripted_failures: Mutex<VecDeque<MtError>>,
    /// Calls whose text contains the needle always fail
    fail_on: Option<(String, MtError)>,
    calls: AtomicUsize,
    requests: Mutex<Vec<String>>,
    context_sizes: Mutex<Vec<usize>>,
}

impl MockTranslator {
    /// Create a new MockTranslator with the given mode
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mock = MockTranslator::new(MockMode::Suffix);
    /// ```
    pub fn new(mode: MockMode) -> Self {
        Self::with_delay(mode, 0)
    }

    /// Create a MockTranslator with simulated network delay
    ///
    /// # Arguments
    ///
    /// * `mode` - The translation mode
    /// * `delay_ms` - Simulated delay in milliseconds
    pub fn with_delay(mode: MockMode, delay_ms: u64) -> Self {
        Self {
            mode,
            delay_ms,
            scripted_failures: Mutex::new(VecDeque::new()),
            fail_on: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            context_sizes: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next `times` calls with `error`
    pub fn fail_times(self, times: usize, error: MtError) -> Self {
        if let Ok(mut queue) = self.scripted_failures.lock() {
            queue.extend(std::iter::repeat_n(error, times));
        }
        self
    }

    /// Fail every call whose text contains `needle`
    pub fn fail_on(mut self, needle: impl Into<String>, error: MtError) -> Self {
        self.fail_on = Some((needle.into(), error));
        self
    }

    /// Number of calls made so far, failed ones included
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Texts of every call so far, in call order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Context sizes passed to every translate call, in call order
    pub fn context_sizes(&self) -> Vec<usize> {
        self.context_sizes
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Count the call, apply the delay and any scripted failure
    async fn begin_call(&self, text: &str) -> MtResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(text.to_string());
        }

        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }

        let scripted = self
            .scripted_failures
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());
        if let Some(error) = scripted {
            return Err(error);
        }
        if let Some((needle, error)) = &self.fail_on {
            if text.contains(needle.as_str()) {
                return Err(error.clone());
            }
        }
        Ok(())
    }

    /// Apply translation logic based on the mode
    fn apply_translation(&self, text: &str, target: &str) -> MtResult<String> {
        match &self.mode {
            MockMode::Suffix => Ok(format!("{}_{}", text, target)),
            MockMode::Mappings(map) => {
                let key = (text.to_string(), target.to_string());
                Ok(map
                    .get(&key)
                    .cloned()
                    .unwrap_or_else(|| format!("{}_{}", text, target)))
            }
            MockMode::Reorder => Ok(text.split_whitespace().rev().collect::<Vec<_>>().join(" ")),
            MockMode::Error(error) => Err(error.clone()),
            MockMode::NoOp => Ok(text.to_string()),
        }
    }
}

#[async_trait]
impl MachineTranslator for MockTranslator {
    async fn translate(
        &self,
        text: &str,
        _source_lang: &str,
        target_lang: &str,
        context: &[Exchange],
    ) -> MtResult<String> {
        if let Ok(mut sizes) = self.context_sizes.lock() {
            sizes.push(context.len());
        }
        self.begin_call(text).await?;
        self.apply_translation(text, target_lang)
    }

    async fn proofread(&self, text: &str, _lang: &str) -> MtResult<String> {
        self.begin_call(text).await?;
        match &self.mode {
            MockMode::Error(error) => Err(error.clone()),
            MockMode::NoOp => Ok(text.to_string()),
            _ => Ok(format!("{}_proofread", text)),
        }
    }

    fn provider_name(&self) -> &str {
        "Mock Translator"
    }

    fn model(&self) -> &str {
        "mock"
    }
}
