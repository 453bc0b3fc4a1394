//! Intervention observer.
//!
//! A transparent pass-through over the inbound signal stream. Each
//! signal bumps the activity clock and has its text inspected for
//! hotwords (and, optionally, strongly negative sentiment). A separate
//! timeout check catches callers who have gone quiet.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_stream::stream;
use futures_util::StreamExt;
use parking_lot::Mutex;

use vx_domain::config::ObserverConfig;
use vx_domain::stream::BoxStream;
use vx_domain::{Intervention, InterventionKind, Signal};

const NEGATIVE_WORDS: [&str; 10] = [
    "angry",
    "frustrated",
    "terrible",
    "awful",
    "hate",
    "worst",
    "horrible",
    "disgusting",
    "furious",
    "upset",
];

const POSITIVE_WORDS: [&str; 10] = [
    "great",
    "wonderful",
    "excellent",
    "amazing",
    "love",
    "best",
    "fantastic",
    "happy",
    "pleased",
    "thank",
];

/// An item of the observed stream: the signal itself, or an
/// intervention that preempts it.
#[derive(Debug)]
pub enum Observed {
    Signal(Signal),
    Intervention(Intervention),
}

pub struct InterventionObserver {
    hotwords: Vec<String>,
    timeout: Duration,
    enable_sentiment: bool,
    last_activity: Mutex<Instant>,
    cancelled: AtomicBool,
}

impl InterventionObserver {
    pub fn new(config: &ObserverConfig) -> Self {
        Self {
            hotwords: config.hotwords.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            enable_sentiment: config.enable_sentiment,
            last_activity: Mutex::new(Instant::now()),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Wrap a signal stream; signals pass through, interventions are
    /// interleaved where they trigger.
    pub fn watch<'a>(&'a self, mut input: BoxStream<'a, Signal>) -> BoxStream<'a, Observed> {
        Box::pin(stream! {
            while let Some(signal) = input.next().await {
                if self.cancelled.load(Ordering::Acquire) {
                    break;
                }
                *self.last_activity.lock() = Instant::now();
                match self.inspect(&signal) {
                    Some(intervention) => yield Observed::Intervention(intervention),
                    None => yield Observed::Signal(signal),
                }
            }
        })
    }

    /// Inspect one signal for hotword/sentiment triggers.
    pub fn inspect(&self, signal: &Signal) -> Option<Intervention> {
        let text = signal.text_content()?;

        if let Some(hotword) = self.match_hotword(text) {
            tracing::info!(hotword = %hotword, session_id = %signal.session_id, "hotword detected");
            let mut intervention = Intervention::new(
                InterventionKind::Hotword,
                format!("Hotword detected: {hotword}"),
            )
            .with_detail("hotword", serde_json::json!(hotword))
            .with_detail("original_text", serde_json::json!(text));
            if let Some(target) = target_for_hotword(&hotword) {
                intervention = intervention.with_target(target);
            }
            return Some(intervention);
        }

        if self.enable_sentiment {
            let score = sentiment_score(text);
            if score < -0.7 {
                tracing::info!(score, session_id = %signal.session_id, "negative sentiment detected");
                return Some(
                    Intervention::new(InterventionKind::Sentiment, "Negative sentiment detected")
                        .with_target("human_intervention")
                        .with_detail("sentiment_score", serde_json::json!(score)),
                );
            }
        }

        None
    }

    fn match_hotword(&self, text: &str) -> Option<String> {
        let lower = text.to_lowercase();
        self.hotwords
            .iter()
            .find(|w| lower.contains(&w.to_lowercase()))
            .cloned()
    }

    /// Polled by the background timeout checker.
    pub fn check_timeout(&self) -> Option<Intervention> {
        let elapsed = self.last_activity.lock().elapsed();
        if elapsed <= self.timeout {
            return None;
        }
        tracing::info!(elapsed_secs = elapsed.as_secs_f64(), "inactivity timeout");
        Some(
            Intervention::new(
                InterventionKind::Timeout,
                format!("Inactivity timeout after {:.1} seconds", elapsed.as_secs_f64()),
            )
            .with_target("router")
            .with_detail("elapsed_seconds", serde_json::json!(elapsed.as_secs_f64())),
        )
    }

    /// Stop watching; the wrapped stream ends at the next signal.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Restore the activity clock and clear the cancellation flag.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
        *self.last_activity.lock() = Instant::now();
    }
}

/// Routing target implied by a hotword, if any.
fn target_for_hotword(hotword: &str) -> Option<&'static str> {
    match hotword.to_lowercase().as_str() {
        "operator" | "help" | "emergency" => Some("human_intervention"),
        "stop" | "cancel" | "nevermind" | "never mind" => Some("router"),
        _ => None,
    }
}

/// Keyword sentiment score in `[-1, 1]`.
fn sentiment_score(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let neg = NEGATIVE_WORDS.iter().filter(|w| lower.contains(*w)).count() as f64;
    let pos = POSITIVE_WORDS.iter().filter(|w| lower.contains(*w)).count() as f64;
    if neg + pos == 0.0 {
        return 0.0;
    }
    (pos - neg) / (pos + neg)
}
