//! VUI metrics instrumentation.
//!
//! Millisecond timings for the latency paths a caller actually hears:
//! TTFA (end of user speech to first audio frame back), routing latency,
//! silence stretches, tool execution, and filler playback. Crossing a
//! warning threshold raises the log level; it never alters control flow.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;

/// Metric kinds, as logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Ttfa,
    RoutingLatency,
    SilenceDuration,
    ToolExecution,
    FillerPlayed,
}

impl MetricType {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricType::Ttfa => "ttfa",
            MetricType::RoutingLatency => "routing_latency",
            MetricType::SilenceDuration => "silence_duration",
            MetricType::ToolExecution => "tool_execution",
            MetricType::FillerPlayed => "filler_played",
        }
    }
}

pub const TTFA_WARNING_MS: f64 = 500.0;
pub const SILENCE_WARNING_MS: f64 = 1_000.0;
pub const ROUTING_WARNING_MS: f64 = 200.0;

#[derive(Default)]
struct MetricsState {
    timers: HashMap<&'static str, Instant>,
    last_audio_sent: Option<Instant>,
    /// Set once per silence episode so the warning fires at most once.
    silence_logged: bool,
}

/// Per-session VUI metrics collector.
pub struct VuiMetrics {
    session_id: String,
    state: Mutex<MetricsState>,
}

impl VuiMetrics {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            state: Mutex::new(MetricsState::default()),
        }
    }

    fn start_timer(&self, name: &'static str) {
        self.state.lock().timers.insert(name, Instant::now());
    }

    fn stop_timer(&self, name: &'static str) -> f64 {
        match self.state.lock().timers.remove(name) {
            Some(start) => start.elapsed().as_secs_f64() * 1_000.0,
            None => 0.0,
        }
    }

    /// End of user utterance: starts the TTFA clock.
    pub fn record_user_speech_end(&self) {
        self.start_timer("ttfa");
        tracing::debug!(session_id = %self.session_id, "user speech end recorded");
    }

    /// First audio frame back to the caller.
    pub fn record_first_audio_sent(&self) {
        let ttfa = self.stop_timer("ttfa");
        self.state.lock().last_audio_sent = Some(Instant::now());
        if ttfa > 0.0 {
            self.log(MetricType::Ttfa, ttfa, Some(TTFA_WARNING_MS), None);
        }
    }

    /// Routing decision entered.
    pub fn record_routing_start(&self) {
        self.start_timer("routing");
    }

    /// Target agent became active.
    pub fn record_routing_complete(&self, target_agent: &str) {
        let latency = self.stop_timer("routing");
        self.log(
            MetricType::RoutingLatency,
            latency,
            Some(ROUTING_WARNING_MS),
            Some(("target_agent", target_agent)),
        );
    }

    pub fn record_tool_execution(&self, tool_name: &str, duration_ms: f64) {
        self.log(
            MetricType::ToolExecution,
            duration_ms,
            None,
            Some(("tool_name", tool_name)),
        );
    }

    pub fn record_filler_played(&self, filler_type: &str, duration_ms: f64) {
        self.log(
            MetricType::FillerPlayed,
            duration_ms,
            None,
            Some(("filler_type", filler_type)),
        );
    }

    /// Sampled ~1 Hz by the silence monitor. Logs one warning per
    /// silence episode once the threshold is crossed.
    pub fn check_silence(&self) {
        let (duration_ms, should_log) = {
            let mut state = self.state.lock();
            let Some(last) = state.last_audio_sent else {
                return;
            };
            let duration_ms = last.elapsed().as_secs_f64() * 1_000.0;
            if duration_ms > SILENCE_WARNING_MS && !state.silence_logged {
                state.silence_logged = true;
                (duration_ms, true)
            } else {
                (duration_ms, false)
            }
        };
        if should_log {
            self.log(
                MetricType::SilenceDuration,
                duration_ms,
                Some(SILENCE_WARNING_MS),
                None,
            );
        }
    }

    /// Audio went out: the current silence episode (if any) is over.
    pub fn reset_silence_tracker(&self) {
        let mut state = self.state.lock();
        state.last_audio_sent = Some(Instant::now());
        state.silence_logged = false;
    }

    fn log(
        &self,
        metric: MetricType,
        value_ms: f64,
        warning_threshold: Option<f64>,
        extra: Option<(&str, &str)>,
    ) {
        let value_ms = (value_ms * 100.0).round() / 100.0;
        let extra_value = extra.map(|(_, v)| v).unwrap_or("");
        if warning_threshold.is_some_and(|t| value_ms > t) {
            tracing::warn!(
                metric = metric.as_str(),
                value_ms,
                session_id = %self.session_id,
                extra = extra_value,
                "vui metric exceeded threshold"
            );
        } else {
            tracing::info!(
                metric = metric.as_str(),
                value_ms,
                session_id = %self.session_id,
                extra = extra_value,
                "vui metric"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttfa_requires_speech_end_first() {
        let metrics = VuiMetrics::new("s1");
        // No user_speech_end yet: timer missing, elapsed reads zero.
        assert_eq!(metrics.stop_timer("ttfa"), 0.0);

        metrics.record_user_speech_end();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let elapsed = metrics.stop_timer("ttfa");
        assert!(elapsed >= 5.0);
    }

    #[test]
    fn first_audio_clears_ttfa_timer() {
        let metrics = VuiMetrics::new("s1");
        metrics.record_user_speech_end();
        metrics.record_first_audio_sent();
        // Timer consumed: a second stop reads zero.
        assert_eq!(metrics.stop_timer("ttfa"), 0.0);
        assert!(metrics.state.lock().last_audio_sent.is_some());
    }

    #[test]
    fn silence_warning_fires_once_per_episode() {
        let metrics = VuiMetrics::new("s1");
        metrics.state.lock().last_audio_sent =
            Some(Instant::now() - std::time::Duration::from_secs(3));

        metrics.check_silence();
        assert!(metrics.state.lock().silence_logged);
        // Second check in the same episode stays latched.
        metrics.check_silence();
        assert!(metrics.state.lock().silence_logged);

        metrics.reset_silence_tracker();
        assert!(!metrics.state.lock().silence_logged);
    }

    #[test]
    fn check_silence_without_audio_is_a_noop() {
        let metrics = VuiMetrics::new("s1");
        metrics.check_silence();
        assert!(!metrics.state.lock().silence_logged);
    }

    #[test]
    fn routing_timer_round_trip() {
        let metrics = VuiMetrics::new("s1");
        metrics.record_routing_start();
        std::thread::sleep(std::time::Duration::from_millis(2));
        metrics.record_routing_complete("task_manager");
        assert_eq!(metrics.stop_timer("routing"), 0.0);
    }
}
