//! Pass and operation tracing infrastructure.
//!
//! Provides a trait-based tracing system for the pass pipeline. When using
//! [`NoopTracer`], all trace methods are empty and cost nothing beyond a
//! virtual call per hook site; the hooks only fire for operations named in
//! the `--trace-compops`/`--trace-langops` option lists, so the common case
//! never reaches the tracer at all.
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | No-op (production default) |
//! | [`StderrTracer`] | Human-readable trace log to stderr |
//! | [`RecordingTracer`] | Full event recording for tests and post-mortem |

/// Trace event emitted during compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// A pipeline pass started.
    PassStart { pass: &'static str },
    /// A pipeline pass finished; counts are the totals after the pass.
    PassEnd { pass: &'static str, errors: u32 },
    /// A traced compiler operation was invoked on a node.
    CompOp { op: &'static str, tag: String },
    /// A traced language operation was invoked on a node.
    LangOp { op: &'static str, tag: String },
}

/// Trait for compilation tracing.
///
/// All methods have default no-op implementations, so [`NoopTracer`] requires
/// zero lines of code. Implementations only override the hooks they care
/// about.
pub trait CompilerTracer: std::fmt::Debug {
    /// Called when a pipeline pass starts.
    fn on_pass_start(&mut self, _pass: &'static str) {}

    /// Called when a pipeline pass ends.
    fn on_pass_end(&mut self, _pass: &'static str, _errors: u32) {}

    /// Called once per invocation of a compop whose trace flag is set.
    fn on_compop(&mut self, _op: &'static str, _tag: &str) {}

    /// Called once per invocation of a langop whose trace flag is set.
    fn on_langop(&mut self, _op: &'static str, _tag: &str) {}
}

/// No-op tracer: the production default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

impl CompilerTracer for NoopTracer {}

/// Writes one human-readable line per event to stderr.
#[derive(Debug, Default)]
pub struct StderrTracer;

impl CompilerTracer for StderrTracer {
    fn on_pass_start(&mut self, pass: &'static str) {
        eprintln!("== pass {pass}");
    }

    fn on_pass_end(&mut self, pass: &'static str, errors: u32) {
        eprintln!("== pass {pass} done ({errors} error(s))");
    }

    fn on_compop(&mut self, op: &'static str, tag: &str) {
        eprintln!("compop {op} on [{tag}]");
    }

    fn on_langop(&mut self, op: &'static str, tag: &str) {
        eprintln!("langop {op} on [{tag}]");
    }
}

/// Records every event for later inspection; used by tests.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: Vec<TraceEvent>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    #[must_use]
    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }
}

impl CompilerTracer for RecordingTracer {
    fn on_pass_start(&mut self, pass: &'static str) {
        self.events.push(TraceEvent::PassStart { pass });
    }

    fn on_pass_end(&mut self, pass: &'static str, errors: u32) {
        self.events.push(TraceEvent::PassEnd { pass, errors });
    }

    fn on_compop(&mut self, op: &'static str, tag: &str) {
        self.events.push(TraceEvent::CompOp {
            op,
            tag: tag.to_owned(),
        });
    }

    fn on_langop(&mut self, op: &'static str, tag: &str) {
        self.events.push(TraceEvent::LangOp {
            op,
            tag: tag.to_owned(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_tracer_collects_events() {
        let mut tracer = RecordingTracer::new();
        tracer.on_pass_start("scope");
        tracer.on_compop("scopein", "SEQ");
        tracer.on_pass_end("scope", 0);

        assert_eq!(
            tracer.events(),
            &[
                TraceEvent::PassStart { pass: "scope" },
                TraceEvent::CompOp {
                    op: "scopein",
                    tag: "SEQ".into()
                },
                TraceEvent::PassEnd { pass: "scope", errors: 0 },
            ]
        );
    }
}
