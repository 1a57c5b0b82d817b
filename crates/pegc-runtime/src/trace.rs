use crate::Location;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TraceKind {
    Enter,
    Match,
    Fail,
}

impl TraceKind {
    pub fn name(self) -> &'static str {
        match self {
            TraceKind::Enter => "rule.enter",
            TraceKind::Match => "rule.match",
            TraceKind::Fail => "rule.fail",
        }
    }
}

#[derive(Clone, Debug)]
pub struct TraceEvent<'a> {
    pub kind: TraceKind,
    pub rule: &'a str,
    pub location: Location,
    /// The result came from the packrat cache.
    pub cached: bool,
}

/// Receives rule enter/exit notifications from parsers compiled with tracing.
pub trait Tracer {
    fn trace(&mut self, event: &TraceEvent<'_>);
}

/// Writes every event through `log::trace!`, indented by rule nesting.
#[derive(Default)]
pub struct LogTracer {
    depth: usize,
}

impl Tracer for LogTracer {
    fn trace(&mut self, event: &TraceEvent<'_>) {
        if event.kind != TraceKind::Enter {
            self.depth = self.depth.saturating_sub(1);
        }

        let start = event.location.start;
        let end = event.location.end;
        log::trace!(
            "{}:{}-{}:{} {:<10} {:indent$}{}",
            start.line,
            start.column,
            end.line,
            end.column,
            event.kind.name(),
            "",
            event.rule,
            indent = self.depth * 2
        );

        if event.kind == TraceKind::Enter {
            self.depth += 1;
        }
    }
}

impl<T: Tracer + ?Sized> Tracer for Box<T> {
    fn trace(&mut self, event: &TraceEvent<'_>) {
        (**self).trace(event)
    }
}
