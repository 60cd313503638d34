//! Virtual console: routes the emulated page's `console.*` calls to the
//! host's logging, never to the process's stdout.

use std::fmt;
use std::sync::Arc;

pub const DEFAULT_CONSOLE_LABEL: &str = "JSDOM";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsoleLevel {
    Log,
    Error,
    Debug,
    Warn,
}

impl ConsoleLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ConsoleLevel::Log => "log",
            ConsoleLevel::Error => "error",
            ConsoleLevel::Debug => "debug",
            ConsoleLevel::Warn => "warn",
        }
    }

    /// Maps a page-side method name (`info` and `trace` fold into `log`).
    pub fn from_method(name: &str) -> Self {
        match name {
            "error" => ConsoleLevel::Error,
            "debug" => ConsoleLevel::Debug,
            "warn" => ConsoleLevel::Warn,
            _ => ConsoleLevel::Log,
        }
    }
}

impl fmt::Display for ConsoleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination for formatted console lines.
pub trait ConsoleSink: Send + Sync {
    fn write(&self, level: ConsoleLevel, line: &str);
}

impl<F> ConsoleSink for F
where
    F: Fn(ConsoleLevel, &str) + Send + Sync,
{
    fn write(&self, level: ConsoleLevel, line: &str) {
        self(level, line)
    }
}

/// Default sink: `tracing` events under the `ssr_prerender::client` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ConsoleSink for TracingSink {
    fn write(&self, level: ConsoleLevel, line: &str) {
        match level {
            ConsoleLevel::Error => tracing::warn!(target: "ssr_prerender::client", "{}", line),
            ConsoleLevel::Warn => tracing::warn!(target: "ssr_prerender::client", "{}", line),
            ConsoleLevel::Log | ConsoleLevel::Debug => {
                tracing::debug!(target: "ssr_prerender::client", "{}", line)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConsolePrefix {
    /// `[JSDOM]` for log, `[JSDOM <level>]` for the others.
    #[default]
    Default,
    /// `[label]` for log, `[label <level>]` for the others.
    Custom(String),
    /// No prefix for log, `[<level>]` for the others.
    Disabled,
}

/// The console handed to each emulation. Stateless; cheap to clone.
#[derive(Clone)]
pub struct VirtualConsole {
    sink: Arc<dyn ConsoleSink>,
    prefix: ConsolePrefix,
}

impl Default for VirtualConsole {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink), ConsolePrefix::Default)
    }
}

impl fmt::Debug for VirtualConsole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualConsole")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl VirtualConsole {
    pub fn new(sink: Arc<dyn ConsoleSink>, prefix: ConsolePrefix) -> Self {
        Self { sink, prefix }
    }

    fn tag(&self, level: ConsoleLevel) -> Option<String> {
        let label = match &self.prefix {
            ConsolePrefix::Default => DEFAULT_CONSOLE_LABEL,
            ConsolePrefix::Custom(label) => label.as_str(),
            ConsolePrefix::Disabled => {
                return match level {
                    ConsoleLevel::Log => None,
                    level => Some(format!("[{}]", level)),
                };
            }
        };
        Some(match level {
            ConsoleLevel::Log => format!("[{}]", label),
            level => format!("[{} {}]", label, level),
        })
    }

    pub fn emit(&self, level: ConsoleLevel, message: &str) {
        match self.tag(level) {
            Some(tag) => self.sink.write(level, &format!("{} {}", tag, message)),
            None => self.sink.write(level, message),
        }
    }

    pub fn log(&self, message: &str) {
        self.emit(ConsoleLevel::Log, message)
    }

    pub fn error(&self, message: &str) {
        self.emit(ConsoleLevel::Error, message)
    }

    pub fn debug(&self, message: &str) {
        self.emit(ConsoleLevel::Debug, message)
    }

    pub fn warn(&self, message: &str) {
        self.emit(ConsoleLevel::Warn, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn capture(prefix: ConsolePrefix) -> (VirtualConsole, Arc<Mutex<Vec<(ConsoleLevel, String)>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink_lines = lines.clone();
        let sink = move |level: ConsoleLevel, line: &str| {
            sink_lines.lock().unwrap().push((level, line.to_string()));
        };
        (VirtualConsole::new(Arc::new(sink), prefix), lines)
    }

    #[test]
    fn test_default_prefix() {
        let (console, lines) = capture(ConsolePrefix::Default);
        console.log("hello");
        console.error("boom");
        let lines = lines.lock().unwrap();
        assert_eq!(lines[0], (ConsoleLevel::Log, "[JSDOM] hello".to_string()));
        assert_eq!(lines[1], (ConsoleLevel::Error, "[JSDOM error] boom".to_string()));
    }

    #[test]
    fn test_custom_prefix() {
        let (console, lines) = capture(ConsolePrefix::Custom("app".into()));
        console.log("a");
        console.warn("b");
        console.debug("c");
        let lines = lines.lock().unwrap();
        assert_eq!(lines[0].1, "[app] a");
        assert_eq!(lines[1].1, "[app warn] b");
        assert_eq!(lines[2].1, "[app debug] c");
    }

    #[test]
    fn test_disabled_prefix() {
        let (console, lines) = capture(ConsolePrefix::Disabled);
        console.log("plain");
        console.error("bad");
        let lines = lines.lock().unwrap();
        assert_eq!(lines[0].1, "plain");
        assert_eq!(lines[1].1, "[error] bad");
    }

    #[test]
    fn test_from_method() {
        assert_eq!(ConsoleLevel::from_method("info"), ConsoleLevel::Log);
        assert_eq!(ConsoleLevel::from_method("warn"), ConsoleLevel::Warn);
    }
}
