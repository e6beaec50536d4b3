use std::{io::IsTerminal, str::FromStr};

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, fmt::time::ChronoUtc, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Events from targets outside the workspace crates are dropped.
const TARGET_PREFIX: &str = "mailhog";

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:expr),*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg),*)
    }};
}

/// Bytes or replies leaving the server.
#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "outgoing", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::outgoing!(level = TRACE, $($msg),*)
    };
}

/// Bytes or commands arriving from a client.
#[macro_export]
macro_rules! incoming {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "incoming", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::incoming!(level = TRACE, $($msg),*)
    };
}

/// State transitions and other bookkeeping.
#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::internal!(level = TRACE, $($msg),*)
    };
}

/// Makes CR and LF visible when logging wire data.
#[must_use]
pub fn escape(text: &str) -> String {
    text.replace('\r', "\\r").replace('\n', "\\n")
}

const fn default_level() -> LevelFilter {
    if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    }
}

fn level_from(value: Option<&str>, default: LevelFilter) -> LevelFilter {
    let Some(value) = value else {
        return default;
    };

    LevelFilter::from_str(value).unwrap_or_else(|_| {
        eprintln!("Ignoring unknown LOG_LEVEL '{value}', using {default}");
        default
    })
}

/// Installs the process-wide subscriber: compact lines on stderr with
/// RFC 3339 UTC timestamps, at the level named by `LOG_LEVEL`.
pub fn init() {
    let level = level_from(std::env::var("LOG_LEVEL").ok().as_deref(), default_level());
    let workspace_only = FilterFn::new(|metadata| metadata.target().starts_with(TARGET_PREFIX));

    let output = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_file(false)
        .with_line_number(false)
        .with_timer(ChronoUtc::rfc_3339())
        .with_filter(level)
        .with_filter(workspace_only);

    if tracing_subscriber::registry().with(output).try_init().is_err() {
        eprintln!("A tracing subscriber is already installed, keeping it");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_makes_line_endings_visible() {
        assert_eq!(escape("250 Ok\r\n"), "250 Ok\\r\\n");
    }

    #[test]
    fn level_parsing_falls_back_to_default() {
        assert_eq!(level_from(None, LevelFilter::INFO), LevelFilter::INFO);
        assert_eq!(level_from(Some("debug"), LevelFilter::INFO), LevelFilter::DEBUG);
        assert_eq!(level_from(Some("loud"), LevelFilter::WARN), LevelFilter::WARN);
    }

    #[test]
    fn init_twice_keeps_the_first_subscriber() {
        init();
        init();
        internal!(level = INFO, "still logging");
    }
}
