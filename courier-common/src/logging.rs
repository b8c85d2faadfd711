use std::str::FromStr;

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

/// Emit an event on one of the `courier::<channel>` targets
///
/// Everything after the channel is handed to [`tracing::event!`] unchanged,
/// so structured fields work as usual:
///
/// ```
/// courier_common::log!(courier_common::tracing::Level::INFO, "outbound", server = "primary", "Relay ready");
/// ```
#[macro_export]
macro_rules! log {
    ($level:expr, $channel:literal, $($arg:tt)+) => {
        $crate::tracing::event!(target: concat!("courier::", $channel), $level, $($arg)+)
    };
}

/// Attempts handed to a rotating outbound server (`courier::outbound`)
#[macro_export]
macro_rules! outbound {
    (level = $level:ident, $($arg:tt)+) => {
        $crate::log!($crate::tracing::Level::$level, "outbound", $($arg)+)
    };

    ($($arg:tt)+) => {
        $crate::outbound!(level = TRACE, $($arg)+)
    };
}

/// Attempts handed to the local fallback transport (`courier::fallback`)
#[macro_export]
macro_rules! fallback {
    (level = $level:ident, $($arg:tt)+) => {
        $crate::log!($crate::tracing::Level::$level, "fallback", $($arg)+)
    };

    ($($arg:tt)+) => {
        $crate::fallback!(level = TRACE, $($arg)+)
    };
}

/// Coordinator bookkeeping (`courier::internal`)
#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($arg:tt)+) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($arg)+)
    };

    ($($arg:tt)+) => {
        $crate::internal!(level = TRACE, $($arg)+)
    };
}

/// Resolve the level filter from a `LOG_LEVEL`-style value, falling back to
/// `default` when the value is absent or unparsable.
fn level_from(value: Option<&str>, default: LevelFilter) -> LevelFilter {
    value.map_or(default, |level| {
        LevelFilter::from_str(level).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    })
}

/// Install the global subscriber.
///
/// The level is read from `LOG_LEVEL`; only events emitted from `courier*`
/// targets are shown.
pub fn init() {
    let default = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    let level = level_from(std::env::var("LOG_LEVEL").ok().as_deref(), default);

    tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_ansi(true)
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(FilterFn::new(|metadata| {
                    metadata.target().starts_with("courier")
                })),
        )
        .init();
}
