use std::sync::Arc;

use time::macros::format_description;
use time::UtcOffset;
use tracing_subscriber::filter::dynamic_filter_fn;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub fn init_logging() {
    let env_filter = Arc::new(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chanclol=info")),
    );

    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let enable_colors = console::user_attended();

    let full_fmt_layer = {
        let env_filter = env_filter.clone();
        tracing_subscriber::fmt::layer()
            .with_ansi(enable_colors)
            .with_timer(OffsetTime::new(
                offset,
                format_description!("[day].[month].[year] [hour]:[minute]:[second]"),
            ))
            .with_filter(dynamic_filter_fn(move |m, c| {
                env_filter.enabled(m, c.clone())
            }))
    };
    let compact_fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_ansi(enable_colors)
        .with_target(false)
        .with_timer(OffsetTime::new(
            offset,
            format_description!("[hour]:[minute]:[second]"),
        ))
        .with_filter(dynamic_filter_fn(move |m, c| {
            env_filter.enabled(m, c.clone())
        }));

    let attended = console::user_attended();
    tracing_subscriber::registry()
        .with((!attended).then_some(full_fmt_layer))
        .with(attended.then_some(compact_fmt_layer))
        .init();
}
