use std::io::Write;

use env_logger::fmt::Formatter;
use log::{Level, Record};

/// Replaces the filter derived from `-q`/`-v` when set, in `env_logger` syntax
pub const LOG_ENV: &str = "FNAGENT_LOG";

/// Filter for our own targets at the requested verbosity, everything else at warn (error if quiet)
pub(crate) fn filter_for(quiet: bool, verbose: u8) -> String {
    let (ours, deps) = match (quiet, verbose) {
        (true, _) => ("error", "error"),
        (false, 0) => ("info", "warn"),
        (false, 1) => ("debug", "warn"),
        (false, _) => ("trace", "warn"),
    };
    format!("{deps},fnagent={ours},fn_invoker={ours}")
}

fn format_record(buf: &mut Formatter, record: &Record<'_>) -> std::io::Result<()> {
    if record.level() == Level::Info {
        return writeln!(buf, "{}", record.args());
    }
    let tag = buf.default_level_style(record.level());
    writeln!(buf, "{tag}{:<5}{tag:#} {}", record.level(), record.args())
}

pub fn init_logger(quiet: bool, verbose: u8) {
    let filter = std::env::var(LOG_ENV).unwrap_or_else(|_| filter_for(quiet, verbose));

    let _ = env_logger::Builder::new()
        .parse_filters(&filter)
        .format(format_record)
        .try_init();
}
