use anstyle::{AnsiColor, Style};
use clap::builder::Styles;

use crate::utils::{CHECK, MARK};

const ACCENT: Style = AnsiColor::Yellow.on_default().bold();
const LITERAL: Style = AnsiColor::Cyan.on_default();
const GOOD: Style = AnsiColor::Green.on_default();
const BAD: Style = AnsiColor::BrightRed.on_default();
const LINK: Style = AnsiColor::Blue.on_default().underline();

pub fn get_styles() -> Styles {
    Styles::styled()
        .header(ACCENT)
        .usage(ACCENT)
        .literal(LITERAL.bold())
        .placeholder(LITERAL.italic())
        .valid(GOOD.bold())
        .invalid(BAD.bold())
        .error(BAD.bold())
}

fn paint(msg: &str, style: Style) -> String {
    format!("{style}{msg}{style:#}")
}

pub(crate) fn fmt_green(msg: &str) -> String {
    paint(msg, GOOD)
}

pub(crate) fn fmt_cyan(msg: &str) -> String {
    paint(msg, LINK)
}

pub(crate) fn fmt_red(msg: &str) -> String {
    paint(msg, BAD)
}

pub(crate) fn fmt_bold(msg: &str) -> String {
    paint(msg, Style::new().bold())
}

pub(crate) fn fmt_dimmed(msg: &str) -> String {
    paint(msg, Style::new().dimmed())
}

pub(crate) fn fmt_success(msg: &str) -> String {
    format!("{} {msg}", fmt_green(CHECK))
}

pub(crate) fn fmt_error(msg: &str) -> String {
    format!("{} {msg}", fmt_red(MARK))
}
