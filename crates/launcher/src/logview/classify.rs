use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Normal shows only filtered game output; Verbose shows every
/// recognized format unfiltered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    Normal,
    Verbose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogColor {
    Red,
    Yellow,
    Green,
    Gray,
    DarkGray,
    Cyan,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledLine {
    pub text: String,
    pub color: LogColor,
}

impl StyledLine {
    fn new(text: impl Into<String>, color: LogColor) -> Self {
        Self {
            text: text.into(),
            color,
        }
    }
}

pub const GAME_TAG_PREFIX: &str = "[Python]";

const NO_LOG_FILE_PREFIX: &str = "NO LOG FILE!";
const ENGINE_MODULE: &str = "Engine";
const DEVELOPER_MODULE: &str = "Developer";
const NOISE_MESSAGES: [&str; 2] = ["get_cls", "get_cls success!!!"];

/// Engine-internal log frame: `[ts LEVEL module pid tid] message`,
/// timestamp with `:` before the milliseconds.
static SYSTEM_FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\[(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}:\d{3}) (VERBOSE|INFO|WARN|ERROR) (\S+) (\d+) (\d+)\] (.*)$",
    )
    .expect("system frame pattern")
});

/// Script-layer frame: tag prefix plus `[ts] rest`, timestamp with `,`
/// before the milliseconds; `rest` carries bracketed tokens.
static GAME_FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[Python\] \[(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2},\d{3})\] (.*)$")
        .expect("game frame pattern")
});

static BRACKET_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(.*?)\]").expect("bracket token pattern"));

/// Classifies one reconstituted line. `None` means the line is
/// suppressed under the given verbosity.
pub fn classify(verbosity: Verbosity, line: &str) -> Option<StyledLine> {
    match verbosity {
        Verbosity::Normal => classify_normal(line),
        Verbosity::Verbose => classify_verbose(line),
    }
}

fn classify_normal(line: &str) -> Option<StyledLine> {
    let Some(caps) = GAME_FRAME.captures(line) else {
        // Script output without the timestamp frame still belongs to
        // the game layer; show it with the tag stripped. Anything else
        // is engine noise in this mode.
        if let Some(stripped) = line.strip_prefix(GAME_TAG_PREFIX) {
            let text = stripped.trim();
            if text.is_empty() {
                return None;
            }
            return Some(StyledLine::new(text, keyword_color(text)));
        }
        return None;
    };

    let rest = caps.get(2).map_or("", |m| m.as_str());
    let tokens = bracket_tokens(rest);
    let module = tokens.get(1).copied().unwrap_or("");
    if module == ENGINE_MODULE {
        return None;
    }
    let message = strip_bracket_tokens(rest);
    if NOISE_MESSAGES.contains(&message.as_str()) {
        return None;
    }

    let level = tokens.first().copied().unwrap_or("");
    let color = if module == DEVELOPER_MODULE {
        LogColor::DarkGray
    } else {
        keyword_color(level)
    };
    let text = line[GAME_TAG_PREFIX.len()..].trim();
    Some(StyledLine::new(text, color))
}

fn classify_verbose(line: &str) -> Option<StyledLine> {
    if let Some(caps) = SYSTEM_FRAME.captures(line) {
        let level = caps.get(2).map_or("", |m| m.as_str());
        return Some(StyledLine::new(line, keyword_color(level)));
    }
    if let Some(caps) = GAME_FRAME.captures(line) {
        let rest = caps.get(2).map_or("", |m| m.as_str());
        let level = bracket_tokens(rest).first().copied().unwrap_or("");
        return Some(StyledLine::new(line, keyword_color(level)));
    }
    // The engine floods this notice before its log file exists.
    let color = if line.starts_with(NO_LOG_FILE_PREFIX) {
        LogColor::DarkGray
    } else {
        keyword_color(line)
    };
    Some(StyledLine::new(line, color))
}

/// First matching level keyword wins: ERROR > WARN > SUC > INFO >
/// VERBOSE, case-sensitive, anywhere in the text.
pub fn keyword_color(text: &str) -> LogColor {
    if text.contains("ERROR") {
        LogColor::Red
    } else if text.contains("WARN") {
        LogColor::Yellow
    } else if text.contains("SUC") {
        LogColor::Green
    } else if text.contains("INFO") {
        LogColor::Gray
    } else if text.contains("VERBOSE") {
        LogColor::DarkGray
    } else {
        LogColor::Default
    }
}

fn bracket_tokens(rest: &str) -> Vec<&str> {
    BRACKET_TOKEN
        .captures_iter(rest)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}

fn strip_bracket_tokens(rest: &str) -> String {
    BRACKET_TOKEN.replace_all(rest, "").trim().to_string()
}
