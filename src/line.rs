/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! The line-oriented IL: tokenizing raw text into [`Line`]/[`Part`] and
//! printing them back. Every regex used here is a lazily-initialized
//! process-wide singleton; none of them get recompiled per line.

use crate::errors::PipelineError;
use crate::reference::Mode;
use regex::Regex;
use std::sync::LazyLock;

static HEX_INT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^-?(0x)?[0-9a-f]+$").expect("hex integer grammar is a fixed valid regex")
});

static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^\[]+)(?:\[(\d+):(\d+)\])?$").expect("reference grammar is a fixed valid regex")
});

static MODE_WIDTH_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(imm|off)(\d+)$").expect("mode/width tag grammar is a fixed valid regex")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t.]+").expect("whitespace-separator grammar is a fixed valid regex"));

/// One line of the IL, with non-instruction kinds carrying their original
/// text verbatim so stages that don't touch them can echo it unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Empty(String),
    Segment {
        name: String,
        base: Option<u32>,
        raw: String,
    },
    Label {
        name: String,
        raw: String,
    },
    Instruction {
        parts: Vec<Part>,
        comment: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    pub head: PartHead,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PartHead {
    Int(i64),
    Symbol {
        label: String,
        hi: Option<u32>,
        lo: Option<u32>,
    },
}

impl Part {
    pub fn int(n: i64, tags: Vec<String>) -> Self {
        Part {
            head: PartHead::Int(n),
            tags,
        }
    }
}

/// Split a mode/width tag (`imm12`, `off20`) into its `Mode` and width.
pub fn parse_mode_tag(tag: &str) -> Option<(Mode, u32)> {
    let caps = MODE_WIDTH_TAG.captures(tag)?;
    let mode = match &caps[1] {
        "imm" => Mode::Imm,
        "off" => Mode::Off,
        _ => unreachable!("regex only matches imm|off"),
    };
    let width: u32 = caps[2].parse().ok()?;
    Some((mode, width))
}

fn strip_comment(raw: &str) -> (&str, Option<String>) {
    match raw.find('#') {
        Some(idx) => (&raw[..idx], Some(raw[idx + 1..].trim().to_string())),
        None => (raw, None),
    }
}

pub fn parse_line(line_no: usize, raw: &str) -> Result<Line, PipelineError> {
    let (content, comment) = strip_comment(raw);
    let trimmed = content.trim();

    if trimmed.is_empty() {
        return Ok(Line::Empty(raw.to_string()));
    }

    if let Some(rest) = trimmed.strip_prefix("==") {
        let tokens: Vec<&str> = WHITESPACE
            .split(rest.trim())
            .filter(|t| !t.is_empty())
            .collect();
        return match tokens.len() {
            1 => Ok(Line::Segment {
                name: tokens[0].to_string(),
                base: None,
                raw: raw.to_string(),
            }),
            2 => {
                let base = parse_hex_int(tokens[1])
                    .map_err(|reason| PipelineError::parse(line_no, raw, reason))?;
                if base < 0 {
                    return Err(PipelineError::parse(
                        line_no,
                        raw,
                        "segment base address must not be negative",
                    ));
                }
                Ok(Line::Segment {
                    name: tokens[0].to_string(),
                    base: Some(base as u32),
                    raw: raw.to_string(),
                })
            }
            n => Err(PipelineError::parse(
                line_no,
                raw,
                format!("segment header expects 1 or 2 tokens after `==`, found {n}"),
            )),
        };
    }

    if let Some(name) = trimmed.strip_suffix(':') {
        return Ok(Line::Label {
            name: name.to_string(),
            raw: raw.to_string(),
        });
    }

    let parts = WHITESPACE
        .split(trimmed)
        .filter(|t| !t.is_empty())
        .map(|token| parse_part(line_no, raw, token))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Line::Instruction { parts, comment })
}

fn parse_part(line_no: usize, raw: &str, token: &str) -> Result<Part, PipelineError> {
    let mut components = token.split('/');
    let head_str = components.next().unwrap_or("");
    let tags: Vec<String> = components.map(|s| s.to_string()).collect();

    if HEX_INT.is_match(head_str) {
        let value = parse_hex_int(head_str).map_err(|reason| PipelineError::parse(line_no, raw, reason))?;
        return Ok(Part {
            head: PartHead::Int(value),
            tags,
        });
    }

    let caps = REFERENCE
        .captures(head_str)
        .ok_or_else(|| PipelineError::parse(line_no, raw, format!("`{head_str}` is neither an integer nor a reference")))?;
    let label = caps[1].to_string();
    let parse_slice_digits = |m: regex::Match| {
        m.as_str()
            .parse::<u32>()
            .map_err(|_| PipelineError::parse(line_no, raw, format!("slice bound `{}` does not fit a 32-bit index", m.as_str())))
    };
    let hi = caps.get(2).map(parse_slice_digits).transpose()?;
    let lo = caps.get(3).map(parse_slice_digits).transpose()?;
    Ok(Part {
        head: PartHead::Symbol { label, hi, lo },
        tags,
    })
}

fn parse_hex_int(s: &str) -> Result<i64, String> {
    let (negative, unsigned) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let digits = unsigned.strip_prefix("0x").or_else(|| unsigned.strip_prefix("0X")).unwrap_or(unsigned);
    let magnitude =
        i64::from_str_radix(digits, 16).map_err(|e| format!("`{s}` is not a valid hexadecimal integer: {e}"))?;
    Ok(if negative { -magnitude } else { magnitude })
}

fn format_hex(n: i64) -> String {
    if n < 0 {
        format!("-{:02x}", -n as u64)
    } else {
        format!("{:02x}", n as u64)
    }
}

pub fn print_part(part: &Part) -> String {
    let head = match &part.head {
        PartHead::Int(n) => format_hex(*n),
        PartHead::Symbol { label, hi: Some(hi), lo: Some(lo) } => format!("{label}[{hi}:{lo}]"),
        PartHead::Symbol { label, .. } => label.clone(),
    };
    std::iter::once(head)
        .chain(part.tags.iter().cloned())
        .collect::<Vec<_>>()
        .join("/")
}

pub fn print_line(line: &Line) -> String {
    match line {
        Line::Empty(raw) => raw.clone(),
        Line::Segment { raw, .. } => raw.clone(),
        Line::Label { raw, .. } => raw.clone(),
        Line::Instruction { parts, comment } => {
            let mut s = parts.iter().map(print_part).collect::<Vec<_>>().join(" ");
            if let Some(c) = comment {
                s.push_str(" # ");
                s.push_str(c);
            }
            s
        }
    }
}
