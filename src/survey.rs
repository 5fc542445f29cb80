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

//! Stage 2: assign an address to every instruction and label, then rewrite
//! every symbolic reference to a concrete bit-field. Unlike the other
//! stages, survey must buffer the whole input: a forward reference can't be
//! resolved until the rest of the stream has been walked.

use crate::bits::{self, Concrete};
use crate::errors::PipelineError;
use crate::line::{parse_line, parse_mode_tag, print_line, Line, Part, PartHead};
use crate::reference::Mode;
use std::collections::HashMap;

fn part_width(line_no: usize, raw: &str, part: &Part) -> Result<u32, PipelineError> {
    match &part.head {
        PartHead::Int(_) => part
            .tags
            .first()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| PipelineError::width(line_no, raw, "bit-field part is missing its width tag")),
        PartHead::Symbol { .. } => {
            let tag = part
                .tags
                .first()
                .ok_or_else(|| PipelineError::width(line_no, raw, "symbolic part is missing its mode/width tag"))?;
            parse_mode_tag(tag)
                .map(|(_, width)| width)
                .ok_or_else(|| PipelineError::width(line_no, raw, format!("`{tag}` is not a valid mode/width tag")))
        }
    }
}

/// Resolve the address-carrying label's value to a concrete 32-bit word
/// according to the reference's mode. A PC-relative offset that doesn't fit
/// a signed 32-bit field is a range error, not something to truncate.
fn resolve_value(mode: Mode, label_addr: u32, instr_addr: u32) -> Result<Concrete, bits::BitsError> {
    match mode {
        Mode::Imm => Ok(bits::u(label_addr as i64, 32).expect("any u32 fits a 32-bit unsigned field")),
        Mode::Off => {
            let diff = label_addr as i64 - instr_addr as i64;
            bits::i(diff, 32)
        }
    }
}

pub fn survey_stream(input: &str) -> Result<String, PipelineError> {
    let raw_lines: Vec<&str> = input.lines().collect();
    let mut parsed: Vec<Line> = Vec::with_capacity(raw_lines.len());
    for (idx, raw) in raw_lines.iter().enumerate() {
        parsed.push(parse_line(idx + 1, raw)?);
    }

    // Pass 1: address assignment.
    let mut symbols: HashMap<String, u32> = HashMap::new();
    let mut instr_addr: Vec<Option<u32>> = vec![None; parsed.len()];
    let mut current_addr: Option<u32> = None;

    for (idx, line) in parsed.iter().enumerate() {
        let line_no = idx + 1;
        let raw = raw_lines[idx];
        match line {
            Line::Empty(_) => {}
            Line::Segment { name, base, .. } => {
                let addr = base.unwrap_or(0);
                current_addr = Some(addr);
                tracing::trace!(line_no, segment = %name, addr, "segment boundary");
            }
            Line::Label { name, .. } => {
                let Some(addr) = current_addr else {
                    return Err(PipelineError::structural(format!(
                        "label `{name}` on line {line_no} appears outside any segment"
                    )));
                };
                // Duplicate labels overwrite silently; no warning is raised.
                // This mirrors the source behavior rather than rejecting it.
                symbols.insert(name.clone(), addr);
                tracing::trace!(line_no, label = %name, addr, "label assigned");
            }
            Line::Instruction { parts, .. } => {
                let Some(addr) = current_addr else {
                    return Err(PipelineError::structural(format!(
                        "instruction on line {line_no} appears outside any segment"
                    )));
                };
                instr_addr[idx] = Some(addr);
                let mut total_width = 0u32;
                for part in parts {
                    total_width += part_width(line_no, raw, part)?;
                }
                if total_width % 8 != 0 {
                    return Err(PipelineError::width(
                        line_no,
                        raw,
                        format!("instruction width {total_width} is not a multiple of 8"),
                    ));
                }
                current_addr = Some(addr + total_width / 8);
            }
        }
    }

    // Pass 2: reference resolution.
    let mut out = Vec::with_capacity(parsed.len());
    for (idx, line) in parsed.into_iter().enumerate() {
        let line_no = idx + 1;
        let raw = raw_lines[idx];
        match line {
            Line::Instruction { parts, comment } => {
                let addr = instr_addr[idx].expect("pass 1 assigns an address to every instruction line");
                let mut new_parts = Vec::with_capacity(parts.len());
                for part in parts {
                    new_parts.push(resolve_part(line_no, raw, &symbols, addr, part)?);
                }
                out.push(print_line(&Line::Instruction { parts: new_parts, comment }));
            }
            other => out.push(print_line(&other)),
        }
    }
    tracing::debug!(labels = symbols.len(), lines = out.len(), "survey pass complete");
    Ok(out.join("\n"))
}

fn resolve_part(
    line_no: usize,
    raw: &str,
    symbols: &HashMap<String, u32>,
    instr_addr: u32,
    part: Part,
) -> Result<Part, PipelineError> {
    match part.head {
        PartHead::Int(_) => Ok(part),
        PartHead::Symbol { label, hi, lo } => {
            let Some(&label_addr) = symbols.get(&label) else {
                return Err(PipelineError::resolution(line_no, label));
            };
            let (mode, _) = parse_mode_tag(part.tags.first().map(String::as_str).unwrap_or(""))
                .ok_or_else(|| PipelineError::width(line_no, raw, "symbolic part is missing its mode/width tag"))?;
            let word = resolve_value(mode, label_addr, instr_addr)
                .map_err(|e| PipelineError::range(line_no, raw, e.to_string()))?;
            let hi = hi.ok_or_else(|| PipelineError::width(line_no, raw, format!("reference `{label}` was never default-sliced")))?;
            let lo = lo.ok_or_else(|| PipelineError::width(line_no, raw, format!("reference `{label}` was never default-sliced")))?;
            let sliced = bits::slice(word, hi, lo).map_err(|e| PipelineError::range(line_no, raw, e.to_string()))?;
            Ok(Part {
                head: PartHead::Int(sliced.value as i64),
                tags: vec![sliced.width.to_string()],
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::format_line;

    fn format_then_survey(input: &str) -> String {
        let formatted: Vec<Line> = input
            .lines()
            .enumerate()
            .map(|(idx, raw)| format_line(idx + 1, parse_line(idx + 1, raw).unwrap()).unwrap())
            .collect();
        let printed: Vec<String> = formatted.iter().map(print_line).collect();
        survey_stream(&printed.join("\n")).unwrap()
    }

    #[test]
    fn resolves_uart_loop_jal_back_to_main() {
        // `lui` + six `opi`/`store` pairs (one per byte of "Hello\n") + the
        // looping `jal`, laid out at `main`: the jal sits 52 bytes past main.
        let input = "\
== code 0x80000000
main:
37/lui 5/rd/t0 0x10010/imm20
13/opi 0/subop/add 6/rd/t1 0/rs/x0 48/imm12
23/store 2/subop/word 5/rs/t0 6/rs/t1 0/off12
13/opi 0/subop/add 6/rd/t1 0/rs/x0 65/imm12
23/store 2/subop/word 5/rs/t0 6/rs/t1 0/off12
13/opi 0/subop/add 6/rd/t1 0/rs/x0 6c/imm12
23/store 2/subop/word 5/rs/t0 6/rs/t1 0/off12
13/opi 0/subop/add 6/rd/t1 0/rs/x0 6c/imm12
23/store 2/subop/word 5/rs/t0 6/rs/t1 0/off12
13/opi 0/subop/add 6/rd/t1 0/rs/x0 6f/imm12
23/store 2/subop/word 5/rs/t0 6/rs/t1 0/off12
13/opi 0/subop/add 6/rd/t1 0/rs/x0 0a/imm12
23/store 2/subop/word 5/rs/t0 6/rs/t1 0/off12
6f/jal 0/rd/x0 main/off20";
        let out = format_then_survey(input);
        let last = out.lines().last().unwrap();
        assert_eq!(last, "6f/7 00/5 ff/8 01/1 3e6/10 01/1");
    }

    #[test]
    fn backward_branch_offset_is_negative() {
        // label at 0x100, branch instruction at 0x110: offset -16 = 0xFFFFFFF0,
        // whose [12:1] slice is 0xFF8.
        let word = resolve_value(Mode::Off, 0x100, 0x110).unwrap();
        assert_eq!(word.value, 0xFFFF_FFF0);
        let sliced = bits::slice(word, 12, 1).unwrap();
        assert_eq!(sliced.value, 0xFF8);
    }

    #[test]
    fn offset_too_large_for_32_signed_bits_is_an_error() {
        assert!(resolve_value(Mode::Off, 0, 3_000_000_000).is_err());
    }

    #[test]
    fn duplicate_labels_overwrite_silently() {
        let input = "== code 0\nhere:\n37/lui 0/rd/x0 0x0/imm20\nhere:\n6f/jal 0/rd/x0 here/off20";
        let out = format_then_survey(input);
        assert!(!out.is_empty());
    }

    #[test]
    fn undefined_label_is_a_resolution_error() {
        let input = "== code 0\n6f/jal 0/rd/x0 nope/off20";
        let formatted: Vec<Line> = input
            .lines()
            .enumerate()
            .map(|(idx, raw)| format_line(idx + 1, parse_line(idx + 1, raw).unwrap()).unwrap())
            .collect();
        let printed: Vec<String> = formatted.iter().map(print_line).collect();
        assert!(survey_stream(&printed.join("\n")).is_err());
    }

    #[test]
    fn label_outside_segment_is_structural_error() {
        assert!(survey_stream("stray:").is_err());
    }
}
