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

//! Stage 3: concatenate each instruction's resolved bit-field parts into one
//! word and split it little-endian into bytes. Format-agnostic: this stage
//! has no notion of U/I/S/J/B, only an ordered list of already-resolved
//! fields.

use crate::bits::{self, Concrete};
use crate::errors::PipelineError;
use crate::line::{parse_line, print_line, Line, Part, PartHead};

fn part_to_concrete(line_no: usize, raw: &str, part: &Part) -> Result<Concrete, PipelineError> {
    match &part.head {
        PartHead::Int(n) => {
            let width: u32 = part
                .tags
                .first()
                .and_then(|t| t.parse().ok())
                .ok_or_else(|| PipelineError::width(line_no, raw, "bit-field part is missing its width tag"))?;
            bits::u(*n, width).map_err(|e| PipelineError::range(line_no, raw, e.to_string()))
        }
        PartHead::Symbol { label, .. } => Err(PipelineError::resolution(line_no, label.clone())),
    }
}

pub fn pack_line(line_no: usize, line: Line) -> Result<Line, PipelineError> {
    match line {
        Line::Instruction { parts, comment } => {
            let raw = print_line(&Line::Instruction { parts: parts.clone(), comment: comment.clone() });
            let concrete = parts
                .iter()
                .map(|p| part_to_concrete(line_no, &raw, p))
                .collect::<Result<Vec<_>, _>>()?;
            let word = bits::concat(&concrete);
            if word.width % 8 != 0 {
                return Err(PipelineError::width(
                    line_no,
                    &raw,
                    format!("instruction width {} is not a multiple of 8", word.width),
                ));
            }
            let mut bytes = Vec::with_capacity((word.width / 8) as usize);
            let mut bit = 0;
            while bit < word.width {
                let byte = bits::slice(word, bit + 7, bit).map_err(|e| PipelineError::range(line_no, &raw, e.to_string()))?;
                bytes.push(byte);
                bit += 8;
            }
            let new_parts = bytes
                .into_iter()
                .map(|c| Part {
                    head: PartHead::Int(c.value as i64),
                    tags: vec![c.width.to_string()],
                })
                .collect();
            tracing::trace!(line_no, "packed instruction");
            Ok(Line::Instruction { parts: new_parts, comment })
        }
        other => Ok(other),
    }
}

pub fn pack_stream(input: &str) -> Result<String, PipelineError> {
    let mut out = Vec::new();
    for (idx, raw) in input.lines().enumerate() {
        let line_no = idx + 1;
        let parsed = parse_line(line_no, raw)?;
        let packed = pack_line(line_no, parsed)?;
        out.push(print_line(&packed));
    }
    tracing::debug!(lines = out.len(), "pack pass complete");
    Ok(out.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::format_line;

    fn format_then_pack(raw: &str) -> String {
        let parsed = parse_line(1, raw).unwrap();
        let formatted = format_line(1, parsed).unwrap();
        let packed = pack_line(1, formatted).unwrap();
        print_line(&packed)
    }

    #[test]
    fn lui_packs_to_documented_bytes() {
        assert_eq!(format_then_pack("37/lui 5/rd/t0 0x10010/imm20"), "b7/8 02/8 01/8 10/8");
    }

    #[test]
    fn opi_packs_to_documented_bytes() {
        assert_eq!(format_then_pack("13/opi 0/subop/add 6/rd/t1 0/rs/x0 48/imm12"), "13/8 03/8 80/8 04/8");
    }

    #[test]
    fn store_packs_to_documented_bytes() {
        assert_eq!(format_then_pack("23/store 2/subop/word 5/rs/t0 6/rs/t1 0/off12"), "23/8 a0/8 62/8 00/8");
    }

    #[test]
    fn unresolved_reference_fails() {
        let parsed = parse_line(1, "6f/jal 0/rd/x0 main/off20").unwrap();
        let formatted = format_line(1, parsed).unwrap();
        assert!(pack_line(1, formatted).is_err());
    }

    #[test]
    fn non_instruction_lines_pass_through() {
        let parsed = parse_line(1, "main:").unwrap();
        let packed = pack_line(1, parsed.clone()).unwrap();
        assert_eq!(packed, parsed);
    }
}
