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

//! Stage 4: collect the byte-tagged IL into named segments and emit a
//! bootable ELF32 little-endian executable.

use crate::bits;
use crate::errors::PipelineError;
use crate::line::{parse_line, Line, PartHead};

const ELF_HEADER_SIZE: u32 = 0x34;
const PROGRAM_HEADER_SIZE: u32 = 0x20;
const SEGMENT_ALIGN: u32 = 0x1000;

#[derive(Debug, Clone)]
pub struct Segment {
    pub name: String,
    pub addr: u32,
    pub bytes: Vec<u8>,
}

fn align_up(n: u32, align: u32) -> u32 {
    n.div_ceil(align) * align
}

pub fn collect_segments(input: &str) -> Result<Vec<Segment>, PipelineError> {
    let mut segments: Vec<Segment> = Vec::new();
    let mut current: Option<usize> = None;

    for (idx, raw) in input.lines().enumerate() {
        let line_no = idx + 1;
        match parse_line(line_no, raw)? {
            Line::Empty(_) | Line::Label { .. } => {}
            Line::Segment { name, base, .. } => {
                segments.push(Segment {
                    name,
                    addr: base.unwrap_or(0),
                    bytes: Vec::new(),
                });
                current = Some(segments.len() - 1);
            }
            Line::Instruction { parts, .. } => {
                let Some(cur) = current else {
                    return Err(PipelineError::structural(format!(
                        "instruction on line {line_no} appears outside any segment"
                    )));
                };
                for part in parts {
                    let PartHead::Int(n) = part.head else {
                        return Err(PipelineError::shape(line_no, raw, "byte-tagged part must be concrete"));
                    };
                    let byte = bits::u(n, 8).map_err(|e| PipelineError::range(line_no, raw, e.to_string()))?;
                    segments[cur].bytes.push(byte.value as u8);
                }
            }
        }
    }
    Ok(segments)
}

fn push_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn push_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

pub fn build_elf(segments: &[Segment]) -> Result<Vec<u8>, PipelineError> {
    let code = segments
        .iter()
        .find(|s| s.name == "code")
        .ok_or_else(|| PipelineError::structural("no segment named `code`: nothing to use as the entry point"))?;

    let header_span = ELF_HEADER_SIZE + segments.len() as u32 * PROGRAM_HEADER_SIZE;
    let mut offsets = Vec::with_capacity(segments.len());
    let mut cursor = header_span;
    for seg in segments {
        let offset = align_up(cursor, SEGMENT_ALIGN);
        if offset % SEGMENT_ALIGN != seg.addr % SEGMENT_ALIGN {
            return Err(PipelineError::structural(format!(
                "segment `{}`: file offset 0x{offset:x} is not congruent with vaddr 0x{:x} modulo 0x{SEGMENT_ALIGN:x}",
                seg.name, seg.addr
            )));
        }
        offsets.push(offset);
        cursor = offset + seg.bytes.len() as u32;
    }

    let mut out = Vec::with_capacity(cursor as usize);

    // e_ident
    out.extend_from_slice(&[0x7F, b'E', b'L', b'F', 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    push_u16(&mut out, 2); // e_type = ET_EXEC
    push_u16(&mut out, 0xF3); // e_machine = EM_RISCV
    push_u32(&mut out, 1); // e_version
    push_u32(&mut out, code.addr); // e_entry
    push_u32(&mut out, ELF_HEADER_SIZE); // e_phoff
    push_u32(&mut out, 0); // e_shoff
    push_u32(&mut out, 4); // e_flags
    push_u16(&mut out, ELF_HEADER_SIZE as u16); // e_ehsize
    push_u16(&mut out, PROGRAM_HEADER_SIZE as u16); // e_phentsize
    push_u16(&mut out, segments.len() as u16); // e_phnum
    push_u16(&mut out, 0); // e_shentsize
    push_u16(&mut out, 0); // e_shnum
    push_u16(&mut out, 0); // e_shstrndx
    debug_assert_eq!(out.len() as u32, ELF_HEADER_SIZE);

    for (seg, offset) in segments.iter().zip(&offsets) {
        let flags: u32 = if seg.name == "code" { 5 } else { 6 };
        push_u32(&mut out, 1); // p_type = PT_LOAD
        push_u32(&mut out, *offset);
        push_u32(&mut out, seg.addr); // p_vaddr
        push_u32(&mut out, seg.addr); // p_paddr
        push_u32(&mut out, seg.bytes.len() as u32); // p_filesz
        push_u32(&mut out, seg.bytes.len() as u32); // p_memsz
        push_u32(&mut out, flags);
        push_u32(&mut out, SEGMENT_ALIGN);
    }
    debug_assert_eq!(out.len() as u32, header_span);

    for (seg, offset) in segments.iter().zip(&offsets) {
        out.resize(*offset as usize, 0);
        out.extend_from_slice(&seg.bytes);
    }

    tracing::debug!(segments = segments.len(), bytes = out.len(), "elf image emitted");
    Ok(out)
}

pub fn emit_stream(input: &str) -> Result<Vec<u8>, PipelineError> {
    let segments = collect_segments(input)?;
    build_elf(&segments)
}
