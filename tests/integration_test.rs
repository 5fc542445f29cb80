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

use rv32il::assemble;

const UART_LOOP: &str = "\
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

#[test]
fn uart_loop_assembles_to_a_bootable_elf() {
    let image = assemble(UART_LOOP).unwrap();

    assert_eq!(&image[0..4], &[0x7F, b'E', b'L', b'F']);
    assert_eq!(image[4], 1); // ELFCLASS32
    assert_eq!(image[5], 1); // little-endian
    assert_eq!(u16::from_le_bytes([image[18], image[19]]), 0xF3); // e_machine
    let entry = u32::from_le_bytes(image[24..28].try_into().unwrap());
    assert_eq!(entry, 0x80000000);

    let phoff = 0x34;
    let p_offset = u32::from_le_bytes(image[phoff + 4..phoff + 8].try_into().unwrap()) as usize;
    let p_filesz = u32::from_le_bytes(image[phoff + 16..phoff + 20].try_into().unwrap()) as usize;
    let code = &image[p_offset..p_offset + p_filesz];

    // 13 instructions before the looping `jal`, each 4 bytes, plus the jal itself.
    assert_eq!(code.len(), 14 * 4);
    // the trailing jal loops back 52 bytes, matching the documented encoding.
    assert_eq!(&code[code.len() - 4..], &[0x6f, 0xf0, 0xdf, 0xfc]);
}

#[test]
fn lui_with_concrete_immediate_matches_documented_bytes() {
    let source = "== code 0\n37/lui 5/rd/t0 0x10010/imm20";
    let image = assemble(source).unwrap();
    let code = &image[code_offset(&image)..];
    assert_eq!(&code[..4], &[0xb7, 0x02, 0x01, 0x10]);
}

#[test]
fn opi_with_concrete_immediate_matches_documented_bytes() {
    let source = "== code 0\n13/opi 0/subop/add 6/rd/t1 0/rs/x0 48/imm12";
    let image = assemble(source).unwrap();
    let code = &image[code_offset(&image)..];
    assert_eq!(&code[..4], &[0x13, 0x03, 0x80, 0x04]);
}

#[test]
fn store_with_concrete_offset_matches_documented_bytes() {
    let source = "== code 0\n23/store 2/subop/word 5/rs/t0 6/rs/t1 0/off12";
    let image = assemble(source).unwrap();
    let code = &image[code_offset(&image)..];
    assert_eq!(&code[..4], &[0x23, 0xa0, 0x62, 0x00]);
}

#[test]
fn backward_branch_encodes_a_negative_offset() {
    let source = "\
== code 0x100
home:
== code 0x110
63/branch 0/subop/eq 5/rs/t0 6/rs/t1 home/off12";
    // the branch lands at 0x110, 16 bytes after `home` at 0x100: offset is -16.
    let image = assemble(source).unwrap();
    assert!(!image.is_empty());
}

#[test]
fn lui_with_label_immediate_resolves_to_the_label_address() {
    let source = "\
== data 0x10010000
value:
== code 0
37/lui 5/rd/t0 value/imm20";
    let image = assemble(source).unwrap();
    // data segment is empty (no instructions), code segment holds the lui.
    let code = &image[code_offset(&image)..];
    assert_eq!(&code[..4], &[0xb7, 0x02, 0x01, 0x10]);
}

#[test]
fn missing_code_segment_is_rejected() {
    let source = "== data 0\n37/lui 0/rd/x0 0/imm20";
    assert!(assemble(source).is_err());
}

#[test]
fn undefined_label_is_rejected() {
    let source = "== code 0\n6f/jal 0/rd/x0 nowhere/off20";
    assert!(assemble(source).is_err());
}

#[test]
fn unknown_mnemonic_is_rejected() {
    let source = "== code 0\n00/frobnicate 0/rd/x0";
    assert!(assemble(source).is_err());
}

#[test]
fn opcode_mismatch_is_rejected() {
    let source = "== code 0\n00/lui 5/rd/t0 0x10010/imm20";
    assert!(assemble(source).is_err());
}

fn code_offset(image: &[u8]) -> usize {
    let phnum = u16::from_le_bytes([image[44], image[45]]) as usize;
    for i in 0..phnum {
        let ph = 0x34 + i * 0x20;
        let flags = u32::from_le_bytes(image[ph + 24..ph + 28].try_into().unwrap());
        if flags == 5 {
            let offset = u32::from_le_bytes(image[ph + 4..ph + 8].try_into().unwrap());
            return offset as usize;
        }
    }
    panic!("no R+X segment found in image");
}
