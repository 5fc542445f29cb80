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

pub mod bits;
pub mod elf;
pub mod errors;
pub mod format;
pub mod line;
pub mod pack;
pub mod reference;
pub mod survey;

use anyhow::{Context, Result};

/// Run all four stages in sequence and return the finished ELF32 image.
/// Each stage is independently available (`format::format_stream`,
/// `survey::survey_stream`, `pack::pack_stream`, `elf::emit_stream`) for
/// callers that want to inspect an intermediate form; this is the
/// convenience path used when the whole pipeline is wanted at once.
pub fn assemble(source: &str) -> Result<Vec<u8>> {
    let formatted = format::format_stream(source).context("failed during format stage")?;
    let surveyed = survey::survey_stream(&formatted).context("failed during survey stage")?;
    let packed = pack::pack_stream(&surveyed).context("failed during pack stage")?;
    let image = elf::emit_stream(&packed).context("failed during emit stage")?;
    Ok(image)
}
