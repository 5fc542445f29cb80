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

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Read, Write};

/// Stage 1: verify instruction shapes and pack operands into bit-field IL.
#[derive(Parser)]
#[command(version, about)]
struct Opts;

fn main() -> Result<()> {
    tracing_subscriber::fmt::try_init().ok();
    let _ = Opts::parse();

    let mut input = String::new();
    io::stdin().read_to_string(&mut input).context("failed to read standard input")?;

    let output = rv32il::format::format_stream(&input).context("failed during format stage")?;

    io::stdout().write_all(output.as_bytes()).context("failed to write standard output")?;
    Ok(())
}
