//! One module per top-level command.

pub mod decision;
pub mod doctor;
pub mod gate;
pub mod install;
pub mod standards;

use serde::Serialize;
use std::fmt::Display;
use std::io::Write;

/// Where command results go: pretty JSON with `--json`, plain lines otherwise.
pub struct Output<'w> {
    json: bool,
    out: &'w mut dyn Write,
}

impl<'w> Output<'w> {
    pub fn new(json: bool, out: &'w mut dyn Write) -> Self {
        Self { json, out }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    pub fn value<T: Serialize + ?Sized>(&mut self, value: &T) -> anyhow::Result<()> {
        writeln!(self.out, "{}", serde_json::to_string_pretty(value)?)?;
        Ok(())
    }

    pub fn line(&mut self, text: impl Display) -> anyhow::Result<()> {
        writeln!(self.out, "{text}")?;
        Ok(())
    }
}
