//! Debug report
//!
//! An ordered collection of named sections the translator appends to while it
//! runs. The driver decides where the report ends up (file, log, discarded);
//! this module only accumulates and renders it.

use std::io::{self, Write};

/// A single titled section of the report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Stable machine-readable identifier, e.g. `ir-program`
    pub id: String,
    /// Human-readable heading
    pub title: String,
    /// Section body, preformatted text
    pub body: String,
}

/// Accumulated diagnostic sections for one translation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugReport {
    sections: Vec<Section>,
}

impl DebugReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Append a section. Sections keep insertion order.
    pub fn add_section(
        &mut self,
        id: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) {
        self.sections.push(Section { id: id.into(), title: title.into(), body: body.into() });
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Render the report as plain text.
    pub fn write_to(&self, out: &mut impl Write) -> io::Result<()> {
        for section in &self.sections {
            writeln!(out, "=== {} [{}]", section.title, section.id)?;
            writeln!(out, "{}", section.body)?;
            writeln!(out)?;
        }
        Ok(())
    }
}
