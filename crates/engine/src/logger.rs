// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-job XML log sink.
//!
//! Logs are an append-only stream of XML fragments, one element per
//! event, written under `<docroot>/archives/<job-name>/<basename>.log`.
//! Reads wrap the raw stream in an `<ats>` root so clients always get a
//! well-formed document.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

/// Appends log events to one job's log file.
pub struct JobLogger {
    absolute_path: PathBuf,
    epoch: f64,
}

impl JobLogger {
    pub fn new(absolute_path: impl Into<PathBuf>, epoch: f64) -> Self {
        Self {
            absolute_path: absolute_path.into(),
            epoch,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.absolute_path
    }

    /// Render one event element with escaped attributes.
    fn render(
        element: &str,
        attributes: &[(&str, String)],
        text: &str,
        timestamp: f64,
    ) -> Result<String, std::io::Error> {
        let mut writer = Writer::new(Vec::new());
        let mut start = BytesStart::new(element);
        for (name, value) in attributes {
            start.push_attribute((*name, value.as_str()));
        }
        start.push_attribute(("timestamp", format!("{timestamp:.3}").as_str()));
        writer
            .write_event(Event::Start(start))
            .map_err(std::io::Error::other)?;
        if !text.is_empty() {
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(std::io::Error::other)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(element)))
            .map_err(std::io::Error::other)?;
        String::from_utf8(writer.into_inner()).map_err(std::io::Error::other)
    }

    /// Append one event element to the log file.
    pub fn log_event(
        &self,
        element: &str,
        attributes: &[(&str, String)],
        text: &str,
    ) -> Result<(), std::io::Error> {
        let fragment = Self::render(element, attributes, text, self.epoch)?;
        if let Some(parent) = self.absolute_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.absolute_path)?;
        writeln!(file, "{fragment}")?;
        Ok(())
    }

    /// Update the timestamp used for subsequent events.
    pub fn set_epoch(&mut self, epoch: f64) {
        self.epoch = epoch;
    }
}

/// Read a job log file, wrapped in an `<ats>` root element.
///
/// A missing file reads as an empty document: the job may simply not
/// have started logging yet.
pub fn read_log(absolute_path: &std::path::Path) -> String {
    let content = std::fs::read_to_string(absolute_path).unwrap_or_default();
    format!("<?xml version=\"1.0\" encoding=\"utf-8\" ?>\n<ats>\n{content}</ats>")
}

#[cfg(test)]
#[path = "logger_tests.rs"]
mod tests;
