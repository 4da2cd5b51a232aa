//! `obs.header` parsing.
//!
//! Headers are whitespace separated `KEY value` lines; `#` starts a comment.

use std::collections::HashMap;
use std::path::Path;

use meerpipe_types::Band;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObsHeader {
    values: HashMap<String, String>,
}

impl ObsHeader {
    pub fn parse(text: &str) -> Self {
        let values = text
            .lines()
            .map(|line| line.split('#').next().unwrap_or("").trim())
            .filter(|line| !line.is_empty())
            .filter_map(|line| {
                let mut parts = line.splitn(2, char::is_whitespace);
                let key = parts.next()?.trim();
                let value = parts.next().unwrap_or("").trim();
                Some((key.to_ascii_uppercase(), value.to_string()))
            })
            .collect();
        Self { values }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        Ok(Self::parse(&text))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(&key.to_ascii_uppercase())
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// `PROPOSAL_ID`, falling back to `PID`.
    pub fn proposal_id(&self) -> Option<&str> {
        self.get("PROPOSAL_ID").or_else(|| self.get("PID"))
    }

    /// Centre frequency in MHz.
    pub fn frequency_mhz(&self) -> Option<f64> {
        self.get("FREQ").and_then(|f| f.parse().ok())
    }

    pub fn band(&self) -> Option<Band> {
        self.frequency_mhz().map(Band::from_frequency_mhz)
    }
}
