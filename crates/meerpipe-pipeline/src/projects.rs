//! Proposal ID → short project code mapping.

use std::collections::HashMap;

/// Code used for proposal IDs nobody has mapped.
pub const UNKNOWN_PROJECT: &str = "Rogue";

const BUILTIN: &[(&str, &str)] = &[
    ("SCI-20180516-MB-01", "MB01"),
    ("SCI-20180516-MB-02", "TPA"),
    ("SCI-20180516-MB-03", "RelBin"),
    ("SCI-20180516-MB-04", "GC"),
    ("SCI-20180516-MB-05", "PTA"),
    ("SCI-20180516-MB-06", "NGC6440"),
    ("SCI-20180516-MB-99", "fluxcal"),
];

/// Lookup table from long proposal IDs to the short codes used in paths.
#[derive(Debug, Clone)]
pub struct ProjectCodes {
    codes: HashMap<String, String>,
}

impl ProjectCodes {
    /// The built-in table extended (or overridden) by `extra`.
    pub fn new(extra: &HashMap<String, String>) -> Self {
        let mut codes: HashMap<String, String> = BUILTIN
            .iter()
            .map(|(pid, code)| (pid.to_string(), code.to_string()))
            .collect();
        codes.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self { codes }
    }

    /// Short code for a proposal ID.
    ///
    /// A value that is already a known short code passes through unchanged.
    pub fn short_code(&self, proposal_id: &str) -> String {
        let pid = proposal_id.trim();
        if let Some(code) = self.codes.get(pid) {
            return code.clone();
        }
        if self.codes.values().any(|code| code == pid) {
            return pid.to_string();
        }
        UNKNOWN_PROJECT.to_string()
    }
}

impl Default for ProjectCodes {
    fn default() -> Self {
        Self::new(&HashMap::new())
    }
}
