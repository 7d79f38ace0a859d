#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Reject sections that appear out of canonical order or more than once.
    /// Custom sections are accepted anywhere either way.
    pub enforce_section_order: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            enforce_section_order: true,
        }
    }
}

impl LoadOptions {
    pub fn permissive() -> Self {
        Self {
            enforce_section_order: false,
        }
    }
}
