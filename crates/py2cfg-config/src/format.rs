//! Rendering options for list values and continuation lines

/// Lists whose inline form is longer than this many characters dangle.
pub const DEFAULT_DANGLING_LIST_THRESHOLD: usize = 40;

/// Spaces substituted for the leading tabs of continuation lines.
pub const DEFAULT_DANGLING_LIST_INDENT: usize = 4;

/// How list values choose between the inline and the dangling form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DanglingLists {
    /// Dangle once the joined list is longer than the given number of characters
    Threshold(usize),
    /// Dangle every list
    Always,
    /// Keep every list inline
    Never,
}

impl DanglingLists {
    /// Character threshold equivalent of this policy
    pub fn threshold(self) -> usize {
        match self {
            DanglingLists::Threshold(limit) => limit,
            DanglingLists::Always => 0,
            DanglingLists::Never => usize::MAX,
        }
    }
}

impl Default for DanglingLists {
    fn default() -> Self {
        DanglingLists::Threshold(DEFAULT_DANGLING_LIST_THRESHOLD)
    }
}

/// Options that shape the rendered document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    pub dangling_list_threshold: usize,
    pub dangling_list_indent: usize,
}

impl Default for FormatOptions {
    fn default() -> Self {
        FormatOptions {
            dangling_list_threshold: DEFAULT_DANGLING_LIST_THRESHOLD,
            dangling_list_indent: DEFAULT_DANGLING_LIST_INDENT,
        }
    }
}

impl FormatOptions {
    pub fn new(policy: DanglingLists, indent: usize) -> Self {
        FormatOptions {
            dangling_list_threshold: policy.threshold(),
            dangling_list_indent: indent,
        }
    }

    /// Whether a list whose inline rendering has `inline_len` characters dangles
    pub fn dangles(&self, inline_len: usize) -> bool {
        inline_len > self.dangling_list_threshold
    }
}
