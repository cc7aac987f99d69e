//! Breakpoint registry.
//!
//! Ids are assigned from a single monotonic counter and are never reused,
//! even across a per-source replace: real editors resend the full desired
//! set for a file on every `setBreakpoints` call, so the registry replaces
//! that source's set wholesale rather than only ever appending.

use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Breakpoint {
    pub id: u32,
    pub source_path: String,
    pub line: u32,
    pub verified: bool,
}

#[derive(Default)]
pub struct BreakpointRegistry {
    next_id: u32,
    /// normalized source path -> (line -> breakpoint)
    by_source: IndexMap<String, IndexMap<u32, Breakpoint>>,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        BreakpointRegistry {
            next_id: 1,
            by_source: IndexMap::new(),
        }
    }

    /// Normalizes a source path for identity comparison: a leading drive
    /// letter is upper-cased and forward slashes become backslashes. The
    /// rest of the path is left exactly as given - further canonicalization
    /// (symlinks, relative-path resolution) is deliberately out of scope.
    pub fn normalize(source: &str) -> String {
        let mut chars: Vec<char> = source.chars().collect();
        if chars.len() >= 2 && chars[1] == ':' && chars[0].is_ascii_alphabetic() {
            chars[0] = chars[0].to_ascii_uppercase();
        }
        chars
            .into_iter()
            .map(|c| if c == '/' { '\\' } else { c })
            .collect()
    }

    /// Adds a single breakpoint at `(source, line)`. Returns the existing
    /// id with `verified = false` if that exact pair was already present
    /// *before this call* (duplicate-submission signal); otherwise assigns
    /// a fresh id.
    pub fn add(&mut self, source: &str, line: u32) -> Breakpoint {
        let normalized = Self::normalize(source);
        let lines = self.by_source.entry(normalized.clone()).or_default();
        if let Some(existing) = lines.get(&line) {
            return Breakpoint {
                id: existing.id,
                source_path: normalized,
                line,
                verified: false,
            };
        }
        let id = self.next_id;
        self.next_id += 1;
        let bp = Breakpoint {
            id,
            source_path: normalized,
            line,
            verified: true,
        };
        lines.insert(line, bp.clone());
        bp
    }

    /// Replaces the breakpoint set for `source` with exactly the given
    /// lines, returning one descriptor per input line in order (the
    /// response always has as many entries as the request). Lines that
    /// already existed for this source keep their id and are reported
    /// `verified = false` (the same duplicate-signal semantics as `add`,
    /// now scoped per replace instead of per process lifetime); brand new
    /// lines get a fresh id and `verified = true`.
    pub fn set_for_source(&mut self, source: &str, lines: &[u32]) -> Vec<Breakpoint> {
        let normalized = Self::normalize(source);
        let previous = self.by_source.remove(&normalized).unwrap_or_default();

        let mut new_set = IndexMap::new();
        let mut results = Vec::with_capacity(lines.len());
        for &line in lines {
            let bp = if let Some(existing) = previous.get(&line) {
                Breakpoint {
                    id: existing.id,
                    source_path: normalized.clone(),
                    line,
                    verified: false,
                }
            } else {
                let id = self.next_id;
                self.next_id += 1;
                Breakpoint {
                    id,
                    source_path: normalized.clone(),
                    line,
                    verified: true,
                }
            };
            new_set.insert(line, bp.clone());
            results.push(bp);
        }
        self.by_source.insert(normalized, new_set);
        results
    }

    pub fn matches(&self, source: &str, line: u32) -> Option<&Breakpoint> {
        let normalized = Self::normalize(source);
        self.by_source.get(&normalized)?.get(&line)
    }
}
