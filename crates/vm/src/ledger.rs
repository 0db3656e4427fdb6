//! Call-stack ledger: return addresses kept in a list instead of on the
//! operand stack.

use std::fmt;

/// Where a call came from, for backtraces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugInfo {
    pub module: String,
    pub method: String,
    pub file: String,
    pub line: u32,
}

impl DebugInfo {
    pub fn new(
        module: impl Into<String>,
        method: impl Into<String>,
        file: impl Into<String>,
        line: u32,
    ) -> Self {
        Self {
            module: module.into(),
            method: method.into(),
            file: file.into(),
            line,
        }
    }
}

/// One live call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Address of the `call` instruction.
    pub call_site: u64,
    /// Address execution resumes at on return.
    pub return_site: u64,
    pub debug: Option<DebugInfo>,
}

impl fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x} -> {:#x}", self.call_site, self.return_site)?;
        if let Some(info) = &self.debug {
            write!(
                f,
                " in {}::{} ({}:{})",
                info.module, info.method, info.file, info.line
            )?;
        }
        Ok(())
    }
}

/// LIFO list of live calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallLedger {
    entries: Vec<LedgerEntry>,
}

impl CallLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, call_site: u64, return_site: u64) {
        self.entries.push(LedgerEntry {
            call_site,
            return_site,
            debug: None,
        });
    }

    pub fn push_with_debug(&mut self, call_site: u64, return_site: u64, debug: DebugInfo) {
        self.entries.push(LedgerEntry {
            call_site,
            return_site,
            debug: Some(debug),
        });
    }

    /// Remove the most recent call and return its return site. `None` when
    /// there is no call to return to.
    pub fn pop(&mut self) -> Option<u64> {
        self.pop_entry().map(|entry| entry.return_site)
    }

    pub fn pop_entry(&mut self) -> Option<LedgerEntry> {
        self.entries.pop()
    }

    /// Attach debug info to the innermost live call.
    pub fn annotate_top(&mut self, debug: DebugInfo) -> bool {
        match self.entries.last_mut() {
            Some(entry) => {
                entry.debug = Some(debug);
                true
            }
            None => false,
        }
    }

    pub fn top(&self) -> Option<&LedgerEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn destroy(&mut self) {
        self.entries.clear();
    }

    /// Live calls, innermost first.
    pub fn backtrace(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter().rev()
    }
}
