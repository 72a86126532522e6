//! Source origins and the lex-file table.
//!
//! Every tree node, diagnostic, and token carries an [`Origin`]: the lex-file
//! it came from plus a line number. Lex-files live in a central [`LexFiles`]
//! arena and carry the per-file error/warning counters that the pass driver
//! consults between passes.

use std::fmt;

/// Index into the lex-file arena.
///
/// Uses `u32` to save space; `u32::MAX` is reserved for the builtin
/// pseudo-file that synthesised nodes point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct LexFileId(u32);

impl LexFileId {
    /// The pseudo-file for nodes created by the compiler itself.
    pub const BUILTIN: Self = Self(u32::MAX);

    pub(crate) fn new(index: usize) -> Self {
        Self(index.try_into().expect("lex-file id out of range"))
    }

    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A source position: file plus line.
///
/// Lines are 1-based; line 0 means "no particular line" (used for whole-file
/// diagnostics and for the builtin origin).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Origin {
    pub file: LexFileId,
    pub line: u32,
}

impl Origin {
    /// Origin of nodes synthesised by the compiler (no source position).
    pub const BUILTIN: Self = Self {
        file: LexFileId::BUILTIN,
        line: 0,
    };

    #[must_use]
    pub fn new(file: LexFileId, line: u32) -> Self {
        Self { file, line }
    }
}

/// One open (or finished) source file.
#[derive(Debug)]
pub struct LexFile {
    /// File name as given on the command line or in an include.
    pub filename: String,
    /// Current line while lexing; final line count afterwards.
    pub lineno: u32,
    /// Errors recorded against this file.
    pub errcount: u32,
    /// Warnings recorded against this file.
    pub warncount: u32,
    /// Whether this is the top-level file of the compilation.
    pub toplevel: bool,
}

/// Arena of lex-files for one compilation.
#[derive(Debug, Default)]
pub struct LexFiles {
    files: Vec<LexFile>,
}

impl LexFiles {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new lex-file entry and returns its id.
    ///
    /// The first file opened is marked top-level.
    pub fn open(&mut self, filename: impl Into<String>) -> LexFileId {
        let id = LexFileId::new(self.files.len());
        self.files.push(LexFile {
            filename: filename.into(),
            lineno: 1,
            errcount: 0,
            warncount: 0,
            toplevel: self.files.is_empty(),
        });
        id
    }

    /// Returns the file for an id.
    ///
    /// # Panics
    /// Panics on [`LexFileId::BUILTIN`] or an out-of-range id.
    #[must_use]
    pub fn get(&self, id: LexFileId) -> &LexFile {
        &self.files[id.index()]
    }

    pub fn get_mut(&mut self, id: LexFileId) -> &mut LexFile {
        &mut self.files[id.index()]
    }

    /// Name of a file, or `"<builtin>"` for the builtin pseudo-file.
    #[must_use]
    pub fn name_of(&self, id: LexFileId) -> &str {
        if id == LexFileId::BUILTIN {
            "<builtin>"
        } else {
            &self.files[id.index()].filename
        }
    }

    /// Sum of error counts across all files.
    #[must_use]
    pub fn total_errors(&self) -> u32 {
        self.files.iter().map(|f| f.errcount).sum()
    }

    /// Sum of warning counts across all files.
    #[must_use]
    pub fn total_warnings(&self) -> u32 {
        self.files.iter().map(|f| f.warncount).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LexFile> {
        self.files.iter()
    }
}

/// Where a registered operation or node type came from.
///
/// Recorded on every compop/langop registration so trace output and internal
/// errors can say which component installed the implementation being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OpOrigin {
    pub kind: OpOriginKind,
    /// Short component tag, e.g. `"guppy:cnode"` or `"cccsp"`.
    pub tag: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, strum::Display)]
pub enum OpOriginKind {
    /// The shared tree/pass core.
    Core,
    /// A language front-end.
    Frontend,
    /// A target back-end.
    Backend,
}

impl OpOrigin {
    pub const CORE: Self = Self {
        kind: OpOriginKind::Core,
        tag: "core",
    };

    #[must_use]
    pub const fn frontend(tag: &'static str) -> Self {
        Self {
            kind: OpOriginKind::Frontend,
            tag,
        }
    }

    #[must_use]
    pub const fn backend(tag: &'static str) -> Self {
        Self {
            kind: OpOriginKind::Backend,
            tag,
        }
    }
}

impl fmt::Display for OpOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_and_counters() {
        let mut files = LexFiles::new();
        let a = files.open("a.gpp");
        let b = files.open("b.gpi");
        assert!(files.get(a).toplevel);
        assert!(!files.get(b).toplevel);

        files.get_mut(a).errcount += 2;
        files.get_mut(b).warncount += 1;
        assert_eq!(files.total_errors(), 2);
        assert_eq!(files.total_warnings(), 1);
    }

    #[test]
    fn test_builtin_name() {
        let files = LexFiles::new();
        assert_eq!(files.name_of(LexFileId::BUILTIN), "<builtin>");
    }
}
