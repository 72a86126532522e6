//! The static function index: call graph plus per-function frame sizes.
//!
//! The C backend cannot lean on the C stack for CCSP lightweight threads, so
//! every function's maximum stack demand must be known at emission time.
//! Frame sizes are seeded from an external gcc stack-usage report; the call
//! graph comes from a function-calls listing and from the `dcg` pass over
//! the tree. `calc_alloc` then closes `allocsize = framesize +
//! max(children allocsize)` over the graph.

use indexmap::IndexMap;
use regex::Regex;

/// One function's entry in the index.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SfiEntry {
    pub name: String,
    /// Callees reachable from this function's body.
    pub children: Vec<String>,
    /// Frame size in bytes, from the gcc report (or API-call costs).
    pub framesize: i64,
    /// `framesize + max(children allocsize)` after [`SfiTable::calc_alloc`].
    pub allocsize: i64,
    /// Set when reallocate must re-add PAR sums over an opaque cycle edge.
    pub parfixup: bool,
    /// Entry is a process-abstracted definition (spawned via `ProcPar`).
    pub proc_abstracted: bool,
}

/// Allocation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SfiError {
    /// Strict recursion: stack demand has no fixpoint.
    Recursion { cycle: Vec<String> },
    /// A side file could not be parsed.
    BadSideFile { line: usize, text: String },
}

impl std::fmt::Display for SfiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Recursion { cycle } => {
                write!(f, "recursion in call graph: {}", cycle.join(" -> "))
            }
            Self::BadSideFile { line, text } => {
                write!(f, "unparseable side-file line {line}: {text}")
            }
        }
    }
}

impl std::error::Error for SfiError {}

/// The static function index for one compilation.
///
/// Keyed by C entry name; iteration order is insertion order, which keeps
/// dumps and error messages deterministic.
#[derive(Debug, Default, serde::Serialize)]
pub struct SfiTable {
    entries: IndexMap<String, SfiEntry>,
}

impl SfiTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds an entry, creating a zeroed one if absent.
    pub fn lookup_or_new(&mut self, name: &str) -> &mut SfiEntry {
        self.entries.entry(name.to_owned()).or_insert_with(|| SfiEntry {
            name: name.to_owned(),
            children: Vec::new(),
            framesize: 0,
            allocsize: 0,
            parfixup: false,
            proc_abstracted: false,
        })
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SfiEntry> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut SfiEntry> {
        self.entries.get_mut(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records a call edge, creating both entries as needed. Duplicate
    /// edges collapse.
    pub fn add_child(&mut self, parent: &str, child: &str) {
        self.lookup_or_new(child);
        let entry = self.lookup_or_new(parent);
        if !entry.children.iter().any(|c| c == child) {
            entry.children.push(child.to_owned());
        }
    }

    /// Loads a function-calls listing: one `caller: callee callee ...` line
    /// per function, `#` comments and blank lines skipped.
    pub fn load_calls(&mut self, text: &str) -> Result<usize, SfiError> {
        let mut loaded = 0usize;
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((caller, callees)) = line.split_once(':') else {
                return Err(SfiError::BadSideFile {
                    line: lineno + 1,
                    text: line.to_owned(),
                });
            };
            let caller = caller.trim();
            if caller.is_empty() {
                return Err(SfiError::BadSideFile {
                    line: lineno + 1,
                    text: line.to_owned(),
                });
            }
            self.lookup_or_new(caller);
            for callee in callees.split_whitespace() {
                self.add_child(caller, callee);
            }
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Loads a gcc `-fstack-usage` report: lines of
    /// `file:line:col:function<TAB>bytes<TAB>qualifier`.
    pub fn load_usage(&mut self, text: &str) -> Result<usize, SfiError> {
        let re = Regex::new(r"^(?:[^\s:]+:\d+:\d+:)?(\S+)\s+(\d+)\s+(\w+)").expect("usage line pattern compiles");
        let mut loaded = 0usize;
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some(caps) = re.captures(line) else {
                return Err(SfiError::BadSideFile {
                    line: lineno + 1,
                    text: line.to_owned(),
                });
            };
            let name = &caps[1];
            let bytes: i64 = caps[2].parse().expect("digits parse as i64");
            self.lookup_or_new(name).framesize = bytes;
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Computes `allocsize` for every entry, children first.
    ///
    /// Strict recursion (a cycle with no process-abstracted member) is an
    /// error: there is no fixpoint. A cycle through a process-abstracted
    /// entry is treated as opaque — the back edge is skipped, a warning is
    /// returned, and `parfixup` is set on every member so reallocate
    /// re-adds the PAR sums.
    pub fn calc_alloc(&mut self) -> Result<Vec<String>, SfiError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            White,
            Grey,
            Black,
        }

        let names: Vec<String> = self.entries.keys().cloned().collect();
        let mut marks: IndexMap<String, Mark> = names.iter().map(|n| (n.clone(), Mark::White)).collect();
        let mut warnings = Vec::new();

        // iterative DFS carrying the grey path for cycle reporting
        for root in &names {
            if marks[root.as_str()] != Mark::White {
                continue;
            }
            let mut stack: Vec<(String, usize)> = vec![(root.clone(), 0)];
            marks[root.as_str()] = Mark::Grey;
            while let Some((name, child_idx)) = stack.pop() {
                let children = self.entries[name.as_str()].children.clone();
                if child_idx < children.len() {
                    let child = children[child_idx].clone();
                    stack.push((name.clone(), child_idx + 1));
                    match marks.get(child.as_str()).copied() {
                        None | Some(Mark::White) => {
                            marks.insert(child.clone(), Mark::Grey);
                            stack.push((child, 0));
                        }
                        Some(Mark::Grey) => {
                            // cycle: path from the first grey occurrence
                            let mut cycle: Vec<String> =
                                stack.iter().map(|(n, _)| n.clone()).skip_while(|n| *n != child).collect();
                            cycle.push(child.clone());
                            let opaque = cycle.iter().any(|n| self.entries[n.as_str()].proc_abstracted);
                            if opaque {
                                // the back edge stays but contributes the
                                // callee's current (unfinished) allocsize
                                for n in &cycle {
                                    self.entries[n.as_str()].parfixup = true;
                                }
                                warnings.push(format!(
                                    "indirect recursion through {}: treating call as opaque",
                                    cycle.join(" -> ")
                                ));
                            } else {
                                return Err(SfiError::Recursion { cycle });
                            }
                        }
                        Some(Mark::Black) => {}
                    }
                } else {
                    // children done: close this entry
                    let max_child = children
                        .iter()
                        .filter_map(|c| self.entries.get(c.as_str()))
                        .map(|e| e.allocsize)
                        .max()
                        .unwrap_or(0);
                    let entry = self.entries.get_mut(name.as_str()).expect("entry exists");
                    entry.allocsize = entry.framesize + max_child;
                    marks.insert(name, Mark::Black);
                }
            }
        }
        Ok(warnings)
    }

    /// Textual dump of the table, one entry per line.
    #[must_use]
    pub fn dump(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        for entry in self.entries.values() {
            let _ = writeln!(
                out,
                "{}: frame={} alloc={} parfixup={} children=[{}]",
                entry.name,
                entry.framesize,
                entry.allocsize,
                i32::from(entry.parfixup),
                entry.children.join(", ")
            );
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = &SfiEntry> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_fixpoint_linear_chain() {
        let mut sfi = SfiTable::new();
        sfi.lookup_or_new("a").framesize = 10;
        sfi.lookup_or_new("b").framesize = 20;
        sfi.lookup_or_new("c").framesize = 5;
        sfi.add_child("a", "b");
        sfi.add_child("b", "c");

        let warnings = sfi.calc_alloc().expect("acyclic graph allocates");
        assert!(warnings.is_empty());
        assert_eq!(sfi.get("c").expect("c").allocsize, 5);
        assert_eq!(sfi.get("b").expect("b").allocsize, 25);
        assert_eq!(sfi.get("a").expect("a").allocsize, 35);
    }

    #[test]
    fn test_alloc_takes_max_over_children() {
        let mut sfi = SfiTable::new();
        sfi.lookup_or_new("p").framesize = 8;
        sfi.lookup_or_new("small").framesize = 4;
        sfi.lookup_or_new("big").framesize = 100;
        sfi.add_child("p", "small");
        sfi.add_child("p", "big");

        sfi.calc_alloc().expect("acyclic graph allocates");
        assert_eq!(sfi.get("p").expect("p").allocsize, 108);
    }

    #[test]
    fn test_strict_recursion_is_an_error() {
        let mut sfi = SfiTable::new();
        sfi.lookup_or_new("f").framesize = 8;
        sfi.lookup_or_new("g").framesize = 8;
        sfi.add_child("f", "g");
        sfi.add_child("g", "f");

        match sfi.calc_alloc() {
            Err(SfiError::Recursion { cycle }) => {
                assert!(cycle.contains(&"f".to_owned()));
                assert!(cycle.contains(&"g".to_owned()));
            }
            other => panic!("expected recursion error, got {other:?}"),
        }
    }

    #[test]
    fn test_par_cycle_sets_parfixup_and_warns() {
        let mut sfi = SfiTable::new();
        sfi.lookup_or_new("f").framesize = 8;
        let g = sfi.lookup_or_new("g");
        g.framesize = 8;
        g.proc_abstracted = true;
        sfi.add_child("f", "g");
        sfi.add_child("g", "f");

        let warnings = sfi.calc_alloc().expect("opaque cycle is tolerated");
        assert_eq!(warnings.len(), 1);
        assert!(sfi.get("f").expect("f").parfixup);
        assert!(sfi.get("g").expect("g").parfixup);
    }

    #[test]
    fn test_load_calls_and_usage() {
        let mut sfi = SfiTable::new();
        sfi.load_calls("# comment\nmain: worker helper\nworker: helper\n")
            .expect("calls listing parses");
        sfi.load_usage("prog.c:10:6:main\t48\tstatic\nprog.c:20:6:worker\t32\tstatic\nhelper\t16\tstatic\n")
            .expect("usage report parses");

        sfi.calc_alloc().expect("acyclic graph allocates");
        assert_eq!(sfi.get("helper").expect("helper").allocsize, 16);
        assert_eq!(sfi.get("worker").expect("worker").allocsize, 48);
        assert_eq!(sfi.get("main").expect("main").allocsize, 96);
    }

    #[test]
    fn test_bad_side_file_line_reported() {
        let mut sfi = SfiTable::new();
        let err = sfi.load_calls("nocolonhere\n").expect_err("missing colon rejected");
        assert!(matches!(err, SfiError::BadSideFile { line: 1, .. }));
    }
}
