//! The textual C emitter.
//!
//! `CodeGen` accumulates the output file: indent-tracked statement lines, a
//! file-scope insertion point for deferred constants and forward
//! declarations, a label counter, the stack of enclosing back-end blocks,
//! and an optional digest of the emitted bytes (used when generating
//! libraries). Node-specific emission happens through the `codegen` compop;
//! [`codegen_subtree`] dispatches it.

use sha2::{Digest, Sha256};

use crate::{
    backend::cccsp::Subtarget,
    compiler::Compiler,
    ops::CompOp,
    passes::PassState,
    tree::NodeId,
};

/// Code-emission state for one output file.
#[derive(Debug)]
pub struct CodeGen {
    out: String,
    indent: usize,
    /// Byte offset where file-scope text (constants, forward declarations)
    /// is inserted, ahead of the main program.
    insert_point: usize,
    label_count: u32,
    /// Enclosing back-end blocks, innermost last.
    pub block_stack: Vec<NodeId>,
    /// Pending per-line text (expressions write here before `end_line`).
    line: String,
    pub subtarget: Subtarget,
    /// Compute a digest over the final bytes.
    want_digest: bool,
    /// C entry name of the top-level process, registered during emission.
    pub toplevel_entry: Option<String>,
    /// Set while emitting queued precode items at file scope.
    pub filescope: bool,
    pub error_count: u32,
}

impl CodeGen {
    #[must_use]
    pub fn new(subtarget: Subtarget, want_digest: bool) -> Self {
        Self {
            out: String::new(),
            indent: 0,
            insert_point: 0,
            label_count: 0,
            block_stack: Vec::new(),
            line: String::new(),
            subtarget,
            want_digest,
            toplevel_entry: None,
            filescope: false,
            error_count: 0,
        }
    }

    /// Appends raw text to the pending line.
    pub fn write(&mut self, text: &str) {
        self.line.push_str(text);
    }

    /// Terminates the pending line, indenting it into the output.
    pub fn end_line(&mut self) {
        for _ in 0..self.indent {
            self.out.push('\t');
        }
        self.out.push_str(&self.line);
        self.out.push('\n');
        self.line.clear();
    }

    /// Emits one complete line.
    pub fn line(&mut self, text: &str) {
        self.write(text);
        self.end_line();
    }

    /// Emits a `/* ... */` comment line.
    pub fn comment(&mut self, text: &str) {
        self.line(&format!("/* {text} */"));
    }

    /// Emits `{` and indents.
    pub fn open_block(&mut self) {
        self.line("{");
        self.indent += 1;
    }

    /// Outdents and emits `}`.
    pub fn close_block(&mut self) {
        assert!(self.indent > 0, "close_block under-runs the indent level");
        self.indent -= 1;
        self.line("}");
    }

    /// Fresh label number.
    pub fn new_label(&mut self) -> u32 {
        let l = self.label_count;
        self.label_count += 1;
        l
    }

    /// Marks the current end of output as the file-scope insertion point.
    pub fn set_insert_point_here(&mut self) {
        assert!(self.line.is_empty(), "insert point set mid-line");
        self.insert_point = self.out.len();
    }

    /// Inserts file-scope text at the insertion point, ahead of everything
    /// emitted since.
    pub fn insert_filescope(&mut self, text: &str) {
        self.out.insert_str(self.insert_point, text);
        self.insert_point += text.len();
    }

    /// Emits the workspace-size declaration for a process entry.
    pub fn set_ws_size(&mut self, words: i64, adjust: i64) {
        self.comment(&format!("workspace: {words} words (+{adjust} adjustment)"));
    }

    /// Emits a process entry header: `void <name> (Workspace wptr)`.
    pub fn proc_entry(&mut self, name: &str) {
        self.line(&format!("void {name} (Workspace wptr)"));
    }

    /// Emits an external process declaration at file scope.
    pub fn proc_external(&mut self, name: &str) {
        self.insert_filescope(&format!("extern void {name} (Workspace wptr);\n"));
    }

    /// Emits a direct call to another process entry.
    pub fn proc_call(&mut self, name: &str, args: &[String]) {
        self.line(&format!("{name} (wptr{});", args.iter().map(|a| format!(", {a}")).collect::<String>()));
    }

    /// Emits a workspace-pointer adjustment.
    pub fn ws_adjust(&mut self, words: i64) {
        self.line(&format!("wptr = LightProcAdjust (wptr, {words});"));
    }

    /// C rendering of a double constant.
    #[must_use]
    pub fn format_double(value: f64) -> String {
        let mut buf = ryu::Buffer::new();
        buf.format(value).to_owned()
    }

    /// Finishes emission, returning the file text and the optional digest
    /// (lower-hex SHA-256 of the emitted bytes).
    #[must_use]
    pub fn finish(mut self) -> (String, Option<String>) {
        if !self.line.is_empty() {
            self.end_line();
        }
        let digest = if self.want_digest {
            let mut hasher = Sha256::new();
            hasher.update(self.out.as_bytes());
            let bytes = hasher.finalize();
            Some(bytes.iter().map(|b| format!("{b:02x}")).collect())
        } else {
            None
        };
        (self.out, digest)
    }

    /// The text emitted so far (tests and dumps).
    #[must_use]
    pub fn emitted(&self) -> &str {
        &self.out
    }
}

/// Dispatches the `codegen` compop on a subtree.
///
/// Nodes without an implementation contribute nothing; constructs are
/// responsible for their own children.
pub fn codegen_subtree(comp: &mut Compiler, state: &mut PassState, node: NodeId) {
    let mut slot = node;
    if comp.call_compop(state, &mut slot, CompOp::Codegen).is_none() {
        let tag = comp.tag_name_of(node).to_owned();
        state.codegen().error_count += 1;
        state.codegen().comment(&format!("no codegen for [{tag}]"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_and_indent() {
        let mut cg = CodeGen::new(Subtarget::Default, false);
        cg.line("int main (void)");
        cg.open_block();
        cg.line("return 0;");
        cg.close_block();
        let (text, digest) = cg.finish();
        assert_eq!(text, "int main (void)\n{\n\treturn 0;\n}\n");
        assert!(digest.is_none());
    }

    #[test]
    fn test_insert_filescope_lands_at_insert_point() {
        let mut cg = CodeGen::new(Subtarget::Default, false);
        cg.line("#include <cccsp.h>");
        cg.set_insert_point_here();
        cg.line("void body (void)");
        cg.proc_external("gproc_helper");
        let (text, _) = cg.finish();
        assert_eq!(
            text,
            "#include <cccsp.h>\nextern void gproc_helper (Workspace wptr);\nvoid body (void)\n"
        );
    }

    #[test]
    fn test_labels_increment() {
        let mut cg = CodeGen::new(Subtarget::Default, false);
        assert_eq!(cg.new_label(), 0);
        assert_eq!(cg.new_label(), 1);
    }

    #[test]
    fn test_digest_is_stable_hex() {
        let mut cg = CodeGen::new(Subtarget::Default, true);
        cg.line("x");
        let (_, digest) = cg.finish();
        let digest = digest.expect("digest requested");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));

        let mut cg2 = CodeGen::new(Subtarget::Default, true);
        cg2.line("x");
        let (_, digest2) = cg2.finish();
        assert_eq!(Some(digest), digest2);
    }

    #[test]
    fn test_format_double() {
        assert_eq!(CodeGen::format_double(1.5), "1.5");
        assert_eq!(CodeGen::format_double(0.25), "0.25");
    }
}
