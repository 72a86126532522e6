//! The compilation driver: front-end selection and the public entry
//! points.

use crate::{
    compiler::Compiler,
    opts::CompOpts,
    passes::{self, CodegenOutput},
    report::CompileError,
    tree::NodeId,
};

/// A registered front-end: which extensions it claims and how it reads a
/// source buffer into a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frontend {
    pub name: &'static str,
    pub extensions: &'static [&'static str],
}

/// The front-ends this build carries. Guppy is the grounding front-end;
/// the others plug in through the same registration surface.
pub const FRONTENDS: &[Frontend] = &[Frontend {
    name: "guppy",
    extensions: crate::guppy::EXTENSIONS,
}];

/// Picks a front-end by file extension.
#[must_use]
pub fn frontend_for(filename: &str) -> Option<&'static Frontend> {
    let ext = filename.rsplit_once('.').map(|(_, e)| e)?;
    FRONTENDS.iter().find(|fe| fe.extensions.contains(&ext))
}

/// Runs the pass pipeline over an already-built tree.
pub fn compile_tree(comp: &mut Compiler, root: &mut NodeId) -> Result<Option<CodegenOutput>, CompileError> {
    passes::run_pipeline(comp, root)
}

/// Compiles a source buffer end to end: front-end read, pass pipeline,
/// C emission.
///
/// Returns the context (for diagnostics) alongside the result, so callers
/// can render everything the pipeline reported.
pub fn compile_source(
    filename: &str,
    src: &str,
    opts: CompOpts,
) -> (Compiler, Result<Option<CodegenOutput>, CompileError>) {
    let Some(frontend) = frontend_for(filename) else {
        let comp = Compiler::new(opts);
        return (
            comp,
            Err(CompileError::UnknownExtension {
                filename: filename.to_owned(),
            }),
        );
    };
    debug_assert_eq!(frontend.name, "guppy");

    let mut comp = Compiler::new_guppy(opts);
    let file = comp.files.open(filename);
    let mut root = crate::guppy::parse::parse_module(&mut comp, src, file);
    if comp.reporter.error_count() > 0 {
        let count = comp.reporter.error_count();
        return (comp, Err(CompileError::ErrorsReported { pass: "parse", count }));
    }
    let result = passes::run_pipeline(&mut comp, &mut root);
    (comp, result)
}

/// Compiles a file on disk, writing the C output next to it (or to
/// `output` when given). Returns the rendered diagnostics.
pub fn compile_file(filename: &str, output: Option<&str>, opts: CompOpts) -> Result<String, CompileError> {
    let src =
        std::fs::read_to_string(filename).map_err(|e| CompileError::External(format!("{filename}: {e}")))?;
    let (comp, result) = compile_source(filename, &src, opts);
    let diagnostics = comp.reporter.render_all(&comp.files);
    match result {
        Ok(Some(out)) => {
            let out_path = output.map_or_else(|| format!("{}.c", filename.trim_end_matches(".gpp")), str::to_owned);
            std::fs::write(&out_path, out.c_code).map_err(|e| CompileError::External(format!("{out_path}: {e}")))?;
            Ok(diagnostics)
        }
        Ok(None) => Ok(diagnostics),
        Err(err) => {
            if diagnostics.is_empty() {
                Err(err)
            } else {
                Err(CompileError::External(format!("{diagnostics}{err}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frontend_selection_by_extension() {
        assert_eq!(frontend_for("prog.gpp").map(|f| f.name), Some("guppy"));
        assert_eq!(frontend_for("inc.gpi").map(|f| f.name), Some("guppy"));
        assert_eq!(frontend_for("prog.occ"), None);
        assert_eq!(frontend_for("noext"), None);
    }
}
