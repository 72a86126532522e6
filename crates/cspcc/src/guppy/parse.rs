//! A small recursive-descent reader for the Guppy subset the tests and the
//! CLI drive end-to-end.
//!
//! The grammar is deliberately compact; anything it can't shape is an
//! ordinary reported error, never a panic. The reader produces raw trees —
//! names stay raw until the scope pass binds them.

use crate::{
    compiler::Compiler,
    lexer::{TokenBuffer, TokenKind, VecSource},
    origin::{LexFileId, Origin},
    report::Severity,
    tree::{Hook, NodeId},
};

use super::lexer::tokenize;

/// Reads a module: a list of definitions.
///
/// Lexes `src`, reports tokenizer and shape errors against `file`, and
/// returns the module list node (even when errors were reported, so the
/// driver can keep surfacing further diagnostics).
pub fn parse_module(comp: &mut Compiler, src: &str, file: LexFileId) -> NodeId {
    let out = tokenize(src, file);
    for (line, message) in out.errors {
        // unexpected end-of-file can be downgraded for include-style inputs
        let severity = if comp.opts.lenient_eof && message.starts_with("unterminated") {
            Severity::Warning
        } else {
            Severity::Error
        };
        comp.report(severity, Some(Origin::new(file, line)), message);
    }
    let end_origin = Origin::new(file, 1);
    let mut p = Parser {
        toks: TokenBuffer::new(VecSource::new(out.tokens, end_origin)),
    };

    let module = comp.new_list(Origin::new(file, 1));
    loop {
        p.skip_blank(comp);
        let tok = p.toks.peek();
        if tok.is_end() {
            break;
        }
        if matches!(&tok.kind, TokenKind::Keyword(k) if k == "def") {
            if let Some(def) = p.parse_def(comp) {
                comp.list_add(module, def);
            }
        } else {
            comp.report(
                Severity::Error,
                Some(tok.origin),
                format!("expected a definition, found {}", describe(&tok.kind)),
            );
            p.skip_line();
        }
    }
    module
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Keyword(k) => format!("keyword [{k}]"),
        TokenKind::Name(n) => format!("name [{n}]"),
        TokenKind::Symbol(s) => format!("symbol [{s}]"),
        other => format!("{other}"),
    }
}

struct Parser {
    toks: TokenBuffer<VecSource>,
}

impl Parser {
    fn skip_blank(&mut self, _comp: &mut Compiler) {
        loop {
            let tok = self.toks.next();
            match tok.kind {
                TokenKind::Newline | TokenKind::Comment => {}
                _ => {
                    self.toks.push_back(tok);
                    return;
                }
            }
        }
    }

    fn skip_line(&mut self) {
        loop {
            let tok = self.toks.next();
            if matches!(tok.kind, TokenKind::Newline | TokenKind::End) {
                return;
            }
        }
    }

    fn expect_symbol(&mut self, comp: &mut Compiler, sym: &str) -> bool {
        let tok = self.toks.next();
        if matches!(&tok.kind, TokenKind::Symbol(s) if s == sym) {
            true
        } else {
            comp.report(
                Severity::Error,
                Some(tok.origin),
                format!("expected [{sym}], found {}", describe(&tok.kind)),
            );
            self.toks.push_back(tok);
            false
        }
    }

    fn accept_symbol(&mut self, sym: &str) -> bool {
        self.toks.accept(&TokenKind::Symbol(sym.to_owned()))
    }

    fn accept_keyword(&mut self, kw: &str) -> bool {
        self.toks.accept(&TokenKind::Keyword(kw.to_owned()))
    }

    fn rawname(&self, comp: &mut Compiler, ident: &str, org: Origin) -> NodeId {
        let gup = comp.gup();
        let node = comp.new_node(gup.rawname, org);
        comp.set_hook(node, 0, Some(Hook::Text(ident.to_owned())));
        node
    }

    /// `type := int | bool | byte | real | string | timer | chan [ (type) ]`
    fn parse_type(&mut self, comp: &mut Compiler) -> Option<NodeId> {
        let gup = comp.gup();
        let tok = self.toks.next();
        let org = tok.origin;
        let TokenKind::Keyword(kw) = &tok.kind else {
            self.toks.push_back(tok);
            return None;
        };
        let tag = match kw.as_str() {
            "int" => gup.int_type,
            "bool" => gup.bool_type,
            "byte" => gup.byte_type,
            "real" => gup.real_type,
            "string" => gup.string_type,
            "timer" => gup.timer_type,
            "chan" => {
                let protocol = if self.accept_symbol("(") {
                    let p = self.parse_type(comp);
                    self.expect_symbol(comp, ")");
                    p
                } else {
                    None
                };
                return Some(super::new_chantype(comp, protocol, org));
            }
            _ => {
                self.toks.push_back(tok);
                return None;
            }
        };
        Some(comp.new_node(tag, org))
    }

    /// `def NAME (params) [-> type {, type}] NEWLINE INDENT body OUTDENT`
    fn parse_def(&mut self, comp: &mut Compiler) -> Option<NodeId> {
        let gup = comp.gup();
        let def_tok = self.toks.next(); // the `def` keyword
        let org = def_tok.origin;

        let name_tok = self.toks.next();
        let TokenKind::Name(ident) = &name_tok.kind else {
            comp.report(
                Severity::Error,
                Some(name_tok.origin),
                format!("expected a definition name, found {}", describe(&name_tok.kind)),
            );
            self.skip_line();
            return None;
        };
        let ident = ident.clone();
        let name = self.rawname(comp, &ident, name_tok.origin);

        self.expect_symbol(comp, "(");
        let params = comp.new_list(org);
        if !self.accept_symbol(")") {
            loop {
                if let Some(param) = self.parse_param(comp) {
                    comp.list_add(params, param);
                }
                if !self.accept_symbol(",") {
                    break;
                }
            }
            self.expect_symbol(comp, ")");
        }

        let results = comp.new_list(org);
        if self.accept_symbol("->") {
            loop {
                match self.parse_type(comp) {
                    Some(t) => comp.list_add(results, t),
                    None => {
                        let tok = self.toks.peek();
                        comp.report(Severity::Error, Some(tok.origin), "expected a result type".to_owned());
                        break;
                    }
                }
                if !self.accept_symbol(",") {
                    break;
                }
            }
        }

        let body = self.parse_block(comp, org);
        Some(comp.create(gup.fcndef, org, &[Some(name), Some(params), Some(body), Some(results)]))
    }

    /// `param := ['var'] type NAME`
    fn parse_param(&mut self, comp: &mut Compiler) -> Option<NodeId> {
        let gup = comp.gup();
        let is_var = self.accept_keyword("var");
        let typ = self.parse_type(comp)?;
        let tok = self.toks.next();
        let TokenKind::Name(ident) = &tok.kind else {
            comp.report(
                Severity::Error,
                Some(tok.origin),
                format!("expected a parameter name, found {}", describe(&tok.kind)),
            );
            self.toks.push_back(tok);
            return None;
        };
        let name = self.rawname(comp, &ident.clone(), tok.origin);
        let param = comp.create(gup.fparam, tok.origin, &[Some(name), Some(typ)]);
        let attrs = if is_var { super::FPARAM_VAR } else { 0 };
        comp.set_hook(param, 0, Some(Hook::Const(crate::constants::ConstData::Int(attrs))));
        Some(param)
    }

    /// `NEWLINE INDENT body OUTDENT` as a process list.
    fn parse_block(&mut self, comp: &mut Compiler, org: Origin) -> NodeId {
        let list = comp.new_list(org);
        self.skip_blank(comp);
        if !self.toks.accept(&TokenKind::Indent) {
            let tok = self.toks.peek();
            comp.report(Severity::Error, Some(tok.origin), "expected an indented body".to_owned());
            return list;
        }
        loop {
            self.skip_blank(comp);
            let tok = self.toks.peek();
            if tok.is_end() || self.toks.accept(&TokenKind::Outdent) {
                break;
            }
            if let Some(stmt) = self.parse_stmt(comp) {
                comp.list_add(list, stmt);
            }
        }
        list
    }

    fn parse_stmt(&mut self, comp: &mut Compiler) -> Option<NodeId> {
        let gup = comp.gup();
        let tok = self.toks.next();
        let org = tok.origin;

        if let TokenKind::Keyword(kw) = &tok.kind {
            match kw.as_str() {
                "seq" | "par" => {
                    let tag = if kw == "seq" { gup.seq } else { gup.par };
                    let body = self.parse_block(comp, org);
                    return Some(comp.create(tag, org, &[None, Some(body)]));
                }
                "pri" => {
                    if !self.accept_keyword("alt") {
                        comp.report(Severity::Error, Some(org), "expected [alt] after [pri]".to_owned());
                        self.skip_line();
                        return None;
                    }
                    return Some(self.parse_alt(comp, org, true));
                }
                "alt" => return Some(self.parse_alt(comp, org, false)),
                "skip" => {
                    self.skip_line();
                    return Some(comp.new_node(gup.skip, org));
                }
                "stop" => {
                    self.skip_line();
                    return Some(comp.new_node(gup.stop, org));
                }
                "return" => {
                    let exprs = comp.new_list(org);
                    loop {
                        let e = self.parse_expr(comp)?;
                        comp.list_add(exprs, e);
                        if !self.accept_symbol(",") {
                            break;
                        }
                    }
                    self.skip_line();
                    return Some(comp.create(gup.ret, org, &[Some(exprs)]));
                }
                "int" | "bool" | "byte" | "real" | "string" | "timer" | "chan" => {
                    // a declaration: push the keyword back and re-read it as
                    // a type
                    self.toks.push_back(tok);
                    let typ = self.parse_type(comp)?;
                    let name_tok = self.toks.next();
                    let TokenKind::Name(ident) = &name_tok.kind else {
                        comp.report(
                            Severity::Error,
                            Some(name_tok.origin),
                            format!("expected a declaration name, found {}", describe(&name_tok.kind)),
                        );
                        self.skip_line();
                        return None;
                    };
                    let name = self.rawname(comp, &ident.clone(), name_tok.origin);
                    self.skip_line();
                    return Some(comp.create(gup.vardecl, org, &[Some(name), Some(typ), None]));
                }
                _ => {
                    comp.report(
                        Severity::Error,
                        Some(org),
                        format!("unexpected keyword [{kw}] in a process body"),
                    );
                    self.skip_line();
                    return None;
                }
            }
        }

        let TokenKind::Name(ident) = &tok.kind else {
            comp.report(Severity::Error, Some(org), format!("expected a process, found {}", describe(&tok.kind)));
            self.skip_line();
            return None;
        };
        let ident = ident.clone();
        let name = self.rawname(comp, &ident, org);

        if self.accept_symbol(":=") {
            let rhs = self.parse_expr(comp)?;
            self.skip_line();
            let tag = if self.looks_like_call(comp, rhs) { gup.sassign } else { gup.assign };
            return Some(comp.create(tag, org, &[Some(name), Some(rhs), None]));
        }
        if self.accept_symbol("!") {
            let rhs = self.parse_expr(comp)?;
            self.skip_line();
            return Some(comp.create(gup.output, org, &[Some(name), Some(rhs), None]));
        }
        if self.accept_symbol("?") {
            let target_tok = self.toks.next();
            let TokenKind::Name(target) = &target_tok.kind else {
                comp.report(Severity::Error, Some(target_tok.origin), "expected an input target".to_owned());
                self.skip_line();
                return None;
            };
            let target = self.rawname(comp, &target.clone(), target_tok.origin);
            self.skip_line();
            return Some(comp.create(gup.input, org, &[Some(name), Some(target), None]));
        }
        if self.accept_symbol("(") {
            let args = comp.new_list(org);
            if !self.accept_symbol(")") {
                loop {
                    let arg = self.parse_expr(comp)?;
                    comp.list_add(args, arg);
                    if !self.accept_symbol(",") {
                        break;
                    }
                }
                self.expect_symbol(comp, ")");
            }
            self.skip_line();
            return Some(comp.create(gup.instance, org, &[Some(name), Some(args)]));
        }
        comp.report(Severity::Error, Some(org), format!("dangling name [{ident}] in a process body"));
        self.skip_line();
        None
    }

    fn looks_like_call(&self, comp: &Compiler, node: NodeId) -> bool {
        comp.tree.tag(node) == comp.gup().instance
    }

    fn parse_alt(&mut self, comp: &mut Compiler, org: Origin, is_pri: bool) -> NodeId {
        let gup = comp.gup();
        let guards = comp.new_list(org);
        self.skip_blank(comp);
        if self.toks.accept(&TokenKind::Indent) {
            loop {
                self.skip_blank(comp);
                if self.toks.peek().is_end() || self.toks.accept(&TokenKind::Outdent) {
                    break;
                }
                if let Some(guard) = self.parse_guard(comp) {
                    comp.list_add(guards, guard);
                }
            }
        } else {
            comp.report(Severity::Error, Some(org), "expected indented guards".to_owned());
        }
        let tag = if is_pri { gup.prialt } else { gup.alt };
        comp.create(tag, org, &[Some(guards)])
    }

    /// `guard := NAME ? NAME block | skip block`
    fn parse_guard(&mut self, comp: &mut Compiler) -> Option<NodeId> {
        let gup = comp.gup();
        let tok = self.toks.next();
        let org = tok.origin;
        let action = if matches!(&tok.kind, TokenKind::Keyword(k) if k == "skip") {
            comp.new_node(gup.skip, org)
        } else if let TokenKind::Name(chan) = &tok.kind {
            let chan = self.rawname(comp, &chan.clone(), org);
            self.expect_symbol(comp, "?");
            let target_tok = self.toks.next();
            let TokenKind::Name(target) = &target_tok.kind else {
                comp.report(Severity::Error, Some(target_tok.origin), "expected an input target".to_owned());
                self.skip_line();
                return None;
            };
            let target = self.rawname(comp, &target.clone(), target_tok.origin);
            comp.create(gup.input, org, &[Some(chan), Some(target), None])
        } else {
            comp.report(Severity::Error, Some(org), format!("expected a guard, found {}", describe(&tok.kind)));
            self.skip_line();
            return None;
        };
        let body = self.parse_block(comp, org);
        let guard = comp.create(gup.guard, org, &[Some(action), Some(body)]);
        Some(guard)
    }

    fn parse_expr(&mut self, comp: &mut Compiler) -> Option<NodeId> {
        let gup = comp.gup();
        let mut lhs = self.parse_term(comp)?;
        loop {
            let tok = self.toks.next();
            let tag = match &tok.kind {
                TokenKind::Symbol(s) if s == "+" => gup.add,
                TokenKind::Symbol(s) if s == "-" => gup.sub,
                TokenKind::Symbol(s) if s == "*" => gup.mul,
                TokenKind::Symbol(s) if s == "/" => gup.div,
                TokenKind::Symbol(s) if s == "\\" => gup.rem,
                _ => {
                    self.toks.push_back(tok);
                    return Some(lhs);
                }
            };
            let org = tok.origin;
            let rhs = self.parse_term(comp)?;
            lhs = comp.create(tag, org, &[Some(lhs), Some(rhs), None]);
        }
    }

    fn parse_term(&mut self, comp: &mut Compiler) -> Option<NodeId> {
        let gup = comp.gup();
        let tok = self.toks.next();
        let org = tok.origin;
        match &tok.kind {
            TokenKind::Integer(v) => Some(super::lit::new_litint(comp, org, *v)),
            TokenKind::Real(v) => Some(super::lit::new_litreal(comp, org, *v)),
            TokenKind::Str(bytes) => {
                let bytes = bytes.clone();
                Some(super::lit::new_litstr(comp, org, bytes))
            }
            TokenKind::Keyword(k) if k == "true" => Some(super::lit::new_litbool(comp, org, true)),
            TokenKind::Keyword(k) if k == "false" => Some(super::lit::new_litbool(comp, org, false)),
            TokenKind::Symbol(s) if s == "-" => {
                let operand = self.parse_term(comp)?;
                Some(comp.create(gup.neg, org, &[Some(operand), None]))
            }
            TokenKind::Symbol(s) if s == "(" => {
                let inner = self.parse_expr(comp);
                self.expect_symbol(comp, ")");
                inner
            }
            TokenKind::Name(ident) => {
                let ident = ident.clone();
                let name = self.rawname(comp, &ident, org);
                if self.accept_symbol("(") {
                    let args = comp.new_list(org);
                    if !self.accept_symbol(")") {
                        loop {
                            let arg = self.parse_expr(comp)?;
                            comp.list_add(args, arg);
                            if !self.accept_symbol(",") {
                                break;
                            }
                        }
                        self.expect_symbol(comp, ")");
                    }
                    Some(comp.create(gup.instance, org, &[Some(name), Some(args)]))
                } else {
                    Some(name)
                }
            }
            other => {
                comp.report(Severity::Error, Some(org), format!("expected an expression, found {}", describe(other)));
                self.toks.push_back(tok);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opts::CompOpts;

    fn parse(src: &str) -> (Compiler, NodeId) {
        let mut comp = Compiler::new_guppy(CompOpts::default());
        let file = comp.files.open("test.gpp");
        let module = parse_module(&mut comp, src, file);
        (comp, module)
    }

    #[test]
    fn test_parse_simple_def() {
        let (comp, module) = parse("def main ()\n  skip\n");
        assert_eq!(comp.reporter.error_count(), 0, "{}", comp.reporter.render_all(&comp.files));
        assert_eq!(comp.list_count(module), 1);
        let def = comp.list_nth(module, 0);
        assert_eq!(comp.tag_name_of(def), "FCNDEF");
    }

    #[test]
    fn test_parse_par_with_outputs() {
        let src = "def main ()\n  chan (int) c\n  int x\n  par\n    c ! x\n    c ! 1\n";
        let (comp, module) = parse(src);
        assert_eq!(comp.reporter.error_count(), 0, "{}", comp.reporter.render_all(&comp.files));
        let def = comp.list_nth(module, 0);
        let body = comp.sub_expect(def, 2);
        // body is a raw process list before prescope/declify
        assert!(comp.is_list(body));
        assert_eq!(comp.list_count(body), 3);
    }

    #[test]
    fn test_parse_function_with_results() {
        let src = "def f (int a) -> int, int\n  return a + 1, a - 1\n";
        let (comp, module) = parse(src);
        assert_eq!(comp.reporter.error_count(), 0, "{}", comp.reporter.render_all(&comp.files));
        let def = comp.list_nth(module, 0);
        let results = comp.sub_expect(def, 3);
        assert_eq!(comp.list_count(results), 2);
    }

    #[test]
    fn test_parse_error_recovers() {
        let (comp, module) = parse("def main ()\n  ???\n  skip\n");
        assert!(comp.reporter.error_count() > 0);
        // the good statement after the bad line still parses
        let def = comp.list_nth(module, 0);
        let body = comp.sub_expect(def, 2);
        assert_eq!(comp.list_count(body), 1);
    }
}
