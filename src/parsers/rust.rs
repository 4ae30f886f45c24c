//! Rust structural parser backed by `syn`.

use super::{FunctionDef, ParsedSource, StructuralParser};
use syn::visit::Visit;

pub struct RustParser;

impl StructuralParser for RustParser {
    fn language(&self) -> &'static str {
        "rust"
    }

    fn parse(&self, source: &str) -> Result<ParsedSource, String> {
        let file = syn::parse_file(source).map_err(|e| e.to_string())?;
        let mut visitor = SourceVisitor::default();
        visitor.visit_file(&file);
        Ok(ParsedSource {
            imports: visitor.imports,
            functions: visitor.functions,
        })
    }
}

#[derive(Default)]
struct SourceVisitor {
    imports: Vec<String>,
    functions: Vec<FunctionDef>,
    /// Index into `functions` while inside a fn body.
    current: Option<usize>,
}

impl SourceVisitor {
    fn enter_function(&mut self, name: String, line: usize) -> Option<usize> {
        self.functions.push(FunctionDef {
            name,
            line,
            calls: Vec::new(),
        });
        self.current.replace(self.functions.len() - 1)
    }

    fn record_call(&mut self, callee: String) {
        if let Some(idx) = self.current {
            self.functions[idx].calls.push(callee);
        }
    }
}

impl<'ast> Visit<'ast> for SourceVisitor {
    fn visit_item_use(&mut self, node: &'ast syn::ItemUse) {
        flatten_use_tree(&node.tree, &mut Vec::new(), &mut self.imports);
    }

    fn visit_item_fn(&mut self, node: &'ast syn::ItemFn) {
        let line = node.sig.ident.span().start().line;
        let previous = self.enter_function(node.sig.ident.to_string(), line);
        syn::visit::visit_item_fn(self, node);
        self.current = previous;
    }

    fn visit_impl_item_fn(&mut self, node: &'ast syn::ImplItemFn) {
        let line = node.sig.ident.span().start().line;
        let previous = self.enter_function(node.sig.ident.to_string(), line);
        syn::visit::visit_impl_item_fn(self, node);
        self.current = previous;
    }

    fn visit_expr_call(&mut self, node: &'ast syn::ExprCall) {
        if let syn::Expr::Path(expr_path) = &*node.func {
            let segments: Vec<String> = expr_path
                .path
                .segments
                .iter()
                .map(|s| s.ident.to_string())
                .collect();
            self.record_call(segments.join("."));
        }
        syn::visit::visit_expr_call(self, node);
    }

    fn visit_expr_method_call(&mut self, node: &'ast syn::ExprMethodCall) {
        let callee = match &*node.receiver {
            syn::Expr::Path(p) if p.path.segments.len() == 1 => {
                format!("{}.{}", p.path.segments[0].ident, node.method)
            }
            _ => node.method.to_string(),
        };
        self.record_call(callee);
        syn::visit::visit_expr_method_call(self, node);
    }
}

/// Flatten a use tree into dotted import paths, one per leaf.
fn flatten_use_tree(tree: &syn::UseTree, prefix: &mut Vec<String>, out: &mut Vec<String>) {
    match tree {
        syn::UseTree::Path(path) => {
            prefix.push(path.ident.to_string());
            flatten_use_tree(&path.tree, prefix, out);
            prefix.pop();
        }
        syn::UseTree::Name(name) => {
            let mut parts = prefix.clone();
            parts.push(name.ident.to_string());
            out.push(parts.join("."));
        }
        syn::UseTree::Rename(rename) => {
            let mut parts = prefix.clone();
            parts.push(rename.ident.to_string());
            out.push(parts.join("."));
        }
        syn::UseTree::Glob(_) => {
            if !prefix.is_empty() {
                out.push(prefix.join("."));
            }
        }
        syn::UseTree::Group(group) => {
            for item in &group.items {
                flatten_use_tree(item, prefix, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn parse(source: &str) -> ParsedSource {
        RustParser.parse(source).unwrap()
    }

    #[test]
    fn extracts_imports() {
        let parsed = parse(indoc! {r#"
            use crate::graph::builder;
            use serde::{Serialize, Deserialize};
            use std::collections::HashMap as Map;
        "#});
        assert!(parsed.imports.contains(&"crate.graph.builder".to_string()));
        assert!(parsed.imports.contains(&"serde.Serialize".to_string()));
        assert!(parsed.imports.contains(&"serde.Deserialize".to_string()));
        assert!(parsed
            .imports
            .contains(&"std.collections.HashMap".to_string()));
    }

    #[test]
    fn extracts_functions_and_calls() {
        let parsed = parse(indoc! {r#"
            fn handler() {
                process();
                db.query();
            }

            fn process() {}
        "#});
        let names: Vec<_> = parsed.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["handler", "process"]);
        assert_eq!(parsed.functions[0].calls, vec!["process", "db.query"]);
        assert!(parsed.functions[1].calls.is_empty());
    }

    #[test]
    fn extracts_impl_methods() {
        let parsed = parse(indoc! {r#"
            struct Store;
            impl Store {
                fn save(&self) {
                    write_file();
                }
            }
        "#});
        assert_eq!(parsed.functions[0].name, "save");
        assert_eq!(parsed.functions[0].calls, vec!["write_file"]);
    }

    #[test]
    fn rejects_invalid_source() {
        assert!(RustParser.parse("fn broken( {").is_err());
    }

    #[test]
    fn function_lines_are_recorded() {
        let parsed = parse("\n\nfn third_line() {}\n");
        assert_eq!(parsed.functions[0].line, 3);
    }
}
