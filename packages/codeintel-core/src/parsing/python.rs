//! Python parser: top-level functions, classes and methods, with
//! docstrings captured as `doc_comment`.

use chrono::Utc;
use codeintel_storage::{RelationType, Symbol, SymbolKind, SymbolRelation, Visibility};
use tree_sitter::{Node, Parser, Tree};

use super::{module_path_of, parse_error, ParseResult};
use crate::errors::Result;

pub struct PythonParser;

fn line_range(node: &Node) -> (i64, i64) {
    (
        node.start_position().row as i64 + 1,
        node.end_position().row as i64 + 1,
    )
}

fn text<'a>(node: &Node, source: &'a str) -> &'a str {
    source.get(node.byte_range()).unwrap_or("")
}

fn visibility_of(name: &str) -> Visibility {
    if name.starts_with('_') {
        Visibility::Private
    } else {
        Visibility::Public
    }
}

fn docstring_of(node: &Node, source: &str) -> Option<String> {
    let body = node.child_by_field_name("body")?;
    let mut cursor = body.walk();
    let first = body.children(&mut cursor).next()?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string_node = first.named_child(0)?;
    if string_node.kind() != "string" {
        return None;
    }
    let raw = text(&string_node, source);
    Some(
        raw.trim_matches(|c| c == '"' || c == '\'')
            .trim()
            .to_string(),
    )
}

fn new_symbol(
    name: &str,
    kind: SymbolKind,
    file_path: &str,
    node: &Node,
    signature: Option<String>,
    doc_comment: Option<String>,
    module_path: Option<String>,
) -> Symbol {
    let (start_line, end_line) = line_range(node);
    Symbol {
        id: 0,
        name: name.to_string(),
        kind,
        file_path: file_path.to_string(),
        start_line,
        end_line,
        signature,
        doc_comment,
        module_path,
        visibility: visibility_of(name),
        language: "python".to_string(),
        file_hash: None,
        embedding: None,
        last_modified: Utc::now(),
    }
}

impl PythonParser {
    fn extract(&self, source: &str, file_path: &str, tree: &Tree) -> ParseResult {
        let module_path = module_path_of(file_path);
        let mut result = ParseResult::default();
        let mut fn_spans: Vec<(i64, i64, String)> = Vec::new();
        let root = tree.root_node();
        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            self.walk(source, file_path, &module_path, &child, None, &mut result, &mut fn_spans);
        }
        self.extract_calls(source, &root, &fn_spans, &mut result);
        result
    }

    fn walk(
        &self,
        source: &str,
        file_path: &str,
        module_path: &Option<String>,
        node: &Node,
        owner: Option<&str>,
        result: &mut ParseResult,
        fn_spans: &mut Vec<(i64, i64, String)>,
    ) {
        match node.kind() {
            "class_definition" => {
                if let Some(name) = self.extract_class(source, file_path, module_path, node, result) {
                    if let Some(body) = node.child_by_field_name("body") {
                        let mut cursor = body.walk();
                        for child in body.children(&mut cursor) {
                            self.walk(source, file_path, module_path, &child, Some(&name), result, fn_spans);
                        }
                    }
                }
            }
            "function_definition" => {
                if let Some(qualified) = self.extract_function(source, file_path, module_path, node, owner, result) {
                    let (s, e) = line_range(node);
                    fn_spans.push((s, e, qualified));
                }
            }
            "decorated_definition" => {
                if let Some(def) = node.child_by_field_name("definition") {
                    self.walk(source, file_path, module_path, &def, owner, result, fn_spans);
                }
            }
            _ => {}
        }
    }

    fn extract_class(
        &self,
        source: &str,
        file_path: &str,
        module_path: &Option<String>,
        node: &Node,
        result: &mut ParseResult,
    ) -> Option<String> {
        let name_node = node.child_by_field_name("name")?;
        let name = text(&name_node, source).to_string();
        let doc = docstring_of(node, source);
        result.symbols.push(new_symbol(
            &name,
            SymbolKind::Struct,
            file_path,
            node,
            Some(format!("class {name}")),
            doc,
            module_path.clone(),
        ));

        if let Some(superclasses) = node.child_by_field_name("superclasses") {
            let mut cursor = superclasses.walk();
            for arg in superclasses.children(&mut cursor) {
                if arg.kind() == "identifier" {
                    let base = text(&arg, source).to_string();
                    let mut meta = serde_json::Map::new();
                    meta.insert("fromName".into(), serde_json::Value::String(name.clone()));
                    meta.insert("toName".into(), serde_json::Value::String(base));
                    result.relations.push(SymbolRelation {
                        from_symbol_id: 0,
                        to_symbol_id: 0,
                        relation_type: RelationType::Extends,
                        call_site_line: None,
                        metadata: Some(serde_json::Value::Object(meta)),
                    });
                }
            }
        }
        Some(name)
    }

    fn extract_function(
        &self,
        source: &str,
        file_path: &str,
        module_path: &Option<String>,
        node: &Node,
        owner: Option<&str>,
        result: &mut ParseResult,
    ) -> Option<String> {
        let name_node = node.child_by_field_name("name")?;
        let name = text(&name_node, source).to_string();
        let doc = docstring_of(node, source);
        let kind = if owner.is_some() { SymbolKind::Method } else { SymbolKind::Function };
        let signature = signature_text(source, node);
        let qualified = match owner {
            Some(o) => format!("{o}.{name}"),
            None => name.clone(),
        };
        result.symbols.push(new_symbol(
            &name,
            kind,
            file_path,
            node,
            Some(signature),
            doc,
            module_path.clone(),
        ));
        Some(qualified)
    }

    fn extract_calls(
        &self,
        source: &str,
        root: &Node,
        fn_spans: &[(i64, i64, String)],
        result: &mut ParseResult,
    ) {
        let mut stack = vec![*root];
        while let Some(node) = stack.pop() {
            if node.kind() == "call" {
                if let Some(func) = node.child_by_field_name("function") {
                    let callee = text(&func, source).to_string();
                    let line = node.start_position().row as i64 + 1;
                    if let Some((_, _, caller)) = fn_spans.iter().find(|(s, e, _)| line >= *s && line <= *e) {
                        let mut meta = serde_json::Map::new();
                        meta.insert("callerName".into(), serde_json::Value::String(caller.clone()));
                        meta.insert("calleeName".into(), serde_json::Value::String(callee));
                        result.relations.push(SymbolRelation {
                            from_symbol_id: 0,
                            to_symbol_id: 0,
                            relation_type: RelationType::Calls,
                            call_site_line: Some(line),
                            metadata: Some(serde_json::Value::Object(meta)),
                        });
                    }
                }
            }
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                stack.push(child);
            }
        }
    }
}

fn signature_text(source: &str, node: &Node) -> String {
    let body_start = node
        .child_by_field_name("body")
        .map(|b| b.start_byte())
        .unwrap_or(node.end_byte());
    source.get(node.start_byte()..body_start).unwrap_or("").trim_end_matches(':').trim().to_string()
}

impl super::LanguageParser for PythonParser {
    fn language(&self) -> &'static str {
        "python"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py"]
    }

    fn parse(&self, source: &str, file_path: &str) -> Result<ParseResult> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::language())
            .map_err(|e| parse_error("python", file_path, e))?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| parse_error("python", file_path, "tree-sitter returned no tree"))?;
        Ok(self.extract(source, file_path, &tree))
    }
}
