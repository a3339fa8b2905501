//! TypeScript/TSX parser: classes, interfaces, exported functions and
//! async methods. Visibility follows `export`/`private`, not naming.

use chrono::Utc;
use codeintel_storage::{RelationType, Symbol, SymbolKind, SymbolRelation, Visibility};
use tree_sitter::{Node, Parser, Tree};

use super::{module_path_of, parse_error, ParseResult};
use crate::errors::Result;

pub struct TypeScriptParser;

fn line_range(node: &Node) -> (i64, i64) {
    (
        node.start_position().row as i64 + 1,
        node.end_position().row as i64 + 1,
    )
}

fn text<'a>(node: &Node, source: &'a str) -> &'a str {
    source.get(node.byte_range()).unwrap_or("")
}

fn is_exported(node: &Node) -> bool {
    node.parent()
        .map(|p| p.kind() == "export_statement")
        .unwrap_or(false)
}

fn has_private_modifier(node: &Node, source: &str) -> bool {
    let mut cursor = node.walk();
    node.children(&mut cursor)
        .any(|c| c.kind() == "accessibility_modifier" && text(&c, source) == "private")
}

fn jsdoc_above<'a>(node: &Node, source: &'a str) -> Option<String> {
    let anchor = if is_exported(node) { node.parent()? } else { *node };
    let prev = anchor.prev_sibling()?;
    if prev.kind() != "comment" {
        return None;
    }
    let raw = text(&prev, source);
    if !raw.starts_with("/**") {
        return None;
    }
    Some(
        raw.trim_start_matches("/**")
            .trim_end_matches("*/")
            .lines()
            .map(|l| l.trim().trim_start_matches('*').trim())
            .collect::<Vec<_>>()
            .join("\n")
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
    visibility: Visibility,
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
        visibility,
        language: "typescript".to_string(),
        file_hash: None,
        embedding: None,
        last_modified: Utc::now(),
    }
}

impl TypeScriptParser {
    fn extract(&self, source: &str, file_path: &str, tree: &Tree) -> ParseResult {
        let module_path = module_path_of(file_path);
        let mut result = ParseResult::default();
        let mut fn_spans: Vec<(i64, i64, String)> = Vec::new();
        let root = tree.root_node();
        self.walk(source, file_path, &module_path, &root, None, &mut result, &mut fn_spans);
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
            "class_declaration" => {
                if let Some(name) = self.extract_class(source, file_path, module_path, node, result) {
                    if let Some(body) = node.child_by_field_name("body") {
                        let mut cursor = body.walk();
                        for child in body.children(&mut cursor) {
                            self.walk(source, file_path, module_path, &child, Some(&name), result, fn_spans);
                        }
                    }
                }
                return;
            }
            "interface_declaration" => {
                self.extract_interface(source, file_path, module_path, node, result);
                return;
            }
            "function_declaration" => {
                if let Some(name) = self.extract_function(source, file_path, module_path, node, owner, result) {
                    let (s, e) = line_range(node);
                    fn_spans.push((s, e, name));
                }
                return;
            }
            "method_definition" => {
                if let Some(name) = self.extract_method(source, file_path, module_path, node, owner, result) {
                    let (s, e) = line_range(node);
                    fn_spans.push((s, e, name));
                }
                return;
            }
            _ => {}
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk(source, file_path, module_path, &child, owner, result, fn_spans);
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
        let doc = jsdoc_above(node, source);
        let visibility = if is_exported(node) {
            Visibility::Public
        } else {
            Visibility::Private
        };
        result.symbols.push(new_symbol(
            &name,
            SymbolKind::Struct,
            file_path,
            node,
            Some(format!("class {name}")),
            doc,
            module_path.clone(),
            visibility,
        ));

        if let Some(heritage) = node.child_by_field_name("heritage") {
            let mut cursor = heritage.walk();
            for clause in heritage.children(&mut cursor) {
                let relation_type = match clause.kind() {
                    "class_heritage" | "extends_clause" => RelationType::Extends,
                    "implements_clause" => RelationType::Implements,
                    _ => continue,
                };
                let mut cc = clause.walk();
                for ty in clause.children(&mut cc) {
                    if matches!(ty.kind(), "type_identifier" | "generic_type" | "identifier") {
                        let base = text(&ty, source).to_string();
                        result.relations.push(pending_relation(&name, &base, relation_type));
                    }
                }
            }
        }
        Some(name)
    }

    fn extract_interface(
        &self,
        source: &str,
        file_path: &str,
        module_path: &Option<String>,
        node: &Node,
        result: &mut ParseResult,
    ) {
        let name_node = match node.child_by_field_name("name") {
            Some(n) => n,
            None => return,
        };
        let name = text(&name_node, source).to_string();
        let doc = jsdoc_above(node, source);
        let visibility = if is_exported(node) {
            Visibility::Public
        } else {
            Visibility::Private
        };
        result.symbols.push(new_symbol(
            &name,
            SymbolKind::Interface,
            file_path,
            node,
            Some(format!("interface {name}")),
            doc,
            module_path.clone(),
            visibility,
        ));

        if let Some(extends) = node.child_by_field_name("extends") {
            let mut cursor = extends.walk();
            for child in extends.children(&mut cursor) {
                if matches!(child.kind(), "type_identifier" | "generic_type") {
                    let base = text(&child, source).to_string();
                    result.relations.push(pending_relation(&name, &base, RelationType::Extends));
                }
            }
        }
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
        let doc = jsdoc_above(node, source);
        let visibility = if is_exported(node) || owner.is_some() {
            Visibility::Public
        } else {
            Visibility::Private
        };
        let signature = signature_text(source, node);
        let qualified = match owner {
            Some(o) => format!("{o}.{name}"),
            None => name.clone(),
        };
        result.symbols.push(new_symbol(
            &name,
            SymbolKind::Function,
            file_path,
            node,
            Some(signature),
            doc,
            module_path.clone(),
            visibility,
        ));
        Some(qualified)
    }

    fn extract_method(
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
        if name == "constructor" {
            return None;
        }
        let doc = jsdoc_above(node, source);
        let visibility = if has_private_modifier(node, source) {
            Visibility::Private
        } else {
            Visibility::Public
        };
        let signature = signature_text(source, node);
        let qualified = match owner {
            Some(o) => format!("{o}.{name}"),
            None => name.clone(),
        };
        result.symbols.push(new_symbol(
            &name,
            SymbolKind::Method,
            file_path,
            node,
            Some(signature),
            doc,
            module_path.clone(),
            visibility,
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
            if node.kind() == "call_expression" {
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

fn pending_relation(from_name: &str, to_name: &str, relation_type: RelationType) -> SymbolRelation {
    let mut meta = serde_json::Map::new();
    meta.insert("fromName".into(), serde_json::Value::String(from_name.to_string()));
    meta.insert("toName".into(), serde_json::Value::String(to_name.to_string()));
    SymbolRelation {
        from_symbol_id: 0,
        to_symbol_id: 0,
        relation_type,
        call_site_line: None,
        metadata: Some(serde_json::Value::Object(meta)),
    }
}

fn signature_text(source: &str, node: &Node) -> String {
    let body_start = node
        .child_by_field_name("body")
        .map(|b| b.start_byte())
        .unwrap_or(node.end_byte());
    source.get(node.start_byte()..body_start).unwrap_or("").trim().to_string()
}

impl super::LanguageParser for TypeScriptParser {
    fn language(&self) -> &'static str {
        "typescript"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["ts", "tsx"]
    }

    fn parse(&self, source: &str, file_path: &str) -> Result<ParseResult> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_typescript::language_typescript())
            .map_err(|e| parse_error("typescript", file_path, e))?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| parse_error("typescript", file_path, "tree-sitter returned no tree"))?;
        Ok(self.extract(source, file_path, &tree))
    }
}
