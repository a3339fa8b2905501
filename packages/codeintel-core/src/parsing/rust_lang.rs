//! Rust parser: structs, traits, impl blocks and their functions.
//! Visibility follows `pub`, not naming convention.

use chrono::Utc;
use codeintel_storage::{RelationType, Symbol, SymbolKind, SymbolRelation, Visibility};
use tree_sitter::{Node, Parser, Tree};

use super::{module_path_of, parse_error, ParseResult};
use crate::errors::Result;

pub struct RustParser;

fn line_range(node: &Node) -> (i64, i64) {
    (
        node.start_position().row as i64 + 1,
        node.end_position().row as i64 + 1,
    )
}

fn text<'a>(node: &Node, source: &'a str) -> &'a str {
    source.get(node.byte_range()).unwrap_or("")
}

fn is_pub(node: &Node, source: &str) -> bool {
    let mut cursor = node.walk();
    node.children(&mut cursor)
        .any(|c| c.kind() == "visibility_modifier" && text(&c, source).starts_with("pub"))
}

fn doc_comment_above<'a>(node: &Node, source: &'a str) -> Option<String> {
    let mut prev = node.prev_sibling()?;
    let mut lines = Vec::new();
    loop {
        if prev.kind() != "line_comment" && prev.kind() != "block_comment" {
            break;
        }
        let raw = text(&prev, source);
        if !raw.starts_with("///") && !raw.starts_with("/**") {
            break;
        }
        lines.push(raw.trim_start_matches("///").trim_start_matches("/**").trim_end_matches("*/").trim().to_string());
        match prev.prev_sibling() {
            Some(p) if p.end_position().row + 1 == prev.start_position().row => prev = p,
            _ => break,
        }
    }
    if lines.is_empty() {
        None
    } else {
        lines.reverse();
        Some(lines.join("\n"))
    }
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
        language: "rust".to_string(),
        file_hash: None,
        embedding: None,
        last_modified: Utc::now(),
    }
}

impl RustParser {
    fn extract(&self, source: &str, file_path: &str, tree: &Tree) -> ParseResult {
        let module_path = module_path_of(file_path);
        let mut result = ParseResult::default();
        let mut fn_spans: Vec<(i64, i64, String)> = Vec::new();
        let root = tree.root_node();
        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            self.walk_top_level(source, file_path, &module_path, &child, &mut result, &mut fn_spans);
        }
        self.extract_calls(source, &root, &fn_spans, &mut result);
        result
    }

    fn walk_top_level(
        &self,
        source: &str,
        file_path: &str,
        module_path: &Option<String>,
        node: &Node,
        result: &mut ParseResult,
        fn_spans: &mut Vec<(i64, i64, String)>,
    ) {
        match node.kind() {
            "struct_item" => self.extract_struct(source, file_path, module_path, node, result),
            "trait_item" => self.extract_trait(source, file_path, module_path, node, result),
            "impl_item" => self.extract_impl(source, file_path, module_path, node, result, fn_spans),
            "function_item" => {
                if let Some(name) = self.extract_function(source, file_path, module_path, node, None, result) {
                    let (s, e) = line_range(node);
                    fn_spans.push((s, e, name));
                }
            }
            "mod_item" => {
                if let Some(body) = node.child_by_field_name("body") {
                    let mut cursor = body.walk();
                    for child in body.children(&mut cursor) {
                        self.walk_top_level(source, file_path, module_path, &child, result, fn_spans);
                    }
                }
            }
            _ => {}
        }
    }

    fn extract_struct(
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
        let doc = doc_comment_above(node, source);
        let visibility = if is_pub(node, source) { Visibility::Public } else { Visibility::Private };
        result.symbols.push(new_symbol(
            &name,
            SymbolKind::Struct,
            file_path,
            node,
            Some(format!("struct {name}")),
            doc,
            module_path.clone(),
            visibility,
        ));

        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for field in body.children(&mut cursor) {
                if field.kind() != "field_declaration" {
                    continue;
                }
                if let Some(field_name) = field.child_by_field_name("name") {
                    let fname = text(&field_name, source).to_string();
                    let fvis = if is_pub(&field, source) { Visibility::Public } else { Visibility::Private };
                    result.symbols.push(new_symbol(
                        &fname,
                        SymbolKind::Field,
                        file_path,
                        &field,
                        Some(format!("{name}.{fname}")),
                        None,
                        module_path.clone(),
                        fvis,
                    ));
                }
            }
        }
    }

    fn extract_trait(
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
        let doc = doc_comment_above(node, source);
        let visibility = if is_pub(node, source) { Visibility::Public } else { Visibility::Private };
        result.symbols.push(new_symbol(
            &name,
            SymbolKind::Interface,
            file_path,
            node,
            Some(format!("trait {name}")),
            doc,
            module_path.clone(),
            visibility,
        ));

        if let Some(bounds) = node.child_by_field_name("bounds") {
            let mut cursor = bounds.walk();
            for b in bounds.children(&mut cursor) {
                if b.kind() == "type_identifier" {
                    let base = text(&b, source).to_string();
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

        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for child in body.children(&mut cursor) {
                if child.kind() == "function_signature_item" || child.kind() == "function_item" {
                    if let Some(fname_node) = child.child_by_field_name("name") {
                        let fname = text(&fname_node, source).to_string();
                        result.symbols.push(new_symbol(
                            &fname,
                            SymbolKind::Method,
                            file_path,
                            &child,
                            Some(format!("{name}.{fname}")),
                            None,
                            module_path.clone(),
                            Visibility::Public,
                        ));
                    }
                }
            }
        }
    }

    fn extract_impl(
        &self,
        source: &str,
        file_path: &str,
        module_path: &Option<String>,
        node: &Node,
        result: &mut ParseResult,
        fn_spans: &mut Vec<(i64, i64, String)>,
    ) {
        let type_node = match node.child_by_field_name("type") {
            Some(n) => n,
            None => return,
        };
        let owner = text(&type_node, source).to_string();

        if let Some(trait_node) = node.child_by_field_name("trait") {
            let trait_name = text(&trait_node, source).to_string();
            let mut meta = serde_json::Map::new();
            meta.insert("fromName".into(), serde_json::Value::String(owner.clone()));
            meta.insert("toName".into(), serde_json::Value::String(trait_name));
            result.relations.push(SymbolRelation {
                from_symbol_id: 0,
                to_symbol_id: 0,
                relation_type: RelationType::Implements,
                call_site_line: None,
                metadata: Some(serde_json::Value::Object(meta)),
            });
        }

        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for child in body.children(&mut cursor) {
                if child.kind() == "function_item" {
                    if let Some(qualified) =
                        self.extract_function(source, file_path, module_path, &child, Some(&owner), result)
                    {
                        let (s, e) = line_range(&child);
                        fn_spans.push((s, e, qualified));
                    }
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
        let doc = doc_comment_above(node, source);
        let visibility = if is_pub(node, source) { Visibility::Public } else { Visibility::Private };
        let has_self = node
            .child_by_field_name("parameters")
            .map(|p| {
                let inner = text(&p, source).trim_start_matches('(');
                inner.trim_start().starts_with("self") || inner.contains("&self") || inner.contains("&mut self")
            })
            .unwrap_or(false);
        let kind = if owner.is_some() && has_self { SymbolKind::Method } else { SymbolKind::Function };
        let signature = signature_text(source, node);
        let qualified = match owner {
            Some(o) => format!("{o}::{name}"),
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

fn signature_text(source: &str, node: &Node) -> String {
    let body_start = node
        .child_by_field_name("body")
        .map(|b| b.start_byte())
        .unwrap_or(node.end_byte());
    source.get(node.start_byte()..body_start).unwrap_or("").trim().to_string()
}

impl super::LanguageParser for RustParser {
    fn language(&self) -> &'static str {
        "rust"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["rs"]
    }

    fn parse(&self, source: &str, file_path: &str) -> Result<ParseResult> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_rust::language())
            .map_err(|e| parse_error("rust", file_path, e))?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| parse_error("rust", file_path, "tree-sitter returned no tree"))?;
        Ok(self.extract(source, file_path, &tree))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::LanguageParser;

    #[test]
    fn test_extract_pub_struct_with_fields() {
        let source = "pub struct User {\n    pub id: i64,\n    name: String,\n}\n";
        let result = RustParser.parse(source, "user.rs").unwrap();
        let s = result.symbols.iter().find(|s| s.name == "User").unwrap();
        assert_eq!(s.kind, SymbolKind::Struct);
        assert_eq!(s.visibility, Visibility::Public);
        let id_field = result.symbols.iter().find(|s| s.name == "id").unwrap();
        assert_eq!(id_field.visibility, Visibility::Public);
        let name_field = result.symbols.iter().find(|s| s.name == "name").unwrap();
        assert_eq!(name_field.visibility, Visibility::Private);
    }

    #[test]
    fn test_extract_trait() {
        let source = "pub trait Greet {\n    fn hello(&self) -> String;\n}\n";
        let result = RustParser.parse(source, "greet.rs").unwrap();
        assert!(result.symbols.iter().any(|s| s.name == "Greet" && s.kind == SymbolKind::Interface));
    }

    #[test]
    fn test_extract_impl_methods() {
        let source = "struct Foo;\n\nimpl Foo {\n    pub fn bar(&self) {}\n}\n";
        let result = RustParser.parse(source, "foo.rs").unwrap();
        let m = result.symbols.iter().find(|s| s.name == "bar").unwrap();
        assert_eq!(m.kind, SymbolKind::Method);
        assert_eq!(m.signature.as_deref(), Some("pub fn bar(&self)"));
    }

    #[test]
    fn test_trait_impl_relation() {
        let source = "struct Foo;\ntrait Bar {}\n\nimpl Bar for Foo {}\n";
        let result = RustParser.parse(source, "foo.rs").unwrap();
        assert!(result.relations.iter().any(|r| r.relation_type == RelationType::Implements));
    }

    #[test]
    fn test_private_function_default() {
        let source = "fn helper() {}\n";
        let result = RustParser.parse(source, "x.rs").unwrap();
        let f = result.symbols.iter().find(|s| s.name == "helper").unwrap();
        assert_eq!(f.visibility, Visibility::Private);
    }
}
