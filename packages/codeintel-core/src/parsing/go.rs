//! Go parser: package symbol, functions/methods with receiver, struct/interface
//! types and their fields/methods, constants/variables, doc comments, and
//! `calls` relations for textual call sites.

use chrono::Utc;
use codeintel_storage::{RelationType, Symbol, SymbolKind, SymbolRelation, Visibility};
use tree_sitter::{Node, Parser, Tree};

use super::{module_path_of, parse_error, ParseResult};
use crate::errors::Result;

pub struct GoParser;

fn is_exported(name: &str) -> bool {
    name.chars().next().map(|c| c.is_uppercase()).unwrap_or(false)
}

fn line_range(node: &Node) -> (i64, i64) {
    (
        node.start_position().row as i64 + 1,
        node.end_position().row as i64 + 1,
    )
}

fn text<'a>(node: &Node, source: &'a str) -> &'a str {
    source.get(node.byte_range()).unwrap_or("")
}

fn doc_comment_above<'a>(node: &Node, source: &'a str) -> Option<String> {
    let mut prev = node.prev_sibling()?;
    let mut lines = Vec::new();
    loop {
        if prev.kind() != "comment" {
            break;
        }
        let raw = text(&prev, source);
        if raw.starts_with("//line ") {
            break;
        }
        lines.push(raw.trim_start_matches("//").trim().to_string());
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
        visibility: if is_exported(name) {
            Visibility::Public
        } else {
            Visibility::Private
        },
        language: "go".to_string(),
        file_hash: None,
        embedding: None,
        last_modified: Utc::now(),
    }
}

impl GoParser {
    fn extract(&self, source: &str, file_path: &str, tree: &Tree) -> ParseResult {
        let module_path = module_path_of(file_path);
        let mut result = ParseResult::default();
        let root = tree.root_node();

        if let Some(pkg) = find_child(&root, "package_clause") {
            if let Some(name_node) = pkg.child_by_field_name("name").or_else(|| child_kind(&pkg, "package_identifier")) {
                let name = text(&name_node, source).to_string();
                result.symbols.push(new_symbol(
                    &name,
                    SymbolKind::Package,
                    file_path,
                    &pkg,
                    None,
                    None,
                    module_path.clone(),
                ));
            }
        }

        // line number (1-indexed) -> declaring symbol name, used to resolve
        // `calls` relations once all functions/methods are known.
        let mut fn_spans: Vec<(i64, i64, String)> = Vec::new();

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
            "type_declaration" => {
                let mut cursor = node.walk();
                for spec in node.children(&mut cursor) {
                    if spec.kind() == "type_spec" {
                        self.extract_type_spec(source, file_path, module_path, &spec, result);
                    }
                }
            }
            "function_declaration" => {
                if let Some(sym) = self.extract_function(source, file_path, module_path, node, result) {
                    let (s, e) = line_range(node);
                    fn_spans.push((s, e, sym));
                }
            }
            "method_declaration" => {
                if let Some(sym) = self.extract_method(source, file_path, module_path, node, result) {
                    let (s, e) = line_range(node);
                    fn_spans.push((s, e, sym));
                }
            }
            "const_declaration" | "var_declaration" => {
                self.extract_const_or_var(source, file_path, module_path, node, result);
            }
            _ => {}
        }
    }

    fn extract_type_spec(
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
        let type_node = node.child_by_field_name("type");
        let kind = match type_node.map(|t| t.kind()) {
            Some("struct_type") => SymbolKind::Struct,
            Some("interface_type") => SymbolKind::Interface,
            _ => SymbolKind::Type,
        };
        let doc = doc_comment_above(node.parent().as_ref().unwrap_or(node), source);
        result.symbols.push(new_symbol(
            &name,
            kind,
            file_path,
            node,
            Some(format!("type {name}")),
            doc,
            module_path.clone(),
        ));

        if let Some(type_n) = type_node {
            match type_n.kind() {
                "struct_type" => self.extract_struct_fields(source, file_path, module_path, &name, &type_n, result),
                "interface_type" => {
                    self.extract_interface_methods(source, file_path, module_path, &name, &type_n, result)
                }
                _ => {}
            }
        }
    }

    fn extract_struct_fields(
        &self,
        source: &str,
        file_path: &str,
        module_path: &Option<String>,
        owner: &str,
        struct_node: &Node,
        result: &mut ParseResult,
    ) {
        if let Some(list) = find_child(struct_node, "field_declaration_list") {
            let mut cursor = list.walk();
            for field in list.children(&mut cursor) {
                if field.kind() != "field_declaration" {
                    continue;
                }
                let mut name_cursor = field.walk();
                for name_node in field.children(&mut name_cursor) {
                    if name_node.kind() == "field_identifier" {
                        let name = text(&name_node, source).to_string();
                        result.symbols.push(new_symbol(
                            &name,
                            SymbolKind::Field,
                            file_path,
                            &name_node,
                            Some(format!("{owner}.{name}")),
                            None,
                            module_path.clone(),
                        ));
                    }
                }
            }
        }
    }

    fn extract_interface_methods(
        &self,
        source: &str,
        file_path: &str,
        module_path: &Option<String>,
        owner: &str,
        iface_node: &Node,
        result: &mut ParseResult,
    ) {
        if let Some(list) = find_child(iface_node, "method_spec_list") {
            let mut cursor = list.walk();
            for method in list.children(&mut cursor) {
                if method.kind() != "method_spec" {
                    continue;
                }
                if let Some(name_node) = method.child_by_field_name("name") {
                    let name = text(&name_node, source).to_string();
                    result.symbols.push(new_symbol(
                        &name,
                        SymbolKind::Method,
                        file_path,
                        &method,
                        Some(format!("{owner}.{name}")),
                        None,
                        module_path.clone(),
                    ));
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
        result: &mut ParseResult,
    ) -> Option<String> {
        let name_node = node.child_by_field_name("name")?;
        let name = text(&name_node, source).to_string();
        let signature = signature_text(source, node, "func");
        let doc = doc_comment_above(node, source);
        result.symbols.push(new_symbol(
            &name,
            SymbolKind::Function,
            file_path,
            node,
            Some(signature),
            doc,
            module_path.clone(),
        ));
        Some(name)
    }

    fn extract_method(
        &self,
        source: &str,
        file_path: &str,
        module_path: &Option<String>,
        node: &Node,
        result: &mut ParseResult,
    ) -> Option<String> {
        let name_node = node.child_by_field_name("name")?;
        let name = text(&name_node, source).to_string();
        let signature = signature_text(source, node, "func");
        let doc = doc_comment_above(node, source);
        result.symbols.push(new_symbol(
            &name,
            SymbolKind::Method,
            file_path,
            node,
            Some(signature),
            doc,
            module_path.clone(),
        ));
        Some(name)
    }

    fn extract_const_or_var(
        &self,
        source: &str,
        file_path: &str,
        module_path: &Option<String>,
        node: &Node,
        result: &mut ParseResult,
    ) {
        let kind = if node.kind() == "const_declaration" {
            SymbolKind::Constant
        } else {
            SymbolKind::Variable
        };
        let mut cursor = node.walk();
        for spec in node.children(&mut cursor) {
            if !matches!(spec.kind(), "const_spec" | "var_spec") {
                continue;
            }
            let mut name_cursor = spec.walk();
            for name_node in spec.children(&mut name_cursor) {
                if name_node.kind() == "identifier" {
                    let name = text(&name_node, source).to_string();
                    result.symbols.push(new_symbol(
                        &name,
                        kind,
                        file_path,
                        &name_node,
                        None,
                        None,
                        module_path.clone(),
                    ));
                }
            }
        }
    }

    fn extract_calls(
        &self,
        source: &str,
        root: &Node,
        fn_spans: &[(i64, i64, String)],
        result: &mut ParseResult,
    ) {
        // Map declaration name -> index into result.symbols for relation wiring
        // deferred to the indexer (it resolves ids after upsert); here we only
        // collect raw (caller_name, callee_name, call_site_line) triples via
        // relation metadata, which the indexer turns into `SymbolRelation`s
        // once both endpoints have ids.
        let mut stack = vec![*root];
        while let Some(node) = stack.pop() {
            if node.kind() == "call_expression" {
                if let Some(func) = node.child_by_field_name("function") {
                    let callee = text(&func, source).to_string();
                    let line = node.start_position().row as i64 + 1;
                    if let Some((_, _, caller)) = fn_spans
                        .iter()
                        .find(|(s, e, _)| line >= *s && line <= *e)
                    {
                        result.relations.push(pending_call_relation(caller, &callee, line));
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

/// A relation whose endpoints are still symbol *names*, not ids. The
/// indexer resolves names to ids (within the same file/run) before
/// persisting via `upsert_relation`. `from_symbol_id`/`to_symbol_id` are
/// placeholders (0) carrying the names in `metadata.callerName`/`calleeName`.
fn pending_call_relation(caller: &str, callee: &str, call_site_line: i64) -> SymbolRelation {
    let mut meta = serde_json::Map::new();
    meta.insert("callerName".to_string(), serde_json::Value::String(caller.to_string()));
    meta.insert("calleeName".to_string(), serde_json::Value::String(callee.to_string()));
    SymbolRelation {
        from_symbol_id: 0,
        to_symbol_id: 0,
        relation_type: RelationType::Calls,
        call_site_line: Some(call_site_line),
        metadata: Some(serde_json::Value::Object(meta)),
    }
}

fn signature_text(source: &str, node: &Node, _keyword: &str) -> String {
    let body_start = node
        .child_by_field_name("body")
        .map(|b| b.start_byte())
        .unwrap_or(node.end_byte());
    source
        .get(node.start_byte()..body_start)
        .unwrap_or("")
        .trim()
        .to_string()
}

fn find_child<'a>(node: &Node<'a>, kind: &str) -> Option<Node<'a>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).find(|c| c.kind() == kind)
}

fn child_kind<'a>(node: &Node<'a>, kind: &str) -> Option<Node<'a>> {
    find_child(node, kind)
}

impl super::LanguageParser for GoParser {
    fn language(&self) -> &'static str {
        "go"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["go"]
    }

    fn parse(&self, source: &str, file_path: &str) -> Result<ParseResult> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_go::language())
            .map_err(|e| parse_error("go", file_path, e))?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| parse_error("go", file_path, "tree-sitter returned no tree"))?;
        Ok(self.extract(source, file_path, &tree))
    }
}
