//! Strict structural parse via the native tree-sitter Python grammar.
//!
//! Succeeds only when the parse tree is completely free of error and
//! missing nodes; any recovery the grammar performed internally counts as
//! failure here, so that `Fidelity::Exact` really means "valid as-is".

use tree_sitter::Node;

use crate::models::{
    BindingEntry, Fidelity, FunctionEntry, ImportEntry, StructuralModel, TypeEntry,
};

/// Why the strict stage rejected the text.
#[derive(Clone, Debug)]
pub struct StrictFailure {
    pub line: u32,
    pub message: String,
}

/// Attempt an exact structural parse. Returns `Err` on the first syntax
/// error so the chain can fall back to the token stage.
pub fn parse_exact(text: &str) -> Result<StructuralModel, StrictFailure> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| StrictFailure {
            line: 1,
            message: format!("grammar unavailable: {e}"),
        })?;

    let tree = parser.parse(text.as_bytes(), None).ok_or(StrictFailure {
        line: 1,
        message: "parser produced no tree".to_string(),
    })?;

    let root = tree.root_node();
    if root.has_error() {
        let (line, message) = first_error(root);
        return Err(StrictFailure { line, message });
    }

    let mut extractor = Extractor {
        source: text.as_bytes(),
        model: StructuralModel {
            imports: vec![],
            functions: vec![],
            types: vec![],
            bindings: vec![],
            diagnostics: vec![],
            fidelity: Fidelity::Exact,
            line_count: text.lines().count() as u32,
        },
    };
    extractor.walk(root, 0, None);
    Ok(extractor.model)
}

/// Locate the first ERROR or missing node for the failure report.
fn first_error(root: Node<'_>) -> (u32, String) {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() {
            return (
                node.start_position().row as u32 + 1,
                "syntax error".to_string(),
            );
        }
        if node.is_missing() {
            return (
                node.start_position().row as u32 + 1,
                format!("missing {}", node.kind()),
            );
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        // Reverse so the leftmost error is found first.
        for child in children.into_iter().rev() {
            if child.has_error() || child.is_missing() {
                stack.push(child);
            }
        }
    }
    (1, "syntax error".to_string())
}

struct Extractor<'a> {
    source: &'a [u8],
    model: StructuralModel,
}

impl Extractor<'_> {
    fn text(&self, node: Node<'_>) -> String {
        node.utf8_text(self.source).unwrap_or_default().to_string()
    }

    /// Recursive CST walk. `depth` counts enclosing function/class blocks;
    /// `class_index` points at the innermost enclosing type entry.
    fn walk(&mut self, node: Node<'_>, depth: u32, class_index: Option<usize>) {
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        for child in children {
            match child.kind() {
                "import_statement" => self.collect_import(child),
                "import_from_statement" => self.collect_from_import(child),
                "function_definition" => {
                    let name = child
                        .child_by_field_name("name")
                        .map(|n| self.text(n))
                        .unwrap_or_default();
                    // `class_index` is only propagated into the class body
                    // itself, so Some(_) here means a direct member.
                    if let Some(idx) = class_index {
                        self.model.types[idx].methods.push(name.clone());
                    }
                    self.model.functions.push(FunctionEntry {
                        parameters: child
                            .child_by_field_name("parameters")
                            .map(|p| self.parameter_names(p))
                            .unwrap_or_default(),
                        name,
                        start_line: child.start_position().row as u32 + 1,
                        end_line: child.end_position().row as u32 + 1,
                        depth,
                    });
                    if let Some(body) = child.child_by_field_name("body") {
                        self.walk(body, depth + 1, None);
                    }
                }
                "class_definition" => {
                    let name = child
                        .child_by_field_name("name")
                        .map(|n| self.text(n))
                        .unwrap_or_default();
                    self.model.types.push(TypeEntry {
                        name,
                        methods: vec![],
                        start_line: child.start_position().row as u32 + 1,
                        end_line: child.end_position().row as u32 + 1,
                        depth,
                    });
                    let idx = self.model.types.len() - 1;
                    if let Some(body) = child.child_by_field_name("body") {
                        self.walk(body, depth + 1, Some(idx));
                    }
                }
                "expression_statement" if depth == 0 => {
                    self.collect_binding(child);
                    self.walk(child, depth, class_index);
                }
                "decorated_definition" => self.walk(child, depth, class_index),
                _ => self.walk(child, depth, class_index),
            }
        }
    }

    fn parameter_names(&self, params: Node<'_>) -> Vec<String> {
        let mut names = Vec::new();
        let mut cursor = params.walk();
        for child in params.children(&mut cursor) {
            match child.kind() {
                "identifier" => names.push(self.text(child)),
                "typed_parameter" | "list_splat_pattern" | "dictionary_splat_pattern" => {
                    if let Some(ident) = self.find_identifier(child) {
                        names.push(ident);
                    }
                }
                "default_parameter" | "typed_default_parameter" => {
                    if let Some(name) = child.child_by_field_name("name") {
                        names.push(self.text(name));
                    }
                }
                _ => {}
            }
        }
        names
    }

    fn find_identifier(&self, node: Node<'_>) -> Option<String> {
        if node.kind() == "identifier" {
            return Some(self.text(node));
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        children.into_iter().find_map(|c| self.find_identifier(c))
    }

    /// `import a.b`, `import a.b as c`, comma-separated lists.
    fn collect_import(&mut self, node: Node<'_>) {
        let line = node.start_position().row as u32 + 1;
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "dotted_name" => {
                    let module = self.text(child);
                    // `import a.b` binds the head segment.
                    let bound = module.split('.').next().unwrap_or(&module).to_string();
                    self.model.imports.push(ImportEntry {
                        module,
                        bound_name: bound,
                        line,
                    });
                }
                "aliased_import" => {
                    let module = child
                        .child_by_field_name("name")
                        .map(|n| self.text(n))
                        .unwrap_or_default();
                    let bound = child
                        .child_by_field_name("alias")
                        .map(|n| self.text(n))
                        .unwrap_or_else(|| module.clone());
                    self.model.imports.push(ImportEntry {
                        module,
                        bound_name: bound,
                        line,
                    });
                }
                _ => {}
            }
        }
    }

    /// `from a.b import x, y as z`, relative forms, wildcard.
    fn collect_from_import(&mut self, node: Node<'_>) {
        let line = node.start_position().row as u32 + 1;
        let module = node
            .child_by_field_name("module_name")
            .map(|n| self.text(n))
            .unwrap_or_default();
        let mut cursor = node.walk();
        let mut past_import_kw = false;
        for child in node.children(&mut cursor) {
            if child.kind() == "import" {
                past_import_kw = true;
                continue;
            }
            if !past_import_kw {
                continue;
            }
            match child.kind() {
                "dotted_name" => {
                    let bound = self.text(child);
                    self.model.imports.push(ImportEntry {
                        module: module.clone(),
                        bound_name: bound,
                        line,
                    });
                }
                "aliased_import" => {
                    let bound = child
                        .child_by_field_name("alias")
                        .map(|n| self.text(n))
                        .unwrap_or_default();
                    self.model.imports.push(ImportEntry {
                        module: module.clone(),
                        bound_name: bound,
                        line,
                    });
                }
                "wildcard_import" => {
                    self.model.imports.push(ImportEntry {
                        module: module.clone(),
                        bound_name: "*".to_string(),
                        line,
                    });
                }
                _ => {}
            }
        }
    }

    /// Module-level `name = ...` assignments (single targets only).
    fn collect_binding(&mut self, stmt: Node<'_>) {
        let mut cursor = stmt.walk();
        for child in stmt.children(&mut cursor) {
            if child.kind() != "assignment" {
                continue;
            }
            if let Some(left) = child.child_by_field_name("left") {
                if left.kind() == "identifier" {
                    self.model.bindings.push(BindingEntry {
                        name: self.text(left),
                        line: left.start_position().row as u32 + 1,
                    });
                }
            }
        }
    }
}
