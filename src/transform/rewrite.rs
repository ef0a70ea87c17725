//! Splice-based module rewriting.
//!
//! The rewriter never regenerates code it did not touch: it produces an
//! ordered list of byte-range edits against the original source, so a
//! module with no recognized exports round-trips byte-identical and a
//! second pass over wrapped output finds nothing to do.

use smallvec::SmallVec;

use super::classify::{
    Classified, ExportBinding, ExportShape, Reexport, RecognizedExport,
};
use super::middleware;
use super::TransformConfig;

/// One byte-range splice; `start == end` is a pure insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl Edit {
    pub fn insert(at: usize, text: String) -> Self {
        Edit { start: at, end: at, text }
    }

    pub fn replace(start: usize, end: usize, text: String) -> Self {
        Edit { start, end, text }
    }

    pub fn delete(start: usize, end: usize) -> Self {
        Edit { start, end, text: String::new() }
    }
}

pub type Edits = SmallVec<[Edit; 8]>;

/// Rewrite every non-wrapped binding. Returns `None` when there is nothing
/// to change, which the caller reports as `modified: false`.
pub fn rewrite_module(
    src: &str,
    classified: &Classified,
    route_id: &str,
    config: &TransformConfig,
) -> Option<String> {
    let mut edits: Edits = SmallVec::new();
    let mut appended = String::new();
    let mut needed: Vec<RecognizedExport> = Vec::new();

    for binding in &classified.bindings {
        apply_binding(src, binding, route_id, &mut edits, &mut appended, &mut needed);
    }

    let imports = import_prefix(classified, config, &needed);

    if edits.is_empty() && appended.is_empty() && imports.is_empty() {
        return None;
    }

    if !imports.is_empty() {
        // Placed ahead of the binding edits: the sort below is stable, so
        // when a wrapped declaration also starts at byte 0 the import block
        // still lands first.
        edits.insert(0, Edit::insert(0, imports));
    }
    if !appended.is_empty() {
        let at = classified.surface.end;
        let mut text = String::new();
        if !src.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&appended);
        edits.push(Edit::insert(at, text));
    }

    Some(apply_edits(src, edits))
}

fn apply_binding(
    src: &str,
    binding: &ExportBinding,
    route_id: &str,
    edits: &mut Edits,
    appended: &mut String,
    needed: &mut Vec<RecognizedExport>,
) {
    let name = binding.name;
    let wrapper = name.wrapper_ident();

    match &binding.shape {
        ExportShape::AlreadyWrapped => {}
        ExportShape::FunctionDeclaration { local, wrap_at, body_end } => {
            needed.push(name);
            edits.push(Edit::insert(*wrap_at, format!("const {local} = {wrapper}(")));
            edits.push(Edit::insert(*body_end, format!(", \"{route_id}\");")));
        }
        ExportShape::FunctionExpression { init, .. }
        | ExportShape::ArrowFunction { init }
        | ExportShape::VariableReexport { init } => {
            needed.push(name);
            edits.push(Edit::insert(init.start, format!("{wrapper}(")));
            edits.push(Edit::insert(init.end, format!(", \"{route_id}\")")));
        }
        ExportShape::ArrayLiteral { elements, .. } => {
            if middleware::wrap_array_elements(src, name, route_id, elements, edits) {
                needed.push(name);
            }
        }
        ExportShape::ImportedReexport(Reexport::Module { module, imported, spec }) => {
            needed.push(name);
            let export_name = name.name();
            let alias = format!("_rd_orig_{export_name}");
            edits.push(Edit::delete(spec.remove.start, spec.remove.end));
            appended.push_str(&format!(
                "import {{ {imported} as {alias} }} from \"{module}\";\n\
                 export const {export_name} = {wrapper}({alias}, \"{route_id}\");\n"
            ));
        }
        ExportShape::ImportedReexport(Reexport::LocalImport { local, spec }) => {
            needed.push(name);
            let export_name = name.name();
            let alias = format!("_rd_wrapped_{export_name}");
            edits.push(Edit::replace(
                spec.span.start,
                spec.span.end,
                format!("{alias} as {export_name}"),
            ));
            appended.push_str(&format!(
                "const {alias} = {wrapper}({local}, \"{route_id}\");\n"
            ));
        }
    }
}

/// Build the deduplicated import block injected at the top of the module:
/// exactly one import statement per distinct wrapper identifier, in fixed
/// table order, skipping identifiers the module already imports from the
/// same source.
fn import_prefix(
    classified: &Classified,
    config: &TransformConfig,
    needed: &[RecognizedExport],
) -> String {
    let mut out = String::new();
    let mut emitted: Vec<&'static str> = Vec::new();

    for export in RecognizedExport::ALL {
        if !needed.contains(&export) {
            continue;
        }
        let ident = export.wrapper_ident();
        if emitted.contains(&ident) {
            continue;
        }
        emitted.push(ident);
        let source = if export.is_client() {
            config.client_source.as_str()
        } else {
            config.server_source.as_str()
        };
        if classified.surface.has_import(ident, source) {
            continue;
        }
        out.push_str(&format!("import {{ {ident} }} from \"{source}\";\n"));
    }
    out
}

/// Apply edits to the source. Edits are sorted by position; overlapping
/// pure deletions (adjacent specifiers sharing a comma) are merged, any
/// other overlap would be a rewriter bug and the later edit is dropped.
pub fn apply_edits(src: &str, mut edits: Edits) -> String {
    edits.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));

    let mut out = String::with_capacity(src.len() + 128);
    let mut cursor = 0usize;
    for edit in &edits {
        if edit.start < cursor {
            if edit.text.is_empty() && edit.end > cursor {
                // Merge the non-overlapping tail of a deletion.
                cursor = edit.end;
            }
            continue;
        }
        out.push_str(&src[cursor..edit.start]);
        out.push_str(&edit.text);
        cursor = edit.end;
    }
    out.push_str(&src[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::classify::classify;
    use crate::transform::lexer::tokenize;

    fn rewrite(src: &str, route_id: &str) -> Option<String> {
        let toks = tokenize(src).unwrap();
        let classified = classify(src, &toks);
        rewrite_module(src, &classified, route_id, &TransformConfig::default())
    }

    #[test]
    fn test_apply_edits_ordering() {
        let mut edits: Edits = SmallVec::new();
        edits.push(Edit::insert(5, "B".into()));
        edits.push(Edit::insert(0, "A".into()));
        assert_eq!(apply_edits("01234567", edits), "A01234B567");
    }

    #[test]
    fn test_apply_edits_merges_overlapping_deletions() {
        let mut edits: Edits = SmallVec::new();
        edits.push(Edit::delete(2, 6));
        edits.push(Edit::delete(4, 8));
        assert_eq!(apply_edits("0123456789", edits), "0189");
    }

    #[test]
    fn test_function_declaration_wrap() {
        let src = "export function loader({ request }) { return null; }";
        let out = rewrite(src, "routes/index").unwrap();
        assert!(out.starts_with(
            "import { withLoaderWrapper } from \"route-devtools/server\";\n"
        ));
        assert!(out.contains(
            "export const loader = withLoaderWrapper(function loader({ request }) { return null; }, \"routes/index\");"
        ));
    }

    #[test]
    fn test_declaration_at_module_start_keeps_import_first() {
        let src = "function loader() { return 1; }\nexport { loader };";
        let out = rewrite(src, "routes/y").unwrap();
        assert!(out.starts_with(
            "import { withLoaderWrapper } from \"route-devtools/server\";\n"
        ));
        assert!(out.contains(
            "const loader = withLoaderWrapper(function loader() { return 1; }, \"routes/y\");"
        ));
    }

    #[test]
    fn test_async_function_expression_wrap() {
        let src = "export const loader = async function({ request }) { return null; };";
        let out = rewrite(src, "routes/x").unwrap();
        assert!(out.contains(
            "export const loader = withLoaderWrapper(async function({ request }) { return null; }, \"routes/x\");"
        ));
    }

    #[test]
    fn test_arrow_wrap() {
        let src = "export const action = async ({ request }) => null;";
        let out = rewrite(src, "routes/index").unwrap();
        assert!(out.contains(
            "export const action = withActionWrapper(async ({ request }) => null, \"routes/index\");"
        ));
    }

    #[test]
    fn test_client_namespace_import() {
        let src = "export const clientLoader = () => null;";
        let out = rewrite(src, "routes/index").unwrap();
        assert!(out.contains(
            "import { withClientLoaderWrapper } from \"route-devtools/client\";\n"
        ));
    }

    #[test]
    fn test_import_dedup_single_statement() {
        let src = "export const loader = () => 1;\nexport const action = () => 2;";
        let out = rewrite(src, "r").unwrap();
        assert_eq!(out.matches("import { withLoaderWrapper }").count(), 1);
        assert_eq!(out.matches("import { withActionWrapper }").count(), 1);
    }

    #[test]
    fn test_existing_wrapper_import_not_duplicated() {
        let src = "import { withLoaderWrapper } from \"route-devtools/server\";\n\
                   export const loader = () => 1;";
        let out = rewrite(src, "r").unwrap();
        assert_eq!(out.matches("import { withLoaderWrapper }").count(), 1);
    }

    #[test]
    fn test_module_reexport() {
        let src = "export { loader, meta } from \"./shared\";";
        let out = rewrite(src, "routes/index").unwrap();
        // `loader` leaves the specifier list, `meta` stays.
        assert!(out.contains("export {  meta } from \"./shared\";") || out.contains("export { meta } from \"./shared\";"));
        assert!(out.contains("import { loader as _rd_orig_loader } from \"./shared\";"));
        assert!(out.contains(
            "export const loader = withLoaderWrapper(_rd_orig_loader, \"routes/index\");"
        ));
    }

    #[test]
    fn test_local_import_reexport() {
        let src = "import { serverLoader as loader } from \"./impl\";\nexport { loader };";
        let out = rewrite(src, "routes/index").unwrap();
        assert!(out.contains("export { _rd_wrapped_loader as loader };"));
        assert!(out.contains(
            "const _rd_wrapped_loader = withLoaderWrapper(loader, \"routes/index\");"
        ));
    }

    #[test]
    fn test_already_wrapped_is_untouched() {
        let src = "import { withLoaderWrapper } from \"route-devtools/server\";\n\
                   export const loader = withLoaderWrapper(() => 1, \"r\");";
        assert_eq!(rewrite(src, "r"), None);
    }

    #[test]
    fn test_no_recognized_exports_no_edits() {
        assert_eq!(rewrite("export const meta = () => [];", "r"), None);
    }

    #[test]
    fn test_empty_middleware_array_untouched() {
        assert_eq!(rewrite("export const middleware = [];", "r"), None);
    }
}
