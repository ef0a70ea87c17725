//! Array-element wrapping for `middleware`/`clientMiddleware` exports.
//!
//! Each element is wrapped individually with `(fn, routeId, index, name)`.
//! Spread elements cannot be expanded at compile time; they compile to a
//! runtime `.map()` whose indices sit in their own block so later literal
//! elements cannot collide with them.

use super::classify::{ArrayElem, ArrayElemForm, RecognizedExport};
use super::rewrite::{Edit, Edits};

/// Index block reserved for each spread element at runtime.
const SPREAD_INDEX_BLOCK: u32 = 1000;

/// Emit per-element edits. Returns true when at least one element was
/// wrapped (and therefore the wrapper import is needed); an empty array
/// produces no edits and no import.
pub fn wrap_array_elements(
    src: &str,
    export: RecognizedExport,
    route_id: &str,
    elements: &[ArrayElem],
    edits: &mut Edits,
) -> bool {
    let wrapper = export.wrapper_ident();
    let export_name = export.name();
    let mut index: u32 = 0;
    let mut wrapped_any = false;

    for elem in elements {
        match &elem.form {
            ArrayElemForm::AlreadyWrapped => {
                index += 1;
            }
            ArrayElemForm::Identifier(name) | ArrayElemForm::NamedFunction(name) => {
                edits.push(Edit::insert(elem.span.start, format!("{wrapper}(")));
                edits.push(Edit::insert(
                    elem.span.end,
                    format!(", \"{route_id}\", {index}, \"{name}\")"),
                ));
                index += 1;
                wrapped_any = true;
            }
            ArrayElemForm::Anonymous => {
                let name = format!("{route_id}_{export_name}_{index}");
                edits.push(Edit::insert(elem.span.start, format!("{wrapper}(")));
                edits.push(Edit::insert(
                    elem.span.end,
                    format!(", \"{route_id}\", {index}, \"{name}\")"),
                ));
                index += 1;
                wrapped_any = true;
            }
            ArrayElemForm::Spread { expr } => {
                let base = index;
                let expr_text = &src[expr.start..expr.end];
                edits.push(Edit::replace(
                    elem.span.start,
                    elem.span.end,
                    format!(
                        "...({expr_text}).map((mw, i) => {wrapper}(mw, \"{route_id}\", \
                         i + {base}, mw.name || \"{route_id}_{export_name}_\" + (i + {base})))"
                    ),
                ));
                index += SPREAD_INDEX_BLOCK;
                wrapped_any = true;
            }
        }
    }

    wrapped_any
}
