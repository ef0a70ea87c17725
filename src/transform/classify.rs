//! Export classifier: resolves each recognized top-level export of a module
//! to one shape of a closed tagged union.
//!
//! The classifier walks the token stream once, building a surface model of
//! the module (imports, top-level declarations, export statements), then
//! resolves each recognized export name through that model. Unrecognized
//! export names are ignored entirely; a module with zero recognized exports
//! classifies to an empty result.

use std::collections::HashMap;

use super::lexer::{Token, TokenKind};

/// The fixed set of instrumented export names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecognizedExport {
    Loader,
    Action,
    ClientLoader,
    ClientAction,
    Middleware,
    ClientMiddleware,
}

impl RecognizedExport {
    pub const ALL: [RecognizedExport; 6] = [
        RecognizedExport::Loader,
        RecognizedExport::Action,
        RecognizedExport::ClientLoader,
        RecognizedExport::ClientAction,
        RecognizedExport::Middleware,
        RecognizedExport::ClientMiddleware,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "loader" => Some(Self::Loader),
            "action" => Some(Self::Action),
            "clientLoader" => Some(Self::ClientLoader),
            "clientAction" => Some(Self::ClientAction),
            "middleware" => Some(Self::Middleware),
            "clientMiddleware" => Some(Self::ClientMiddleware),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Loader => "loader",
            Self::Action => "action",
            Self::ClientLoader => "clientLoader",
            Self::ClientAction => "clientAction",
            Self::Middleware => "middleware",
            Self::ClientMiddleware => "clientMiddleware",
        }
    }

    /// Fixed export → wrapper identifier table.
    pub fn wrapper_ident(self) -> &'static str {
        match self {
            Self::Loader => "withLoaderWrapper",
            Self::Action => "withActionWrapper",
            Self::ClientLoader => "withClientLoaderWrapper",
            Self::ClientAction => "withClientActionWrapper",
            Self::Middleware => "withMiddlewareWrapperSingle",
            Self::ClientMiddleware => "withClientMiddlewareWrapperSingle",
        }
    }

    /// Client-kind exports import their wrappers from a distinct namespace.
    pub fn is_client(self) -> bool {
        matches!(self, Self::ClientLoader | Self::ClientAction | Self::ClientMiddleware)
    }

    /// Middleware exports are arrays wrapped element-by-element.
    pub fn is_middleware(self) -> bool {
        matches!(self, Self::Middleware | Self::ClientMiddleware)
    }
}

/// Every wrapper identifier; an initializer that is a call to one of these
/// marks the binding as already wrapped and the pipeline as idempotent.
pub const WRAPPER_IDENTS: [&str; 6] = [
    "withLoaderWrapper",
    "withActionWrapper",
    "withClientLoaderWrapper",
    "withClientActionWrapper",
    "withMiddlewareWrapperSingle",
    "withClientMiddlewareWrapperSingle",
];

pub fn is_wrapper_ident(name: &str) -> bool {
    WRAPPER_IDENTS.contains(&name)
}

/// Byte span into the original source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// One element of a `middleware`/`clientMiddleware` array literal.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayElem {
    pub span: Span,
    pub form: ArrayElemForm,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayElemForm {
    /// An identifier referencing a named function.
    Identifier(String),
    /// A named function expression.
    NamedFunction(String),
    /// An anonymous function, arrow, or any other expression; the wrapper
    /// name is synthesized.
    Anonymous,
    /// `...expr`, expanded at runtime via `.map()`.
    Spread { expr: Span },
    /// Already a call to a known wrapper.
    AlreadyWrapped,
}

/// Span of one specifier inside an export list, with the range to delete
/// when the specifier is removed (covers one adjacent comma).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecSpan {
    pub span: Span,
    pub remove: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reexport {
    /// `export { imported as name } from "module"`; the binding never
    /// exists locally.
    Module {
        module: String,
        imported: String,
        spec: SpecSpan,
    },
    /// `export { local }` where `local` is bound by an import statement.
    LocalImport { local: String, spec: SpecSpan },
}

/// Closed union of recognized export shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportShape {
    /// `export function name() {}` or a local function declaration exported
    /// through a specifier list. `wrap_at` is where the `const name =
    /// wrapper(` text goes; `body_end` is the byte just past the closing
    /// brace of the function body.
    FunctionDeclaration {
        local: String,
        wrap_at: usize,
        body_end: usize,
    },
    /// `const name = function [id]() {}`.
    FunctionExpression { named: bool, init: Span },
    /// `const name = () => {}` (including `async`).
    ArrowFunction { init: Span },
    /// A binding initialized with an identifier or any other non-function
    /// expression; wrapped exactly like a function expression.
    VariableReexport { init: Span },
    /// `const middleware = [a, b, ...rest]`.
    ArrayLiteral {
        open: usize,
        close: usize,
        elements: Vec<ArrayElem>,
    },
    ImportedReexport(Reexport),
    /// Initializer is already a call to a known wrapper; no-op.
    AlreadyWrapped,
}

/// One recognized export resolved to its shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportBinding {
    pub name: RecognizedExport,
    pub shape: ExportShape,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportStmt {
    pub source: String,
    /// `(imported, local)` pairs; default imports record `"default"` as the
    /// imported name, namespace imports `"*"`.
    pub locals: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
enum DeclBinding {
    Function { wrap_at: usize, body_end: usize },
    Var { init: Option<InitInfo> },
    ImportBinding,
}

#[derive(Debug, Clone)]
struct InitInfo {
    span: Span,
    form: InitForm,
}

#[derive(Debug, Clone)]
enum InitForm {
    Arrow,
    FunctionNamed,
    FunctionAnon,
    Array {
        open: usize,
        close: usize,
        elements: Vec<ArrayElem>,
    },
    WrapperCall,
    Other,
}

/// Surface model of one module; owned only for the duration of a single
/// transform call.
#[derive(Debug, Default)]
pub struct ModuleSurface {
    pub imports: Vec<ImportStmt>,
    pub end: usize,
    decls: HashMap<String, DeclBinding>,
    exports: Vec<PendingExport>,
}

impl ModuleSurface {
    /// True when the module already imports `ident` from `source`.
    pub fn has_import(&self, ident: &str, source: &str) -> bool {
        self.imports
            .iter()
            .any(|imp| imp.source == source && imp.locals.iter().any(|(_, local)| local == ident))
    }
}

#[derive(Debug)]
enum PendingExport {
    /// `export function name …` or `export const name = …`, resolved at
    /// declaration time.
    Inline { name: String },
    /// One specifier of `export { … }` (optionally with a `from` clause).
    Specifier {
        local: String,
        exported: String,
        spec: SpecSpan,
        from: Option<String>,
    },
}

pub struct Classified {
    pub bindings: Vec<ExportBinding>,
    pub surface: ModuleSurface,
}

/// Classify every recognized export of the module. `toks` must come from
/// [`super::lexer::tokenize`] over `src`.
pub fn classify(src: &str, toks: &[Token]) -> Classified {
    let mut parser = Parser { src, toks, pos: 0 };
    let surface = parser.parse_module();
    let bindings = resolve(&surface);
    Classified { bindings, surface }
}

fn resolve(surface: &ModuleSurface) -> Vec<ExportBinding> {
    let mut bindings: Vec<ExportBinding> = Vec::new();
    let mut seen: Vec<RecognizedExport> = Vec::new();

    for export in &surface.exports {
        let (exported, local, spec, from) = match export {
            PendingExport::Inline { name } => (name.as_str(), name.as_str(), None, None),
            PendingExport::Specifier { local, exported, spec, from } => {
                (exported.as_str(), local.as_str(), Some(*spec), from.as_deref())
            }
        };
        // `export { loader as default }` (or any alias) still instruments
        // the underlying local binding; the export list stays untouched.
        let (name, via_alias) = match RecognizedExport::from_name(exported) {
            Some(name) => (name, false),
            None => match (from, RecognizedExport::from_name(local)) {
                (None, Some(name)) => (name, true),
                _ => continue,
            },
        };
        if seen.contains(&name) {
            continue;
        }

        let shape = if via_alias {
            // Wrap at the declaration site only; re-export forms need the
            // exported name to match, which it does not here.
            match surface.decls.get(local) {
                Some(DeclBinding::Function { wrap_at, body_end }) => {
                    Some(ExportShape::FunctionDeclaration {
                        local: local.to_string(),
                        wrap_at: *wrap_at,
                        body_end: *body_end,
                    })
                }
                Some(DeclBinding::Var { init: Some(init) }) => Some(shape_from_init(name, init)),
                _ => None,
            }
        } else if let Some(module) = from {
            // A from-clause export always comes from a specifier list.
            spec.map(|spec| {
                ExportShape::ImportedReexport(Reexport::Module {
                    module: module.to_string(),
                    imported: local.to_string(),
                    spec,
                })
            })
        } else {
            match surface.decls.get(local) {
                Some(DeclBinding::Function { wrap_at, body_end }) => {
                    Some(ExportShape::FunctionDeclaration {
                        local: local.to_string(),
                        wrap_at: *wrap_at,
                        body_end: *body_end,
                    })
                }
                Some(DeclBinding::Var { init: Some(init) }) => Some(shape_from_init(name, init)),
                Some(DeclBinding::Var { init: None }) => None,
                Some(DeclBinding::ImportBinding) => spec.map(|spec| {
                    ExportShape::ImportedReexport(Reexport::LocalImport {
                        local: local.to_string(),
                        spec,
                    })
                }),
                // `export { name }` with no resolvable local declaration:
                // leave it alone rather than guess.
                None => None,
            }
        };

        if let Some(shape) = shape {
            seen.push(name);
            bindings.push(ExportBinding { name, shape });
        }
    }

    bindings
}

fn shape_from_init(name: RecognizedExport, init: &InitInfo) -> ExportShape {
    match &init.form {
        InitForm::WrapperCall => ExportShape::AlreadyWrapped,
        InitForm::Arrow => ExportShape::ArrowFunction { init: init.span },
        InitForm::FunctionNamed => ExportShape::FunctionExpression { named: true, init: init.span },
        InitForm::FunctionAnon => ExportShape::FunctionExpression { named: false, init: init.span },
        InitForm::Array { open, close, elements } if name.is_middleware() => {
            ExportShape::ArrayLiteral {
                open: *open,
                close: *close,
                elements: elements.clone(),
            }
        }
        InitForm::Array { .. } | InitForm::Other => ExportShape::VariableReexport { init: init.span },
    }
}

/// Identifiers that begin a new top-level statement; used by the generic
/// statement skipper to honor semicolon-less code.
const STATEMENT_STARTERS: &[&str] = &[
    "import", "export", "const", "let", "var", "function", "class", "async", "interface", "type",
    "enum", "declare", "if", "for", "while", "return",
];

/// Keywords that act as operators inside an expression; a statement
/// keyword right after one of these (`x as const`) is an operand, not a
/// new statement.
const EXPR_CONTINUATION_KEYWORDS: &[&str] = &[
    "as", "in", "of", "instanceof", "typeof", "new", "delete", "void", "await", "yield", "throw",
    "return", "case", "do", "else", "satisfies", "keyof", "extends",
];

struct Parser<'s> {
    src: &'s str,
    toks: &'s [Token],
    pos: usize,
}

impl<'s> Parser<'s> {
    fn peek(&self) -> Option<&Token> {
        self.toks.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.toks.get(self.pos + offset)
    }

    fn bump(&mut self) -> Option<&Token> {
        let t = self.toks.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn text(&self, t: &Token) -> &'s str {
        t.text(self.src)
    }

    fn at_ident(&self, name: &str) -> bool {
        self.peek().is_some_and(|t| t.is_ident(self.src, name))
    }

    fn at_punct(&self, p: &str) -> bool {
        self.peek().is_some_and(|t| t.is_punct(self.src, p))
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.at_punct(p) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_ident(&mut self, name: &str) -> bool {
        if self.at_ident(name) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_module(&mut self) -> ModuleSurface {
        let mut surface = ModuleSurface {
            end: self.src.len(),
            ..ModuleSurface::default()
        };

        while self.pos < self.toks.len() {
            let before = self.pos;
            self.parse_top_statement(&mut surface);
            if self.pos == before {
                // Safety valve: always make progress.
                self.pos += 1;
            }
        }
        surface
    }

    fn parse_top_statement(&mut self, surface: &mut ModuleSurface) {
        if self.eat_punct(";") {
            return;
        }
        if self.at_ident("import") && !self.prev_is_dot() {
            self.parse_import(surface);
        } else if self.at_ident("export") && !self.prev_is_dot() {
            self.pos += 1;
            self.parse_export_tail(surface);
        } else if self.at_ident("function")
            || (self.at_ident("async") && self.peek_at(1).is_some_and(|t| t.is_ident(self.src, "function")))
        {
            self.parse_function_decl(surface, false);
        } else if self.at_ident("const") || self.at_ident("let") || self.at_ident("var") {
            self.parse_var_statement(surface, false);
        } else {
            self.skip_statement();
        }
    }

    fn prev_is_dot(&self) -> bool {
        self.pos > 0 && self.toks[self.pos - 1].is_punct(self.src, ".")
    }

    // --- imports ---

    fn parse_import(&mut self, surface: &mut ModuleSurface) {
        self.pos += 1; // `import`

        // `import type { … }` binds nothing at runtime.
        if self.at_ident("type") && !self.peek_at(1).is_some_and(|t| t.is_ident(self.src, "from")) {
            self.skip_statement();
            return;
        }

        let mut locals: Vec<(String, String)> = Vec::new();

        // `import "side-effect";`
        if let Some(t) = self.peek() {
            if t.kind == TokenKind::Str {
                let source = strip_quotes(self.text(t));
                self.pos += 1;
                self.eat_punct(";");
                surface.imports.push(ImportStmt { source, locals });
                return;
            }
        }

        // Default import.
        if self.peek().is_some_and(|t| t.kind == TokenKind::Ident) && !self.at_ident("from") {
            let local = self.text(self.peek().unwrap()).to_string();
            self.pos += 1;
            locals.push(("default".to_string(), local));
            self.eat_punct(",");
        }

        if self.eat_punct("*") {
            // `* as ns`
            self.eat_ident("as");
            if let Some(t) = self.peek() {
                if t.kind == TokenKind::Ident {
                    locals.push(("*".to_string(), self.text(t).to_string()));
                    self.pos += 1;
                }
            }
        } else if self.eat_punct("{") {
            while !self.at_punct("}") && self.peek().is_some() {
                // Tolerate `type X` inside the list.
                if self.at_ident("type")
                    && self.peek_at(1).is_some_and(|t| t.kind == TokenKind::Ident)
                {
                    self.pos += 1;
                    // Type-only specifier: consume but do not record.
                    self.pos += 1;
                    if self.eat_ident("as") {
                        self.pos += 1;
                    }
                    self.eat_punct(",");
                    continue;
                }
                let Some(t) = self.peek() else { break };
                if t.kind != TokenKind::Ident && t.kind != TokenKind::Str {
                    self.pos += 1;
                    continue;
                }
                let imported = if t.kind == TokenKind::Str {
                    strip_quotes(self.text(t))
                } else {
                    self.text(t).to_string()
                };
                self.pos += 1;
                let local = if self.eat_ident("as") {
                    match self.peek() {
                        Some(t) if t.kind == TokenKind::Ident => {
                            let l = self.text(t).to_string();
                            self.pos += 1;
                            l
                        }
                        _ => imported.clone(),
                    }
                } else {
                    imported.clone()
                };
                locals.push((imported, local));
                self.eat_punct(",");
            }
            self.eat_punct("}");
        }

        self.eat_ident("from");
        let source = match self.peek() {
            Some(t) if t.kind == TokenKind::Str => {
                let s = strip_quotes(self.text(t));
                self.pos += 1;
                s
            }
            _ => String::new(),
        };
        self.eat_punct(";");

        for (_, local) in &locals {
            surface
                .decls
                .entry(local.clone())
                .or_insert(DeclBinding::ImportBinding);
        }
        surface.imports.push(ImportStmt { source, locals });
    }

    // --- exports ---

    fn parse_export_tail(&mut self, surface: &mut ModuleSurface) {
        if self.at_ident("function")
            || (self.at_ident("async") && self.peek_at(1).is_some_and(|t| t.is_ident(self.src, "function")))
        {
            self.parse_function_decl(surface, true);
        } else if self.at_ident("const") || self.at_ident("let") || self.at_ident("var") {
            self.parse_var_statement(surface, true);
        } else if self.at_punct("{") {
            self.parse_export_list(surface);
        } else {
            // `export default …`, `export * from …`, TS-only forms: none of
            // these can carry a recognized named export.
            self.skip_statement();
        }
    }

    fn parse_export_list(&mut self, surface: &mut ModuleSurface) {
        self.pos += 1; // `{`

        struct RawSpec {
            local: String,
            exported: String,
            start: usize,
            end: usize,
        }
        let mut specs: Vec<RawSpec> = Vec::new();
        let mut commas: Vec<Span> = Vec::new();

        while !self.at_punct("}") && self.peek().is_some() {
            let Some(t) = self.peek() else { break };
            if t.is_punct(self.src, ",") {
                commas.push(Span { start: t.start, end: t.end });
                self.pos += 1;
                continue;
            }
            if t.kind != TokenKind::Ident {
                self.pos += 1;
                continue;
            }
            let start = t.start;
            let mut end = t.end;
            let local = self.text(t).to_string();
            self.pos += 1;
            let exported = if self.at_ident("as") {
                self.pos += 1;
                match self.peek() {
                    Some(t) if t.kind == TokenKind::Ident => {
                        end = t.end;
                        let e = self.text(t).to_string();
                        self.pos += 1;
                        e
                    }
                    _ => local.clone(),
                }
            } else {
                local.clone()
            };
            specs.push(RawSpec { local, exported, start, end });
        }
        self.eat_punct("}");

        let from = if self.eat_ident("from") {
            match self.peek() {
                Some(t) if t.kind == TokenKind::Str => {
                    let s = strip_quotes(self.text(t));
                    self.pos += 1;
                    Some(s)
                }
                _ => None,
            }
        } else {
            None
        };
        self.eat_punct(";");

        for raw in &specs {
            // Removal range swallows the following comma, or the preceding
            // one for the last specifier.
            let remove = if let Some(comma) = commas.iter().find(|c| c.start >= raw.end) {
                Span { start: raw.start, end: comma.end }
            } else if let Some(comma) = commas.iter().rev().find(|c| c.end <= raw.start) {
                Span { start: comma.start, end: raw.end }
            } else {
                Span { start: raw.start, end: raw.end }
            };
            surface.exports.push(PendingExport::Specifier {
                local: raw.local.clone(),
                exported: raw.exported.clone(),
                spec: SpecSpan {
                    span: Span { start: raw.start, end: raw.end },
                    remove,
                },
                from: from.clone(),
            });
        }
    }

    // --- declarations ---

    fn parse_function_decl(&mut self, surface: &mut ModuleSurface, exported: bool) {
        let wrap_at = self.peek().map(|t| t.start).unwrap_or(0);
        self.eat_ident("async");
        self.eat_ident("function");
        self.eat_punct("*");

        let Some(name_tok) = self.peek().copied() else {
            return;
        };
        if name_tok.kind != TokenKind::Ident {
            // Anonymous function declarations only occur under `export
            // default`, which carries no recognized name.
            self.skip_statement();
            return;
        }
        let name = self.text(&name_tok).to_string();
        self.pos += 1;

        // Optional TS generics on the declaration.
        if self.at_punct("<") {
            self.skip_angle_group();
        }
        if !self.at_punct("(") {
            self.skip_statement();
            return;
        }
        self.skip_balanced_group();

        if self.eat_punct(":") {
            self.skip_type_expression();
        }

        if !self.at_punct("{") {
            self.skip_statement();
            return;
        }
        let body_end = self.skip_balanced_group();

        surface.decls.insert(name.clone(), DeclBinding::Function { wrap_at, body_end });
        if exported {
            surface.exports.push(PendingExport::Inline { name });
        }
    }

    fn parse_var_statement(&mut self, surface: &mut ModuleSurface, exported: bool) {
        self.pos += 1; // const/let/var

        loop {
            let Some(t) = self.peek().copied() else { return };
            if t.kind != TokenKind::Ident {
                // Destructuring patterns are never recognized exports.
                self.skip_statement();
                return;
            }
            let name = self.text(&t).to_string();
            self.pos += 1;

            if self.eat_punct("!") {
                // TS definite-assignment marker.
            }
            if self.eat_punct(":") {
                self.skip_type_expression();
            }

            let init = if self.eat_punct("=") {
                Some(self.parse_initializer())
            } else {
                None
            };

            surface.decls.insert(name.clone(), DeclBinding::Var { init });
            if exported {
                surface.exports.push(PendingExport::Inline { name });
            }

            if self.eat_punct(",") {
                continue;
            }
            self.eat_punct(";");
            return;
        }
    }

    /// Parse one initializer expression: records its span and just enough
    /// structure to classify it. Consumes up to (but not past) the `,`/`;`
    /// ending the declarator, honoring ASI when a new statement keyword
    /// follows a complete expression.
    fn parse_initializer(&mut self) -> InitInfo {
        let start_pos = self.pos;
        let start_byte = self.peek().map(|t| t.start).unwrap_or(self.src.len());

        // A leading `<` can only be the type-parameter list of a generic
        // arrow; commas inside it are not declarator separators.
        if self.at_punct("<") {
            self.skip_angle_group();
        }

        let mut depth = 0i32;
        let mut prev_ends_expr = false;
        while let Some(t) = self.peek() {
            let txt = self.text(t);
            if depth == 0 && t.kind == TokenKind::Punct && (txt == ";" || txt == ",") {
                break;
            }
            if depth == 0 && prev_ends_expr && t.kind == TokenKind::Ident {
                // ASI: `export` never occurs mid-expression, `import` only
                // as `import(…)`/`import.meta`, and `function` directly
                // after `async` is part of the same expression.
                let async_function =
                    txt == "function" && self.toks[self.pos - 1].is_ident(self.src, "async");
                if !async_function
                    && (txt == "export"
                        || (txt == "import"
                            && !self.peek_at(1).is_some_and(|n| {
                                n.is_punct(self.src, "(") || n.is_punct(self.src, ".")
                            }))
                        || STATEMENT_STARTERS.contains(&txt))
                {
                    break;
                }
            }
            if t.kind == TokenKind::Punct {
                match txt {
                    "(" | "[" | "{" => depth += 1,
                    ")" | "]" | "}" => {
                        if depth == 0 {
                            break;
                        }
                        depth -= 1;
                    }
                    _ => {}
                }
            }
            prev_ends_expr = match t.kind {
                TokenKind::Ident => !EXPR_CONTINUATION_KEYWORDS.contains(&txt),
                TokenKind::Number | TokenKind::Str | TokenKind::Template | TokenKind::Regex => true,
                TokenKind::Punct => matches!(txt, ")" | "]" | "}"),
            };
            self.pos += 1;
        }

        let end_pos = self.pos;
        let end_byte = self
            .toks
            .get(end_pos.saturating_sub(1))
            .map(|t| t.end)
            .unwrap_or(start_byte);
        let span = Span { start: start_byte, end: end_byte };
        let form = self.classify_init(&self.toks[start_pos..end_pos], span);
        InitInfo { span, form }
    }

    fn classify_init(&self, toks: &[Token], span: Span) -> InitForm {
        let Some(first) = toks.first() else {
            return InitForm::Other;
        };
        let first_txt = self.text(first);

        if toks.len() == 1 && first.kind == TokenKind::Ident {
            // Bare identifier referencing another binding.
            return InitForm::Other;
        }
        if first.kind == TokenKind::Ident
            && is_wrapper_ident(first_txt)
            && toks.get(1).is_some_and(|t| t.is_punct(self.src, "("))
        {
            return InitForm::WrapperCall;
        }
        if first.is_punct(self.src, "[") {
            return self.classify_array(toks, span);
        }
        if first.kind == TokenKind::Ident && (first_txt == "function")
            || (first_txt == "async" && toks.get(1).is_some_and(|t| t.is_ident(self.src, "function")))
        {
            let name_idx = if first_txt == "async" { 2 } else { 1 };
            let named = toks.get(name_idx).is_some_and(|t| t.kind == TokenKind::Ident);
            return if named { InitForm::FunctionNamed } else { InitForm::FunctionAnon };
        }
        if is_arrow(self.src, toks) {
            return InitForm::Arrow;
        }
        InitForm::Other
    }

    fn classify_array(&self, toks: &[Token], span: Span) -> InitForm {
        // Elements split on depth-1 commas between the outer brackets.
        let open = toks[0].start;
        let close_tok = toks.last().copied();
        let close = close_tok.map(|t| t.start).unwrap_or(span.end);

        let inner = &toks[1..toks.len().saturating_sub(1)];
        let mut elements = Vec::new();
        let mut depth = 0i32;
        let mut elem_start: Option<usize> = None; // index into `inner`
        let mut boundaries: Vec<(usize, usize)> = Vec::new(); // (start, end) indices

        for (i, t) in inner.iter().enumerate() {
            if t.kind == TokenKind::Punct {
                match self.text(t) {
                    "(" | "[" | "{" => depth += 1,
                    ")" | "]" | "}" => depth -= 1,
                    "," if depth == 0 => {
                        if let Some(s) = elem_start.take() {
                            boundaries.push((s, i));
                        }
                        continue;
                    }
                    _ => {}
                }
            }
            if elem_start.is_none() {
                elem_start = Some(i);
            }
        }
        if let Some(s) = elem_start {
            boundaries.push((s, inner.len()));
        }

        for (s, e) in boundaries {
            let elem_toks = &inner[s..e];
            if elem_toks.is_empty() {
                continue;
            }
            let span = Span {
                start: elem_toks[0].start,
                end: elem_toks[e - s - 1].end,
            };
            elements.push(ArrayElem {
                span,
                form: self.classify_array_elem(elem_toks),
            });
        }

        InitForm::Array { open, close, elements }
    }

    fn classify_array_elem(&self, toks: &[Token]) -> ArrayElemForm {
        // Idempotence: any element mentioning a wrapper identifier has been
        // produced by a previous run (plain call or compiled spread map).
        if toks
            .iter()
            .any(|t| t.kind == TokenKind::Ident && is_wrapper_ident(self.text(t)))
        {
            return ArrayElemForm::AlreadyWrapped;
        }

        let first = &toks[0];
        if first.is_punct(self.src, "...") {
            let expr_start = toks.get(1).map(|t| t.start).unwrap_or(first.end);
            let expr_end = toks.last().map(|t| t.end).unwrap_or(first.end);
            return ArrayElemForm::Spread {
                expr: Span { start: expr_start, end: expr_end },
            };
        }
        if toks.len() == 1 && first.kind == TokenKind::Ident {
            return ArrayElemForm::Identifier(self.text(first).to_string());
        }
        let first_txt = self.text(first);
        if first.kind == TokenKind::Ident
            && (first_txt == "function"
                || (first_txt == "async" && toks.get(1).is_some_and(|t| t.is_ident(self.src, "function"))))
        {
            let name_idx = if first_txt == "async" { 2 } else { 1 };
            if let Some(t) = toks.get(name_idx) {
                if t.kind == TokenKind::Ident {
                    return ArrayElemForm::NamedFunction(self.text(t).to_string());
                }
            }
        }
        ArrayElemForm::Anonymous
    }

    // --- skipping helpers ---

    /// Skip one balanced `(…)`, `[…]`, or `{…}` group starting at the
    /// current token; returns the byte offset just past the closing token.
    fn skip_balanced_group(&mut self) -> usize {
        let mut depth = 0i32;
        let mut end = self.peek().map(|t| t.end).unwrap_or(self.src.len());
        while let Some(t) = self.peek() {
            if t.kind == TokenKind::Punct {
                match self.text(t) {
                    "(" | "[" | "{" => depth += 1,
                    ")" | "]" | "}" => depth -= 1,
                    _ => {}
                }
            }
            end = t.end;
            self.pos += 1;
            if depth == 0 {
                break;
            }
        }
        end
    }

    /// Skip a `<…>` generic group, tolerating nested brackets of all kinds.
    fn skip_angle_group(&mut self) {
        let mut angle = 0i32;
        while let Some(t) = self.peek() {
            if t.kind == TokenKind::Punct {
                match self.text(t) {
                    "<" => angle += 1,
                    ">" => angle -= 1,
                    _ => {}
                }
            }
            self.pos += 1;
            if angle == 0 {
                break;
            }
        }
    }

    /// Skip one TS type expression after `:`. Consumes type atoms joined by
    /// `|`, `&`, `.`, `extends`, and `=>`, so that the `{` that follows a
    /// complete return type is recognized as the function body (and the `=`
    /// after a variable annotation as the initializer).
    fn skip_type_expression(&mut self) {
        loop {
            // One atom.
            match self.peek() {
                Some(t) if t.is_punct(self.src, "{") || t.is_punct(self.src, "(") || t.is_punct(self.src, "[") => {
                    self.skip_balanced_group();
                }
                Some(t) if t.kind == TokenKind::Ident || t.kind == TokenKind::Str || t.kind == TokenKind::Number => {
                    self.pos += 1;
                    // Dotted path.
                    while self.at_punct(".") {
                        self.pos += 1;
                        if self.peek().is_some_and(|t| t.kind == TokenKind::Ident) {
                            self.pos += 1;
                        }
                    }
                }
                _ => return,
            }
            // Generic arguments.
            if self.at_punct("<") {
                self.skip_angle_group();
            }
            // Array suffix `T[]`.
            while self.at_punct("[") {
                self.skip_balanced_group();
            }
            // Connectors continue the type.
            if self.eat_punct("|") || self.eat_punct("&") || self.eat_punct("=>") || self.eat_ident("extends") {
                continue;
            }
            return;
        }
    }

    /// Generic statement skipper for anything the parser does not model.
    fn skip_statement(&mut self) {
        let mut depth = 0i32;
        let mut consumed = false;
        while let Some(t) = self.peek() {
            let is_punct = t.kind == TokenKind::Punct;
            let txt = self.text(t);

            if depth == 0 && consumed && t.kind == TokenKind::Ident && STATEMENT_STARTERS.contains(&txt) {
                let prev = &self.toks[self.pos - 1];
                if prev.is_punct(self.src, ";") || prev.is_punct(self.src, "}") {
                    return;
                }
            }

            if is_punct {
                match txt {
                    "(" | "[" | "{" => depth += 1,
                    ")" | "]" | "}" => depth -= 1,
                    _ => {}
                }
                if depth < 0 {
                    depth = 0;
                }
            }
            self.pos += 1;
            consumed = true;
            if depth == 0 && is_punct && txt == ";" {
                return;
            }
        }
    }
}

/// Detect an arrow function initializer: a `=>` at group depth zero.
fn is_arrow(src: &str, toks: &[Token]) -> bool {
    let mut depth = 0i32;
    for t in toks {
        if t.kind == TokenKind::Punct {
            match t.text(src) {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => depth -= 1,
                "=>" if depth == 0 => return true,
                _ => {}
            }
        }
        // Anything past the params of a one-expression arrow still counts;
        // only a depth-0 arrow token decides.
    }
    false
}

fn strip_quotes(s: &str) -> String {
    s.trim_matches(|c| c == '"' || c == '\'').to_string()
}
