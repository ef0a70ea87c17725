use assert2::check;
use route_devtools::transform::{transform, TransformConfig};

fn run(src: &str, path: &str) -> route_devtools::transform::TransformOutput {
    transform(src, path, &TransformConfig::default())
}

#[test]
fn test_full_route_module() {
    let src = "\
import { json } from \"framework\";

export async function loader({ request }) {
  return json({ ok: true });
}

export const action = async ({ request }) => {
  return null;
};

export const meta = () => [];
";
    let out = run(src, "app/routes/users.tsx");
    check!(out.modified);
    check!(out.code.starts_with(
        "import { withLoaderWrapper } from \"route-devtools/server\";\n\
         import { withActionWrapper } from \"route-devtools/server\";\n"
    ));
    check!(out.code.contains(
        "export const loader = withLoaderWrapper(async function loader({ request }) {"
    ));
    check!(out.code.contains("}, \"routes/users\");"));
    check!(out.code.contains(
        "export const action = withActionWrapper(async ({ request }) => {"
    ));
    // Unrecognized exports and untouched code survive byte for byte.
    check!(out.code.contains("import { json } from \"framework\";"));
    check!(out.code.contains("export const meta = () => [];"));
}

#[test]
fn test_mixed_server_and_client_exports() {
    let src = "\
export const loader = () => 1;
export const clientLoader = () => 2;
export const clientAction = () => 3;
";
    let out = run(src, "app/routes/mixed.tsx");
    check!(out.code.contains(
        "import { withLoaderWrapper } from \"route-devtools/server\";"
    ));
    check!(out.code.contains(
        "import { withClientLoaderWrapper } from \"route-devtools/client\";"
    ));
    check!(out.code.contains(
        "import { withClientActionWrapper } from \"route-devtools/client\";"
    ));
}

#[test]
fn test_middleware_array_per_element_wrapping() {
    let src = "export const middleware = [authMiddleware, async () => {}, ...shared];";
    let out = run(src, "app/routes/admin.tsx");
    check!(out.code.contains(
        "withMiddlewareWrapperSingle(authMiddleware, \"routes/admin\", 0, \"authMiddleware\")"
    ));
    check!(out.code.contains("1, \"routes/admin_middleware_1\")"));
    check!(out.code.contains(
        "...(shared).map((mw, i) => withMiddlewareWrapperSingle(mw, \"routes/admin\", i + 2,"
    ));
}

#[test]
fn test_typescript_annotations_survive() {
    let src = "\
export async function loader({ request }: LoaderArgs): Promise<{ count: number }> {
  return { count: 1 };
}
";
    let out = run(src, "app/routes/typed.ts");
    check!(out.modified);
    check!(out.code.contains(
        "export const loader = withLoaderWrapper(async function loader({ request }: LoaderArgs): Promise<{ count: number }> {"
    ));
    check!(out.code.contains("}, \"routes/typed\");"));
}

#[test]
fn test_reexport_from_module() {
    let src = "export { loader, meta } from \"./shared\";\n";
    let out = run(src, "app/routes/index.tsx");
    check!(out.modified);
    check!(out.code.contains("import { loader as _rd_orig_loader } from \"./shared\";"));
    check!(out.code.contains(
        "export const loader = withLoaderWrapper(_rd_orig_loader, \"routes/index\");"
    ));
    check!(out.code.contains("meta } from \"./shared\";"));
}

#[test]
fn test_idempotent_over_own_output() {
    let src = "\
export const loader = async () => ({ n: 1 });
export const middleware = [audit, ...base];
export function action() { return null; }
";
    let config = TransformConfig::default();
    let first = transform(src, "app/routes/a.tsx", &config);
    check!(first.modified);
    let second = transform(&first.code, "app/routes/a.tsx", &config);
    check!(!second.modified);
    check!(second.code == first.code);
}

#[test]
fn test_deterministic_output() {
    let src = "export const clientLoader = () => fetch(\"/api\");\n";
    let config = TransformConfig::default();
    let runs: Vec<String> = (0..3)
        .map(|_| transform(src, "app/routes/d.tsx", &config).code)
        .collect();
    check!(runs[0] == runs[1]);
    check!(runs[1] == runs[2]);
}

#[test]
fn test_module_without_handlers_is_byte_identical() {
    let src = "\
import React from \"react\";

export default function Page() {
  return <div>hello</div>;
}

export const meta = () => [];
";
    let out = run(src, "app/routes/page.tsx");
    check!(!out.modified);
    check!(out.code == src);
}

#[test]
fn test_unparsable_module_is_untouched() {
    let src = "export const loader = () => { /* unterminated comment";
    let out = run(src, "app/routes/broken.ts");
    check!(!out.modified);
    check!(out.code == src);
}

#[test]
fn test_custom_config_sources_and_app_dir() {
    let config = TransformConfig {
        app_dir: "web/src".to_string(),
        server_source: "@acme/devtools/server".to_string(),
        client_source: "@acme/devtools/client".to_string(),
    };
    let out = transform(
        "export const loader = () => 1;",
        "web/src/routes/home.tsx",
        &config,
    );
    check!(out.code.contains(
        "import { withLoaderWrapper } from \"@acme/devtools/server\";"
    ));
    check!(out.code.contains("\"routes/home\""));
}
