// Turns textual references into concrete symbols

use std::collections::HashMap;

use tracing::trace;

use crate::index::short_name;
use crate::index::symbol_index::{IndexEntry, SymbolIndex};

/// Per-file information used to disambiguate a reference
#[derive(Debug, Clone)]
pub struct ResolutionContext {
    /// File the reference appears in
    pub file: String,
    /// Local name -> qualified name, module path or `path::Symbol` marker
    pub imports: HashMap<String, String>,
    pub namespace: Option<String>,
    pub namespace_separator: &'static str,
}

impl ResolutionContext {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            imports: HashMap::new(),
            namespace: None,
            namespace_separator: ".",
        }
    }

    pub fn with_imports(mut self, imports: HashMap<String, String>) -> Self {
        self.imports = imports;
        self
    }

    pub fn with_namespace(mut self, namespace: Option<String>, separator: &'static str) -> Self {
        self.namespace = namespace;
        self.namespace_separator = separator;
        self
    }
}

/// Resolve `target` against the project index. First match wins:
///
/// 0. a symbol with that qualified name in the referencing file
/// 1. exact qualified-name match anywhere; with a context, bare names
///    (no separator) are only trusted in the referencing file
/// 2. the import map, by qualified name or import-path marker
/// 3. the file's namespace joined with the target
/// 4. an import-path marker `path::Symbol`, checked against candidate file paths
///
/// Anything else is unresolved. There is deliberately no "any symbol with this
/// short name" fallback.
pub fn resolve<'i>(
    target: &str,
    index: &'i SymbolIndex,
    context: Option<&ResolutionContext>,
) -> Option<&'i IndexEntry> {
    let target = target.trim();
    if target.is_empty() {
        return None;
    }

    if let Some(ctx) = context {
        if let Some(local) = index.get_in_file(&ctx.file, target) {
            return Some(local);
        }
    }

    if context.is_none() || is_qualified(target) {
        if let Some(entry) = index.get(target) {
            return Some(entry);
        }
    }

    if let Some(ctx) = context {
        if let Some(mapped) = ctx.imports.get(target) {
            if let Some(entry) = index.get(mapped).or_else(|| resolve_import_path(mapped, index)) {
                return Some(entry);
            }
        }

        if let Some(namespace) = ctx.namespace.as_deref().filter(|ns| !ns.is_empty()) {
            let joined = format!("{}{}{}", namespace, ctx.namespace_separator, target);
            if let Some(entry) = index.get(&joined) {
                return Some(entry);
            }
        }
    }

    let resolved = resolve_import_path(target, index);
    if resolved.is_none() {
        trace!("Unresolved reference: {}", target);
    }
    resolved
}

fn is_qualified(name: &str) -> bool {
    name.contains('.') || name.contains('\\') || name.contains("::") || name.contains('/')
}

/// Resolve a `path::Symbol` marker through the short-name index
fn resolve_import_path<'i>(marker: &str, index: &'i SymbolIndex) -> Option<&'i IndexEntry> {
    let (path, symbol) = marker.split_once("::")?;
    if symbol.is_empty() {
        return None;
    }
    let wanted = normalize_module_path(path);
    if wanted.is_empty() {
        return None;
    }

    // closest file wins; equally close candidates in different files are ambiguous
    let mut best: Option<((usize, bool), &IndexEntry)> = None;
    let mut ambiguous = false;
    for candidate in index.by_short_name(short_name(symbol)) {
        if !qualified_matches(&candidate.qualified_name, symbol) {
            continue;
        }
        let Some(closeness) = path_closeness(&candidate.file, &wanted) else {
            continue;
        };
        let rank = (closeness, candidate.qualified_name == symbol);
        match best {
            Some((current, _)) if rank < current => {}
            Some((current, entry)) if rank == current => {
                if entry.file != candidate.file {
                    ambiguous = true;
                }
            }
            _ => {
                best = Some((rank, candidate));
                ambiguous = false;
            }
        }
    }

    if ambiguous {
        trace!("Ambiguous import {}", marker);
        return None;
    }
    best.map(|(_, entry)| entry)
}

fn qualified_matches(qualified: &str, symbol: &str) -> bool {
    if qualified == symbol {
        return true;
    }
    [".", "\\", "::"]
        .iter()
        .any(|sep| qualified.ends_with(&format!("{}{}", sep, symbol)))
}

const SOURCE_EXTENSIONS: &[&str] = &[
    ".d.ts", ".ts", ".tsx", ".mts", ".cts", ".js", ".jsx", ".mjs", ".cjs", ".py", ".php", ".java",
    ".go", ".rs",
];

const INDEX_SUFFIXES: &[&str] = &["/index", "/mod", "/__init__"];

/// Drop relative prefixes, extensions and directory-index file names
pub fn normalize_module_path(path: &str) -> String {
    let mut current = path.trim().replace('\\', "/");

    loop {
        let stripped = ["./", "../", "@/", "~/", "/"]
            .iter()
            .find_map(|prefix| current.strip_prefix(prefix).map(str::to_string));
        match stripped {
            Some(rest) => current = rest,
            None => break,
        }
    }

    if let Some(ext) = SOURCE_EXTENSIONS.iter().find(|ext| current.ends_with(*ext)) {
        current.truncate(current.len() - ext.len());
    }
    if let Some(suffix) = INDEX_SUFFIXES.iter().find(|s| current.ends_with(*s)) {
        current.truncate(current.len() - suffix.len());
    }

    current
}

fn segment_suffix(longer: &str, shorter: &str) -> bool {
    !shorter.is_empty() && (longer == shorter || longer.ends_with(&format!("/{}", shorter)))
}

/// Trailing segments `a` and `b` share when one is a path suffix of the other
fn shared_segments(a: &str, b: &str) -> Option<usize> {
    let shorter = if a.len() <= b.len() { a } else { b };
    let longer = if a.len() <= b.len() { b } else { a };
    segment_suffix(longer, shorter).then(|| shorter.split('/').count())
}

/// How closely a candidate file matches a module path: either one must be a
/// path suffix of the other, comparing the file without its extension or the
/// file's directory. More shared segments is closer; at equal depth an exact
/// match beats a suffix and the file itself beats its directory.
fn path_closeness(file: &str, wanted: &str) -> Option<usize> {
    let stem = normalize_module_path(file);
    let dir = file.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");

    let score = |path: &str, exact: usize, partial: usize| {
        shared_segments(path, wanted).map(|n| n * 4 + (if path == wanted { exact } else { partial }))
    };
    score(stem.as_str(), 3, 1).max(score(dir, 2, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Location, Symbol, SymbolKind};

    fn sym(file: &str, qualified: &str, kind: SymbolKind) -> Symbol {
        Symbol::new(short_name(qualified), qualified, kind, Location::new(file, 1, 3), "typescript")
    }

    #[test]
    fn test_local_count_never_links_to_unrelated_count() {
        let local = sym("src/stats.ts", "count", SymbolKind::Function);
        let unrelated = sym("src/inventory.ts", "count", SymbolKind::Function);
        let index = SymbolIndex::build([&local, &unrelated]);

        let ctx = ResolutionContext::new("src/stats.ts");
        assert_eq!(resolve("count", &index, Some(&ctx)).unwrap().id, local.id);

        // no local definition and no import: unresolved rather than a guess
        let other = ResolutionContext::new("src/report.ts");
        assert!(resolve("count", &index, Some(&other)).is_none());
    }

    #[test]
    fn test_exact_qualified_match() {
        let method = sym("src/order.ts", "OrderService.createOrder", SymbolKind::Method);
        let index = SymbolIndex::build([&method]);

        let ctx = ResolutionContext::new("src/api.ts");
        assert_eq!(
            resolve("OrderService.createOrder", &index, Some(&ctx)).unwrap().id,
            method.id
        );
        // without context bare names are matched by qualified name too
        let base = sym("src/base.ts", "BaseService", SymbolKind::Class);
        let index = SymbolIndex::build([&base]);
        assert_eq!(resolve("BaseService", &index, None).unwrap().id, base.id);
    }

    #[test]
    fn test_import_marker_picks_consistent_file() {
        let wanted = sym("src/lib/count.ts", "count", SymbolKind::Function);
        let decoy = sym("src/inventory.ts", "count", SymbolKind::Function);
        let index = SymbolIndex::build([&decoy, &wanted]);

        let mut imports = HashMap::new();
        imports.insert("count".to_string(), "src/lib/count::count".to_string());
        let ctx = ResolutionContext::new("src/report.ts").with_imports(imports);

        assert_eq!(resolve("count", &index, Some(&ctx)).unwrap().id, wanted.id);
    }

    #[test]
    fn test_import_of_qualified_name() {
        let user = sym("src/Models/User.php", "App\\Models\\User", SymbolKind::Model);
        let index = SymbolIndex::build([&user]);

        let mut imports = HashMap::new();
        imports.insert("User".to_string(), "App\\Models\\User".to_string());
        let ctx = ResolutionContext::new("src/Http/UserController.php").with_imports(imports);

        assert_eq!(resolve("User", &index, Some(&ctx)).unwrap().id, user.id);
    }

    #[test]
    fn test_namespace_join() {
        let base = sym("src/Services/BaseService.php", "App\\Services\\BaseService", SymbolKind::Service);
        let index = SymbolIndex::build([&base]);

        let ctx = ResolutionContext::new("src/Services/OrderService.php")
            .with_namespace(Some("App\\Services".to_string()), "\\");
        assert_eq!(resolve("BaseService", &index, Some(&ctx)).unwrap().id, base.id);
    }

    #[test]
    fn test_marker_members_and_directories() {
        let create = sym("src/models/user.ts", "User.create", SymbolKind::Method);
        let go_func = sym("internal/orders/service.go", "orders.Create", SymbolKind::Function);
        let index = SymbolIndex::build([&create, &go_func]);

        assert_eq!(resolve("src/models/user::User.create", &index, None).unwrap().id, create.id);
        assert_eq!(resolve("./models::User.create", &index, None).unwrap().id, create.id);
        assert_eq!(
            resolve("github.com/acme/shop/internal/orders::Create", &index, None).unwrap().id,
            go_func.id
        );
        assert!(resolve("src/billing::User.create", &index, None).is_none());
    }

    #[test]
    fn test_normalize_module_path() {
        assert_eq!(normalize_module_path("./services/order.ts"), "services/order");
        assert_eq!(normalize_module_path("../../lib/index"), "lib");
        assert_eq!(normalize_module_path("@/components/Button.tsx"), "components/Button");
        assert_eq!(normalize_module_path("app/utils/__init__.py"), "app/utils");
        assert_eq!(normalize_module_path("src/net/mod.rs"), "src/net");
    }

    #[test]
    fn test_import_marker_prefers_the_closest_file() {
        let shallow = sym("lib/count.ts", "count", SymbolKind::Function);
        let nested = sym("src/lib/count.ts", "count", SymbolKind::Function);

        // `import { count } from "./lib/count"` inside src/report.ts
        let mut imports = HashMap::new();
        imports.insert("count".to_string(), "src/lib/count::count".to_string());
        let ctx = ResolutionContext::new("src/report.ts").with_imports(imports);

        for index in [SymbolIndex::build([&shallow, &nested]), SymbolIndex::build([&nested, &shallow])] {
            assert_eq!(resolve("count", &index, Some(&ctx)).unwrap().id, nested.id);
        }
    }

    #[test]
    fn test_top_level_file_loses_to_the_imported_path() {
        let root_config = sym("config.ts", "config", SymbolKind::Constant);
        let package_config = sym("packages/b/src/config.ts", "config", SymbolKind::Constant);
        let index = SymbolIndex::build([&root_config, &package_config]);

        assert_eq!(
            resolve("packages/b/src/config::config", &index, None).unwrap().id,
            package_config.id
        );
        assert_eq!(resolve("config::config", &index, None).unwrap().id, root_config.id);
    }

    #[test]
    fn test_equally_close_files_stay_unresolved() {
        let a = sym("a/models/user.ts", "User", SymbolKind::Class);
        let b = sym("b/models/user.ts", "User", SymbolKind::Class);
        let index = SymbolIndex::build([&a, &b]);

        assert!(resolve("models/user::User", &index, None).is_none());
        assert_eq!(resolve("a/models/user::User", &index, None).unwrap().id, a.id);
    }

    #[test]
    fn test_path_closeness() {
        assert_eq!(path_closeness("src/lib/count.ts", "src/lib/count"), Some(15));
        assert_eq!(path_closeness("lib/count.ts", "src/lib/count"), Some(9));
        assert_eq!(path_closeness("config.ts", "config"), Some(7));
        assert_eq!(path_closeness("packages/b/src/config.ts", "config"), Some(5));
        assert_eq!(path_closeness("internal/orders/service.go", "github.com/acme/internal/orders"), Some(8));
        assert_eq!(path_closeness("src/inventory.ts", "src/lib/count"), None);
    }
}
