//! Static facts about generated source, collected with `syn`.

use std::collections::{BTreeMap, BTreeSet};
use syn::visit::{self, Visit};
use syn::{Expr, Item, Lit, Member, Pat, UseTree, Visibility};

/// Value of a top-level `const` item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstValue {
    Str(String),
    Int(u64),
    Other,
}

/// Calls and bare identifiers mentioned by one expression
#[derive(Debug, Clone, Default)]
pub struct ExprFacts {
    pub calls: BTreeSet<String>,
    pub idents: BTreeSet<String>,
    /// First argument of every `.text(..)` or `.attr(..)` lookup, when it is a bare ident
    pub selector_args: Vec<String>,
}

impl ExprFacts {
    pub fn of(expr: &Expr) -> Self {
        let mut facts = Self::default();
        facts.visit_expr(expr);
        facts
    }

    pub fn calls(&self, name: &str) -> bool {
        self.calls.contains(name)
    }
}

impl<'ast> Visit<'ast> for ExprFacts {
    fn visit_expr_call(&mut self, node: &'ast syn::ExprCall) {
        if let Some(name) = callee_name(&node.func) {
            self.calls.insert(name);
        }
        visit::visit_expr_call(self, node);
    }

    fn visit_expr_method_call(&mut self, node: &'ast syn::ExprMethodCall) {
        let name = node.method.to_string();
        if SELECTOR_LOOKUPS.contains(&name.as_str()) {
            if let Some(ident) = node.args.first().and_then(bare_ident) {
                self.selector_args.push(ident);
            }
        }
        self.calls.insert(name);
        visit::visit_expr_method_call(self, node);
    }

    fn visit_expr_path(&mut self, node: &'ast syn::ExprPath) {
        if let Some(ident) = node.path.get_ident() {
            self.idents.insert(ident.to_string());
        }
        visit::visit_expr_path(self, node);
    }
}

const SELECTOR_LOOKUPS: &[&str] = &["text", "attr"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    Loop,
    While,
    For,
}

#[derive(Debug, Clone)]
pub struct LoopFacts {
    pub kind: LoopKind,
    /// Body calls a sleep or the delay helper
    pub delayed: bool,
    /// Sits inside a `loop` or `while`
    pub nested_in_unbounded: bool,
}

impl LoopFacts {
    pub fn is_unbounded(&self) -> bool {
        matches!(self.kind, LoopKind::Loop | LoopKind::While)
    }
}

/// One `.fetch(..)` call site
#[derive(Debug, Clone)]
pub struct FetchCall {
    pub arg_count: usize,
    pub args: ExprFacts,
    /// Scrutinee of a `match`, `if let` or `let .. else`
    pub guarded: bool,
    pub under_try: bool,
}

/// Facts about one top-level function
#[derive(Debug, Clone, Default)]
pub struct FnFacts {
    pub name: String,
    pub is_pub: bool,
    pub is_async: bool,
    /// Call and method names in source order
    pub calls: Vec<String>,
    pub fetch_calls: Vec<FetchCall>,
    pub loops: Vec<LoopFacts>,
    /// Arguments of every `.take(..)`
    pub take_args: Vec<ExprFacts>,
    /// Bare-ident first arguments of every `.select(..)`
    pub select_args: Vec<String>,
    pub panicking_calls: usize,
    pub rollbacks: usize,
    pub rollbacks_on_err: usize,
    pub let_bindings: BTreeMap<String, ExprFacts>,
    /// Field initializers of `ArticleRecord { .. }` literals
    pub record_fields: BTreeMap<String, ExprFacts>,
    pub sleeps: bool,
}

impl FnFacts {
    pub fn calls(&self, name: &str) -> bool {
        self.calls.iter().any(|c| c == name)
    }

    pub fn first_call(&self, name: &str) -> Option<usize> {
        self.calls.iter().position(|c| c == name)
    }

    /// Whether the record field `field` is computed through `call`, directly
    /// or via a local binding it reads.
    pub fn field_calls(&self, field: &str, call: &str) -> bool {
        let Some(facts) = self.record_fields.get(field) else {
            return false;
        };
        facts.calls(call)
            || facts
                .idents
                .iter()
                .filter_map(|ident| self.let_bindings.get(ident))
                .any(|binding| binding.calls(call))
    }

    /// The const passed to the `.text(..)`/`.attr(..)` lookup that feeds
    /// record field `field`. `None` when the field reads no lookup or when
    /// its lookups disagree.
    pub fn field_selector(&self, field: &str) -> Option<&str> {
        let facts = self.record_fields.get(field)?;
        let mut args = facts.selector_args.iter().chain(
            facts
                .idents
                .iter()
                .filter_map(|ident| self.let_bindings.get(ident))
                .flat_map(|binding| binding.selector_args.iter()),
        );
        let first = args.next()?;
        args.all(|arg| arg == first).then_some(first.as_str())
    }
}

/// Everything the testing categories need to know about a source file
#[derive(Debug, Clone, Default)]
pub struct SourceFacts {
    pub consts: BTreeMap<String, ConstValue>,
    pub functions: BTreeMap<String, FnFacts>,
    pub imports_runtime: bool,
    pub has_unsafe: bool,
    pub spawns_process: bool,
    pub string_literals: Vec<String>,
}

impl SourceFacts {
    pub fn inspect(source: &str) -> Result<Self, syn::Error> {
        let file = syn::parse_file(source)?;
        let mut facts = Self::default();

        for item in &file.items {
            match item {
                Item::Const(item) => {
                    facts.consts.insert(item.ident.to_string(), const_value(&item.expr));
                }
                Item::Fn(item) => {
                    let mut visitor = FnVisitor::default();
                    visitor.visit_block(&item.block);
                    let name = item.sig.ident.to_string();
                    facts.functions.insert(
                        name.clone(),
                        FnFacts {
                            name,
                            is_pub: matches!(item.vis, Visibility::Public(_)),
                            is_async: item.sig.asyncness.is_some(),
                            ..visitor.facts
                        },
                    );
                }
                Item::Use(item) => {
                    let mut paths = Vec::new();
                    use_paths(&item.tree, Vec::new(), &mut paths);
                    if paths.iter().any(|p| p.len() >= 2 && p[0] == "scraper_forge" && p[1] == "runtime") {
                        facts.imports_runtime = true;
                    }
                }
                _ => {}
            }
        }

        let mut global = GlobalVisitor::default();
        global.visit_file(&file);
        facts.has_unsafe = global.has_unsafe;
        facts.spawns_process = global.spawns_process;
        facts.string_literals = global.string_literals;

        Ok(facts)
    }

    pub fn const_str(&self, name: &str) -> Option<&str> {
        match self.consts.get(name) {
            Some(ConstValue::Str(value)) => Some(value),
            _ => None,
        }
    }

    pub fn const_int(&self, name: &str) -> Option<u64> {
        match self.consts.get(name) {
            Some(ConstValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn function(&self, name: &str) -> Option<&FnFacts> {
        self.functions.get(name)
    }

    pub fn loops(&self) -> impl Iterator<Item = &LoopFacts> {
        self.functions.values().flat_map(|f| f.loops.iter())
    }

    pub fn fetch_calls(&self) -> impl Iterator<Item = &FetchCall> {
        self.functions.values().flat_map(|f| f.fetch_calls.iter())
    }
}

fn const_value(expr: &Expr) -> ConstValue {
    match expr {
        Expr::Lit(lit) => match &lit.lit {
            Lit::Str(s) => ConstValue::Str(s.value()),
            Lit::Int(i) => i.base10_parse::<u64>().map(ConstValue::Int).unwrap_or(ConstValue::Other),
            _ => ConstValue::Other,
        },
        _ => ConstValue::Other,
    }
}

fn use_paths(tree: &UseTree, prefix: Vec<String>, out: &mut Vec<Vec<String>>) {
    match tree {
        UseTree::Path(path) => {
            let mut next = prefix;
            next.push(path.ident.to_string());
            use_paths(&path.tree, next, out);
        }
        UseTree::Name(name) => {
            let mut full = prefix;
            full.push(name.ident.to_string());
            out.push(full);
        }
        UseTree::Rename(rename) => {
            let mut full = prefix;
            full.push(rename.ident.to_string());
            out.push(full);
        }
        UseTree::Glob(_) => out.push(prefix),
        UseTree::Group(group) => {
            for item in &group.items {
                use_paths(item, prefix.clone(), out);
            }
        }
    }
}

fn callee_name(func: &Expr) -> Option<String> {
    match func {
        Expr::Path(path) => path.path.segments.last().map(|s| s.ident.to_string()),
        _ => None,
    }
}

fn bare_ident(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Path(path) => path.path.get_ident().map(|i| i.to_string()),
        Expr::Reference(reference) => bare_ident(&reference.expr),
        _ => None,
    }
}

fn is_err_pattern(pat: &Pat) -> bool {
    match pat {
        Pat::TupleStruct(tuple) => tuple.path.segments.last().is_some_and(|s| s.ident == "Err"),
        Pat::Or(or) => or.cases.iter().any(is_err_pattern),
        _ => false,
    }
}

const DELAY_CALLS: &[&str] = &["sleep", "enforce_min_delay"];
const PANICKING_CALLS: &[&str] = &["unwrap", "expect"];

#[derive(Default)]
struct FnVisitor {
    facts: FnFacts,
    open_loops: Vec<usize>,
    guard_depth: usize,
    try_depth: usize,
    err_depth: usize,
}

impl FnVisitor {
    fn record_call(&mut self, name: String) {
        if DELAY_CALLS.contains(&name.as_str()) {
            self.facts.sleeps = true;
            for &index in &self.open_loops {
                self.facts.loops[index].delayed = true;
            }
        }
        if PANICKING_CALLS.contains(&name.as_str()) {
            self.facts.panicking_calls += 1;
        }
        if name == "rollback_batch" {
            self.facts.rollbacks += 1;
            if self.err_depth > 0 {
                self.facts.rollbacks_on_err += 1;
            }
        }
        self.facts.calls.push(name);
    }

    fn enter_loop(&mut self, kind: LoopKind) {
        let nested_in_unbounded = self.open_loops.iter().any(|&i| self.facts.loops[i].is_unbounded());
        self.facts.loops.push(LoopFacts {
            kind,
            delayed: false,
            nested_in_unbounded,
        });
        self.open_loops.push(self.facts.loops.len() - 1);
    }

    fn visit_guarded(&mut self, expr: &Expr) {
        self.guard_depth += 1;
        self.visit_expr(expr);
        self.guard_depth -= 1;
    }
}

impl<'ast> Visit<'ast> for FnVisitor {
    fn visit_expr_call(&mut self, node: &'ast syn::ExprCall) {
        if let Some(name) = callee_name(&node.func) {
            self.record_call(name);
        }
        visit::visit_expr_call(self, node);
    }

    fn visit_expr_method_call(&mut self, node: &'ast syn::ExprMethodCall) {
        let name = node.method.to_string();
        if name == "fetch" {
            let mut args = ExprFacts::default();
            for arg in &node.args {
                args.visit_expr(arg);
            }
            self.facts.fetch_calls.push(FetchCall {
                arg_count: node.args.len(),
                args,
                guarded: self.guard_depth > 0,
                under_try: self.try_depth > 0,
            });
        }
        if name == "select" {
            if let Some(ident) = node.args.first().and_then(bare_ident) {
                self.facts.select_args.push(ident);
            }
        }
        if name == "take" {
            let mut args = ExprFacts::default();
            for arg in &node.args {
                args.visit_expr(arg);
            }
            self.facts.take_args.push(args);
        }
        self.record_call(name);
        visit::visit_expr_method_call(self, node);
    }

    fn visit_expr_loop(&mut self, node: &'ast syn::ExprLoop) {
        self.enter_loop(LoopKind::Loop);
        visit::visit_expr_loop(self, node);
        self.open_loops.pop();
    }

    fn visit_expr_while(&mut self, node: &'ast syn::ExprWhile) {
        self.enter_loop(LoopKind::While);
        visit::visit_expr_while(self, node);
        self.open_loops.pop();
    }

    fn visit_expr_for_loop(&mut self, node: &'ast syn::ExprForLoop) {
        self.visit_expr(&node.expr);
        self.enter_loop(LoopKind::For);
        self.visit_pat(&node.pat);
        self.visit_block(&node.body);
        self.open_loops.pop();
    }

    fn visit_expr_match(&mut self, node: &'ast syn::ExprMatch) {
        self.visit_guarded(&node.expr);
        for arm in &node.arms {
            let on_err = is_err_pattern(&arm.pat);
            if on_err {
                self.err_depth += 1;
            }
            self.visit_arm(arm);
            if on_err {
                self.err_depth -= 1;
            }
        }
    }

    fn visit_expr_if(&mut self, node: &'ast syn::ExprIf) {
        let on_err = match node.cond.as_ref() {
            Expr::Let(expr_let) => is_err_pattern(&expr_let.pat),
            _ => false,
        };
        self.visit_expr(&node.cond);
        if on_err {
            self.err_depth += 1;
        }
        self.visit_block(&node.then_branch);
        if on_err {
            self.err_depth -= 1;
        }
        if let Some((_, else_branch)) = &node.else_branch {
            self.visit_expr(else_branch);
        }
    }

    fn visit_expr_let(&mut self, node: &'ast syn::ExprLet) {
        self.visit_pat(&node.pat);
        self.visit_guarded(&node.expr);
    }

    fn visit_expr_try(&mut self, node: &'ast syn::ExprTry) {
        self.try_depth += 1;
        self.visit_expr(&node.expr);
        self.try_depth -= 1;
    }

    fn visit_local(&mut self, node: &'ast syn::Local) {
        let Some(init) = &node.init else {
            visit::visit_local(self, node);
            return;
        };

        if let Pat::Ident(binding) = &node.pat {
            self.facts
                .let_bindings
                .insert(binding.ident.to_string(), ExprFacts::of(&init.expr));
        }

        self.visit_pat(&node.pat);
        if init.diverge.is_some() {
            self.visit_guarded(&init.expr);
        } else {
            self.visit_expr(&init.expr);
        }
        if let Some((_, diverge)) = &init.diverge {
            self.visit_expr(diverge);
        }
    }

    fn visit_expr_struct(&mut self, node: &'ast syn::ExprStruct) {
        if node.path.segments.last().is_some_and(|s| s.ident == "ArticleRecord") {
            for field in &node.fields {
                if let Member::Named(name) = &field.member {
                    self.facts.record_fields.insert(name.to_string(), ExprFacts::of(&field.expr));
                }
            }
        }
        visit::visit_expr_struct(self, node);
    }
}

#[derive(Default)]
struct GlobalVisitor {
    has_unsafe: bool,
    spawns_process: bool,
    string_literals: Vec<String>,
}

impl<'ast> Visit<'ast> for GlobalVisitor {
    fn visit_expr_unsafe(&mut self, node: &'ast syn::ExprUnsafe) {
        self.has_unsafe = true;
        visit::visit_expr_unsafe(self, node);
    }

    fn visit_signature(&mut self, node: &'ast syn::Signature) {
        if node.unsafety.is_some() {
            self.has_unsafe = true;
        }
        visit::visit_signature(self, node);
    }

    fn visit_item_impl(&mut self, node: &'ast syn::ItemImpl) {
        if node.unsafety.is_some() {
            self.has_unsafe = true;
        }
        visit::visit_item_impl(self, node);
    }

    fn visit_item_trait(&mut self, node: &'ast syn::ItemTrait) {
        if node.unsafety.is_some() {
            self.has_unsafe = true;
        }
        visit::visit_item_trait(self, node);
    }

    fn visit_path(&mut self, node: &'ast syn::Path) {
        if node.segments.iter().any(|s| s.ident == "Command" || s.ident == "process") {
            self.spawns_process = true;
        }
        visit::visit_path(self, node);
    }

    fn visit_use_tree(&mut self, node: &'ast UseTree) {
        let mut paths = Vec::new();
        use_paths(node, Vec::new(), &mut paths);
        if paths.iter().flatten().any(|s| s == "Command" || s == "process") {
            self.spawns_process = true;
        }
    }

    fn visit_lit_str(&mut self, node: &'ast syn::LitStr) {
        self.string_literals.push(node.value());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        use scraper_forge::runtime::{self, ArticleStore};
        pub const CRAWL_DELAY_SECONDS: u64 = 4;
        pub const USER_AGENT: &str = "Bot/1.0";

        pub async fn run(fetcher: &dyn Fetcher, store: &dyn ArticleStore) -> Summary {
            enforce_min_delay(&mut None).await;
            let page = match fetcher.fetch(BASE, USER_AGENT, Duration::from_secs(5)).await {
                Ok(page) => page,
                Err(e) => return fail(e),
            };
            for item in page.items().into_iter().take(MAX) {
                let title = runtime::sanitize_text(&item);
                store.write(&ArticleRecord { title, url: item.url() }).await;
            }
            if let Err(e) = store.commit_batch().await {
                store.rollback_batch().await;
            }
            store.rollback_batch().await;
            ok()
        }
    "#;

    #[test]
    fn test_collects_consts_and_imports() {
        let facts = SourceFacts::inspect(SAMPLE).unwrap();
        assert_eq!(facts.const_int("CRAWL_DELAY_SECONDS"), Some(4));
        assert_eq!(facts.const_str("USER_AGENT"), Some("Bot/1.0"));
        assert!(facts.imports_runtime);
        assert!(!facts.has_unsafe);
        assert!(!facts.spawns_process);
    }

    #[test]
    fn test_function_facts() {
        let facts = SourceFacts::inspect(SAMPLE).unwrap();
        let run = facts.function("run").unwrap();

        assert!(run.is_pub && run.is_async);
        assert!(run.first_call("enforce_min_delay") < run.first_call("fetch"));
        assert_eq!(run.fetch_calls.len(), 1);
        assert!(run.fetch_calls[0].guarded);
        assert!(!run.fetch_calls[0].under_try);
        assert_eq!(run.fetch_calls[0].arg_count, 3);
        assert!(run.fetch_calls[0].args.idents.contains("USER_AGENT"));
        assert_eq!(run.loops.len(), 1);
        assert_eq!(run.loops[0].kind, LoopKind::For);
        assert!(run.take_args[0].idents.contains("MAX"));
        assert_eq!(run.rollbacks, 2);
        assert_eq!(run.rollbacks_on_err, 1);
        assert!(run.field_calls("title", "sanitize_text"));
        assert!(!run.field_calls("url", "normalize_url"));
    }

    #[test]
    fn test_field_selectors_follow_bindings() {
        let source = r#"
            async fn extract_records(document: &Doc) -> Vec<ArticleRecord> {
                let title = match node.text(TITLE_SELECTOR) {
                    Some(raw) => runtime::sanitize_text(&raw),
                    None => continue,
                };
                let url = node.attr(TITLE_SELECTOR, "href").and_then(|h| runtime::normalize_url(BASE_URL, &h));
                ArticleRecord {
                    title,
                    url,
                    published: node.text(DATE_SELECTOR),
                    summary: None,
                    mixed: node.text(DATE_SELECTOR).or(node.text(SUMMARY_SELECTOR)),
                }
            }
        "#;
        let facts = SourceFacts::inspect(source).unwrap();
        let extract = facts.function("extract_records").unwrap();

        assert_eq!(extract.field_selector("title"), Some("TITLE_SELECTOR"));
        assert_eq!(extract.field_selector("url"), Some("TITLE_SELECTOR"));
        assert_eq!(extract.field_selector("published"), Some("DATE_SELECTOR"));
        assert_eq!(extract.field_selector("summary"), None);
        assert_eq!(extract.field_selector("mixed"), None);
        assert_eq!(extract.field_selector("author"), None);
    }

    #[test]
    fn test_banned_constructs_are_seen() {
        let source = r#"
            pub fn spin() {
                loop {
                    while busy() { step(); }
                    unsafe { poke(); }
                }
            }
            pub fn spawn() { std::process::Command::new("sh").spawn().unwrap(); }
            pub async fn fetch_all(f: &F) { let d = f.fetch(URL)?; }
        "#;
        let facts = SourceFacts::inspect(source).unwrap();

        assert!(facts.has_unsafe);
        assert!(facts.spawns_process);
        let spin = facts.function("spin").unwrap();
        assert_eq!(spin.loops.len(), 2);
        assert!(spin.loops.iter().all(|l| l.is_unbounded() && !l.delayed));
        assert!(spin.loops[1].nested_in_unbounded);
        assert_eq!(facts.function("spawn").unwrap().panicking_calls, 1);

        let fetch = &facts.function("fetch_all").unwrap().fetch_calls[0];
        assert!(fetch.under_try);
        assert!(!fetch.guarded);
    }

    #[test]
    fn test_unparseable_source() {
        assert!(SourceFacts::inspect("pub async fn run( {").is_err());
    }
}
