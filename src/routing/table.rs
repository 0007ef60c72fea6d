//! The authoritative route table.
//!
//! # Responsibilities
//! - Store published routes, grouped for lookup
//! - Atomically add/replace/remove routes by id
//! - Produce an ordered, lazy candidate sequence for a request path
//!
//! # Grouping
//! ```text
//! literal route  "/a/b"      → literal group "/a/b"
//! pattern route  "/a/*/c"    → prefix group  "/a"   (constant prefix)
//! pattern route  "/{id}"     → prefix group  "/"
//!
//! lookup("/a/b/c"):
//!     literal "/a/b/c"
//!     → prefix "/a/b/c" → prefix "/a/b" → prefix "/a" → prefix "/"
//! ```
//!
//! # Design Decisions
//! - Single writer at a time (mutation lock); readers never take it
//! - Concurrent maps so lookups never tear while a mutation is in flight
//! - Each group caches its materialized member list, rebuilt only when dirty
//! - Within a group, routes are ordered by insertion; a replace moves the
//!   route to the end of its group
//! - Reads are not linearizable with writes, but a route no longer present in
//!   the id index is never yielded

use arc_swap::ArcSwap;
use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::RouteError;
use crate::observability::metrics;
use crate::routing::matcher::{PathMatcher, UriVariables};
use crate::routing::route::{normalize_path, Route};

/// Which group family a route lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
enum GroupKey {
    /// Exact normalized literal path.
    Literal(String),
    /// Constant prefix of a pattern.
    Prefix(String),
}

impl GroupKey {
    fn name(&self) -> &str {
        match self {
            GroupKey::Literal(name) | GroupKey::Prefix(name) => name,
        }
    }
}

/// Routes sharing one literal path or one constant prefix.
#[derive(Debug)]
struct RouteGroup {
    members: RwLock<IndexMap<String, Arc<Route>>>,
    dirty: AtomicBool,
    snapshot: ArcSwap<Vec<Arc<Route>>>,
}

impl RouteGroup {
    fn new() -> Self {
        Self {
            members: RwLock::new(IndexMap::new()),
            dirty: AtomicBool::new(false),
            snapshot: ArcSwap::from_pointee(Vec::new()),
        }
    }

    fn insert(&self, route: Arc<Route>) {
        let mut members = self.members.write();
        members.insert(route.id().to_string(), route);
        self.dirty.store(true, Ordering::Release);
    }

    /// Remove a member; returns true if the group is now empty.
    fn remove(&self, id: &str) -> bool {
        let mut members = self.members.write();
        members.shift_remove(id);
        self.dirty.store(true, Ordering::Release);
        members.is_empty()
    }

    fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }

    /// Materialized member list, rebuilt lazily after a mutation.
    fn routes(&self) -> Arc<Vec<Arc<Route>>> {
        if self.dirty.load(Ordering::Acquire) {
            let members = self.members.read();
            if self.dirty.swap(false, Ordering::AcqRel) {
                self.snapshot
                    .store(Arc::new(members.values().cloned().collect()));
            }
        }
        self.snapshot.load_full()
    }
}

#[derive(Debug, Clone)]
struct IndexedRoute {
    key: GroupKey,
    route: Arc<Route>,
}

/// Concurrently readable, single-writer route table.
#[derive(Debug)]
pub struct RouteTable {
    matcher: PathMatcher,
    literal_groups: DashMap<String, Arc<RouteGroup>>,
    prefix_groups: DashMap<String, Arc<RouteGroup>>,
    index: DashMap<String, IndexedRoute>,
    writer: Mutex<()>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new(PathMatcher::default())
    }
}

impl RouteTable {
    pub fn new(matcher: PathMatcher) -> Self {
        Self {
            matcher,
            literal_groups: DashMap::new(),
            prefix_groups: DashMap::new(),
            index: DashMap::new(),
            writer: Mutex::new(()),
        }
    }

    /// The matcher used for grouping and pattern evaluation.
    pub fn matcher(&self) -> &PathMatcher {
        &self.matcher
    }

    /// Publish a route, replacing any route with the same id.
    ///
    /// The pattern is compiled before anything is published, so a bad
    /// `{name:regex}` leaves the table untouched.
    pub fn add(&self, route: Route) -> Result<Arc<Route>, RouteError> {
        if route.id().is_empty() {
            return Err(RouteError::EmptyId);
        }
        let route = route.normalized(self.matcher.separator());
        self.matcher
            .validate(route.path())
            .map_err(|source| RouteError::InvalidPattern {
                id: route.id().to_string(),
                source,
            })?;

        let key = self.group_key(route.path());
        let route = Arc::new(route);

        let _writer = self.writer.lock();
        if let Some((_, previous)) = self.index.remove(route.id()) {
            self.detach(&previous.key, route.id());
            tracing::debug!(
                route_id = %route.id(),
                old_path = %previous.route.path(),
                new_path = %route.path(),
                "Replacing route"
            );
        }

        let group = {
            let groups = self.groups(&key);
            let entry = groups
                .entry(key.name().to_string())
                .or_insert_with(|| Arc::new(RouteGroup::new()));
            Arc::clone(entry.value())
        };
        group.insert(Arc::clone(&route));
        self.index.insert(
            route.id().to_string(),
            IndexedRoute {
                key,
                route: Arc::clone(&route),
            },
        );

        metrics::record_route_count(self.index.len());
        tracing::debug!(route_id = %route.id(), path = %route.path(), "Route published");
        Ok(route)
    }

    /// Remove a route by id. Unknown ids are a no-op.
    pub fn remove_by_id(&self, id: &str) -> Option<Arc<Route>> {
        let _writer = self.writer.lock();
        let (_, removed) = self.index.remove(id)?;
        self.detach(&removed.key, id);

        metrics::record_route_count(self.index.len());
        tracing::debug!(route_id = %id, path = %removed.route.path(), "Route removed");
        Some(removed.route)
    }

    /// Candidate routes for `path`, in priority order: the exact literal
    /// group first, then prefix groups from the longest prefix to the root.
    ///
    /// Groups are only materialized as the sequence is consumed.
    pub fn lookup(&self, path: &str) -> Lookup<'_> {
        let path = self.normalize(path);
        let mut groups = Vec::new();

        if let Some(group) = self.literal_groups.get(&path) {
            groups.push((false, Arc::clone(group.value())));
        }
        for prefix in prefixes(&path, self.matcher.separator()) {
            if let Some(group) = self.prefix_groups.get(prefix) {
                groups.push((true, Arc::clone(group.value())));
            }
        }

        Lookup {
            table: self,
            path,
            groups: groups.into_iter(),
            cursor: None,
        }
    }

    /// Template variables of `route` for `path`; empty for literal routes.
    pub fn uri_variables(&self, route: &Route, path: &str) -> UriVariables {
        let path = self.normalize(path);
        match self.matcher.extract_variables(route.path(), &path) {
            Ok(variables) => variables,
            Err(e) => {
                tracing::warn!(route_id = %route.id(), path = %path, error = %e, "Variable extraction failed");
                UriVariables::new()
            }
        }
    }

    /// Look up a published route by id.
    pub fn get(&self, id: &str) -> Option<Arc<Route>> {
        self.index.get(id).map(|entry| Arc::clone(&entry.route))
    }

    /// Snapshot of every published route (unordered).
    pub fn routes(&self) -> Vec<Arc<Route>> {
        self.index
            .iter()
            .map(|entry| Arc::clone(&entry.route))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Normalize a request path with this table's separator.
    pub fn normalize(&self, path: &str) -> String {
        normalize_path(path, self.matcher.separator())
    }

    fn group_key(&self, path: &str) -> GroupKey {
        if self.matcher.is_pattern(path) {
            GroupKey::Prefix(self.matcher.constant_prefix(path).to_string())
        } else {
            GroupKey::Literal(path.to_string())
        }
    }

    fn groups(&self, key: &GroupKey) -> &DashMap<String, Arc<RouteGroup>> {
        match key {
            GroupKey::Literal(_) => &self.literal_groups,
            GroupKey::Prefix(_) => &self.prefix_groups,
        }
    }

    /// Remove `id` from its group, dropping the group once empty.
    /// Caller holds the writer lock.
    fn detach(&self, key: &GroupKey, id: &str) {
        let groups = self.groups(key);
        let group = groups.get(key.name()).map(|g| Arc::clone(g.value()));
        if let Some(group) = group {
            if group.remove(id) {
                groups.remove_if(key.name(), |_, g| g.is_empty());
            }
        }
    }

    fn is_live(&self, route: &Arc<Route>) -> bool {
        self.index
            .get(route.id())
            .map(|entry| Arc::ptr_eq(&entry.route, route))
            .unwrap_or(false)
    }
}

/// Directory prefixes of `path`, longest first, ending at the root separator.
fn prefixes(path: &str, separator: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut current = path.trim_end_matches(separator);
    while !current.is_empty() {
        out.push(current);
        match current.rfind(separator) {
            Some(idx) => current = &current[..idx],
            None => break,
        }
    }
    if path.starts_with(separator) {
        out.push(&path[..separator.len_utf8()]);
    }
    out
}

struct Cursor {
    match_pattern: bool,
    routes: Arc<Vec<Arc<Route>>>,
    position: usize,
}

/// Lazy, ordered candidate sequence produced by [`RouteTable::lookup`].
pub struct Lookup<'a> {
    table: &'a RouteTable,
    path: String,
    groups: std::vec::IntoIter<(bool, Arc<RouteGroup>)>,
    cursor: Option<Cursor>,
}

impl Lookup<'_> {
    /// The normalized path being looked up.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Iterator for Lookup<'_> {
    type Item = Arc<Route>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(cursor) = self.cursor.as_mut() {
                while let Some(route) = cursor.routes.get(cursor.position) {
                    cursor.position += 1;
                    if !self.table.is_live(route) {
                        continue;
                    }
                    if cursor.match_pattern {
                        match self.table.matcher.matches(route.path(), &self.path) {
                            Ok(true) => {}
                            Ok(false) => continue,
                            Err(e) => {
                                tracing::warn!(route_id = %route.id(), error = %e, "Route pattern failed to compile");
                                continue;
                            }
                        }
                    }
                    return Some(Arc::clone(route));
                }
            }

            let (match_pattern, group) = self.groups.next()?;
            self.cursor = Some(Cursor {
                match_pattern,
                routes: group.routes(),
                position: 0,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn route(id: &str, path: &str) -> Route {
        Route::builder(id, path).build()
    }

    fn ids(table: &RouteTable, path: &str) -> Vec<String> {
        table.lookup(path).map(|r| r.id().to_string()).collect()
    }

    #[test]
    fn add_with_same_id_replaces() {
        let table = RouteTable::default();
        table.add(route("r1", "/a/b")).unwrap();
        table.add(route("r1", "/a/c")).unwrap();

        assert!(ids(&table, "/a/b").is_empty());
        assert_eq!(ids(&table, "/a/c"), vec!["r1"]);
        assert_eq!(table.len(), 1);
        // the old literal group was dropped once empty
        assert!(table.literal_groups.get("/a/b").is_none());
    }

    #[test]
    fn replace_can_move_between_group_families() {
        let table = RouteTable::default();
        table.add(route("r1", "/a/b")).unwrap();
        table.add(route("r1", "/a/*")).unwrap();

        assert_eq!(ids(&table, "/a/b"), vec!["r1"]);
        assert!(table.literal_groups.is_empty());
        assert_eq!(table.get("r1").unwrap().path(), "/a/*");
    }

    #[test]
    fn remove_unknown_id_is_noop() {
        let table = RouteTable::default();
        table.add(route("r1", "/a")).unwrap();
        assert!(table.remove_by_id("does-not-exist").is_none());
        assert_eq!(table.len(), 1);
        assert_eq!(ids(&table, "/a"), vec!["r1"]);
    }

    #[test]
    fn remove_drops_empty_groups() {
        let table = RouteTable::default();
        table.add(route("r1", "/a/**")).unwrap();
        table.add(route("r2", "/a/*/x")).unwrap();

        table.remove_by_id("r1").unwrap();
        assert!(table.prefix_groups.get("/a").is_some());
        table.remove_by_id("r2").unwrap();
        assert!(table.prefix_groups.get("/a").is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn literal_group_precedes_pattern_groups() {
        let table = RouteTable::default();
        table.add(route("pattern", "/a/*")).unwrap();
        table.add(route("root", "/**")).unwrap();
        table.add(route("literal", "/a/b")).unwrap();

        assert_eq!(ids(&table, "/a/b"), vec!["literal", "pattern", "root"]);
    }

    #[test]
    fn closer_prefix_groups_come_first() {
        let table = RouteTable::default();
        table.add(route("shallow", "/a/**")).unwrap();
        table.add(route("deep", "/a/b/c/*")).unwrap();
        table.add(route("middle", "/a/b/**")).unwrap();

        assert_eq!(ids(&table, "/a/b/c/d"), vec!["deep", "middle", "shallow"]);
    }

    #[test]
    fn lookup_only_yields_matching_patterns() {
        let table = RouteTable::default();
        table.add(route("digits", r"/users/{id:\d+}")).unwrap();
        table.add(route("names", "/users/{name}")).unwrap();

        assert_eq!(ids(&table, "/users/42"), vec!["digits", "names"]);
        assert_eq!(ids(&table, "/users/ann"), vec!["names"]);
        assert!(ids(&table, "/users/ann/x").is_empty());
        assert!(ids(&table, "/other").is_empty());
    }

    #[test]
    fn lookup_normalizes_request_path() {
        let table = RouteTable::default();
        table.add(route("r1", "/a/b")).unwrap();
        assert_eq!(ids(&table, "//a//b"), vec!["r1"]);
        assert_eq!(table.lookup("a/b").path(), "/a/b");
    }

    #[test]
    fn insertion_order_within_group() {
        let table = RouteTable::default();
        table.add(route("first", "/a/b")).unwrap();
        table.add(route("second", "/a/b")).unwrap();
        assert_eq!(ids(&table, "/a/b"), vec!["first", "second"]);

        // replace moves to the back
        table.add(route("first", "/a/b")).unwrap();
        assert_eq!(ids(&table, "/a/b"), vec!["second", "first"]);
    }

    #[test]
    fn group_snapshot_is_cached_until_mutation() {
        let table = RouteTable::default();
        table.add(route("r1", "/a")).unwrap();
        let group = table.literal_groups.get("/a").map(|g| Arc::clone(g.value())).unwrap();

        let first = group.routes();
        let second = group.routes();
        assert!(Arc::ptr_eq(&first, &second));

        table.add(route("r2", "/a")).unwrap();
        let third = group.routes();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.len(), 2);
    }

    #[test]
    fn invalid_pattern_is_rejected_without_publishing() {
        let table = RouteTable::default();
        table.add(route("r1", "/a/{id}")).unwrap();
        let err = table.add(route("r1", "/a/{id:[}")).unwrap_err();
        assert!(matches!(err, RouteError::InvalidPattern { .. }));
        assert_eq!(table.get("r1").unwrap().path(), "/a/{id}");
        assert_eq!(table.add(route("", "/a")).unwrap_err(), RouteError::EmptyId);
    }

    #[test]
    fn prefixes_walk_to_root() {
        assert_eq!(prefixes("/a/b/c", '/'), vec!["/a/b/c", "/a/b", "/a", "/"]);
        assert_eq!(prefixes("/a/b/", '/'), vec!["/a/b", "/a", "/"]);
        assert_eq!(prefixes("/", '/'), vec!["/"]);
    }

    #[test]
    fn uri_variables_for_matched_route() {
        let table = RouteTable::default();
        let r = table.add(route("r1", "/orders/{id}")).unwrap();
        assert_eq!(table.uri_variables(&r, "/orders/7")["id"], "7");
        assert!(table.uri_variables(&r, "/nope").is_empty());
    }

    #[test]
    fn concurrent_mutation_and_lookup() {
        let table = Arc::new(RouteTable::default());
        table.add(route("stable", "/svc/**")).unwrap();

        thread::scope(|scope| {
            for writer in 0..4 {
                let table = Arc::clone(&table);
                scope.spawn(move || {
                    for i in 0..200 {
                        let id = format!("w{writer}-{}", i % 10);
                        if i % 3 == 0 {
                            table.remove_by_id(&id);
                        } else {
                            let path = if i % 2 == 0 { "/svc/a" } else { "/svc/*" };
                            table.add(route(&id, path)).unwrap();
                        }
                    }
                });
            }
            for _ in 0..4 {
                let table = Arc::clone(&table);
                scope.spawn(move || {
                    for _ in 0..500 {
                        let found: Vec<_> = table.lookup("/svc/a").collect();
                        assert!(found.iter().any(|r| r.id() == "stable"));
                        let mut seen = std::collections::HashSet::new();
                        for r in &found {
                            assert!(seen.insert(Arc::as_ptr(r)));
                        }
                    }
                });
            }
        });

        // once quiescent, lookup reflects exactly the live routes
        let mut live: Vec<String> = table.routes().iter().map(|r| r.id().to_string()).collect();
        let mut found = ids(&table, "/svc/a");
        live.sort();
        found.sort();
        assert_eq!(live, found);
    }
}
