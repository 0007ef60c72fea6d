//! Route feed backed by the `[[routes]]` table of the config file.
//!
//! Each pull re-reads the file and emits the difference from the previous
//! pull: deletes for ids that disappeared, upserts for new or changed
//! definitions. An unchanged file yields no deltas.

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::loader::parse_config;
use crate::config::schema::RouteDefinition;
use crate::error::FeedError;
use crate::filters::{build_route, FilterRegistry};
use crate::sync::delta::{DeltaSource, RouteDelta};

pub struct FileDeltaSource {
    path: PathBuf,
    registry: Arc<dyn FilterRegistry>,
    published: Mutex<HashMap<String, RouteDefinition>>,
}

impl FileDeltaSource {
    pub fn new(path: impl Into<PathBuf>, registry: Arc<dyn FilterRegistry>) -> Self {
        Self {
            path: path.into(),
            registry,
            published: Mutex::new(HashMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn diff(&self, routes: Vec<RouteDefinition>) -> Vec<RouteDelta> {
        let current: IndexMap<String, RouteDefinition> = routes
            .into_iter()
            .map(|route| (route.id.clone(), route))
            .collect();

        let mut published = self.published.lock();
        let mut deltas = Vec::new();

        let removed: Vec<String> = published
            .keys()
            .filter(|id| !current.contains_key(*id))
            .cloned()
            .collect();
        for id in removed {
            published.remove(&id);
            deltas.push(RouteDelta::Delete(id));
        }

        for (id, definition) in current {
            if published.get(&id) == Some(&definition) {
                continue;
            }
            match build_route(&definition, self.registry.as_ref()) {
                Ok(route) => {
                    deltas.push(RouteDelta::Upsert(route));
                    published.insert(id, definition);
                }
                Err(e) => {
                    // the last published definition stays recorded, so the
                    // id is still deleted once it leaves the file; the bad
                    // definition is retried on the next pull
                    tracing::error!(route_id = %id, error = %e, "Route definition rejected");
                }
            }
        }

        deltas
    }
}

#[async_trait]
impl DeltaSource for FileDeltaSource {
    async fn fetch(&self) -> Result<Vec<RouteDelta>, FeedError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let config = parse_config(&content).map_err(|e| FeedError::Decode(e.to_string()))?;
        let deltas = self.diff(config.routes);

        tracing::debug!(path = ?self.path, deltas = deltas.len(), "Route file pulled");
        Ok(deltas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::BuiltinFilters;
    use std::io::{Seek, SeekFrom, Write};

    fn write(file: &mut tempfile::NamedTempFile, content: &str) {
        let f = file.as_file_mut();
        f.set_len(0).unwrap();
        f.seek(SeekFrom::Start(0)).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
    }

    fn summary(deltas: &[RouteDelta]) -> Vec<String> {
        deltas
            .iter()
            .map(|d| match d {
                RouteDelta::Upsert(r) => format!("+{}", r.id()),
                RouteDelta::Delete(id) => format!("-{id}"),
                RouteDelta::Heartbeat => "~".to_string(),
            })
            .collect()
    }

    const TWO_ROUTES: &str = r#"
        [[routes]]
        id = "a"
        path = "/a"

        [[routes]]
        id = "b"
        path = "/b/**"
    "#;

    #[tokio::test]
    async fn emits_only_changes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write(&mut file, TWO_ROUTES);
        let source = FileDeltaSource::new(file.path(), Arc::new(BuiltinFilters));

        assert_eq!(summary(&source.fetch().await.unwrap()), vec!["+a", "+b"]);
        assert!(source.fetch().await.unwrap().is_empty());

        write(
            &mut file,
            r#"
            [[routes]]
            id = "b"
            path = "/b/*"

            [[routes]]
            id = "c"
            path = "/c"
            "#,
        );
        assert_eq!(summary(&source.fetch().await.unwrap()), vec!["-a", "+b", "+c"]);
    }

    #[tokio::test]
    async fn unreadable_or_invalid_file_is_a_feed_error() {
        let source = FileDeltaSource::new("/definitely/not/here.toml", Arc::new(BuiltinFilters));
        assert!(matches!(source.fetch().await, Err(FeedError::Io(_))));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write(&mut file, "[[routes]]\nid = \"x\"\npath = \"/{id:[}\"\n");
        let source = FileDeltaSource::new(file.path(), Arc::new(BuiltinFilters));
        assert!(matches!(source.fetch().await, Err(FeedError::Decode(_))));
    }

    #[tokio::test]
    async fn rejected_definition_is_retried() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write(
            &mut file,
            "[[routes]]\nid = \"x\"\npath = \"/x\"\nfilters = [{ name = \"teleport\" }]\n",
        );
        let source = FileDeltaSource::new(file.path(), Arc::new(BuiltinFilters));
        assert!(source.fetch().await.unwrap().is_empty());

        write(
            &mut file,
            "[[routes]]\nid = \"x\"\npath = \"/x\"\nfilters = [{ name = \"respond\" }]\n",
        );
        assert_eq!(summary(&source.fetch().await.unwrap()), vec!["+x"]);
    }

    #[tokio::test]
    async fn edited_route_that_fails_to_build_can_still_be_removed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write(
            &mut file,
            "[[routes]]\nid = \"x\"\npath = \"/x\"\nfilters = [{ name = \"respond\" }]\n",
        );
        let source = FileDeltaSource::new(file.path(), Arc::new(BuiltinFilters));
        assert_eq!(summary(&source.fetch().await.unwrap()), vec!["+x"]);

        write(
            &mut file,
            "[[routes]]\nid = \"x\"\npath = \"/x\"\nfilters = [{ name = \"teleport\" }]\n",
        );
        assert!(source.fetch().await.unwrap().is_empty());
        assert!(source.fetch().await.unwrap().is_empty());

        write(&mut file, "[[routes]]\nid = \"y\"\npath = \"/y\"\n");
        assert_eq!(summary(&source.fetch().await.unwrap()), vec!["-x", "+y"]);
    }
}
