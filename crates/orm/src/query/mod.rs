//! Query Builder Module - query IR and the fluent builder that runs it

pub mod builder;
pub mod dml;
pub mod execution;
pub mod joins;
pub mod ordering;
pub mod pagination;
pub mod types;
pub mod where_clause;
pub mod with;

pub use builder::QueryBuilder;
pub use types::*;
pub use with::{Children, EagerLoad, Parent};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::backends::{BackendCapabilities, MemoryDatabase};
    use crate::config::PoolConfig;
    use crate::connection::Database;
    use crate::error::ModelError;
    use crate::model::Model;
    use crate::schema::SchemaBuilder;
    use futures::FutureExt;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Post {
        id: Option<i64>,
        title: String,
        deleted_at: Option<DateTime<Utc>>,
    }

    impl Model for Post {
        type PrimaryKey = i64;

        fn entity() -> &'static str {
            "posts"
        }

        fn primary_key(&self) -> Option<i64> {
            self.id
        }

        fn set_primary_key(&mut self, key: i64) {
            self.id = Some(key);
        }

        fn uses_soft_deletes() -> bool {
            true
        }

        fn deleted_at(&self) -> Option<DateTime<Utc>> {
            self.deleted_at
        }

        fn set_deleted_at(&mut self, timestamp: Option<DateTime<Utc>>) {
            self.deleted_at = timestamp;
        }
    }

    fn post(title: &str) -> Post {
        Post {
            id: None,
            title: title.to_string(),
            deleted_at: None,
        }
    }

    async fn database() -> Database {
        let database = Database::connect("main", Arc::new(MemoryDatabase::new()), PoolConfig::default()).unwrap();
        database
            .with_connection(|conn| {
                SchemaBuilder::create("posts")
                    .id()
                    .string("title", None, true)
                    .soft_deletes()
                    .run(&mut **conn)
                    .boxed()
            })
            .await
            .unwrap();
        database
    }

    fn count_soft_delete_groups(filters: &[Filter]) -> usize {
        filters
            .iter()
            .filter(|filter| match filter {
                Filter::Group { filters, relation: Relation::Or } => filters.iter().any(|f| {
                    matches!(f, Filter::Basic { field, value: Value::Null, .. } if field == "deleted_at")
                }),
                _ => false,
            })
            .count()
    }

    #[tokio::test]
    async fn test_soft_delete_scope_is_added_once() {
        let database = database().await;
        let builder = database
            .query::<Post>()
            .filter_eq("title", "a")
            .filter_ne("title", "b")
            .limit(3);

        let executed = builder.to_query(QueryAction::Read);
        assert_eq!(count_soft_delete_groups(&executed.filters), 1);
        assert_eq!(executed.filters.len(), 3);

        // Executing does not fold the scope back into the builder
        builder.all().await.unwrap();
        assert_eq!(count_soft_delete_groups(&builder.query().filters), 0);
        assert_eq!(count_soft_delete_groups(&builder.to_query(QueryAction::Read).filters), 1);

        let unscoped = builder.clone().with_soft_deleted().to_query(QueryAction::Read);
        assert_eq!(count_soft_delete_groups(&unscoped.filters), 0);
    }

    #[tokio::test]
    async fn test_soft_delete_and_restore() {
        let database = database().await;
        let posts = database.query::<Post>();
        let kept = posts.create(post("kept")).await.unwrap();
        let gone = posts.create(post("gone")).await.unwrap();

        let gone = posts.delete(gone).await.unwrap();
        assert!(gone.is_soft_deleted());
        assert_eq!(posts.count().await.unwrap(), 1);
        assert_eq!(posts.clone().with_soft_deleted().count().await.unwrap(), 2);
        assert_eq!(posts.all().await.unwrap(), vec![kept.clone()]);

        let restored = posts.restore(gone).await.unwrap();
        assert_eq!(restored.deleted_at, None);
        assert_eq!(posts.count().await.unwrap(), 2);

        posts.force_delete(kept).await.unwrap();
        assert_eq!(posts.clone().with_soft_deleted().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_groups_and_paging() {
        let database = database().await;
        let posts = database.query::<Post>();
        for title in ["alpha", "beta", "gamma", "delta", "epsilon"] {
            posts.create(post(title)).await.unwrap();
        }

        let empty_and = posts.clone().group(Relation::And, |group| group);
        assert_eq!(empty_and.all().await.unwrap().len(), 5);

        let empty_or = posts.clone().group(Relation::Or, |group| group);
        assert!(empty_or.all().await.unwrap().is_empty());

        let either = posts
            .clone()
            .group(Relation::Or, |group| group.filter_eq("title", "beta").filter_ends_with("title", "ta"));
        let titles: Vec<String> = either.all().await.unwrap().into_iter().map(|p| p.title).collect();
        assert_eq!(titles, vec!["beta", "delta"]);

        let page: Vec<String> = posts
            .clone()
            .sort("title", OrderDirection::Asc)
            .paginate(2, 2)
            .all()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(page, vec!["delta", "epsilon"]);

        let first_page = posts.clone().paginate(0, 2).to_query(QueryAction::Read);
        assert_eq!(first_page.offset, Some(0));
    }

    #[tokio::test]
    async fn test_find_and_missing_identifier() {
        let database = database().await;
        let posts = database.query::<Post>();
        let created = posts.create(post("alpha")).await.unwrap();

        assert_eq!(posts.find(1).await.unwrap(), Some(created));
        assert_eq!(posts.find(9).await.unwrap(), None);
        assert!(matches!(posts.find_or_fail(9).await, Err(ModelError::NotFound(_))));

        let err = posts.update(post("orphan")).await.unwrap_err();
        assert!(matches!(err, ModelError::MissingPrimaryKey { .. }));
        let err = posts.delete(post("orphan")).await.unwrap_err();
        assert!(matches!(err, ModelError::MissingPrimaryKey { .. }));
    }

    #[tokio::test]
    async fn test_chunk_preserves_order() {
        let database = database().await;
        let posts = database.query::<Post>();
        for index in 0..7 {
            posts.create(post(&format!("post-{}", index))).await.unwrap();
        }

        let mut batches: Vec<Vec<i64>> = Vec::new();
        posts
            .chunk(3, |batch| {
                batches.push(batch.into_iter().filter_map(|p| p.id).collect());
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(batches, vec![vec![1, 2, 3], vec![4, 5, 6], vec![7]]);
        assert!(matches!(posts.chunk(0, |_| Ok(())).await, Err(ModelError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_chunk_size_is_only_an_upper_bound() {
        let database = database().await;
        let posts = database.query::<Post>();
        posts.create(post("only")).await.unwrap();

        let mut sizes = Vec::new();
        posts
            .chunk(usize::MAX, |batch| {
                sizes.push(batch.len());
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(sizes, vec![1]);
    }

    #[tokio::test]
    async fn test_join_requires_capability() {
        let database = database().await;
        let result = database
            .query::<Post>()
            .join(FieldRef::new("comments", "post_id"), FieldRef::new("posts", "id"));
        assert!(matches!(result, Err(ModelError::Unsupported(_))));

        let sql_like = Database::connect(
            "sql",
            Arc::new(MemoryDatabase::with_capabilities(BackendCapabilities::ALL)),
            PoolConfig::default(),
        )
        .unwrap();
        // The memory engine never claims joins, whatever it is asked for
        assert!(!sql_like.capabilities().joins);
    }

    #[tokio::test]
    async fn test_bulk_operations() {
        let database = database().await;
        let posts = database.query::<Post>();
        for title in ["a1", "a2", "b1"] {
            posts.create(post(title)).await.unwrap();
        }

        let changed = posts
            .clone()
            .filter_starts_with("title", "a")
            .bulk_update(vec![("title".to_string(), Value::from("renamed"))])
            .await
            .unwrap();
        assert_eq!(changed, 2);

        let removed = posts.clone().filter_eq("title", "renamed").bulk_delete().await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(posts.count().await.unwrap(), 1);
    }
}
