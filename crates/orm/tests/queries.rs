use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use quarry_orm::query::{FieldRef, Relation};
use quarry_orm::{
    Children, Connection, Database, DatabaseQuery, EventError, Filter, MemoryDatabase, Model, ModelError,
    ModelObserver, Parent, PoolConfig, QueryAction, SchemaBuilder, Value,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    id: Option<i64>,
    name: String,
    email: Option<String>,
    tags: Vec<String>,
}

impl Model for User {
    type PrimaryKey = i64;

    fn entity() -> &'static str {
        "users"
    }

    fn primary_key(&self) -> Option<i64> {
        self.id
    }

    fn set_primary_key(&mut self, key: i64) {
        self.id = Some(key);
    }
}

fn user(name: &str) -> User {
    User {
        id: None,
        name: name.to_string(),
        email: None,
        tags: Vec::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Author {
    id: Option<i64>,
    name: String,
    #[serde(skip)]
    books: Vec<Book>,
}

impl Model for Author {
    type PrimaryKey = i64;

    fn entity() -> &'static str {
        "authors"
    }

    fn primary_key(&self) -> Option<i64> {
        self.id
    }

    fn set_primary_key(&mut self, key: i64) {
        self.id = Some(key);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Book {
    id: Option<i64>,
    author_id: i64,
    title: String,
    #[serde(skip)]
    author: Option<Author>,
}

impl Model for Book {
    type PrimaryKey = i64;

    fn entity() -> &'static str {
        "books"
    }

    fn primary_key(&self) -> Option<i64> {
        self.id
    }

    fn set_primary_key(&mut self, key: i64) {
        self.id = Some(key);
    }
}

async fn database() -> (Database, Arc<MemoryDatabase>) {
    let factory = Arc::new(MemoryDatabase::new());
    let database = Database::connect("main", factory.clone(), PoolConfig::default()).unwrap();
    database
        .with_connection(|conn| {
            async move {
                SchemaBuilder::create("users")
                    .id()
                    .string("name", None, true)
                    .string("email", None, false)
                    .json("tags", false)
                    .run(&mut **conn)
                    .await?;
                SchemaBuilder::create("authors").id().string("name", None, true).run(&mut **conn).await?;
                SchemaBuilder::create("books")
                    .id()
                    .big_int("author_id", true)
                    .string("title", None, true)
                    .index(&["author_id"])
                    .run(&mut **conn)
                    .await
            }
            .boxed()
        })
        .await
        .unwrap();
    (database, factory)
}

#[tokio::test]
async fn test_created_identifiers_increase() {
    let (database, _factory) = database().await;
    let users = database.query::<User>();

    let ada = users.create(user("Ada")).await.unwrap();
    let grace = users.create(user("Grace")).await.unwrap();
    assert_eq!(ada.id, Some(1));
    assert_eq!(grace.id, Some(2));
}

#[tokio::test]
async fn test_model_round_trips_through_a_row() {
    let (database, _factory) = database().await;
    let users = database.query::<User>();
    let original = User {
        id: None,
        name: "Ada".to_string(),
        email: Some("ada@example.com".to_string()),
        tags: vec!["math".to_string(), "engines".to_string()],
    };

    let created = users.create(original.clone()).await.unwrap();
    let found = users.find_or_fail(created.id.unwrap()).await.unwrap();
    assert_eq!(User { id: None, ..found.clone() }, original);
    assert_eq!(found, created);
}

#[tokio::test]
async fn test_empty_and_group_matches_every_row() {
    let (database, factory) = database().await;
    let users = database.query::<User>();
    for name in ["a", "b", "c", "d", "e"] {
        users.create(user(name)).await.unwrap();
    }

    let mut query = DatabaseQuery::new("users", QueryAction::Read);
    query.filters.push(Filter::group(Vec::new(), Relation::And));
    let mut connection = factory.connection();
    assert_eq!(connection.execute(&query).await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_update_save_and_delete() {
    let (database, factory) = database().await;
    let users = database.query::<User>();

    let mut ada = users.save(user("Ada")).await.unwrap();
    ada.email = Some("ada@example.com".to_string());
    let ada = users.save(ada).await.unwrap();
    assert_eq!(
        users.clone().filter_not_null("email").first().await.unwrap().map(|u| u.name),
        Some("Ada".to_string())
    );

    users.delete(ada.clone()).await.unwrap();
    assert_eq!(factory.rows("users").unwrap().len(), 0);
    assert!(matches!(users.update(ada).await, Err(ModelError::NotFound(_))));
}

#[tokio::test]
async fn test_eager_loads_children_and_parents() {
    let (database, _factory) = database().await;
    let authors = database.query::<Author>();
    let books = database.query::<Book>();

    let ada = authors
        .create(Author { id: None, name: "Ada".to_string(), books: Vec::new() })
        .await
        .unwrap();
    let grace = authors
        .create(Author { id: None, name: "Grace".to_string(), books: Vec::new() })
        .await
        .unwrap();
    for (author, title) in [(&ada, "Notes"), (&grace, "Compilers"), (&ada, "Engines")] {
        books
            .create(Book { id: None, author_id: author.id.unwrap(), title: title.to_string(), author: None })
            .await
            .unwrap();
    }

    let loaded = authors
        .clone()
        .with(Children::new("author_id", |author: &mut Author, books: Vec<Book>| author.books = books))
        .all()
        .await
        .unwrap();
    let titles: Vec<Vec<&str>> = loaded
        .iter()
        .map(|author| author.books.iter().map(|book| book.title.as_str()).collect())
        .collect();
    assert_eq!(titles, vec![vec!["Notes", "Engines"], vec!["Compilers"]]);

    let loaded = books
        .clone()
        .filter_eq("title", "Compilers")
        .with(Parent::new("author_id", |book: &mut Book, author: Option<Author>| book.author = author))
        .all()
        .await
        .unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].author.as_ref().map(|a| a.name.as_str()), Some("Grace"));
}

struct RejectBlankNames {
    seen: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ModelObserver<User> for RejectBlankNames {
    async fn creating(&self, model: &mut User) -> Result<(), EventError> {
        if model.name.trim().is_empty() {
            return Err(EventError::validation("name must not be blank"));
        }
        model.name = model.name.trim().to_string();
        Ok(())
    }

    async fn created(&self, model: &User) -> Result<(), EventError> {
        self.seen.lock().unwrap().push(model.name.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_observer_can_veto_and_rewrite() {
    let (database, factory) = database().await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    database.observe::<User>(RejectBlankNames { seen: seen.clone() });
    let users = database.query::<User>();

    let err = users.create(user("   ")).await.unwrap_err();
    assert!(matches!(err, ModelError::Event(_)));
    assert_eq!(factory.rows("users").unwrap().len(), 0);

    let created = users.create(user("  Ada ")).await.unwrap();
    assert_eq!(created.name, "Ada");
    assert_eq!(*seen.lock().unwrap(), vec!["Ada".to_string()]);
}

#[tokio::test]
async fn test_subset_filters_and_joins() {
    let (database, _factory) = database().await;
    let users = database.query::<User>();
    for name in ["Ada", "Grace", "Barbara"] {
        users.create(user(name)).await.unwrap();
    }

    let names: Vec<String> = users
        .clone()
        .filter_in("name", vec![Value::from("Ada"), Value::from("Barbara")])
        .all()
        .await
        .unwrap()
        .into_iter()
        .map(|u| u.name)
        .collect();
    assert_eq!(names, vec!["Ada", "Barbara"]);
    assert_eq!(users.clone().filter_not_in("name", vec![Value::from("Ada")]).count().await.unwrap(), 2);

    let joined = users.clone().join(FieldRef::new("books", "author_id"), FieldRef::new("users", "id"));
    assert!(matches!(joined, Err(ModelError::Unsupported(_))));
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Note {
    id: Option<i64>,
    body: String,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl Model for Note {
    type PrimaryKey = i64;

    fn entity() -> &'static str {
        "notes"
    }

    fn primary_key(&self) -> Option<i64> {
        self.id
    }

    fn set_primary_key(&mut self, key: i64) {
        self.id = Some(key);
    }

    fn uses_timestamps() -> bool {
        true
    }

    fn set_created_at(&mut self, timestamp: DateTime<Utc>) {
        self.created_at = Some(timestamp);
    }

    fn set_updated_at(&mut self, timestamp: DateTime<Utc>) {
        self.updated_at = Some(timestamp);
    }
}

#[tokio::test]
async fn test_timestamps_are_stamped_on_write() {
    let (database, _factory) = database().await;
    database
        .with_connection(|conn| SchemaBuilder::create("notes").id().text("body", true).timestamps().run(&mut **conn).boxed())
        .await
        .unwrap();
    let notes = database.query::<Note>();

    let long_ago = Utc::now() - Duration::days(365);
    let before = Utc::now();
    let created = notes
        .create(Note { id: None, body: "draft".to_string(), created_at: Some(long_ago), updated_at: None })
        .await
        .unwrap();
    let created_at = created.created_at.unwrap();
    assert!(created_at >= before);
    assert_eq!(created.updated_at, Some(created_at));

    let updated = notes.update(Note { body: "final".to_string(), ..created }).await.unwrap();
    assert_eq!(updated.created_at, Some(created_at));
    assert!(updated.updated_at.unwrap() >= created_at);
    assert_eq!(notes.find_or_fail(1).await.unwrap().body, "final");
}

fn insert_user(name: &str) -> DatabaseQuery {
    let mut query = DatabaseQuery::new("users", QueryAction::Create);
    query.input.push(vec![("name".to_string(), Value::from(name))]);
    query
}

#[tokio::test]
async fn test_transaction_commits_or_rolls_back() {
    let (database, factory) = database().await;

    database
        .transaction(|conn| {
            async move {
                conn.execute(&insert_user("Ada")).await?;
                Ok(())
            }
            .boxed()
        })
        .await
        .unwrap();

    let result: Result<(), ModelError> = database
        .transaction(|conn| {
            async move {
                conn.execute(&insert_user("Grace")).await?;
                Err(ModelError::Database("abort".to_string()))
            }
            .boxed()
        })
        .await;
    assert!(matches!(result, Err(ModelError::Database(message)) if message == "abort"));

    let names: Vec<String> = factory
        .rows("users")
        .unwrap()
        .iter()
        .map(|row| row.get::<String>("name").unwrap())
        .collect();
    assert_eq!(names, vec!["Ada"]);
    assert_eq!(database.pool().stats().in_use, 0);
}
