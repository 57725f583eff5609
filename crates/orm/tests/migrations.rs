use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use quarry_orm::migrations::single_database_migrator;
use quarry_orm::{
    Connection, Database, DatabaseQuery, DatabaseValue, Databases, MemoryDatabase, Migration, MigrationConfig,
    MigrationStatus, Migrations, Migrator, ModelError, ModelResult, PoolConfig, QueryAction, SchemaBuilder, Value,
};

type Journal = Arc<Mutex<Vec<String>>>;

fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

struct CreateUsers(Journal);

#[async_trait]
impl Migration for CreateUsers {
    fn name(&self) -> &str {
        "create_users"
    }

    async fn prepare(&self, conn: &mut dyn Connection) -> ModelResult<()> {
        self.0.lock().unwrap().push("prepare create_users".to_string());
        SchemaBuilder::create("users").id().string("name", None, true).run(conn).await
    }

    async fn revert(&self, conn: &mut dyn Connection) -> ModelResult<()> {
        self.0.lock().unwrap().push("revert create_users".to_string());
        SchemaBuilder::delete("users").run(conn).await
    }
}

struct AddEmailToUsers(Journal);

#[async_trait]
impl Migration for AddEmailToUsers {
    fn name(&self) -> &str {
        "add_email_to_users"
    }

    async fn prepare(&self, conn: &mut dyn Connection) -> ModelResult<()> {
        self.0.lock().unwrap().push("prepare add_email_to_users".to_string());
        SchemaBuilder::update("users").string("email", Some(255), false).run(conn).await
    }

    async fn revert(&self, conn: &mut dyn Connection) -> ModelResult<()> {
        self.0.lock().unwrap().push("revert add_email_to_users".to_string());
        SchemaBuilder::update("users").remove_field("email").run(conn).await
    }
}

/// Creates an entity named after itself
struct CreateEntity {
    name: &'static str,
    journal: Journal,
}

fn entity(name: &'static str, journal: &Journal) -> CreateEntity {
    CreateEntity {
        name,
        journal: journal.clone(),
    }
}

#[async_trait]
impl Migration for CreateEntity {
    fn name(&self) -> &str {
        self.name
    }

    async fn prepare(&self, conn: &mut dyn Connection) -> ModelResult<()> {
        self.journal.lock().unwrap().push(format!("prepare {}", self.name));
        SchemaBuilder::create(self.name).id().run(conn).await
    }

    async fn revert(&self, conn: &mut dyn Connection) -> ModelResult<()> {
        self.journal.lock().unwrap().push(format!("revert {}", self.name));
        SchemaBuilder::delete(self.name).run(conn).await
    }
}

struct Broken;

#[async_trait]
impl Migration for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    async fn prepare(&self, _conn: &mut dyn Connection) -> ModelResult<()> {
        Err(ModelError::Database("syntax error".to_string()))
    }

    async fn revert(&self, _conn: &mut dyn Connection) -> ModelResult<()> {
        Ok(())
    }
}

fn database(id: &str, factory: &Arc<MemoryDatabase>) -> Database {
    Database::connect(id, factory.clone(), PoolConfig::default()).unwrap()
}

fn log_batches(factory: &MemoryDatabase) -> Vec<i64> {
    factory
        .rows("quarry_migrations")
        .unwrap_or_default()
        .iter()
        .map(|row| row.get::<i64>("batch").unwrap())
        .collect()
}

#[tokio::test]
async fn test_batch_recorded_and_reverted_in_reverse() {
    let journal = Journal::default();
    let factory = Arc::new(MemoryDatabase::new());
    let mut migrations = Migrations::new();
    migrations.add_default(CreateUsers(journal.clone())).unwrap();
    migrations.add_default(AddEmailToUsers(journal.clone())).unwrap();
    let migrator = single_database_migrator(database("default", &factory), migrations).unwrap();

    let result = migrator.prepare_batch().await.unwrap();
    assert_eq!(result.applied_migrations, vec!["create_users", "add_email_to_users"]);
    assert_eq!(result.batch, Some(1));
    assert_eq!(log_batches(&factory), vec![1, 1]);

    let reverted = migrator.revert_last_batch().await.unwrap();
    assert_eq!(reverted.rolled_back_migrations, vec!["add_email_to_users", "create_users"]);
    assert_eq!(reverted.batches, vec![1]);
    assert!(log_batches(&factory).is_empty());
    assert!(!factory.has_entity("users"));

    assert_eq!(
        entries(&journal),
        vec![
            "prepare create_users",
            "prepare add_email_to_users",
            "revert add_email_to_users",
            "revert create_users",
        ]
    );
}

#[tokio::test]
async fn test_prepare_batch_is_idempotent() {
    let journal = Journal::default();
    let factory = Arc::new(MemoryDatabase::new());
    let mut migrations = Migrations::new();
    for name in ["a", "b"] {
        migrations.add_default(entity(name, &journal)).unwrap();
    }
    let migrator = single_database_migrator(database("default", &factory), migrations).unwrap();

    assert_eq!(migrator.prepare_batch().await.unwrap().applied_count(), 2);

    let second = migrator.prepare_batch().await.unwrap();
    assert_eq!(second.applied_count(), 0);
    assert_eq!(second.skipped_count, 2);
    assert_eq!(second.batch, None);
    assert_eq!(entries(&journal).len(), 2);
}

#[tokio::test]
async fn test_only_the_newest_batch_is_reverted() {
    let journal = Journal::default();
    let factory = Arc::new(MemoryDatabase::new());
    let databases = Arc::new(Databases::new());
    databases.register(database("default", &factory));

    let mut first = Migrations::new();
    first.add_default(entity("a", &journal)).unwrap();
    Migrator::new(databases.clone(), first, MigrationConfig::default())
        .prepare_batch()
        .await
        .unwrap();

    let mut all = Migrations::new();
    for name in ["a", "b", "c"] {
        all.add_default(entity(name, &journal)).unwrap();
    }
    let migrator = Migrator::new(databases, all, MigrationConfig::default());
    let result = migrator.prepare_batch().await.unwrap();
    assert_eq!(result.applied_migrations, vec!["b", "c"]);
    assert_eq!(result.batch, Some(2));

    let reverted = migrator.revert_last_batch().await.unwrap();
    assert_eq!(reverted.rolled_back_migrations, vec!["c", "b"]);

    let states = migrator.status().await.unwrap();
    assert!(matches!(states[0].status, MigrationStatus::Applied { batch: 1, .. }));
    assert_eq!(states[1].status, MigrationStatus::Pending);
    assert_eq!(states[2].status, MigrationStatus::Pending);

    let reverted = migrator.revert_all_batches().await.unwrap();
    assert_eq!(reverted.rolled_back_migrations, vec!["a"]);
    assert!(migrator.revert_all_batches().await.unwrap().batches.is_empty());
}

#[tokio::test]
async fn test_each_database_keeps_its_own_log() {
    let journal = Journal::default();
    let main = Arc::new(MemoryDatabase::new());
    let audit = Arc::new(MemoryDatabase::new());
    let databases = Arc::new(Databases::new());
    databases.register(database("main", &main));
    databases.register(database("audit", &audit));

    let mut migrations = Migrations::new();
    migrations.add(entity("users", &journal), "main").unwrap();
    migrations.add(entity("events", &journal), "audit").unwrap();
    migrations.add(entity("posts", &journal), "main").unwrap();
    let config = MigrationConfig {
        table: "schema_log".to_string(),
    };
    let migrator = Migrator::new(databases, migrations, config);

    migrator.prepare_batch().await.unwrap();
    assert_eq!(main.entity_names(), vec!["posts", "schema_log", "users"]);
    assert_eq!(audit.entity_names(), vec!["events", "schema_log"]);

    let reverted = migrator.revert_all_batches().await.unwrap();
    assert_eq!(reverted.rolled_back_migrations, vec!["events", "posts", "users"]);
    assert_eq!(main.rows("schema_log").map(|rows| rows.len()), Some(0));
}

#[tokio::test]
async fn test_failure_stops_the_run_and_names_the_migration() {
    let journal = Journal::default();
    let factory = Arc::new(MemoryDatabase::new());
    let mut migrations = Migrations::new();
    migrations.add_default(entity("a", &journal)).unwrap();
    migrations.add_default(Broken).unwrap();
    migrations.add_default(entity("c", &journal)).unwrap();
    let migrator = single_database_migrator(database("default", &factory), migrations).unwrap();

    let err = migrator.prepare_batch().await.unwrap_err();
    match err {
        ModelError::Migration { name, message } => {
            assert_eq!(name, "broken");
            assert!(message.contains("syntax error"));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(entries(&journal), vec!["prepare a"]);
    let names: Vec<DatabaseValue> = factory
        .rows("quarry_migrations")
        .unwrap()
        .iter()
        .filter_map(|row| row.get_by_name("name").cloned())
        .collect();
    assert_eq!(names, vec![DatabaseValue::from("a")]);
}

#[tokio::test]
async fn test_unknown_database_is_a_configuration_error() {
    let journal = Journal::default();
    let mut migrations = Migrations::new();
    migrations.add(entity("a", &journal), "missing").unwrap();
    let migrator = Migrator::new(Arc::new(Databases::new()), migrations, MigrationConfig::default());

    assert!(matches!(migrator.prepare_batch().await, Err(ModelError::Configuration(_))));
}

#[tokio::test]
async fn test_log_setup_runs_once() {
    let journal = Journal::default();
    let factory = Arc::new(MemoryDatabase::new());
    let mut migrations = Migrations::new();
    migrations.add_default(entity("a", &journal)).unwrap();
    let migrator = single_database_migrator(database("default", &factory), migrations).unwrap();

    migrator.setup_if_needed().await.unwrap();
    migrator.setup_if_needed().await.unwrap();
    assert_eq!(factory.entity_names(), vec!["quarry_migrations"]);
    assert!(log_batches(&factory).is_empty());

    let states = migrator.status().await.unwrap();
    assert!(states.iter().all(|state| state.status == MigrationStatus::Pending));
    assert!(entries(&journal).is_empty());
}

#[tokio::test]
async fn test_unreadable_log_is_reported_not_treated_as_pending() {
    let journal = Journal::default();
    let factory = Arc::new(MemoryDatabase::new());
    let database = database("default", &factory);
    {
        let mut conn = factory.connection();
        SchemaBuilder::create("quarry_migrations")
            .id()
            .string("name", None, true)
            .run(&mut conn)
            .await
            .unwrap();
        let mut insert = DatabaseQuery::new("quarry_migrations", QueryAction::Create);
        insert.input.push(vec![("name".to_string(), Value::from("a"))]);
        conn.execute(&insert).await.unwrap();
    }
    let mut migrations = Migrations::new();
    migrations.add_default(entity("a", &journal)).unwrap();
    let migrator = single_database_migrator(database, migrations).unwrap();

    assert!(matches!(migrator.status().await, Err(ModelError::Serialization(_))));
    assert!(migrator.prepare_batch().await.is_err());
    assert!(entries(&journal).is_empty());
}
