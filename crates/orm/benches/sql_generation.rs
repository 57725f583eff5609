//! SQL generation and in-memory execution benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use quarry_orm::backends::MemoryDatabase;
use quarry_orm::query::{Aggregate, FieldRef, Join, JoinMethod, OrderDirection, Sort};
use quarry_orm::{
    Connection, DatabaseQuery, Filter, FilterMethod, QueryAction, Relation, SchemaBuilder, SqlDialect, SqlSerializer,
    Value,
};

fn select_with_filters(filters: usize) -> DatabaseQuery {
    let mut query = DatabaseQuery::new("users", QueryAction::Read);
    query.fields = vec!["id".to_string(), "name".to_string(), "email".to_string()];
    for index in 0..filters {
        query
            .filters
            .push(Filter::basic(format!("field_{}", index), FilterMethod::EQUAL, index as i64));
    }
    query.sorts.push(Sort {
        field: "id".to_string(),
        direction: OrderDirection::Desc,
    });
    query.limit = Some(20);
    query
}

fn bench_serializer(c: &mut Criterion) {
    let mut group = c.benchmark_group("sql_serializer");

    for dialect in [SqlDialect::PostgreSQL, SqlDialect::MySQL, SqlDialect::SQLite] {
        let serializer = SqlSerializer::new(dialect);
        let query = select_with_filters(3);
        group.bench_with_input(BenchmarkId::new("select", format!("{:?}", dialect)), &query, |b, query| {
            b.iter(|| black_box(serializer.serialize(query)))
        });
    }

    let serializer = SqlSerializer::new(SqlDialect::PostgreSQL);
    for filters in [1, 10, 50] {
        let query = select_with_filters(filters);
        group.bench_with_input(BenchmarkId::new("filters", filters), &query, |b, query| {
            b.iter(|| black_box(serializer.serialize(query)))
        });
    }

    let mut nested = DatabaseQuery::new("posts", QueryAction::Read);
    nested.joins.push(Join {
        method: JoinMethod::Left,
        base_field: FieldRef::new("posts", "user_id"),
        joined_field: FieldRef::new("users", "id"),
    });
    nested.filters.push(Filter::group(
        vec![
            Filter::basic("posts.title", FilterMethod::EQUAL, "draft"),
            Filter::basic(
                "users.id",
                FilterMethod::IN,
                Value::Group((0..100_i64).map(Value::from).collect()),
            ),
        ],
        Relation::Or,
    ));
    group.bench_function("join_with_subset", |b| b.iter(|| black_box(serializer.serialize(&nested))));

    let mut insert = DatabaseQuery::new("users", QueryAction::Create);
    for index in 0..100_i64 {
        insert.input.push(vec![
            ("name".to_string(), Value::from(format!("user-{}", index))),
            ("age".to_string(), Value::from(index)),
        ]);
    }
    group.bench_function("insert_100_rows", |b| b.iter(|| black_box(serializer.serialize(&insert))));

    let schema = SchemaBuilder::create("users")
        .id()
        .string("name", Some(255), true)
        .string("email", Some(255), false)
        .timestamps()
        .soft_deletes()
        .unique_index(&["email"])
        .into_schema();
    group.bench_function("create_table", |b| b.iter(|| black_box(serializer.serialize_schema(&schema))));

    group.finish();
}

fn bench_memory_backend(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let database = MemoryDatabase::new();
    let mut connection = database.connection();

    runtime.block_on(async {
        let schema = SchemaBuilder::create("users")
            .id()
            .string("name", None, true)
            .big_int("age", true)
            .into_schema();
        connection.execute_schema(&schema).await.unwrap();

        let mut insert = DatabaseQuery::new("users", QueryAction::Create);
        for index in 0..1_000_i64 {
            insert.input.push(vec![
                ("name".to_string(), Value::from(format!("user-{}", index))),
                ("age".to_string(), Value::from(index % 90)),
            ]);
        }
        connection.execute(&insert).await.unwrap();
    });

    let mut filtered = DatabaseQuery::new("users", QueryAction::Read);
    filtered
        .filters
        .push(Filter::basic("age", FilterMethod::GREATER_THAN_OR_EQUAL, 50_i64));
    filtered.sorts.push(Sort {
        field: "name".to_string(),
        direction: OrderDirection::Asc,
    });
    filtered.limit = Some(50);

    let mut count = DatabaseQuery::new("users", QueryAction::Read);
    count.aggregate = Some(Aggregate::Count);

    let mut group = c.benchmark_group("memory_backend");
    group.bench_function("filter_sort_limit_1000", |b| {
        b.iter(|| runtime.block_on(async { black_box(connection.execute(&filtered).await.unwrap()) }))
    });
    group.bench_function("count_1000", |b| {
        b.iter(|| runtime.block_on(async { black_box(connection.execute(&count).await.unwrap()) }))
    });
    group.finish();
}

criterion_group!(benches, bench_serializer, bench_memory_backend);
criterion_main!(benches);
