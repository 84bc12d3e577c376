use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use heapdb::execution::{AggregateOp, JoinPredicate, Operator, Predicate};
use heapdb::tuple::{CompareOp, DataType, Schema, Tuple};
use heapdb::{Database, DatabaseConfig, Result};

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("heapdb=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();
}

fn main() -> Result<()> {
    init_logging();

    let data_dir = std::env::temp_dir().join(format!("heapdb-demo-{}", std::process::id()));
    std::fs::create_dir_all(&data_dir)?;
    let db = Database::new(DatabaseConfig::from_env().with_data_dir(&data_dir));

    let users = Schema::builder()
        .column("id", DataType::Int)
        .column("name", DataType::string())
        .column("dept", DataType::Int)
        .build_arc();
    let depts = Schema::builder()
        .column("id", DataType::Int)
        .column("title", DataType::string())
        .build_arc();
    let users_id = db.create_table("users", Arc::clone(&users), Some("id"))?;
    let depts_id = db.create_table("depts", Arc::clone(&depts), Some("id"))?;

    // Load both tables in one transaction
    let txn = db.begin();
    let rows: [(i32, &str, i32); 4] = [
        (1, "ada", 10),
        (2, "brian", 20),
        (3, "grace", 10),
        (4, "linus", 30),
    ];
    let user_tuples = rows
        .iter()
        .map(|&(id, name, dept)| {
            Tuple::new(Arc::clone(&users), vec![id.into(), name.into(), dept.into()])
        })
        .collect::<Result<Vec<_>>>()?;
    let dept_tuples = [(10i32, "compilers"), (20, "storage"), (30, "kernels")]
        .iter()
        .map(|&(id, title)| Tuple::new(Arc::clone(&depts), vec![id.into(), title.into()]))
        .collect::<Result<Vec<_>>>()?;

    for (table, schema, tuples) in [
        (users_id, &users, user_tuples),
        (depts_id, &depts, dept_tuples),
    ] {
        let values = Operator::values(Arc::clone(schema), tuples)?;
        let mut insert = Operator::insert(Arc::clone(db.buffer_pool()), txn.id(), values, table)?;
        insert.open()?;
        let count = insert.next()?;
        info!(table = %table, inserted = %count, "loaded table");
        insert.close();
    }
    txn.commit()?;

    // Join users with departments, keep dept 10, then count per department
    let txn = db.begin();
    let pool = Arc::clone(db.buffer_pool());
    let join = Operator::join(
        JoinPredicate::new(2, CompareOp::Equals, 0),
        Operator::seq_scan(Arc::clone(&pool), txn.id(), users_id, "u")?,
        Operator::seq_scan(Arc::clone(&pool), txn.id(), depts_id, "d")?,
    );
    let mut plan = Operator::filter(Predicate::new(2, CompareOp::Equals, 10), join);
    plan.open()?;
    while plan.has_next()? {
        info!(row = %plan.next()?, "dept 10 member");
    }
    plan.close();

    let scan = Operator::seq_scan(Arc::clone(&pool), txn.id(), users_id, "u")?;
    let mut counts = Operator::aggregate(scan, 0, Some(2), AggregateOp::Count)?;
    counts.open()?;
    for row in counts.fetch_all()? {
        info!(%row, "users per dept");
    }
    counts.close();
    txn.commit()?;

    info!(
        cached = db.buffer_pool().cached_pages(),
        capacity = db.buffer_pool().capacity(),
        "demo finished"
    );
    std::fs::remove_dir_all(&data_dir)?;
    Ok(())
}
