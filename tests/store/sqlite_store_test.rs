use starkeys::prelude::*;
use tempfile::TempDir;

fn seeded_store(dir: &TempDir) -> SqliteKeyStore {
    let path = dir.path().join("warehouse.db");
    let store = SqliteKeyStore::open(&path).unwrap();
    store
        .connection()
        .execute_batch(
            "CREATE TABLE customer (bk_customer TEXT, key_customer INTEGER, region TEXT);
             INSERT INTO customer VALUES ('alice', 1, 'north'), ('bob', 5, 'south');
             CREATE TABLE product (bk_product TEXT, key_product INTEGER);
             INSERT INTO product VALUES ('apple', 10);",
        )
        .unwrap();
    store
}

fn batch(column: &str, keys: &[&str]) -> RecordBatch {
    RecordBatch::from_rows([column], keys.iter().map(|k| vec![Value::from(*k)]).collect())
        .unwrap()
}

#[test]
fn test_dimension_against_sqlite() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir);

    let mut dim =
        DimensionKeyAssigner::new("customer", &batch("bk_customer", &["alice", "carol"]), &store)
            .unwrap();
    let resolved = dim.process().unwrap();

    assert_eq!(resolved.value(0, "key_customer"), Some(&Value::Int(1)));
    assert_eq!(resolved.value(1, "key_customer"), Some(&Value::Int(6)));
}

#[test]
fn test_filter_is_passed_through() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir);

    let query = KeyPairQuery::new("customer", "bk_customer", "key_customer")
        .with_filter(Some("region = 'south'".to_string()));
    let pairs = store.fetch_key_pairs(&query).unwrap();

    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs.value(0, "bk_customer"), Some(&Value::from("bob")));
}

#[test]
fn test_max_key_defaults_to_zero() {
    let store = SqliteKeyStore::open_in_memory().unwrap();
    store
        .connection()
        .execute_batch("CREATE TABLE empty_dim (bk_empty_dim TEXT, key_empty_dim INTEGER);")
        .unwrap();

    assert_eq!(store.fetch_max_key("empty_dim", "key_empty_dim").unwrap(), 0);
}

#[test]
fn test_fact_against_sqlite() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir);
    let sales = RecordBatch::from_rows(
        ["bk_customer", "bk_product", "qty"],
        vec![
            vec!["bob".into(), "apple".into(), 2.into()],
            vec!["alice".into(), "apple".into(), 1.into()],
        ],
    )
    .unwrap();

    let mut fact = FactKeyMapper::new("sales", &sales, &store);
    fact.register_all(["customer", "product"]);
    let resolved = fact.resolve().unwrap();

    assert_eq!(resolved.columns(), ["qty", "key_customer", "key_product"]);
    assert_eq!(resolved.value(0, "key_customer"), Some(&Value::Int(5)));
    assert_eq!(resolved.value(1, "key_product"), Some(&Value::Int(10)));
}

#[test]
fn test_missing_table_is_store_access_error() {
    let store = SqliteKeyStore::open_in_memory().unwrap();

    let mut dim =
        DimensionKeyAssigner::new("customer", &batch("bk_customer", &["alice"]), &store).unwrap();
    let err = dim.process().unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StoreAccess);
    assert!(matches!(
        err,
        KeyError::StoreAccess {
            source: StoreError::Sqlite(_),
            ..
        }
    ));
}

#[test]
fn test_invalid_identifier_is_rejected() {
    let store = SqliteKeyStore::open_in_memory().unwrap();
    let query = KeyPairQuery::new("customer; DROP TABLE x", "bk", "pk");

    assert!(matches!(
        store.fetch_key_pairs(&query),
        Err(StoreError::InvalidIdentifier(_))
    ));
}

#[test]
fn test_new_rows_can_be_written_back() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir);

    let mut dim =
        DimensionKeyAssigner::new("customer", &batch("bk_customer", &["bob", "dave"]), &store)
            .unwrap();
    dim.process().unwrap();
    let new_rows = dim.new_rows().unwrap();

    for row in new_rows.rows() {
        store
            .connection()
            .execute(
                "INSERT INTO customer (bk_customer, key_customer) VALUES (?1, ?2)",
                rusqlite::params![row[0].to_string(), row[1].as_int()],
            )
            .unwrap();
    }

    assert_eq!(store.fetch_max_key("customer", "key_customer").unwrap(), 6);
}

fn text_key_store() -> SqliteKeyStore {
    let store = SqliteKeyStore::open_in_memory().unwrap();
    store
        .connection()
        .execute_batch(
            "CREATE TABLE customer (bk_customer TEXT, key_customer TEXT);
             INSERT INTO customer VALUES ('alice', '3'), ('bob', '10');",
        )
        .unwrap();
    store
}

#[test]
fn test_dimension_over_text_key_column() {
    let store = text_key_store();

    let resolved = DimensionKeyAssigner::new(
        "customer",
        &batch("bk_customer", &["alice", "carol"]),
        &store,
    )
    .unwrap()
    .into_batch()
    .unwrap();

    assert_eq!(resolved.value(0, "key_customer"), Some(&Value::Int(3)));
    assert_eq!(resolved.value(1, "key_customer"), Some(&Value::Int(11)));
}

#[test]
fn test_filtered_dimension_over_text_key_column() {
    let store = text_key_store();

    let options = DimensionOptions::default().filter("bk_customer = 'alice'");
    let resolved = DimensionKeyAssigner::with_options(
        "customer",
        &batch("bk_customer", &["alice", "carol"]),
        &store,
        options,
    )
    .unwrap()
    .into_batch()
    .unwrap();

    assert_eq!(resolved.value(1, "key_customer"), Some(&Value::Int(11)));
}

#[test]
fn test_fact_over_text_key_column() {
    let store = text_key_store();
    let sales = RecordBatch::from_rows(
        ["bk_customer", "qty"],
        vec![vec!["bob".into(), 2.into()], vec!["alice".into(), 1.into()]],
    )
    .unwrap();

    let mut fact = FactKeyMapper::new("sales", &sales, &store);
    fact.register("customer", None, None);
    let resolved = fact.resolve().unwrap();

    assert_eq!(resolved.value(0, "key_customer"), Some(&Value::Int(10)));
    assert_eq!(resolved.value(1, "key_customer"), Some(&Value::Int(3)));
}
