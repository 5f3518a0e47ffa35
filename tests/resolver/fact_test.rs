use starkeys::prelude::*;

fn warehouse() -> MemoryKeyStore {
    MemoryKeyStore::new()
        .with_pairs(
            "customer",
            "bk_customer",
            "key_customer",
            vec![("alice", 1_i64), ("bob", 2), ("carol", 3)],
        )
        .with_pairs(
            "product",
            "bk_product",
            "key_product",
            vec![("apple", 10_i64), ("pear", 11)],
        )
        .with_pairs(
            "store",
            "store_code",
            "store_sk",
            vec![("CPH", 100_i64)],
        )
}

fn sales() -> RecordBatch {
    RecordBatch::from_rows(
        ["bk_customer", "bk_product", "store_code", "qty"],
        vec![
            vec!["alice".into(), "apple".into(), "CPH".into(), 1.into()],
            vec!["bob".into(), "pear".into(), "CPH".into(), 2.into()],
            vec!["alice".into(), "pear".into(), "CPH".into(), 3.into()],
            vec!["carol".into(), "apple".into(), "CPH".into(), 4.into()],
        ],
    )
    .unwrap()
}

fn ints(batch: &RecordBatch, column: &str) -> Vec<i64> {
    batch
        .column_values(column)
        .unwrap()
        .into_iter()
        .map(|v| v.as_int().unwrap())
        .collect()
}

#[test]
fn test_resolves_every_registered_dimension() {
    let store = warehouse();
    let batch = sales();
    let mut fact = FactKeyMapper::new("sales", &batch, &store);
    fact.register_all(["customer", "product"])
        .register("store", Some("store_code"), Some("store_sk"));

    let resolved = fact.resolve().unwrap();

    assert_eq!(
        resolved.columns(),
        ["qty", "key_customer", "key_product", "store_sk"]
    );
    assert_eq!(resolved.len(), 4);
    assert_eq!(ints(resolved, "key_customer"), vec![1, 2, 1, 3]);
    assert_eq!(ints(resolved, "key_product"), vec![10, 11, 11, 10]);
    assert_eq!(ints(resolved, "store_sk"), vec![100; 4]);
}

#[test]
fn test_repeated_business_keys_are_allowed_in_facts() {
    let store = warehouse();
    let batch = sales();
    let mut fact = FactKeyMapper::new("sales", &batch, &store);
    fact.register("customer", None, None);

    assert!(fact.resolve().is_ok());
}

#[test]
fn test_resolve_is_idempotent() {
    let store = warehouse();
    let batch = sales();
    let mut fact = FactKeyMapper::new("sales", &batch, &store);
    fact.register_all(["customer", "product"]);

    let first = fact.resolve().unwrap().clone();
    let second = fact.resolve().unwrap().clone();

    assert_eq!(first, second);
    assert_eq!(store.fetch_count("customer"), 1);
    assert_eq!(store.fetch_count("product"), 1);
    assert!(fact.is_processed());
}

#[test]
fn test_fact_never_allocates_keys() {
    let store = warehouse();
    let batch = RecordBatch::from_rows(
        ["bk_customer", "qty"],
        vec![vec!["dave".into(), 1.into()], vec!["erin".into(), 1.into()]],
    )
    .unwrap();

    let mut fact = FactKeyMapper::new("sales", &batch, &store).fail_on_missing(false);
    fact.register("customer", None, None);
    let resolved = fact.resolve().unwrap();

    assert_eq!(ints(resolved, "key_customer"), vec![-1, -1]);
}

#[test]
fn test_missing_sample_is_bounded() {
    let store = warehouse();
    let rows = (0..15)
        .map(|i| vec![Value::String(format!("ghost{}", i)), Value::Int(1)])
        .collect();
    let batch = RecordBatch::from_rows(["bk_customer", "qty"], rows).unwrap();

    let mut fact = FactKeyMapper::new("sales", &batch, &store);
    fact.register("customer", None, None);
    let message = fact.resolve().unwrap_err().to_string();

    assert!(message.contains("missing dimension keys for 15 rows"));
    assert!(message.contains("ghost9"));
    assert!(!message.contains("ghost10"));
}

#[test]
fn test_failure_in_later_dimension_leaves_fact_retryable() {
    let store = warehouse();
    let mut batch = sales();
    batch.set_value(3, "bk_product", "plum".into());

    let mut fact = FactKeyMapper::new("sales", &batch, &store);
    fact.register_all(["customer", "product"]);
    assert!(fact.resolve().is_err());

    assert!(!fact.is_processed());
    assert_eq!(fact.batch(), &batch);
    assert_eq!(fact.mappings().len(), 2);
}

#[test]
fn test_unknown_dimension_table_is_store_access_error() {
    let store = warehouse();
    let batch = RecordBatch::from_rows(["bk_region", "qty"], vec![vec!["eu".into(), 1.into()]])
        .unwrap();

    let mut fact = FactKeyMapper::new("sales", &batch, &store);
    fact.register("region", None, None);
    let err = fact.resolve().unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StoreAccess);
    assert!(err.to_string().contains("region"));
}

#[test]
fn test_null_reference_counts_as_missing() {
    let store = warehouse();
    let batch = RecordBatch::from_rows(
        ["bk_customer", "qty"],
        vec![vec![Value::Null, 1.into()], vec!["bob".into(), 2.into()]],
    )
    .unwrap();

    let mut fact = FactKeyMapper::new("sales", &batch, &store);
    fact.register("customer", None, None);
    let message = fact.resolve().unwrap_err().to_string();

    assert!(message.contains("for 1 rows"));
    assert!(message.contains("[null]"));
}

#[test]
fn test_filtered_dimension_mapping() {
    let customers = RecordBatch::from_rows(
        ["bk_customer", "key_customer", "active"],
        vec![
            vec!["alice".into(), 1.into(), 1.into()],
            vec!["bob".into(), 2.into(), 0.into()],
        ],
    )
    .unwrap();
    let store = MemoryKeyStore::new().with_table("customer", customers);
    let batch = RecordBatch::from_rows(
        ["bk_customer"],
        vec![vec!["alice".into()], vec!["bob".into()]],
    )
    .unwrap();

    let mut fact = FactKeyMapper::new("sales", &batch, &store).fail_on_missing(false);
    fact.register_mapping(
        DimensionMapping::new("customer", &KeyConfig::default()).filter("active = 1"),
    );
    let resolved = fact.resolve().unwrap();

    assert_eq!(ints(resolved, "key_customer"), vec![1, -1]);
}
