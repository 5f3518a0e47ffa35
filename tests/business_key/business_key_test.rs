use starkeys::prelude::*;

fn people() -> RecordBatch {
    RecordBatch::from_rows(
        ["navn", "alder", "by"],
        vec![
            vec!["alice".into(), 31.into(), "cph".into()],
            vec![" tim ".into(), Value::Null, "aarhus".into()],
            vec![Value::Null, 7.5.into(), Value::Null],
        ],
    )
    .unwrap()
}

#[test]
fn test_single_column_key() {
    let keys = BusinessKeyBuilder::new(["navn"]).build(&people()).unwrap();
    assert_eq!(
        keys,
        vec![Value::from("alice"), Value::from(" tim "), Value::from("")]
    );
}

#[test]
fn test_composite_key_keeps_whitespace_and_types() {
    let keys = BusinessKeyBuilder::new(["navn", "alder", "by"])
        .build(&people())
        .unwrap();
    assert_eq!(keys[0], Value::from("alice||31||cph"));
    assert_eq!(keys[1], Value::from(" tim ||||aarhus"));
    assert_eq!(keys[2], Value::from("||7.5||"));
}

#[test]
fn test_column_order_changes_key() {
    let batch = people();
    let forward = BusinessKeyBuilder::new(["navn", "by"]).build(&batch).unwrap();
    let backward = BusinessKeyBuilder::new(["by", "navn"]).build(&batch).unwrap();
    assert_ne!(forward, backward);
    assert_eq!(backward[0], Value::from("cph||alice"));
}

#[test]
fn test_separator_from_config() {
    let config = KeyConfig {
        separator: "~".to_string(),
        ..Default::default()
    };
    let keys = BusinessKeyBuilder::with_config(["navn", "by"], &config)
        .build(&people())
        .unwrap();
    assert_eq!(keys[0], Value::from("alice~cph"));
}

#[test]
fn test_add_bk_for_related_table() {
    let mut batch = people();
    let values = add_bk_for_table("geo", &mut batch, &["by"], &KeyConfig::default()).unwrap();

    assert_eq!(values.len(), 3);
    assert_eq!(batch.columns(), ["navn", "alder", "by", "bk_geo"]);
    assert_eq!(batch.value(1, "bk_geo"), Some(&Value::from("aarhus")));
}

#[test]
fn test_attach_under_custom_name_replaces_existing() {
    let mut batch = people();
    let builder = BusinessKeyBuilder::new(["navn"]);
    builder.attach(&mut batch, "by").unwrap();

    assert_eq!(batch.columns().len(), 3);
    assert_eq!(batch.value(0, "by"), Some(&Value::from("alice")));
}

#[test]
fn test_errors() {
    let empty: [&str; 0] = [];
    let err = BusinessKeyBuilder::new(empty).build(&people()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let err = add_bk_for_table("geo", &mut people(), &["by", "postnr"], &KeyConfig::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);
    assert!(err.to_string().contains("postnr"));
}

#[test]
fn test_error_message_shape() {
    let err = BusinessKeyBuilder::new(["postnr"]).build(&people()).unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @"schema error: business key source columns missing from batch: [postnr] (available: navn, alder, by)"
    );
}
