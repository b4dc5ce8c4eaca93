use chrono::{NaiveDate, NaiveTime};
use mysqltask::backend::{ColumnMeta, SqlValue};
use mysqltask::executor::Outcome;
use mysqltask::format::{
    column_keys, outcome_to_json, outcome_to_toon, payload_to_json, to_json, to_toon, value_to_json,
};
use mysqltask::normalize::{Payload, RowSet};
use serde_json::json;

fn make_column(name: &str, type_name: &str) -> ColumnMeta {
    ColumnMeta {
        name: name.to_string(),
        type_name: type_name.to_string(),
    }
}

fn hodor_and_jon() -> Payload {
    Payload::Rows(
        RowSet::new(
            vec![make_column("name", "VARCHAR"), make_column("value", "INT")],
            vec![
                vec![SqlValue::from("hodor"), SqlValue::Int(123)],
                vec![SqlValue::from("jon"), SqlValue::Int(321)],
            ],
        )
        .unwrap(),
    )
}

/// Helper: encode to TOON and decode back to serde_json::Value (no type coercion)
fn round_trip(payload: &Payload) -> serde_json::Value {
    let toon = to_toon(payload).unwrap();
    toon_format::decode_no_coerce(&toon).unwrap()
}

// --- JSON ---

#[test]
fn test_rows_become_ordered_objects() {
    let value = payload_to_json(&hodor_and_jon());
    assert_eq!(
        value,
        json!([{"name": "hodor", "value": 123}, {"name": "jon", "value": 321}])
    );
    // Keys keep column order rather than sorting.
    let text = serde_json::to_string(&value).unwrap();
    assert_eq!(text, r#"[{"name":"hodor","value":123},{"name":"jon","value":321}]"#);
}

#[test]
fn test_column_order_is_not_alphabetical() {
    let payload = Payload::Rows(
        RowSet::new(
            vec![make_column("z", "INT"), make_column("a", "INT")],
            vec![vec![SqlValue::Int(1), SqlValue::Int(2)]],
        )
        .unwrap(),
    );
    let text = serde_json::to_string(&payload_to_json(&payload)).unwrap();
    assert_eq!(text, r#"[{"z":1,"a":2}]"#);
}

#[test]
fn test_repeated_column_names_keep_every_value() {
    let payload = Payload::Rows(
        RowSet::new(
            vec![make_column("id", "INT"), make_column("id", "INT"), make_column("name", "VARCHAR")],
            vec![vec![SqlValue::Int(1), SqlValue::Int(2), SqlValue::from("hodor")]],
        )
        .unwrap(),
    );

    let value = payload_to_json(&payload);

    assert_eq!(value, json!([{"id": 1, "id1": 2, "name": "hodor"}]));
    let keys: Vec<&String> = value[0].as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["id", "id1", "name"]);
}

#[test]
fn test_suffix_skips_names_already_in_the_result() {
    let columns = vec![
        make_column("id", "INT"),
        make_column("id", "INT"),
        make_column("id1", "INT"),
        make_column("id", "INT"),
    ];
    assert_eq!(column_keys(&columns), vec!["id", "id2", "id1", "id3"]);
}

#[test]
fn test_affected_rows_is_integer() {
    assert_eq!(payload_to_json(&Payload::AffectedRows(1)), json!(1));
}

#[test]
fn test_value_mapping() {
    assert_eq!(value_to_json(&SqlValue::Null), json!(null));
    assert_eq!(value_to_json(&SqlValue::Bool(true)), json!(true));
    assert_eq!(value_to_json(&SqlValue::UInt(u64::MAX)), json!(u64::MAX));
    assert_eq!(value_to_json(&SqlValue::Float(1.5)), json!(1.5));
    assert_eq!(value_to_json(&SqlValue::Float(f64::NAN)), json!(null));
    assert_eq!(value_to_json(&SqlValue::Bytes(vec![0, 255, 16])), json!("AP8Q"));
}

#[test]
fn test_decimal_keeps_every_digit() {
    let digits = "1.123456789123456789123456789123";
    assert_eq!(value_to_json(&SqlValue::Decimal(digits.into())), json!(digits));
}

#[test]
fn test_temporal_values_are_iso_8601() {
    let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
    let time = NaiveTime::from_hms_micro_opt(13, 5, 9, 250_000).unwrap();

    assert_eq!(value_to_json(&SqlValue::Date(date)), json!("2024-02-29"));
    assert_eq!(value_to_json(&SqlValue::Time(time)), json!("13:05:09.250"));
    assert_eq!(
        value_to_json(&SqlValue::DateTime(date.and_hms_opt(0, 0, 1).unwrap())),
        json!("2024-02-29T00:00:01")
    );
}

#[test]
fn test_outcome_envelope() {
    assert_eq!(
        outcome_to_json(&Outcome::Success(Payload::AffectedRows(3))),
        json!({"success": true, "message": null, "result": 3})
    );
    assert_eq!(
        outcome_to_json(&Outcome::Failure {
            message: "Query failed: boom".to_string()
        }),
        json!({"success": false, "message": "Query failed: boom", "result": null})
    );
}

#[test]
fn test_to_json_is_pretty_with_trailing_newline() {
    let text = to_json(&json!({"a": 1})).unwrap();
    assert_eq!(text, "{\n  \"a\": 1\n}\n");
}

#[test]
fn test_identical_results_serialize_identically() {
    let a = to_json(&payload_to_json(&hodor_and_jon())).unwrap();
    let b = to_json(&payload_to_json(&hodor_and_jon())).unwrap();
    assert_eq!(a, b);
}

// --- TOON ---

#[test]
fn test_toon_rows_round_trip() {
    let decoded = round_trip(&hodor_and_jon());
    let rows = decoded.as_array().expect("rows should be an array");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], "hodor");
    assert_eq!(rows[1]["name"], "jon");
}

#[test]
fn test_toon_zero_row_result_keeps_header() {
    let payload = Payload::Rows(
        RowSet::new(
            vec![make_column("col1", "INT"), make_column("col2", "VARCHAR")],
            vec![],
        )
        .unwrap(),
    );
    assert_eq!(to_toon(&payload).unwrap(), "[0]{col1,col2}:\n");
}

#[test]
fn test_toon_zero_row_header_suffixes_repeated_names() {
    let payload = Payload::Rows(
        RowSet::new(vec![make_column("n", "INT"), make_column("n", "INT")], vec![]).unwrap(),
    );
    assert_eq!(to_toon(&payload).unwrap(), "[0]{n,n1}:\n");
}

#[test]
fn test_toon_null_cell() {
    let payload = Payload::Rows(
        RowSet::new(vec![make_column("val", "INT")], vec![vec![SqlValue::Null]]).unwrap(),
    );
    let decoded = round_trip(&payload);
    assert!(decoded[0]["val"].is_null(), "NULL cell should decode as null");
}

#[test]
fn test_toon_outcome_envelope() {
    let toon = outcome_to_toon(&Outcome::Failure {
        message: "cancelled".to_string(),
    })
    .unwrap();
    let decoded: serde_json::Value = toon_format::decode_no_coerce(&toon).unwrap();
    assert_eq!(decoded["success"], false);
    assert_eq!(decoded["message"], "cancelled");
}
