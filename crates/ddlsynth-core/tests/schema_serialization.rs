use ddlsynth_core::{ColumnDef, ForeignKey, Schema, TableDef};

#[test]
fn serializes_schema_with_camel_case_contract() {
    let mut books = TableDef::new("books");
    books
        .columns
        .insert("id".to_string(), ColumnDef::new("INT", false));
    books
        .columns
        .insert("author_id".to_string(), ColumnDef::new("INT", true));
    books.primary_key = vec!["id".to_string()];
    books.foreign_keys.push(ForeignKey {
        columns: vec!["author_id".to_string()],
        reference_table: "authors".to_string(),
        reference_columns: vec!["id".to_string()],
    });

    let mut schema = Schema::default();
    schema.tables.insert("books".to_string(), books);

    let json = serde_json::to_string_pretty(&schema).expect("serialize schema");
    let expected = r#"{
  "tables": {
    "books": {
      "name": "books",
      "columns": {
        "id": {
          "type": "INT",
          "nullable": false
        },
        "author_id": {
          "type": "INT",
          "nullable": true
        }
      },
      "primaryKey": [
        "id"
      ],
      "foreignKeys": [
        {
          "columns": [
            "author_id"
          ],
          "referenceTable": "authors",
          "referenceColumns": [
            "id"
          ]
        }
      ]
    }
  },
  "meta": {
    "parseWarnings": []
  }
}"#;
    assert_eq!(json, expected);
}

#[test]
fn deserializes_sparse_schema_with_defaults() {
    let schema: Schema = serde_json::from_str(
        r#"{"tables": {"t": {"name": "t", "columns": {"c": {"type": "text"}}}}}"#,
    )
    .expect("parse schema");

    let table = schema.table("t").expect("table t");
    assert!(table.columns["c"].nullable);
    assert!(table.primary_key.is_empty());
    assert!(schema.meta.parse_warnings.is_empty());
}
