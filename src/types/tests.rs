use super::*;

fn file_chunk(path: &str, index: usize, total: usize) -> IndexableUnit {
    IndexableUnit::FileChunk {
        filepath: path.to_string(),
        chunk_index: index,
        total_chunks: total,
        content: format!("content of {} #{}", path, index),
        last_modified: "2024-05-01T10:00:00+00:00".to_string(),
    }
}

#[test]
fn test_point_ids_are_content_addressed() {
    assert_eq!(file_chunk("src/b.ts", 2, 3).point_id(), "file:src/b.ts:chunk:2");

    let commit = IndexableUnit::CommitInfo {
        commit_oid: "abc123".to_string(),
        message: "Initial commit".to_string(),
        author_name: "Dev".to_string(),
        author_email: "dev@example.com".to_string(),
        date: "2024-05-01T10:00:00+00:00".to_string(),
        changed_files_summary: vec!["add a.ts".to_string()],
        parent_oids: vec![],
    };
    assert_eq!(commit.point_id(), "commit:abc123");

    let diff = IndexableUnit::DiffChunk {
        commit_oid: "abc123".to_string(),
        filepath: "a.ts".to_string(),
        chunk_index: 0,
        total_chunks: 1,
        content: "+const a = 1;".to_string(),
        change_type: ChangeType::Add,
    };
    assert_eq!(diff.point_id(), "diff:abc123:a.ts:chunk:0");
}

#[test]
fn test_payload_is_tagged_by_data_type() {
    let json = serde_json::to_value(file_chunk("a.ts", 0, 1)).unwrap();
    assert_eq!(json["dataType"], "file_chunk");
    assert_eq!(json["filepath"], "a.ts");
    assert_eq!(json["chunk_index"], 0);
    assert_eq!(json["total_chunks"], 1);

    let diff = IndexableUnit::DiffChunk {
        commit_oid: "c1".to_string(),
        filepath: "a.ts".to_string(),
        chunk_index: 0,
        total_chunks: 1,
        content: String::new(),
        change_type: ChangeType::Typechange,
    };
    let json = serde_json::to_value(&diff).unwrap();
    assert_eq!(json["dataType"], "diff_chunk");
    assert_eq!(json["change_type"], "typechange");
}

#[test]
fn test_payload_deserializes_from_store_json() {
    let json = serde_json::json!({
        "dataType": "commit_info",
        "commit_oid": "ff00",
        "message": "Fix parser",
        "author_name": "A",
        "author_email": "a@example.com",
        "date": "2024-01-01T00:00:00+00:00",
        "changed_files_summary": ["modify src/parser.rs"],
        "parent_oids": ["ee11"]
    });
    let unit: IndexableUnit = serde_json::from_value(json).unwrap();
    assert_eq!(unit.data_type(), DataType::CommitInfo);
    assert_eq!(unit.content(), "Fix parser");
    assert_eq!(unit.commit_oid(), Some("ff00"));
    assert_eq!(unit.filepath(), None);
}

#[test]
fn test_index_point_takes_id_from_payload() {
    let point = IndexPoint::new(file_chunk("lib.rs", 4, 5), vec![0.1, 0.2]);
    assert_eq!(point.id, "file:lib.rs:chunk:4");
}

#[test]
fn test_search_hit_projection() {
    let unit = file_chunk("b.ts", 2, 3);
    let hit = SearchHit::from_unit(unit.point_id(), 0.91, &unit);
    assert_eq!(hit.data_type, DataType::FileChunk);
    assert_eq!(hit.filepath.as_deref(), Some("b.ts"));
    assert_eq!(hit.chunk_index, Some(2));
    assert_eq!(hit.total_chunks, Some(3));
    assert!(hit.commit_oid.is_none());

    let json = serde_json::to_value(&hit).unwrap();
    assert_eq!(json["dataType"], "file_chunk");
    assert_eq!(json["chunkIndex"], 2);
    assert!(json.get("commitOid").is_none());
}

#[test]
fn test_search_request_validation() {
    assert!(SearchRequest::new("parse config").validate().is_ok());
    assert!(matches!(
        SearchRequest::new("   ").validate(),
        Err(ValidationError::Empty(_))
    ));

    let mut req = SearchRequest::new("x");
    req.limit = Some(0);
    assert!(req.validate().is_err());
    req.limit = Some(101);
    assert!(req.validate().is_err());
    req.limit = Some(100);
    assert!(req.validate().is_ok());

    req.relevance_threshold = Some(1.2);
    assert!(req.validate().is_err());
}

#[test]
fn test_search_request_defaults_from_json() {
    let req: SearchRequest = serde_json::from_str(r#"{"query": "retry logic"}"#).unwrap();
    assert!(req.scope_files.is_empty());
    assert!(req.limit.is_none());
    assert!(req.max_refinements.is_none());
}

#[test]
fn test_neighbor_serialization() {
    let missing = Neighbor::Missing {
        chunk_index: -1,
        reason: "start of file".to_string(),
    };
    let json = serde_json::to_value(&missing).unwrap();
    assert_eq!(json["status"], "missing");
    assert_eq!(json["chunk_index"], -1);
    assert!(!missing.is_found());
}

#[test]
fn test_change_type_display() {
    assert_eq!(ChangeType::Add.to_string(), "add");
    assert_eq!(ChangeType::Delete.to_string(), "delete");
    assert_eq!(DataType::DiffChunk.to_string(), "diff_chunk");
}

#[test]
fn test_embedding_text_uses_content_when_present() {
    let chunk = file_chunk("a.ts", 0, 1);
    assert!(matches!(chunk.embedding_text(), Cow::Borrowed("content of a.ts #0")));
}

#[test]
fn test_embedding_text_never_blank() {
    let blank = IndexableUnit::FileChunk {
        filepath: "pad.rs".to_string(),
        chunk_index: 2,
        total_chunks: 3,
        content: "\n".repeat(2000),
        last_modified: String::new(),
    };
    assert_eq!(blank.embedding_text(), "pad.rs chunk 3 of 3");

    let commit = IndexableUnit::CommitInfo {
        commit_oid: "abc123".to_string(),
        message: String::new(),
        author_name: "Dev".to_string(),
        author_email: "dev@example.com".to_string(),
        date: "2024-05-01T10:00:00+00:00".to_string(),
        changed_files_summary: vec!["add a.ts".to_string(), "delete b.ts".to_string()],
        parent_oids: vec![],
    };
    assert_eq!(commit.embedding_text(), "commit abc123\nadd a.ts\ndelete b.ts");

    let diff = IndexableUnit::DiffChunk {
        commit_oid: "c1".to_string(),
        filepath: "a.ts".to_string(),
        chunk_index: 0,
        total_chunks: 1,
        content: " \t\u{0007}".to_string(),
        change_type: ChangeType::Modify,
    };
    assert_eq!(diff.embedding_text(), "modify a.ts in commit c1 chunk 1 of 1");
}

#[test]
fn test_json_schemas_describe_public_types() {
    let schemas = json_schemas().unwrap();
    assert_eq!(schemas.len(), 6);

    let request = &schemas["SearchRequest"];
    assert_eq!(request["type"], "object");
    assert!(request["properties"].get("query").is_some());
    assert!(
        request["required"]
            .as_array()
            .is_some_and(|r| r.iter().any(|f| f == "query"))
    );

    let unit = serde_json::to_string(&schemas["IndexableUnit"]).unwrap();
    assert!(unit.contains("dataType"));
    assert!(unit.contains("file_chunk"));
}
