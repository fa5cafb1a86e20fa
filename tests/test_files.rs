use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use blockdb::{
    addresses, is_data_cell, ChunkAddr, ChunkType, Database, Environment, Medium, MemoryMedium,
    NONE,
};
use serde_json::Value;

const CHUNK_CELLS: usize = 512;

// Small chunks so payloads span several of them
fn setup_test_db() -> Database<MemoryMedium> {
    let mut env = Environment::new();
    env.set_chunk_cells(CHUNK_CELLS).unwrap();
    env.open_in_memory().unwrap()
}

fn upload_body(title: &str, mime: &str, data: &[u8]) -> String {
    format!("{};{};{}", title, mime, STANDARD.encode(data))
}

fn holds_data(db: &mut Database<MemoryMedium>, addr: ChunkAddr) -> bool {
    db.medium_mut()
        .chunk(addr)
        .unwrap()
        .map_or(false, |cells| is_data_cell(cells[0]))
}

#[test]
fn test_upload_spans_chunks_and_reads_back() {
    let mut db = setup_test_db();
    let data = vec![0xAB_u8; 600];

    let uploaded = db.upload_file(&upload_body("a.bin", "application/octet-stream", &data));
    assert_eq!(uploaded.status, 200);
    assert_eq!(uploaded.message, "Wrote file a.bin successfully!");

    let payload: Value = serde_json::from_str(uploaded.payload().unwrap()).unwrap();
    assert_eq!(payload["fileId"], 1);
    assert_eq!(payload["title"], "a.bin");
    assert_eq!(payload["link"], "http://localhost:8000/a.bin");

    // 600 bytes are 1200 symbols: two full chunks and part of a third
    let start = addresses::file_payload(1);
    assert!(holds_data(&mut db, start));
    assert!(holds_data(&mut db, start.offset_x(1)));
    assert!(holds_data(&mut db, start.offset_x(2)));
    assert!(!holds_data(&mut db, start.offset_x(3)));

    let file = db.read_file(1).unwrap();
    assert_eq!(file.title, "a.bin");
    assert_eq!(file.mime, "application/octet-stream");
    assert_eq!(file.data, data);
}

#[test]
fn test_delete_file_erases_payload_and_recycles_index() {
    let mut db = setup_test_db();
    db.upload_file(&upload_body("a.bin", "application/octet-stream", &[0xAB; 600]));
    assert!(db.markers().get(addresses::file_marker(1)).is_some());

    let deleted = db.delete_file("q=1");
    assert_eq!(deleted.status, 200);
    assert_eq!(deleted.message, "Deleted file a.bin with success!");

    let start = addresses::file_payload(1);
    for hop in 0..3 {
        assert!(!holds_data(&mut db, start.offset_x(hop)));
    }
    assert!(db.routes().resolve("/a.bin").is_none());
    assert!(db.markers().get(addresses::file_marker(1)).is_none());
    assert!(db.read_file(1).is_err());

    // A short file takes the freed index without picking up old chunks
    let again = db.upload_file(&upload_body("b.txt", "text/plain", b"short"));
    let payload: Value = serde_json::from_str(again.payload().unwrap()).unwrap();
    assert_eq!(payload["fileId"], 1);
    assert_eq!(db.read_file(1).unwrap().data, b"short");
    assert!(!holds_data(&mut db, start.offset_x(1)));
}

#[test]
fn test_files_chain_keeps_upload_order() {
    let mut db = setup_test_db();
    for title in ["one", "two", "three"] {
        let body = upload_body(title, "text/plain", title.as_bytes());
        assert!(db.upload_file(&body).is_success());
    }

    assert!(db.delete_file("id=2").is_success());
    let report: Value =
        serde_json::from_str(db.check_integrity().payload().unwrap()).unwrap();
    assert_eq!(report["files"], 2);
    assert_eq!(report["routes"], 2);

    // The recycled index is linked after file 3
    let body = upload_body("four", "text/plain", b"four");
    assert!(db.upload_file(&body).is_success());
    assert_eq!(db.read_file(2).unwrap().title, "four");
    assert_eq!(db.pop_free(ChunkType::File, NONE).unwrap(), NONE);
}

#[test]
fn test_routes_resolve_to_files() {
    let mut db = setup_test_db();
    db.upload_file(&upload_body("a b", "text/plain", b"first"));
    db.upload_file(&upload_body("a_b", "text/plain", b"second"));

    // The second title slugs to a taken path and gets its index appended
    assert_eq!(db.routes().path_of(1), Some("/a_b"));
    assert_eq!(db.routes().path_of(2), Some("/a_b_2"));

    let first = db.resolve_route("/a_b").unwrap().unwrap();
    assert_eq!(first.data, b"first");
    let second = db.resolve_route("/a_b_2").unwrap().unwrap();
    assert_eq!(second.title, "a_b");
    assert!(db.resolve_route("/missing").unwrap().is_none());
}

#[test]
fn test_upload_rejects_bad_bodies() {
    let mut db = setup_test_db();

    assert_eq!(db.upload_file("").status, 400);
    assert_eq!(db.upload_file("a.txt;text/plain").status, 400);
    assert_eq!(db.upload_file("a.txt;text/plain;aGk=;extra").status, 400);
    assert_eq!(db.upload_file(";text/plain;aGk=").status, 400);
    assert_eq!(db.upload_file("a.txt;;aGk=").status, 400);
    assert_eq!(db.upload_file("a.txt;text/plain;%%%").status, 400);

    assert!(db.upload_file("a.txt;text/plain;aGk=").is_success());
    let duplicate = db.upload_file("a.txt;text/plain;aGk=");
    assert_eq!(duplicate.status, 400);
    assert!(duplicate.message.contains("already exists"));
    assert_eq!(db.routes().len(), 1);
}

#[test]
fn test_delete_file_query_forms() {
    let mut db = setup_test_db();
    db.upload_file("a.txt;text/plain;aGk=");

    assert_eq!(db.delete_file("x=1").status, 400);
    assert_eq!(db.delete_file("q=").status, 400);
    assert_eq!(db.delete_file("q=0").status, 400);
    assert_eq!(db.delete_file("q=-4").status, 400);
    assert_eq!(db.delete_file("q=5").status, 400);
    assert_eq!(db.delete_file("q=1&id=1").status, 400);

    assert!(db.delete_file("?id=1").is_success());
    assert_eq!(db.delete_file("q=1").status, 400);
}

#[test]
fn test_oversized_upload_leaves_no_trace() {
    let mut env = Environment::new();
    env.set_chunk_cells(CHUNK_CELLS).unwrap();
    env.set_max_span_chunks(2).unwrap();
    let mut db = env.open_in_memory().unwrap();

    let too_big = db.upload_file(&upload_body("big", "application/octet-stream", &[1; 600]));
    assert_eq!(too_big.status, 500);
    assert!(db.routes().is_empty());
    assert!(db.read_file(1).is_err());

    let small = db.upload_file(&upload_body("small", "text/plain", b"ok"));
    let payload: Value = serde_json::from_str(small.payload().unwrap()).unwrap();
    assert_eq!(payload["fileId"], 1);
}

#[test]
fn test_empty_file_round_trips() {
    let mut db = setup_test_db();
    assert!(db.upload_file("empty.txt;text/plain;").is_success());

    let file = db.read_file(1).unwrap();
    assert!(file.data.is_empty());
    assert_eq!(file.mime, "text/plain");
}

#[test]
fn test_custom_base_url() {
    let mut env = Environment::new();
    env.set_base_url("https://files.example.org/").unwrap();
    let mut db = env.open_in_memory().unwrap();

    let uploaded = db.upload_file("doc.pdf;application/pdf;aGk=");
    let payload: Value = serde_json::from_str(uploaded.payload().unwrap()).unwrap();
    assert_eq!(payload["link"], "https://files.example.org/doc.pdf");
}
