use blockdb::{
    addresses, encode, Chain, ChainKind, ChunkAddr, ChunkStore, Database, Environment, FileMeta,
    Medium, MemoryMedium, WalkLimits, EMPTY_CELL,
};
use serde_json::Value;

// Common test setup
fn setup_test_db() -> Database<MemoryMedium> {
    Environment::new().open_in_memory().unwrap()
}

fn setup_table(db: &mut Database<MemoryMedium>, rows: usize) -> u32 {
    db.create_table("t");
    for v in 1..=rows {
        db.insert_row("t", &format!(r#"{{"v":{}}}"#, v));
    }
    db.table_index("t").unwrap().unwrap()
}

/// Overwrite a chunk behind the engine's back
fn poke(db: &mut Database<MemoryMedium>, addr: ChunkAddr, text: &str) {
    let cells = db.medium_mut().chunk_mut(addr).unwrap();
    cells.fill(EMPTY_CELL);
    for (cell, symbol) in cells.iter_mut().zip(encode(text.as_bytes())) {
        *cell = symbol.to_cell();
    }
}

fn file(title: &str) -> FileMeta {
    FileMeta {
        title: title.to_string(),
        mime: "text/plain".to_string(),
        last_index: 0,
        next_index: 0,
    }
}

fn titles(chain: &mut Chain<'_, MemoryMedium>) -> Vec<(u32, String)> {
    chain
        .walk::<FileMeta>()
        .unwrap()
        .into_iter()
        .map(|(index, meta)| (index, meta.title))
        .collect()
}

#[test]
fn test_chain_links_arbitrary_indices() {
    let mut store = ChunkStore::new(MemoryMedium::new(1024), 16);
    let mut chain = Chain::new(&mut store, ChainKind::Files, WalkLimits::default());
    assert_eq!(chain.head().unwrap(), 0);

    chain.append(5, file("five")).unwrap();
    chain.append(2, file("two")).unwrap();
    chain.append(9, file("nine")).unwrap();
    assert_eq!(chain.head().unwrap(), 5);

    // Splicing out the middle node relinks its neighbours
    let removed: FileMeta = chain.splice_out(2).unwrap();
    assert_eq!((removed.last_index, removed.next_index), (5, 9));
    assert!(chain.get::<FileMeta>(2).unwrap().is_none());

    // A reused index joins at the tail, not where it used to be
    chain.append(2, file("two again")).unwrap();
    assert_eq!(
        titles(&mut chain),
        vec![
            (5, "five".to_string()),
            (9, "nine".to_string()),
            (2, "two again".to_string())
        ]
    );

    let report = chain.check::<FileMeta>().unwrap();
    assert_eq!((report.length, report.tail, report.highest), (3, 2, 9));
}

#[test]
fn test_chain_head_and_tail_removal() {
    let mut store = ChunkStore::new(MemoryMedium::new(1024), 16);
    let mut chain = Chain::new(&mut store, ChainKind::Tables, WalkLimits::default());
    for (index, title) in [(1, "a"), (2, "b"), (3, "c")] {
        chain.append(index, file(title)).unwrap();
    }

    chain.splice_out::<FileMeta>(1).unwrap();
    assert_eq!(chain.head().unwrap(), 2);
    chain.splice_out::<FileMeta>(3).unwrap();
    assert_eq!(titles(&mut chain), vec![(2, "b".to_string())]);

    chain.splice_out::<FileMeta>(2).unwrap();
    assert_eq!(chain.head().unwrap(), 0);
    assert!(chain.walk::<FileMeta>().unwrap().is_empty());
}

#[test]
fn test_chain_refuses_occupied_and_out_of_range_indices() {
    let mut store = ChunkStore::new(MemoryMedium::new(1024), 16);
    let limits = WalkLimits {
        max_steps: 100,
        max_index: 10,
    };
    let mut chain = Chain::new(&mut store, ChainKind::Files, limits);
    chain.append(1, file("one")).unwrap();

    assert!(chain.append(1, file("again")).is_err());
    assert!(chain.append(0, file("zero")).is_err());
    assert!(chain.append(11, file("eleven")).is_err());
    assert!(chain.splice_out::<FileMeta>(4).is_err());
    assert_eq!(chain.check::<FileMeta>().unwrap().length, 1);
}

#[test]
fn test_interleaved_inserts_and_deletes_stay_consistent() {
    let mut db = setup_test_db();
    setup_table(&mut db, 10);
    for id in [3, 7, 1] {
        assert!(db.delete_row("t", id).is_success());
    }
    for v in 11..=13 {
        db.insert_row("t", &format!(r#"{{"v":{}}}"#, v));
    }
    db.delete_row("t", 10);

    let rows: Vec<Value> =
        serde_json::from_str(db.read_table("t").payload().unwrap()).unwrap();
    let ids: Vec<u64> = rows.iter().map(|row| row["id"].as_u64().unwrap()).collect();
    assert_eq!(ids, vec![2, 4, 5, 6, 8, 9, 3, 7, 1]);

    let report: Value =
        serde_json::from_str(db.check_integrity().payload().unwrap()).unwrap();
    // Nine live rows plus the descriptor left behind by row 10
    assert_eq!(report["rows"], 10);
    assert_eq!(report["tables"], 2);
}

#[test]
fn test_cycle_is_reported_as_corruption() {
    let mut db = setup_test_db();
    let t = setup_table(&mut db, 2);

    poke(
        &mut db,
        addresses::row(t, 2),
        r#"{"lastIndex":1,"nextIndex":1,"content":{"id":2,"v":2}}"#,
    );

    let read = db.read_table("t");
    assert_eq!(read.status, 500);
    assert!(read.message.contains("cycle"));
    assert_eq!(db.check_integrity().status, 500);
    assert_eq!(db.insert_row("t", r#"{"v":3}"#).status, 500);
}

#[test]
fn test_bad_head_pointer() {
    let mut db = setup_test_db();
    let t = setup_table(&mut db, 1);

    poke(&mut db, addresses::row_head(t), "999999");
    assert_eq!(db.read_table("t").status, 500);

    poke(&mut db, addresses::row_head(t), "abc");
    assert_eq!(db.read_table("t").status, 500);

    // Points inside the range but at an empty chunk
    poke(&mut db, addresses::row_head(t), "4");
    assert_eq!(db.read_table("t").status, 500);
}

#[test]
fn test_unterminated_chunk_hits_ceiling() {
    let mut db = setup_test_db();
    let t = setup_table(&mut db, 1);

    db.medium_mut()
        .chunk_mut(addresses::row(t, 1))
        .unwrap()
        .fill(1);

    let read = db.read_row("t", 1);
    assert_eq!(read.status, 500);
    assert!(read.message.contains("possible data corruption"));
}

#[test]
fn test_odd_symbol_run_is_corruption() {
    let mut db = setup_test_db();
    let t = setup_table(&mut db, 1);

    let cells = db.medium_mut().chunk_mut(addresses::row(t, 1)).unwrap();
    cells.fill(EMPTY_CELL);
    cells[..3].copy_from_slice(&[8, 12, 3]);

    assert_eq!(db.read_row("t", 1).status, 500);
}

#[test]
fn test_unparseable_metadata() {
    let mut db = setup_test_db();
    let t = setup_table(&mut db, 1);

    poke(&mut db, addresses::row(t, 1), "{not json");
    assert_eq!(db.read_table("t").status, 500);

    poke(&mut db, addresses::table_meta(t), r#"{"title":"","lastIndex":0,"nextIndex":0}"#);
    assert_eq!(db.list_tables().status, 500);
}

#[test]
fn test_tables_grow_past_integrity_step_cap() {
    let mut env = Environment::new();
    env.set_max_chain_steps(5).unwrap();
    let mut db = env.open_in_memory().unwrap();
    db.create_table("t");

    // Reads and appends are not bounded by the integrity cap
    for v in 1..=12 {
        assert!(db.insert_row("t", &format!(r#"{{"v":{}}}"#, v)).is_success());
    }
    let rows: Vec<Value> =
        serde_json::from_str(db.read_table("t").payload().unwrap()).unwrap();
    assert_eq!(rows.len(), 12);
    assert_eq!(db.read_row("t", 12).payload(), Some(r#"{"id":12,"v":12}"#));
    assert_eq!(
        db.read_table_with_condition("t", "v", "11").payload(),
        Some(r#"[{"id":11,"v":11}]"#)
    );
    assert!(db.delete_row("t", 1).is_success());
    assert!(db.insert_row("t", r#"{"v":13}"#).is_success());

    // The integrity walk keeps its cap
    let report = db.check_integrity();
    assert_eq!(report.status, 500);
    assert!(report.message.contains("walk exceeded 5 steps"));
}

#[test]
fn test_integrity_checks_back_pointers_and_ids() {
    let mut db = setup_test_db();
    let t = setup_table(&mut db, 2);

    // Forward walks do not look at back pointers
    poke(
        &mut db,
        addresses::row(t, 2),
        r#"{"lastIndex":5,"nextIndex":0,"content":{"id":2,"v":2}}"#,
    );
    assert!(db.read_table("t").is_success());
    assert_eq!(db.check_integrity().status, 500);

    poke(
        &mut db,
        addresses::row(t, 2),
        r#"{"lastIndex":1,"nextIndex":0,"content":{"id":7,"v":2}}"#,
    );
    assert_eq!(db.check_integrity().status, 500);

    poke(
        &mut db,
        addresses::row(t, 2),
        r#"{"lastIndex":1,"nextIndex":0,"content":{"id":2,"v":2}}"#,
    );
    assert!(db.check_integrity().is_success());
}
