//! End-to-end tests over the real disk manager: buffer pool eviction,
//! table heap scans, and catalog persistence across reopen.

use std::sync::Arc;

use kestrel_buffer::{BufferPoolConfig, BufferPoolManager};
use kestrel_common::page::{PageId, PAGE_SIZE};
use kestrel_common::types::TypeId;
use kestrel_storage::{
    CatalogManager, Column, DiskManager, DiskManagerConfig, Field, Row, Schema, TableHeap,
};

fn open_disk(dir: &tempfile::TempDir) -> Arc<DiskManager> {
    Arc::new(
        DiskManager::new(DiskManagerConfig {
            db_path: dir.path().join("engine.db"),
            fsync_enabled: false,
        })
        .unwrap(),
    )
}

fn open_pool(disk: Arc<DiskManager>, pool_size: usize) -> Arc<BufferPoolManager> {
    Arc::new(BufferPoolManager::new(
        BufferPoolConfig { pool_size },
        disk,
    ))
}

#[test]
fn test_small_pool_evicts_lru_and_reads_disk_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let disk = open_disk(&dir);

    // Four pages on disk with distinct content.
    let mut pids = Vec::new();
    for i in 0..4u8 {
        let pid = disk.allocate().unwrap();
        let mut data = [0u8; PAGE_SIZE];
        data[0] = 0x10 + i;
        disk.write(pid, &data).unwrap();
        pids.push(pid);
    }

    let pool = open_pool(disk.clone(), 3);

    // Fill the pool; every fetch returns a pinned frame.
    for &pid in &pids[..3] {
        let frame = pool.fetch_page(pid).unwrap();
        assert_eq!(frame.pin_count(), 1);
    }

    // Dirty the first two pages, then release all three.
    for (i, &pid) in pids[..3].iter().enumerate() {
        if i < 2 {
            let frame = pool.fetch_page(pid).unwrap();
            frame.write_data()[1] = 0xAA;
            pool.unpin_page(pid, true);
        }
        pool.unpin_page(pid, false);
    }

    // Fetching a fourth page evicts the least recently unpinned.
    let frame = pool.fetch_page(pids[3]).unwrap();
    assert_eq!(frame.read_data()[0], 0x13);
    assert_eq!(frame.read_data()[1], 0x00);
    pool.unpin_page(pids[3], false);
    assert!(!pool.contains(pids[0]));

    // The evicted dirty page reached disk before its frame was reused.
    let mut out = [0u8; PAGE_SIZE];
    disk.read(pids[0], &mut out).unwrap();
    assert_eq!(out[1], 0xAA);

    assert!(pool.check_all_unpinned());
}

#[test]
fn test_new_page_ids_come_from_bitmap() {
    let dir = tempfile::tempdir().unwrap();
    let disk = open_disk(&dir);
    let pool = open_pool(disk.clone(), 8);

    let (p0, _) = pool.new_page().unwrap();
    let (p1, _) = pool.new_page().unwrap();
    assert_eq!(p0, PageId(0));
    assert_eq!(p1, PageId(1));
    pool.unpin_page(p0, false);
    pool.unpin_page(p1, false);

    // Deleting hands the id back to the allocator.
    pool.delete_page(p0).unwrap();
    assert!(disk.is_page_free(p0));
    let (again, _) = pool.new_page().unwrap();
    assert_eq!(again, p0);
    pool.unpin_page(again, false);
}

fn wide_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Column::new("id", TypeId::Int, 0, false, true),
        Column::new_char("payload", 80, 1, false, false),
    ]))
}

fn wide_row(id: i32) -> Row {
    Row::new(vec![
        Field::Int(id),
        Field::Char(format!("{id:078}")),
    ])
}

#[test]
fn test_heap_ten_thousand_rows_scan_and_delete_half() {
    let dir = tempfile::tempdir().unwrap();
    let disk = open_disk(&dir);
    let pool = open_pool(disk, 64);
    let heap = TableHeap::create(pool.clone(), wide_schema()).unwrap();

    let mut rids = Vec::with_capacity(10_000);
    for id in 0..10_000 {
        let mut row = wide_row(id);
        heap.insert_tuple(&mut row).unwrap();
        rids.push(row.row_id());
    }

    // Forward scan yields every row, in row id order of insertion.
    let mut count = 0;
    for (expected, row) in heap.iter().enumerate() {
        assert_eq!(row.field(0), Some(&Field::Int(expected as i32)));
        assert_eq!(row.row_id(), rids[expected]);
        count += 1;
    }
    assert_eq!(count, 10_000);

    // Point reads round-trip until deletion.
    let probe = heap.get_tuple(rids[1234]).unwrap();
    assert_eq!(probe.field(1), Some(&Field::Char(format!("{:078}", 1234))));

    for rid in rids.iter().step_by(2) {
        heap.mark_delete(*rid).unwrap();
        heap.apply_delete(*rid).unwrap();
    }
    assert_eq!(heap.iter().count(), 5_000);

    // Deleted row ids no longer resolve.
    assert!(heap.get_tuple(rids[0]).is_err());
    assert!(heap.get_tuple(rids[1]).is_ok());

    assert!(pool.check_all_unpinned());
}

#[test]
fn test_heap_update_relocates_grown_tuple() {
    let dir = tempfile::tempdir().unwrap();
    let disk = open_disk(&dir);
    let pool = open_pool(disk, 32);

    let schema = Arc::new(Schema::new(vec![
        Column::new("id", TypeId::Int, 0, false, true),
        Column::new_char("body", 2000, 1, false, false),
    ]));
    let heap = TableHeap::create(pool, schema).unwrap();

    // Three fat rows nearly fill the first page.
    let mut rids = Vec::new();
    for id in 0..3 {
        let mut row = Row::new(vec![Field::Int(id), Field::Char("x".repeat(1200))]);
        heap.insert_tuple(&mut row).unwrap();
        rids.push(row.row_id());
    }

    // Growing the middle row cannot fit in place; it moves elsewhere
    // and the old slot is tombstoned.
    let mut grown = Row::new(vec![Field::Int(1), Field::Char("y".repeat(2000))]);
    heap.update_tuple(&mut grown, rids[1]).unwrap();
    assert_ne!(grown.row_id(), rids[1]);

    let ids: Vec<i32> = heap
        .iter()
        .map(|row| match row.field(0) {
            Some(Field::Int(v)) => *v,
            _ => panic!("bad row"),
        })
        .collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.contains(&1));
}

#[test]
fn test_catalog_survives_reopen_over_fresh_pool() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("catalog.db");

    let rid;
    {
        let disk = Arc::new(
            DiskManager::new(DiskManagerConfig {
                db_path: db_path.clone(),
                fsync_enabled: false,
            })
            .unwrap(),
        );
        let pool = Arc::new(BufferPoolManager::new(
            BufferPoolConfig { pool_size: 64 },
            disk,
        ));
        let mut catalog = CatalogManager::new(pool.clone(), true).unwrap();

        let schema = Schema::new(vec![
            Column::new("id", TypeId::Int, 0, false, true),
            Column::new_char("name", 24, 1, true, false),
        ]);
        let table = catalog.create_table("birds", schema).unwrap();
        catalog
            .create_index("birds", "idx_id", &["id"], "bptree")
            .unwrap();

        let mut row = Row::new(vec![Field::Int(11), Field::Char("kestrel".to_string())]);
        table.heap().insert_tuple(&mut row).unwrap();
        rid = row.row_id();
        catalog.get_index("birds", "idx_id").unwrap().insert_entry(&row).unwrap();

        pool.flush_all().unwrap();
    }

    // A brand new pool over the same file sees the identical catalog.
    let disk = Arc::new(
        DiskManager::new(DiskManagerConfig {
            db_path,
            fsync_enabled: false,
        })
        .unwrap(),
    );
    let pool = Arc::new(BufferPoolManager::new(
        BufferPoolConfig { pool_size: 64 },
        disk,
    ));
    let catalog = CatalogManager::new(pool, false).unwrap();

    let table = catalog.get_table("birds").unwrap();
    assert_eq!(table.schema().column_count(), 2);
    assert_eq!(table.schema().column(0).unwrap().name(), "id");
    assert_eq!(table.schema().column(1).unwrap().type_id(), TypeId::Char);
    assert!(table.schema().column(0).unwrap().is_unique());

    let row = table.heap().get_tuple(rid).unwrap();
    assert_eq!(row.field(1), Some(&Field::Char("kestrel".to_string())));

    let index = catalog.get_index("birds", "idx_id").unwrap();
    assert_eq!(index.lookup(&row).unwrap(), Some(rid));
}

#[test]
fn test_disk_backed_allocation_reserved_ids() {
    let dir = tempfile::tempdir().unwrap();
    let disk = open_disk(&dir);
    let pool = open_pool(disk.clone(), 16);

    let _catalog = CatalogManager::new(pool, true).unwrap();

    // Catalog meta and index roots hold the first two logical ids, so
    // user data starts at page 2.
    assert!(!disk.is_page_free(PageId(0)));
    assert!(!disk.is_page_free(PageId(1)));
    assert_eq!(disk.allocate().unwrap(), PageId(2));
}
