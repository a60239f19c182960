use docrow_core::{
    in_transaction, open_database, Book, Database, DatabaseConfig, EntityService, ErrorKind,
    ServiceError, StoreError, TxContext, TxMode,
};
use std::sync::Barrier;
use std::thread;

const WORKERS: usize = 4;
const ROUNDS: u32 = 10;

fn open_file_db(dir: &tempfile::TempDir) -> Database {
    let db = open_database(
        dir.path().join("concurrent.sqlite3"),
        &DatabaseConfig {
            pool_size: WORKERS as u32,
            busy_timeout_ms: 10_000,
            ..DatabaseConfig::default()
        },
    )
    .unwrap();
    db.register::<Book>().unwrap();
    db
}

#[test]
fn immediate_read_modify_write_loses_no_updates() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_file_db(&dir);
    let service = EntityService::<Book>::new(db.clone());
    let id = service
        .create(&mut TxContext::new(), Book::new("counter"))
        .unwrap()
        .header
        .id;

    thread::scope(|scope| {
        for _ in 0..WORKERS {
            scope.spawn(|| {
                let mut ctx = TxContext::new();
                for _ in 0..ROUNDS {
                    in_transaction(&db, &mut ctx, TxMode::Immediate, |ctx| {
                        let mut book = service.get_by_id(ctx, &id)?.ok_or_else(|| {
                            ServiceError::from(StoreError::NotFound {
                                kind: "book",
                                id: id.clone(),
                            })
                        })?;
                        book.pages += 1;
                        service.update(ctx, book)?;
                        Ok(())
                    })
                    .unwrap();
                }
            });
        }
    });

    let book = service
        .get_by_id(&mut TxContext::new(), &id)
        .unwrap()
        .unwrap();
    assert_eq!(book.pages, WORKERS as u32 * ROUNDS);
    assert_eq!(db.idle_connections(), WORKERS);
}

#[test]
fn writes_inside_deferred_scopes_are_rejected_not_interleaved() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_file_db(&dir);
    let service = EntityService::<Book>::new(db.clone());
    let id = service
        .create(&mut TxContext::new(), Book::new("counter"))
        .unwrap()
        .header
        .id;
    let both_read = Barrier::new(2);

    let kinds: Vec<ErrorKind> = thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                scope.spawn(|| {
                    let mut ctx = TxContext::new();
                    let result = in_transaction(&db, &mut ctx, TxMode::Deferred, |ctx| {
                        let book = service.get_by_id(ctx, &id)?;
                        both_read.wait();
                        let mut book = book.ok_or_else(|| {
                            ServiceError::from(StoreError::NotFound {
                                kind: "book",
                                id: id.clone(),
                            })
                        })?;
                        book.pages += 1;
                        service.update(ctx, book)?;
                        Ok(())
                    });
                    assert!(!ctx.is_active());
                    result.unwrap_err().kind()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(kinds, vec![ErrorKind::State, ErrorKind::State]);
    let book = service
        .get_by_id(&mut TxContext::new(), &id)
        .unwrap()
        .unwrap();
    assert_eq!(book.pages, 0);
    assert_eq!(db.idle_connections(), WORKERS);
}

#[test]
fn concurrent_creates_all_persist_with_distinct_ids() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_file_db(&dir);
    let service = EntityService::<Book>::new(db.clone());

    let ids: Vec<String> = thread::scope(|scope| {
        let handles: Vec<_> = (0..WORKERS)
            .map(|worker| {
                let service = &service;
                scope.spawn(move || {
                    let mut ctx = TxContext::new();
                    (0..5)
                        .map(|n| {
                            service
                                .create(&mut ctx, Book::sample(worker * 100 + n))
                                .unwrap()
                                .header
                                .id
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect()
    });

    let mut unique = ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), WORKERS * 5);
    assert_eq!(
        service.list(&mut TxContext::new(), None).unwrap().len(),
        WORKERS * 5
    );
}
