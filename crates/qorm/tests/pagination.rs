mod common;

use common::MockExecutor;
use qorm::{table, OrmError, Record, Value};
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};

fn items(n: i64) -> Vec<Record> {
    (1..=n)
        .map(|id| Record::from([("id", Value::Int(id)), ("active", Value::Bool(id % 2 == 0))]))
        .collect()
}

fn recorder() -> Arc<Mutex<Vec<(usize, Vec<i64>)>>> {
    Arc::new(Mutex::new(Vec::new()))
}

fn ids(rows: &[Record]) -> Vec<i64> {
    rows.iter().map(|r| r.try_get::<i64>("id").unwrap()).collect()
}

#[tokio::test]
async fn chunk_by_id_walks_all_rows() {
    let conn = MockExecutor::new();
    conn.seed("items", items(250));
    let seen = recorder();

    table("items")
        .chunk_by_id(&conn, 100, |rows, page| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push((page, ids(&rows)));
                Ok(ControlFlow::Continue(()))
            }
        })
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    let sizes: Vec<usize> = seen.iter().map(|(_, ids)| ids.len()).collect();
    assert_eq!(sizes, vec![100, 100, 50]);
    assert_eq!(seen.iter().map(|(p, _)| *p).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(seen[1].1[0], 101);
    assert_eq!(seen[2].1.last(), Some(&250));

    let statements = conn.statements();
    assert_eq!(statements.len(), 3);
    assert_eq!(statements[0], r#"SELECT * FROM "items" ORDER BY "id" ASC LIMIT 100"#);
    assert_eq!(
        statements[1],
        r#"SELECT * FROM "items" WHERE "id" > $1 ORDER BY "id" ASC LIMIT 100"#
    );
}

#[tokio::test]
async fn chunk_by_id_keeps_filters_and_goes_down() {
    let conn = MockExecutor::new();
    conn.seed("items", items(10));
    let seen = recorder();

    table("items")
        .where_("active", true)
        .chunk_by_id_desc(&conn, 2, |rows, page| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push((page, ids(&rows)));
                Ok(ControlFlow::Continue(()))
            }
        })
        .await
        .unwrap();

    let all: Vec<i64> = seen.lock().unwrap().iter().flat_map(|(_, ids)| ids.clone()).collect();
    assert_eq!(all, vec![10, 8, 6, 4, 2]);
}

#[tokio::test]
async fn chunk_stops_on_break() {
    let conn = MockExecutor::new();
    conn.seed("items", items(50));
    let seen = recorder();

    table("items")
        .chunk(&conn, 10, |rows, page| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push((page, ids(&rows)));
                Ok(if page == 2 { ControlFlow::Break(()) } else { ControlFlow::Continue(()) })
            }
        })
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].1[0], 11);
}

#[tokio::test]
async fn chunk_handler_error_propagates() {
    let conn = MockExecutor::new();
    conn.seed("items", items(30));

    let err = table("items")
        .chunk_by_id(&conn, 10, |_rows, _page| async {
            Err::<ControlFlow<()>, _>(OrmError::validation("stop"))
        })
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Validation(_)));
    assert_eq!(conn.statements().len(), 1);
}

#[tokio::test]
async fn zero_chunk_size_is_rejected() {
    let conn = MockExecutor::new();
    let err = table("items")
        .chunk(&conn, 0, |_rows, _page| async { Ok(ControlFlow::Continue(())) })
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Validation(_)));
    assert!(conn.statements().is_empty());
}

#[tokio::test]
async fn paginate_reports_total() {
    let conn = MockExecutor::new();
    conn.seed("items", items(25));

    let page = table("items").order_by("id").paginate(&conn, 10, 2).await.unwrap();
    assert_eq!(page.items.len(), 10);
    assert_eq!(page.total, 25);
    assert_eq!(page.current_page, 2);
    assert_eq!(page.last_page(), 3);
    assert!(page.has_more());
    assert_eq!(ids(&page.items)[0], 11);

    let statements = conn.statements();
    assert_eq!(statements[0], r#"SELECT COUNT(*) AS "aggregate" FROM "items""#);
    assert_eq!(
        statements[1],
        r#"SELECT * FROM "items" ORDER BY "id" ASC LIMIT 10 OFFSET 10"#
    );
}

#[tokio::test]
async fn simple_paginate_last_page() {
    let conn = MockExecutor::new();
    conn.seed("items", items(25));

    let page = table("items").simple_paginate(&conn, 10, 3).await.unwrap();
    assert_eq!(page.items.len(), 5);
    assert!(!page.has_more);

    let page = table("items").simple_paginate(&conn, 10, 1).await.unwrap();
    assert_eq!(page.items.len(), 10);
    assert!(page.has_more);
    assert_eq!(
        conn.statements().last().map(String::as_str),
        Some(r#"SELECT * FROM "items" LIMIT 11 OFFSET 0"#)
    );
}

#[tokio::test]
async fn extreme_page_sizes_do_not_overflow() {
    let conn = MockExecutor::new();
    conn.seed("items", items(25));

    let page = table("items").simple_paginate(&conn, u64::MAX, 1).await.unwrap();
    assert_eq!(page.items.len(), 25);
    assert!(!page.has_more);
    assert_eq!(
        conn.statements().last().map(String::as_str),
        Some(r#"SELECT * FROM "items" LIMIT 9223372036854775807 OFFSET 0"#)
    );

    let page = table("items").paginate(&conn, u64::MAX, u64::MAX).await.unwrap();
    assert_eq!(page.total, 25);
    assert!(page.items.is_empty());
    assert_eq!(page.last_page(), 1);
}
