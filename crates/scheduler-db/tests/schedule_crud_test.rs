//! Integration tests for schedule CRUD and enable/disable.

use scheduler_db::queries::schedules;
use scheduler_test_utils::{create_test_db, drop_test_db};

#[tokio::test]
async fn insert_and_fetch_schedule() {
    let (pool, db_name) = create_test_db().await;

    let created = schedules::insert_schedule(
        &pool,
        "nightly-report",
        "builtin.noop",
        "0 0 0 * * *",
        "{\"target\":\"warehouse\"}",
    )
    .await
    .expect("insert should succeed");
    assert!(created.enabled);
    assert!(created.last_fire_at.is_none());

    let fetched = schedules::get_schedule(&pool, created.id)
        .await
        .unwrap()
        .expect("should exist");
    assert_eq!(fetched.name, "nightly-report");

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn list_enabled_schedules_excludes_disabled() {
    let (pool, db_name) = create_test_db().await;

    let a = schedules::insert_schedule(&pool, "a", "builtin.noop", "* * * * * *", "{}")
        .await
        .unwrap();
    let b = schedules::insert_schedule(&pool, "b", "builtin.noop", "* * * * * *", "{}")
        .await
        .unwrap();

    schedules::set_schedule_enabled(&pool, b.id, false)
        .await
        .unwrap();

    let enabled = schedules::list_enabled_schedules(&pool).await.unwrap();
    let ids: Vec<_> = enabled.iter().map(|s| s.id).collect();
    assert!(ids.contains(&a.id));
    assert!(!ids.contains(&b.id));

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn advance_last_fire_at_updates_watermark() {
    let (pool, db_name) = create_test_db().await;

    let created = schedules::insert_schedule(&pool, "a", "builtin.noop", "* * * * * *", "{}")
        .await
        .unwrap();

    let fired_at = chrono::Utc::now();
    let affected = schedules::advance_last_fire_at(&pool, created.id, fired_at)
        .await
        .unwrap();
    assert_eq!(affected, 1);

    let reloaded = schedules::get_schedule(&pool, created.id)
        .await
        .unwrap()
        .unwrap();
    assert!(reloaded.last_fire_at.is_some());

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn delete_schedule_removes_row() {
    let (pool, db_name) = create_test_db().await;

    let created = schedules::insert_schedule(&pool, "a", "builtin.noop", "* * * * * *", "{}")
        .await
        .unwrap();

    let affected = schedules::delete_schedule(&pool, created.id).await.unwrap();
    assert_eq!(affected, 1);

    let gone = schedules::get_schedule(&pool, created.id).await.unwrap();
    assert!(gone.is_none());

    drop_test_db(&db_name).await;
}
