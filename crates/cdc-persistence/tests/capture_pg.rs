//! Captura dentro de la transacción de la mutación: atomicidad y best-effort
//! del canal en vivo.

use cdc_core::{CaptureError, CaptureOutcome, EventLog, NewEvent, Operation, RawRecord, TrackedEntityChange, TrackingRegistry};
use cdc_persistence::pg::{append_in_tx, notify_in_savepoint, PgChangeCapture, PgEventLog, PgPool};
use cdc_persistence::PersistenceError;
use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};
use serde_json::json;
use test_support::{ensure_dept_table, provider, with_pool};
use uuid::Uuid;

#[derive(QueryableByName)]
struct Count {
    #[diesel(sql_type = BigInt)]
    n: i64,
}

fn raw(v: serde_json::Value) -> RawRecord { v.as_object().cloned().unwrap() }

fn capture_for(entity: &str) -> PgChangeCapture {
    PgChangeCapture::new(TrackingRegistry::new().track(entity, ["deptno", "dname", "loc"]))
}

fn events_for(conn: &mut PgConnection, entity: &str) -> i64 {
    diesel::sql_query("SELECT count(*) AS n FROM cdc_event_log WHERE entity_name = $1").bind::<Text, _>(entity)
                                                                                        .get_result::<Count>(conn)
                                                                                        .unwrap()
                                                                                        .n
}

fn dept_rows(conn: &mut PgConnection, deptno: &str) -> i64 {
    diesel::sql_query("SELECT count(*) AS n FROM cdc_test_dept WHERE deptno = $1").bind::<Text, _>(deptno)
                                                                                  .get_result::<Count>(conn)
                                                                                  .unwrap()
                                                                                  .n
}

fn insert_dept(conn: &mut PgConnection, deptno: &str, dname: &str, loc: &str) -> Result<(), PersistenceError> {
    diesel::sql_query("INSERT INTO cdc_test_dept (deptno, dname, loc) VALUES ($1, $2, $3)").bind::<Text, _>(deptno)
                                                                                           .bind::<Text, _>(dname)
                                                                                           .bind::<Text, _>(loc)
                                                                                           .execute(conn)?;
    Ok(())
}

fn setup(pool: &PgPool) -> (String, String) {
    ensure_dept_table(pool);
    (format!("dept_{}", Uuid::new_v4().simple()), Uuid::new_v4().to_string())
}

#[test]
fn mutation_and_event_commit_together() {
    with_pool(|pool| {
        let (entity, deptno) = setup(pool);
        let capture = capture_for(&entity);
        let mut conn = pool.get().expect("conn");

        let row = raw(json!({"deptno": deptno, "dname": "SALES", "loc": "NY"}));
        let outcome = capture.mutate(&mut conn, &entity, |tx| {
                                 insert_dept(tx, &deptno, "SALES", "NY")?;
                                 Ok(TrackedEntityChange::create(deptno.clone(), row.clone()))
                             })
                             .unwrap();
        let entry = outcome.entry().expect("published").clone();
        assert_eq!(entry.operation, Operation::Create);
        assert_eq!(entry.record_id, deptno);
        let payload = entry.change_payload().unwrap();
        assert_eq!(payload.new_values["loc"], Some("NY".to_string()));
        assert!(payload.old_values.is_none());

        // Update sin cambios en campos trackeados: ninguna fila nueva.
        let same = capture.mutate(&mut conn, &entity, |_| Ok(TrackedEntityChange::update(deptno.clone(), row.clone(), row.clone())))
                          .unwrap();
        assert_eq!(same, CaptureOutcome::NoChange);

        assert_eq!(dept_rows(&mut conn, &deptno), 1);
        assert_eq!(events_for(&mut conn, &entity), 1);
        let log = PgEventLog::new(provider(pool));
        assert_eq!(log.get(entry.id).unwrap(), Some(entry));
    });
}

#[test]
fn capture_failure_rolls_back_the_mutation() {
    with_pool(|pool| {
        let (entity, deptno) = setup(pool);
        let capture = capture_for(&entity);
        let mut conn = pool.get().expect("conn");

        let bad = raw(json!({"deptno": deptno, "dname": "SALES", "loc": ["NY", "BOSTON"]}));
        let err = capture.mutate(&mut conn, &entity, |tx| {
                             insert_dept(tx, &deptno, "SALES", "NY")?;
                             Ok(TrackedEntityChange::create(deptno.clone(), bad))
                         })
                         .unwrap_err();
        assert!(matches!(err, CaptureError::Serialization { ref field, .. } if field == "loc"), "{err:?}");
        assert_eq!(dept_rows(&mut conn, &deptno), 0);
        assert_eq!(events_for(&mut conn, &entity), 0);
    });
}

#[test]
fn unregistered_entity_aborts_the_mutation() {
    with_pool(|pool| {
        let (entity, deptno) = setup(pool);
        let capture = capture_for("some_other_entity");
        let mut conn = pool.get().expect("conn");
        let err = capture.mutate(&mut conn, &entity, |tx| {
                             insert_dept(tx, &deptno, "OPS", "DALLAS")?;
                             Ok(TrackedEntityChange::create(deptno.clone(), raw(json!({"deptno": deptno}))))
                         })
                         .unwrap_err();
        assert_eq!(err, CaptureError::UnregisteredEntity(entity.clone()));
        assert_eq!(dept_rows(&mut conn, &deptno), 0);
    });
}

#[test]
fn mutation_errors_surface_as_durability_failures() {
    with_pool(|pool| {
        let (entity, deptno) = setup(pool);
        let capture = capture_for(&entity);
        let mut conn = pool.get().expect("conn");
        insert_dept(&mut conn, &deptno, "SALES", "NY").unwrap();
        let err = capture.mutate(&mut conn, &entity, |tx| {
                             insert_dept(tx, &deptno, "SALES", "NY")?;
                             Ok(TrackedEntityChange::create(deptno.clone(), raw(json!({"deptno": deptno}))))
                         })
                         .unwrap_err();
        assert!(matches!(err, CaptureError::Durability(_)), "{err:?}");
        assert_eq!(events_for(&mut conn, &entity), 0);
    });
}

#[test]
fn broadcast_failure_keeps_the_durable_event() {
    with_pool(|pool| {
        let (entity, deptno) = setup(pool);
        // pg_notify rechaza un canal vacío.
        let capture = PgChangeCapture::with_channel(TrackingRegistry::new().track(&entity, ["deptno", "loc"]), "");
        let mut conn = pool.get().expect("conn");
        let outcome = capture.mutate(&mut conn, &entity, |tx| {
                                 insert_dept(tx, &deptno, "SALES", "NY")?;
                                 Ok(TrackedEntityChange::create(deptno.clone(), raw(json!({"deptno": deptno, "loc": "NY"}))))
                             })
                             .unwrap();
        assert!(outcome.entry().is_some());
        assert_eq!(dept_rows(&mut conn, &deptno), 1);
        assert_eq!(events_for(&mut conn, &entity), 1);
    });
}

#[test]
fn failed_notify_leaves_the_transaction_usable() {
    with_pool(|pool| {
        let entity = format!("dept_{}", Uuid::new_v4().simple());
        let mut conn = pool.get().expect("conn");
        let payload = cdc_core::ChangePayload { new_values: [("loc".to_string(), Some("NY".to_string()))].into_iter().collect(),
                                                old_values: None };
        conn.transaction::<_, PersistenceError, _>(|tx| {
                let ev = NewEvent::new(&entity, Operation::Create, &payload, "10", Utc::now())?;
                let entry = append_in_tx(tx, &ev)?;
                assert!(notify_in_savepoint(tx, "", "{}").is_err());
                notify_in_savepoint(tx, "cdc_events", &entry.live_message()?)?;
                Ok(())
            })
            .unwrap();
        assert_eq!(events_for(&mut conn, &entity), 1);
    });
}
