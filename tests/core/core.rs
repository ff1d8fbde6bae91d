use sigma::core::broker::{self, DbBroker};
use sigma::core::config::{self, SigmaConfig};
use sigma::core::db;
use sigma::core::error::SigmaError;
use sigma::core::identity::{Actor, Role};
use sigma::core::store::{self, Store};
use sigma::plugins::agents::{create_agent, initialize_agents_db};
use sigma::plugins::assignments::{
    Target, initialize_assignments_db, load_assignments, reassign_agent,
};
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

#[test]
fn broker_commits_rolls_back_and_audits() {
    let tmp = tempdir().expect("tempdir");
    let root = tmp.path();
    let db_path = db::sigma_db_path(root);
    let broker = DbBroker::new(root);

    broker
        .with_conn(&db_path, "tester", None, "test.init", |conn| {
            conn.execute("CREATE TABLE t (v INTEGER NOT NULL)", [])?;
            Ok(())
        })
        .expect("init");

    broker
        .with_tx(&db_path, "tester", Some("intent:test:1"), "test.insert", |conn| {
            conn.execute("INSERT INTO t(v) VALUES (1)", [])?;
            Ok(())
        })
        .expect("commit");

    let failed: Result<(), SigmaError> =
        broker.with_tx(&db_path, "tester", None, "test.fail", |conn| {
            conn.execute("INSERT INTO t(v) VALUES (2)", [])?;
            Err(SigmaError::ValidationError("intentional".to_string()))
        });
    assert!(failed.is_err());

    let count: i64 = broker
        .with_conn(&db_path, "tester", None, "test.count", |conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))?)
        })
        .expect("count");
    assert_eq!(count, 1, "failed transaction must roll back");

    let fk_on: i64 = db::db_connect(&db_path.to_string_lossy())
        .expect("connect")
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .expect("pragma");
    assert_eq!(fk_on, 1);

    let events = broker::read_audit_log(root).expect("audit");
    assert_eq!(events.len(), 4);
    assert!(events.iter().any(|ev| ev.status == "error:validation" && ev.op == "test.fail"));
    let insert = events.iter().find(|ev| ev.op == "test.insert").expect("insert event");
    assert_eq!(insert.intent_ref.as_deref(), Some("intent:test:1"));
    assert_eq!(insert.db_id, "sigma.db");
    assert!(insert.ts.ends_with('Z'));

    assert_eq!(broker::schema()["name"], "broker");
}

#[test]
fn broker_keeps_committed_result_when_audit_write_fails() {
    let tmp = tempdir().expect("tempdir");
    let root = tmp.path();
    let db_path = db::sigma_db_path(root);
    let broker = DbBroker::new(root);
    // A directory where the log file should be makes every append fail.
    fs::create_dir_all(root.join(broker::AUDIT_LOG_NAME)).expect("block audit log");

    broker
        .with_conn(&db_path, "tester", None, "test.init", |conn| {
            conn.execute("CREATE TABLE t (v INTEGER NOT NULL)", [])?;
            Ok(())
        })
        .expect("init despite audit failure");
    let inserted = broker.with_tx(&db_path, "tester", None, "test.insert", |conn| {
        conn.execute("INSERT INTO t(v) VALUES (7)", [])?;
        Ok(conn.last_insert_rowid())
    });
    assert!(inserted.is_ok(), "committed write reported as failure");

    let count: i64 = db::db_connect(&db_path.to_string_lossy())
        .expect("connect")
        .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
        .expect("count");
    assert_eq!(count, 1);

    let failed: Result<(), SigmaError> =
        broker.with_tx(&db_path, "tester", None, "test.fail", |_| {
            Err(SigmaError::ValidationError("intentional".to_string()))
        });
    assert!(matches!(failed, Err(SigmaError::ValidationError(_))));
}

#[test]
fn concurrent_reassignments_keep_agents_in_one_sector() {
    let tmp = tempdir().expect("tempdir");
    let store = Store::open(tmp.path()).expect("store");
    initialize_agents_db(&store.root).expect("agents");
    initialize_assignments_db(&store.root).expect("assignments");

    let actor = Actor::new("9001", Role::Supervisor);
    let agents: Vec<String> = (0..4)
        .map(|i| create_agent(&store, &actor, &format!("agent {}", i)).expect("agent").id)
        .collect();
    let agents = Arc::new(agents);
    let sectors = ["JEREZ", "UTRERA", "CÁDIZ"];

    let handles: Vec<_> = (0..6)
        .map(|t| {
            let store = store.clone();
            let actor = actor.clone();
            let agents = Arc::clone(&agents);
            std::thread::spawn(move || {
                let cfg = SigmaConfig::default();
                for step in 0..10 {
                    let agent = &agents[(t + step) % agents.len()];
                    let target = Target::Sector(sectors[(t * 3 + step) % sectors.len()].to_string());
                    reassign_agent(&store, &cfg, &actor, agent, target).expect("reassign");
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("thread");
    }

    let mapping = load_assignments(&store).expect("load");
    let mut seen: Vec<String> = mapping
        .sectors()
        .values()
        .flat_map(|v| v.iter().map(|a| a.id.clone()))
        .collect();
    let listed = seen.len();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), listed, "an agent is listed in two sectors");
    assert_eq!(listed, agents.len());
}

#[test]
fn config_defaults_write_and_reload() {
    let tmp = tempdir().expect("tempdir");
    let project = tmp.path();

    let missing = config::load_config(project).expect("defaults");
    assert_eq!(missing, SigmaConfig::default());

    let mut cfg = SigmaConfig::default();
    cfg.actor.matricula = "9001".to_string();
    cfg.actor.role = "SUPERVISOR".to_string();
    cfg.stations
        .insert("HUELVA".to_string(), vec!["NIEBLA".to_string()]);
    let path = config::write_config(project, &cfg, false).expect("write");
    assert!(path.ends_with(".sigma/config.toml"));

    assert!(matches!(
        config::write_config(project, &cfg, false),
        Err(SigmaError::ValidationError(_))
    ));
    config::write_config(project, &cfg, true).expect("force");

    let loaded = config::load_config(project).expect("reload");
    assert_eq!(loaded, cfg);
    assert_eq!(loaded.stations_of("HUELVA"), &["NIEBLA".to_string()]);

    fs::write(&path, "sectors = 12").expect("corrupt");
    assert!(matches!(
        config::load_config(project),
        Err(SigmaError::ConfigError(_))
    ));
}

#[test]
fn project_root_is_found_from_subdirectories() {
    let tmp = tempdir().expect("tempdir");
    let project = tmp.path();
    let store = Store::for_project(project).expect("store");
    assert!(store.root.ends_with(".sigma/data"));
    assert!(store.root.is_dir());

    let nested = project.join("informes").join("2024");
    fs::create_dir_all(&nested).expect("nested");
    assert_eq!(store::find_project_root(&nested).expect("root"), project);

    let outside = tempdir().expect("outside");
    assert!(matches!(
        store::find_project_root(outside.path()),
        Err(SigmaError::NotFound(_))
    ));
}
