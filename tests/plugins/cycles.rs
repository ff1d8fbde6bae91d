use sigma::core::config::SigmaConfig;
use sigma::core::db::{db_connect, sigma_db_path};
use sigma::core::error::SigmaError;
use sigma::core::identity::{Actor, Role};
use sigma::core::store::Store;
use sigma::plugins::cycles::{
    CycleKey, CycleStatus, CycleSummary, SnapshotStatus, cycle_progress, cycle_status,
    cycle_summary, cycle_view,
    initialize_cycles_db, list_archives, sector_dashboard, semester_overview, set_plan,
    validate_cycle, verify_archives,
};
use sigma::plugins::elements::{
    Element, ElementFilter, InstallationType, NewElement, Params, create_element, delete_element,
    get_element, initialize_elements_db, list_elements, set_monthly_check,
};
use tempfile::tempdir;

fn setup() -> (tempfile::TempDir, Store) {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    initialize_elements_db(&store.root).unwrap();
    initialize_cycles_db(&store.root).unwrap();
    (tmp, store)
}

fn supervisor() -> Actor {
    Actor::new("9001", Role::Supervisor)
}

fn add(store: &Store, sector: &str, station: &str, name: &str, t: InstallationType) -> Element {
    create_element(
        store,
        &SigmaConfig::default(),
        &supervisor(),
        NewElement {
            name: name.to_string(),
            installation_type: t,
            sector: sector.to_string(),
            station: station.to_string(),
            params: Params::new(),
        },
    )
    .unwrap()
}

fn complete(store: &Store, el: &Element) {
    set_monthly_check(store, &supervisor(), &el.id, true).unwrap();
}

fn utrera_march() -> CycleKey {
    CycleKey::new(3, 2024, "UTRERA").unwrap()
}

#[test]
fn test_validate_archives_and_resets_sector() {
    let (_tmp, store) = setup();
    let cfg = SigmaConfig::default();
    let actor = supervisor();

    let e1 = add(&store, "UTRERA", "ARAHAL", "AG 1", InstallationType::Motores);
    let e2 = add(&store, "UTRERA", "ARAHAL", "AG 2", InstallationType::Motores);
    let e3 = add(&store, "UTRERA", "OSUNA", "CV 1", InstallationType::Circuitos);
    let x1 = add(&store, "JEREZ", "CORTADURA", "PN 1", InstallationType::Pn);
    complete(&store, &e1);
    complete(&store, &e3);
    complete(&store, &x1);

    let key = utrera_march();
    assert_eq!(cycle_status(&store, &key).unwrap(), CycleStatus::NoPlan);

    set_plan(&store, &cfg, &actor, &key, &[e1.id.clone(), e2.id.clone()]).unwrap();
    assert_eq!(cycle_status(&store, &key).unwrap(), CycleStatus::Planned);
    assert_eq!(cycle_progress(&store, &key).unwrap(), 50);

    let archive = validate_cycle(&store, &actor, &key).unwrap();
    let snaps: Vec<(String, SnapshotStatus)> = archive
        .snapshots
        .iter()
        .map(|s| (s.element_id.clone(), s.status))
        .collect();
    assert_eq!(
        snaps,
        vec![
            (e1.id.clone(), SnapshotStatus::Completed),
            (e2.id.clone(), SnapshotStatus::Pending),
        ]
    );
    assert_eq!(archive.validated_by, "9001");
    assert_eq!(cycle_status(&store, &key).unwrap(), CycleStatus::Validated);
    assert_eq!(cycle_progress(&store, &key).unwrap(), 50);

    // Every UTRERA element is pending again, planned or not.
    let utrera = list_elements(
        &store,
        &ElementFilter {
            sector: Some("UTRERA".to_string()),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(utrera.len(), 3);
    assert!(utrera.iter().all(|e| e.is_pending_monthly));
    assert!(!get_element(&store, &x1.id).unwrap().is_pending_monthly);
}

#[test]
fn test_validated_cycle_is_immutable() {
    let (_tmp, store) = setup();
    let cfg = SigmaConfig::default();
    let actor = supervisor();
    let e1 = add(&store, "UTRERA", "ARAHAL", "AG 1", InstallationType::Motores);
    complete(&store, &e1);

    let key = utrera_march();
    set_plan(&store, &cfg, &actor, &key, &[e1.id.clone()]).unwrap();
    let first = validate_cycle(&store, &actor, &key).unwrap();

    complete(&store, &e1);
    assert!(matches!(
        validate_cycle(&store, &actor, &key),
        Err(SigmaError::Immutable(_))
    ));
    assert!(matches!(
        set_plan(&store, &cfg, &actor, &key, &[]),
        Err(SigmaError::Immutable(_))
    ));

    let archives = list_archives(&store, Some("UTRERA")).unwrap();
    assert_eq!(archives, vec![first]);
    // The failed validation did not reset the element either.
    assert!(!get_element(&store, &e1.id).unwrap().is_pending_monthly);
}

#[test]
fn test_empty_plan_is_rejected_without_changes() {
    let (_tmp, store) = setup();
    let cfg = SigmaConfig::default();
    let actor = supervisor();
    let e1 = add(&store, "UTRERA", "ARAHAL", "AG 1", InstallationType::Motores);
    complete(&store, &e1);

    let key = utrera_march();
    assert!(matches!(
        validate_cycle(&store, &actor, &key),
        Err(SigmaError::EmptyPlan(_))
    ));

    set_plan(&store, &cfg, &actor, &key, &[]).unwrap();
    assert!(matches!(
        validate_cycle(&store, &actor, &key),
        Err(SigmaError::EmptyPlan(_))
    ));
    assert_eq!(cycle_status(&store, &key).unwrap(), CycleStatus::Planned);
    assert!(list_archives(&store, None).unwrap().is_empty());
    assert!(!get_element(&store, &e1.id).unwrap().is_pending_monthly);
}

#[test]
fn test_set_plan_checks_elements() {
    let (_tmp, store) = setup();
    let cfg = SigmaConfig::default();
    let actor = supervisor();
    let e1 = add(&store, "UTRERA", "ARAHAL", "AG 1", InstallationType::Motores);
    let e2 = add(&store, "UTRERA", "ARAHAL", "AG 2", InstallationType::Motores);
    let x1 = add(&store, "JEREZ", "CORTADURA", "PN 1", InstallationType::Pn);
    let key = utrera_march();

    assert!(matches!(
        set_plan(&store, &cfg, &actor, &key, &["EL_missing".to_string()]),
        Err(SigmaError::NotFound(_))
    ));
    assert!(matches!(
        set_plan(&store, &cfg, &actor, &key, &[x1.id.clone()]),
        Err(SigmaError::ValidationError(_))
    ));
    assert_eq!(cycle_status(&store, &key).unwrap(), CycleStatus::NoPlan);

    let plan = set_plan(
        &store,
        &cfg,
        &actor,
        &key,
        &[e2.id.clone(), e1.id.clone(), e2.id.clone()],
    )
    .unwrap();
    assert_eq!(plan.element_ids, vec![e2.id.clone(), e1.id.clone()]);

    // Replacing the plan twice with the same ids changes nothing.
    let again = set_plan(&store, &cfg, &actor, &key, &[e1.id.clone()]).unwrap();
    let same = set_plan(&store, &cfg, &actor, &key, &[e1.id.clone()]).unwrap();
    assert_eq!(again, same);
    let view = cycle_view(&store, &key).unwrap();
    assert_eq!(view.rows.len(), 1);
    assert_eq!(view.rows[0].element_id, e1.id);

    let unknown = CycleKey::new(3, 2024, "MÁLAGA").unwrap();
    assert!(matches!(
        set_plan(&store, &cfg, &actor, &unknown, &[]),
        Err(SigmaError::NotFound(_))
    ));
}

#[test]
fn test_deleted_elements_drop_out_of_plan() {
    let (_tmp, store) = setup();
    let cfg = SigmaConfig::default();
    let actor = supervisor();
    let e1 = add(&store, "UTRERA", "ARAHAL", "AG 1", InstallationType::Motores);
    let e2 = add(&store, "UTRERA", "ARAHAL", "AG 2", InstallationType::Motores);
    complete(&store, &e1);

    let key = utrera_march();
    set_plan(&store, &cfg, &actor, &key, &[e1.id.clone(), e2.id.clone()]).unwrap();
    delete_element(&store, &actor, &e2.id).unwrap();
    assert_eq!(cycle_progress(&store, &key).unwrap(), 100);

    let archive = validate_cycle(&store, &actor, &key).unwrap();
    assert_eq!(archive.snapshots.len(), 1);
    assert_eq!(archive.snapshots[0].element_id, e1.id);
}

#[test]
fn test_semester_and_dashboard() {
    let (_tmp, store) = setup();
    let cfg = SigmaConfig::default();
    let actor = supervisor();
    let m1 = add(&store, "UTRERA", "ARAHAL", "AG 1", InstallationType::Motores);
    let m2 = add(&store, "UTRERA", "ARAHAL", "AG 2", InstallationType::Motores);
    let m3 = add(&store, "UTRERA", "OSUNA", "AG 3", InstallationType::Motores);
    add(&store, "UTRERA", "OSUNA", "BAT 1", InstallationType::Baterias);
    complete(&store, &m1);
    complete(&store, &m2);

    let dash = sector_dashboard(&store, &cfg, "UTRERA").unwrap();
    assert_eq!(dash.total, 4);
    assert_eq!(dash.completed, 2);
    assert_eq!(dash.completed_pct, 50);
    let motors = dash
        .by_type
        .iter()
        .find(|t| t.installation_type == InstallationType::Motores)
        .unwrap();
    assert_eq!((motors.total, motors.completed, motors.pending), (3, 2, 1));
    assert_eq!((motors.completed_pct, motors.pending_pct), (67, 33));

    let key = utrera_march();
    set_plan(&store, &cfg, &actor, &key, &[m1.id.clone(), m3.id.clone()]).unwrap();
    validate_cycle(&store, &actor, &key).unwrap();
    set_plan(
        &store,
        &cfg,
        &actor,
        &CycleKey::new(4, 2024, "UTRERA").unwrap(),
        &[m2.id.clone()],
    )
    .unwrap();

    let months = semester_overview(&store, &cfg, "UTRERA", 2024, 1).unwrap();
    assert_eq!(months.len(), 6);
    assert_eq!(months[0].status, CycleStatus::NoPlan);
    assert_eq!(months[2].status, CycleStatus::Validated);
    assert_eq!(months[2].progress, 50);
    assert_eq!(months[2].planned, 2);
    assert_eq!(months[3].status, CycleStatus::Planned);
    // Validation reset the sector, so April starts at zero.
    assert_eq!(months[3].progress, 0);

    let second = semester_overview(&store, &cfg, "UTRERA", 2024, 2).unwrap();
    assert_eq!(second[0].month, 7);
    assert!(matches!(
        semester_overview(&store, &cfg, "UTRERA", 2024, 3),
        Err(SigmaError::ValidationError(_))
    ));
}

#[test]
fn test_verify_archives_detects_tampering() {
    let (_tmp, store) = setup();
    let cfg = SigmaConfig::default();
    let actor = supervisor();
    let e1 = add(&store, "UTRERA", "ARAHAL", "AG 1", InstallationType::Motores);
    let key = utrera_march();
    set_plan(&store, &cfg, &actor, &key, &[e1.id.clone()]).unwrap();
    validate_cycle(&store, &actor, &key).unwrap();

    let report = verify_archives(&store).unwrap();
    assert_eq!(report.checked, 1);
    assert!(report.is_clean());

    let conn = db_connect(&sigma_db_path(&store.root).to_string_lossy()).unwrap();
    let tampered = format!(r#"[{{"element_id":"{}","status":"COMPLETED"}}]"#, e1.id);
    conn.execute(
        "UPDATE monthly_archives SET snapshots = ?1",
        [tampered.as_str()],
    )
    .unwrap();
    drop(conn);

    let report = verify_archives(&store).unwrap();
    assert!(!report.is_clean());
    assert_eq!(report.mismatches[0].key, key);
}

#[test]
fn test_summary_pairs_status_with_matching_progress() {
    let (_tmp, store) = setup();
    let cfg = SigmaConfig::default();
    let actor = supervisor();

    let e1 = add(&store, "UTRERA", "ARAHAL", "AG 1", InstallationType::Motores);
    let e2 = add(&store, "UTRERA", "ARAHAL", "AG 2", InstallationType::Motores);
    complete(&store, &e1);

    let key = utrera_march();
    assert_eq!(
        cycle_summary(&store, &key).unwrap(),
        CycleSummary { status: CycleStatus::NoPlan, progress: 0 }
    );

    set_plan(&store, &cfg, &actor, &key, &[e1.id.clone(), e2.id.clone()]).unwrap();
    assert_eq!(
        cycle_summary(&store, &key).unwrap(),
        CycleSummary { status: CycleStatus::Planned, progress: 50 }
    );

    validate_cycle(&store, &actor, &key).unwrap();
    // Live checks after validation do not leak into the archived progress.
    complete(&store, &e1);
    complete(&store, &e2);
    assert_eq!(
        cycle_summary(&store, &key).unwrap(),
        CycleSummary { status: CycleStatus::Validated, progress: 50 }
    );
}
