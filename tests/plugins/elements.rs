use sigma::core::config::SigmaConfig;
use sigma::core::error::SigmaError;
use sigma::core::identity::{Actor, Role};
use sigma::core::store::Store;
use sigma::plugins::elements::{
    ElementFilter, FaultInput, InstallationType, MaintenanceInput, NewElement, Params,
    create_element, delete_element, get_element, initialize_elements_db, list_elements,
    merge_params, record_fault, record_maintenance, rename_element, set_monthly_check, station_overview,
    type_overview, update_params,
};
use tempfile::tempdir;

fn setup() -> (tempfile::TempDir, Store) {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    initialize_elements_db(&store.root).unwrap();
    (tmp, store)
}

fn supervisor() -> Actor {
    Actor::new("9001", Role::Supervisor)
}

fn new_element(name: &str, t: InstallationType, station: &str) -> NewElement {
    let mut params = Params::new();
    params.insert("modelo".to_string(), serde_json::json!("L700"));
    NewElement {
        name: name.to_string(),
        installation_type: t,
        sector: "UTRERA".to_string(),
        station: station.to_string(),
        params,
    }
}

#[test]
fn test_element_lifecycle() {
    let (_tmp, store) = setup();
    let cfg = SigmaConfig::default();
    let actor = supervisor();

    let el = create_element(
        &store,
        &cfg,
        &actor,
        new_element("  AG 3 ", InstallationType::Motores, "ARAHAL"),
    )
    .unwrap();
    assert!(el.id.starts_with("EL_"));
    assert_eq!(el.name, "AG 3");
    assert!(el.is_pending_monthly);
    assert!(el.maintenance_history.is_empty());

    let mut params = Params::new();
    params.insert("tension".to_string(), serde_json::json!(110));
    let el = update_params(&store, &actor, &el.id, params.clone()).unwrap();
    assert_eq!(el.params, params);

    let el = rename_element(&store, &actor, &el.id, "AG 4").unwrap();
    assert_eq!(el.name, "AG 4");

    let el = set_monthly_check(&store, &actor, &el.id, true).unwrap();
    assert!(!el.is_pending_monthly);
    let el = set_monthly_check(&store, &actor, &el.id, false).unwrap();
    assert!(el.is_pending_monthly);

    delete_element(&store, &actor, &el.id).unwrap();
    assert!(matches!(
        get_element(&store, &el.id),
        Err(SigmaError::NotFound(_))
    ));
    assert!(matches!(
        delete_element(&store, &actor, &el.id),
        Err(SigmaError::NotFound(_))
    ));
}

#[test]
fn test_merge_params_keeps_untouched_keys() {
    let (_tmp, store) = setup();
    let cfg = SigmaConfig::default();
    let actor = supervisor();

    let mut input = new_element("AG 7", InstallationType::Motores, "ARAHAL");
    input.params.insert("tension".to_string(), serde_json::json!(110));
    input.params.insert("fase".to_string(), serde_json::json!("R"));
    let el = create_element(&store, &cfg, &actor, input).unwrap();

    let mut set = Params::new();
    set.insert("tension".to_string(), serde_json::json!(125));
    let el = merge_params(&store, &actor, &el.id, set, &[]).unwrap();
    assert_eq!(el.params["tension"], serde_json::json!(125));
    assert_eq!(el.params["modelo"], serde_json::json!("L700"));
    assert_eq!(el.params["fase"], serde_json::json!("R"));

    let el = merge_params(&store, &actor, &el.id, Params::new(), &["fase".to_string()]).unwrap();
    assert_eq!(el.params.len(), 2);
    assert!(!el.params.contains_key("fase"));
    assert_eq!(get_element(&store, &el.id).unwrap().params, el.params);

    let mut set = Params::new();
    set.insert("modelo".to_string(), serde_json::json!("L826"));
    assert!(matches!(
        merge_params(&store, &actor, &el.id, set, &["modelo".to_string()]),
        Err(SigmaError::ValidationError(_))
    ));
    assert!(matches!(
        merge_params(&store, &actor, "EL_missing", Params::new(), &[]),
        Err(SigmaError::NotFound(_))
    ));
}

#[test]
fn test_create_rejects_unknown_placement() {
    let (_tmp, store) = setup();
    let cfg = SigmaConfig::default();
    let actor = supervisor();

    let mut bad_station = new_element("CV 1", InstallationType::Circuitos, "CARTUJA");
    assert!(matches!(
        create_element(&store, &cfg, &actor, bad_station.clone()),
        Err(SigmaError::ValidationError(_))
    ));

    bad_station.sector = "MÁLAGA".to_string();
    assert!(matches!(
        create_element(&store, &cfg, &actor, bad_station),
        Err(SigmaError::NotFound(_))
    ));

    let blank = new_element("   ", InstallationType::Circuitos, "ARAHAL");
    assert!(matches!(
        create_element(&store, &cfg, &actor, blank),
        Err(SigmaError::ValidationError(_))
    ));
}

#[test]
fn test_history_is_newest_first_and_append_only() {
    let (_tmp, store) = setup();
    let cfg = SigmaConfig::default();
    let actor = supervisor();
    let el = create_element(
        &store,
        &cfg,
        &actor,
        new_element("PN 12", InstallationType::Pn, "LEBRIJA"),
    )
    .unwrap();

    record_maintenance(
        &store,
        &actor,
        &el.id,
        MaintenanceInput {
            date: "2024-01-15".to_string(),
            agents: "RUIZ, PEREZ".to_string(),
            values: None,
        },
    )
    .unwrap();

    let mut values = Params::new();
    values.insert("barreras".to_string(), serde_json::json!("OK"));
    let el = record_maintenance(
        &store,
        &actor,
        &el.id,
        MaintenanceInput {
            date: "2024-02-15".to_string(),
            agents: "GARCIA".to_string(),
            values: Some(values.clone()),
        },
    )
    .unwrap();

    assert_eq!(el.maintenance_history.len(), 2);
    assert_eq!(el.maintenance_history[0].date, "2024-02-15");
    assert_eq!(el.maintenance_history[0].snapshot, values);
    assert_eq!(el.maintenance_history[1].agents, "RUIZ, PEREZ");
    // Without explicit values the snapshot is the params at the time.
    assert_eq!(el.maintenance_history[1].snapshot["modelo"], "L700");
    assert_eq!(el.last_maintenance.as_deref(), Some("2024-02-15"));
    assert_eq!(el.completed_by.as_deref(), Some("GARCIA"));
    // Recording maintenance does not touch the monthly check.
    assert!(el.is_pending_monthly);

    // Later param changes leave old snapshots alone.
    let el = update_params(&store, &actor, &el.id, Params::new()).unwrap();
    assert_eq!(el.maintenance_history[1].snapshot["modelo"], "L700");

    assert!(matches!(
        record_maintenance(
            &store,
            &actor,
            &el.id,
            MaintenanceInput {
                date: "15/03/2024".to_string(),
                agents: "GARCIA".to_string(),
                values: None,
            },
        ),
        Err(SigmaError::ValidationError(_))
    ));
}

#[test]
fn test_record_fault_requires_description() {
    let (_tmp, store) = setup();
    let cfg = SigmaConfig::default();
    let actor = supervisor();
    let el = create_element(
        &store,
        &cfg,
        &actor,
        new_element("S 4", InstallationType::Senales, "OSUNA"),
    )
    .unwrap();

    let fault = |description: &str, date: &str| FaultInput {
        date: date.to_string(),
        agents: "RUIZ".to_string(),
        description: description.to_string(),
        causes: "Humedad".to_string(),
        repair: "Cambio de lámpara".to_string(),
    };

    assert!(matches!(
        record_fault(&store, &actor, &el.id, fault("  ", "2024-03-01")),
        Err(SigmaError::ValidationError(_))
    ));

    record_fault(&store, &actor, &el.id, fault("Foco fundido", "2024-03-01")).unwrap();
    let el = record_fault(&store, &actor, &el.id, fault("Sin tensión", "2024-03-09")).unwrap();
    assert_eq!(el.fault_history.len(), 2);
    assert_eq!(el.fault_history[0].description, "Sin tensión");
    assert!(el.fault_history[0].id.starts_with("FH_"));
    assert_eq!(el.fault_history[1].causes, "Humedad");
}

#[test]
fn test_listing_and_hierarchy_counts() {
    let (_tmp, store) = setup();
    let cfg = SigmaConfig::default();
    let actor = supervisor();
    for (name, t, station) in [
        ("AG 1", InstallationType::Motores, "ARAHAL"),
        ("AG 2", InstallationType::Motores, "ARAHAL"),
        ("CV 7", InstallationType::Circuitos, "ARAHAL"),
        ("BAT 1", InstallationType::Baterias, "OSUNA"),
    ] {
        create_element(&store, &cfg, &actor, new_element(name, t, station)).unwrap();
    }

    let arahal_motors = list_elements(
        &store,
        &ElementFilter {
            station: Some("ARAHAL".to_string()),
            installation_type: Some(InstallationType::Motores),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(arahal_motors.len(), 2);

    let search = list_elements(
        &store,
        &ElementFilter {
            name_query: Some("bat".to_string()),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(search.len(), 1);
    assert_eq!(search[0].station, "OSUNA");

    let stations = station_overview(&store, &cfg, "UTRERA").unwrap();
    assert_eq!(stations.len(), cfg.stations_of("UTRERA").len());
    let arahal = stations.iter().find(|s| s.station == "ARAHAL").unwrap();
    assert_eq!(arahal.elements, 3);

    let types = type_overview(&store, "ARAHAL").unwrap();
    assert_eq!(types.len(), 6);
    let motors = types
        .iter()
        .find(|t| t.installation_type == InstallationType::Motores)
        .unwrap();
    assert_eq!(motors.elements, 2);
    assert_eq!(motors.label, "MOTORES");

    assert!(station_overview(&store, &cfg, "CÁDIZ").unwrap().is_empty());
}
