use sigma::core::config::SigmaConfig;
use sigma::core::error::SigmaError;
use sigma::core::identity::{Actor, Role};
use sigma::core::store::Store;
use sigma::plugins::agents::{create_agent, delete_agent, initialize_agents_db, list_agents};
use sigma::plugins::assignments::{
    Target, initialize_assignments_db, load_assignments, reassign_agent,
};
use sigma::plugins::elements::{
    InstallationType, MaintenanceInput, NewElement, Params, create_element, get_element,
    initialize_elements_db, record_maintenance,
};
use tempfile::tempdir;

fn setup() -> (tempfile::TempDir, Store) {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    initialize_elements_db(&store.root).unwrap();
    initialize_agents_db(&store.root).unwrap();
    initialize_assignments_db(&store.root).unwrap();
    (tmp, store)
}

#[test]
fn test_create_and_list_agents() {
    let (_tmp, store) = setup();
    let actor = Actor::new("9001", Role::Supervisor);

    let a = create_agent(&store, &actor, "  ruiz gómez ").unwrap();
    assert!(a.id.starts_with("AG_"));
    assert_eq!(a.name, "RUIZ GÓMEZ");
    create_agent(&store, &actor, "alonso").unwrap();

    let names: Vec<String> = list_agents(&store)
        .unwrap()
        .into_iter()
        .map(|a| a.name)
        .collect();
    assert_eq!(names, vec!["ALONSO", "RUIZ GÓMEZ"]);

    assert!(matches!(
        create_agent(&store, &actor, "  "),
        Err(SigmaError::ValidationError(_))
    ));
}

#[test]
fn test_delete_agent_purges_assignment() {
    let (_tmp, store) = setup();
    let cfg = SigmaConfig::default();
    let actor = Actor::new("9001", Role::Supervisor);

    let a1 = create_agent(&store, &actor, "ruiz").unwrap();
    let a2 = create_agent(&store, &actor, "perez").unwrap();
    reassign_agent(&store, &cfg, &actor, &a1.id, Target::Sector("JEREZ".into())).unwrap();
    reassign_agent(&store, &cfg, &actor, &a2.id, Target::Sector("JEREZ".into())).unwrap();

    let deleted = delete_agent(&store, &actor, &a1.id).unwrap();
    assert_eq!(deleted.name, "RUIZ");

    let mapping = load_assignments(&store).unwrap();
    assert_eq!(mapping.agent_ids("JEREZ"), vec![a2.id.clone()]);
    assert!(mapping.sector_of(&a1.id).is_none());
    assert_eq!(list_agents(&store).unwrap().len(), 1);

    assert!(matches!(
        delete_agent(&store, &actor, &a1.id),
        Err(SigmaError::NotFound(_))
    ));
}

#[test]
fn test_history_survives_agent_deletion() {
    let (_tmp, store) = setup();
    let cfg = SigmaConfig::default();
    let actor = Actor::new("9001", Role::Supervisor);

    let agent = create_agent(&store, &actor, "ruiz").unwrap();
    let el = create_element(
        &store,
        &cfg,
        &actor,
        NewElement {
            name: "AG 1".to_string(),
            installation_type: InstallationType::Motores,
            sector: "JEREZ".to_string(),
            station: "CORTADURA".to_string(),
            params: Params::new(),
        },
    )
    .unwrap();
    record_maintenance(
        &store,
        &actor,
        &el.id,
        MaintenanceInput {
            date: "2024-05-02".to_string(),
            agents: agent.name.clone(),
            values: None,
        },
    )
    .unwrap();

    delete_agent(&store, &actor, &agent.id).unwrap();

    let el = get_element(&store, &el.id).unwrap();
    assert_eq!(el.maintenance_history[0].agents, "RUIZ");
    assert_eq!(el.completed_by.as_deref(), Some("RUIZ"));
}
