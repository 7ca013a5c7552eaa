use anyhow::Result;
use chrono::NaiveDate;
use fieldscope::{
    geometry::{GeoPoint, Polygon},
    plan::{AiPlan, PlanService, WeekPlan},
    store::{JsonFileStore, KeyValueStore, NewTerritory, StoreError, Territory, TerritoryStore},
};

fn open_store(dir: &std::path::Path) -> TerritoryStore {
    TerritoryStore::open(JsonFileStore::new(dir), "territories").unwrap()
}

fn field(name: &str, lat: f64) -> NewTerritory {
    NewTerritory {
        polygon: Polygon::new(vec![
            GeoPoint::new(lat, 10.0),
            GeoPoint::new(lat, 10.02),
            GeoPoint::new(lat + 0.01, 10.02),
            GeoPoint::new(lat + 0.01, 10.0),
        ]),
        name: name.to_string(),
        crop: Some("Maize".into()),
        planting_date: NaiveDate::from_ymd_opt(2024, 4, 15),
        soil_type: Some("clay".into()),
    }
}

/// Fixed plan, one week per 10 ha.
struct AcreagePlanner;

impl PlanService for AcreagePlanner {
    fn generate(&self, territory: &Territory) -> Result<AiPlan> {
        let weeks = (territory.area_hectares / 10.0).ceil() as u32;
        Ok(AiPlan {
            crop: territory.crop.clone().unwrap_or_default(),
            territory: territory.name.clone(),
            planting_date: territory
                .planting_date
                .map(|d| d.to_string())
                .unwrap_or_default(),
            harvest_date: String::new(),
            total_weeks: weeks,
            weekly_plans: (1..=weeks)
                .map(|week| WeekPlan {
                    week,
                    title: format!("Week {week}"),
                    tasks: vec!["scout".into()],
                    irrigation: String::new(),
                    fertilizer: String::new(),
                    monitoring: String::new(),
                })
                .collect(),
        })
    }
}

#[test]
fn territories_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let created = {
        let mut store = open_store(dir.path());
        assert!(store.list().is_empty());
        let a = store.create(field("lower", 45.0)).unwrap();
        let b = store.create(field("upper", 45.5)).unwrap();
        store.delete(a.id).unwrap();
        b
    };
    assert!(dir.path().join("territories.json").exists());

    let mut reopened = open_store(dir.path());
    assert_eq!(reopened.list().len(), 1);
    let stored = &reopened.list()[0];
    assert_eq!(stored.id, created.id);
    assert_eq!(stored.name, "upper");
    assert_eq!(stored.planting_date, NaiveDate::from_ymd_opt(2024, 4, 15));
    assert!((stored.area_hectares - created.area_hectares).abs() < 1e-6);

    // ids keep counting past the highest stored one
    let next = reopened.create(field("middle", 45.2)).unwrap();
    assert!(next.id > created.id);
}

#[test]
fn separate_keys_are_separate_lists() {
    let dir = tempfile::tempdir().unwrap();
    let mut farm_a = TerritoryStore::open(JsonFileStore::new(dir.path()), "farm_a").unwrap();
    farm_a.create(field("only", 10.0)).unwrap();

    let farm_b = TerritoryStore::open(JsonFileStore::new(dir.path()), "farm_b").unwrap();
    assert!(farm_b.list().is_empty());
}

#[test]
fn corrupt_payload_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let backend = JsonFileStore::new(dir.path());
    backend.save("territories", "{ not json").unwrap();

    let result = TerritoryStore::open(backend, "territories");
    assert!(matches!(result, Err(StoreError::Corrupt(_))));
}

#[test]
fn polygon_edit_refreshes_stored_area() {
    let mut store = TerritoryStore::in_memory();
    let territory = store.create(field("strip", 0.0)).unwrap();
    let doubled = store
        .update(territory.id, |t| {
            let mut points = t.polygon.points().to_vec();
            points[2] = GeoPoint::new(0.02, 10.02);
            points[3] = GeoPoint::new(0.02, 10.0);
            t.polygon = Polygon::new(points);
        })
        .unwrap();
    let ratio = doubled.area_hectares / territory.area_hectares;
    assert!((ratio - 2.0).abs() < 1e-3, "ratio {ratio}");
}

#[test]
fn generated_plan_is_attached_and_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = open_store(dir.path());
    let territory = store.create(field("plan me", 30.0)).unwrap();

    let plan = AcreagePlanner.generate(&territory).unwrap();
    assert!(plan.total_weeks > 0);
    store.attach_plan(territory.id, plan.clone()).unwrap();

    let reopened = open_store(dir.path());
    let stored = reopened.get(territory.id).unwrap();
    assert_eq!(stored.ai_plan.as_ref(), Some(&plan));
    let first_week = stored.ai_plan.as_ref().and_then(|p| p.week(1));
    assert_eq!(first_week.map(|w| w.title.as_str()), Some("Week 1"));
}
