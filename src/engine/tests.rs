use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio_test::{assert_err, assert_ok};
use ulid::Ulid;

use super::*;
use crate::interval::date_ms;
use crate::limits::MAX_PERSON_CAPACITY;

fn day(y: i32, m: u32, d: u32) -> Ms {
    date_ms(NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("loadline_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn new_engine(name: &str) -> Engine {
    Engine::new(test_wal_path(name), EngineConfig::default()).unwrap()
}

async fn engineer(engine: &Engine, name: &str, skills: &[&str]) -> Person {
    engine
        .create_person(NewPerson {
            id: Ulid::new(),
            name: name.into(),
            role: Role::Engineer,
            skills: skills.iter().map(|s| s.to_string()).collect(),
            seniority: Some(Seniority::Mid),
            department: None,
            max_capacity: None,
        })
        .await
        .unwrap()
}

async fn manager(engine: &Engine) -> Person {
    engine
        .create_person(NewPerson {
            id: Ulid::new(),
            name: "Morgan Manager".into(),
            role: Role::Manager,
            skills: vec![],
            seniority: None,
            department: None,
            max_capacity: None,
        })
        .await
        .unwrap()
}

async fn project(engine: &Engine, manager_id: Ulid, required: &[&str]) -> Project {
    engine
        .create_project(NewProject {
            id: Ulid::new(),
            name: "Customer Portal".into(),
            description: "Self-service portal".into(),
            required_skills: required.iter().map(|s| s.to_string()).collect(),
            team_size: 4,
            status: Some(ProjectStatus::Active),
            manager_id,
            span: Span::new(day(2024, 1, 1), day(2024, 12, 31)),
        })
        .await
        .unwrap()
}

async fn engage(
    engine: &Engine,
    person_id: Ulid,
    project_id: Ulid,
    allocation: i64,
    span: Span,
) -> Result<Engagement, EngineError> {
    engine
        .create_engagement(NewEngagement {
            id: Ulid::new(),
            person_id,
            project_id,
            allocation,
            span,
            role: None,
        })
        .await
}

fn summer() -> Span {
    Span::new(day(2024, 6, 1), day(2024, 9, 30))
}

// ── Admission ────────────────────────────────────────────

#[tokio::test]
async fn admission_accepts_then_rejects_with_headroom() {
    let engine = new_engine("admission_scenario.wal");
    let mgr = manager(&engine).await;
    let proj = project(&engine, mgr.id, &["JavaScript"]).await;
    let p = engineer(&engine, "Engineer One", &["JavaScript", "Node.js"]).await;

    assert_ok!(engage(&engine, p.id, proj.id, 50, summer()).await);

    let july = Span::new(day(2024, 7, 1), day(2024, 8, 1));
    let accepted = assert_ok!(engage(&engine, p.id, proj.id, 40, july).await);
    assert_eq!(accepted.version, 1);
    assert_eq!(accepted.role, "Developer");

    let err = assert_err!(engage(&engine, p.id, proj.id, 20, july).await);
    assert_eq!(
        err,
        EngineError::CapacityExceeded {
            person_id: p.id,
            requested: 20,
            available: 10,
        }
    );
    assert_eq!(engine.committed_capacity(p.id, july, None).await.unwrap(), 90);
}

#[tokio::test]
async fn advisory_admit_matches_commit() {
    let engine = new_engine("advisory_admit.wal");
    let mgr = manager(&engine).await;
    let proj = project(&engine, mgr.id, &[]).await;
    let p = engineer(&engine, "A", &["Go"]).await;
    engage(&engine, p.id, proj.id, 70, summer()).await.unwrap();

    assert!(engine.admit(p.id, summer(), 30, None).await.unwrap().is_accept());
    assert_eq!(
        engine.admit(p.id, summer(), 31, None).await.unwrap(),
        Admission::Reject {
            committed: 70,
            requested: 31,
            available: 30,
        }
    );
    assert!(matches!(
        engine.admit(p.id, summer(), 0, None).await,
        Err(EngineError::Validation(_))
    ));
    let ghost = Ulid::new();
    assert_eq!(
        engine.admit(ghost, summer(), 10, None).await,
        Err(EngineError::NotFound(ghost))
    );
}

#[tokio::test]
async fn managers_cannot_be_engaged() {
    let engine = new_engine("manager_engaged.wal");
    let mgr = manager(&engine).await;
    let proj = project(&engine, mgr.id, &[]).await;
    assert_eq!(mgr.max_capacity, 0);
    assert_eq!(
        engage(&engine, mgr.id, proj.id, 1, summer()).await,
        Err(EngineError::NotFound(mgr.id))
    );

    // Explicit capacity does not make a manager engageable.
    let roomy = engine
        .create_person(NewPerson {
            id: Ulid::new(),
            name: "Roomy Manager".into(),
            role: Role::Manager,
            skills: vec!["React".into()],
            seniority: None,
            department: None,
            max_capacity: Some(100),
        })
        .await
        .unwrap();
    assert_eq!(roomy.max_capacity, 100);
    assert_eq!(
        engage(&engine, roomy.id, proj.id, 50, summer()).await,
        Err(EngineError::NotFound(roomy.id))
    );
    assert_eq!(
        engine.person_capacity(roomy.id, day(2024, 7, 1)).await,
        Err(EngineError::NotFound(roomy.id))
    );
    assert!(engine.find_engagements_by_person(roomy.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_engagements_are_not_persisted() {
    let engine = new_engine("invalid_engagement.wal");
    let mgr = manager(&engine).await;
    let proj = project(&engine, mgr.id, &[]).await;
    let p = engineer(&engine, "A", &[]).await;

    let zero_length = Span {
        start: day(2024, 6, 1),
        end: day(2024, 6, 1),
    };
    let inverted = Span {
        start: day(2024, 6, 2),
        end: day(2024, 6, 1),
    };
    for (allocation, span) in [(10, zero_length), (10, inverted), (0, summer()), (101, summer())] {
        assert!(matches!(
            engage(&engine, p.id, proj.id, allocation, span).await,
            Err(EngineError::Validation(_))
        ));
    }
    assert_eq!(
        engage(&engine, Ulid::nil(), proj.id, 10, summer()).await,
        Err(EngineError::NotFound(Ulid::nil()))
    );
    assert_eq!(
        engage(&engine, p.id, Ulid::nil(), 10, summer()).await,
        Err(EngineError::NotFound(Ulid::nil()))
    );
    assert!(engine.find_engagements_by_person(p.id).await.unwrap().is_empty());
    assert_eq!(engine.wal_appends_since_compact().await, 3);
}

#[tokio::test]
async fn duplicate_engagement_id_rejected() {
    let engine = new_engine("duplicate_engagement.wal");
    let mgr = manager(&engine).await;
    let proj = project(&engine, mgr.id, &[]).await;
    let p = engineer(&engine, "A", &[]).await;
    let e = engage(&engine, p.id, proj.id, 10, summer()).await.unwrap();

    let again = engine
        .create_engagement(NewEngagement {
            id: e.id,
            person_id: p.id,
            project_id: proj.id,
            allocation: 10,
            span: summer(),
            role: None,
        })
        .await;
    assert_eq!(again, Err(EngineError::AlreadyExists(e.id)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn engagement_id_is_unique_across_people() {
    let engine = Arc::new(new_engine("duplicate_engagement_race.wal"));
    let mgr = manager(&engine).await;
    let proj = project(&engine, mgr.id, &[]).await;

    for _ in 0..20 {
        let a = engineer(&engine, "A", &[]).await;
        let b = engineer(&engine, "B", &[]).await;
        let id = Ulid::new();

        let mut handles = Vec::new();
        for person_id in [a.id, b.id] {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine
                    .create_engagement(NewEngagement {
                        id,
                        person_id,
                        project_id: proj.id,
                        allocation: 10,
                        span: summer(),
                        role: None,
                    })
                    .await
            }));
        }

        let mut created = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => created += 1,
                Err(EngineError::AlreadyExists(dup)) => assert_eq!(dup, id),
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(created, 1);
        let owned = engine.find_engagements_by_person(a.id).await.unwrap().len()
            + engine.find_engagements_by_person(b.id).await.unwrap().len();
        assert_eq!(owned, 1);
    }
}

// ── Updates ──────────────────────────────────────────────

#[tokio::test]
async fn update_excludes_itself() {
    let engine = new_engine("update_self.wal");
    let mgr = manager(&engine).await;
    let proj = project(&engine, mgr.id, &[]).await;
    let p = engineer(&engine, "A", &[]).await;
    let e = engage(&engine, p.id, proj.id, 80, summer()).await.unwrap();

    let updated = engine
        .update_engagement(
            e.id,
            EngagementPatch {
                allocation: Some(100),
                ..EngagementPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.allocation, 100);
    assert_eq!(updated.version, 2);
    assert_eq!(engine.committed_capacity(p.id, summer(), None).await.unwrap(), 100);
}

#[tokio::test]
async fn update_rechecks_against_others() {
    let engine = new_engine("update_recheck.wal");
    let mgr = manager(&engine).await;
    let proj = project(&engine, mgr.id, &[]).await;
    let p = engineer(&engine, "A", &[]).await;
    engage(&engine, p.id, proj.id, 50, summer()).await.unwrap();
    let e = engage(&engine, p.id, proj.id, 40, summer()).await.unwrap();

    let err = engine
        .update_engagement(
            e.id,
            EngagementPatch {
                allocation: Some(60),
                ..EngagementPatch::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::CapacityExceeded {
            person_id: p.id,
            requested: 60,
            available: 50,
        }
    );
    // Unchanged on rejection.
    let stored = engine.get_engagement(&Identity::operator(), e.id).await.unwrap();
    assert_eq!(stored.allocation, 40);
    assert_eq!(stored.version, 1);

    // Moving it out of the way frees the headroom.
    let moved = engine
        .update_engagement(
            e.id,
            EngagementPatch {
                allocation: Some(60),
                start: Some(day(2024, 10, 1)),
                end: Some(day(2024, 10, 31)),
                ..EngagementPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(moved.span, Span::new(day(2024, 10, 1), day(2024, 10, 31)));
}

#[tokio::test]
async fn update_with_inverted_dates_rejected() {
    let engine = new_engine("update_inverted.wal");
    let mgr = manager(&engine).await;
    let proj = project(&engine, mgr.id, &[]).await;
    let p = engineer(&engine, "A", &[]).await;
    let e = engage(&engine, p.id, proj.id, 40, summer()).await.unwrap();

    let result = engine
        .update_engagement(
            e.id,
            EngagementPatch {
                end: Some(day(2024, 5, 1)),
                ..EngagementPatch::default()
            },
        )
        .await;
    assert!(matches!(result, Err(EngineError::Validation(_))));
}

#[tokio::test]
async fn stale_version_conflicts() {
    let engine = new_engine("version_conflict.wal");
    let mgr = manager(&engine).await;
    let proj = project(&engine, mgr.id, &[]).await;
    let p = engineer(&engine, "A", &[]).await;
    let e = engage(&engine, p.id, proj.id, 40, summer()).await.unwrap();

    let patch = EngagementPatch {
        role: Some("Tech Lead".into()),
        expected_version: Some(1),
        ..EngagementPatch::default()
    };
    let updated = engine.update_engagement(e.id, patch.clone()).await.unwrap();
    assert_eq!(updated.role, "Tech Lead");
    assert_eq!(updated.version, 2);

    assert_eq!(
        engine.update_engagement(e.id, patch).await,
        Err(EngineError::Conflict {
            id: e.id,
            expected: 1,
            actual: 2,
        })
    );
}

#[tokio::test]
async fn role_only_update_skips_capacity_check() {
    let engine = new_engine("role_only.wal");
    let mgr = manager(&engine).await;
    let proj = project(&engine, mgr.id, &[]).await;
    let p = engineer(&engine, "A", &[]).await;
    let e = engage(&engine, p.id, proj.id, 80, summer()).await.unwrap();

    engine
        .update_person(
            p.id,
            PersonPatch {
                max_capacity: Some(50),
                ..PersonPatch::default()
            },
        )
        .await
        .unwrap();

    assert_ok!(
        engine
            .update_engagement(
                e.id,
                EngagementPatch {
                    role: Some("Reviewer".into()),
                    ..EngagementPatch::default()
                },
            )
            .await
    );
    assert_err!(
        engine
            .update_engagement(
                e.id,
                EngagementPatch {
                    allocation: Some(80),
                    ..EngagementPatch::default()
                },
            )
            .await
    );
}

#[tokio::test]
async fn delete_engagement_frees_capacity() {
    let engine = new_engine("delete_engagement.wal");
    let mgr = manager(&engine).await;
    let proj = project(&engine, mgr.id, &[]).await;
    let p = engineer(&engine, "A", &[]).await;
    let e = engage(&engine, p.id, proj.id, 100, summer()).await.unwrap();

    assert_err!(engage(&engine, p.id, proj.id, 10, summer()).await);
    assert_eq!(engine.delete_engagement(e.id).await.unwrap().id, e.id);
    assert_ok!(engage(&engine, p.id, proj.id, 10, summer()).await);
    assert_eq!(
        engine.delete_engagement(e.id).await,
        Err(EngineError::NotFound(e.id))
    );
}

// ── Concurrency ──────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_admissions_never_exceed_capacity() {
    let engine = Arc::new(new_engine("concurrent_admission.wal"));
    let mgr = manager(&engine).await;
    let proj = project(&engine, mgr.id, &[]).await;
    let p = engineer(&engine, "A", &[]).await;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engage(&engine, p.id, proj.id, 20, summer()).await
        }));
    }

    let mut accepted = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(EngineError::CapacityExceeded { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(accepted, 5);
    assert_eq!(engine.committed_capacity(p.id, summer(), None).await.unwrap(), 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_never_exceed_capacity() {
    let engine = Arc::new(new_engine("concurrent_update.wal"));
    let mgr = manager(&engine).await;
    let proj = project(&engine, mgr.id, &[]).await;
    let p = engineer(&engine, "A", &[]).await;

    let mut ids = Vec::new();
    for _ in 0..4 {
        ids.push(engage(&engine, p.id, proj.id, 10, summer()).await.unwrap().id);
    }

    // Each wants to grow to 40; only two can fit next to the others.
    let mut handles = Vec::new();
    for id in ids {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .update_engagement(
                    id,
                    EngagementPatch {
                        allocation: Some(40),
                        ..EngagementPatch::default()
                    },
                )
                .await
        }));
    }
    let mut grown = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(e) => {
                assert_eq!(e.allocation, 40);
                grown += 1;
            }
            Err(EngineError::CapacityExceeded { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    // 40 + 40 + 10 + 10 = 100; a third grower would need 130.
    assert_eq!(grown, 2);
    assert_eq!(engine.committed_capacity(p.id, summer(), None).await.unwrap(), 100);
}

// ── People and projects ──────────────────────────────────

#[tokio::test]
async fn person_defaults_and_duplicates() {
    let engine = new_engine("person_defaults.wal");
    let p = engineer(&engine, "  Ada  ", &["Rust", " Rust ", "Go"]).await;
    assert_eq!(p.name, "Ada");
    assert_eq!(p.skills, vec!["Rust".to_string(), "Go".to_string()]);
    assert_eq!(p.department, "Engineering");
    assert_eq!(p.max_capacity, 100);

    let again = engine
        .create_person(NewPerson {
            id: p.id,
            name: "Other".into(),
            role: Role::Engineer,
            skills: vec![],
            seniority: None,
            department: None,
            max_capacity: None,
        })
        .await;
    assert_eq!(again, Err(EngineError::AlreadyExists(p.id)));

    let too_big = engine
        .create_person(NewPerson {
            id: Ulid::new(),
            name: "Big".into(),
            role: Role::Engineer,
            skills: vec![],
            seniority: None,
            department: None,
            max_capacity: Some(MAX_PERSON_CAPACITY + 1),
        })
        .await;
    assert!(matches!(too_big, Err(EngineError::LimitExceeded(_))));
}

#[tokio::test]
async fn list_people_filters() {
    let engine = new_engine("list_people.wal");
    manager(&engine).await;
    engineer(&engine, "Bea", &["React"]).await;
    engineer(&engine, "Abe", &["Rust"]).await;

    let engineers = engine
        .list_people(&PeopleFilter {
            role: Some(Role::Engineer),
            ..PeopleFilter::default()
        })
        .await;
    let names: Vec<_> = engineers.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Abe", "Bea"]);

    let react = engine
        .list_people(&PeopleFilter {
            skills: vec!["React".into()],
            ..PeopleFilter::default()
        })
        .await;
    assert_eq!(react.len(), 1);
    assert_eq!(engine.list_people(&PeopleFilter::default()).await.len(), 3);
}

#[tokio::test]
async fn project_requires_manager_and_valid_dates() {
    let engine = new_engine("project_validation.wal");
    let eng = engineer(&engine, "A", &[]).await;
    let mgr = manager(&engine).await;

    let base = NewProject {
        id: Ulid::new(),
        name: "Billing".into(),
        description: String::new(),
        required_skills: vec![],
        team_size: 2,
        status: None,
        manager_id: eng.id,
        span: Span::new(day(2024, 1, 1), day(2024, 3, 1)),
    };
    assert!(matches!(
        engine.create_project(base.clone()).await,
        Err(EngineError::Validation(_))
    ));

    let inverted = NewProject {
        manager_id: mgr.id,
        span: Span {
            start: day(2024, 3, 1),
            end: day(2024, 1, 1),
        },
        ..base.clone()
    };
    assert!(matches!(
        engine.create_project(inverted).await,
        Err(EngineError::Validation(_))
    ));

    let ok = engine
        .create_project(NewProject {
            manager_id: mgr.id,
            ..base
        })
        .await
        .unwrap();
    assert_eq!(ok.status, ProjectStatus::Planning);

    let updated = engine
        .update_project(
            ok.id,
            ProjectPatch {
                status: Some(ProjectStatus::Active),
                end: Some(day(2024, 6, 1)),
                ..ProjectPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.status, ProjectStatus::Active);
    assert_eq!(engine.get_project(ok.id).await.unwrap(), updated);

    assert!(matches!(
        engine
            .update_project(
                ok.id,
                ProjectPatch {
                    start: Some(day(2025, 1, 1)),
                    ..ProjectPatch::default()
                },
            )
            .await,
        Err(EngineError::Validation(_))
    ));
}

#[tokio::test]
async fn project_in_use_cannot_be_deleted() {
    let engine = new_engine("project_in_use.wal");
    let mgr = manager(&engine).await;
    let proj = project(&engine, mgr.id, &[]).await;
    let p = engineer(&engine, "A", &[]).await;
    let e = engage(&engine, p.id, proj.id, 30, summer()).await.unwrap();

    assert_eq!(
        engine.delete_project(proj.id).await,
        Err(EngineError::ProjectInUse(proj.id))
    );
    engine.delete_engagement(e.id).await.unwrap();
    assert_ok!(engine.delete_project(proj.id).await);
    assert_eq!(
        engine.get_project(proj.id).await,
        Err(EngineError::NotFound(proj.id))
    );
}

// ── Finders and scoping ──────────────────────────────────

#[tokio::test]
async fn finders() {
    let engine = new_engine("finders.wal");
    let mgr = manager(&engine).await;
    let portal = project(&engine, mgr.id, &[]).await;
    let billing = project(&engine, mgr.id, &[]).await;
    let p = engineer(&engine, "A", &[]).await;

    let june = Span::new(day(2024, 6, 1), day(2024, 6, 30));
    let august = Span::new(day(2024, 8, 1), day(2024, 8, 31));
    let a = engage(&engine, p.id, portal.id, 30, june).await.unwrap();
    let b = engage(&engine, p.id, billing.id, 30, august).await.unwrap();

    let by_person = engine.find_engagements_by_person(p.id).await.unwrap();
    assert_eq!(by_person.iter().map(|e| e.id).collect::<Vec<_>>(), vec![a.id, b.id]);

    let by_project = engine.find_engagements_by_project(billing.id).await;
    assert_eq!(by_project, vec![b.clone()]);
    assert!(engine.find_engagements_by_project(Ulid::new()).await.is_empty());

    // Touching endpoint counts as overlap.
    let touching = Span::new(day(2024, 6, 30), day(2024, 7, 15));
    let hits = engine
        .find_engagements_overlapping(p.id, touching, None)
        .await
        .unwrap();
    assert_eq!(hits, vec![a.clone()]);
    let excluded = engine
        .find_engagements_overlapping(p.id, touching, Some(a.id))
        .await
        .unwrap();
    assert!(excluded.is_empty());
}

#[tokio::test]
async fn engineers_only_see_their_own_engagements() {
    let engine = new_engine("scoping.wal");
    let mgr = manager(&engine).await;
    let portal = project(&engine, mgr.id, &[]).await;
    let billing = project(&engine, mgr.id, &[]).await;
    let alice = engineer(&engine, "Alice", &[]).await;
    let bob = engineer(&engine, "Bob", &[]).await;
    let ea = engage(&engine, alice.id, portal.id, 30, summer()).await.unwrap();
    let eb = engage(&engine, bob.id, billing.id, 30, summer()).await.unwrap();

    let as_alice = Identity::new(alice.id, Role::Engineer);
    assert_eq!(engine.list_engagements(&as_alice).await, vec![ea.clone()]);
    assert_eq!(engine.list_engagements(&Identity::operator()).await.len(), 2);
    assert_eq!(
        engine.get_engagement(&as_alice, eb.id).await,
        Err(EngineError::NotFound(eb.id))
    );
    assert_ok!(engine.get_engagement(&Identity::new(mgr.id, Role::Manager), eb.id).await);

    let projects = engine.list_projects(&as_alice, &ProjectFilter::default()).await;
    assert_eq!(projects.iter().map(|p| p.id).collect::<Vec<_>>(), vec![portal.id]);
    assert_eq!(
        engine
            .list_projects(&Identity::operator(), &ProjectFilter::default())
            .await
            .len(),
        2
    );

    let timeline = engine.timeline(&as_alice, None).await.unwrap();
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline[0].person_name, "Alice");
}

#[tokio::test]
async fn list_engagements_newest_first() {
    let engine = new_engine("list_engagements.wal");
    let mgr = manager(&engine).await;
    let proj = project(&engine, mgr.id, &[]).await;
    let p = engineer(&engine, "A", &[]).await;
    let early = engage(&engine, p.id, proj.id, 10, Span::new(day(2024, 2, 1), day(2024, 2, 28)))
        .await
        .unwrap();
    let late = engage(&engine, p.id, proj.id, 10, Span::new(day(2024, 5, 1), day(2024, 5, 31)))
        .await
        .unwrap();

    let ids: Vec<_> = engine
        .list_engagements(&Identity::operator())
        .await
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(ids, vec![late.id, early.id]);
}

#[tokio::test]
async fn timeline_window_and_bands() {
    let engine = new_engine("timeline.wal");
    let mgr = manager(&engine).await;
    let proj = project(&engine, mgr.id, &[]).await;
    let p = engineer(&engine, "Ada", &[]).await;
    engage(&engine, p.id, proj.id, 25, Span::new(day(2024, 2, 1), day(2024, 2, 28)))
        .await
        .unwrap();
    engage(&engine, p.id, proj.id, 60, Span::new(day(2024, 5, 1), day(2024, 5, 31)))
        .await
        .unwrap();

    let all = engine.timeline(&Identity::operator(), None).await.unwrap();
    let bands: Vec<_> = all.iter().map(|t| t.band).collect();
    assert_eq!(bands, vec![AllocationBand::Light, AllocationBand::Heavy]);
    assert_eq!(all[0].project_name, "Customer Portal");

    let may = Span::new(day(2024, 5, 10), day(2024, 5, 20));
    let windowed = engine.timeline(&Identity::operator(), Some(may)).await.unwrap();
    assert_eq!(windowed.len(), 1);
    assert_eq!(windowed[0].engagement.allocation, 60);

    let inverted = Span {
        start: day(2024, 5, 20),
        end: day(2024, 5, 10),
    };
    assert!(matches!(
        engine.timeline(&Identity::operator(), Some(inverted)).await,
        Err(EngineError::Validation(_))
    ));
}

// ── Matching ─────────────────────────────────────────────

#[tokio::test]
async fn find_suitable_returns_seeded_engineer() {
    let engine = new_engine("find_suitable_scenario.wal");
    let mgr = manager(&engine).await;
    let proj = project(&engine, mgr.id, &["JavaScript"]).await;
    let p = engineer(&engine, "Engineer One", &["JavaScript", "Node.js"]).await;
    engage(&engine, p.id, proj.id, 50, summer()).await.unwrap();

    let window = Span::new(day(2024, 6, 10), day(2024, 9, 30));
    let found = engine
        .find_suitable(&["JavaScript".to_string()], window, 30)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].person.id, p.id);
    assert_eq!(found[0].available, 50);
    assert_eq!(found[0].matched_skills, vec!["JavaScript".to_string()]);

    // Asking for more than the headroom drops them.
    assert!(
        engine
            .find_suitable(&["JavaScript".to_string()], window, 51)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn find_suitable_ranks_and_filters() {
    let engine = new_engine("find_suitable_rank.wal");
    let mgr = manager(&engine).await;
    let proj = project(&engine, mgr.id, &[]).await;
    let both = engineer(&engine, "Both", &["React", "Node.js"]).await;
    let busy = engineer(&engine, "Busy", &["React"]).await;
    let free = engineer(&engine, "Free", &["React"]).await;
    engineer(&engine, "Other", &["Rust"]).await;
    engage(&engine, busy.id, proj.id, 60, summer()).await.unwrap();
    engage(&engine, both.id, proj.id, 70, summer()).await.unwrap();

    let skills = vec!["React".to_string(), "Node.js".to_string()];
    let found = engine.find_suitable(&skills, summer(), 20).await.unwrap();
    let order: Vec<_> = found.iter().map(|c| c.person.id).collect();
    assert_eq!(order, vec![both.id, free.id, busy.id]);

    assert!(engine.find_suitable(&[], summer(), 0).await.unwrap().is_empty());
    assert!(
        engine
            .find_suitable(&["  ".to_string()], summer(), 0)
            .await
            .unwrap()
            .is_empty()
    );
}

// ── Reporting ────────────────────────────────────────────

#[tokio::test]
async fn utilization_report_at_instant() {
    let engine = new_engine("utilization_scenario.wal");
    let mgr = manager(&engine).await;
    let proj = project(&engine, mgr.id, &["JavaScript"]).await;
    let p = engineer(&engine, "Engineer One", &["JavaScript", "Node.js"]).await;
    engage(&engine, p.id, proj.id, 50, summer()).await.unwrap();

    let report = engine.utilization_report(day(2024, 7, 15)).await;
    assert_eq!(report.engineers.len(), 1);
    let row = &report.engineers[0];
    assert_eq!(row.utilization_percentage, 50.0);
    // Thresholds are exclusive: exactly 50% is still low.
    assert_eq!(row.status, UtilizationStatus::Low);
    assert_eq!(row.available, 50);
    assert_eq!(report.team.engineer_count, 1);
    assert_eq!(report.team.low, 1);
    assert_eq!(report.team.medium, 0);
    assert_eq!(report.team.mean_utilization, 50.0);

    let extra = Span::new(day(2024, 7, 1), day(2024, 7, 31));
    engage(&engine, p.id, proj.id, 1, extra).await.unwrap();
    let report = engine.utilization_report(day(2024, 7, 15)).await;
    assert_eq!(report.engineers[0].utilization_percentage, 51.0);
    assert_eq!(report.engineers[0].status, UtilizationStatus::Medium);
    assert_eq!(report.team.medium, 1);

    let before = engine.utilization_report(day(2024, 5, 31)).await;
    assert_eq!(before.engineers[0].status, UtilizationStatus::Low);
    assert_eq!(before.engineers[0].committed, 0);
}

#[tokio::test]
async fn lowered_capacity_reports_overallocated() {
    let engine = new_engine("overallocated.wal");
    let mgr = manager(&engine).await;
    let proj = project(&engine, mgr.id, &[]).await;
    let p = engineer(&engine, "A", &[]).await;
    engage(&engine, p.id, proj.id, 90, summer()).await.unwrap();
    engine
        .update_person(
            p.id,
            PersonPatch {
                max_capacity: Some(60),
                ..PersonPatch::default()
            },
        )
        .await
        .unwrap();

    let row = engine.person_capacity(p.id, day(2024, 7, 1)).await.unwrap();
    assert_eq!(row.status, UtilizationStatus::Overallocated);
    assert_eq!(row.available, -30);
}

#[tokio::test]
async fn utilization_uses_configured_thresholds() {
    let config = EngineConfig {
        thresholds: crate::config::UtilizationThresholds {
            overallocated: 100.0,
            high: 40.0,
            medium: 20.0,
        },
        default_role_label: "Engineer".into(),
    };
    let engine = Engine::new(test_wal_path("custom_thresholds.wal"), config).unwrap();
    let mgr = manager(&engine).await;
    let proj = project(&engine, mgr.id, &[]).await;
    let p = engineer(&engine, "A", &[]).await;
    let e = engage(&engine, p.id, proj.id, 50, summer()).await.unwrap();
    assert_eq!(e.role, "Engineer");

    let report = engine.utilization_report(day(2024, 7, 15)).await;
    assert_eq!(report.engineers[0].status, UtilizationStatus::High);
}

#[tokio::test]
async fn project_report_aggregates() {
    let engine = new_engine("project_report.wal");
    let mgr = manager(&engine).await;
    let proj = project(&engine, mgr.id, &["React", "Node.js"]).await;
    let a = engineer(&engine, "A", &["React", "Docker"]).await;
    let b = engineer(&engine, "B", &["React"]).await;
    engage(&engine, a.id, proj.id, 50, summer()).await.unwrap();
    engage(&engine, a.id, proj.id, 20, Span::new(day(2024, 10, 1), day(2024, 10, 31)))
        .await
        .unwrap();
    engage(&engine, b.id, proj.id, 30, summer()).await.unwrap();

    let report = engine.project_report(proj.id, day(2024, 7, 1)).await.unwrap();
    assert_eq!(report.assigned_engagements, 3);
    assert_eq!(report.assigned_people, 2);
    assert_eq!(report.total_allocation, 100);
    assert_eq!(report.average_allocation, 33.33);
    // React and Docker over two required skills.
    assert_eq!(report.skill_coverage, 100.0);
    assert_eq!(report.team_size_fulfillment, 50.0);
    assert_eq!(
        report.skill_distribution,
        vec![("Docker".to_string(), 1), ("React".to_string(), 2)]
    );
    assert_eq!(report.seniority_distribution, vec![(Seniority::Mid, 2)]);
    assert!(report.timeline_progress > 49.0 && report.timeline_progress < 51.0);

    assert_eq!(engine.project_reports(day(2024, 7, 1)).await.len(), 1);
    assert_eq!(
        engine.project_report(Ulid::nil(), 0).await,
        Err(EngineError::NotFound(Ulid::nil()))
    );
}

#[tokio::test]
async fn load_profile_through_engine() {
    let engine = new_engine("load_profile.wal");
    let mgr = manager(&engine).await;
    let proj = project(&engine, mgr.id, &[]).await;
    let p = engineer(&engine, "A", &[]).await;
    engage(&engine, p.id, proj.id, 50, summer()).await.unwrap();

    let window = Span::new(day(2024, 5, 1), day(2024, 10, 31));
    let profile = engine.load_profile(p.id, window).await.unwrap();
    let loads: Vec<_> = profile.iter().map(|s| s.committed).collect();
    assert_eq!(loads, vec![0, 50, 0]);
    assert_eq!(profile.first().unwrap().span.start, window.start);
    assert_eq!(profile.last().unwrap().span.end, window.end);
}

// ── Durability ───────────────────────────────────────────

#[tokio::test]
async fn replay_restores_ledger() {
    let path = test_wal_path("replay.wal");
    let (p, proj, e) = {
        let engine = Engine::new(path.clone(), EngineConfig::default()).unwrap();
        let mgr = manager(&engine).await;
        let proj = project(&engine, mgr.id, &["React"]).await;
        let p = engineer(&engine, "A", &["React"]).await;
        let e = engage(&engine, p.id, proj.id, 40, summer()).await.unwrap();
        let e = engine
            .update_engagement(
                e.id,
                EngagementPatch {
                    allocation: Some(45),
                    ..EngagementPatch::default()
                },
            )
            .await
            .unwrap();
        let gone = engage(&engine, p.id, proj.id, 5, summer()).await.unwrap();
        engine.delete_engagement(gone.id).await.unwrap();
        (p, proj, e)
    };

    let engine = Engine::new(path, EngineConfig::default()).unwrap();
    assert_eq!(engine.get_person(p.id).await.unwrap(), p);
    assert_eq!(engine.get_project(proj.id).await.unwrap(), proj);
    let restored = engine.find_engagements_by_person(p.id).await.unwrap();
    assert_eq!(restored, vec![e.clone()]);
    assert_eq!(restored[0].version, 2);
    assert_eq!(
        engine.delete_project(proj.id).await,
        Err(EngineError::ProjectInUse(proj.id))
    );
    assert_eq!(engine.committed_capacity(p.id, summer(), None).await.unwrap(), 45);
}

#[tokio::test]
async fn compaction_preserves_state() {
    let path = test_wal_path("compaction.wal");
    {
        let engine = Engine::new(path.clone(), EngineConfig::default()).unwrap();
        let mgr = manager(&engine).await;
        let proj = project(&engine, mgr.id, &[]).await;
        let p = engineer(&engine, "A", &[]).await;
        for _ in 0..5 {
            let e = engage(&engine, p.id, proj.id, 10, summer()).await.unwrap();
            engine.delete_engagement(e.id).await.unwrap();
        }
        engage(&engine, p.id, proj.id, 30, summer()).await.unwrap();
        assert!(engine.wal_appends_since_compact().await > 10);

        engine.compact_wal().await.unwrap();
        assert_eq!(engine.wal_appends_since_compact().await, 0);
    }

    let events = crate::wal::Wal::replay(&path).unwrap();
    // Two people, one project, one engagement.
    assert_eq!(events.len(), 4);

    let engine = Engine::new(path, EngineConfig::default()).unwrap();
    let report = engine.utilization_report(day(2024, 7, 1)).await;
    assert_eq!(report.engineers[0].committed, 30);
}

#[tokio::test]
async fn group_commit_batches_appends() {
    let path = test_wal_path("group_commit.wal");
    let engine = Arc::new(Engine::new(path.clone(), EngineConfig::default()).unwrap());

    let n = 20;
    let mut handles = Vec::new();
    for i in 0..n {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engineer(&engine, &format!("E{i}"), &["Rust"]).await
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
    assert_eq!(engine.wal_appends_since_compact().await, n);

    let engine2 = Engine::new(path, EngineConfig::default()).unwrap();
    assert_eq!(engine2.list_people(&PeopleFilter::default()).await.len(), n as usize);
}
