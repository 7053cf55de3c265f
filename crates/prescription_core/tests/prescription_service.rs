use chrono::{DateTime, SubsecRound, Utc};
use prescription_core::db::{open_db, open_db_in_memory};
use prescription_core::{
    CreatePrescriptionRequest, NewPrescription, PageRequest, Prescription, PrescriptionFilter,
    PrescriptionId, PrescriptionListQuery, PrescriptionRepository, PrescriptionService,
    PrescriptionServiceError, RepoError, RepoResult, SqlitePrescriptionRepository,
    ViolationReason,
};
use std::collections::HashSet;
use std::thread;

fn request(appointment_id: i64, patient_id: i64) -> CreatePrescriptionRequest {
    CreatePrescriptionRequest {
        appointment_id,
        patient_id,
        doctor_id: 7,
        medication: "Amoxicillin".to_string(),
        dosage: "500mg".to_string(),
        days: 7,
    }
}

fn page(page: i64, page_size: i64) -> PageRequest {
    PageRequest {
        page: Some(page),
        page_size: Some(page_size),
    }
}

fn ids(records: &[Prescription]) -> Vec<i64> {
    records.iter().map(|record| record.prescription_id).collect()
}

fn now_ms() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

#[test]
fn amoxicillin_scenario_end_to_end() {
    let conn = open_db_in_memory().unwrap();
    let service = PrescriptionService::new(SqlitePrescriptionRepository::try_new(&conn).unwrap());

    let before = now_ms();
    let created = service.create(request(10, 3)).unwrap();
    let after = now_ms();

    assert_eq!(created.prescription_id, 1);
    assert_eq!(created.appointment_id, 10);
    assert_eq!(created.patient_id, 3);
    assert_eq!(created.doctor_id, 7);
    assert_eq!(created.medication, "Amoxicillin");
    assert_eq!(created.dosage, "500mg");
    assert_eq!(created.days, 7);
    assert!(created.issued_at >= before && created.issued_at <= after);

    assert_eq!(service.get(1).unwrap(), created);

    let for_patient = service
        .list(PrescriptionFilter::for_patient(3), PageRequest::default())
        .unwrap();
    assert!(for_patient.items.contains(&created));

    let other_patient = service
        .list(PrescriptionFilter::for_patient(99), PageRequest::default())
        .unwrap();
    assert!(other_patient.items.is_empty());
    assert_eq!(other_patient.total, 0);
}

#[test]
fn create_reports_validation_fields() {
    let conn = open_db_in_memory().unwrap();
    let service = PrescriptionService::new(SqlitePrescriptionRepository::try_new(&conn).unwrap());

    for days in [0, -5] {
        let err = service
            .create(CreatePrescriptionRequest {
                days,
                ..request(10, 3)
            })
            .unwrap_err();
        match err {
            PrescriptionServiceError::Validation(err) => assert_eq!(err.fields(), vec!["days"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    let err = service
        .create(CreatePrescriptionRequest {
            medication: String::new(),
            ..request(10, 3)
        })
        .unwrap_err();
    assert!(
        matches!(err, PrescriptionServiceError::Validation(ref inner) if inner.fields() == vec!["medication"])
    );

    // Rejected input must not consume an id.
    assert_eq!(service.create(request(10, 3)).unwrap().prescription_id, 1);
}

#[test]
fn get_missing_reports_not_found_with_id() {
    let conn = open_db_in_memory().unwrap();
    let service = PrescriptionService::new(SqlitePrescriptionRepository::try_new(&conn).unwrap());

    let err = service.get(404).unwrap_err();
    assert!(matches!(err, PrescriptionServiceError::NotFound(404)));
    assert_eq!(err.to_string(), "prescription not found: 404");
}

#[test]
fn patient_filter_partitions_the_full_set() {
    let conn = open_db_in_memory().unwrap();
    let service = PrescriptionService::new(SqlitePrescriptionRepository::try_new(&conn).unwrap());
    for (appointment_id, patient_id) in [(1, 3), (2, 5), (3, 3), (4, 8), (5, 3)] {
        service.create(request(appointment_id, patient_id)).unwrap();
    }

    let all = service
        .list(PrescriptionFilter::default(), PageRequest::default())
        .unwrap()
        .items;
    let matching = service
        .list(PrescriptionFilter::for_patient(3), PageRequest::default())
        .unwrap()
        .items;

    assert!(matching.iter().all(|record| record.patient_id == 3));
    let complement: Vec<Prescription> = all
        .iter()
        .filter(|record| record.patient_id != 3)
        .cloned()
        .collect();

    let mut union: Vec<i64> = ids(&matching);
    union.extend(ids(&complement));
    union.sort_unstable();
    assert_eq!(union, ids(&all));
    assert_eq!(ids(&matching), vec![1, 3, 5]);
}

#[test]
fn pagination_slices_ordered_matches_and_is_idempotent() {
    let conn = open_db_in_memory().unwrap();
    let service = PrescriptionService::new(SqlitePrescriptionRepository::try_new(&conn).unwrap());
    for n in 1..=7 {
        service.create(request(n, 1)).unwrap();
    }

    let first = service.list(PrescriptionFilter::default(), page(2, 3)).unwrap();
    let again = service.list(PrescriptionFilter::default(), page(2, 3)).unwrap();
    assert_eq!(first, again);
    assert_eq!(ids(&first.items), vec![4, 5, 6]);
    assert_eq!(first.total, 7);
    assert_eq!(first.page, 2);
    assert_eq!(first.page_size, 3);

    let last = service.list(PrescriptionFilter::default(), page(3, 3)).unwrap();
    assert_eq!(ids(&last.items), vec![7]);

    let beyond = service.list(PrescriptionFilter::default(), page(9, 3)).unwrap();
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total, 7);
}

#[test]
fn list_defaults_to_first_page_of_one_hundred() {
    let conn = open_db_in_memory().unwrap();
    let service = PrescriptionService::new(SqlitePrescriptionRepository::try_new(&conn).unwrap());

    let result = service
        .list(PrescriptionFilter::default(), PageRequest::default())
        .unwrap();
    assert_eq!(result.page, 1);
    assert_eq!(result.page_size, 100);
    assert!(result.items.is_empty());
}

#[test]
fn default_page_size_follows_a_lower_configured_maximum() {
    let conn = open_db_in_memory().unwrap();
    let service = PrescriptionService::with_max_page_size(
        SqlitePrescriptionRepository::try_new(&conn).unwrap(),
        20,
    );
    for patient_id in 1..=25 {
        service.create(request(patient_id, patient_id)).unwrap();
    }

    let result = service
        .list(PrescriptionFilter::default(), PageRequest::default())
        .unwrap();
    assert_eq!(result.page, 1);
    assert_eq!(result.page_size, 20);
    assert_eq!(result.total, 25);
    assert_eq!(ids(&result.items), (1..=20).collect::<Vec<_>>());
}

#[test]
fn zero_maximum_page_size_is_raised_to_one() {
    let conn = open_db_in_memory().unwrap();
    let service = PrescriptionService::with_max_page_size(
        SqlitePrescriptionRepository::try_new(&conn).unwrap(),
        0,
    );
    assert_eq!(service.max_page_size(), 1);
    service.create(request(1, 1)).unwrap();
    service.create(request(2, 2)).unwrap();

    let first = service
        .list(PrescriptionFilter::default(), PageRequest::default())
        .unwrap();
    assert_eq!(first.page_size, 1);
    assert_eq!(ids(&first.items), vec![1]);

    match service
        .list(PrescriptionFilter::default(), page(1, 2))
        .unwrap_err()
    {
        PrescriptionServiceError::Validation(err) => {
            assert_eq!(err.fields(), vec!["page_size"]);
            assert_eq!(err.violations()[0].reason, ViolationReason::AboveMaximum(1));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn page_numbers_beyond_u32_are_rejected() {
    let conn = open_db_in_memory().unwrap();
    let service = PrescriptionService::new(SqlitePrescriptionRepository::try_new(&conn).unwrap());

    match service
        .list(PrescriptionFilter::default(), page(i64::from(u32::MAX) + 1, 10))
        .unwrap_err()
    {
        PrescriptionServiceError::Validation(err) => {
            assert_eq!(err.fields(), vec!["page"]);
            assert_eq!(
                err.violations()[0].reason,
                ViolationReason::AboveMaximum(u32::MAX)
            );
        }
        other => panic!("unexpected error: {other}"),
    }

    let last = service
        .list(PrescriptionFilter::default(), page(i64::from(u32::MAX), 10))
        .unwrap();
    assert!(last.items.is_empty());
    assert_eq!(last.page, u32::MAX);
}

#[test]
fn list_rejects_invalid_pagination_and_filters() {
    let conn = open_db_in_memory().unwrap();
    let service = PrescriptionService::with_max_page_size(
        SqlitePrescriptionRepository::try_new(&conn).unwrap(),
        20,
    );

    let cases = [
        (PrescriptionFilter::default(), page(1, 0), vec!["page_size"]),
        (PrescriptionFilter::default(), page(1, -4), vec!["page_size"]),
        (PrescriptionFilter::default(), page(1, 21), vec!["page_size"]),
        (PrescriptionFilter::default(), page(0, 10), vec!["page"]),
        (
            PrescriptionFilter {
                patient_id: Some(0),
                appointment_id: Some(-2),
            },
            page(1, 10),
            vec!["patient_id", "appointment_id"],
        ),
    ];

    for (filter, page_request, expected) in cases {
        match service.list(filter, page_request).unwrap_err() {
            PrescriptionServiceError::Validation(err) => assert_eq!(err.fields(), expected),
            other => panic!("unexpected error: {other}"),
        }
    }

    match service
        .list(PrescriptionFilter::default(), page(1, 21))
        .unwrap_err()
    {
        PrescriptionServiceError::Validation(err) => {
            assert_eq!(err.violations()[0].reason, ViolationReason::AboveMaximum(20));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert!(service
        .list(PrescriptionFilter::default(), page(1, 20))
        .is_ok());
}

#[test]
fn storage_failures_surface_as_storage_errors() {
    let conn = open_db_in_memory().unwrap();
    let service = PrescriptionService::new(SqlitePrescriptionRepository::try_new(&conn).unwrap());
    conn.execute_batch("DROP TABLE prescriptions;").unwrap();

    assert!(matches!(
        service.create(request(1, 1)).unwrap_err(),
        PrescriptionServiceError::Storage(RepoError::Db(_))
    ));
    assert!(matches!(
        service.get(1).unwrap_err(),
        PrescriptionServiceError::Storage(_)
    ));
    assert!(matches!(
        service
            .list(PrescriptionFilter::default(), PageRequest::default())
            .unwrap_err(),
        PrescriptionServiceError::Storage(_)
    ));
}

struct UnavailableRepository;

impl PrescriptionRepository for UnavailableRepository {
    fn create_prescription(&self, _input: &NewPrescription) -> RepoResult<Prescription> {
        Err(RepoError::InvalidData("store offline".to_string()))
    }

    fn get_prescription(&self, id: PrescriptionId) -> RepoResult<Option<Prescription>> {
        Err(RepoError::NotFound(id))
    }

    fn list_prescriptions(&self, _query: &PrescriptionListQuery) -> RepoResult<Vec<Prescription>> {
        Ok(Vec::new())
    }

    fn count_prescriptions(&self, _filter: &PrescriptionFilter) -> RepoResult<u64> {
        Err(RepoError::InvalidData("store offline".to_string()))
    }

    fn list_page(&self, _query: &PrescriptionListQuery) -> RepoResult<(u64, Vec<Prescription>)> {
        Err(RepoError::InvalidData("store offline".to_string()))
    }
}

#[test]
fn repository_errors_map_onto_service_taxonomy() {
    let service = PrescriptionService::new(UnavailableRepository);

    assert!(matches!(
        service.create(request(1, 1)).unwrap_err(),
        PrescriptionServiceError::Storage(RepoError::InvalidData(_))
    ));
    assert!(matches!(
        service.get(5).unwrap_err(),
        PrescriptionServiceError::NotFound(5)
    ));
    assert!(matches!(
        service
            .list(PrescriptionFilter::default(), PageRequest::default())
            .unwrap_err(),
        PrescriptionServiceError::Storage(_)
    ));
}

#[test]
fn concurrent_creates_on_separate_connections_get_distinct_ids() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("concurrent.sqlite3");
    drop(open_db(&path).unwrap());

    let workers: Vec<_> = (0..4_i64)
        .map(|worker| {
            let path = path.clone();
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let service =
                    PrescriptionService::new(SqlitePrescriptionRepository::try_new(&conn).unwrap());
                (0..10_i64)
                    .map(|n| {
                        service
                            .create(request(worker * 100 + n + 1, worker + 1))
                            .unwrap()
                            .prescription_id
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut all_ids = Vec::new();
    for worker in workers {
        let worker_ids = worker.join().unwrap();
        assert!(worker_ids.windows(2).all(|pair| pair[0] < pair[1]));
        all_ids.extend(worker_ids);
    }

    let unique: HashSet<i64> = all_ids.iter().copied().collect();
    assert_eq!(unique.len(), 40);
    assert_eq!(all_ids.iter().copied().max(), Some(40));

    let conn = open_db(&path).unwrap();
    let service = PrescriptionService::new(SqlitePrescriptionRepository::try_new(&conn).unwrap());
    let listed = service
        .list(PrescriptionFilter::default(), PageRequest::default())
        .unwrap();
    assert_eq!(listed.total, 40);
    assert_eq!(ids(&listed.items), (1..=40).collect::<Vec<_>>());
}
