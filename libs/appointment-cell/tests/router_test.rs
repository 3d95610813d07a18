use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use appointment_cell::appointment_routes;
use shared_database::{AppState, MemoryGateway};
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

struct TestApp {
    router: Router,
    patient_id: Uuid,
    clinic_id: Uuid,
    staff_id: Uuid,
}

async fn test_app() -> TestApp {
    let gateway = MemoryGateway::new();
    let patient_id = gateway.add_patient("Joy Wambui").await;
    let clinic_id = gateway.add_clinic("Eye Clinic").await;
    let staff_id = gateway.add_staff("Dr. Sam Mutua").await;

    let state = AppState::in_memory(TestConfig::default().to_app_config(), gateway);
    TestApp {
        router: appointment_routes(state),
        patient_id,
        clinic_id,
        staff_id,
    }
}

fn post_json(uri: &str, user: &TestUser, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", JwtTestUtils::bearer(user, &TestConfig::default()))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn booking_returns_created_then_conflict() {
    let app = test_app().await;
    let reception = TestUser::reception("desk@clinic.test");
    let booking = |time: &str| {
        json!({
            "patient_id": app.patient_id,
            "clinic_id": app.clinic_id,
            "staff_id": app.staff_id,
            "appointment_time": time,
        })
    };

    let response = app
        .router
        .clone()
        .oneshot(post_json("/", &reception, booking("2024-09-02T09:00:00Z")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["status"], "Scheduled");
    assert_eq!(json["patient_name"], "Joy Wambui");
    assert_eq!(json["queue_number"], 1);

    let response = app
        .router
        .clone()
        .oneshot(post_json("/", &reception, booking("2024-09-02T09:15:00Z")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .router
        .oneshot(post_json("/", &reception, booking("2024-09-02T09:20:00Z")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn bulk_validation_failure_lists_field_errors() {
    let app = test_app().await;
    let body = json!({
        "appointments": [
            {
                "patient_id": app.patient_id,
                "clinic_id": app.clinic_id,
                "staff_id": app.staff_id,
                "appointment_time": "2024-09-02T09:00:00Z"
            },
            { "patient_id": app.patient_id }
        ]
    });

    let response = app
        .router
        .oneshot(post_json("/bulk", &TestUser::admin("admin@clinic.test"), body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    let fields: Vec<&str> = json["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"appointments[1].clinic_id"));
    assert!(fields.contains(&"appointments[1].appointment_time"));
}

#[tokio::test]
async fn bulk_success_reports_imported_count() {
    let app = test_app().await;
    let item = |time: &str| {
        json!({
            "patient_id": app.patient_id,
            "clinic_id": app.clinic_id,
            "staff_id": app.staff_id,
            "appointment_time": time,
        })
    };
    let body = json!({
        "appointments": [item("2024-09-02T09:00:00Z"), item("2024-09-02T10:00:00Z")]
    });

    let response = app
        .router
        .oneshot(post_json("/bulk", &TestUser::reception("desk@clinic.test"), body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["importedCount"], 2);
}

#[tokio::test]
async fn cashiers_cannot_book() {
    let app = test_app().await;
    let body = json!({
        "patient_id": app.patient_id,
        "clinic_id": app.clinic_id,
        "staff_id": app.staff_id,
        "appointment_time": "2024-09-02T09:00:00Z",
    });

    let response = app
        .router
        .oneshot(post_json("/", &TestUser::cashier("till@clinic.test"), body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn cancel_without_reason_is_bad_request() {
    let app = test_app().await;
    let reception = TestUser::reception("desk@clinic.test");
    let booking = json!({
        "patient_id": app.patient_id,
        "clinic_id": app.clinic_id,
        "staff_id": app.staff_id,
        "appointment_time": "2024-09-02T09:00:00Z",
    });
    let created = app
        .router
        .clone()
        .oneshot(post_json("/", &reception, booking))
        .await
        .unwrap();
    let id = body_json(created).await["id"].as_str().unwrap().to_string();

    let response = app
        .router
        .clone()
        .oneshot(post_json(&format!("/{}/cancel", id), &reception, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .router
        .oneshot(post_json(
            &format!("/{}/cancel", id),
            &reception,
            json!({ "cancellationReason": "Clashes with an exam" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["appointment"]["status"], "Cancelled");
}

#[tokio::test]
async fn check_conflicts_reports_without_writing() {
    let app = test_app().await;
    let body = json!({
        "staff_id": app.staff_id,
        "clinic_id": app.clinic_id,
        "appointment_time": "2024-09-02T09:00:00Z",
    });

    let response = app
        .router
        .oneshot(post_json("/check-conflicts", &TestUser::nurse("nurse@clinic.test"), body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["has_conflict"], false);
    assert_eq!(json["window_minutes"], 20);
}

#[tokio::test]
async fn unreadable_bodies_are_json_bad_requests() {
    let app = test_app().await;
    let reception = TestUser::reception("desk@clinic.test");
    let booking = json!({
        "patient_id": app.patient_id,
        "clinic_id": app.clinic_id,
        "staff_id": app.staff_id,
        "appointment_time": "2024-09-02T11:00:00Z",
    });
    let created = app
        .router
        .clone()
        .oneshot(post_json("/", &reception, booking))
        .await
        .unwrap();
    let id = body_json(created).await["id"].as_str().unwrap().to_string();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(format!("/{}/status", id))
                .header("authorization", JwtTestUtils::bearer(&reception, &TestConfig::default()))
                .header("content-type", "application/json")
                .body(Body::from(json!({ "status": "Teleported" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers()["content-type"], "application/json");
    assert!(body_json(response).await["error"].as_str().unwrap().contains("Teleported"));

    let response = app
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header("authorization", JwtTestUtils::bearer(&reception, &TestConfig::default()))
                .header("content-type", "application/json")
                .body(Body::from("{\"patient_id\": "))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["error"].is_string());
}
