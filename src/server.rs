use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::master;
use crate::models::Remark;
use crate::store::{ClockEvent, KintaiError, KintaiStore};

/// アプリケーション状態（起動時に選択したストアを共有）
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn KintaiStore>,
}

/// エラーレスポンス
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Deserialize)]
pub struct MasterQuery {
    pub date: String,
}

#[derive(Deserialize)]
pub struct SummaryQuery {
    pub employee_code: String,
    pub month: String,
}

/// 打刻リクエスト（timestamp省略時はサーバー時刻で打刻）
#[derive(Deserialize)]
pub struct ClockRequest {
    pub employee_code: String,
    pub timestamp: Option<String>,
}

#[derive(Deserialize)]
pub struct NewEmployeeRequest {
    pub code: String,
    pub name: String,
    pub department_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct RemarkQuery {
    pub employee_code: Option<String>,
    pub month: Option<String>,
}

#[derive(Deserialize)]
pub struct NewRemarkRequest {
    pub employee_code: String,
    pub date: String,
    pub remark: String,
}

/// HTTPサーバーを起動
pub async fn run(port: u16, store: Arc<dyn KintaiStore>) {
    let state = AppState { store };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/api/master", get(get_master))
        .route("/api/summary", get(get_summary))
        .route("/api/clock-in", post(clock_in))
        .route("/api/clock-out", post(clock_out))
        .route("/api/employees", get(list_employees).post(add_employee))
        .route("/api/departments", get(list_departments))
        .route("/api/remarks", get(list_remarks).post(add_remark))
        .layer(cors)
        .with_state(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .expect("Failed to bind to port");

    info!("Server listening on port {}", port);
    axum::serve(listener, app).await.expect("Server failed");
}

/// ヘルスチェック
async fn health_check() -> &'static str {
    "OK"
}

/// エラーをHTTPステータスに対応付ける
/// 日付の形式不正のみ呼び出し側起因の400、それ以外は500系
fn error_response(e: KintaiError) -> Response {
    let status = match e {
        KintaiError::InvalidDateFormat(_) => StatusCode::BAD_REQUEST,
        KintaiError::EmployeeNotFound(_) => StatusCode::NOT_FOUND,
        KintaiError::DuplicateCode(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse { error: e.to_string() })).into_response()
}

/// 指定日のマスター一覧を返す
async fn get_master(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MasterQuery>,
) -> Response {
    match master::master_for_date(state.store.as_ref(), &query.date) {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(e) => error_response(e),
    }
}

/// 指定社員の月次サマリーを返す
async fn get_summary(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SummaryQuery>,
) -> Response {
    match master::build_monthly_summary(state.store.as_ref(), &query.employee_code, &query.month) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => error_response(e),
    }
}

/// 出勤打刻
async fn clock_in(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ClockRequest>,
) -> Response {
    handle_clock(&state, req, true)
}

/// 退勤打刻
async fn clock_out(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ClockRequest>,
) -> Response {
    handle_clock(&state, req, false)
}

fn handle_clock(state: &AppState, req: ClockRequest, is_clock_in: bool) -> Response {
    if req.employee_code.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse { error: "employee_codeは必須です".to_string() }),
        )
            .into_response();
    }

    let timestamp = req
        .timestamp
        .unwrap_or_else(|| Local::now().format("%Y-%m-%d %H:%M:%S").to_string());

    // 打刻日付はタイムスタンプの先頭10文字
    let date = match timestamp.get(..10) {
        Some(d) => d.to_string(),
        None => return error_response(KintaiError::InvalidDateFormat(timestamp)),
    };
    if let Err(e) = master::parse_iso_date(&date) {
        return error_response(e);
    }

    let event = if is_clock_in {
        ClockEvent::In(timestamp)
    } else {
        ClockEvent::Out(timestamp)
    };

    match state.store.upsert_attendance(&req.employee_code, &date, event) {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn list_employees(State(state): State<Arc<AppState>>) -> Response {
    match state.store.list_employees() {
        Ok(employees) => (StatusCode::OK, Json(employees)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn add_employee(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewEmployeeRequest>,
) -> Response {
    if req.code.trim().is_empty() || req.name.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse { error: "codeとnameは必須です".to_string() }),
        )
            .into_response();
    }
    match state.store.add_employee(&req.code, &req.name, req.department_id) {
        Ok(employee) => (StatusCode::CREATED, Json(employee)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn list_departments(State(state): State<Arc<AppState>>) -> Response {
    match state.store.list_departments() {
        Ok(departments) => (StatusCode::OK, Json(departments)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn list_remarks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RemarkQuery>,
) -> Response {
    match state
        .store
        .list_remarks(query.employee_code.as_deref(), query.month.as_deref())
    {
        Ok(remarks) => (StatusCode::OK, Json(remarks)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn add_remark(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewRemarkRequest>,
) -> Response {
    if let Err(e) = master::parse_iso_date(&req.date) {
        return error_response(e);
    }
    let remark = Remark {
        employee_code: req.employee_code,
        date: req.date,
        remark: req.remark,
    };
    match state.store.add_remark(remark) {
        Ok(()) => (StatusCode::CREATED, Json(serde_json::json!({ "ok": true }))).into_response(),
        Err(e) => error_response(e),
    }
}
