use std::env;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::json_store::JsonStore;
use crate::models::{AttendanceRecord, Department, Employee, Remark};
use crate::mysql_store::{DbConfig, MysqlStore};

/// エラー種別
/// 勤怠計算・照合の内部ではローカルに回復し、呼び出し元には
/// 構造化された結果として返す（パニックさせない）
#[derive(Debug, Error)]
pub enum KintaiError {
    /// 日付引数が "YYYY-MM-DD"（月は "YYYY-MM"）でない、または暦として不正
    #[error("日付形式が不正です: {0}")]
    InvalidDateFormat(String),

    /// 未知の社員コード（月次集計では空サマリーに縮退する）
    #[error("社員が見つかりません: {0}")]
    EmployeeNotFound(String),

    /// 正規化後の社員コードが重複
    #[error("社員コードが重複しています: {0}")]
    DuplicateCode(String),

    #[error("ストアエラー: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("MySQLエラー: {0}")]
    Mysql(#[from] mysql::Error),
}

/// 打刻イベント（タイムスタンプは "YYYY-MM-DD HH:MM:SS"）
#[derive(Debug, Clone)]
pub enum ClockEvent {
    In(String),
    Out(String),
}

/// 永続化層の単一インターフェース
/// JSONファイル版とMySQL版の2実装があり、起動時に設定でどちらか一方を選ぶ。
/// 読み取りはスナップショット（返却後にストア側が変更しても影響しない）。
/// upsert_attendanceは冪等: 同一フィールドへの再打刻は先勝ちで上書きしない
pub trait KintaiStore: Send + Sync {
    fn list_employees(&self) -> Result<Vec<Employee>, KintaiError>;

    fn list_departments(&self) -> Result<Vec<Department>, KintaiError>;

    /// dateを指定した場合はその日のレコードのみ返す
    fn list_attendance(&self, date: Option<&str>) -> Result<Vec<AttendanceRecord>, KintaiError>;

    /// employee_code・month（"YYYY-MM"）で絞り込み可能
    fn list_remarks(
        &self,
        employee_code: Option<&str>,
        month: Option<&str>,
    ) -> Result<Vec<Remark>, KintaiError>;

    /// (employee_code, date) のレコードを作成または更新する
    /// 初回出勤打刻でレコードが生まれ、退勤打刻は同一レコードを更新する
    fn upsert_attendance(
        &self,
        employee_code: &str,
        date: &str,
        event: ClockEvent,
    ) -> Result<AttendanceRecord, KintaiError>;

    fn add_employee(
        &self,
        code: &str,
        name: &str,
        department_id: Option<i64>,
    ) -> Result<Employee, KintaiError>;

    fn add_remark(&self, remark: Remark) -> Result<(), KintaiError>;
}

/// 環境変数KINTAI_STOREからストア実装を選択する（json | mysql、既定はjson）
/// 選択は起動時に一度だけ。並行する複数実装のコードパスは持たない
pub fn open_store_from_env() -> Result<Arc<dyn KintaiStore>, KintaiError> {
    let kind = env::var("KINTAI_STORE").unwrap_or_else(|_| "json".to_string());
    match kind.as_str() {
        "json" => {
            let dir = env::var("KINTAI_DATA_DIR").unwrap_or_else(|_| "data".to_string());
            info!("JSONファイルストアを使用: {}", dir);
            Ok(Arc::new(JsonStore::new(dir)))
        }
        "mysql" => {
            let config = DbConfig::from_env();
            info!("MySQLストアを使用: {}:{}", config.host, config.port);
            Ok(Arc::new(MysqlStore::connect(&config)?))
        }
        other => Err(KintaiError::Store(format!(
            "KINTAI_STOREの値が不正です: {}（json または mysql）",
            other
        ))),
    }
}
