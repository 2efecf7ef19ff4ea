use mysql::prelude::*;
use mysql::{params, Opts, Pool};
use std::env;

use crate::models::{normalize_code, AttendanceRecord, Department, Employee, Remark};
use crate::store::{ClockEvent, KintaiError, KintaiStore};

/// データベース接続設定
/// 環境変数: DB_HOST, DB_PORT, DB_USER, DB_PASSWORD, DB_NAME
#[derive(Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl DbConfig {
    pub fn from_env() -> Self {
        Self {
            host: env::var("DB_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3306),
            user: env::var("DB_USER").unwrap_or_else(|_| "root".to_string()),
            password: env::var("DB_PASSWORD").unwrap_or_else(|_| "".to_string()),
            database: env::var("DB_NAME").unwrap_or_else(|_| "kintai".to_string()),
        }
    }

    fn connection_url(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// MySQL永続化
/// attendance/remarksの自然キーは (employee_code, date) のUNIQUE制約。
/// employee_codeは正規化した値で保存する
pub struct MysqlStore {
    pool: Pool,
}

impl MysqlStore {
    pub fn connect(config: &DbConfig) -> Result<Self, KintaiError> {
        let opts = Opts::from_url(&config.connection_url()).map_err(mysql::Error::from)?;
        let pool = Pool::new(opts)?;
        Ok(Self { pool })
    }
}

impl KintaiStore for MysqlStore {
    fn list_employees(&self) -> Result<Vec<Employee>, KintaiError> {
        let mut conn = self.pool.get_conn()?;
        let employees = conn.query_map(
            "SELECT id, code, name, department_id, is_active,
                    DATE_FORMAT(created_at, '%Y-%m-%d %H:%i:%s'),
                    DATE_FORMAT(updated_at, '%Y-%m-%d %H:%i:%s')
             FROM employees
             ORDER BY id",
            |(id, code, name, department_id, is_active, created_at, updated_at): (
                i64,
                String,
                String,
                Option<i64>,
                i8,
                Option<String>,
                Option<String>,
            )| Employee {
                id,
                code,
                name,
                department_id,
                is_active: is_active != 0,
                created_at: created_at.unwrap_or_default(),
                updated_at: updated_at.unwrap_or_default(),
            },
        )?;
        Ok(employees)
    }

    fn list_departments(&self) -> Result<Vec<Department>, KintaiError> {
        let mut conn = self.pool.get_conn()?;
        let departments = conn.query_map(
            "SELECT id, name FROM departments ORDER BY id",
            |(id, name): (i64, String)| Department { id, name },
        )?;
        Ok(departments)
    }

    fn list_attendance(&self, date: Option<&str>) -> Result<Vec<AttendanceRecord>, KintaiError> {
        let mut conn = self.pool.get_conn()?;

        let sql = "SELECT employee_code, DATE_FORMAT(date, '%Y-%m-%d'),
                          DATE_FORMAT(clock_in, '%Y-%m-%d %H:%i:%s'),
                          DATE_FORMAT(clock_out, '%Y-%m-%d %H:%i:%s'),
                          late_minutes, early_minutes, overtime_minutes, night_minutes,
                          COALESCE(remark, '')
                   FROM attendance";
        let map_row = |(
            employee_code,
            date,
            clock_in,
            clock_out,
            late_minutes,
            early_minutes,
            overtime_minutes,
            night_minutes,
            remark,
        ): (
            String,
            String,
            Option<String>,
            Option<String>,
            i64,
            i64,
            i64,
            i64,
            String,
        )| AttendanceRecord {
            employee_code,
            date,
            clock_in,
            clock_out,
            late_minutes,
            early_minutes,
            overtime_minutes,
            night_minutes,
            remark,
        };

        let records = match date {
            Some(date) => conn.exec_map(
                format!("{} WHERE date = ? ORDER BY employee_code", sql),
                (date,),
                map_row,
            )?,
            None => conn.exec_map(
                format!("{} ORDER BY date, employee_code", sql),
                (),
                map_row,
            )?,
        };
        Ok(records)
    }

    fn list_remarks(
        &self,
        employee_code: Option<&str>,
        month: Option<&str>,
    ) -> Result<Vec<Remark>, KintaiError> {
        let mut conn = self.pool.get_conn()?;

        let mut sql = String::from(
            "SELECT employee_code, DATE_FORMAT(date, '%Y-%m-%d'), remark
             FROM remarks WHERE 1=1",
        );
        let mut bindings: Vec<mysql::Value> = Vec::new();
        if let Some(code) = employee_code {
            sql.push_str(" AND employee_code = ?");
            bindings.push(normalize_code(code).into());
        }
        if let Some(month) = month {
            sql.push_str(" AND DATE_FORMAT(date, '%Y-%m') = ?");
            bindings.push(month.into());
        }
        sql.push_str(" ORDER BY date, employee_code");

        let remarks = conn.exec_map(
            sql,
            bindings,
            |(employee_code, date, remark): (String, String, String)| Remark {
                employee_code,
                date,
                remark,
            },
        )?;
        Ok(remarks)
    }

    fn upsert_attendance(
        &self,
        employee_code: &str,
        date: &str,
        event: ClockEvent,
    ) -> Result<AttendanceRecord, KintaiError> {
        let mut conn = self.pool.get_conn()?;
        let code = normalize_code(employee_code);

        // 冪等upsert: 既に値のあるフィールドはCOALESCEで先勝ちのまま残す
        match event {
            ClockEvent::In(ts) => {
                conn.exec_drop(
                    r"INSERT INTO attendance (employee_code, date, clock_in)
                      VALUES (:code, :date, :ts)
                      ON DUPLICATE KEY UPDATE clock_in = COALESCE(clock_in, VALUES(clock_in))",
                    params! { "code" => &code, "date" => date, "ts" => &ts },
                )?;
            }
            ClockEvent::Out(ts) => {
                conn.exec_drop(
                    r"INSERT INTO attendance (employee_code, date, clock_out)
                      VALUES (:code, :date, :ts)
                      ON DUPLICATE KEY UPDATE clock_out = COALESCE(clock_out, VALUES(clock_out))",
                    params! { "code" => &code, "date" => date, "ts" => &ts },
                )?;
            }
        }

        let record = conn
            .exec_map(
                "SELECT employee_code, DATE_FORMAT(date, '%Y-%m-%d'),
                        DATE_FORMAT(clock_in, '%Y-%m-%d %H:%i:%s'),
                        DATE_FORMAT(clock_out, '%Y-%m-%d %H:%i:%s'),
                        late_minutes, early_minutes, overtime_minutes, night_minutes,
                        COALESCE(remark, '')
                 FROM attendance
                 WHERE employee_code = ? AND date = ?",
                (&code, date),
                |(
                    employee_code,
                    date,
                    clock_in,
                    clock_out,
                    late_minutes,
                    early_minutes,
                    overtime_minutes,
                    night_minutes,
                    remark,
                ): (
                    String,
                    String,
                    Option<String>,
                    Option<String>,
                    i64,
                    i64,
                    i64,
                    i64,
                    String,
                )| AttendanceRecord {
                    employee_code,
                    date,
                    clock_in,
                    clock_out,
                    late_minutes,
                    early_minutes,
                    overtime_minutes,
                    night_minutes,
                    remark,
                },
            )?
            .into_iter()
            .next()
            .ok_or_else(|| KintaiError::Store("upsert後のレコードが見つかりません".to_string()))?;

        Ok(record)
    }

    fn add_employee(
        &self,
        code: &str,
        name: &str,
        department_id: Option<i64>,
    ) -> Result<Employee, KintaiError> {
        let mut conn = self.pool.get_conn()?;
        let normalized = normalize_code(code);

        // コードは入力のまま保存し、一意性は正規化後の値で判定する（JSONストアと同じ規約）
        let codes: Vec<String> = conn.query_map("SELECT code FROM employees", |c: String| c)?;
        if codes.iter().any(|c| normalize_code(c) == normalized) {
            return Err(KintaiError::DuplicateCode(normalized));
        }

        conn.exec_drop(
            r"INSERT INTO employees (code, name, department_id, is_active, created_at, updated_at)
              VALUES (:code, :name, :department_id, 1, NOW(), NOW())",
            params! {
                "code" => code,
                "name" => name,
                "department_id" => department_id,
            },
        )?;
        let id: i64 = conn
            .query_first("SELECT LAST_INSERT_ID()")?
            .unwrap_or_default();

        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        Ok(Employee {
            id,
            code: code.to_string(),
            name: name.to_string(),
            department_id,
            is_active: true,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    fn add_remark(&self, remark: Remark) -> Result<(), KintaiError> {
        let mut conn = self.pool.get_conn()?;
        conn.exec_drop(
            r"INSERT INTO remarks (employee_code, date, remark)
              VALUES (:code, :date, :remark)
              ON DUPLICATE KEY UPDATE remark = VALUES(remark)",
            params! {
                "code" => normalize_code(&remark.employee_code),
                "date" => &remark.date,
                "remark" => &remark.remark,
            },
        )?;
        Ok(())
    }
}
