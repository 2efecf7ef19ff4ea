use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Local;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::{normalize_code, AttendanceRecord, Department, Employee, Remark};
use crate::store::{ClockEvent, KintaiError, KintaiStore};

const EMPLOYEES_FILE: &str = "employees.json";
const DEPARTMENTS_FILE: &str = "departments.json";
const ATTENDANCE_FILE: &str = "attendance.json";
const REMARKS_FILE: &str = "remarks.json";

/// JSONファイル永続化
/// コレクションごとに1ファイル。読み取りは都度ファイルから読むスナップショット、
/// 書き込みは一時ファイルに書いてからrenameする（書きかけのファイルを残さない）
pub struct JsonStore {
    dir: PathBuf,
    // read-modify-writeを直列化する
    write_lock: Mutex<()>,
}

impl JsonStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// コレクションを読み込む（ファイルがなければ空）
    fn load<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>, KintaiError> {
        let path = self.dir.join(file);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&path)?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// 一時ファイル経由でアトミックに保存する
    fn save<T: Serialize>(&self, file: &str, items: &[T]) -> Result<(), KintaiError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file);
        let tmp = self.dir.join(format!("{}.tmp", file));
        fs::write(&tmp, serde_json::to_string_pretty(items)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

impl KintaiStore for JsonStore {
    fn list_employees(&self) -> Result<Vec<Employee>, KintaiError> {
        self.load(EMPLOYEES_FILE)
    }

    fn list_departments(&self) -> Result<Vec<Department>, KintaiError> {
        self.load(DEPARTMENTS_FILE)
    }

    fn list_attendance(&self, date: Option<&str>) -> Result<Vec<AttendanceRecord>, KintaiError> {
        let mut records: Vec<AttendanceRecord> = self.load(ATTENDANCE_FILE)?;
        if let Some(date) = date {
            records.retain(|r| r.date == date);
        }
        Ok(records)
    }

    fn list_remarks(
        &self,
        employee_code: Option<&str>,
        month: Option<&str>,
    ) -> Result<Vec<Remark>, KintaiError> {
        let mut remarks: Vec<Remark> = self.load(REMARKS_FILE)?;
        if let Some(code) = employee_code {
            let code = normalize_code(code);
            remarks.retain(|r| normalize_code(&r.employee_code) == code);
        }
        if let Some(month) = month {
            remarks.retain(|r| r.date.starts_with(month));
        }
        Ok(remarks)
    }

    fn upsert_attendance(
        &self,
        employee_code: &str,
        date: &str,
        event: ClockEvent,
    ) -> Result<AttendanceRecord, KintaiError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| KintaiError::Store("書き込みロックの取得に失敗".to_string()))?;

        let code = normalize_code(employee_code);
        let mut records: Vec<AttendanceRecord> = self.load(ATTENDANCE_FILE)?;

        let index = records
            .iter()
            .position(|r| normalize_code(&r.employee_code) == code && r.date == date);
        let index = match index {
            Some(i) => i,
            None => {
                records.push(AttendanceRecord::empty(employee_code, date));
                records.len() - 1
            }
        };

        // 冪等: 既に値のあるフィールドは上書きしない（先勝ち）
        match event {
            ClockEvent::In(ts) => {
                if records[index].clock_in.is_none() {
                    records[index].clock_in = Some(ts);
                }
            }
            ClockEvent::Out(ts) => {
                if records[index].clock_out.is_none() {
                    records[index].clock_out = Some(ts);
                }
            }
        }

        let record = records[index].clone();
        self.save(ATTENDANCE_FILE, &records)?;
        Ok(record)
    }

    fn add_employee(
        &self,
        code: &str,
        name: &str,
        department_id: Option<i64>,
    ) -> Result<Employee, KintaiError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| KintaiError::Store("書き込みロックの取得に失敗".to_string()))?;

        let normalized = normalize_code(code);
        let mut employees: Vec<Employee> = self.load(EMPLOYEES_FILE)?;
        if employees
            .iter()
            .any(|e| normalize_code(&e.code) == normalized)
        {
            return Err(KintaiError::DuplicateCode(normalized));
        }

        let id = employees.iter().map(|e| e.id).max().unwrap_or(0) + 1;
        let now = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let employee = Employee {
            id,
            code: code.to_string(),
            name: name.to_string(),
            department_id,
            is_active: true,
            created_at: now.clone(),
            updated_at: now,
        };
        employees.push(employee.clone());
        self.save(EMPLOYEES_FILE, &employees)?;
        Ok(employee)
    }

    fn add_remark(&self, remark: Remark) -> Result<(), KintaiError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| KintaiError::Store("書き込みロックの取得に失敗".to_string()))?;

        let code = normalize_code(&remark.employee_code);
        let mut remarks: Vec<Remark> = self.load(REMARKS_FILE)?;
        // (employee_code, date) が自然キー: 同日既存は差し替え
        match remarks
            .iter_mut()
            .find(|r| normalize_code(&r.employee_code) == code && r.date == remark.date)
        {
            Some(existing) => existing.remark = remark.remark,
            None => remarks.push(remark),
        }
        self.save(REMARKS_FILE, &remarks)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, JsonStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_empty_store() {
        let (_dir, store) = store();
        assert!(store.list_employees().unwrap().is_empty());
        assert!(store.list_departments().unwrap().is_empty());
        assert!(store.list_attendance(None).unwrap().is_empty());
        assert!(store.list_remarks(None, None).unwrap().is_empty());
    }

    #[test]
    fn test_clock_in_creates_record() {
        let (_dir, store) = store();
        let record = store
            .upsert_attendance("E001", "2024-06-03", ClockEvent::In("2024-06-03 09:00:00".to_string()))
            .unwrap();
        assert_eq!(record.clock_in.as_deref(), Some("2024-06-03 09:00:00"));
        assert!(record.clock_out.is_none());
        assert_eq!(store.list_attendance(Some("2024-06-03")).unwrap().len(), 1);
    }

    #[test]
    fn test_clock_out_updates_same_record() {
        let (_dir, store) = store();
        store
            .upsert_attendance("E001", "2024-06-03", ClockEvent::In("2024-06-03 09:00:00".to_string()))
            .unwrap();
        let record = store
            .upsert_attendance("E001", "2024-06-03", ClockEvent::Out("2024-06-03 18:00:00".to_string()))
            .unwrap();
        assert_eq!(record.clock_in.as_deref(), Some("2024-06-03 09:00:00"));
        assert_eq!(record.clock_out.as_deref(), Some("2024-06-03 18:00:00"));
        // 1人1日1レコード
        assert_eq!(store.list_attendance(None).unwrap().len(), 1);
    }

    #[test]
    fn test_repeated_clock_in_is_first_write_wins() {
        let (_dir, store) = store();
        store
            .upsert_attendance("E001", "2024-06-03", ClockEvent::In("2024-06-03 09:00:00".to_string()))
            .unwrap();
        // 再打刻しても最初の値が残る
        let record = store
            .upsert_attendance("E001", "2024-06-03", ClockEvent::In("2024-06-03 10:00:00".to_string()))
            .unwrap();
        assert_eq!(record.clock_in.as_deref(), Some("2024-06-03 09:00:00"));

        store
            .upsert_attendance("E001", "2024-06-03", ClockEvent::Out("2024-06-03 18:00:00".to_string()))
            .unwrap();
        let record = store
            .upsert_attendance("E001", "2024-06-03", ClockEvent::Out("2024-06-03 19:00:00".to_string()))
            .unwrap();
        assert_eq!(record.clock_out.as_deref(), Some("2024-06-03 18:00:00"));
    }

    #[test]
    fn test_upsert_matches_normalized_code() {
        let (_dir, store) = store();
        store
            .upsert_attendance("E001", "2024-06-03", ClockEvent::In("2024-06-03 09:00:00".to_string()))
            .unwrap();
        // 全角コードの退勤打刻も同一レコードに載る
        store
            .upsert_attendance("ｅ００１", "2024-06-03", ClockEvent::Out("2024-06-03 18:00:00".to_string()))
            .unwrap();
        let records = store.list_attendance(None).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].clock_in.is_some());
        assert!(records[0].clock_out.is_some());
    }

    #[test]
    fn test_add_employee_duplicate_code() {
        let (_dir, store) = store();
        store.add_employee("E001", "佐藤", None).unwrap();
        // 正規化後に同一になるコードは拒否
        assert!(matches!(
            store.add_employee("ｅ００１", "田中", None),
            Err(KintaiError::DuplicateCode(_))
        ));
    }

    #[test]
    fn test_add_employee_assigns_ids() {
        let (_dir, store) = store();
        let a = store.add_employee("E001", "佐藤", None).unwrap();
        let b = store.add_employee("E002", "田中", Some(1)).unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert!(a.is_active);
    }

    #[test]
    fn test_add_employee_keeps_raw_code() {
        // コードは入力のまま保存され、一意性判定だけが正規化後の値で行われる
        let (_dir, store) = store();
        let employee = store.add_employee("ｅ００１", "佐藤", None).unwrap();
        assert_eq!(employee.code, "ｅ００１");
        assert_eq!(store.list_employees().unwrap()[0].code, "ｅ００１");
    }

    #[test]
    fn test_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonStore::new(dir.path());
            store.add_employee("E001", "佐藤", None).unwrap();
        }
        let reopened = JsonStore::new(dir.path());
        assert_eq!(reopened.list_employees().unwrap().len(), 1);
    }

    #[test]
    fn test_remark_filters() {
        let (_dir, store) = store();
        store
            .add_remark(Remark {
                employee_code: "E001".to_string(),
                date: "2024-06-03".to_string(),
                remark: "直行".to_string(),
            })
            .unwrap();
        store
            .add_remark(Remark {
                employee_code: "E002".to_string(),
                date: "2024-07-01".to_string(),
                remark: "出張".to_string(),
            })
            .unwrap();

        assert_eq!(store.list_remarks(Some("E001"), None).unwrap().len(), 1);
        assert_eq!(store.list_remarks(None, Some("2024-06")).unwrap().len(), 1);
        assert_eq!(store.list_remarks(Some("E001"), Some("2024-07")).unwrap().len(), 0);
    }

    #[test]
    fn test_remark_replaced_on_same_day() {
        let (_dir, store) = store();
        for text in ["直行", "直帰"] {
            store
                .add_remark(Remark {
                    employee_code: "E001".to_string(),
                    date: "2024-06-03".to_string(),
                    remark: text.to_string(),
                })
                .unwrap();
        }
        let remarks = store.list_remarks(Some("E001"), None).unwrap();
        assert_eq!(remarks.len(), 1);
        assert_eq!(remarks[0].remark, "直帰");
    }
}
