use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::warn;

use crate::calc::{self, format_hm, format_hm_or_dash, format_hm_or_zero};
use crate::models::{
    normalize_code, AttendanceRecord, Department, Employee, Remark, UNASSIGNED_DEPARTMENT,
};
use crate::store::{KintaiError, KintaiStore};

/// 出勤中（出勤打刻のみ）
pub const STATUS_WORKING: &str = "出勤中";
/// 退勤済（出退勤両方あり）
pub const STATUS_LEFT: &str = "退勤済";

/// マスター1行分: 従業員・部門・勤怠・備考を日付で突き合わせた照合結果
/// 永続化されない導出ビューで、問い合わせの都度再生成される
#[derive(Debug, Clone, Serialize)]
pub struct MasterRow {
    pub employee_id: i64,
    pub employee_code: String,
    pub employee_name: String,
    pub department_name: String,
    pub date: String,
    pub clock_in: Option<String>,
    pub clock_out: Option<String>,
    pub status: String,
    /// 備考エンティティ由来（AttendanceRecord.remarkとは別系統）
    pub remark: String,
    pub late_minutes: i64,
    pub early_minutes: i64,
    pub worked_minutes: Option<i64>,
    pub overtime_minutes: Option<i64>,
    pub legal_overtime_minutes: Option<i64>,
    pub illegal_overtime_minutes: Option<i64>,
    pub night_minutes: Option<i64>,
    /// 表示用 "H:MM"（データなしは「—」）
    pub worked: String,
    /// 集計用 "H:MM"（データなしは「0:00」）
    pub overtime: String,
    pub legal_overtime: String,
    pub illegal_overtime: String,
    pub night: String,
}

/// 月次合計（データなしの日は集計から除外される）
#[derive(Debug, Clone, Default, Serialize)]
pub struct MonthlyTotals {
    pub worked_minutes: i64,
    pub overtime_minutes: i64,
    pub legal_overtime_minutes: i64,
    pub illegal_overtime_minutes: i64,
    pub night_minutes: i64,
    pub late_early_minutes: i64,
    pub worked: String,
    pub overtime: String,
    pub legal_overtime: String,
    pub illegal_overtime: String,
    pub night: String,
    pub late_early: String,
}

/// 月次サマリー: 対象社員の日別マスター行と合計
#[derive(Debug, Serialize)]
pub struct MonthlySummary {
    pub employee_code: String,
    pub month: String,
    pub days: Vec<MasterRow>,
    pub totals: MonthlyTotals,
    /// 取得に失敗した日の記録（集計からは除外済み、致命扱いしない）
    pub warnings: Vec<String>,
}

/// 指定日のマスター一覧を生成する
/// 在籍中の従業員1レコードにつき1行（コード重複も別行として列挙する）。
/// 入力コレクションは読み取りスナップショットで、一切変更しない
pub fn build_master(
    date: &str,
    employees: &[Employee],
    departments: &[Department],
    attendance: &[AttendanceRecord],
    remarks: &[Remark],
) -> Result<Vec<MasterRow>, KintaiError> {
    parse_iso_date(date)?;

    let department_names: HashMap<i64, &str> = departments
        .iter()
        .map(|d| (d.id, d.name.as_str()))
        .collect();

    // 当日分のみに絞り、正規化コードで引けるようにする（重複コードは先勝ち）
    let mut day_attendance: HashMap<String, &AttendanceRecord> = HashMap::new();
    for record in attendance.iter().filter(|r| r.date == date) {
        day_attendance
            .entry(normalize_code(&record.employee_code))
            .or_insert(record);
    }

    let mut day_remarks: HashMap<String, &str> = HashMap::new();
    for remark in remarks.iter().filter(|r| r.date == date) {
        day_remarks
            .entry(normalize_code(&remark.employee_code))
            .or_insert(remark.remark.as_str());
    }

    let mut rows: Vec<MasterRow> = employees
        .iter()
        .filter(|e| e.is_active)
        .map(|employee| {
            let code = normalize_code(&employee.code);
            let record = day_attendance.get(&code).copied();
            let remark = day_remarks.get(&code).copied().unwrap_or("");
            build_row(date, employee, &department_names, record, remark)
        })
        .collect();

    // 氏名順（安定ソート: 同名は元の並び順を保つ）
    rows.sort_by(|a, b| a.employee_name.cmp(&b.employee_name));

    Ok(rows)
}

fn build_row(
    date: &str,
    employee: &Employee,
    department_names: &HashMap<i64, &str>,
    record: Option<&AttendanceRecord>,
    remark: &str,
) -> MasterRow {
    let department_name = employee
        .department_id
        .and_then(|id| department_names.get(&id).copied())
        .unwrap_or(UNASSIGNED_DEPARTMENT)
        .to_string();

    let clock_in = record.and_then(|r| r.clock_in.clone());
    let clock_out = record.and_then(|r| r.clock_out.clone());

    let status = match (&clock_in, &clock_out) {
        (Some(_), None) => STATUS_WORKING,
        (Some(_), Some(_)) => STATUS_LEFT,
        _ => "",
    };

    let metrics = calc::calculate(clock_in.as_deref(), clock_out.as_deref());

    MasterRow {
        employee_id: employee.id,
        employee_code: employee.code.clone(),
        employee_name: employee.name.clone(),
        department_name,
        date: date.to_string(),
        clock_in,
        clock_out,
        status: status.to_string(),
        remark: remark.to_string(),
        late_minutes: record.map(|r| r.late_minutes).unwrap_or(0),
        early_minutes: record.map(|r| r.early_minutes).unwrap_or(0),
        worked_minutes: metrics.worked_minutes,
        overtime_minutes: metrics.overtime_minutes,
        legal_overtime_minutes: metrics.legal_overtime_minutes,
        illegal_overtime_minutes: metrics.illegal_overtime_minutes,
        night_minutes: metrics.night_minutes,
        worked: format_hm_or_dash(metrics.worked_minutes),
        overtime: format_hm_or_zero(metrics.overtime_minutes),
        legal_overtime: format_hm_or_zero(metrics.legal_overtime_minutes),
        illegal_overtime: format_hm_or_zero(metrics.illegal_overtime_minutes),
        night: format_hm_or_zero(metrics.night_minutes),
    }
}

/// ストアから4コレクションを読み出して指定日のマスターを生成する
/// コレクションは1回の照合につき1回だけ読む（途中で再読込しない）
pub fn master_for_date(
    store: &dyn KintaiStore,
    date: &str,
) -> Result<Vec<MasterRow>, KintaiError> {
    parse_iso_date(date)?;
    let employees = store.list_employees()?;
    let departments = store.list_departments()?;
    let attendance = store.list_attendance(Some(date))?;
    let remarks = store.list_remarks(None, None)?;
    build_master(date, &employees, &departments, &attendance, &remarks)
}

/// 指定社員の月次サマリーを生成する
/// 月内の各日についてマスター照合を行い、データのある日のみを合計する。
/// 1日分の取得失敗はその日を除外して警告に記録し、月全体は失敗させない。
/// 未知の社員コードは空サマリーに縮退する
pub fn build_monthly_summary(
    store: &dyn KintaiStore,
    employee_code: &str,
    month: &str,
) -> Result<MonthlySummary, KintaiError> {
    let (year, mon) = parse_month(month)?;
    let code = normalize_code(employee_code);

    let employees = store.list_employees()?;
    let known = employees
        .iter()
        .any(|e| normalize_code(&e.code) == code);
    if !known {
        // 未知の社員コードは致命扱いせず、警告付きの空サマリーに縮退する
        let e = KintaiError::EmployeeNotFound(employee_code.to_string());
        warn!("空サマリーに縮退: {}", e);
        return Ok(MonthlySummary {
            employee_code: code,
            month: month.to_string(),
            days: Vec::new(),
            totals: finalize_totals(MonthlyTotals::default()),
            warnings: vec![e.to_string()],
        });
    }

    let mut days = Vec::new();
    let mut warnings = Vec::new();

    for day in 1..=days_in_month(year, mon) {
        let date = format!("{}-{:02}-{:02}", year, mon, day);
        match master_for_date(store, &date) {
            Ok(rows) => {
                // コード重複時は先頭一致を採用
                if let Some(row) = rows
                    .into_iter()
                    .find(|r| normalize_code(&r.employee_code) == code)
                {
                    days.push(row);
                }
            }
            Err(e) => {
                warn!("{} の照合に失敗したため集計から除外: {}", date, e);
                warnings.push(format!("{}: {}", date, e));
            }
        }
    }

    let totals = sum_totals(&days);

    Ok(MonthlySummary {
        employee_code: code,
        month: month.to_string(),
        days,
        totals,
        warnings,
    })
}

/// 日別マスター行から月次合計を計算する（可換な加算、順序に依存しない）
/// Noneの項目（データなし）は加算対象から除外する
pub fn sum_totals(days: &[MasterRow]) -> MonthlyTotals {
    let mut totals = MonthlyTotals::default();
    for row in days {
        if let Some(m) = row.worked_minutes {
            totals.worked_minutes += m;
        }
        if let Some(m) = row.overtime_minutes {
            totals.overtime_minutes += m;
        }
        if let Some(m) = row.legal_overtime_minutes {
            totals.legal_overtime_minutes += m;
        }
        if let Some(m) = row.illegal_overtime_minutes {
            totals.illegal_overtime_minutes += m;
        }
        if let Some(m) = row.night_minutes {
            totals.night_minutes += m;
        }
        totals.late_early_minutes += row.late_minutes + row.early_minutes;
    }
    finalize_totals(totals)
}

fn finalize_totals(mut totals: MonthlyTotals) -> MonthlyTotals {
    totals.worked = format_hm(totals.worked_minutes);
    totals.overtime = format_hm(totals.overtime_minutes);
    totals.legal_overtime = format_hm(totals.legal_overtime_minutes);
    totals.illegal_overtime = format_hm(totals.illegal_overtime_minutes);
    totals.night = format_hm(totals.night_minutes);
    totals.late_early = format_hm(totals.late_early_minutes);
    totals
}

/// "YYYY-MM-DD" をパースする
/// 形式不一致も、形式は合うが暦として不正な値（13月など）もInvalidDateFormat
pub fn parse_iso_date(date: &str) -> Result<NaiveDate, KintaiError> {
    let bytes = date.as_bytes();
    let shape_ok = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !shape_ok {
        return Err(KintaiError::InvalidDateFormat(date.to_string()));
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| KintaiError::InvalidDateFormat(date.to_string()))
}

/// "YYYY-MM" をパースして (年, 月) を返す
pub fn parse_month(month: &str) -> Result<(i32, u32), KintaiError> {
    let bytes = month.as_bytes();
    let shape_ok = bytes.len() == 7
        && bytes[4] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || b.is_ascii_digit());
    if !shape_ok {
        return Err(KintaiError::InvalidDateFormat(month.to_string()));
    }
    let year: i32 = month[..4]
        .parse()
        .map_err(|_| KintaiError::InvalidDateFormat(month.to_string()))?;
    let mon: u32 = month[5..]
        .parse()
        .map_err(|_| KintaiError::InvalidDateFormat(month.to_string()))?;
    if !(1..=12).contains(&mon) {
        return Err(KintaiError::InvalidDateFormat(month.to_string()));
    }
    Ok((year, mon))
}

/// 月の日数を取得（うるう年対応）
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };

    match next_month.and_then(|d| d.pred_opt()) {
        Some(last) => chrono::Datelike::day(&last),
        None => 0,
    }
}
