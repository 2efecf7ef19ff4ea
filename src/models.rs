use serde::{Deserialize, Serialize};

/// 従業員情報
/// 結合キーは`id`ではなく正規化済みの`code`（社員コード）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub department_id: Option<i64>,
    pub is_active: bool,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// 部門情報
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Department {
    pub id: i64,
    pub name: String,
}

/// 部門未設定時の表示名
pub const UNASSIGNED_DEPARTMENT: &str = "未設定";

/// 1日分の勤怠記録
/// 自然キーは (employee_code, date)。1人1日につき最大1レコード
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub employee_code: String,
    /// "YYYY-MM-DD" 形式
    pub date: String,
    /// 出勤時刻 "YYYY-MM-DD HH:MM:SS"（未打刻はNone）
    pub clock_in: Option<String>,
    /// 退勤時刻 "YYYY-MM-DD HH:MM:SS"（未打刻はNone）
    pub clock_out: Option<String>,
    #[serde(default)]
    pub late_minutes: i64,
    #[serde(default)]
    pub early_minutes: i64,
    #[serde(default)]
    pub overtime_minutes: i64,
    #[serde(default)]
    pub night_minutes: i64,
    #[serde(default)]
    pub remark: String,
}

impl AttendanceRecord {
    pub fn empty(employee_code: &str, date: &str) -> Self {
        Self {
            employee_code: employee_code.to_string(),
            date: date.to_string(),
            clock_in: None,
            clock_out: None,
            late_minutes: 0,
            early_minutes: 0,
            overtime_minutes: 0,
            night_minutes: 0,
            remark: String::new(),
        }
    }
}

/// 備考レコード
/// AttendanceRecord.remarkとは別系統の備考ストア（統合しない）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Remark {
    pub employee_code: String,
    pub date: String,
    pub remark: String,
}

/// 社員コードを正規化する
/// 全角英数→半角、空白除去、大文字化。一意性判定はこの正規化後の値で行う
pub fn normalize_code(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            // 全角英数記号（U+FF01〜U+FF5E）を半角へ
            '\u{FF01}'..='\u{FF5E}' => {
                char::from_u32(c as u32 - 0xFEE0).unwrap_or(c)
            }
            // 全角スペース
            '\u{3000}' => ' ',
            _ => c,
        })
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_code_fullwidth() {
        assert_eq!(normalize_code("ａｂｃ１２３"), "ABC123");
        assert_eq!(normalize_code("ＥＭＰ００１"), "EMP001");
    }

    #[test]
    fn test_normalize_code_whitespace() {
        assert_eq!(normalize_code(" e 001 "), "E001");
        assert_eq!(normalize_code("e　001"), "E001"); // 全角スペース
        assert_eq!(normalize_code("e\t001\n"), "E001");
    }

    #[test]
    fn test_normalize_code_case() {
        assert_eq!(normalize_code("abc"), normalize_code("ABC"));
        assert_eq!(normalize_code("ｅｍｐ００１"), normalize_code("EMP001"));
    }

    #[test]
    fn test_normalize_code_passthrough() {
        assert_eq!(normalize_code("E001"), "E001");
        assert_eq!(normalize_code(""), "");
    }
}
