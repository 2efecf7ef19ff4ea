use chrono::{Duration, NaiveDateTime, Timelike};
use tracing::warn;

/// 所定労働時間（8時間）
pub const STANDARD_SHIFT_MINUTES: i64 = 480;
/// 法定内残業の上限（8時間〜10時間30分の帯、幅150分）
pub const LEGAL_OVERTIME_BAND_END: i64 = 630;
/// 深夜帯の開始時刻（22:00）
const NIGHT_START_HOUR: u32 = 22;
/// 深夜帯の終了時刻（05:00、この時刻は含まない）
const NIGHT_END_HOUR: u32 = 5;

/// 1日分の勤怠計算結果
/// Noneは「データなし」。表示系は「—」、集計系は「0:00」で描画される
/// （集計側は「0:00」を加算対象のゼロ、「—」を集計除外として扱うため統一しない）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DayMetrics {
    pub worked_minutes: Option<i64>,
    pub overtime_minutes: Option<i64>,
    pub legal_overtime_minutes: Option<i64>,
    pub illegal_overtime_minutes: Option<i64>,
    pub night_minutes: Option<i64>,
}

/// 出退勤時刻ペアから勤怠計算結果を導出する
/// どちらかが欠けている・パース不能な場合は全項目「データなし」に落とす
/// 純粋関数であり副作用を持たない
pub fn calculate(clock_in: Option<&str>, clock_out: Option<&str>) -> DayMetrics {
    let start = match clock_in.and_then(parse_timestamp) {
        Some(t) => t,
        None => return DayMetrics::default(),
    };
    let end = match clock_out.and_then(parse_timestamp) {
        Some(t) => t,
        None => return DayMetrics::default(),
    };

    let worked = worked_minutes(start, end);
    let overtime = (worked - STANDARD_SHIFT_MINUTES).max(0);
    // 法定内残業: 480〜630分の帯（上限150分）
    let legal = overtime.min(LEGAL_OVERTIME_BAND_END - STANDARD_SHIFT_MINUTES);
    // 法定外残業: 630分超過分
    let illegal = (worked - LEGAL_OVERTIME_BAND_END).max(0);
    let night = night_minutes(start, worked);

    DayMetrics {
        worked_minutes: Some(worked),
        overtime_minutes: Some(overtime),
        legal_overtime_minutes: Some(legal),
        illegal_overtime_minutes: Some(illegal),
        night_minutes: Some(night),
    }
}

/// 実働分数を計算（秒以下切り捨て、負値は0にクランプ）
fn worked_minutes(start: NaiveDateTime, end: NaiveDateTime) -> i64 {
    let minutes = end.signed_duration_since(start).num_minutes();
    if minutes < 0 {
        // 退勤が出勤より前: クランプして継続
        warn!("退勤時刻が出勤時刻より前のため0分として扱う: {} -> {}", start, end);
        return 0;
    }
    minutes
}

/// 深夜帯[22:00, 05:00)に含まれる分数を計算
/// 1分刻みで区間を走査する（勤務は最長24時間に制限されるため最大1440回）
fn night_minutes(start: NaiveDateTime, worked: i64) -> i64 {
    let total = worked.min(1440);
    let mut night = 0;
    for i in 0..total {
        let hour = (start + Duration::minutes(i)).hour();
        if hour >= NIGHT_START_HOUR || hour < NIGHT_END_HOUR {
            night += 1;
        }
    }
    night
}

/// タイムスタンプ文字列をパース
/// "YYYY-MM-DD HH:MM:SS" と ISO 8601 の "T" 区切りの両方を受け付ける
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

/// 分数を "H:MM" 形式に整形
pub fn format_hm(minutes: i64) -> String {
    format!("{}:{:02}", minutes / 60, minutes % 60)
}

/// 表示系メトリクスの描画（データなしは「—」）
pub fn format_hm_or_dash(minutes: Option<i64>) -> String {
    match minutes {
        Some(m) => format_hm(m),
        None => "—".to_string(),
    }
}

/// 集計系メトリクスの描画（データなしは「0:00」）
pub fn format_hm_or_zero(minutes: Option<i64>) -> String {
    match minutes {
        Some(m) => format_hm(m),
        None => "0:00".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calc(start: &str, end: &str) -> DayMetrics {
        calculate(Some(start), Some(end))
    }

    #[test]
    fn test_scenario_9h() {
        // 9時間勤務: 実働9:00、残業1:00、法定内1:00、法定外0:00
        let m = calc("2024-06-03 09:00:00", "2024-06-03 18:00:00");
        assert_eq!(m.worked_minutes, Some(540));
        assert_eq!(m.overtime_minutes, Some(60));
        assert_eq!(m.legal_overtime_minutes, Some(60));
        assert_eq!(m.illegal_overtime_minutes, Some(0));
        assert_eq!(format_hm_or_dash(m.worked_minutes), "9:00");
        assert_eq!(format_hm_or_zero(m.overtime_minutes), "1:00");
    }

    #[test]
    fn test_scenario_12h() {
        // 12時間勤務: 実働12:00、残業4:00、法定内2:30、法定外1:30
        let m = calc("2024-06-03 09:00:00", "2024-06-03 21:00:00");
        assert_eq!(m.worked_minutes, Some(720));
        assert_eq!(m.overtime_minutes, Some(240));
        assert_eq!(m.legal_overtime_minutes, Some(150));
        assert_eq!(m.illegal_overtime_minutes, Some(90));
        assert_eq!(format_hm_or_zero(m.legal_overtime_minutes), "2:30");
        assert_eq!(format_hm_or_zero(m.illegal_overtime_minutes), "1:30");
    }

    #[test]
    fn test_night_window() {
        // 20:00〜23:30 → 深夜は22:00〜23:30の1:30
        let m = calc("2024-06-03 20:00:00", "2024-06-03 23:30:00");
        assert_eq!(m.night_minutes, Some(90));
        assert_eq!(format_hm_or_zero(m.night_minutes), "1:30");
    }

    #[test]
    fn test_night_crosses_midnight() {
        // 21:00〜翌6:00 → 22:00〜05:00の7時間が深夜
        let m = calc("2024-06-03 21:00:00", "2024-06-04 06:00:00");
        assert_eq!(m.worked_minutes, Some(540));
        assert_eq!(m.night_minutes, Some(420));
    }

    #[test]
    fn test_night_is_pure() {
        let a = calc("2024-06-03 20:00:00", "2024-06-04 02:00:00");
        let b = calc("2024-06-03 20:00:00", "2024-06-04 02:00:00");
        assert_eq!(a, b);
    }

    #[test]
    fn test_equal_timestamps() {
        // 出勤=退勤: 全項目ゼロ、負値は出ない
        let m = calc("2024-06-03 09:00:00", "2024-06-03 09:00:00");
        assert_eq!(m.worked_minutes, Some(0));
        assert_eq!(m.overtime_minutes, Some(0));
        assert_eq!(m.legal_overtime_minutes, Some(0));
        assert_eq!(m.illegal_overtime_minutes, Some(0));
        assert_eq!(m.night_minutes, Some(0));
    }

    #[test]
    fn test_negative_duration_clamped() {
        // 退勤が出勤より前: 0にクランプ
        let m = calc("2024-06-03 18:00:00", "2024-06-03 09:00:00");
        assert_eq!(m.worked_minutes, Some(0));
        assert_eq!(m.night_minutes, Some(0));
    }

    #[test]
    fn test_missing_clock_out() {
        let m = calculate(Some("2024-06-03 09:00:00"), None);
        assert_eq!(m, DayMetrics::default());
        assert_eq!(format_hm_or_dash(m.worked_minutes), "—");
        assert_eq!(format_hm_or_zero(m.overtime_minutes), "0:00");
    }

    #[test]
    fn test_malformed_timestamp_degrades() {
        // パース不能な時刻は例外を出さず「データなし」に落ちる
        let m = calculate(Some("not-a-time"), Some("2024-06-03 18:00:00"));
        assert_eq!(m, DayMetrics::default());
    }

    #[test]
    fn test_iso_t_separator() {
        let m = calc("2024-06-03T09:00:00", "2024-06-03T17:00:00");
        assert_eq!(m.worked_minutes, Some(480));
    }

    #[test]
    fn test_overtime_identities() {
        // legal + illegal <= overtime、worked <= 630 のときは等号が成立
        for (start, end) in [
            ("2024-06-03 09:00:00", "2024-06-03 17:00:00"), // 8h
            ("2024-06-03 09:00:00", "2024-06-03 19:30:00"), // 10.5h
            ("2024-06-03 09:00:00", "2024-06-03 22:00:00"), // 13h
        ] {
            let m = calc(start, end);
            let worked = m.worked_minutes.unwrap();
            let overtime = m.overtime_minutes.unwrap();
            let legal = m.legal_overtime_minutes.unwrap();
            let illegal = m.illegal_overtime_minutes.unwrap();
            assert_eq!(overtime + worked.min(480), worked);
            assert!(legal + illegal <= overtime);
            if worked <= 630 {
                assert_eq!(illegal, 0);
                assert_eq!(legal, overtime);
            }
        }
    }

    #[test]
    fn test_format_hm() {
        assert_eq!(format_hm(0), "0:00");
        assert_eq!(format_hm(90), "1:30");
        assert_eq!(format_hm(480), "8:00");
        assert_eq!(format_hm(615), "10:15");
    }
}
