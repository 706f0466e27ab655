use rebel::core::{Finding, OsInfo, Report, Termination, remediation};

#[test]
fn report_json_matches_golden() {
    let report = Report {
        schema_version: "1.0".to_string(),
        tool_version: "0.1.0".to_string(),
        os: OsInfo {
            name: "Windows".to_string(),
            version: "10".to_string(),
        },
        started_at: "2026-01-01T00:00:00Z".to_string(),
        ended_at: "2026-01-01T00:00:42Z".to_string(),
        termination: Termination::Completed,
        findings: vec![
            Finding::info("ごみ箱を空にしました"),
            Finding::danger(
                "古い Java Runtime が検出されました（インストール済み: 1.6.0_20 / 最新: 1.8.0_401）",
                remediation::JAVA_OUTDATED,
            ),
        ],
    };

    let actual = serde_json::to_value(&report).expect("serialize");
    let expected = serde_json::json!({
        "schema_version": "1.0",
        "tool_version": "0.1.0",
        "os": {"name": "Windows", "version": "10"},
        "started_at": "2026-01-01T00:00:00Z",
        "ended_at": "2026-01-01T00:00:42Z",
        "termination": "completed",
        "findings": [
            {"severity": "Info", "message": "ごみ箱を空にしました"},
            {
                "severity": "Danger",
                "message": "古い Java Runtime が検出されました（インストール済み: 1.6.0_20 / 最新: 1.8.0_401）",
                "remediation_code": remediation::JAVA_OUTDATED
            }
        ]
    });
    assert_eq!(actual, expected);

    let back: Report = serde_json::from_value(actual).expect("deserialize");
    assert_eq!(back, report);
}
