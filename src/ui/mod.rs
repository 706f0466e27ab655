use anyhow::Error;
use std::io::{self, Write};
use std::time::Duration;
use unicode_width::UnicodeWidthChar;

use crate::core::{Finding, Report, Severity};
use crate::engine::ProgressEvent;

#[derive(Debug, Clone)]
pub struct UiConfig {
    pub color: bool,
    pub stderr_is_tty: bool,
    pub max_table_rows: usize,
    pub quiet: bool,
}

pub fn eprintln_error(err: &Error) {
    let mut stderr = io::stderr().lock();
    let _ = writeln!(stderr, "エラー:");
    let _ = writeln!(stderr, "  {err}");

    let mut causes = err.chain().skip(1).peekable();
    if causes.peek().is_some() {
        let _ = writeln!(stderr, "原因:");
        for cause in causes {
            let _ = writeln!(stderr, "  - {cause}");
        }
    }

    let _ = writeln!(stderr, "次に:");
    let _ = writeln!(
        stderr,
        "  - 詳細を見るには `--verbose` を付けて再実行してください"
    );
    let _ = writeln!(
        stderr,
        "  - 利用可能なコマンド/オプションは `rebel --help` を参照してください"
    );
}

pub fn print_report(report: &Report, duration: Duration, cfg: &UiConfig, articles_url: &str) {
    if cfg.quiet {
        return;
    }
    let mut out = io::stdout().lock();
    write_report(&mut out, report, duration, cfg, articles_url);
}

fn write_report(
    out: &mut dyn Write,
    report: &Report,
    duration: Duration,
    cfg: &UiConfig,
    articles_url: &str,
) {
    let _ = writeln!(out, "開始: {}", report.started_at);
    let _ = writeln!(out, "終了: {}", report.ended_at);
    let _ = writeln!(out, "所要時間: {}", format_duration(duration));
    let _ = writeln!(out);

    let total = report.findings.len();
    if total == 0 {
        let _ = writeln!(out, "所見はありません。");
        return;
    }

    let rows = cfg.max_table_rows.max(1).min(total);
    if total > rows {
        let _ = writeln!(out, "所見（{rows}件表示 / 全{total}件）:");
    } else {
        let _ = writeln!(out, "所見（{rows}件）:");
    }
    print_findings_table(out, &report.findings, rows, cfg.color);

    let links: Vec<(&Finding, String)> = report
        .findings
        .iter()
        .take(rows)
        .filter_map(|f| f.article_url(articles_url).map(|u| (f, u)))
        .collect();
    if !links.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "対処方法:");
        for (finding, url) in links {
            let _ = writeln!(
                out,
                "- [{}] {}",
                format_severity(finding.severity, cfg.color),
                truncate_middle(&finding.message, 60)
            );
            let _ = writeln!(out, "  {url}");
        }
    }
}

pub fn print_update_notice(own: &str, latest: &str, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }
    let mut out = io::stdout().lock();
    let _ = writeln!(
        out,
        "新しいバージョンがあります: {own} → {latest}（https://www.getrebel.com からダウンロードしてください）"
    );
}

fn print_findings_table(out: &mut dyn Write, findings: &[Finding], rows: usize, color: bool) {
    let label_severity = "重要度";
    let label_message = "内容";

    let severity_w = findings
        .iter()
        .take(rows)
        .map(|f| visible_width_ansi(severity_label(f.severity)))
        .max()
        .unwrap_or(0)
        .max(visible_width_ansi(label_severity));
    let message_w = visible_width_ansi(label_message).max(5);

    let _ = writeln!(
        out,
        "{}  {}",
        pad_end_display(label_severity, severity_w),
        label_message
    );
    let _ = writeln!(out, "{}  {}", "-".repeat(severity_w), "-".repeat(message_w));

    for finding in findings.iter().take(rows) {
        let severity = pad_end_display(&format_severity(finding.severity, color), severity_w);
        let _ = writeln!(out, "{severity}  {}", finding.message);
    }
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "情報",
        Severity::Warning => "警告",
        Severity::Danger => "危険",
    }
}

fn format_severity(severity: Severity, color: bool) -> String {
    let s = severity_label(severity);
    if !color {
        return s.to_string();
    }

    let code = match severity {
        Severity::Info => "32",
        Severity::Warning => "33",
        Severity::Danger => "31",
    };
    format!("\x1b[{code}m{s}\x1b[0m")
}

fn truncate_middle(s: &str, max_chars: usize) -> String {
    let len = s.chars().count();
    if len <= max_chars {
        return s.to_string();
    }

    let keep = max_chars.saturating_sub(3);
    let left = keep / 2;
    let right = keep.saturating_sub(left);

    let prefix: String = s.chars().take(left).collect();
    let suffix: String = s.chars().skip(len - right).collect();

    format!("{prefix}...{suffix}")
}

fn pad_end_display(s: &str, width: usize) -> String {
    let w = visible_width_ansi(s);
    if w >= width {
        return s.to_string();
    }
    format!("{s}{}", " ".repeat(width - w))
}

fn visible_width_ansi(s: &str) -> usize {
    let mut width: usize = 0;
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' && chars.peek() == Some(&'[') {
            let _ = chars.next();
            for ch2 in chars.by_ref() {
                if ch2 == 'm' {
                    break;
                }
            }
            continue;
        }
        width = width.saturating_add(UnicodeWidthChar::width(ch).unwrap_or(0));
    }
    width
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 60 {
        format!("{}分{}秒", secs / 60, secs % 60)
    } else {
        format!("{:.1}秒", d.as_secs_f64())
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    const TB: f64 = GB * 1024.0;

    let b = bytes as f64;
    if b < KB {
        return format!("{bytes} B");
    }
    if b < MB {
        return format!("{:.1} KiB", b / KB);
    }
    if b < GB {
        return format!("{:.1} MiB", b / MB);
    }
    if b < TB {
        return format!("{:.1} GiB", b / GB);
    }
    format!("{:.1} TiB", b / TB)
}

pub struct RunProgress {
    bar: Option<indicatif::ProgressBar>,
}

impl RunProgress {
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            return Self { bar: None };
        }
        let pb = indicatif::ProgressBar::new(100);
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        if let Ok(style) = indicatif::ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message("準備中...");
        pb.enable_steady_tick(Duration::from_millis(120));
        Self { bar: Some(pb) }
    }

    pub fn update(&self, ev: &ProgressEvent) {
        if let Some(pb) = &self.bar {
            pb.set_position(u64::from(ev.percent));
            pb.set_message(ev.label.clone());
        }
    }

    pub fn finish(self) {
        if let Some(pb) = self.bar {
            pb.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{OsInfo, Termination, remediation};

    fn cfg(rows: usize) -> UiConfig {
        UiConfig {
            color: false,
            stderr_is_tty: false,
            max_table_rows: rows,
            quiet: false,
        }
    }

    fn report(findings: Vec<Finding>) -> Report {
        Report {
            schema_version: "1.0".to_string(),
            tool_version: "0.1.0".to_string(),
            os: OsInfo {
                name: "Linux".to_string(),
                version: "6".to_string(),
            },
            started_at: "2026-01-01T00:00:00Z".to_string(),
            ended_at: "2026-01-01T00:00:05Z".to_string(),
            termination: Termination::Completed,
            findings,
        }
    }

    fn render(report: &Report, rows: usize) -> String {
        let mut buf = Vec::new();
        write_report(
            &mut buf,
            report,
            Duration::from_secs(5),
            &cfg(rows),
            "http://www.getrebel.com/articles",
        );
        String::from_utf8(buf).expect("utf8")
    }

    #[test]
    fn report_lists_findings_in_order_with_links() {
        let r = report(vec![
            Finding::info("ごみ箱を空にしました"),
            Finding::warning("空き容量が少なくなっています", remediation::LOW_FREE_SPACE),
        ]);
        let text = render(&r, 50);
        let info = text.find("ごみ箱を空にしました").expect("info row");
        let warn = text.find("空き容量が少なくなっています").expect("warning row");
        assert!(info < warn);
        assert!(text.contains("http://www.getrebel.com/articles/low-free-space"));
        assert!(text.contains("警告"));
        assert!(!text.contains('\x1b'));
    }

    #[test]
    fn report_truncates_to_max_rows() {
        let r = report(vec![
            Finding::info("a"),
            Finding::info("b"),
            Finding::info("c"),
        ]);
        let text = render(&r, 2);
        assert!(text.contains("2件表示 / 全3件"), "{text}");
    }

    #[test]
    fn empty_report_says_so() {
        let text = render(&report(vec![]), 10);
        assert!(text.contains("所見はありません"));
    }

    #[test]
    fn visible_width_ignores_ansi_and_counts_wide_chars() {
        assert_eq!(visible_width_ansi("\x1b[31m危険\x1b[0m"), 4);
        assert_eq!(visible_width_ansi("ab"), 2);
    }

    #[test]
    fn format_bytes_uses_binary_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GiB");
    }

    #[test]
    fn truncate_middle_keeps_both_ends() {
        assert_eq!(truncate_middle("abcdefghij", 7), "ab...ij");
        assert_eq!(truncate_middle("short", 10), "short");
    }
}
