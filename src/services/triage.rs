use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};
use serde::Serialize;

use crate::models::{Inquiry, InquiryStatus};
use crate::services::repository::{InquiryRepository, RepositoryError};

pub const EMPTY_MESSAGE: &str = "まだ問い合わせはありません。";
pub const NOT_SPECIFIED: &str = "指定なし";
pub const NO_DESCRIPTION: &str = "なし";

const DISPLAY_FORMAT: &str = "%Y/%-m/%-d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConsoleView {
    Empty { message: &'static str },
    Entries { entries: Vec<ConsoleEntry> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsoleEntry {
    pub id: String,
    pub status: InquiryStatus,
    pub badge_class: &'static str,
    pub submitted_at: String,
    pub name: String,
    pub phone: String,
    pub address: String,
    pub preferred_date: String,
    pub description: String,
    pub ai_estimate: Option<String>,
    pub image_url: Option<String>,
}

pub struct TriageConsole {
    offset: FixedOffset,
}

impl TriageConsole {
    pub fn new(utc_offset_hours: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix());
        Self { offset }
    }

    pub fn view(&self, repository: &InquiryRepository) -> ConsoleView {
        self.project(&repository.list())
    }

    pub fn set_status(
        &self,
        repository: &InquiryRepository,
        id: &str,
        status: InquiryStatus,
    ) -> Result<Inquiry, RepositoryError> {
        repository.update_status(id, status)
    }

    pub fn project(&self, inquiries: &[Inquiry]) -> ConsoleView {
        if inquiries.is_empty() {
            return ConsoleView::Empty {
                message: EMPTY_MESSAGE,
            };
        }

        let entries = inquiries.iter().rev().map(|i| self.entry(i)).collect();
        ConsoleView::Entries { entries }
    }

    fn entry(&self, inquiry: &Inquiry) -> ConsoleEntry {
        ConsoleEntry {
            id: inquiry.id.clone(),
            status: inquiry.status,
            badge_class: inquiry.status.badge_class(),
            submitted_at: inquiry
                .created_at
                .with_timezone(&self.offset)
                .format(DISPLAY_FORMAT)
                .to_string(),
            name: inquiry.name.clone(),
            phone: inquiry.phone.clone(),
            address: inquiry.address.clone(),
            preferred_date: inquiry
                .preferred_date
                .as_deref()
                .map(|raw| self.format_preferred_date(raw))
                .unwrap_or_else(|| NOT_SPECIFIED.to_string()),
            description: inquiry
                .items_description
                .clone()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| NO_DESCRIPTION.to_string()),
            ai_estimate: inquiry.ai_estimate.clone(),
            image_url: inquiry.image.as_ref().map(|i| i.preview_url.clone()),
        }
    }

    fn format_preferred_date(&self, raw: &str) -> String {
        let raw = raw.trim();
        if raw.is_empty() {
            return NOT_SPECIFIED.to_string();
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return dt.with_timezone(&self.offset).format(DISPLAY_FORMAT).to_string();
        }

        // Form inputs carry local wall-clock time without a zone
        for format in ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
                return dt.format(DISPLAY_FORMAT).to_string();
            }
        }

        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return date.format("%Y/%-m/%-d").to_string();
        }

        raw.to_string()
    }

    pub fn render_html(&self, view: &ConsoleView, token: &str) -> String {
        let mut body = String::new();

        match view {
            ConsoleView::Empty { message } => {
                body.push_str(&format!(
                    "<div class=\"empty\"><p>{}</p></div>\n",
                    escape_html(message)
                ));
            }
            ConsoleView::Entries { entries } => {
                for entry in entries {
                    body.push_str(&render_entry(entry));
                }
            }
        }

        format!(
            r#"<!DOCTYPE html>
<html lang="ja">
<head>
<meta charset="utf-8">
<title>管理画面 - 問い合わせ一覧</title>
</head>
<body>
<header><h1>管理画面 - 問い合わせ一覧</h1></header>
<main id="inquiries">
{body}</main>
<script>
const token = "{token}";
document.querySelectorAll("select[data-id]").forEach((select) => {{
  select.addEventListener("change", async () => {{
    const res = await fetch(`/api/admin/inquiries/${{select.dataset.id}}/status`, {{
      method: "POST",
      headers: {{ "Content-Type": "application/json", "Authorization": `Bearer ${{token}}` }},
      body: JSON.stringify({{ status: select.value }}),
    }});
    if (!res.ok) {{
      const err = await res.json().catch(() => ({{}}));
      alert(err.error || "変更を保存できませんでした。");
    }}
  }});
}});
new EventSource(`/api/admin/events?token=${{encodeURIComponent(token)}}`)
  .addEventListener("console", () => location.reload());
</script>
</body>
</html>
"#,
            body = body,
            token = escape_js(token),
        )
    }
}

fn render_entry(entry: &ConsoleEntry) -> String {
    let options: String = InquiryStatus::ALL
        .iter()
        .map(|s| {
            let selected = if *s == entry.status { " selected" } else { "" };
            format!(
                "<option value=\"{0}\"{1}>{0}</option>",
                s.as_str(),
                selected
            )
        })
        .collect();

    let estimate = entry
        .ai_estimate
        .as_deref()
        .map(|e| {
            format!(
                "<div class=\"ai-estimate\"><span>AI見積もり結果:</span> {}</div>\n",
                escape_html(e)
            )
        })
        .unwrap_or_default();

    let image = entry
        .image_url
        .as_deref()
        .map(|url| {
            format!(
                "<div class=\"image\"><img src=\"{}\" alt=\"Uploaded Junk\"></div>\n",
                escape_html(url)
            )
        })
        .unwrap_or_default();

    format!(
        r#"<article data-id="{id}">
<div class="meta"><span class="badge {badge}">{status}</span> <time>{submitted}</time></div>
<h3>{name} 様</h3>
<select data-id="{id}">{options}</select>
<p class="phone">{phone}</p>
<p class="address">{address}</p>
<p class="preferred-date">希望日時: {preferred}</p>
<div class="description"><span>備考・内容:</span> {description}</div>
{estimate}{image}</article>
"#,
        id = escape_html(&entry.id),
        badge = entry.badge_class,
        status = entry.status.as_str(),
        submitted = escape_html(&entry.submitted_at),
        name = escape_html(&entry.name),
        options = options,
        phone = escape_html(&entry.phone),
        address = escape_html(&entry.address),
        preferred = escape_html(&entry.preferred_date),
        description = escape_html(&entry.description),
        estimate = estimate,
        image = image,
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_js(s: &str) -> String {
    s.chars()
        .flat_map(|c| match c {
            '\\' | '"' | '\'' | '`' | '<' | '>' | '$' => format!("\\u{{{:04x}}}", c as u32)
                .chars()
                .collect::<Vec<_>>(),
            c if c.is_control() => format!("\\u{{{:04x}}}", c as u32).chars().collect(),
            c => vec![c],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;

    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{ImageAttachment, InquiryFields};

    fn console() -> TriageConsole {
        TriageConsole::new(9)
    }

    fn inquiry(name: &str, minute: u32) -> Inquiry {
        let mut inquiry = Inquiry::new(
            InquiryFields {
                name: name.to_string(),
                phone: "090-1234-5678".to_string(),
                address: "東京都渋谷区".to_string(),
                preferred_date: None,
                items_description: None,
            },
            None,
            None,
        );
        inquiry.created_at = Utc.with_ymd_and_hms(2025, 3, 1, 1, minute, 0).unwrap();
        inquiry
    }

    fn entries(view: ConsoleView) -> Vec<ConsoleEntry> {
        match view {
            ConsoleView::Entries { entries } => entries,
            ConsoleView::Empty { .. } => panic!("expected entries"),
        }
    }

    #[test]
    fn test_empty_repository_projects_empty_state() {
        let view = console().project(&[]);
        assert_eq!(
            view,
            ConsoleView::Empty {
                message: "まだ問い合わせはありません。"
            }
        );
    }

    #[test]
    fn test_entries_are_newest_first() {
        let list = vec![inquiry("A", 0), inquiry("B", 1), inquiry("C", 2)];
        let names: Vec<_> = entries(console().project(&list))
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["C", "B", "A"]);
    }

    #[test]
    fn test_missing_optionals_use_markers() {
        let entry = entries(console().project(&[inquiry("A", 0)])).remove(0);
        assert_eq!(entry.preferred_date, "指定なし");
        assert_eq!(entry.description, "なし");
        assert_eq!(entry.ai_estimate, None);
        assert_eq!(entry.image_url, None);
    }

    #[test]
    fn test_entry_fields() {
        let mut record = inquiry("A", 5);
        record.preferred_date = Some("2025-03-10T14:30".to_string());
        record.items_description = Some("冷蔵庫、洗濯機".to_string());
        record.ai_estimate = Some("1tトラックパック (25,000円-45,000円)".to_string());
        record.image = Some(ImageAttachment::from_bytes(b"abc", Some("image/png")));
        record.status = InquiryStatus::Reviewing;

        let entry = entries(console().project(&[record])).remove(0);
        assert_eq!(entry.submitted_at, "2025/3/1 10:05:00");
        assert_eq!(entry.preferred_date, "2025/3/10 14:30:00");
        assert_eq!(entry.description, "冷蔵庫、洗濯機");
        assert_eq!(entry.badge_class, "bg-blue-100 text-blue-800");
        assert_eq!(
            entry.ai_estimate.as_deref(),
            Some("1tトラックパック (25,000円-45,000円)")
        );
        assert_eq!(entry.image_url.as_deref(), Some("data:image/png;base64,YWJj"));
    }

    #[test]
    fn test_free_form_preferred_date_kept() {
        let c = console();
        assert_eq!(c.format_preferred_date("来週の土曜午後"), "来週の土曜午後");
        assert_eq!(c.format_preferred_date("2025-04-01"), "2025/4/1");
        assert_eq!(
            c.format_preferred_date("2025-04-01T00:00:00Z"),
            "2025/4/1 09:00:00"
        );
    }

    #[test]
    fn test_set_status_delegates_to_repository() {
        let repo = InquiryRepository::load(Arc::new(MemoryStore::new())).unwrap();
        let a = inquiry("A", 0);
        repo.append(a.clone()).unwrap();

        let console = console();
        console
            .set_status(&repo, &a.id, InquiryStatus::Completed)
            .unwrap();
        assert_eq!(entries(console.view(&repo))[0].status, InquiryStatus::Completed);
        assert!(matches!(
            console.set_status(&repo, "missing", InquiryStatus::Completed),
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[test]
    fn test_render_empty_state() {
        let c = console();
        let html = c.render_html(&c.project(&[]), "token");
        assert!(html.contains("まだ問い合わせはありません。"));
        assert!(!html.contains("<article"));
    }

    #[test]
    fn test_render_escapes_customer_input() {
        let mut record = inquiry("<script>alert(1)</script>", 0);
        record.items_description = Some("a & b".to_string());
        let c = console();
        let html = c.render_html(&c.project(&[record]), "token");
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt; 様"));
        assert!(html.contains("a &amp; b"));
        assert!(html.contains("<option value=\"PENDING\" selected>PENDING</option>"));
        assert!(html.contains("希望日時: 指定なし"));
    }

    #[test]
    fn test_render_handles_many_entries() {
        let list: Vec<_> = (0..50).map(|i| inquiry(&format!("客{i}"), i % 60)).collect();
        let c = console();
        let html = c.render_html(&c.project(&list), "token");
        assert_eq!(html.matches("<article").count(), 50);
    }

    #[test]
    fn test_escape_js_token() {
        assert_eq!(escape_js("abc"), "abc");
        assert_eq!(escape_js("a\"b"), "a\\u{0022}b");
    }
}
