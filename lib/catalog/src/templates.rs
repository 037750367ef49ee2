//! Email templates with `{{variable}}` placeholders.
//!
//! Values are HTML-escaped on substitution. Placeholders with no matching
//! value are left in place.

use chrono::{DateTime, Datelike, Utc};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Name of the purchase confirmation template.
pub const ORDER_CONFIRMATION: &str = "order-confirmation";
/// Name of the template sent to a question's asker when someone answers.
pub const QUESTION_REPLY: &str = "question-reply";

const ORDER_CONFIRMATION_HTML: &str = r#"<!DOCTYPE html>
<html lang="vi">
  <body style="font-family: Arial, sans-serif; color: #222">
    <h2>Xác nhận đơn hàng</h2>
    <p>Xin chào {{user_name}},</p>
    <p>Cảm ơn bạn đã mua khóa học. Chi tiết đơn hàng:</p>
    <table cellpadding="6">
      <tr><td>Mã đơn hàng</td><td>{{order_id}}</td></tr>
      <tr><td>Khóa học</td><td>{{course_name}}</td></tr>
      <tr><td>Giá</td><td>{{price}}</td></tr>
      <tr><td>Ngày</td><td>{{date}}</td></tr>
    </table>
  </body>
</html>
"#;

const QUESTION_REPLY_HTML: &str = r#"<!DOCTYPE html>
<html lang="vi">
  <body style="font-family: Arial, sans-serif; color: #222">
    <h2>Câu hỏi của bạn có trả lời mới</h2>
    <p>Xin chào {{name}},</p>
    <p>Có trả lời mới cho câu hỏi của bạn trong bài học <strong>{{title}}</strong>.</p>
    <p>Hãy đăng nhập để xem chi tiết.</p>
  </body>
</html>
"#;

/// A registered template.
#[derive(Debug, Clone)]
pub struct Template {
    pub name: String,
    pub html: String,
}

/// Renders named templates.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    templates: HashMap<String, Template>,
}

impl TemplateRenderer {
    /// Creates a renderer with no templates.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// Registers or replaces a template.
    pub fn register(&mut self, name: impl Into<String>, html: impl Into<String>) {
        let name = name.into();
        self.templates.insert(
            name.clone(),
            Template {
                name,
                html: html.into(),
            },
        );
    }

    /// Returns true if a template with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Renders a template, or `None` if no such template is registered.
    #[must_use]
    pub fn render(&self, name: &str, data: &HashMap<String, JsonValue>) -> Option<String> {
        let template = self.templates.get(name)?;
        let mut html = template.html.clone();
        for (key, value) in data {
            let placeholder = format!("{{{{{key}}}}}");
            let replacement = match value {
                JsonValue::String(s) => escape_html(s),
                JsonValue::Number(n) => n.to_string(),
                JsonValue::Bool(b) => b.to_string(),
                JsonValue::Null => String::new(),
                other => escape_html(&other.to_string()),
            };
            html = html.replace(&placeholder, &replacement);
        }
        Some(html)
    }
}

impl Default for TemplateRenderer {
    /// The renderer with the built-in templates.
    fn default() -> Self {
        let mut renderer = Self::empty();
        renderer.register(ORDER_CONFIRMATION, ORDER_CONFIRMATION_HTML);
        renderer.register(QUESTION_REPLY, QUESTION_REPLY_HTML);
        renderer
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Formats a whole-dong amount the way Vietnamese receipts do, e.g.
/// `100.000 ₫`.
#[must_use]
pub fn format_vnd(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    let sign = if amount < 0 { "-" } else { "" };
    format!("{sign}{grouped} ₫")
}

/// Formats a date in Vietnamese long form, e.g. `18 tháng 10, 2026`.
#[must_use]
pub fn format_vi_date(at: DateTime<Utc>) -> String {
    format!("{} tháng {}, {}", at.day(), at.month(), at.year())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn data(pairs: &[(&str, JsonValue)]) -> HashMap<String, JsonValue> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn builtin_templates_are_registered() {
        let renderer = TemplateRenderer::default();
        assert!(renderer.contains(ORDER_CONFIRMATION));
        assert!(renderer.contains(QUESTION_REPLY));
    }

    #[test]
    fn render_substitutes_values() {
        let renderer = TemplateRenderer::default();
        let html = renderer
            .render(
                QUESTION_REPLY,
                &data(&[
                    ("name", serde_json::json!("Ann")),
                    ("title", serde_json::json!("Traits")),
                ]),
            )
            .expect("registered");
        assert!(html.contains("Xin chào Ann"));
        assert!(html.contains("<strong>Traits</strong>"));
    }

    #[test]
    fn render_escapes_html() {
        let mut renderer = TemplateRenderer::empty();
        renderer.register("t", "<p>{{v}}</p>");
        let html = renderer
            .render("t", &data(&[("v", serde_json::json!("<b>&</b>"))]))
            .expect("registered");
        assert_eq!(html, "<p>&lt;b&gt;&amp;&lt;/b&gt;</p>");
    }

    #[test]
    fn render_numbers() {
        let mut renderer = TemplateRenderer::empty();
        renderer.register("t", "{{count}} items");
        let html = renderer
            .render("t", &data(&[("count", serde_json::json!(5))]))
            .expect("registered");
        assert_eq!(html, "5 items");
    }

    #[test]
    fn unknown_template_is_none() {
        let renderer = TemplateRenderer::default();
        assert!(renderer.render("nope", &HashMap::new()).is_none());
    }

    #[test]
    fn vnd_grouping() {
        assert_eq!(format_vnd(0), "0 ₫");
        assert_eq!(format_vnd(999), "999 ₫");
        assert_eq!(format_vnd(100_000), "100.000 ₫");
        assert_eq!(format_vnd(1_250_000), "1.250.000 ₫");
        assert_eq!(format_vnd(-5_000), "-5.000 ₫");
    }

    #[test]
    fn vietnamese_long_date() {
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();
        assert_eq!(format_vi_date(at), "18 tháng 10, 2026");
    }
}
