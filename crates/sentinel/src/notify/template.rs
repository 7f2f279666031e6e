//! Message rendering and per-channel markup.

use crate::types::{NotifyKind, TemplateVars};
use std::error::Error as _;
use tera::{Context, Tera};

/// Built-in template for `kind`
pub fn default_template(kind: NotifyKind) -> &'static str {
    match kind {
        NotifyKind::Failover => {
            "<b>Failover</b>\n{{ new_master }} is now MASTER for {{ vip }}\nPrevious master: {{ old_master }}\nReason: {{ reason }}"
        }
        NotifyKind::Recovery => "<b>Recovery</b>\n{{ node }}: {{ status }}",
        NotifyKind::Fault => "<b>Fault</b>\n{{ node }}: {{ problem }}",
        NotifyKind::Startup => "<b>Sentinel started</b>\n{{ master }} is MASTER for {{ vip }}",
        NotifyKind::Dhcp => "<b>DHCP misconfiguration</b>\n{{ message }}",
    }
}

/// Render `template` with `vars`. Undefined variables are an error.
///
/// Templates are HTML; variable values are escaped before insertion.
pub fn render(template: &str, vars: &TemplateVars) -> Result<String, String> {
    let mut context = Context::new();
    for (key, value) in vars {
        context.insert(key, &escape_html(value));
    }

    Tera::one_off(template, &context, false).map_err(|e| {
        let mut message = e.to_string();
        let mut source = e.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    })
}

/// Escape the characters Telegram's HTML mode treats as markup
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn unescape_html(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

/// Remove `<...>` tags, keeping their content, and decode entities
pub fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let after = &rest[start..];
        match after.find('>') {
            Some(end) if is_tag(&after[1..end]) => rest = &after[end + 1..],
            _ => {
                out.push('<');
                rest = &after[1..];
            }
        }
    }

    out.push_str(rest);
    unescape_html(&out)
}

fn is_tag(inner: &str) -> bool {
    let name = inner.strip_prefix('/').unwrap_or(inner);
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Convert `<b>`/`<i>` to Markdown and drop any other tags
pub fn to_markdown(text: &str) -> String {
    let converted = text
        .replace("<b>", "**")
        .replace("</b>", "**")
        .replace("<i>", "*")
        .replace("</i>", "*");
    strip_markup(&converted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> TemplateVars {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_substitutes_variables() {
        let rendered = render(
            "{{ new_master }} took over ({{ reason }})",
            &vars(&[("new_master", "Secondary"), ("reason", "offline")]),
        )
        .unwrap();
        assert_eq!(rendered, "Secondary took over (offline)");
    }

    #[test]
    fn test_render_missing_variable_fails() {
        let err = render("{{ new_master }} via {{ missing }}", &vars(&[("new_master", "Secondary")]))
            .unwrap_err();
        assert!(err.contains("missing"), "{err}");
    }

    #[test]
    fn test_default_templates_render_with_tracker_vars() {
        let all = vars(&[
            ("new_master", "Secondary"),
            ("old_master", "Primary"),
            ("reason", "offline"),
            ("node", "Primary"),
            ("status", "back online"),
            ("problem", "went offline"),
            ("master", "Primary"),
            ("message", "DHCP misconfiguration"),
            ("vip", "10.0.0.100"),
        ]);

        for kind in NotifyKind::ALL {
            assert!(render(default_template(kind), &all).is_ok(), "{kind}");
        }
    }

    #[test]
    fn test_render_escapes_values_not_template() {
        let rendered = render(
            "<b>Fault</b>\n{{ node }}: {{ problem }}",
            &vars(&[("node", "dns<1> & co"), ("problem", "went offline")]),
        )
        .unwrap();
        assert_eq!(rendered, "<b>Fault</b>\ndns&lt;1&gt; &amp; co: went offline");

        // plain-text and Markdown channels see the original characters
        assert_eq!(strip_markup(&rendered), "Fault\ndns<1> & co: went offline");
        assert_eq!(to_markdown(&rendered), "**Fault**\ndns<1> & co: went offline");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a & <b>"), "a &amp; &lt;b&gt;");
        assert_eq!(escape_html("Primary"), "Primary");
        assert_eq!(strip_markup(&escape_html("&lt; literal")), "&lt; literal");
    }

    #[test]
    fn test_strip_markup() {
        assert_eq!(strip_markup("<b>Failover</b>\nSecondary"), "Failover\nSecondary");
        assert_eq!(strip_markup("a < b and c > d"), "a < b and c > d");
        assert_eq!(strip_markup("<i>x</i><br>"), "x");
        assert_eq!(strip_markup("unterminated <b"), "unterminated <b");
    }

    #[test]
    fn test_to_markdown() {
        assert_eq!(to_markdown("<b>Fault</b> on <i>Primary</i>"), "**Fault** on *Primary*");
        assert_eq!(to_markdown("<u>plain</u>"), "plain");
    }
}
