use crate::tether::model::RemoteRecord;

/// Produces the companion document written into a newly created folder.
pub trait SummaryRenderer {
    fn render_summary(&self, record: &RemoteRecord) -> String;
}

/// Default renderer: YAML front matter carrying the link, then a short
/// overview section.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownSummary;

fn yaml_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

impl SummaryRenderer for MarkdownSummary {
    fn render_summary(&self, record: &RemoteRecord) -> String {
        let mut out = String::new();
        out.push_str("---\n");
        out.push_str("tether_summary: 1\n");
        out.push_str(&format!("record_id: {}\n", yaml_quote(&record.id)));
        out.push_str(&format!("title: {}\n", yaml_quote(&record.title)));
        out.push_str(&format!(
            "status: {}\n",
            yaml_quote(record.effective_status())
        ));
        if !record.status_color.trim().is_empty() {
            out.push_str(&format!(
                "status_color: {}\n",
                yaml_quote(&record.status_color)
            ));
        }
        out.push_str("---\n\n");
        out.push_str(&format!("# {}\n\n", record.title.trim()));
        out.push_str(&format!("- Status: {}\n", record.effective_status()));
        out.push_str(&format!("- Remote id: `{}`\n", record.id));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_quotes_front_matter_values() {
        let record = RemoteRecord::new("42", "Bob's Shop", "", "#ff0000");
        let rendered = MarkdownSummary.render_summary(&record);
        assert!(rendered.starts_with("---\ntether_summary: 1\n"));
        assert!(rendered.contains("title: 'Bob''s Shop'\n"));
        assert!(rendered.contains("status: 'No Status'\n"));
        assert!(rendered.contains("status_color: '#ff0000'\n"));
        assert!(rendered.contains("# Bob's Shop\n"));
    }
}
