//! User-facing reply text built from the configurable templates.

use shared::domain::NoteType;

use crate::config::ResponseTemplates;

#[derive(Debug, Clone)]
pub struct ResponseManager {
    templates: ResponseTemplates,
}

impl ResponseManager {
    pub fn new(templates: ResponseTemplates) -> Self {
        Self { templates }
    }

    /// Substitutes `{name}` placeholders. A blank template yields `None`,
    /// meaning no reply; placeholders without a value are kept verbatim.
    pub fn render(template: &str, values: &[(&str, &str)]) -> Option<String> {
        if template.trim().is_empty() {
            return None;
        }
        let mut rendered = template.to_string();
        for (name, value) in values {
            rendered = rendered.replace(&format!("{{{name}}}"), value);
        }
        Some(rendered)
    }

    pub fn flash_start(&self, timeout_secs: u64) -> Option<String> {
        Self::render(
            &self.templates.flash_start,
            &[("timeout", &timeout_secs.to_string())],
        )
    }

    pub fn flash_add(&self) -> Option<String> {
        Self::render(&self.templates.flash_add, &[])
    }

    pub fn flash_saved<S: AsRef<str>>(&self, tags: &[S]) -> Option<String> {
        let tags_text = if tags.is_empty() {
            String::new()
        } else {
            let names: Vec<&str> = tags.iter().map(AsRef::as_ref).collect();
            format!(", tags: [{}]", names.join(", "))
        };
        Self::render(&self.templates.flash_saved, &[("tags", &tags_text)])
    }

    pub fn todo_created(&self, content: &str, category: Option<&str>) -> Option<String> {
        Self::render(
            &self.templates.todo_created,
            &[("content", content), ("category", category.unwrap_or_default())],
        )
    }

    pub fn todo_completed(&self, id: &str, content: &str) -> Option<String> {
        Self::render(
            &self.templates.todo_completed,
            &[("id", id), ("content", content)],
        )
    }

    pub fn todo_edited(&self, id: &str, content: &str) -> Option<String> {
        Self::render(
            &self.templates.todo_edited,
            &[("id", id), ("content", content)],
        )
    }

    pub fn item_deleted(&self, id: &str, kind: NoteType) -> Option<String> {
        Self::render(
            &self.templates.item_deleted,
            &[("id", id), ("type", kind.label())],
        )
    }

    pub fn error_general(&self, error: &str) -> Option<String> {
        Self::render(&self.templates.error_general, &[("error", error)])
    }

    pub fn error_not_found(&self, id: &str, kind: NoteType) -> Option<String> {
        Self::render(
            &self.templates.error_not_found,
            &[("id", id), ("type", kind.label())],
        )
    }
}
