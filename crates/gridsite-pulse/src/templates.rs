use gridsite_core::Template;

/// Saved query templates, kept sorted by name.
#[derive(Debug, Default)]
pub struct TemplateList {
    templates: Vec<Template>,
}

impl TemplateList {
    pub fn replace_all(&mut self, templates: Vec<Template>) {
        self.templates = templates;
        self.sort();
    }

    pub fn upsert(&mut self, template: Template) {
        match self.templates.iter_mut().find(|t| t.id == template.id) {
            Some(existing) => *existing = template,
            None => self.templates.push(template),
        }
        self.sort();
    }

    pub fn remove(&mut self, template_id: &str) -> Option<Template> {
        let index = self.templates.iter().position(|t| t.id == template_id)?;
        Some(self.templates.remove(index))
    }

    pub fn get(&self, template_id: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.id == template_id)
    }

    pub fn at(&self, index: usize) -> Option<&Template> {
        self.templates.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Template> {
        self.templates.iter()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    fn sort(&mut self) {
        self.templates
            .sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(id: &str, name: &str) -> Template {
        Template {
            id: id.to_string(),
            name: name.to_string(),
            text: format!("text for {name}"),
            classification: None,
            last_used_at: None,
        }
    }

    #[test]
    fn upsert_replaces_by_id_and_keeps_name_order() {
        let mut list = TemplateList::default();
        list.replace_all(vec![template("1", "zeta"), template("2", "Alpha")]);
        list.upsert(template("3", "beta"));
        list.upsert(template("1", "Gamma"));

        let names: Vec<&str> = list.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "beta", "Gamma"]);
        assert_eq!(list.get("1").expect("template").name, "Gamma");
    }

    #[test]
    fn remove_returns_the_template() {
        let mut list = TemplateList::default();
        list.upsert(template("4", "Repeatable prompt"));
        assert_eq!(list.remove("4").map(|t| t.name), Some("Repeatable prompt".to_string()));
        assert!(list.remove("4").is_none());
        assert!(list.is_empty());
    }
}
