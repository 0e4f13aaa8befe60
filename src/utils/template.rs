//! String template rendering utilities.
//!
//! Two placeholder styles are supported:
//! - `{{name}}` for command templates from `deckhand.json`
//! - `{domain}` / `{user}` inside substitution rule replacements

pub struct TemplateVars;

impl TemplateVars {
    pub const REPO_URL: &'static str = "repoUrl";
    pub const SEEDER: &'static str = "seeder";
    pub const DOMAIN: &'static str = "domain";
    pub const USER: &'static str = "user";
}

pub fn render(template: &str, variables: &[(&str, &str)]) -> String {
    let mut result = template.to_string();

    for (key, value) in variables {
        let placeholder = format!("{{{{{}}}}}", key);
        result = result.replace(&placeholder, value);
    }

    result
}

/// Expand single-brace placeholders (`{domain}`, `{user}`).
///
/// Unknown placeholders are left untouched.
pub fn expand_placeholders(text: &str, variables: &[(&str, &str)]) -> String {
    let mut result = text.to_string();

    for (key, value) in variables {
        let placeholder = format!("{{{}}}", key);
        result = result.replace(&placeholder, value);
    }

    result
}

pub fn is_present(template: &str, key: &str) -> bool {
    let placeholder = format!("{{{{{}}}}}", key);
    template.contains(&placeholder)
}
