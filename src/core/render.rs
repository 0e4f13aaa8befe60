//! Per-domain configuration rendering.
//!
//! Pure literal find/replace over a shared template. Four fixed rewrites run
//! first, then the caller's rules in order, each rule seeing the output of the
//! ones before it.

use crate::job::{DatabaseNaming, SubstitutionRule};
use crate::utils::template::{expand_placeholders, TemplateVars};

pub const BASE_URL_MARKER: &str = "APP_URL=http://localhost";
pub const DATABASE_NAME_KEY: &str = "DB_DATABASE";
pub const DATABASE_USER_KEY: &str = "DB_USERNAME";
pub const PASSWORD_KEY: &str = "DB_PASSWORD=";

/// Values that vary per domain.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub domain: &'a str,
    pub account: &'a str,
    pub password: &'a str,
}

pub fn render(
    template: &str,
    ctx: &RenderContext<'_>,
    naming: &DatabaseNaming,
    rules: &[SubstitutionRule],
) -> String {
    let mut content = template.to_string();

    content = replace_literal(&content, BASE_URL_MARKER, &format!("APP_URL=https://{}", ctx.domain));
    content = replace_literal(
        &content,
        &naming.name_marker,
        &format!("{}={}", DATABASE_NAME_KEY, naming.database_name(ctx.account)),
    );
    content = replace_literal(
        &content,
        &naming.user_marker,
        &format!("{}={}", DATABASE_USER_KEY, naming.database_user(ctx.account)),
    );
    content = replace_literal(&content, PASSWORD_KEY, &format!("{}{}", PASSWORD_KEY, ctx.password));

    apply_rules(&content, ctx.domain, ctx.account, rules)
}

/// Apply substitution rules in order, expanding `{domain}` and `{user}` in
/// each replacement first.
pub fn apply_rules(content: &str, domain: &str, account: &str, rules: &[SubstitutionRule]) -> String {
    let vars = [(TemplateVars::DOMAIN, domain), (TemplateVars::USER, account)];

    rules.iter().fold(content.to_string(), |acc, rule| {
        let replacement = expand_placeholders(&rule.replace, &vars);
        replace_literal(&acc, &rule.find, &replacement)
    })
}

// An empty needle would otherwise be inserted between every character.
fn replace_literal(content: &str, find: &str, replace: &str) -> String {
    if find.is_empty() {
        return content.to_string();
    }
    content.replace(find, replace)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "APP_NAME=Portal\n\
APP_ENV=local\n\
APP_DEBUG=true\n\
APP_URL=http://localhost\n\
DB_CONNECTION=mysql\n\
DB_DATABASE=laravel\n\
DB_USERNAME=root\n\
DB_PASSWORD=\n";

    fn naming() -> DatabaseNaming {
        DatabaseNaming {
            name_marker: "DB_DATABASE=laravel".to_string(),
            name_suffix: "portal_news".to_string(),
            user_marker: "DB_USERNAME=root".to_string(),
            user_suffix: "root".to_string(),
        }
    }

    fn ctx() -> RenderContext<'static> {
        RenderContext {
            domain: "example.com",
            account: "example",
            password: "s3cret",
        }
    }

    #[test]
    fn fixed_rewrites_apply() {
        let out = render(TEMPLATE, &ctx(), &naming(), &[]);
        assert!(out.contains("APP_URL=https://example.com\n"));
        assert!(out.contains("DB_DATABASE=example_portal_news\n"));
        assert!(out.contains("DB_USERNAME=example_root\n"));
        assert!(out.contains("DB_PASSWORD=s3cret\n"));
        assert!(out.contains("APP_ENV=local\n"));
    }

    #[test]
    fn rules_run_after_fixed_rewrites() {
        let rules = vec![
            SubstitutionRule::new("APP_ENV=local", "APP_ENV=production"),
            SubstitutionRule::new("APP_DEBUG=true", "APP_DEBUG=false"),
        ];
        let out = render(TEMPLATE, &ctx(), &naming(), &rules);
        assert!(out.contains("APP_ENV=production\n"));
        assert!(out.contains("APP_DEBUG=false\n"));
    }

    #[test]
    fn render_is_deterministic() {
        let rules = vec![SubstitutionRule::new("Portal", "{user} portal")];
        let first = render(TEMPLATE, &ctx(), &naming(), &rules);
        let second = render(TEMPLATE, &ctx(), &naming(), &rules);
        assert_eq!(first, second);
    }

    #[test]
    fn rules_apply_sequentially() {
        let rules = vec![SubstitutionRule::new("A", "B"), SubstitutionRule::new("B", "C")];
        assert_eq!(apply_rules("A", "example.com", "example", &rules), "C");
    }

    #[test]
    fn replacement_placeholders_expand() {
        let rules = vec![SubstitutionRule::new("X", "user-{domain}-{user}")];
        assert_eq!(
            apply_rules("X", "example.com", "example", &rules),
            "user-example.com-example"
        );
    }

    #[test]
    fn repeated_token_is_replaced_everywhere() {
        let rules = vec![SubstitutionRule::new("old", "new")];
        assert_eq!(apply_rules("old old\nold", "a.com", "a", &rules), "new new\nnew");
    }

    #[test]
    fn absent_token_is_a_no_op() {
        let rules = vec![SubstitutionRule::new("MISSING=1", "MISSING=2")];
        let out = render(TEMPLATE, &ctx(), &naming(), &rules);
        assert_eq!(out, render(TEMPLATE, &ctx(), &naming(), &[]));
    }

    #[test]
    fn empty_find_is_skipped() {
        let mut naming = naming();
        naming.name_marker.clear();
        let rules = vec![SubstitutionRule::new("", "boom")];
        let out = render("DB_DATABASE=laravel", &ctx(), &naming, &rules);
        assert_eq!(out, "DB_DATABASE=laravel");
    }

    #[test]
    fn later_rule_sees_fixed_rewrite_output() {
        let rules = vec![SubstitutionRule::new("https://example.com", "https://www.{domain}")];
        let out = render(TEMPLATE, &ctx(), &naming(), &rules);
        assert!(out.contains("APP_URL=https://www.example.com\n"));
    }
}
