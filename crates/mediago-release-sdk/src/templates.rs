//! Template management for the generated npm packages.
//!
//! Templates are embedded into the binary at compile time and rendered by
//! flat `{{NAME}}` substitution. Rendering is a pure function so it can be
//! tested without touching the filesystem; reading and writing happen in
//! [`crate::packager`].

use include_dir::{Dir, include_dir};

use crate::types::ReleaseError;

static NPM_TEMPLATES: Dir = include_dir!("$CARGO_MANIFEST_DIR/templates/npm");

pub const ROOT_PACKAGE_JSON: &str = "root-package.json.tpl";
pub const PLATFORM_PACKAGE_JSON: &str = "platform-package.json.tpl";
pub const ROOT_README: &str = "root-readme.md.tpl";
pub const PLATFORM_README: &str = "platform-readme.md.tpl";
pub const ROOT_INSTALL_SCRIPT: &str = "root-install.js.tpl";

/// Template variable that can be replaced in template files
#[derive(Debug, Clone)]
pub struct TemplateVar {
    pub name: &'static str,
    pub value: String,
}

impl TemplateVar {
    pub fn new(name: &'static str, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

/// Returns the embedded template called `name`.
pub fn template(name: &str) -> Result<&'static str, ReleaseError> {
    NPM_TEMPLATES
        .get_file(name)
        .and_then(|file| file.contents_utf8())
        .ok_or_else(|| ReleaseError::Template {
            template: name.to_string(),
            placeholders: vec!["<embedded template missing>".to_string()],
        })
}

/// Replaces every `{{NAME}}` in `input` with its value.
pub fn render_template(input: &str, vars: &[TemplateVar]) -> String {
    let mut output = input.to_string();
    for var in vars {
        output = output.replace(&format!("{{{{{}}}}}", var.name), &var.value);
    }
    output
}

/// Renders the embedded template `name`.
///
/// Every placeholder the template itself uses must have a value. Values are
/// not inspected, so a description containing `{{beta}}` renders as-is.
pub fn render_named(name: &str, vars: &[TemplateVar]) -> Result<String, ReleaseError> {
    let input = template(name)?;
    let missing: Vec<String> = placeholders(input)
        .into_iter()
        .filter(|placeholder| {
            !vars
                .iter()
                .any(|var| placeholder.get(2..placeholder.len() - 2) == Some(var.name))
        })
        .collect();
    if !missing.is_empty() {
        return Err(ReleaseError::Template {
            template: name.to_string(),
            placeholders: missing,
        });
    }
    Ok(render_template(input, vars))
}

/// Validates that no unreplaced template placeholders remain in the rendered content
pub fn validate_no_unreplaced_placeholders(content: &str, template: &str) -> Result<(), ReleaseError> {
    let unreplaced = placeholders(content);
    if unreplaced.is_empty() {
        Ok(())
    } else {
        Err(ReleaseError::Template {
            template: template.to_string(),
            placeholders: unreplaced,
        })
    }
}

/// Every `{{NAME}}` in `content`, braces included, in order of appearance.
fn placeholders(content: &str) -> Vec<String> {
    let mut pos = 0;
    let mut found = Vec::new();

    while let Some(start) = content[pos..].find("{{") {
        let abs_start = pos + start;
        let Some(end) = content[abs_start..].find("}}") else {
            break;
        };
        let var_name = &content[abs_start + 2..abs_start + end];
        // `${...}` and anything with whitespace is not one of ours
        if !var_name.is_empty() && !var_name.contains('$') && !var_name.contains(char::is_whitespace)
        {
            found.push(content[abs_start..abs_start + end + 2].to_string());
        }
        pos = abs_start + end + 2;
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_template_replaces_every_occurrence() {
        let out = render_template(
            "{{NAME}}-{{PLATFORM}} and {{NAME}}",
            &[
                TemplateVar::new("NAME", "player"),
                TemplateVar::new("PLATFORM", "linux-x64"),
            ],
        );
        assert_eq!(out, "player-linux-x64 and player");
    }

    #[test]
    fn test_render_template_is_flat() {
        // Values are inserted verbatim and never re-expanded.
        let out = render_template(
            "{{A}}",
            &[TemplateVar::new("A", "{{B}}"), TemplateVar::new("C", "x")],
        );
        assert_eq!(out, "{{B}}");
    }

    #[test]
    fn test_validate_no_unreplaced_placeholders() {
        assert!(validate_no_unreplaced_placeholders("hello world", "t").is_ok());
        assert!(validate_no_unreplaced_placeholders("`${platform}`", "t").is_ok());
        assert!(validate_no_unreplaced_placeholders("{{ not ours }}", "t").is_ok());

        let err = validate_no_unreplaced_placeholders("v{{VERSION}}", "pkg.tpl").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("{{VERSION}}"));
        assert!(msg.contains("pkg.tpl"));
    }

    #[test]
    fn test_all_templates_embedded() {
        for name in [
            ROOT_PACKAGE_JSON,
            PLATFORM_PACKAGE_JSON,
            ROOT_README,
            PLATFORM_README,
            ROOT_INSTALL_SCRIPT,
        ] {
            let body = template(name).unwrap();
            assert!(!body.is_empty(), "{name} is empty");
        }
        assert!(template("missing.tpl").is_err());
    }

    #[test]
    fn test_render_named_rejects_missing_vars() {
        let err = render_named(PLATFORM_README, &[TemplateVar::new("OS", "linux")]).unwrap_err();
        let ReleaseError::Template { placeholders, .. } = err else {
            panic!("expected a template error, got {err:?}");
        };
        assert!(!placeholders.contains(&"{{OS}}".to_string()));
        assert!(!placeholders.is_empty());
    }

    #[test]
    fn test_render_named_keeps_braces_inside_values() {
        let rendered = render_named(
            PLATFORM_README,
            &[
                TemplateVar::new("PACKAGE_NAME", "@mediago/player"),
                TemplateVar::new("PLATFORM_NAME", "linux-x64"),
                TemplateVar::new("OS", "linux"),
                TemplateVar::new("CPU", "x64"),
                TemplateVar::new("LICENSE", "Player {{beta}}"),
            ],
        )
        .unwrap();
        assert!(rendered.contains("Player {{beta}}"));
        assert!(rendered.contains("# @mediago/player-linux-x64"));
    }

    #[test]
    fn test_placeholders_skip_foreign_braces() {
        assert_eq!(
            placeholders("{{A}} ${x} {{ b }} {{${c}}} {{B}}"),
            vec!["{{A}}".to_string(), "{{B}}".to_string()]
        );
    }
}
