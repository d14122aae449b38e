//! Template rendering for job container commands using Tera
//!
//! Job type templates may reference the job being built, e.g.
//! `["--input", "{{ data }}", "--owner", "{{ workflow }}"]`.

use serde::Serialize;
use tera::{Context, Tera};

use crate::{Error, Result};

/// Values in scope while rendering a job's command and args.
#[derive(Debug, Clone, Serialize)]
pub struct JobContext<'a> {
    pub name: &'a str,
    #[serde(rename = "type")]
    pub job_type: &'a str,
    pub data: &'a str,
    pub workflow: &'a str,
    pub namespace: &'a str,
}

/// Render a single template string with the given context
pub fn render_template(template: &str, context: &JobContext<'_>) -> Result<String> {
    // Plain strings skip the parser entirely
    if !template.contains("{{") && !template.contains("{%") {
        return Ok(template.to_string());
    }

    let tera_context = Context::from_serialize(context)
        .map_err(|e| Error::Template(format!("Failed to build template context: {}", e)))?;

    Tera::one_off(template, &tera_context, false)
        .map_err(|e| Error::Template(format!("Failed to render template '{}': {}", template, e)))
}

/// Render every entry of an argv-style list
pub fn render_all(templates: &[String], context: &JobContext<'_>) -> Result<Vec<String>> {
    templates
        .iter()
        .map(|t| render_template(t, context))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> JobContext<'static> {
        JobContext {
            name: "a",
            job_type: "render",
            data: "scene-42",
            workflow: "wf",
            namespace: "default",
        }
    }

    #[test]
    fn test_render_template() {
        let result = render_template("--input={{ data }} --job={{ name }}", &context()).unwrap();
        assert_eq!(result, "--input=scene-42 --job=a");
    }

    #[test]
    fn test_plain_strings_pass_through() {
        assert_eq!(render_template("echo \"$JOB_DATA\"", &context()).unwrap(), "echo \"$JOB_DATA\"");
    }

    #[test]
    fn test_render_all_keeps_order() {
        let args = vec!["{{ workflow }}".to_string(), "{{ name }}".to_string()];
        assert_eq!(render_all(&args, &context()).unwrap(), vec!["wf", "a"]);
    }

    #[test]
    fn test_unknown_variable_is_an_error() {
        let err = render_template("{{ missing }}", &context()).unwrap_err();
        assert!(matches!(err, Error::Template(_)));
    }
}
