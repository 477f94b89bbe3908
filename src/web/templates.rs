//! HTML templates (Jinja2 syntax) compiled into the binary

use minijinja::{Environment, Value};
use thiserror::Error;

const TEMPLATES: [(&str, &str); 4] = [
    ("base.html", include_str!("../../templates/base.html")),
    ("dashboard.html", include_str!("../../templates/dashboard.html")),
    ("database.html", include_str!("../../templates/database.html")),
    ("error.html", include_str!("../../templates/error.html")),
];

/// Errors that can occur during template operations
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template '{0}' not found")]
    NotFound(String),

    #[error("Failed to render template: {0}")]
    RenderError(String),
}

/// Template environment with every page template loaded
pub fn environment() -> Result<Environment<'static>, TemplateError> {
    let mut env = Environment::new();
    for (name, source) in TEMPLATES {
        env.add_template(name, source)
            .map_err(|e| TemplateError::RenderError(format!("{name}: {e}")))?;
        tracing::debug!("Loaded template: {}", name);
    }
    Ok(env)
}

/// Render a template with the given context
pub fn render(env: &Environment<'static>, name: &str, ctx: Value) -> Result<String, TemplateError> {
    let template = env
        .get_template(name)
        .map_err(|_| TemplateError::NotFound(name.to_string()))?;
    template.render(ctx).map_err(|e| {
        tracing::error!("Failed to render template {}: {:#}", name, e);
        TemplateError::RenderError(e.to_string())
    })
}
